use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum_macros::{AsRefStr, Display};

use super::NodeId;

/// Severity of one response entry.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Eq, PartialEq, PartialOrd, Ord, Display)]
pub enum Severity {
    /// Informational, the operation proceeded.
    Info,
    /// The operation proceeded but something was off.
    Warning,
    /// The operation (or a part of it) did not proceed.
    Error,
}

/// Outcome code of one response entry.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Eq, PartialEq, AsRefStr, Display)]
pub enum RetCode {
    /// The change was applied by the satellite.
    Applied,
    /// A placement filter is missing its replica count.
    InvalidPlaceCount,
    /// No combination of storage pools satisfies a placement filter.
    NotEnoughNodes,
    /// The target satellite is not connected.
    NotConnected,
    /// The target satellite failed its last full sync and must reconnect.
    FullSyncFailed,
    /// The satellite failed to deploy the change.
    DeploymentFailed,
    /// A satellite response could not be decoded.
    InvalidResponse,
    /// A free-space report carried a satellite-side error.
    FreeSpaceError,
}

/// One structured response entry, of which an `ApiCallRc` aggregates many.
#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApiCallEntry {
    /// Outcome code.
    pub code: RetCode,
    /// Severity of the entry.
    pub severity: Severity,
    /// Human readable message.
    pub message: String,
    /// Extra details, eg the causing error chain.
    pub details: Option<String>,
    /// References to the objects the entry is about.
    pub obj_refs: BTreeMap<String, String>,
}

impl ApiCallEntry {
    /// An informational entry.
    pub fn info(code: RetCode, message: impl Into<String>) -> Self {
        Self::new(code, Severity::Info, message)
    }
    /// A warning entry.
    pub fn warning(code: RetCode, message: impl Into<String>) -> Self {
        Self::new(code, Severity::Warning, message)
    }
    /// An error entry.
    pub fn error(code: RetCode, message: impl Into<String>) -> Self {
        Self::new(code, Severity::Error, message)
    }
    fn new(code: RetCode, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            code,
            severity,
            message: message.into(),
            details: None,
            obj_refs: BTreeMap::new(),
        }
    }
    /// Attach extra details to the entry.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
    /// Attach an object reference to the entry.
    pub fn with_obj_ref(mut self, kind: impl Into<String>, id: impl Into<String>) -> Self {
        self.obj_refs.insert(kind.into(), id.into());
        self
    }
    /// Is this an error-severity entry.
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Ordered aggregate of response entries for one api call.
#[derive(Serialize, Deserialize, Default, Debug, Clone, Eq, PartialEq)]
pub struct ApiCallRc {
    entries: Vec<ApiCallEntry>,
}

impl ApiCallRc {
    /// An empty aggregate.
    pub fn new() -> Self {
        Self::default()
    }
    /// An aggregate of a single entry.
    pub fn single(entry: ApiCallEntry) -> Self {
        Self {
            entries: vec![entry],
        }
    }
    /// Append one entry.
    pub fn push(&mut self, entry: ApiCallEntry) {
        self.entries.push(entry);
    }
    /// Append all entries of `other`, in order.
    pub fn extend(&mut self, other: ApiCallRc) {
        self.entries.extend(other.entries);
    }
    /// Append all entries of `other`, prefixing each message with the name of
    /// the node it originated from.
    pub fn extend_from_node(&mut self, node: &NodeId, other: ApiCallRc) {
        self.entries.extend(other.entries.into_iter().map(|mut e| {
            e.message = format!("({node}) {}", e.message);
            e
        }));
    }
    /// The entries, in arrival order.
    pub fn entries(&self) -> &[ApiCallEntry] {
        &self.entries
    }
    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }
    /// Does the aggregate hold no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
    /// Does any entry carry error severity.
    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(ApiCallEntry::is_error)
    }
}

impl From<ApiCallEntry> for ApiCallRc {
    fn from(entry: ApiCallEntry) -> Self {
        Self::single(entry)
    }
}

impl IntoIterator for ApiCallRc {
    type Item = ApiCallEntry;
    type IntoIter = std::vec::IntoIter<ApiCallEntry>;
    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a ApiCallRc {
    type Item = &'a ApiCallEntry;
    type IntoIter = std::slice::Iter<'a, ApiCallEntry>;
    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl FromIterator<ApiCallEntry> for ApiCallRc {
    fn from_iter<I: IntoIterator<Item = ApiCallEntry>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
