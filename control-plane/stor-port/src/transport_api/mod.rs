#![warn(missing_docs)]
//! Error and reply types which cross the controller/satellite transport
//! boundary. The wire framing itself lives behind the peer connection
//! abstraction; only the decoded shapes are defined here.

use serde::{de::StdError, Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};
use tokio::task::JoinError;
use tonic::Code;

/// Report error chain.
pub trait ErrorChain {
    /// Full error chain as a string separated by ':'.
    fn full_string(&self) -> String;
}

impl<T> ErrorChain for T
where
    T: std::error::Error,
{
    /// loops through the error chain and formats into a single string
    /// containing all the lower level errors.
    fn full_string(&self) -> String {
        let mut msg = format!("{self}");
        let mut opt_source = self.source();
        while let Some(source) = opt_source {
            msg = format!("{msg}: {source}");
            opt_source = source.source();
        }
        msg
    }
}

/// All the different variants of Resources.
#[derive(Serialize, Deserialize, Debug, Clone, AsRefStr, Display, Eq, PartialEq)]
pub enum ResourceKind {
    /// Unknown or unspecified resource.
    Unknown,
    /// Node resource.
    Node,
    /// Storage pool resource.
    StorPool,
    /// Storage pool definition.
    StorPoolDefinition,
    /// Resource (replica set member).
    Resource,
    /// Resource definition.
    ResourceDefinition,
    /// Snapshot resource.
    Snapshot,
}

/// Error kind of a `ReplyError`.
#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[allow(missing_docs)]
pub enum ReplyErrorKind {
    WithMessage,
    DeserializeReq,
    Internal,
    Timeout,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    Unavailable,
    Unimplemented,
    Cancelled,
}

impl From<Code> for ReplyErrorKind {
    fn from(code: Code) -> Self {
        match code {
            Code::InvalidArgument => Self::InvalidArgument,
            Code::DeadlineExceeded => Self::DeadlineExceeded,
            Code::NotFound => Self::NotFound,
            Code::AlreadyExists => Self::AlreadyExists,
            Code::PermissionDenied => Self::PermissionDenied,
            Code::ResourceExhausted => Self::ResourceExhausted,
            Code::FailedPrecondition => Self::FailedPrecondition,
            Code::Aborted => Self::Aborted,
            Code::Unavailable => Self::Unavailable,
            Code::Unimplemented => Self::Unimplemented,
            Code::Cancelled => Self::Cancelled,
            _ => Self::Internal,
        }
    }
}

/// Error type which is returned over the transport for any operation.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ReplyError {
    /// error kind.
    pub kind: ReplyErrorKind,
    /// resource kind.
    pub resource: ResourceKind,
    /// last source of this error.
    pub source: String,
    /// extra information.
    pub extra: String,
}

impl std::fmt::Display for ReplyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "'{}' Error on '{}' resources, from Error '{}', extra: '{}'",
            self.kind.as_ref(),
            self.resource.as_ref(),
            self.source,
            self.extra
        )
    }
}

impl AsRef<str> for ReplyErrorKind {
    fn as_ref(&self) -> &str {
        match self {
            Self::WithMessage => "WithMessage",
            Self::DeserializeReq => "DeserializeReq",
            Self::Internal => "Internal",
            Self::Timeout => "Timeout",
            Self::InvalidArgument => "InvalidArgument",
            Self::DeadlineExceeded => "DeadlineExceeded",
            Self::NotFound => "NotFound",
            Self::AlreadyExists => "AlreadyExists",
            Self::PermissionDenied => "PermissionDenied",
            Self::ResourceExhausted => "ResourceExhausted",
            Self::FailedPrecondition => "FailedPrecondition",
            Self::Aborted => "Aborted",
            Self::Unavailable => "Unavailable",
            Self::Unimplemented => "Unimplemented",
            Self::Cancelled => "Cancelled",
        }
    }
}

impl From<tonic::Status> for ReplyError {
    fn from(status: tonic::Status) -> Self {
        Self {
            kind: status.code().into(),
            resource: ResourceKind::Unknown,
            source: status.to_string(),
            extra: String::new(),
        }
    }
}

impl From<ReplyError> for tonic::Status {
    fn from(error: ReplyError) -> Self {
        match error.kind {
            ReplyErrorKind::InvalidArgument => tonic::Status::invalid_argument(error.full_string()),
            ReplyErrorKind::DeadlineExceeded => {
                tonic::Status::deadline_exceeded(error.full_string())
            }
            ReplyErrorKind::FailedPrecondition => {
                tonic::Status::failed_precondition(error.full_string())
            }
            ReplyErrorKind::AlreadyExists => tonic::Status::already_exists(error.full_string()),
            ReplyErrorKind::Aborted => tonic::Status::aborted(error.full_string()),
            ReplyErrorKind::NotFound => tonic::Status::not_found(error.full_string()),
            ReplyErrorKind::ResourceExhausted => {
                tonic::Status::resource_exhausted(error.full_string())
            }
            ReplyErrorKind::PermissionDenied => {
                tonic::Status::permission_denied(error.full_string())
            }
            ReplyErrorKind::Unimplemented => tonic::Status::unimplemented(error.full_string()),
            _ => tonic::Status::internal(error.full_string()),
        }
    }
}

impl From<tonic::transport::Error> for ReplyError {
    fn from(error: tonic::transport::Error) -> Self {
        Self {
            kind: ReplyErrorKind::Aborted,
            resource: ResourceKind::Unknown,
            source: error.to_string(),
            extra: String::new(),
        }
    }
}

impl From<JoinError> for ReplyError {
    fn from(error: JoinError) -> Self {
        Self {
            kind: ReplyErrorKind::Aborted,
            resource: ResourceKind::Unknown,
            source: error.to_string(),
            extra: "Failed to wait for thread".to_string(),
        }
    }
}

impl StdError for ReplyError {}
impl ReplyError {
    /// Extend error with source.
    /// Useful when another error wraps around a `ReplyError` and we want to
    /// convert back to `ReplyError` so we can send it over the wire.
    pub fn extend(&mut self, source: &str, extra: &str) {
        self.source = format!("{}::{}", source, self.source);
        self.extra = format!("{}::{}", extra, self.extra);
    }
    /// Used when we get an invalid argument.
    pub fn invalid_argument(resource: ResourceKind, arg_name: &str, error: impl ToString) -> Self {
        Self {
            kind: ReplyErrorKind::InvalidArgument,
            resource,
            source: error.to_string(),
            extra: format!("Invalid {arg_name} was provided"),
        }
    }
    /// Used when we encounter a missing argument.
    pub fn missing_argument(resource: ResourceKind, arg_name: &str) -> Self {
        Self {
            kind: ReplyErrorKind::InvalidArgument,
            resource,
            source: arg_name.to_string(),
            extra: format!("Argument {arg_name} was not provided"),
        }
    }
    /// For errors that can occur when serializing or deserializing JSON data.
    pub fn serde_error(
        resource: ResourceKind,
        error_kind: ReplyErrorKind,
        error: serde_json::Error,
    ) -> Self {
        Self {
            kind: error_kind,
            resource,
            source: error.to_string(),
            extra: String::new(),
        }
    }
    /// For internal errors.
    pub fn internal_error(resource: ResourceKind, source: String, extra: String) -> Self {
        Self {
            kind: ReplyErrorKind::Internal,
            resource,
            source,
            extra,
        }
    }
}
