use super::*;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

rpc_impl_string_id!(PoolId, "Name of a storage pool definition");

/// Identifies one storage pool instance: the pool name is unique per node and
/// shared across nodes via its storage pool definition.
#[derive(Serialize, Deserialize, Default, Debug, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub struct StorPoolKey {
    /// Node hosting the pool.
    pub node: NodeId,
    /// Name of the pool (and of its definition).
    pub pool: PoolId,
}

impl StorPoolKey {
    /// Return a new `Self`.
    pub fn new(node: impl Into<NodeId>, pool: impl Into<PoolId>) -> Self {
        Self {
            node: node.into(),
            pool: pool.into(),
        }
    }
}

impl std::fmt::Display for StorPoolKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.node, self.pool)
    }
}

/// The device provider backing a storage pool.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, EnumString, Display, Eq, PartialEq)]
pub enum ProviderKind {
    /// LVM fat volumes.
    Lvm,
    /// LVM thin volumes.
    LvmThin,
    /// ZFS fat zvols.
    Zfs,
    /// ZFS thin zvols.
    ZfsThin,
    /// Loop-backed files.
    File,
    /// Sparse loop-backed files.
    FileThin,
    /// No local backing device.
    Diskless,
}

impl ProviderKind {
    /// Does the provider thin-provision its volumes.
    pub fn thin(&self) -> bool {
        matches!(self, Self::LvmThin | Self::ZfsThin | Self::FileThin)
    }
    /// Does the provider carve volumes out of a local backing device.
    pub fn has_backing_device(&self) -> bool {
        !matches!(self, Self::Diskless)
    }
}

/// Specification of one storage pool instance.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorPoolSpec {
    /// Pool identification.
    pub key: StorPoolKey,
    /// Unique id of the pool object.
    pub uuid: uuid::Uuid,
    /// Device provider backing the pool.
    pub provider: ProviderKind,
    /// Pool-level thin oversubscription ratio; the cluster default applies
    /// when unset.
    pub max_oversubscription_ratio: Option<f64>,
}

impl StorPoolSpec {
    /// Return a new `Self`.
    pub fn new(key: StorPoolKey, provider: ProviderKind) -> Self {
        Self {
            key,
            uuid: uuid::Uuid::new_v4(),
            provider,
            max_oversubscription_ratio: None,
        }
    }
    /// Effective oversubscription ratio given the cluster default.
    pub fn oversubscription_ratio(&self, cluster_default: f64) -> f64 {
        self.max_oversubscription_ratio.unwrap_or(cluster_default)
    }
}

/// Free and total space of a pool, as reported by its satellite.
#[derive(Serialize, Deserialize, Default, Debug, Clone, Copy, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SpaceInfo {
    /// Free capacity in bytes.
    pub free_capacity: u64,
    /// Total capacity in bytes.
    pub total_capacity: u64,
}

impl SpaceInfo {
    /// Return a new `Self`.
    pub fn new(free_capacity: u64, total_capacity: u64) -> Self {
        Self {
            free_capacity,
            total_capacity,
        }
    }
}

/// Free capacity which a satellite reports as effectively unlimited, eg for
/// providers which cannot run out of address space.
pub const UNBOUNDED_CAPACITY: u64 = u64::MAX;

/// Tracked capacity of one pool. Free/total start out unknown until the first
/// satellite report arrives; unknown is never folded into zero.
#[derive(Serialize, Deserialize, Default, Debug, Clone, Copy, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CapacityInfo {
    /// Last reported free capacity, if any.
    pub free_capacity: Option<u64>,
    /// Last reported total capacity, if any.
    pub total_capacity: Option<u64>,
    /// Capacity the controller reserved ahead of deployment; negative when
    /// more space was given back than taken.
    pub reserved_capacity: i64,
}

impl CapacityInfo {
    /// Fold a satellite report into the tracked state, keeping reservations.
    pub fn with_report(self, space: SpaceInfo) -> Self {
        Self {
            free_capacity: Some(space.free_capacity),
            total_capacity: Some(space.total_capacity),
            reserved_capacity: self.reserved_capacity,
        }
    }
}
