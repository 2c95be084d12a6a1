use super::*;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// The internal controller to satellite api calls.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Eq, PartialEq, EnumString, Display)]
#[strum(serialize_all = "camelCase")]
pub enum InternalRpc {
    /// A node the satellite shares state with has changed.
    ChangedNode,
    /// A resource placed on the satellite has changed.
    ChangedResource,
    /// A storage pool hosted by the satellite has changed.
    ChangedStorPool,
    /// An in-progress snapshot the satellite takes part in has changed.
    ChangedSnapshot,
    /// Request a report of the satellite's thin pool free space.
    RequestThinFreeSpace,
}

/// The kind of object a change notification refers to.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Eq, PartialEq, EnumString, Display)]
pub enum ChangedKind {
    /// A cluster node.
    Node,
    /// A resource definition.
    Resource,
    /// A storage pool.
    StorPool,
    /// A snapshot definition.
    Snapshot,
}

/// Payload of a change notification: enough for the satellite to know which
/// object to re-fetch.
#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChangedObject {
    /// Kind of the changed object.
    pub kind: ChangedKind,
    /// Unique id of the changed object.
    pub uuid: uuid::Uuid,
    /// Display name of the changed object.
    pub name: String,
}

impl ChangedObject {
    /// A changed node notification.
    pub fn node(uuid: uuid::Uuid, name: &NodeId) -> Self {
        Self {
            kind: ChangedKind::Node,
            uuid,
            name: name.to_string(),
        }
    }
    /// A changed resource notification.
    pub fn resource(uuid: uuid::Uuid, name: &ResourceName) -> Self {
        Self {
            kind: ChangedKind::Resource,
            uuid,
            name: name.to_string(),
        }
    }
    /// A changed storage pool notification.
    pub fn stor_pool(uuid: uuid::Uuid, key: &StorPoolKey) -> Self {
        Self {
            kind: ChangedKind::StorPool,
            uuid,
            name: key.pool.to_string(),
        }
    }
    /// A changed snapshot notification.
    pub fn snapshot(uuid: uuid::Uuid, resource: &ResourceName, snapshot: &SnapshotName) -> Self {
        Self {
            kind: ChangedKind::Snapshot,
            uuid,
            name: format!("{resource}@{snapshot}"),
        }
    }
    /// The internal api call which ships this notification.
    pub fn rpc(&self) -> InternalRpc {
        match self.kind {
            ChangedKind::Node => InternalRpc::ChangedNode,
            ChangedKind::Resource => InternalRpc::ChangedResource,
            ChangedKind::StorPool => InternalRpc::ChangedStorPool,
            ChangedKind::Snapshot => InternalRpc::ChangedSnapshot,
        }
    }
}

/// Free space of one thin pool, as reported by a satellite.
#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorPoolFreeSpace {
    /// Name of the pool on the reporting node.
    pub pool: PoolId,
    /// Reported space information.
    pub space: SpaceInfo,
    /// Satellite-side errors hit while probing the pool.
    pub errors: Vec<ApiCallEntry>,
}

/// Reply payload of a `RequestThinFreeSpace` call.
#[derive(Serialize, Deserialize, Default, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ThinFreeSpaceReport {
    /// Per-pool free space of every thin pool on the node.
    pub pools: Vec<StorPoolFreeSpace>,
}

/// Reply payload of a change notification: the satellite's deployment result.
#[derive(Serialize, Deserialize, Default, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentReply {
    /// Response entries describing the deployment outcome.
    pub responses: ApiCallRc,
}
