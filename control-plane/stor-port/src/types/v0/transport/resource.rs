use super::*;

use serde::{Deserialize, Serialize};

rpc_impl_string_id!(ResourceName, "Name of a resource definition");
rpc_impl_string_id!(SnapshotName, "Name of a snapshot definition");

/// One deployed replica of a resource definition.
#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourcePlacement {
    /// Node hosting the replica.
    pub node: NodeId,
    /// Pool backing the replica.
    pub pool: PoolId,
}

impl ResourcePlacement {
    /// Return a new `Self`.
    pub fn new(node: impl Into<NodeId>, pool: impl Into<PoolId>) -> Self {
        Self {
            node: node.into(),
            pool: pool.into(),
        }
    }
    /// The storage pool key of this placement.
    pub fn stor_pool(&self) -> StorPoolKey {
        StorPoolKey::new(self.node.clone(), self.pool.clone())
    }
}

/// Specification of a resource definition and its current replica placements.
#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpec {
    /// Resource definition name.
    pub name: ResourceName,
    /// Unique id of the definition object.
    pub uuid: uuid::Uuid,
    /// Replica placements of the definition.
    pub placements: Vec<ResourcePlacement>,
}

impl ResourceSpec {
    /// Return a new `Self`.
    pub fn new(name: impl Into<ResourceName>, placements: Vec<ResourcePlacement>) -> Self {
        Self {
            name: name.into(),
            uuid: uuid::Uuid::new_v4(),
            placements,
        }
    }
    /// Nodes hosting a replica of this definition.
    pub fn nodes(&self) -> Vec<NodeId> {
        self.placements.iter().map(|p| p.node.clone()).collect()
    }
}

/// Specification of a snapshot definition.
#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSpec {
    /// The snapped resource definition.
    pub resource: ResourceName,
    /// Snapshot name, unique within the resource definition.
    pub snapshot: SnapshotName,
    /// Unique id of the snapshot object.
    pub uuid: uuid::Uuid,
    /// Nodes taking part in the snapshot.
    pub nodes: Vec<NodeId>,
}

impl SnapshotSpec {
    /// Return a new `Self`.
    pub fn new(
        resource: impl Into<ResourceName>,
        snapshot: impl Into<SnapshotName>,
        nodes: Vec<NodeId>,
    ) -> Self {
        Self {
            resource: resource.into(),
            snapshot: snapshot.into(),
            uuid: uuid::Uuid::new_v4(),
            nodes,
        }
    }
}
