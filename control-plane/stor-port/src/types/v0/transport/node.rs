use super::*;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

rpc_impl_string_id!(NodeId, "ID of a cluster node");

/// Status of the Node.
#[derive(Serialize, Deserialize, Debug, Clone, EnumString, Display, Eq, PartialEq)]
pub enum NodeStatus {
    /// Node has unexpectedly disappeared.
    Unknown,
    /// Node is deemed online if its satellite is connected and has completed
    /// a full sync of its assigned state.
    Online,
    /// Node is deemed offline when its satellite connection is lost.
    Offline,
}

impl Default for NodeStatus {
    fn default() -> Self {
        Self::Unknown
    }
}

/// Runtime state of a node, as tracked by the controller.
#[derive(Serialize, Deserialize, Default, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeState {
    /// Node identification.
    pub id: NodeId,
    /// Endpoint of the node's satellite.
    pub grpc_endpoint: String,
    /// Deemed status of the node.
    pub status: NodeStatus,
    /// Layers the satellite reported support for.
    pub supported_layers: Vec<LayerKind>,
}

impl NodeState {
    /// Return a new `Self`.
    pub fn new(
        id: NodeId,
        grpc_endpoint: String,
        status: NodeStatus,
        supported_layers: Vec<LayerKind>,
    ) -> Self {
        Self {
            id,
            grpc_endpoint,
            status,
            supported_layers,
        }
    }
    /// Get the node identification.
    pub fn id(&self) -> &NodeId {
        &self.id
    }
    /// Is the node online.
    pub fn is_online(&self) -> bool {
        self.status == NodeStatus::Online
    }
    /// Does the node support the given device layer.
    pub fn supports_layer(&self, layer: &LayerKind) -> bool {
        self.supported_layers.contains(layer)
    }
}

/// A device layer a satellite may stack on top of a storage pool.
#[derive(Serialize, Deserialize, Debug, Clone, EnumString, Display, Eq, PartialEq)]
pub enum LayerKind {
    /// Plain backing storage.
    Storage,
    /// Replication layer.
    Drbd,
    /// Encryption layer.
    Luks,
    /// Caching layer.
    Cache,
    /// Checksum/integrity layer.
    WriteCache,
}
