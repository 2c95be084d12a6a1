use super::*;

use serde::{Deserialize, Serialize};

/// Constraints describing an acceptable set of storage pools for hosting a
/// resource's replicas. Immutable; the placement pipeline clones it when a
/// field must be forced (eg pinning a single pool name).
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AutoSelectFilter {
    /// How many diskful replicas to place.
    pub replica_count: Option<u32>,
    /// Only place on these nodes, when non-empty.
    pub node_list: Vec<NodeId>,
    /// Only place on pools with these names, when non-empty.
    pub stor_pool_list: Vec<PoolId>,
    /// Never share a node with a replica of these resources.
    pub do_not_place_with: Vec<ResourceName>,
    /// Never share a node with a replica of resources matching this regex.
    pub do_not_place_with_regex: Option<String>,
    /// Only place on nodes hosting a replica of these resources.
    pub place_with: Vec<ResourceName>,
    /// Require satellite support for these layers.
    pub layer_list: Vec<LayerKind>,
    /// Only place on pools backed by one of these providers, when non-empty.
    pub provider_list: Vec<ProviderKind>,
    /// Create diskless attachments on the nodes left over after placement.
    pub diskless_on_remaining: bool,
}

impl AutoSelectFilter {
    /// A filter which only constrains the replica count.
    pub fn with_replica_count(replica_count: u32) -> Self {
        Self {
            replica_count: Some(replica_count),
            ..Default::default()
        }
    }
    /// The single pinned pool name, if the filter pins exactly one.
    pub fn pinned_stor_pool(&self) -> Option<&PoolId> {
        match self.stor_pool_list.as_slice() {
            [single] => Some(single),
            _ => None,
        }
    }
    /// Clone the filter with the pool-name list replaced by a single name.
    pub fn pinning(&self, pool: &PoolId) -> Self {
        let mut filter = self.clone();
        filter.stor_pool_list = vec![pool.clone()];
        filter
    }
}

/// One answer of a max-volume-size query: the largest volume the pools of one
/// storage pool definition can host right now.
#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MaxVlmSizeCandidate {
    /// The storage pool definition the candidate pools belong to.
    pub stor_pool_name: PoolId,
    /// Largest volume size placeable on the candidate pools, in bytes.
    pub max_vlm_size: u64,
    /// Nodes hosting the candidate pools.
    pub node_names: Vec<NodeId>,
    /// Are all candidate pools thin provisioned.
    pub all_thin: bool,
}

/// Placement-constrained size information of the cluster.
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuerySizeInfoReply {
    /// Largest single volume placeable under the filter, in bytes.
    pub max_vlm_size: Option<u64>,
    /// Total volume capacity obtainable from current free space, in bytes.
    pub available_size: u64,
    /// Total volume capacity obtainable from raw pool capacity, in bytes.
    pub capacity: u64,
    /// The cluster-wide default thin oversubscription ratio applied.
    pub default_max_oversubscription_ratio: f64,
}
