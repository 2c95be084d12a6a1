//! Fan-out fetcher for thin pool free space.
//!
//! Thin pool occupancy changes behind the controller's back, so before any
//! capacity sensitive decision the controller asks the affected satellites
//! for a fresh report. Only nodes which own at least one thin pool with a
//! backing device are contacted. A node which cannot answer simply
//! contributes no data; partial results are valid.

use crate::{
    controller::{registry::Registry, wrapper::SatelliteWrapper},
    errors::SvcError,
};
use stor_port::{
    transport_api::ErrorChain,
    types::v0::transport::{ApiCallEntry, NodeId, SpaceInfo, StorPoolKey, ThinFreeSpaceReport},
};

use std::collections::{BTreeMap, BTreeSet};

/// Fetches fresh free space information from the satellites owning thin
/// pools, updating the registry's capacity trackers as the reports arrive.
#[derive(Clone, Debug)]
pub struct FreeCapacityFetcher {
    registry: Registry,
}

impl FreeCapacityFetcher {
    /// Return a new `Self` operating on the given registry.
    pub fn new(registry: &Registry) -> Self {
        Self {
            registry: registry.clone(),
        }
    }

    /// Fetch the free capacity of every thin pool on the filtered nodes (all
    /// nodes when the filter is empty).
    pub async fn fetch_thin_free_capacities(
        &self,
        node_filter: &BTreeSet<NodeId>,
    ) -> Result<BTreeMap<StorPoolKey, u64>, SvcError> {
        let info = self.fetch_thin_free_space_info(node_filter).await?;
        Ok(info
            .into_iter()
            .map(|(key, (space, _))| (key, space.free_capacity))
            .collect())
    }

    /// Fetch the free space information of every thin pool on the filtered
    /// nodes (all nodes when the filter is empty), along with any
    /// satellite-side probe errors.
    ///
    /// Completes only once every contacted satellite either answered or was
    /// given up on; satellites which cannot answer contribute no entries.
    pub async fn fetch_thin_free_space_info(
        &self,
        node_filter: &BTreeSet<NodeId>,
    ) -> Result<BTreeMap<StorPoolKey, (SpaceInfo, Vec<ApiCallEntry>)>, SvcError> {
        let satellites = self.thin_pool_satellites(node_filter).await?;

        let requests = satellites.into_iter().map(Self::fetch_node);
        let reports = futures::future::join_all(requests).await;

        let mut result = BTreeMap::new();
        for (node_id, report) in reports {
            let Some(report) = report else {
                continue;
            };
            for pool in report.pools {
                let key = StorPoolKey::new(node_id.clone(), pool.pool);
                self.registry.update_pool_capacity(&key, pool.space);
                result.insert(key, (pool.space, pool.errors));
            }
        }
        Ok(result)
    }

    /// Resolve the nodes to contact: the filtered ones (each must exist) or
    /// all of them, further restricted to nodes owning a thin backed pool.
    async fn thin_pool_satellites(
        &self,
        node_filter: &BTreeSet<NodeId>,
    ) -> Result<Vec<SatelliteWrapper>, SvcError> {
        let node_ids = if node_filter.is_empty() {
            self.registry.node_ids().await
        } else {
            let mut ids = Vec::with_capacity(node_filter.len());
            for node_id in node_filter {
                // resolve now so an unknown node fails the call up front
                self.registry.node_wrapper(node_id).await?;
                ids.push(node_id.clone());
            }
            ids
        };

        let mut satellites = Vec::with_capacity(node_ids.len());
        for node_id in node_ids {
            if !self.registry.node_has_thin_pool(&node_id) {
                continue;
            }
            satellites.push(self.registry.satellite(&node_id).await?);
        }
        Ok(satellites)
    }

    /// Request one satellite's report; failures degrade to "no data".
    async fn fetch_node(satellite: SatelliteWrapper) -> (NodeId, Option<ThinFreeSpaceReport>) {
        let node_id = satellite.id().clone();
        match satellite.request_thin_free_space().await {
            Ok(report) => (node_id, Some(report)),
            Err(error) => {
                tracing::warn!(
                    node.id = %node_id,
                    error = error.full_string(),
                    "Failed to fetch thin pool free space, skipping node"
                );
                (node_id, None)
            }
        }
    }
}
