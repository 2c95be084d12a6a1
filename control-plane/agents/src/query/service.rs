//! Answers "how large a volume could be created right now" and "how much
//! volume capacity does the cluster still hold" for a given placement filter.
//!
//! The max-volume-size query keeps the semantics of the older single-pool
//! selector: unless the filter pins one pool name, placement re-runs once per
//! distinct pool name known to the cluster and each answer is limited to
//! pools of that one name. This is O(pool-name-count) placement calls by
//! intent; the per-name answers are what clients consume.

use crate::{
    capacity::{estimator, fetcher::FreeCapacityFetcher, simulator},
    controller::{
        registry::Registry,
        scheduling::{pool::EligiblePools, AutoPlacer, FilterPlacer, ResourceFilter},
    },
    errors::SvcError,
};
use stor_port::types::v0::transport::{
    AutoSelectFilter, MaxVlmSizeCandidate, PoolId, QuerySizeInfoReply, StorPoolKey,
};

use itertools::Itertools;
use std::{collections::BTreeSet, sync::Arc};

/// The capacity query service.
#[derive(Clone, Debug)]
pub struct Service {
    registry: Registry,
    fetcher: FreeCapacityFetcher,
    placer: Arc<dyn AutoPlacer>,
}

impl Service {
    /// Return a new `Self` using the default filter-based placer.
    pub fn new(registry: &Registry) -> Self {
        Self::with_placer(registry, Arc::new(FilterPlacer::new(registry)))
    }

    /// Return a new `Self` using the given placer.
    pub fn with_placer(registry: &Registry, placer: Arc<dyn AutoPlacer>) -> Self {
        Self {
            registry: registry.clone(),
            fetcher: FreeCapacityFetcher::new(registry),
            placer,
        }
    }

    /// The largest volume of the requested replica count placeable right
    /// now, answered once per storage pool definition which can host it,
    /// ordered by pool name.
    ///
    /// Fails fast with `ReplicaCountRequired` before any satellite call when
    /// the filter carries no positive replica count, and with
    /// `NotEnoughNodes` when no pool name yields a placement.
    pub async fn query_max_vlm_size(
        &self,
        filter: &AutoSelectFilter,
    ) -> Result<Vec<MaxVlmSizeCandidate>, SvcError> {
        self.require_replica_count(filter)?;

        // refresh the thin pool telemetry; the estimations below read the
        // registry's capacity trackers
        self.fetcher
            .fetch_thin_free_capacities(&BTreeSet::new())
            .await?;

        let pool_names: Vec<PoolId> = match filter.pinned_stor_pool() {
            Some(pinned) => vec![pinned.clone()],
            None => self.registry.stor_pool_names().into_iter().collect(),
        };

        let mut candidates = Vec::new();
        for name in pool_names {
            let pinned = filter.pinning(&name);
            let selection = match self.placer.auto_place(&pinned, 0).await? {
                Some(selection) if !selection.is_empty() => selection,
                _ => continue,
            };
            if let Some(candidate) = self.candidate_for(&name, &selection)? {
                candidates.push(candidate);
            }
        }

        candidates.sort_by(|a, b| a.stor_pool_name.cmp(&b.stor_pool_name));
        candidates.dedup_by(|a, b| a.stor_pool_name == b.stor_pool_name);
        if candidates.is_empty() {
            return Err(SvcError::NotEnoughNodes {});
        }
        Ok(candidates)
    }

    /// The placement-constrained size information of the cluster under the
    /// given filter: largest single volume, plus the simulated total volume
    /// capacity over current free space and over raw pool capacity.
    pub async fn query_size_info(
        &self,
        filter: &AutoSelectFilter,
    ) -> Result<QuerySizeInfoReply, SvcError> {
        let replica_count = self.require_replica_count(filter)?;

        self.fetcher
            .fetch_thin_free_capacities(&BTreeSet::new())
            .await?;

        let max_vlm_size = match self.placer.auto_place(filter, 0).await? {
            Some(selection) if !selection.is_empty() => self.min_usable_capacity(&selection)?,
            _ => None,
        };

        let eligible = EligiblePools::builder_with_defaults(&self.registry, filter, 0)
            .await?
            .collect();
        let free = eligible
            .iter()
            .filter_map(|item| item.usable_capacity())
            .collect::<Vec<_>>();
        let total = eligible
            .iter()
            .filter_map(|item| self.registry.pool_capacity(item.key()).total_capacity)
            .collect::<Vec<_>>();

        Ok(QuerySizeInfoReply {
            max_vlm_size,
            available_size: simulator::simulate(&free, replica_count),
            capacity: simulator::simulate(&total, replica_count),
            default_max_oversubscription_ratio: self
                .registry
                .config()
                .default_max_oversubscription_ratio(),
        })
    }

    /// A positive replica count is required before anything else happens.
    fn require_replica_count(&self, filter: &AutoSelectFilter) -> Result<usize, SvcError> {
        match filter.replica_count {
            Some(count) if count > 0 => Ok(count as usize),
            _ => Err(SvcError::ReplicaCountRequired {}),
        }
    }

    /// Build the answer for one pool name from the placer's selection.
    ///
    /// The selection must map to exactly one storage pool definition; more
    /// than one means the placer broke its contract, which is a programming
    /// error rather than a reportable condition.
    fn candidate_for(
        &self,
        name: &PoolId,
        selection: &[StorPoolKey],
    ) -> Result<Option<MaxVlmSizeCandidate>, SvcError> {
        let definitions = selection.iter().map(|key| &key.pool).unique().count();
        if definitions > 1 {
            panic!(
                "Pool selection for '{name}' spans {definitions} storage pool definitions, \
                 the placer broke its single-definition contract"
            );
        }

        let Some(max_vlm_size) = self.min_usable_capacity(selection)? else {
            return Ok(None);
        };
        let mut node_names = selection
            .iter()
            .map(|key| key.node.clone())
            .collect::<Vec<_>>();
        node_names.sort();

        let mut all_thin = true;
        for key in selection {
            all_thin &= self.registry.stor_pool(key)?.provider.thin();
        }

        Ok(Some(MaxVlmSizeCandidate {
            stor_pool_name: name.clone(),
            max_vlm_size,
            node_names,
            all_thin,
        }))
    }

    /// A placement is only as large as its smallest member pool allows: the
    /// minimum estimated usable capacity across the selection, or `None` when
    /// any member's capacity is unknown.
    fn min_usable_capacity(&self, selection: &[StorPoolKey]) -> Result<Option<u64>, SvcError> {
        let default_ratio = self.registry.config().default_max_oversubscription_ratio();
        let mut min = None;
        for key in selection {
            let pool = self.registry.stor_pool(key)?;
            let capacity = self.registry.pool_capacity(key);
            match estimator::usable_free_capacity(default_ratio, &pool, &capacity, true) {
                Some(usable) => {
                    min = Some(match min {
                        Some(current) if current < usable => current,
                        _ => usable,
                    });
                }
                None => return Ok(None),
            }
        }
        Ok(min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{
        registry::RegistryConfig,
        wrapper::test_stubs::StubPeer,
    };
    use async_trait::async_trait;
    use stor_port::types::v0::transport::{
        LayerKind, NodeId, NodeState, NodeStatus, ProviderKind, SpaceInfo, StorPoolSpec,
    };

    async fn add_node(registry: &Registry, node: &str) {
        let state = NodeState::new(
            NodeId::from(node),
            format!("https://{node}:7777"),
            NodeStatus::Online,
            vec![LayerKind::Storage],
        );
        registry
            .register_node(&state, Box::new(StubPeer::online()))
            .await;
    }

    fn add_pool(registry: &Registry, node: &str, pool: &str, free: u64, total: u64) {
        let key = StorPoolKey::new(node, pool);
        registry.add_stor_pool(StorPoolSpec::new(key.clone(), ProviderKind::Lvm));
        registry.update_pool_capacity(&key, SpaceInfo::new(free, total));
    }

    /// node-1..3 host pool-a (100/200/300 free), node-2..3 also host pool-b
    /// (50/80 free).
    async fn cluster() -> Registry {
        let registry = Registry::new(RegistryConfig::default());
        for (node, free) in [("node-1", 100), ("node-2", 200), ("node-3", 300)] {
            add_node(&registry, node).await;
            add_pool(&registry, node, "pool-a", free, free * 2);
        }
        add_pool(&registry, "node-2", "pool-b", 50, 100);
        add_pool(&registry, "node-3", "pool-b", 80, 160);
        registry
    }

    #[tokio::test]
    async fn replica_count_is_required_up_front() {
        let registry = cluster().await;
        let service = Service::new(&registry);
        for filter in [
            AutoSelectFilter::default(),
            AutoSelectFilter::with_replica_count(0),
        ] {
            let error = service.query_max_vlm_size(&filter).await.unwrap_err();
            assert!(matches!(error, SvcError::ReplicaCountRequired {}));
            let error = service.query_size_info(&filter).await.unwrap_err();
            assert!(matches!(error, SvcError::ReplicaCountRequired {}));
        }
    }

    #[tokio::test]
    async fn answers_once_per_pool_name_sorted() {
        let registry = cluster().await;
        let service = Service::new(&registry);
        let filter = AutoSelectFilter::with_replica_count(2);
        let candidates = service.query_max_vlm_size(&filter).await.unwrap();

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].stor_pool_name, PoolId::from("pool-a"));
        // the two largest pool-a pools are on node-2/node-3; the smaller one
        // caps the volume size
        assert_eq!(candidates[0].max_vlm_size, 200);
        assert_eq!(
            candidates[0].node_names,
            vec![NodeId::from("node-2"), NodeId::from("node-3")]
        );
        assert!(!candidates[0].all_thin);

        assert_eq!(candidates[1].stor_pool_name, PoolId::from("pool-b"));
        assert_eq!(candidates[1].max_vlm_size, 50);
    }

    #[tokio::test]
    async fn pinned_pool_name_answers_only_that_name() {
        let registry = cluster().await;
        let service = Service::new(&registry);
        let mut filter = AutoSelectFilter::with_replica_count(2);
        filter.stor_pool_list = vec![PoolId::from("pool-b")];
        let candidates = service.query_max_vlm_size(&filter).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].stor_pool_name, PoolId::from("pool-b"));
    }

    #[tokio::test]
    async fn no_placement_is_not_enough_nodes() {
        let registry = cluster().await;
        let service = Service::new(&registry);
        let filter = AutoSelectFilter::with_replica_count(4);
        let error = service.query_max_vlm_size(&filter).await.unwrap_err();
        assert!(matches!(error, SvcError::NotEnoughNodes {}));
    }

    #[tokio::test]
    async fn thin_candidates_report_all_thin() {
        let registry = Registry::new(RegistryConfig::default());
        add_node(&registry, "node-1").await;
        add_node(&registry, "node-2").await;
        for node in ["node-1", "node-2"] {
            let key = StorPoolKey::new(node, "thin-a");
            let mut spec = StorPoolSpec::new(key.clone(), ProviderKind::LvmThin);
            spec.max_oversubscription_ratio = Some(2.0);
            registry.add_stor_pool(spec);
            registry.update_pool_capacity(&key, SpaceInfo::new(100, 1000));
        }

        let service = Service::new(&registry);
        let filter = AutoSelectFilter::with_replica_count(2);
        let candidates = service.query_max_vlm_size(&filter).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].all_thin);
        // oversubscription applies to the estimation
        assert_eq!(candidates[0].max_vlm_size, 200);
    }

    #[tokio::test]
    async fn size_info_simulates_available_and_total_capacity() {
        let registry = Registry::new(RegistryConfig::default());
        for (node, free) in [("node-1", 100), ("node-2", 200), ("node-3", 300)] {
            add_node(&registry, node).await;
            add_pool(&registry, node, "pool-a", free, free);
        }

        let service = Service::new(&registry);
        let filter = AutoSelectFilter::with_replica_count(2);
        let info = service.query_size_info(&filter).await.unwrap();
        assert_eq!(info.max_vlm_size, Some(200));
        assert_eq!(info.available_size, 300);
        assert_eq!(info.capacity, 300);
        assert_eq!(info.default_max_oversubscription_ratio, 20.0);
    }

    /// A placer which violates the single-definition contract.
    #[derive(Debug)]
    struct BadPlacer {}
    #[async_trait]
    impl AutoPlacer for BadPlacer {
        async fn auto_place(
            &self,
            _filter: &AutoSelectFilter,
            _size_hint: u64,
        ) -> Result<Option<Vec<StorPoolKey>>, SvcError> {
            Ok(Some(vec![
                StorPoolKey::new("node-1", "pool-a"),
                StorPoolKey::new("node-2", "pool-b"),
            ]))
        }
    }

    #[tokio::test]
    #[should_panic(expected = "single-definition contract")]
    async fn multi_definition_selection_is_fatal() {
        let registry = cluster().await;
        let service = Service::with_placer(&registry, Arc::new(BadPlacer {}));
        let filter = AutoSelectFilter::with_replica_count(2);
        service.query_max_vlm_size(&filter).await.ok();
    }
}
