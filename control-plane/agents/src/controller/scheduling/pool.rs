use crate::{
    capacity::estimator,
    controller::{
        registry::Registry,
        scheduling::{ResourceData, ResourceFilter},
    },
    errors::SvcError,
};
use stor_port::types::v0::transport::{
    AutoSelectFilter, NodeId, NodeState, StorPoolKey, StorPoolSpec,
};

use std::collections::{HashMap, HashSet};

/// A storage pool candidate: the pool spec, the state of its node and the
/// estimated usable capacity at build time.
#[derive(Debug, Clone)]
pub struct PoolItem {
    node: NodeState,
    pool: StorPoolSpec,
    usable_capacity: Option<u64>,
}

impl PoolItem {
    /// The pool spec.
    pub fn pool(&self) -> &StorPoolSpec {
        &self.pool
    }
    /// The pool key.
    pub fn key(&self) -> &StorPoolKey {
        &self.pool.key
    }
    /// The state of the node hosting the pool.
    pub fn node(&self) -> &NodeState {
        &self.node
    }
    /// Estimated usable capacity, oversubscription included; `None` while the
    /// pool's capacity is unknown.
    pub fn usable_capacity(&self) -> Option<u64> {
        self.usable_capacity
    }
}

/// Context for filtering the pools suitable for a placement request.
#[derive(Clone)]
pub struct GetSuitablePoolsContext {
    filter: AutoSelectFilter,
    size_hint: u64,
    /// Nodes hosting a replica of a resource the request must not share a
    /// node with.
    excluded_nodes: HashSet<NodeId>,
    /// Nodes hosting a replica of a resource the request must share a node
    /// with; `None` when unconstrained.
    required_nodes: Option<HashSet<NodeId>>,
}

impl GetSuitablePoolsContext {
    /// The placement filter of the request.
    pub fn filter(&self) -> &AutoSelectFilter {
        &self.filter
    }
    /// Minimum usable capacity a candidate pool must provide.
    pub fn size_hint(&self) -> u64 {
        self.size_hint
    }
}

/// `ResourceData` context for getting the pools eligible for a placement.
#[derive(Clone)]
pub struct EligiblePools {
    data: ResourceData<GetSuitablePoolsContext, PoolItem>,
}

impl ResourceFilter for EligiblePools {
    type Request = GetSuitablePoolsContext;
    type Item = PoolItem;

    fn data(&mut self) -> &mut ResourceData<Self::Request, Self::Item> {
        &mut self.data
    }

    fn collect(self) -> Vec<Self::Item> {
        self.data.list
    }
}

impl EligiblePools {
    async fn builder(
        registry: &Registry,
        filter: &AutoSelectFilter,
        size_hint: u64,
    ) -> Result<Self, SvcError> {
        let context = GetSuitablePoolsContext {
            filter: filter.clone(),
            size_hint,
            excluded_nodes: excluded_nodes(registry, filter)?,
            required_nodes: required_nodes(registry, filter),
        };

        // Snapshot the node states first so the items can be built without
        // holding the nodes lock.
        let node_states: HashMap<NodeId, NodeState> = {
            let nodes = registry.nodes().read().await;
            let mut states = HashMap::with_capacity(nodes.len());
            for (id, node) in nodes.iter() {
                states.insert(id.clone(), node.read().await.node_state().clone());
            }
            states
        };

        let default_ratio = registry.config().default_max_oversubscription_ratio();
        let list = registry
            .stor_pools()
            .into_iter()
            .filter_map(|pool| {
                let node = node_states.get(&pool.key.node)?.clone();
                let capacity = registry.pool_capacity(&pool.key);
                let usable_capacity =
                    estimator::usable_free_capacity(default_ratio, &pool, &capacity, true);
                Some(PoolItem {
                    node,
                    pool,
                    usable_capacity,
                })
            })
            .collect();

        Ok(Self {
            data: ResourceData::new(context, list),
        })
    }

    /// Builder with the default filter chain applied: online allowed nodes,
    /// co-location rules, backed pools of the requested name/provider/layers
    /// with enough usable capacity, best capacity first.
    pub async fn builder_with_defaults(
        registry: &Registry,
        filter: &AutoSelectFilter,
        size_hint: u64,
    ) -> Result<Self, SvcError> {
        Ok(Self::builder(registry, filter, size_hint)
            .await?
            .filter(NodeFilters::online)
            .filter(NodeFilters::allowed)
            .filter(NodeFilters::not_excluded)
            .filter(NodeFilters::colocated)
            .filter(NodeFilters::supports_layers)
            .filter(PoolFilters::backed)
            .filter(PoolFilters::named)
            .filter(PoolFilters::provider)
            .filter(PoolFilters::capacity)
            .sort(PoolSorters::sort_by_usable_capacity))
    }
}

/// Nodes hosting a replica of any resource the filter refuses to share a
/// node with, by name list or by regex.
fn excluded_nodes(
    registry: &Registry,
    filter: &AutoSelectFilter,
) -> Result<HashSet<NodeId>, SvcError> {
    let regex = match &filter.do_not_place_with_regex {
        Some(pattern) => {
            Some(
                regex::Regex::new(pattern).map_err(|error| SvcError::InvalidFilter {
                    reason: format!("do-not-place-with regex '{pattern}': {error}"),
                })?,
            )
        }
        None => None,
    };

    let mut nodes = HashSet::new();
    if filter.do_not_place_with.is_empty() && regex.is_none() {
        return Ok(nodes);
    }
    for resource in registry.resources() {
        let listed = filter.do_not_place_with.contains(&resource.name);
        let matched = regex
            .as_ref()
            .map(|re| re.is_match(resource.name.as_str()))
            .unwrap_or(false);
        if listed || matched {
            nodes.extend(resource.nodes());
        }
    }
    Ok(nodes)
}

/// Nodes hosting a replica of the resources the filter must share a node
/// with; `None` when the filter does not constrain co-location.
fn required_nodes(registry: &Registry, filter: &AutoSelectFilter) -> Option<HashSet<NodeId>> {
    if filter.place_with.is_empty() {
        return None;
    }
    let mut nodes = HashSet::new();
    for name in &filter.place_with {
        if let Ok(resource) = registry.resource(name) {
            nodes.extend(resource.nodes());
        }
    }
    Some(nodes)
}

/// Filter nodes used for replica placement.
pub struct NodeFilters {}
impl NodeFilters {
    /// Should only attempt to use online nodes for pools.
    pub fn online(_request: &GetSuitablePoolsContext, item: &PoolItem) -> bool {
        item.node.is_online()
    }
    /// Should only attempt to use allowed nodes (by the filter).
    pub fn allowed(request: &GetSuitablePoolsContext, item: &PoolItem) -> bool {
        request.filter.node_list.is_empty() || request.filter.node_list.contains(&item.pool.key.node)
    }
    /// Should not share a node with the excluded resources.
    pub fn not_excluded(request: &GetSuitablePoolsContext, item: &PoolItem) -> bool {
        !request.excluded_nodes.contains(&item.pool.key.node)
    }
    /// Should share a node with the co-located resources.
    pub fn colocated(request: &GetSuitablePoolsContext, item: &PoolItem) -> bool {
        match &request.required_nodes {
            Some(nodes) => nodes.contains(&item.pool.key.node),
            None => true,
        }
    }
    /// Should only attempt to use nodes supporting the requested layers.
    pub fn supports_layers(request: &GetSuitablePoolsContext, item: &PoolItem) -> bool {
        request
            .filter
            .layer_list
            .iter()
            .all(|layer| item.node.supports_layer(layer))
    }
}

/// Filter the pools themselves.
pub struct PoolFilters {}
impl PoolFilters {
    /// Diskless pools cannot host a diskful replica.
    pub fn backed(_request: &GetSuitablePoolsContext, item: &PoolItem) -> bool {
        item.pool.provider.has_backing_device()
    }
    /// Should only attempt to use pools of the requested names.
    pub fn named(request: &GetSuitablePoolsContext, item: &PoolItem) -> bool {
        request.filter.stor_pool_list.is_empty()
            || request.filter.stor_pool_list.contains(&item.pool.key.pool)
    }
    /// Should only attempt to use pools of the requested providers.
    pub fn provider(request: &GetSuitablePoolsContext, item: &PoolItem) -> bool {
        request.filter.provider_list.is_empty()
            || request.filter.provider_list.contains(&item.pool.provider)
    }
    /// Should only attempt to use pools with enough usable capacity; a pool
    /// with unknown capacity is never usable.
    pub fn capacity(request: &GetSuitablePoolsContext, item: &PoolItem) -> bool {
        match item.usable_capacity {
            Some(usable) => usable >= request.size_hint,
            None => false,
        }
    }
}

/// Sort the pool candidates by preference.
pub struct PoolSorters {}
impl PoolSorters {
    /// Prefer pools with more usable capacity; break ties by key so the
    /// selection is stable for a given cluster state.
    pub fn sort_by_usable_capacity(a: &PoolItem, b: &PoolItem) -> std::cmp::Ordering {
        b.usable_capacity
            .cmp(&a.usable_capacity)
            .then_with(|| a.pool.key.cmp(&b.pool.key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{
        registry::RegistryConfig,
        scheduling::{AutoPlacer, FilterPlacer},
        wrapper::test_stubs::StubPeer,
    };
    use stor_port::types::v0::transport::{
        LayerKind, NodeStatus, ProviderKind, ResourcePlacement, ResourceSpec, SpaceInfo,
    };

    async fn add_node(registry: &Registry, node: &str) {
        let state = NodeState::new(
            NodeId::from(node),
            format!("https://{node}:7777"),
            NodeStatus::Online,
            vec![LayerKind::Storage, LayerKind::Drbd],
        );
        registry.register_node(&state, Box::new(StubPeer::online())).await;
    }

    fn add_pool(registry: &Registry, node: &str, pool: &str, free: u64) {
        let key = StorPoolKey::new(node, pool);
        registry.add_stor_pool(StorPoolSpec::new(key.clone(), ProviderKind::Lvm));
        registry.update_pool_capacity(&key, SpaceInfo::new(free, free));
    }

    async fn cluster() -> Registry {
        let registry = Registry::new(RegistryConfig::default());
        for (node, free) in [("node-1", 100), ("node-2", 300), ("node-3", 200)] {
            add_node(&registry, node).await;
            add_pool(&registry, node, "pool-a", free);
        }
        registry
    }

    #[tokio::test]
    async fn picks_the_largest_pools_on_distinct_nodes() {
        let registry = cluster().await;
        let placer = FilterPlacer::new(&registry);
        let filter = AutoSelectFilter::with_replica_count(2);
        let selection = placer.auto_place(&filter, 50).await.unwrap().unwrap();
        assert_eq!(
            selection,
            vec![
                StorPoolKey::new("node-2", "pool-a"),
                StorPoolKey::new("node-3", "pool-a"),
            ]
        );
    }

    #[tokio::test]
    async fn one_pool_per_node() {
        let registry = cluster().await;
        // a second, bigger pool on an already selected node must not yield
        // two replicas on that node
        add_pool(&registry, "node-2", "pool-b", 500);
        let placer = FilterPlacer::new(&registry);
        let filter = AutoSelectFilter::with_replica_count(3);
        let selection = placer.auto_place(&filter, 0).await.unwrap().unwrap();
        let nodes: HashSet<_> = selection.iter().map(|key| key.node.clone()).collect();
        assert_eq!(nodes.len(), 3);
    }

    #[tokio::test]
    async fn unknown_capacity_is_exclusionary() {
        let registry = cluster().await;
        let key = StorPoolKey::new("node-4", "pool-a");
        add_node(&registry, "node-4").await;
        registry.add_stor_pool(StorPoolSpec::new(key, ProviderKind::Lvm));
        // node-4's pool has no capacity report: a 4 replica placement cannot
        // be satisfied even though 4 pools exist
        let placer = FilterPlacer::new(&registry);
        let filter = AutoSelectFilter::with_replica_count(4);
        assert_eq!(placer.auto_place(&filter, 0).await.unwrap(), None);
    }

    #[tokio::test]
    async fn do_not_place_with_excludes_nodes() {
        let registry = cluster().await;
        registry.add_resource(ResourceSpec::new(
            "rsc-db",
            vec![ResourcePlacement::new("node-2", "pool-a")],
        ));
        let mut filter = AutoSelectFilter::with_replica_count(2);
        filter.do_not_place_with = vec!["rsc-db".into()];
        let placer = FilterPlacer::new(&registry);
        let selection = placer.auto_place(&filter, 0).await.unwrap().unwrap();
        assert!(!selection
            .iter()
            .any(|key| key.node == NodeId::from("node-2")));
    }

    #[tokio::test]
    async fn do_not_place_with_regex_excludes_nodes() {
        let registry = cluster().await;
        registry.add_resource(ResourceSpec::new(
            "rsc-db-0",
            vec![ResourcePlacement::new("node-2", "pool-a")],
        ));
        registry.add_resource(ResourceSpec::new(
            "rsc-db-1",
            vec![ResourcePlacement::new("node-3", "pool-a")],
        ));
        let mut filter = AutoSelectFilter::with_replica_count(2);
        filter.do_not_place_with_regex = Some("^rsc-db-.*".to_string());
        let placer = FilterPlacer::new(&registry);
        // only node-1 is left, so a 2 replica placement fails
        assert_eq!(placer.auto_place(&filter, 0).await.unwrap(), None);

        filter.replica_count = Some(1);
        let selection = placer.auto_place(&filter, 0).await.unwrap().unwrap();
        assert_eq!(selection, vec![StorPoolKey::new("node-1", "pool-a")]);
    }

    #[tokio::test]
    async fn invalid_regex_is_an_invalid_filter() {
        let registry = cluster().await;
        let mut filter = AutoSelectFilter::with_replica_count(1);
        filter.do_not_place_with_regex = Some("][".to_string());
        let placer = FilterPlacer::new(&registry);
        let error = placer.auto_place(&filter, 0).await.unwrap_err();
        assert!(matches!(error, SvcError::InvalidFilter { .. }));
    }

    #[tokio::test]
    async fn place_with_constrains_to_colocated_nodes() {
        let registry = cluster().await;
        registry.add_resource(ResourceSpec::new(
            "rsc-app",
            vec![ResourcePlacement::new("node-1", "pool-a")],
        ));
        let mut filter = AutoSelectFilter::with_replica_count(1);
        filter.place_with = vec!["rsc-app".into()];
        let placer = FilterPlacer::new(&registry);
        let selection = placer.auto_place(&filter, 0).await.unwrap().unwrap();
        assert_eq!(selection, vec![StorPoolKey::new("node-1", "pool-a")]);
    }

    #[tokio::test]
    async fn size_hint_disqualifies_small_pools() {
        let registry = cluster().await;
        let placer = FilterPlacer::new(&registry);
        let filter = AutoSelectFilter::with_replica_count(3);
        // node-1 only has 100 usable
        assert_eq!(placer.auto_place(&filter, 150).await.unwrap(), None);
        assert!(placer.auto_place(&filter, 100).await.unwrap().is_some());
    }
}
