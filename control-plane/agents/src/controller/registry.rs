//! Registry containing the controller's view of the cluster: the runtime
//! state of every node with its satellite connection, the specs (desired
//! state) of storage pools, resources and snapshots, and the tracked capacity
//! of every storage pool.
//!
//! Nodes are added when their satellite registers and flip to `Offline` when
//! the connection drops, which also invalidates their pools' tracked
//! capacity. Queries take the read side of the respective lock; structural
//! mutations take the write side. No lock is held across a satellite call.

use crate::{
    capacity::fetcher::FreeCapacityFetcher,
    controller::wrapper::{NodeCommsTimeout, PeerConnection, SatelliteWrapper},
    errors::SvcError,
};
use stor_port::types::v0::transport::{
    CapacityInfo, NodeId, NodeState, NodeStatus, PoolId, ResourceName, ResourceSpec, SnapshotName,
    SnapshotSpec, SpaceInfo, StorPoolKey, StorPoolSpec,
};

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    ops::Deref,
    sync::Arc,
};
use tokio::sync::RwLock;

/// Map that stores the actual state of the nodes.
pub type NodesMapLocked = Arc<RwLock<HashMap<NodeId, Arc<RwLock<SatelliteWrapper>>>>>;

/// Registry containing all cluster objects the engine operates on.
#[derive(Clone, Debug)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

impl Deref for Registry {
    type Target = Arc<RegistryInner>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// Cluster wide configuration of the controller.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Period at which the capacity cache is refreshed from the satellites.
    cache_period: std::time::Duration,
    /// Timeout for satellite requests.
    request_timeout: std::time::Duration,
    /// Thin oversubscription ratio applied when a pool does not configure its
    /// own.
    default_max_oversubscription_ratio: f64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            cache_period: std::time::Duration::from_secs(30),
            request_timeout: std::time::Duration::from_secs(5),
            default_max_oversubscription_ratio: 20.0,
        }
    }
}

impl RegistryConfig {
    /// Return a new `Self`.
    pub fn new(
        cache_period: std::time::Duration,
        request_timeout: std::time::Duration,
        default_max_oversubscription_ratio: f64,
    ) -> Self {
        Self {
            cache_period,
            request_timeout,
            default_max_oversubscription_ratio,
        }
    }
    /// Period at which the capacity cache is refreshed.
    pub fn cache_period(&self) -> std::time::Duration {
        self.cache_period
    }
    /// Timeout for satellite requests.
    pub fn request_timeout(&self) -> std::time::Duration {
        self.request_timeout
    }
    /// The cluster-wide default thin oversubscription ratio.
    pub fn default_max_oversubscription_ratio(&self) -> f64 {
        self.default_max_oversubscription_ratio
    }
}

/// Specs (desired state) of the cluster objects, keyed for deterministic
/// iteration.
#[derive(Debug, Default)]
pub struct ClusterSpecs {
    stor_pools: BTreeMap<StorPoolKey, StorPoolSpec>,
    resources: BTreeMap<ResourceName, ResourceSpec>,
    snapshots: BTreeMap<(ResourceName, SnapshotName), SnapshotSpec>,
}

/// Generic registry inner, shared between clones of the `Registry`.
#[derive(Debug)]
pub struct RegistryInner {
    /// The actual state of the nodes.
    nodes: NodesMapLocked,
    /// Specs of the various cluster resources.
    specs: parking_lot::RwLock<ClusterSpecs>,
    /// Tracked capacity per storage pool.
    capacity: parking_lot::RwLock<HashMap<StorPoolKey, CapacityInfo>>,
    /// Cluster wide configuration.
    config: RegistryConfig,
}

impl Registry {
    /// Create a new registry with the given configuration.
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                nodes: Default::default(),
                specs: Default::default(),
                capacity: Default::default(),
                config,
            }),
        }
    }

    /// Get the cluster wide configuration.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Get a reference to the actual state of the nodes.
    pub fn nodes(&self) -> &NodesMapLocked {
        &self.nodes
    }

    /// Start the worker which periodically refreshes the capacity cache from
    /// the satellites.
    pub async fn start(&self) {
        let registry = self.clone();
        tokio::spawn(async move {
            registry.poller().await;
        });
    }

    /// Refresh the thin pool capacity cache of all nodes, forever.
    async fn poller(&self) {
        let fetcher = FreeCapacityFetcher::new(self);
        loop {
            if let Err(error) = fetcher.fetch_thin_free_capacities(&BTreeSet::new()).await {
                tracing::error!(%error, "Failed to refresh the thin pool capacity cache");
            }
            tokio::time::sleep(self.config.cache_period()).await;
        }
    }

    /// Add a node which registered itself, with the connection to its
    /// satellite.
    pub async fn register_node(&self, state: &NodeState, peer: Box<dyn PeerConnection>) {
        let timeouts = NodeCommsTimeout::new(self.config.request_timeout());
        let wrapper = SatelliteWrapper::new(state, peer, timeouts);
        let mut nodes = self.nodes.write().await;
        nodes.insert(state.id().clone(), Arc::new(RwLock::new(wrapper)));
        tracing::info!(node.id = %state.id(), "Node registered");
    }

    /// Flag a node as disconnected: its satellite is gone and the tracked
    /// capacity of its pools is no longer trustworthy.
    pub async fn node_disconnected(&self, node_id: &NodeId) -> Result<(), SvcError> {
        let node = self.node_wrapper(node_id).await?;
        node.write().await.set_status(NodeStatus::Offline);
        self.invalidate_node_capacity(node_id);
        tracing::info!(node.id = %node_id, "Node disconnected");
        Ok(())
    }

    /// Get the node wrapper of the given node.
    pub async fn node_wrapper(
        &self,
        node_id: &NodeId,
    ) -> Result<Arc<RwLock<SatelliteWrapper>>, SvcError> {
        self.nodes
            .read()
            .await
            .get(node_id)
            .cloned()
            .ok_or(SvcError::NodeNotFound {
                node_id: node_id.clone(),
            })
    }

    /// Get a point-in-time clone of the node's satellite wrapper. The clone
    /// shares the peer connection but not the nodes lock, so it is safe to
    /// await on it.
    pub async fn satellite(&self, node_id: &NodeId) -> Result<SatelliteWrapper, SvcError> {
        let node = self.node_wrapper(node_id).await?;
        let wrapper = node.read().await.clone();
        Ok(wrapper)
    }

    /// All registered node ids, sorted.
    pub async fn node_ids(&self) -> Vec<NodeId> {
        let mut ids = self.nodes.read().await.keys().cloned().collect::<Vec<_>>();
        ids.sort();
        ids
    }

    /// Add (or replace) a storage pool spec.
    pub fn add_stor_pool(&self, spec: StorPoolSpec) {
        let mut specs = self.specs.write();
        specs.stor_pools.insert(spec.key.clone(), spec);
    }

    /// Remove a storage pool spec along with its tracked capacity.
    pub fn remove_stor_pool(&self, key: &StorPoolKey) {
        let mut specs = self.specs.write();
        specs.stor_pools.remove(key);
        drop(specs);
        self.capacity.write().remove(key);
    }

    /// Get the spec of the given storage pool.
    pub fn stor_pool(&self, key: &StorPoolKey) -> Result<StorPoolSpec, SvcError> {
        self.specs
            .read()
            .stor_pools
            .get(key)
            .cloned()
            .ok_or(SvcError::StorPoolNotFound { key: key.clone() })
    }

    /// All storage pool specs, ordered by key.
    pub fn stor_pools(&self) -> Vec<StorPoolSpec> {
        self.specs.read().stor_pools.values().cloned().collect()
    }

    /// The distinct storage pool definition names known to the cluster.
    pub fn stor_pool_names(&self) -> BTreeSet<PoolId> {
        self.specs
            .read()
            .stor_pools
            .keys()
            .map(|key| key.pool.clone())
            .collect()
    }

    /// Does the node host at least one thin pool with a backing device.
    pub fn node_has_thin_pool(&self, node_id: &NodeId) -> bool {
        self.specs
            .read()
            .stor_pools
            .values()
            .any(|sp| &sp.key.node == node_id && sp.provider.thin() && sp.provider.has_backing_device())
    }

    /// Add (or replace) a resource spec.
    pub fn add_resource(&self, spec: ResourceSpec) {
        let mut specs = self.specs.write();
        specs.resources.insert(spec.name.clone(), spec);
    }

    /// Get the spec of the given resource definition.
    pub fn resource(&self, name: &ResourceName) -> Result<ResourceSpec, SvcError> {
        self.specs
            .read()
            .resources
            .get(name)
            .cloned()
            .ok_or(SvcError::ResourceNotFound { name: name.clone() })
    }

    /// All resource specs, ordered by name.
    pub fn resources(&self) -> Vec<ResourceSpec> {
        self.specs.read().resources.values().cloned().collect()
    }

    /// Add (or replace) a snapshot spec.
    pub fn add_snapshot(&self, spec: SnapshotSpec) {
        let mut specs = self.specs.write();
        specs
            .snapshots
            .insert((spec.resource.clone(), spec.snapshot.clone()), spec);
    }

    /// Get the spec of the given snapshot definition.
    pub fn snapshot(
        &self,
        resource: &ResourceName,
        snapshot: &SnapshotName,
    ) -> Result<SnapshotSpec, SvcError> {
        self.specs
            .read()
            .snapshots
            .get(&(resource.clone(), snapshot.clone()))
            .cloned()
            .ok_or(SvcError::ResourceNotFound {
                name: resource.clone(),
            })
    }

    /// The tracked capacity of the given pool; unknown when no satellite
    /// report arrived yet.
    pub fn pool_capacity(&self, key: &StorPoolKey) -> CapacityInfo {
        self.capacity.read().get(key).copied().unwrap_or_default()
    }

    /// Fold a satellite free space report into the pool's tracked capacity.
    pub fn update_pool_capacity(&self, key: &StorPoolKey, space: SpaceInfo) {
        let mut capacity = self.capacity.write();
        let entry = capacity.entry(key.clone()).or_default();
        *entry = entry.with_report(space);
    }

    /// Adjust the reserved capacity of a pool by the given delta. A positive
    /// delta takes capacity ahead of deployment, a negative delta gives it
    /// back.
    pub fn reserve_capacity(&self, key: &StorPoolKey, delta: i64) {
        let mut capacity = self.capacity.write();
        let entry = capacity.entry(key.clone()).or_default();
        entry.reserved_capacity = entry.reserved_capacity.saturating_add(delta);
    }

    /// Forget the reported capacity of all pools of a node, keeping the
    /// reservations.
    pub fn invalidate_node_capacity(&self, node_id: &NodeId) {
        let mut capacity = self.capacity.write();
        for (key, info) in capacity.iter_mut() {
            if &key.node == node_id {
                info.free_capacity = None;
                info.total_capacity = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::wrapper::test_stubs::StubPeer;
    use stor_port::types::v0::transport::{LayerKind, ProviderKind};

    fn node_state(node: &str) -> NodeState {
        NodeState::new(
            NodeId::from(node),
            format!("https://{node}:7777"),
            NodeStatus::Online,
            vec![LayerKind::Storage],
        )
    }

    #[tokio::test]
    async fn reservations_survive_reports_and_saturate() {
        let registry = Registry::new(RegistryConfig::default());
        let key = StorPoolKey::new("node-1", "pool-a");

        registry.reserve_capacity(&key, 100);
        registry.update_pool_capacity(&key, SpaceInfo::new(10, 20));
        let info = registry.pool_capacity(&key);
        assert_eq!(info.reserved_capacity, 100);
        assert_eq!(info.free_capacity, Some(10));

        registry.reserve_capacity(&key, -150);
        assert_eq!(registry.pool_capacity(&key).reserved_capacity, -50);

        registry.reserve_capacity(&key, i64::MIN);
        assert_eq!(registry.pool_capacity(&key).reserved_capacity, i64::MIN);
    }

    #[tokio::test]
    async fn disconnect_invalidates_reported_capacity() {
        let registry = Registry::new(RegistryConfig::default());
        registry
            .register_node(&node_state("node-1"), Box::new(StubPeer::online()))
            .await;
        let key = StorPoolKey::new("node-1", "pool-a");
        registry.add_stor_pool(StorPoolSpec::new(key.clone(), ProviderKind::LvmThin));
        registry.update_pool_capacity(&key, SpaceInfo::new(10, 20));
        registry.reserve_capacity(&key, 5);

        registry.node_disconnected(&NodeId::from("node-1")).await.unwrap();

        let info = registry.pool_capacity(&key);
        assert_eq!(info.free_capacity, None);
        assert_eq!(info.total_capacity, None);
        assert_eq!(info.reserved_capacity, 5);
        let satellite = registry.satellite(&NodeId::from("node-1")).await.unwrap();
        assert!(!satellite.is_online());
    }

    #[tokio::test]
    async fn removed_pools_drop_their_tracked_capacity() {
        let registry = Registry::new(RegistryConfig::default());
        let key = StorPoolKey::new("node-1", "pool-a");
        registry.add_stor_pool(StorPoolSpec::new(key.clone(), ProviderKind::Zfs));
        registry.update_pool_capacity(&key, SpaceInfo::new(10, 20));

        registry.remove_stor_pool(&key);
        assert!(matches!(
            registry.stor_pool(&key),
            Err(SvcError::StorPoolNotFound { .. })
        ));
        assert_eq!(registry.pool_capacity(&key), CapacityInfo::default());
    }
}
