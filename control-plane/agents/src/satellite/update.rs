//! Notifies satellites of updates, returning the responses from the
//! deployment of these changes.
//!
//! Losing one satellite must neither mask the updates of the others nor block
//! them: every failure (connection problems as well as deployment failures)
//! is converted into response entries, and a single deferred error is
//! surfaced only after every contacted satellite has reported.

use crate::{
    controller::{registry::Registry, wrapper::SatelliteWrapper},
    errors::SvcError,
};
use stor_port::{
    transport_api::ErrorChain,
    types::v0::transport::{
        ApiCallEntry, ApiCallRc, ChangedObject, NodeId, ResourceName, RetCode, SnapshotName,
        StorPoolKey,
    },
};

use futures::stream::Stream;
use itertools::Itertools;

/// How the dispatcher responds for a target satellite which is not connected.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum NotConnectedPolicy {
    /// Synthesize a warning entry for the unreachable satellite.
    Warn,
    /// Report an empty response for the unreachable satellite.
    Ignore,
}

/// The warning entry reported for a satellite without an active connection.
pub fn not_connected_warning(node_id: &NodeId) -> ApiCallEntry {
    ApiCallEntry::warning(
        RetCode::NotConnected,
        format!("No active connection to satellite '{node_id}'"),
    )
    .with_details("The controller is trying to (re-)establish the connection to the satellite")
    .with_obj_ref("node", node_id.to_string())
}

/// The warning entry reported for a satellite whose last full sync failed.
/// Such a satellite is unreachable for updates until it reconnects.
pub fn full_sync_failed_warning(node_id: &NodeId) -> ApiCallEntry {
    ApiCallEntry::warning(
        RetCode::FullSyncFailed,
        format!("Satellite '{node_id}' failed its full sync, it must reconnect before updates can be applied"),
    )
    .with_obj_ref("node", node_id.to_string())
}

/// The outcome of one satellite update.
struct PeerUpdate {
    node_id: NodeId,
    responses: ApiCallRc,
    failed: bool,
}

/// The aggregated outcome of a satellite fan-out: one response per contacted
/// satellite plus the deferred failure verdict.
#[derive(Debug)]
pub struct SatelliteUpdateResponses {
    responses: Vec<(NodeId, ApiCallRc)>,
    failures: usize,
}

impl SatelliteUpdateResponses {
    /// The per-satellite responses, in target order.
    pub fn responses(&self) -> &[(NodeId, ApiCallRc)] {
        &self.responses
    }
    /// The deferred verdict: an error iff any satellite reported a logical
    /// failure. The failure content already flowed as response entries.
    pub fn ok(&self) -> Result<(), SvcError> {
        match self.failures {
            0 => Ok(()),
            failures => Err(SvcError::DelayedApiRc { failures }),
        }
    }
    /// The responses as a stream: every per-satellite response, then the
    /// deferred error, if any, strictly last.
    pub fn into_stream(self) -> impl Stream<Item = Result<(NodeId, ApiCallRc), SvcError>> {
        let terminal = match self.failures {
            0 => None,
            failures => Some(Err(SvcError::DelayedApiRc { failures })),
        };
        futures::stream::iter(self.responses.into_iter().map(Ok).chain(terminal))
    }
}

/// Dispatches change notifications to every satellite which must observe a
/// mutation and aggregates their deployment responses.
#[derive(Clone, Debug)]
pub struct SatelliteUpdater {
    registry: Registry,
}

impl SatelliteUpdater {
    /// Return a new `Self` operating on the given registry.
    pub fn new(registry: &Registry) -> Self {
        Self {
            registry: registry.clone(),
        }
    }

    /// Notify the given nodes that a node has changed.
    pub async fn update_node(
        &self,
        uuid: uuid::Uuid,
        node_id: &NodeId,
        nodes_to_contact: &[NodeId],
    ) -> Result<SatelliteUpdateResponses, SvcError> {
        self.update_satellites(
            ChangedObject::node(uuid, node_id),
            nodes_to_contact,
            NotConnectedPolicy::Warn,
        )
        .await
    }

    /// Notify every node holding a replica of the resource definition that
    /// the resource has changed.
    pub async fn update_resource(
        &self,
        name: &ResourceName,
    ) -> Result<SatelliteUpdateResponses, SvcError> {
        let resource = self.registry.resource(name)?;
        let targets = resource.nodes().into_iter().unique().collect::<Vec<_>>();
        self.update_satellites(
            ChangedObject::resource(resource.uuid, &resource.name),
            &targets,
            NotConnectedPolicy::Warn,
        )
        .await
    }

    /// Notify the hosting node that a storage pool has changed.
    pub async fn update_stor_pool(
        &self,
        key: &StorPoolKey,
    ) -> Result<SatelliteUpdateResponses, SvcError> {
        let pool = self.registry.stor_pool(key)?;
        self.update_satellites(
            ChangedObject::stor_pool(pool.uuid, &pool.key),
            &[key.node.clone()],
            NotConnectedPolicy::Warn,
        )
        .await
    }

    /// Notify every node taking part in a snapshot that the snapshot has
    /// changed, with a caller-chosen policy for unreachable satellites.
    pub async fn update_snapshot(
        &self,
        resource: &ResourceName,
        snapshot: &SnapshotName,
        policy: NotConnectedPolicy,
    ) -> Result<SatelliteUpdateResponses, SvcError> {
        let snap = self.registry.snapshot(resource, snapshot)?;
        let targets = snap.nodes.iter().cloned().unique().collect::<Vec<_>>();
        self.update_satellites(
            ChangedObject::snapshot(snap.uuid, &snap.resource, &snap.snapshot),
            &targets,
            policy,
        )
        .await
    }

    /// Fan the notification out to all targets concurrently and fold the
    /// outcomes back in target order. Unknown targets fail the call before
    /// any satellite is contacted.
    async fn update_satellites(
        &self,
        changed: ChangedObject,
        targets: &[NodeId],
        policy: NotConnectedPolicy,
    ) -> Result<SatelliteUpdateResponses, SvcError> {
        let mut satellites = Vec::with_capacity(targets.len());
        for node_id in targets {
            satellites.push(self.registry.satellite(node_id).await?);
        }

        let updates = satellites
            .into_iter()
            .map(|satellite| Self::update_satellite(satellite, changed.clone(), policy));
        let updates = futures::future::join_all(updates).await;

        let mut failures = 0;
        let responses = updates
            .into_iter()
            .map(|update| {
                if update.failed {
                    failures += 1;
                }
                (update.node_id, update.responses)
            })
            .collect();
        Ok(SatelliteUpdateResponses {
            responses,
            failures,
        })
    }

    /// Update a single satellite, converting every failure into response
    /// entries. Only logical failures (deployment errors, broken replies)
    /// count towards the deferred error; connectivity problems are warnings.
    async fn update_satellite(
        satellite: SatelliteWrapper,
        changed: ChangedObject,
        policy: NotConnectedPolicy,
    ) -> PeerUpdate {
        let node_id = satellite.id().clone();
        if satellite.is_connected() && satellite.has_full_sync_failed() {
            return PeerUpdate {
                responses: full_sync_failed_warning(&node_id).into(),
                node_id,
                failed: false,
            };
        }

        match satellite.notify_changed(&changed).await {
            Ok(deployment) => {
                let failed = deployment.has_errors();
                if failed {
                    tracing::warn!(node.id = %node_id, "Satellite reported a deployment failure");
                }
                let mut responses = ApiCallRc::new();
                responses.extend_from_node(&node_id, deployment);
                PeerUpdate {
                    node_id,
                    responses,
                    failed,
                }
            }
            Err(SvcError::PeerNotConnected { .. }) => PeerUpdate {
                responses: match policy {
                    NotConnectedPolicy::Warn => not_connected_warning(&node_id).into(),
                    NotConnectedPolicy::Ignore => ApiCallRc::new(),
                },
                node_id,
                failed: false,
            },
            Err(error) => {
                tracing::warn!(
                    node.id = %node_id,
                    error = error.full_string(),
                    "Failed to update satellite"
                );
                PeerUpdate {
                    responses: error
                        .to_api_call_entry()
                        .with_obj_ref("node", node_id.to_string())
                        .into(),
                    node_id,
                    failed: true,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{
        registry::{Registry, RegistryConfig},
        wrapper::test_stubs::StubPeer,
    };
    use futures::StreamExt;
    use stor_port::types::v0::transport::{
        LayerKind, NodeState, NodeStatus, ProviderKind, ResourcePlacement, ResourceSpec, Severity,
        SnapshotSpec, StorPoolSpec,
    };

    async fn add_node(registry: &Registry, node: &str, peer: StubPeer) {
        let state = NodeState::new(
            NodeId::from(node),
            format!("https://{node}:7777"),
            NodeStatus::Online,
            vec![LayerKind::Storage],
        );
        registry.register_node(&state, Box::new(peer)).await;
    }

    fn three_node_resource(registry: &Registry) -> ResourceName {
        let name = ResourceName::from("rsc-1");
        registry.add_resource(ResourceSpec::new(
            name.clone(),
            vec![
                ResourcePlacement::new("node-1", "pool-a"),
                ResourcePlacement::new("node-2", "pool-a"),
                ResourcePlacement::new("node-3", "pool-a"),
            ],
        ));
        name
    }

    #[tokio::test]
    async fn every_target_yields_a_response() {
        let registry = Registry::new(RegistryConfig::default());
        let deployed = ApiCallRc::single(ApiCallEntry::info(RetCode::Applied, "resource applied"));
        add_node(&registry, "node-1", StubPeer::online().with_deployment(deployed)).await;
        add_node(&registry, "node-2", StubPeer::disconnected()).await;
        add_node(&registry, "node-3", StubPeer::full_sync_failed()).await;
        let name = three_node_resource(&registry);

        let updater = SatelliteUpdater::new(&registry);
        let updates = updater.update_resource(&name).await.unwrap();

        let responses = updates.responses();
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0].0, NodeId::from("node-1"));
        assert_eq!(responses[0].1.entries()[0].code, RetCode::Applied);
        assert_eq!(
            responses[0].1.entries()[0].message,
            "(node-1) resource applied"
        );
        assert_eq!(responses[1].1.entries()[0].code, RetCode::NotConnected);
        assert_eq!(responses[2].1.entries()[0].code, RetCode::FullSyncFailed);

        // connectivity problems are warnings, not logical failures
        assert!(updates.ok().is_ok());
    }

    #[tokio::test]
    async fn deferred_error_follows_all_responses() {
        let registry = Registry::new(RegistryConfig::default());
        let failure = ApiCallRc::single(ApiCallEntry::error(
            RetCode::DeploymentFailed,
            "activation failed",
        ));
        add_node(&registry, "node-1", StubPeer::online()).await;
        add_node(&registry, "node-2", StubPeer::online().with_deployment(failure)).await;
        add_node(&registry, "node-3", StubPeer::online()).await;
        let name = three_node_resource(&registry);

        let updater = SatelliteUpdater::new(&registry);
        let updates = updater.update_resource(&name).await.unwrap();
        assert!(matches!(
            updates.ok(),
            Err(SvcError::DelayedApiRc { failures: 1 })
        ));

        let streamed = updates.into_stream().collect::<Vec<_>>().await;
        assert_eq!(streamed.len(), 4);
        for response in &streamed[.. 3] {
            assert!(response.is_ok());
        }
        let entries = streamed[1].as_ref().unwrap().1.entries();
        assert_eq!(entries[0].severity, Severity::Error);
        assert!(matches!(
            streamed[3],
            Err(SvcError::DelayedApiRc { failures: 1 })
        ));
    }

    #[tokio::test]
    async fn transport_failures_count_as_logical_failures() {
        let registry = Registry::new(RegistryConfig::default());
        add_node(&registry, "node-1", StubPeer::online().failing()).await;
        add_node(&registry, "node-2", StubPeer::online()).await;
        registry.add_resource(ResourceSpec::new(
            "rsc-1",
            vec![
                ResourcePlacement::new("node-1", "pool-a"),
                ResourcePlacement::new("node-2", "pool-a"),
            ],
        ));

        let updater = SatelliteUpdater::new(&registry);
        let updates = updater.update_resource(&"rsc-1".into()).await.unwrap();
        assert_eq!(updates.responses().len(), 2);
        assert!(updates.responses()[0].1.has_errors());
        assert!(updates.ok().is_err());
    }

    #[tokio::test]
    async fn stor_pool_updates_contact_the_hosting_node() {
        let registry = Registry::new(RegistryConfig::default());
        add_node(&registry, "node-1", StubPeer::online()).await;
        let key = StorPoolKey::new("node-1", "pool-a");
        registry.add_stor_pool(StorPoolSpec::new(key.clone(), ProviderKind::LvmThin));

        let updater = SatelliteUpdater::new(&registry);
        let updates = updater.update_stor_pool(&key).await.unwrap();
        assert_eq!(updates.responses().len(), 1);
        assert!(updates.ok().is_ok());

        let absent = StorPoolKey::new("node-1", "pool-b");
        let error = updater.update_stor_pool(&absent).await.unwrap_err();
        assert!(matches!(error, SvcError::StorPoolNotFound { .. }));
    }

    #[tokio::test]
    async fn snapshot_updates_honour_the_not_connected_policy() {
        let registry = Registry::new(RegistryConfig::default());
        add_node(&registry, "node-1", StubPeer::disconnected()).await;
        add_node(&registry, "node-2", StubPeer::online()).await;
        registry.add_snapshot(SnapshotSpec::new(
            "rsc-1",
            "snap-1",
            vec![NodeId::from("node-1"), NodeId::from("node-2")],
        ));

        let updater = SatelliteUpdater::new(&registry);
        let updates = updater
            .update_snapshot(&"rsc-1".into(), &"snap-1".into(), NotConnectedPolicy::Ignore)
            .await
            .unwrap();
        assert_eq!(updates.responses().len(), 2);
        assert!(updates.responses()[0].1.is_empty());
        assert!(updates.ok().is_ok());

        let updates = updater
            .update_snapshot(&"rsc-1".into(), &"snap-1".into(), NotConnectedPolicy::Warn)
            .await
            .unwrap();
        assert_eq!(
            updates.responses()[0].1.entries()[0].code,
            RetCode::NotConnected
        );
    }

    #[tokio::test]
    async fn node_updates_reach_the_given_targets() {
        let registry = Registry::new(RegistryConfig::default());
        add_node(&registry, "node-1", StubPeer::online()).await;
        add_node(&registry, "node-2", StubPeer::online()).await;

        let updater = SatelliteUpdater::new(&registry);
        let targets = [NodeId::from("node-1"), NodeId::from("node-2")];
        let updates = updater
            .update_node(uuid::Uuid::new_v4(), &NodeId::from("node-1"), &targets)
            .await
            .unwrap();
        assert_eq!(updates.responses().len(), 2);

        // an unknown target fails the call before any satellite is contacted
        let targets = [NodeId::from("node-1"), NodeId::from("node-9")];
        let error = updater
            .update_node(uuid::Uuid::new_v4(), &NodeId::from("node-1"), &targets)
            .await
            .unwrap_err();
        assert!(matches!(error, SvcError::NodeNotFound { .. }));
    }
}
