use crate::errors::{RequestSerialiseSnafu, ResponseDeserialiseSnafu, SvcError};
use stor_port::types::v0::transport::{
    ApiCallRc, ChangedObject, DeploymentReply, InternalRpc, NodeId, NodeState, NodeStatus,
    ThinFreeSpaceReport,
};

use async_trait::async_trait;
use dyn_clonable::clonable;
use snafu::ResultExt;
use std::fmt::Debug;

/// Timeouts for network communication with a node's satellite.
#[derive(Debug, Clone)]
pub struct NodeCommsTimeout {
    request: std::time::Duration,
}

impl NodeCommsTimeout {
    /// Return a new `Self` with the given request timeout.
    pub fn new(request: std::time::Duration) -> Self {
        Self { request }
    }
    /// Timeout for a request/reply exchange with the satellite.
    pub fn request(&self) -> std::time::Duration {
        self.request
    }
}

/// Transport handle to a node's satellite. Implementations wrap the actual
/// wire client; the controller only depends on this seam.
#[async_trait]
#[clonable]
pub trait PeerConnection: Clone + Debug + Send + Sync {
    /// Is the satellite currently connected.
    fn is_connected(&self) -> bool;
    /// Did the satellite fail its last full sync. Such a satellite must not
    /// receive incremental updates until it reconnects and resyncs.
    fn has_full_sync_failed(&self) -> bool;
    /// Issue an internal api call and collect the raw reply payload.
    /// Fails with `SvcError::PeerNotConnected` when the connection is lost
    /// mid-flight.
    async fn api_call(&self, rpc: InternalRpc, payload: Vec<u8>) -> Result<Vec<u8>, SvcError>;
}

/// Wrapper over a node's `NodeState` plus the connection to its satellite.
/// All satellite requests of the controller go through here, which keeps the
/// request timeout and payload codec in one place.
#[derive(Debug, Clone)]
pub struct SatelliteWrapper {
    /// Inner node state.
    node_state: NodeState,
    /// Node communication timeouts.
    comms_timeouts: NodeCommsTimeout,
    /// Connection to the node's satellite.
    peer: Box<dyn PeerConnection>,
}

impl SatelliteWrapper {
    /// Create a new wrapper for a node with its satellite connection.
    pub fn new(
        node: &NodeState,
        peer: Box<dyn PeerConnection>,
        comms_timeouts: NodeCommsTimeout,
    ) -> Self {
        tracing::debug!(node.id = %node.id(), "Creating new node");
        Self {
            node_state: node.clone(),
            comms_timeouts,
            peer,
        }
    }

    /// Get the node identification.
    pub fn id(&self) -> &NodeId {
        self.node_state.id()
    }
    /// Get the inner node state.
    pub fn node_state(&self) -> &NodeState {
        &self.node_state
    }
    /// Set the deemed node status.
    pub fn set_status(&mut self, status: NodeStatus) {
        self.node_state.status = status;
    }
    /// Is the node deemed online.
    pub fn is_online(&self) -> bool {
        self.node_state.is_online()
    }
    /// Is the satellite connected.
    pub fn is_connected(&self) -> bool {
        self.peer.is_connected()
    }
    /// Did the satellite fail its last full sync.
    pub fn has_full_sync_failed(&self) -> bool {
        self.peer.has_full_sync_failed()
    }

    /// Notify the satellite of a changed object and collect its deployment
    /// responses.
    pub async fn notify_changed(
        &self,
        changed: &ChangedObject,
    ) -> Result<ApiCallRc, SvcError> {
        let payload = serde_json::to_vec(changed).context(RequestSerialiseSnafu {
            node_id: self.id().clone(),
        })?;
        let reply = self.api_call(changed.rpc(), payload).await?;
        let reply: DeploymentReply =
            serde_json::from_slice(&reply).context(ResponseDeserialiseSnafu {
                node_id: self.id().clone(),
            })?;
        Ok(reply.responses)
    }

    /// Request the satellite's thin pool free space report.
    pub async fn request_thin_free_space(&self) -> Result<ThinFreeSpaceReport, SvcError> {
        let reply = self
            .api_call(InternalRpc::RequestThinFreeSpace, vec![])
            .await?;
        serde_json::from_slice(&reply).context(ResponseDeserialiseSnafu {
            node_id: self.id().clone(),
        })
    }

    /// Issue a raw api call under the node request timeout.
    async fn api_call(&self, rpc: InternalRpc, payload: Vec<u8>) -> Result<Vec<u8>, SvcError> {
        let timeout = self.comms_timeouts.request();
        match tokio::time::timeout(timeout, self.peer.api_call(rpc, payload)).await {
            Ok(result) => result,
            Err(_) => Err(SvcError::RequestTimeout {
                node_id: self.id().clone(),
                request: rpc.to_string(),
                timeout,
            }),
        }
    }
}

/// Satellite connection stubs for exercising the fan-out paths without a
/// transport underneath.
#[cfg(test)]
pub mod test_stubs {
    use super::*;
    use stor_port::{
        transport_api::ResourceKind,
        types::v0::transport::{LayerKind, StorPoolFreeSpace},
    };

    /// A scriptable `PeerConnection`.
    #[derive(Debug, Clone, Default)]
    pub struct StubPeer {
        connected: bool,
        full_sync_failed: bool,
        fail_call: bool,
        deployment: ApiCallRc,
        free_space: ThinFreeSpaceReport,
    }

    impl StubPeer {
        /// A connected peer replying with empty responses.
        pub fn online() -> Self {
            Self {
                connected: true,
                ..Default::default()
            }
        }
        /// A peer which is not connected.
        pub fn disconnected() -> Self {
            Self::default()
        }
        /// A connected peer whose last full sync failed.
        pub fn full_sync_failed() -> Self {
            Self {
                connected: true,
                full_sync_failed: true,
                ..Default::default()
            }
        }
        /// Fail every api call with an internal transport error.
        pub fn failing(mut self) -> Self {
            self.fail_call = true;
            self
        }
        /// Reply to change notifications with the given responses.
        pub fn with_deployment(mut self, responses: ApiCallRc) -> Self {
            self.deployment = responses;
            self
        }
        /// Reply to free space requests with the given report.
        pub fn with_free_space(mut self, pools: Vec<StorPoolFreeSpace>) -> Self {
            self.free_space = ThinFreeSpaceReport { pools };
            self
        }
    }

    #[async_trait]
    impl PeerConnection for StubPeer {
        fn is_connected(&self) -> bool {
            self.connected
        }
        fn has_full_sync_failed(&self) -> bool {
            self.full_sync_failed
        }
        async fn api_call(
            &self,
            rpc: InternalRpc,
            _payload: Vec<u8>,
        ) -> Result<Vec<u8>, SvcError> {
            if !self.connected {
                return Err(SvcError::PeerNotConnected {
                    node_id: NodeId::from("stub"),
                });
            }
            if self.fail_call {
                return Err(SvcError::GrpcRequestError {
                    resource: ResourceKind::Node,
                    request: rpc.to_string(),
                    source: tonic::Status::internal("stubbed failure"),
                });
            }
            let payload = match rpc {
                InternalRpc::RequestThinFreeSpace => serde_json::to_vec(&self.free_space),
                _ => serde_json::to_vec(&DeploymentReply {
                    responses: self.deployment.clone(),
                }),
            };
            Ok(payload.expect("stub payloads serialise"))
        }
    }

    /// A wrapper around a stub peer for an online node.
    pub fn stub_wrapper(node_id: &str, peer: StubPeer) -> SatelliteWrapper {
        let state = NodeState::new(
            NodeId::from(node_id),
            format!("https://{node_id}:7777"),
            NodeStatus::Online,
            vec![LayerKind::Storage, LayerKind::Drbd],
        );
        SatelliteWrapper::new(
            &state,
            Box::new(peer),
            NodeCommsTimeout::new(std::time::Duration::from_secs(1)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{test_stubs::stub_wrapper, test_stubs::StubPeer, *};
    use stor_port::types::v0::transport::{ApiCallEntry, RetCode};

    #[tokio::test]
    async fn change_notifications_decode_deployment_replies() {
        let responses = ApiCallRc::single(ApiCallEntry::info(RetCode::Applied, "resource up"));
        let wrapper = stub_wrapper("node-1", StubPeer::online().with_deployment(responses.clone()));
        let changed = ChangedObject::resource(uuid::Uuid::new_v4(), &"rsc-1".into());
        assert_eq!(wrapper.notify_changed(&changed).await.unwrap(), responses);
    }

    #[tokio::test]
    async fn disconnected_peers_fail_with_not_connected() {
        let wrapper = stub_wrapper("node-1", StubPeer::disconnected());
        let changed = ChangedObject::node(uuid::Uuid::new_v4(), &NodeId::from("node-1"));
        let error = wrapper.notify_changed(&changed).await.unwrap_err();
        assert!(matches!(error, SvcError::PeerNotConnected { .. }));
    }
}
