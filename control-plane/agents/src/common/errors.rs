use snafu::Snafu;
use stor_port::{
    transport_api::{ErrorChain, ReplyError, ReplyErrorKind, ResourceKind},
    types::v0::transport::{ApiCallEntry, NodeId, ResourceName, RetCode, StorPoolKey},
};

/// Common error type for controller-side service operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
#[allow(missing_docs)]
pub enum SvcError {
    #[snafu(display("Node '{}' not found", node_id))]
    NodeNotFound { node_id: NodeId },
    #[snafu(display("Node '{}' is not online", node_id))]
    NodeNotOnline { node_id: NodeId },
    #[snafu(display("Storage pool '{}' not found", key))]
    StorPoolNotFound { key: StorPoolKey },
    #[snafu(display("Resource '{}' not found", name))]
    ResourceNotFound { name: ResourceName },
    #[snafu(display("Satellite of node '{}' is not connected", node_id))]
    PeerNotConnected { node_id: NodeId },
    #[snafu(display(
        "Internal request '{}' for '{}' failed with '{}'",
        request,
        resource.to_string(),
        source
    ))]
    GrpcRequestError {
        resource: ResourceKind,
        request: String,
        source: tonic::Status,
    },
    #[snafu(display(
        "Timed out after '{:?}' waiting for node '{}' to reply to '{}'",
        timeout,
        node_id,
        request
    ))]
    RequestTimeout {
        node_id: NodeId,
        request: String,
        timeout: std::time::Duration,
    },
    #[snafu(display("Failed to serialise the request payload for node '{}'", node_id))]
    RequestSerialise {
        node_id: NodeId,
        source: serde_json::Error,
    },
    #[snafu(display("Failed to deserialise the reply of node '{}'", node_id))]
    ResponseDeserialise {
        node_id: NodeId,
        source: serde_json::Error,
    },
    #[snafu(display("Invalid filter value: {}", reason))]
    InvalidFilter { reason: String },
    #[snafu(display("Replica count is required for this operation"))]
    ReplicaCountRequired {},
    #[snafu(display("Not enough suitable nodes available for the requested placement"))]
    NotEnoughNodes {},
    #[snafu(display("Access to '{}' was denied", context))]
    AccessDenied { context: String },
    #[snafu(display("{} satellite(s) reported a failure, converted to responses", failures))]
    DelayedApiRc { failures: usize },
}

impl From<SvcError> for ReplyError {
    fn from(error: SvcError) -> Self {
        let desc = error.to_string();
        let error_str = error.full_string();
        match error {
            SvcError::NodeNotFound { .. } => ReplyError {
                kind: ReplyErrorKind::NotFound,
                resource: ResourceKind::Node,
                source: desc.to_string(),
                extra: error_str,
            },
            SvcError::NodeNotOnline { .. } => ReplyError {
                kind: ReplyErrorKind::FailedPrecondition,
                resource: ResourceKind::Node,
                source: desc.to_string(),
                extra: error_str,
            },
            SvcError::StorPoolNotFound { .. } => ReplyError {
                kind: ReplyErrorKind::NotFound,
                resource: ResourceKind::StorPool,
                source: desc.to_string(),
                extra: error_str,
            },
            SvcError::ResourceNotFound { .. } => ReplyError {
                kind: ReplyErrorKind::NotFound,
                resource: ResourceKind::ResourceDefinition,
                source: desc.to_string(),
                extra: error_str,
            },
            SvcError::PeerNotConnected { .. } => ReplyError {
                kind: ReplyErrorKind::Unavailable,
                resource: ResourceKind::Node,
                source: desc.to_string(),
                extra: error_str,
            },
            SvcError::GrpcRequestError {
                source, resource, ..
            } => ReplyError {
                kind: source.code().into(),
                resource,
                source: desc.to_string(),
                extra: source.to_string(),
            },
            SvcError::RequestTimeout { .. } => ReplyError {
                kind: ReplyErrorKind::DeadlineExceeded,
                resource: ResourceKind::Node,
                source: desc.to_string(),
                extra: error_str,
            },
            SvcError::RequestSerialise { source, .. } => ReplyError {
                kind: ReplyErrorKind::Internal,
                resource: ResourceKind::Node,
                source: desc.to_string(),
                extra: source.to_string(),
            },
            SvcError::ResponseDeserialise { source, .. } => ReplyError {
                kind: ReplyErrorKind::DeserializeReq,
                resource: ResourceKind::Node,
                source: desc.to_string(),
                extra: source.to_string(),
            },
            SvcError::InvalidFilter { .. } => ReplyError {
                kind: ReplyErrorKind::InvalidArgument,
                resource: ResourceKind::StorPool,
                source: desc.to_string(),
                extra: error_str,
            },
            SvcError::ReplicaCountRequired { .. } => ReplyError {
                kind: ReplyErrorKind::InvalidArgument,
                resource: ResourceKind::ResourceDefinition,
                source: desc.to_string(),
                extra: error_str,
            },
            SvcError::NotEnoughNodes { .. } => ReplyError {
                kind: ReplyErrorKind::ResourceExhausted,
                resource: ResourceKind::StorPool,
                source: desc.to_string(),
                extra: error_str,
            },
            SvcError::AccessDenied { .. } => ReplyError {
                kind: ReplyErrorKind::PermissionDenied,
                resource: ResourceKind::Unknown,
                source: desc.to_string(),
                extra: error_str,
            },
            SvcError::DelayedApiRc { .. } => ReplyError {
                kind: ReplyErrorKind::Aborted,
                resource: ResourceKind::Unknown,
                source: desc.to_string(),
                extra: error_str,
            },
        }
    }
}

impl SvcError {
    /// A response entry carrying the user-facing shape of this error, for the
    /// query surfaces which reply with entry lists rather than bare errors.
    pub fn to_api_call_entry(&self) -> ApiCallEntry {
        match self {
            SvcError::ReplicaCountRequired {} => {
                ApiCallEntry::error(RetCode::InvalidPlaceCount, self.to_string())
            }
            SvcError::NotEnoughNodes {} => {
                ApiCallEntry::error(RetCode::NotEnoughNodes, self.to_string())
            }
            other => ApiCallEntry::error(RetCode::DeploymentFailed, other.to_string())
                .with_details(other.full_string()),
        }
    }
}
