//! Orchestrator error types.

use streamlink_core::CatalogError;
use streamlink_executor::ExecutorError;
use streamlink_identity::IdentityError;
use streamlink_secrets::CodecError;
use streamlink_state::{ClusterStatus, StateError};
use thiserror::Error;

/// Errors returned by the orchestrator and the planner.
///
/// Every variant raised during a deploy names the service it concerns, so a
/// caller can tell which link of the dependency chain broke.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("cluster {cluster_id} is not available (status: {status})")]
    ClusterUnavailable {
        cluster_id: String,
        status: ClusterStatus,
    },

    #[error("cluster not found: {0}")]
    ClusterNotFound(String),

    #[error("service not found: {0}")]
    ServiceNotFound(String),

    #[error("service already deployed: {0}")]
    AlreadyDeployed(String),

    #[error("failed to deploy dependency '{service}': {cause}")]
    DependencyDeployFailed {
        service: String,
        #[source]
        cause: ExecutorError,
    },

    #[error("dependency '{0}' did not become ready")]
    DependencyNotReady(String),

    #[error("failed to deploy '{service}': {cause}")]
    TargetDeployFailed {
        service: String,
        #[source]
        cause: ExecutorError,
    },

    #[error("service '{0}' did not become ready")]
    TargetNotReady(String),

    #[error("service '{service}' is required by: {}", .dependents.join(", "))]
    HasDependents {
        service: String,
        dependents: Vec<String>,
    },

    #[error("circular dependency: {}", .0.join(" -> "))]
    CircularDependency(Vec<String>),

    #[error("invalid service catalog: {0}")]
    InvalidCatalog(String),

    #[error("service '{0}' was deleted while the operation was in progress")]
    ConcurrentlyDeleted(String),

    #[error("post-install step for '{service}' failed: {reason}")]
    HookFailed { service: String, reason: String },

    #[error("decryption error: {0}")]
    Decryption(#[from] CodecError),

    #[error("cluster executor error: {0}")]
    Executor(#[from] ExecutorError),

    #[error("state store error: {0}")]
    State(#[from] StateError),
}

impl From<CatalogError> for OrchestratorError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::CircularDependency(path) => Self::CircularDependency(path),
            other => Self::InvalidCatalog(other.to_string()),
        }
    }
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Errors raised inside a service hook. The orchestrator folds them into
/// [`OrchestratorError::HookFailed`] or logs them during teardown.
#[derive(Debug, Error)]
pub enum HookError {
    #[error("missing secret: {0}")]
    MissingSecret(&'static str),

    #[error("cluster has no reachable node address")]
    NoNodeAddress,

    #[error("encryption error: {0}")]
    Codec(#[from] CodecError),

    #[error("identity provider error: {0}")]
    Identity(#[from] IdentityError),

    #[error("cluster executor error: {0}")]
    Executor(#[from] ExecutorError),

    #[error("state store error: {0}")]
    State(#[from] StateError),
}

pub type HookResult<T> = Result<T, HookError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_cycle_maps_to_circular_dependency() {
        let err: OrchestratorError =
            CatalogError::CircularDependency(vec!["a".into(), "b".into(), "a".into()]).into();
        assert!(matches!(&err, OrchestratorError::CircularDependency(p) if p.len() == 3));
        assert_eq!(err.to_string(), "circular dependency: a -> b -> a");

        let err: OrchestratorError = CatalogError::Duplicate("a".into()).into();
        assert!(matches!(err, OrchestratorError::InvalidCatalog(_)));
    }

    #[test]
    fn has_dependents_lists_names() {
        let err = OrchestratorError::HasDependents {
            service: "kafka".into(),
            dependents: vec!["kafka-connect".into(), "schema-registry".into()],
        };
        assert_eq!(
            err.to_string(),
            "service 'kafka' is required by: kafka-connect, schema-registry"
        );
    }
}
