//! Executor traits consumed by the orchestrator.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use streamlink_core::WorkloadSnapshot;
use streamlink_state::ClusterRecord;

use crate::error::ExecutorResult;

/// Where a catalog service ended up after its manifest was applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedService {
    /// Name of the Kubernetes Deployment (and Service) backing it.
    pub deployed_name: String,
    pub namespace: String,
}

/// Operations against one cluster.
#[async_trait]
pub trait ClusterExecutor: Send + Sync {
    /// Apply every document of the catalog entry's manifest. Idempotent.
    async fn apply_service_manifest(&self, catalog_name: &str) -> ExecutorResult<AppliedService>;

    /// Delete the workload and its service. Missing resources are not an error.
    async fn delete_service_resources(
        &self,
        deployed_name: &str,
        namespace: &str,
    ) -> ExecutorResult<()>;

    /// Raw health of a workload, `None` if the Deployment does not exist.
    async fn get_instance_health(
        &self,
        deployed_name: &str,
        namespace: &str,
    ) -> ExecutorResult<Option<WorkloadSnapshot>>;

    /// An address of a cluster node reachable from outside, if any.
    async fn get_node_address(&self) -> ExecutorResult<Option<String>>;

    /// Cheap reachability check against the API server.
    async fn ping(&self) -> ExecutorResult<()>;
}

/// Builds executors for registered clusters.
#[async_trait]
pub trait ClusterConnector: Send + Sync {
    async fn connect(&self, cluster: &ClusterRecord) -> ExecutorResult<Arc<dyn ClusterExecutor>>;
}
