//! streamlink-executor: the boundary between the orchestrator and Kubernetes.
//!
//! The orchestrator only sees the [`ClusterExecutor`] and [`ClusterConnector`]
//! traits. [`KubeConnector`] builds a kube-rs client from a cluster's
//! encrypted kubeconfig and hands out a [`KubeExecutor`] bound to it.
//!
//! ```text
//! ClusterRecord ──connect──▶ KubeExecutor
//!                              ├── apply_service_manifest  (server-side apply of deployments/<name>.yaml)
//!                              ├── delete_service_resources (foreground delete, 404 ignored)
//!                              ├── get_instance_health     (Deployment + pods labelled app=<name>)
//!                              ├── get_node_address        (ExternalIP, then InternalIP)
//!                              └── ping
//! ```
//!
//! Every API call is bounded by the configured request timeout.

pub mod error;
pub mod executor;
pub mod k8s;
pub mod manifest;
pub mod snapshot;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{ExecutorError, ExecutorResult};
pub use executor::{AppliedService, ClusterConnector, ClusterExecutor};
pub use k8s::{KubeConnector, KubeExecutor, KubeSettings};
pub use manifest::{ManifestDocument, ManifestLoader, ServiceManifest};
