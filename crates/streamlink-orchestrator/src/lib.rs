//! streamlink-orchestrator: deploys catalog services with their dependencies.
//!
//! ```text
//!                 ┌──────────────────────┐
//!  plan_deployment│  DeploymentPlanner   │ read-only preview
//!                 └──────────┬───────────┘
//!                            │ InstalledSetTracker (active records)
//!                 ┌──────────▼───────────┐
//!  deploy ───────▶│     Orchestrator     │── KeyedLocks (cluster, service)
//!  delete         │                      │── ClusterConnector ─▶ ClusterExecutor
//!  check_status   │                      │── HealthPoller (wait_ready)
//!                 └──────────┬───────────┘── HookRegistry (postgres, keycloak)
//!                            │
//!                       StateStore
//! ```
//!
//! A deploy installs the missing prerequisites of its target one by one in
//! dependency order, committing a record for each before waiting for it to
//! become ready. Nothing is rolled back on failure; calling `deploy` again
//! picks up where the previous attempt stopped, including a post-install
//! hook that failed on a healthy workload. A delete that lands while a
//! deploy waits wins: the deploy fails with `ConcurrentlyDeleted` instead of
//! reviving the record.
//!
//! [`ClusterMonitor`] keeps each cluster's `up`/`down` status current in
//! the background.

pub mod error;
pub mod hooks;
pub mod locks;
pub mod monitor;
pub mod orchestrator;
pub mod planner;
pub mod tracker;

pub use error::{HookError, HookResult, OrchestratorError, OrchestratorResult};
pub use hooks::{HookContext, HookRegistry, KeycloakHook, PostgresHook, ServiceHook};
pub use locks::{KeyGuard, KeyedLocks};
pub use monitor::ClusterMonitor;
pub use orchestrator::{
    BootstrapReport, ClusterUpdate, DeleteOutcome, DeletePlan, Orchestrator, OrchestratorSettings,
};
pub use planner::{DeploymentPlan, DeploymentPlanner, PlanEntry, PlanState};
pub use tracker::InstalledSetTracker;
