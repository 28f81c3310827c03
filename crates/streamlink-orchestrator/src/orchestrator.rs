//! Orchestrator: dependency-ordered deploys and cascading deletes.
//!
//! Deploys install every missing prerequisite of the target, one at a time
//! and in dependency order, waiting for each to become ready before moving
//! on. Progress is committed record by record and never rolled back, so a
//! failed deploy is resumed by calling `deploy` again.
//!
//! Deletes are database-first: records are soft-deleted in one transaction
//! before any cluster resource is touched, and cluster teardown failures are
//! recorded on the records instead of being raised.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use streamlink_core::config::DeployConfig;
use streamlink_core::{HealthStatus, ServiceCatalog, ServiceHealth};
use streamlink_executor::{ClusterConnector, ClusterExecutor, ExecutorError};
use streamlink_health::HealthPoller;
use streamlink_state::*;
use tracing::{debug, error, info, warn};

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::hooks::{HookContext, HookRegistry};
use crate::locks::KeyedLocks;
use crate::planner::{DeploymentPlan, DeploymentPlanner};
use crate::tracker::InstalledSetTracker;

/// Timing knobs for readiness polling.
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorSettings {
    pub poll_interval: Duration,
    pub ready_timeout: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            ready_timeout: Duration::from_secs(300),
        }
    }
}

impl From<&DeployConfig> for OrchestratorSettings {
    fn from(config: &DeployConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            ready_timeout: config.ready_timeout(),
        }
    }
}

/// What a delete would remove, in the order it would remove it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletePlan {
    pub cluster_id: String,
    pub target: DeployedServiceRecord,
    /// Installed services that depend on the target, most dependent first.
    pub dependents: Vec<String>,
    /// A plain delete would be refused.
    pub requires_cascade: bool,
}

/// Result of a delete. Records are in removal order, target last, each with
/// its `teardown` outcome filled in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteOutcome {
    pub deleted: Vec<DeployedServiceRecord>,
}

impl DeleteOutcome {
    pub fn teardown_failures(&self) -> impl Iterator<Item = &DeployedServiceRecord> {
        self.deleted
            .iter()
            .filter(|r| matches!(r.teardown, Some(TeardownOutcome::Failed { .. })))
    }
}

/// New connection details for a registered cluster. `None` and empty
/// strings leave a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct ClusterUpdate {
    pub name: Option<String>,
    pub api_server: Option<String>,
    /// Kubeconfig already encrypted with the secret codec.
    pub kubeconfig: Option<String>,
}

/// Progress of the move from the embedded store to the managed Postgres.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapReport {
    pub postgres_deployed: bool,
    pub keycloak_deployed: bool,
    pub migration_complete: bool,
    /// Postgres is deployed, answering as running, and not migrated to yet.
    pub ready_for_migration: bool,
    pub auth_enabled: bool,
}

#[derive(Debug, Clone, Copy)]
enum Stage {
    Dependency,
    Target,
}

impl Stage {
    fn deploy_failed(self, service: &str, cause: ExecutorError) -> OrchestratorError {
        let service = service.to_string();
        match self {
            Self::Dependency => OrchestratorError::DependencyDeployFailed { service, cause },
            Self::Target => OrchestratorError::TargetDeployFailed { service, cause },
        }
    }

    fn not_ready(self, service: &str) -> OrchestratorError {
        let service = service.to_string();
        match self {
            Self::Dependency => OrchestratorError::DependencyNotReady(service),
            Self::Target => OrchestratorError::TargetNotReady(service),
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Dependency => "dependency",
            Self::Target => "target",
        })
    }
}

/// What a deploy finds for one service.
enum Existing {
    /// No active record, or a `failed` one: apply the manifest.
    Missing,
    /// Running, but the post-install hook has not completed.
    HookPending(DeployedServiceRecord),
    Settled,
}

pub struct Orchestrator {
    catalog: Arc<ServiceCatalog>,
    state: StateStore,
    connector: Arc<dyn ClusterConnector>,
    tracker: InstalledSetTracker,
    planner: DeploymentPlanner,
    poller: HealthPoller,
    hooks: HookRegistry,
    locks: KeyedLocks,
    ready_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        catalog: Arc<ServiceCatalog>,
        state: StateStore,
        connector: Arc<dyn ClusterConnector>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            tracker: InstalledSetTracker::new(state.clone()),
            planner: DeploymentPlanner::new(catalog.clone(), state.clone()),
            poller: HealthPoller::new(settings.poll_interval),
            hooks: HookRegistry::new(),
            locks: KeyedLocks::new(),
            ready_timeout: settings.ready_timeout,
            catalog,
            state,
            connector,
        }
    }

    pub fn with_hooks(mut self, hooks: HookRegistry) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn catalog(&self) -> &ServiceCatalog {
        &self.catalog
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    // ── Deploy ─────────────────────────────────────────────────────

    /// Preview a deploy. Nothing is written.
    pub fn plan_deployment(
        &self,
        cluster_id: &str,
        catalog_name: &str,
    ) -> OrchestratorResult<DeploymentPlan> {
        self.planner.plan(cluster_id, catalog_name)
    }

    /// Deploy `catalog_name` and whatever it needs that is not installed yet.
    ///
    /// Calls for the same cluster and service are serialized. A dependency
    /// whose active record is `failed` is reinstalled, one whose post-install
    /// hook never completed gets only its hook re-run, and one in any other
    /// state is left alone.
    pub async fn deploy(
        &self,
        cluster_id: &str,
        catalog_name: &str,
    ) -> OrchestratorResult<DeployedServiceRecord> {
        if !self.catalog.contains(catalog_name) {
            return Err(OrchestratorError::ServiceNotFound(catalog_name.to_string()));
        }
        let cluster = self.require_cluster_up(cluster_id)?;

        let _target_guard = self.locks.acquire(cluster_id, catalog_name).await;
        if let Existing::Settled = self.existing(cluster_id, catalog_name)? {
            return Err(OrchestratorError::AlreadyDeployed(catalog_name.to_string()));
        }

        let installed = self.tracker.usable_catalog_names(cluster_id)?;
        let missing = self.catalog.missing_dependencies(catalog_name, &installed);
        info!(
            %cluster_id,
            service = %catalog_name,
            missing = ?missing,
            "deploying service"
        );

        let executor = self.connect(&cluster).await?;

        for dep in &missing {
            let _dep_guard = self.locks.acquire(cluster_id, dep).await;
            self.ensure(executor.as_ref(), cluster_id, dep, Stage::Dependency)
                .await?;
        }

        let record = self
            .ensure(executor.as_ref(), cluster_id, catalog_name, Stage::Target)
            .await?
            .ok_or_else(|| OrchestratorError::AlreadyDeployed(catalog_name.to_string()))?;
        info!(%cluster_id, service = %catalog_name, id = %record.id, "service deployed");
        Ok(record)
    }

    /// Bring one service to a settled state. Returns `None` if it already
    /// was. The caller holds the service's lock.
    async fn ensure(
        &self,
        executor: &dyn ClusterExecutor,
        cluster_id: &str,
        catalog_name: &str,
        stage: Stage,
    ) -> OrchestratorResult<Option<DeployedServiceRecord>> {
        match self.existing(cluster_id, catalog_name)? {
            Existing::Settled => {
                debug!(%cluster_id, service = %catalog_name, "installed concurrently, skipping");
                Ok(None)
            }
            Existing::HookPending(record) => {
                info!(%cluster_id, service = %catalog_name, id = %record.id, "resuming post-install hook");
                self.run_hook(executor, cluster_id, catalog_name, record)
                    .await
                    .map(Some)
            }
            Existing::Missing => {
                self.retire_failed(cluster_id, catalog_name)?;
                self.install(executor, cluster_id, catalog_name, stage)
                    .await
                    .map(Some)
            }
        }
    }

    /// Apply, record, wait for readiness, run the hook.
    ///
    /// The record is only inserted while every prerequisite is still active,
    /// and every later write is refused once a concurrent delete has
    /// deactivated it.
    async fn install(
        &self,
        executor: &dyn ClusterExecutor,
        cluster_id: &str,
        catalog_name: &str,
        stage: Stage,
    ) -> OrchestratorResult<DeployedServiceRecord> {
        info!(%cluster_id, service = %catalog_name, %stage, "applying service manifest");
        let applied = executor
            .apply_service_manifest(catalog_name)
            .await
            .map_err(|cause| {
                error!(%cluster_id, service = %catalog_name, %stage, error = %cause, "apply failed");
                stage.deploy_failed(catalog_name, cause)
            })?;

        let mut record = DeployedServiceRecord::deploying(
            cluster_id,
            catalog_name,
            self.catalog.display_name(catalog_name),
            &applied.deployed_name,
            &applied.namespace,
        );
        let prerequisites = self.catalog.all_dependencies(catalog_name);
        self.state
            .insert_active_service_requiring(&record, &prerequisites)
            .map_err(|e| match e {
                StateError::Conflict(_) => {
                    OrchestratorError::AlreadyDeployed(catalog_name.to_string())
                }
                StateError::Inactive(prerequisite) => {
                    warn!(%cluster_id, service = %catalog_name, %prerequisite, "prerequisite deleted during deploy");
                    OrchestratorError::ConcurrentlyDeleted(prerequisite)
                }
                other => other.into(),
            })?;

        let ready = self
            .poller
            .wait_ready(
                executor,
                &applied.deployed_name,
                &applied.namespace,
                self.ready_timeout,
            )
            .await;

        let now = epoch_secs();
        record.last_checked = Some(now);
        record.updated_at = now;
        if !ready {
            record.status = ServiceStatus::Failed;
            self.update_active(&record)?;
            warn!(%cluster_id, service = %catalog_name, %stage, "service did not become ready");
            return Err(stage.not_ready(catalog_name));
        }
        record.status = ServiceStatus::Running;
        record.hook_pending = self.hooks.get(catalog_name).is_some();
        self.update_active(&record)?;

        if record.hook_pending {
            record = self
                .run_hook(executor, cluster_id, catalog_name, record)
                .await?;
        }

        info!(%cluster_id, service = %catalog_name, %stage, deployed_name = %record.deployed_name, "service running");
        Ok(record)
    }

    /// Run the post-install hook of a running service and clear its
    /// `hook_pending` marker. On failure the stored record keeps the marker
    /// so the next deploy tries again.
    async fn run_hook(
        &self,
        executor: &dyn ClusterExecutor,
        cluster_id: &str,
        catalog_name: &str,
        mut record: DeployedServiceRecord,
    ) -> OrchestratorResult<DeployedServiceRecord> {
        if let Some(hook) = self.hooks.get(catalog_name) {
            let ctx = HookContext {
                cluster_id,
                executor,
                state: &self.state,
            };
            if let Err(e) = hook.on_running(&ctx, &mut record).await {
                error!(%cluster_id, service = %catalog_name, error = %e, "post-install hook failed");
                return Err(OrchestratorError::HookFailed {
                    service: catalog_name.to_string(),
                    reason: e.to_string(),
                });
            }
        }
        record.hook_pending = false;
        record.updated_at = epoch_secs();
        self.update_active(&record)?;
        Ok(record)
    }

    // ── Delete ─────────────────────────────────────────────────────

    /// What `delete` would remove. Nothing is written.
    pub fn delete_plan(&self, cluster_id: &str, catalog_name: &str) -> OrchestratorResult<DeletePlan> {
        self.require_cluster(cluster_id)?;
        let target = self.require_active(cluster_id, catalog_name)?;
        let dependents = self.installed_dependents(cluster_id, catalog_name)?;
        Ok(DeletePlan {
            cluster_id: cluster_id.to_string(),
            requires_cascade: !dependents.is_empty(),
            dependents,
            target,
        })
    }

    /// Remove a service, and with `cascade` everything installed that
    /// depends on it.
    ///
    /// The cluster does not have to be reachable: once the soft-delete has
    /// committed the call succeeds, and cluster cleanup problems are only
    /// reported through each record's `teardown` outcome.
    pub async fn delete(
        &self,
        cluster_id: &str,
        catalog_name: &str,
        cascade: bool,
    ) -> OrchestratorResult<DeleteOutcome> {
        let cluster = self.require_cluster(cluster_id)?;
        let _guard = self.locks.acquire(cluster_id, catalog_name).await;
        let target = self.require_active(cluster_id, catalog_name)?;

        let dependents = self.installed_dependents(cluster_id, catalog_name)?;
        if !dependents.is_empty() && !cascade {
            return Err(OrchestratorError::HasDependents {
                service: catalog_name.to_string(),
                dependents,
            });
        }

        let mut ids = Vec::with_capacity(dependents.len() + 1);
        for name in &dependents {
            if let Some(record) = self.state.get_active_service(cluster_id, name)? {
                ids.push(record.id);
            }
        }
        ids.push(target.id);
        let deleted = self.state.soft_delete_services(&ids)?;
        info!(
            %cluster_id,
            service = %catalog_name,
            cascade,
            removed = ?deleted.iter().map(|r| r.catalog_key()).collect::<Vec<_>>(),
            "services marked deleted"
        );

        let executor = match self.connector.connect(&cluster).await {
            Ok(executor) => Ok(executor),
            Err(e) => {
                warn!(%cluster_id, error = %e, "cannot reach cluster for teardown");
                Err(e.to_string())
            }
        };

        let mut outcome = DeleteOutcome {
            deleted: Vec::with_capacity(deleted.len()),
        };
        for mut record in deleted {
            let result = match &executor {
                Ok(executor) => self.teardown(executor.as_ref(), &record).await,
                Err(reason) => TeardownOutcome::Failed {
                    reason: format!("cluster unreachable: {reason}"),
                },
            };
            record.teardown = Some(result);
            record.updated_at = epoch_secs();
            if let Err(e) = self.state.put_service(&record) {
                error!(id = %record.id, error = %e, "failed to record teardown outcome");
            }
            outcome.deleted.push(record);
        }
        Ok(outcome)
    }

    /// Hook, then cluster resources. Errors are logged and folded into the
    /// outcome.
    async fn teardown(
        &self,
        executor: &dyn ClusterExecutor,
        record: &DeployedServiceRecord,
    ) -> TeardownOutcome {
        let service = record.catalog_key();
        let mut failures = Vec::new();

        if let Some(hook) = self.hooks.get(service) {
            let ctx = HookContext {
                cluster_id: &record.cluster_id,
                executor,
                state: &self.state,
            };
            if let Err(e) = hook.on_teardown(&ctx, record).await {
                warn!(cluster_id = %record.cluster_id, %service, error = %e, "teardown hook failed");
                failures.push(format!("teardown hook: {e}"));
            }
        }

        match executor
            .delete_service_resources(&record.deployed_name, &record.namespace)
            .await
        {
            Ok(()) => {
                info!(cluster_id = %record.cluster_id, %service, deployed_name = %record.deployed_name, "cluster resources deleted");
            }
            Err(e) => {
                warn!(cluster_id = %record.cluster_id, %service, error = %e, "failed to delete cluster resources");
                failures.push(format!("delete resources: {e}"));
            }
        }

        if failures.is_empty() {
            TeardownOutcome::Complete
        } else {
            TeardownOutcome::Failed {
                reason: failures.join("; "),
            }
        }
    }

    // ── Status ─────────────────────────────────────────────────────

    /// Classify the workload once and store the result on its record.
    pub async fn check_status(
        &self,
        cluster_id: &str,
        catalog_name: &str,
    ) -> OrchestratorResult<ServiceHealth> {
        let cluster = self.require_cluster(cluster_id)?;
        let mut record = self.require_active(cluster_id, catalog_name)?;
        let executor = self.connect(&cluster).await?;

        let health = self
            .poller
            .check(executor.as_ref(), &record.deployed_name, &record.namespace)
            .await?;

        let now = epoch_secs();
        record.status = health.status.into();
        record.replicas = Some(health.replicas.clone());
        record.last_checked = Some(now);
        record.updated_at = now;
        self.update_active(&record)?;
        debug!(%cluster_id, service = %catalog_name, status = %health.status, replicas = %health.replicas, "status checked");
        Ok(health)
    }

    /// Ping the cluster and persist whether it answered.
    pub async fn check_cluster(&self, cluster_id: &str) -> OrchestratorResult<ClusterStatus> {
        let mut cluster = self.require_cluster(cluster_id)?;
        let reachable = match self.connector.connect(&cluster).await {
            Ok(executor) => executor.ping().await,
            Err(ExecutorError::Decryption(e)) => return Err(OrchestratorError::Decryption(e)),
            Err(e) => Err(e),
        };

        let now = epoch_secs();
        cluster.status = match reachable {
            Ok(()) => ClusterStatus::Up,
            Err(e) => {
                warn!(%cluster_id, error = %e, "cluster unreachable");
                ClusterStatus::Down
            }
        };
        cluster.last_checked = Some(now);
        cluster.updated_at = now;
        self.state.put_cluster(&cluster)?;
        info!(%cluster_id, status = %cluster.status, "cluster checked");
        Ok(cluster.status)
    }

    // ── Clusters ───────────────────────────────────────────────────

    pub fn cluster(&self, cluster_id: &str) -> OrchestratorResult<ClusterRecord> {
        self.require_cluster(cluster_id)
    }

    /// Apply `update` to a cluster. Changing the API server or kubeconfig
    /// resets its status to `unknown` until the next check.
    pub fn update_cluster(
        &self,
        cluster_id: &str,
        update: ClusterUpdate,
    ) -> OrchestratorResult<ClusterRecord> {
        let mut cluster = self.require_cluster(cluster_id)?;
        let given = |v: Option<String>| v.filter(|v| !v.is_empty());

        if let Some(name) = given(update.name) {
            cluster.name = name;
        }
        let mut reconnect = false;
        if let Some(api_server) = given(update.api_server) {
            reconnect |= api_server != cluster.api_server;
            cluster.api_server = api_server;
        }
        if let Some(kubeconfig) = given(update.kubeconfig) {
            cluster.kubeconfig = kubeconfig;
            reconnect = true;
        }
        if reconnect {
            cluster.status = ClusterStatus::Unknown;
        }
        cluster.updated_at = epoch_secs();
        self.state.put_cluster(&cluster)?;
        info!(%cluster_id, name = %cluster.name, reconnect, "cluster updated");
        Ok(cluster)
    }

    /// Soft-deactivate a cluster. Its service records are left as they are
    /// and nothing is deployed to it afterwards.
    pub fn deactivate_cluster(&self, cluster_id: &str) -> OrchestratorResult<ClusterRecord> {
        let cluster = self.state.deactivate_cluster(cluster_id).map_err(|e| match e {
            StateError::NotFound(_) => OrchestratorError::ClusterNotFound(cluster_id.to_string()),
            other => other.into(),
        })?;
        info!(%cluster_id, name = %cluster.name, "cluster deactivated");
        Ok(cluster)
    }

    // ── Bootstrap ──────────────────────────────────────────────────

    /// Bootstrap flags plus what the active cluster currently shows.
    /// Cluster problems only make `ready_for_migration` false.
    pub async fn bootstrap_report(&self) -> OrchestratorResult<BootstrapReport> {
        let flags = self.state.bootstrap_state()?;
        let cluster = self
            .state
            .list_clusters()?
            .into_iter()
            .find(|c| c.is_active);

        let mut report = BootstrapReport {
            postgres_deployed: flags.postgres_deployed,
            keycloak_deployed: false,
            migration_complete: flags.migration_complete,
            ready_for_migration: false,
            auth_enabled: flags.auth_enabled,
        };
        let Some(cluster) = cluster else {
            return Ok(report);
        };

        let installed = self.tracker.installed_catalog_names(&cluster.id)?;
        report.keycloak_deployed = installed.contains("keycloak");
        if flags.postgres_deployed && !flags.migration_complete {
            report.ready_for_migration = self.postgres_running(&cluster).await?;
        }
        Ok(report)
    }

    async fn postgres_running(&self, cluster: &ClusterRecord) -> OrchestratorResult<bool> {
        let Some(postgres) = self.state.get_active_service(&cluster.id, "postgres")? else {
            return Ok(false);
        };
        let executor = match self.connector.connect(cluster).await {
            Ok(executor) => executor,
            Err(e) => {
                warn!(cluster_id = %cluster.id, error = %e, "cannot reach cluster for postgres check");
                return Ok(false);
            }
        };
        match self
            .poller
            .check(executor.as_ref(), &postgres.deployed_name, &postgres.namespace)
            .await
        {
            Ok(health) => Ok(health.status == HealthStatus::Running),
            Err(e) => {
                warn!(cluster_id = %cluster.id, error = %e, "postgres health check failed");
                Ok(false)
            }
        }
    }

    // ── Internal helpers ───────────────────────────────────────────

    fn require_cluster(&self, cluster_id: &str) -> OrchestratorResult<ClusterRecord> {
        self.state
            .get_cluster(cluster_id)?
            .ok_or_else(|| OrchestratorError::ClusterNotFound(cluster_id.to_string()))
    }

    /// Deploys only go to an active cluster that answered its last check.
    fn require_cluster_up(&self, cluster_id: &str) -> OrchestratorResult<ClusterRecord> {
        let cluster = self.require_cluster(cluster_id)?;
        if !cluster.is_active {
            return Err(OrchestratorError::ClusterNotFound(cluster_id.to_string()));
        }
        if cluster.status != ClusterStatus::Up {
            return Err(OrchestratorError::ClusterUnavailable {
                cluster_id: cluster_id.to_string(),
                status: cluster.status,
            });
        }
        Ok(cluster)
    }

    fn require_active(
        &self,
        cluster_id: &str,
        catalog_name: &str,
    ) -> OrchestratorResult<DeployedServiceRecord> {
        self.state
            .get_active_service(cluster_id, catalog_name)?
            .ok_or_else(|| OrchestratorError::ServiceNotFound(catalog_name.to_string()))
    }

    async fn connect(&self, cluster: &ClusterRecord) -> OrchestratorResult<Arc<dyn ClusterExecutor>> {
        self.connector.connect(cluster).await.map_err(|e| match e {
            ExecutorError::Decryption(e) => OrchestratorError::Decryption(e),
            other => OrchestratorError::Executor(other),
        })
    }

    fn existing(&self, cluster_id: &str, catalog_name: &str) -> OrchestratorResult<Existing> {
        Ok(match self.state.get_active_service(cluster_id, catalog_name)? {
            Some(record) if record.status == ServiceStatus::Failed => Existing::Missing,
            Some(record) if record.hook_pending => Existing::HookPending(record),
            Some(_) => Existing::Settled,
            None => Existing::Missing,
        })
    }

    /// Write back an active record unless a delete got to it first.
    fn update_active(&self, record: &DeployedServiceRecord) -> OrchestratorResult<()> {
        self.state.update_active_service(record).map_err(|e| match e {
            StateError::Inactive(_) => {
                warn!(cluster_id = %record.cluster_id, service = %record.catalog_key(), id = %record.id, "record deleted concurrently, update dropped");
                OrchestratorError::ConcurrentlyDeleted(record.catalog_key().to_string())
            }
            other => other.into(),
        })
    }

    /// Soft-delete a `failed` active record so it can be replaced.
    fn retire_failed(&self, cluster_id: &str, catalog_name: &str) -> OrchestratorResult<()> {
        if let Some(stale) = self.state.get_active_service(cluster_id, catalog_name)? {
            if stale.status == ServiceStatus::Failed {
                info!(%cluster_id, service = %catalog_name, id = %stale.id, "replacing failed record");
                self.state.soft_delete_services(&[stale.id])?;
            }
        }
        Ok(())
    }

    fn installed_dependents(
        &self,
        cluster_id: &str,
        catalog_name: &str,
    ) -> OrchestratorResult<Vec<String>> {
        let mut installed = self.tracker.installed_catalog_names(cluster_id)?;
        installed.remove(catalog_name);
        Ok(self.catalog.dependents(catalog_name, &installed))
    }
}
