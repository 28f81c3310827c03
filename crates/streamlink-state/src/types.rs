//! Domain types for the StreamLink state store.
//!
//! These types represent the persisted state of the registered cluster,
//! deployed services, OAuth clients and bootstrap flags. All types are
//! serializable to/from JSON for storage in redb tables.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use streamlink_core::HealthStatus;

/// Unique identifier for a registered cluster.
pub type ClusterId = String;

/// Unique identifier for a deployed service record.
pub type RecordId = String;

/// Current Unix epoch in seconds.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Fresh random record id.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ── Cluster ───────────────────────────────────────────────────────

/// A Kubernetes cluster StreamLink deploys into.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterRecord {
    pub id: ClusterId,
    pub name: String,
    pub api_server: String,
    /// Kubeconfig YAML, encrypted with the secret codec.
    pub kubeconfig: String,
    pub status: ClusterStatus,
    /// Unix timestamp of the last connectivity check.
    pub last_checked: Option<u64>,
    pub is_active: bool,
    pub created_at: u64,
    pub updated_at: u64,
}

impl ClusterRecord {
    pub fn new(name: &str, api_server: &str, kubeconfig_ciphertext: String) -> Self {
        let now = epoch_secs();
        Self {
            id: new_id(),
            name: name.to_string(),
            api_server: api_server.to_string(),
            kubeconfig: kubeconfig_ciphertext,
            status: ClusterStatus::Unknown,
            last_checked: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Reachability of a cluster as of the last check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterStatus {
    Up,
    Down,
    Unknown,
}

impl std::fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Unknown => "unknown",
        })
    }
}

// ── Deployed service ──────────────────────────────────────────────

/// Lifecycle status of a deployed service record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Pending,
    Deploying,
    Running,
    Degraded,
    Failed,
    Deleted,
}

impl From<HealthStatus> for ServiceStatus {
    /// A workload that has vanished from the cluster counts as failed.
    fn from(health: HealthStatus) -> Self {
        match health {
            HealthStatus::Running => Self::Running,
            HealthStatus::Degraded => Self::Degraded,
            HealthStatus::Failed | HealthStatus::NotFound => Self::Failed,
            HealthStatus::Pending => Self::Pending,
            HealthStatus::Deploying => Self::Deploying,
        }
    }
}

/// Connection details published once a service is running.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServiceCredentials {
    pub username: Option<String>,
    /// Encrypted with the secret codec.
    pub password: Option<String>,
    pub internal_host: Option<String>,
    pub internal_port: Option<u16>,
    pub external_host: Option<String>,
    pub external_port: Option<u16>,
}

/// What happened to a service's cluster resources after it was deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TeardownOutcome {
    Complete,
    Failed { reason: String },
}

/// One service instance installed on a cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeployedServiceRecord {
    pub id: RecordId,
    pub cluster_id: ClusterId,
    /// Catalog entry this record was deployed from. `None` for records
    /// created before catalog names were tracked.
    pub catalog_name: Option<String>,
    /// Name of the Kubernetes workload.
    pub deployed_name: String,
    pub display_name: String,
    pub namespace: String,
    pub status: ServiceStatus,
    /// The workload is running but its post-install hook has not completed
    /// yet. The next deploy re-runs the hook instead of skipping the service.
    #[serde(default)]
    pub hook_pending: bool,
    pub version: Option<String>,
    /// `"available/desired"` as of the last check.
    pub replicas: Option<String>,
    pub last_checked: Option<u64>,
    pub is_active: bool,
    #[serde(default)]
    pub credentials: ServiceCredentials,
    pub config: Option<serde_json::Value>,
    pub teardown: Option<TeardownOutcome>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl DeployedServiceRecord {
    /// A fresh active record for a workload that was just applied.
    pub fn deploying(
        cluster_id: &str,
        catalog_name: &str,
        display_name: &str,
        deployed_name: &str,
        namespace: &str,
    ) -> Self {
        let now = epoch_secs();
        Self {
            id: new_id(),
            cluster_id: cluster_id.to_string(),
            catalog_name: Some(catalog_name.to_string()),
            deployed_name: deployed_name.to_string(),
            display_name: display_name.to_string(),
            namespace: namespace.to_string(),
            status: ServiceStatus::Deploying,
            hook_pending: false,
            version: None,
            replicas: None,
            last_checked: None,
            is_active: true,
            credentials: ServiceCredentials::default(),
            config: None,
            teardown: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Catalog name, falling back to the deployed name for legacy records.
    pub fn catalog_key(&self) -> &str {
        self.catalog_name.as_deref().unwrap_or(&self.deployed_name)
    }

    /// Counts as installed for a deploy: not failed, and no hook left to run.
    pub fn is_settled(&self) -> bool {
        self.status != ServiceStatus::Failed && !self.hook_pending
    }

    /// Build the composite key for the active-services index.
    pub fn active_key(&self) -> String {
        active_key(&self.cluster_id, self.catalog_key())
    }

    /// Read a string field from the free-form `config` blob.
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.as_ref()?.get(key)?.as_str()
    }
}

/// Composite key `{cluster_id}/{catalog_key}`.
pub fn active_key(cluster_id: &str, catalog_key: &str) -> String {
    format!("{cluster_id}/{catalog_key}")
}

// ── OAuth clients ─────────────────────────────────────────────────

/// An OAuth client registered in the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OAuthClientRecord {
    pub client_id: String,
    /// Encrypted with the secret codec.
    pub client_secret: String,
    pub realm: String,
    pub redirect_uris: Vec<String>,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: u64,
    pub updated_at: u64,
}

// ── Bootstrap ─────────────────────────────────────────────────────

/// Process-wide bootstrap flags (singleton row).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BootstrapState {
    /// The managed Postgres instance is up and its credentials are stored.
    pub postgres_deployed: bool,
    /// State has been moved from the embedded store to Postgres.
    pub migration_complete: bool,
    /// Authentication through the managed Keycloak realm is enabled.
    pub auth_enabled: bool,
    pub updated_at: u64,
}
