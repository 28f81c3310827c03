//! streamlink.toml configuration parser.
//!
//! Non-sensitive settings live in the TOML file and all have defaults.
//! Secrets are read from the environment only, see [`Secrets::from_env`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const ENV_ENCRYPTION_KEY: &str = "STREAMLINK_ENCRYPTION_KEY";
pub const ENV_POSTGRES_PASSWORD: &str = "STREAMLINK_POSTGRES_PASSWORD";
pub const ENV_KEYCLOAK_ADMIN_PASSWORD: &str = "STREAMLINK_KEYCLOAK_ADMIN_PASSWORD";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamlinkConfig {
    pub server: ServerConfig,
    pub deploy: DeployConfig,
    pub postgres: PostgresConfig,
    pub keycloak: KeycloakConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            data_dir: PathBuf::from("/var/lib/streamlink"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    /// Namespace every catalog service is deployed into.
    pub namespace: String,
    /// Directory holding one `<catalog-name>.yaml` manifest per service.
    pub manifest_dir: PathBuf,
    /// Delay between readiness polls (e.g. "5s").
    pub poll_interval: String,
    /// Give up waiting for readiness after this long (e.g. "300s").
    pub ready_timeout: String,
    /// Upper bound for any single Kubernetes API call (e.g. "10s").
    pub request_timeout: String,
    /// How often registered clusters are pinged in the background.
    pub cluster_check_interval: String,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            namespace: "streamlink".to_string(),
            manifest_dir: PathBuf::from("deployments"),
            poll_interval: "5s".to_string(),
            ready_timeout: "300s".to_string(),
            request_timeout: "10s".to_string(),
            cluster_check_interval: "60s".to_string(),
        }
    }
}

impl DeployConfig {
    pub fn poll_interval(&self) -> Duration {
        parse_duration(&self.poll_interval).unwrap_or(Duration::from_secs(5))
    }

    pub fn ready_timeout(&self) -> Duration {
        parse_duration(&self.ready_timeout).unwrap_or(Duration::from_secs(300))
    }

    pub fn request_timeout(&self) -> Duration {
        parse_duration(&self.request_timeout).unwrap_or(Duration::from_secs(10))
    }

    pub fn cluster_check_interval(&self) -> Duration {
        parse_duration(&self.cluster_check_interval).unwrap_or(Duration::from_secs(60))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PostgresConfig {
    pub admin_user: String,
    pub port: u16,
    pub nodeport: u16,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            admin_user: "postgres".to_string(),
            port: 5432,
            nodeport: 30432,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeycloakConfig {
    pub admin_user: String,
    pub port: u16,
    pub nodeport: u16,
    pub realm: String,
    pub realm_display_name: String,
    pub api_client_id: String,
    pub api_redirect_uri: String,
    pub kafbat_ui_client_id: String,
    pub kafbat_ui_redirect_uri: String,
}

impl Default for KeycloakConfig {
    fn default() -> Self {
        Self {
            admin_user: "admin".to_string(),
            port: 8080,
            nodeport: 30081,
            realm: "streamlink".to_string(),
            realm_display_name: "StreamLink".to_string(),
            api_client_id: "streamlink-api".to_string(),
            api_redirect_uri: "http://localhost:3001/auth/callback".to_string(),
            kafbat_ui_client_id: "kafbat-ui".to_string(),
            kafbat_ui_redirect_uri: "http://localhost:30080/login".to_string(),
        }
    }
}

impl StreamlinkConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: StreamlinkConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Secrets supplied through the environment.
#[derive(Clone, Default)]
pub struct Secrets {
    /// Base64-encoded 32-byte key for encryption at rest.
    pub encryption_key: Option<String>,
    pub postgres_password: Option<String>,
    pub keycloak_admin_password: Option<String>,
}

impl Secrets {
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Self {
            encryption_key: var(ENV_ENCRYPTION_KEY),
            postgres_password: var(ENV_POSTGRES_PASSWORD),
            keycloak_admin_password: var(ENV_KEYCLOAK_ADMIN_PASSWORD),
        }
    }
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mask = |v: &Option<String>| if v.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("Secrets")
            .field("encryption_key", &mask(&self.encryption_key))
            .field("postgres_password", &mask(&self.postgres_password))
            .field("keycloak_admin_password", &mask(&self.keycloak_admin_password))
            .finish()
    }
}

/// Parse a duration string like "5s", "500ms", "2m". A bare number is seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
