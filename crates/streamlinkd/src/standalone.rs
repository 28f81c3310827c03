//! Standalone mode: every subsystem in one process.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use streamlink_api::{ApiState, build_router};
use streamlink_core::config::ENV_ENCRYPTION_KEY;
use streamlink_core::{Secrets, ServiceCatalog, StreamlinkConfig};
use streamlink_executor::{KubeConnector, KubeSettings};
use streamlink_identity::{IdentityAdmin, KeycloakAdmin};
use streamlink_orchestrator::{
    ClusterMonitor, HookRegistry, KeycloakHook, Orchestrator, OrchestratorSettings, PostgresHook,
};
use streamlink_secrets::{AesGcmCodec, SecretCodec};
use streamlink_state::StateStore;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Command-line values that take precedence over streamlink.toml.
#[derive(Debug, Default)]
pub struct Overrides {
    pub port: Option<u16>,
    pub data_dir: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

pub fn load_config(overrides: &Overrides) -> anyhow::Result<StreamlinkConfig> {
    let mut config = match &overrides.config {
        Some(path) => StreamlinkConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => StreamlinkConfig::default(),
    };
    if let Some(port) = overrides.port {
        config.server.port = port;
    }
    if let Some(data_dir) = &overrides.data_dir {
        config.server.data_dir = data_dir.clone();
    }
    Ok(config)
}

pub async fn run_standalone(overrides: Overrides) -> anyhow::Result<()> {
    info!("StreamLink control plane starting in standalone mode");

    let config = load_config(&overrides)?;
    let secrets = Secrets::from_env();
    info!(?secrets, "secrets loaded from environment");

    // ── Initialize subsystems ──────────────────────────────────

    // Secret codec.
    let key = secrets.encryption_key.as_deref().with_context(|| {
        format!("{ENV_ENCRYPTION_KEY} is not set; generate one with `streamlinkd generate-key`")
    })?;
    let codec: Arc<dyn SecretCodec> = Arc::new(
        AesGcmCodec::from_base64_key(key).with_context(|| format!("invalid {ENV_ENCRYPTION_KEY}"))?,
    );

    // Catalog.
    let catalog = Arc::new(ServiceCatalog::streamlink()?);
    info!(services = catalog.entries().len(), "service catalog loaded");

    // State store.
    std::fs::create_dir_all(&config.server.data_dir).with_context(|| {
        format!("failed to create data dir {}", config.server.data_dir.display())
    })?;
    let db_path = config.server.data_dir.join("streamlink.redb");
    let state = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    // Cluster connector.
    let connector = Arc::new(KubeConnector::new(
        codec.clone(),
        KubeSettings {
            manifest_dir: config.deploy.manifest_dir.clone(),
            namespace: config.deploy.namespace.clone(),
            request_timeout: config.deploy.request_timeout(),
        },
    ));
    info!(namespace = %config.deploy.namespace, manifest_dir = ?config.deploy.manifest_dir, "kubernetes connector initialized");

    // Identity provider client: hook provisioning and API token checks.
    let identity: Arc<dyn IdentityAdmin> =
        Arc::new(KeycloakAdmin::new(config.deploy.request_timeout())?);

    // Post-install hooks.
    if secrets.postgres_password.is_none() {
        warn!("postgres password not set; postgres post-install hook will fail");
    }
    if secrets.keycloak_admin_password.is_none() {
        warn!("keycloak admin password not set; keycloak post-install hook will fail");
    }
    let hooks = HookRegistry::new()
        .with(
            "postgres",
            Arc::new(PostgresHook::new(
                codec.clone(),
                config.postgres.clone(),
                secrets.postgres_password.clone(),
            )),
        )
        .with(
            "keycloak",
            Arc::new(KeycloakHook::new(
                codec.clone(),
                identity.clone(),
                config.keycloak.clone(),
                secrets.keycloak_admin_password.clone(),
            )),
        );
    info!(hooks = hooks.len(), "post-install hooks registered");

    // Orchestrator.
    let orchestrator = Arc::new(
        Orchestrator::new(
            catalog,
            state,
            connector,
            OrchestratorSettings::from(&config.deploy),
        )
        .with_hooks(hooks),
    );
    info!("orchestrator initialized");

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start background tasks ─────────────────────────────────

    let monitor = ClusterMonitor::new(orchestrator.clone(), config.deploy.cluster_check_interval());
    let monitor_handle = tokio::spawn(async move {
        monitor.run(shutdown_rx).await;
    });

    // ── Start API server ───────────────────────────────────────

    let router = build_router(ApiState::new(orchestrator, codec, identity));
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for shutdown signal");
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    let _ = monitor_handle.await;

    info!("StreamLink control plane stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_config_file() {
        let config = load_config(&Overrides::default()).unwrap();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.deploy.namespace, "streamlink");
    }

    #[test]
    fn cli_overrides_win() {
        let overrides = Overrides {
            port: Some(9100),
            data_dir: Some(PathBuf::from("/tmp/streamlink-test")),
            config: None,
        };
        let config = load_config(&overrides).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.data_dir, PathBuf::from("/tmp/streamlink-test"));
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let overrides = Overrides {
            config: Some(PathBuf::from("/nonexistent/streamlink.toml")),
            ..Default::default()
        };
        let err = load_config(&overrides).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/streamlink.toml"));
    }
}
