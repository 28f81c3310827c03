use std::sync::Arc;

use async_trait::async_trait;
use streamlink_core::config::PostgresConfig;
use streamlink_secrets::SecretCodec;
use streamlink_state::{DeployedServiceRecord, ServiceCredentials};
use tracing::{info, warn};

use super::{HookContext, ServiceHook, cluster_dns};
use crate::error::HookResult;

/// Publishes the managed Postgres connection details on its record and
/// flags the database as available for bootstrap.
pub struct PostgresHook {
    codec: Arc<dyn SecretCodec>,
    config: PostgresConfig,
    password: Option<String>,
}

impl PostgresHook {
    pub fn new(codec: Arc<dyn SecretCodec>, config: PostgresConfig, password: Option<String>) -> Self {
        Self {
            codec,
            config,
            password,
        }
    }
}

#[async_trait]
impl ServiceHook for PostgresHook {
    async fn on_running(
        &self,
        ctx: &HookContext<'_>,
        record: &mut DeployedServiceRecord,
    ) -> HookResult<()> {
        let password = match &self.password {
            Some(p) => Some(self.codec.encrypt(p)?),
            None => {
                warn!(service = %record.deployed_name, "no postgres password configured, credentials published without it");
                None
            }
        };
        let node = ctx.executor.get_node_address().await?;

        record.credentials = ServiceCredentials {
            username: Some(self.config.admin_user.clone()),
            password,
            internal_host: Some(cluster_dns(&record.deployed_name, &record.namespace)),
            internal_port: Some(self.config.port),
            external_port: node.as_ref().map(|_| self.config.nodeport),
            external_host: node,
        };

        ctx.state.update_bootstrap(|b| b.postgres_deployed = true)?;
        info!(cluster_id = %ctx.cluster_id, external = ?record.credentials.external_host, "postgres credentials published");
        Ok(())
    }

    async fn on_teardown(
        &self,
        ctx: &HookContext<'_>,
        _record: &DeployedServiceRecord,
    ) -> HookResult<()> {
        ctx.state.update_bootstrap(|b| b.postgres_deployed = false)?;
        info!(cluster_id = %ctx.cluster_id, "postgres marked as not deployed");
        Ok(())
    }
}
