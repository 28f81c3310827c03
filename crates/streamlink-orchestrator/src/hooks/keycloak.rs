use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use streamlink_core::config::{ENV_KEYCLOAK_ADMIN_PASSWORD, KeycloakConfig};
use streamlink_identity::{AdminEndpoint, IdentityAdmin};
use streamlink_secrets::SecretCodec;
use streamlink_state::{DeployedServiceRecord, OAuthClientRecord, epoch_secs};
use tracing::{info, warn};

use super::{HookContext, ServiceHook, node_url};
use crate::error::{HookError, HookResult};

/// Provisions the StreamLink realm and its OAuth clients once Keycloak is
/// running, and enables authentication. Teardown revokes the clients and
/// turns authentication back off.
pub struct KeycloakHook {
    codec: Arc<dyn SecretCodec>,
    identity: Arc<dyn IdentityAdmin>,
    config: KeycloakConfig,
    admin_password: Option<String>,
}

struct ClientSpec<'a> {
    client_id: &'a str,
    redirect_uri: &'a str,
    description: &'a str,
}

impl KeycloakHook {
    pub fn new(
        codec: Arc<dyn SecretCodec>,
        identity: Arc<dyn IdentityAdmin>,
        config: KeycloakConfig,
        admin_password: Option<String>,
    ) -> Self {
        Self {
            codec,
            identity,
            config,
            admin_password,
        }
    }

    fn clients(&self) -> [ClientSpec<'_>; 2] {
        [
            ClientSpec {
                client_id: &self.config.api_client_id,
                redirect_uri: &self.config.api_redirect_uri,
                description: "StreamLink API",
            },
            ClientSpec {
                client_id: &self.config.kafbat_ui_client_id,
                redirect_uri: &self.config.kafbat_ui_redirect_uri,
                description: "Kafbat UI",
            },
        ]
    }

    fn endpoint(&self, base_url: String) -> HookResult<AdminEndpoint> {
        let admin_password = self
            .admin_password
            .clone()
            .ok_or(HookError::MissingSecret(ENV_KEYCLOAK_ADMIN_PASSWORD))?;
        Ok(AdminEndpoint {
            base_url,
            admin_user: self.config.admin_user.clone(),
            admin_password,
        })
    }

    async fn base_url(&self, ctx: &HookContext<'_>) -> HookResult<String> {
        let node = ctx
            .executor
            .get_node_address()
            .await?
            .ok_or(HookError::NoNodeAddress)?;
        Ok(node_url(&node, self.config.nodeport))
    }
}

#[async_trait]
impl ServiceHook for KeycloakHook {
    async fn on_running(
        &self,
        ctx: &HookContext<'_>,
        record: &mut DeployedServiceRecord,
    ) -> HookResult<()> {
        let base_url = self.base_url(ctx).await?;
        let endpoint = self.endpoint(base_url.clone())?;
        let realm = &self.config.realm;

        self.identity
            .create_realm(&endpoint, realm, &self.config.realm_display_name)
            .await?;

        for spec in self.clients() {
            let redirect_uris = vec![spec.redirect_uri.to_string()];
            let creds = self
                .identity
                .create_oauth_client(&endpoint, realm, spec.client_id, &redirect_uris, spec.description)
                .await?;
            let now = epoch_secs();
            let created_at = ctx
                .state
                .get_oauth_client(&creds.client_id)?
                .map_or(now, |existing| existing.created_at);
            ctx.state.put_oauth_client(&OAuthClientRecord {
                client_id: creds.client_id.clone(),
                client_secret: self.codec.encrypt(&creds.client_secret)?,
                realm: realm.clone(),
                redirect_uris,
                description: Some(spec.description.to_string()),
                is_active: true,
                created_at,
                updated_at: now,
            })?;
            info!(%realm, client_id = %creds.client_id, "oauth client provisioned");
        }

        record.config = Some(json!({
            "external_url": base_url,
            "realm": realm,
        }));
        ctx.state.update_bootstrap(|b| b.auth_enabled = true)?;
        info!(cluster_id = %ctx.cluster_id, %realm, "authentication enabled");
        Ok(())
    }

    async fn on_teardown(
        &self,
        ctx: &HookContext<'_>,
        record: &DeployedServiceRecord,
    ) -> HookResult<()> {
        // Local state first: authentication must be off even if Keycloak is
        // already unreachable.
        ctx.state.update_bootstrap(|b| b.auth_enabled = false)?;
        let realm = &self.config.realm;
        let now = epoch_secs();
        let mut revoke = Vec::new();
        for mut client in ctx.state.list_oauth_clients()? {
            if client.realm != *realm || !client.is_active {
                continue;
            }
            client.is_active = false;
            client.updated_at = now;
            ctx.state.put_oauth_client(&client)?;
            revoke.push(client.client_id);
        }
        info!(cluster_id = %ctx.cluster_id, %realm, clients = revoke.len(), "authentication disabled");

        let base_url = match record.config_str("external_url") {
            Some(url) => url.to_string(),
            None => self.base_url(ctx).await?,
        };
        let endpoint = self.endpoint(base_url)?;

        let mut first_error = None;
        for client_id in &revoke {
            match self.identity.delete_oauth_client(&endpoint, realm, client_id).await {
                Ok(true) => info!(%realm, %client_id, "oauth client revoked"),
                Ok(false) => info!(%realm, %client_id, "oauth client already absent"),
                Err(e) => {
                    warn!(%realm, %client_id, error = %e, "failed to revoke oauth client");
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}
