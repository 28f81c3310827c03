//! Keycloak admin REST client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::admin::{AdminEndpoint, IdentityAdmin, OAuthCredentials, TokenClaims};
use crate::error::{IdentityError, IdentityResult};

/// Access token lifespan configured on every client, in seconds.
const ACCESS_TOKEN_LIFESPAN: &str = "900";

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct UserInfo {
    sub: String,
    preferred_username: Option<String>,
    email: Option<String>,
}

#[derive(Deserialize)]
struct ClientRepresentation {
    id: String,
}

#[derive(Deserialize)]
struct SecretRepresentation {
    value: String,
}

pub struct KeycloakAdmin {
    http: Client,
}

impl KeycloakAdmin {
    pub fn new(timeout: Duration) -> IdentityResult<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }

    /// Fresh admin token from the master realm via the `admin-cli` client.
    async fn admin_token(&self, endpoint: &AdminEndpoint) -> IdentityResult<String> {
        let url = format!(
            "{}/realms/master/protocol/openid-connect/token",
            endpoint.base_url
        );
        let response = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", "password"),
                ("client_id", "admin-cli"),
                ("username", endpoint.admin_user.as_str()),
                ("password", endpoint.admin_password.as_str()),
            ])
            .send()
            .await?;
        if response.status() != StatusCode::OK {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(IdentityError::Auth { status, body });
        }
        let token: TokenResponse = response.json().await?;
        Ok(token.access_token)
    }

    async fn realm_exists(
        &self,
        endpoint: &AdminEndpoint,
        token: &str,
        realm: &str,
    ) -> IdentityResult<bool> {
        let url = format!("{}/admin/realms/{realm}", endpoint.base_url);
        let response = self.http.get(&url).bearer_auth(token).send().await?;
        Ok(response.status() == StatusCode::OK)
    }

    /// Internal UUID of a client, looked up by its `clientId`.
    async fn client_uuid(
        &self,
        endpoint: &AdminEndpoint,
        token: &str,
        realm: &str,
        client_id: &str,
    ) -> IdentityResult<Option<String>> {
        let url = format!("{}/admin/realms/{realm}/clients", endpoint.base_url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .query(&[("clientId", client_id)])
            .send()
            .await?;
        if response.status() != StatusCode::OK {
            return Ok(None);
        }
        let clients: Vec<ClientRepresentation> = response.json().await?;
        Ok(clients.into_iter().next().map(|c| c.id))
    }

    async fn client_secret(
        &self,
        endpoint: &AdminEndpoint,
        token: &str,
        realm: &str,
        client_id: &str,
    ) -> IdentityResult<String> {
        let uuid = self
            .client_uuid(endpoint, token, realm, client_id)
            .await?
            .ok_or_else(|| IdentityError::ClientNotFound(client_id.to_string()))?;
        let url = format!(
            "{}/admin/realms/{realm}/clients/{uuid}/client-secret",
            endpoint.base_url
        );
        let response = self.http.get(&url).bearer_auth(token).send().await?;
        let response = expect_status(response, "get client secret", &[StatusCode::OK]).await?;
        let secret: SecretRepresentation = response.json().await?;
        Ok(secret.value)
    }
}

/// Pass the response through if its status is one of `accepted`.
async fn expect_status(
    response: Response,
    operation: &'static str,
    accepted: &[StatusCode],
) -> IdentityResult<Response> {
    if accepted.contains(&response.status()) {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(IdentityError::Unexpected {
        operation,
        status,
        body,
    })
}

#[async_trait]
impl IdentityAdmin for KeycloakAdmin {
    async fn create_realm(
        &self,
        endpoint: &AdminEndpoint,
        realm: &str,
        display_name: &str,
    ) -> IdentityResult<()> {
        let token = self.admin_token(endpoint).await?;
        if self.realm_exists(endpoint, &token, realm).await? {
            debug!(%realm, "realm already exists");
            return Ok(());
        }

        let body = json!({
            "realm": realm,
            "displayName": display_name,
            "enabled": true,
            "sslRequired": "none",
            "registrationAllowed": false,
            "loginWithEmailAllowed": true,
            "duplicateEmailsAllowed": false,
            "resetPasswordAllowed": true,
            "editUsernameAllowed": false,
            "bruteForceProtected": true,
        });
        let url = format!("{}/admin/realms", endpoint.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await?;
        expect_status(
            response,
            "create realm",
            &[StatusCode::CREATED, StatusCode::CONFLICT],
        )
        .await?;
        info!(%realm, "realm created");
        Ok(())
    }

    async fn create_oauth_client(
        &self,
        endpoint: &AdminEndpoint,
        realm: &str,
        client_id: &str,
        redirect_uris: &[String],
        description: &str,
    ) -> IdentityResult<OAuthCredentials> {
        let token = self.admin_token(endpoint).await?;

        if self
            .client_uuid(endpoint, &token, realm, client_id)
            .await?
            .is_none()
        {
            let body = json!({
                "clientId": client_id,
                "name": client_id,
                "description": description,
                "enabled": true,
                "protocol": "openid-connect",
                "publicClient": false,
                "standardFlowEnabled": true,
                "directAccessGrantsEnabled": true,
                "serviceAccountsEnabled": false,
                "redirectUris": redirect_uris,
                "webOrigins": ["+"],
                "attributes": { "access.token.lifespan": ACCESS_TOKEN_LIFESPAN },
            });
            let url = format!("{}/admin/realms/{realm}/clients", endpoint.base_url);
            let response = self
                .http
                .post(&url)
                .bearer_auth(&token)
                .json(&body)
                .send()
                .await?;
            expect_status(
                response,
                "create client",
                &[StatusCode::CREATED, StatusCode::CONFLICT],
            )
            .await?;
            info!(%realm, %client_id, "oauth client created");
        } else {
            debug!(%realm, %client_id, "oauth client already exists");
        }

        let client_secret = self.client_secret(endpoint, &token, realm, client_id).await?;
        Ok(OAuthCredentials {
            client_id: client_id.to_string(),
            client_secret,
        })
    }

    async fn delete_oauth_client(
        &self,
        endpoint: &AdminEndpoint,
        realm: &str,
        client_id: &str,
    ) -> IdentityResult<bool> {
        let token = self.admin_token(endpoint).await?;
        let Some(uuid) = self.client_uuid(endpoint, &token, realm, client_id).await? else {
            return Ok(false);
        };
        let url = format!("{}/admin/realms/{realm}/clients/{uuid}", endpoint.base_url);
        let response = self.http.delete(&url).bearer_auth(&token).send().await?;
        let response = expect_status(
            response,
            "delete client",
            &[StatusCode::NO_CONTENT, StatusCode::NOT_FOUND],
        )
        .await?;
        let deleted = response.status() == StatusCode::NO_CONTENT;
        info!(%realm, %client_id, deleted, "oauth client deleted");
        Ok(deleted)
    }

    async fn verify_token(
        &self,
        base_url: &str,
        realm: &str,
        token: &str,
    ) -> IdentityResult<Option<TokenClaims>> {
        let url = format!("{base_url}/realms/{realm}/protocol/openid-connect/userinfo");
        let response = self.http.get(&url).bearer_auth(token).send().await?;
        if matches!(
            response.status(),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            debug!(%realm, status = %response.status(), "token rejected");
            return Ok(None);
        }
        let response = expect_status(response, "verify token", &[StatusCode::OK]).await?;
        let info: UserInfo = response.json().await?;
        Ok(Some(TokenClaims {
            subject: info.sub,
            username: info.preferred_username,
            email: info.email,
        }))
    }
}
