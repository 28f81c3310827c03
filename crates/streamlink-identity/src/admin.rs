//! The identity admin seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::IdentityResult;

/// Where to reach the admin API and how to authenticate.
#[derive(Clone)]
pub struct AdminEndpoint {
    /// e.g. `http://203.0.113.7:30081`, no trailing slash.
    pub base_url: String,
    pub admin_user: String,
    pub admin_password: String,
}

impl std::fmt::Debug for AdminEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminEndpoint")
            .field("base_url", &self.base_url)
            .field("admin_user", &self.admin_user)
            .finish_non_exhaustive()
    }
}

/// Credentials of a confidential OAuth client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Who an access token belongs to, as reported by the realm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub subject: String,
    pub username: Option<String>,
    pub email: Option<String>,
}

#[async_trait]
pub trait IdentityAdmin: Send + Sync {
    /// Create the realm unless it already exists.
    async fn create_realm(
        &self,
        endpoint: &AdminEndpoint,
        realm: &str,
        display_name: &str,
    ) -> IdentityResult<()>;

    /// Create a confidential client, or return the existing client's secret.
    async fn create_oauth_client(
        &self,
        endpoint: &AdminEndpoint,
        realm: &str,
        client_id: &str,
        redirect_uris: &[String],
        description: &str,
    ) -> IdentityResult<OAuthCredentials>;

    /// Delete a client. Returns `false` if it did not exist.
    async fn delete_oauth_client(
        &self,
        endpoint: &AdminEndpoint,
        realm: &str,
        client_id: &str,
    ) -> IdentityResult<bool>;

    /// Check a user's access token against `realm` on the server at
    /// `base_url`. `None` means the token was rejected.
    async fn verify_token(
        &self,
        base_url: &str,
        realm: &str,
        token: &str,
    ) -> IdentityResult<Option<TokenClaims>>;
}
