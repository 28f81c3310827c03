//! In-memory identity admin for tests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::admin::{AdminEndpoint, IdentityAdmin, OAuthCredentials, TokenClaims};
use crate::error::{IdentityError, IdentityResult};

#[derive(Default)]
struct FakeIdentityState {
    realms: BTreeSet<String>,
    /// `{realm}/{client_id}` → secret
    clients: BTreeMap<String, String>,
    endpoints_seen: Vec<String>,
    /// token → subject
    tokens: BTreeMap<String, String>,
    unavailable: bool,
}

/// Records realms and clients; secrets are `secret-<client_id>`.
#[derive(Default)]
pub struct FakeIdentityAdmin {
    state: Mutex<FakeIdentityState>,
}

impl FakeIdentityAdmin {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FakeIdentityState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make every call fail as if the admin API were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state().unavailable = unavailable;
    }

    pub fn realms(&self) -> Vec<String> {
        self.state().realms.iter().cloned().collect()
    }

    /// Client ids currently registered in `realm`.
    pub fn clients(&self, realm: &str) -> Vec<String> {
        let prefix = format!("{realm}/");
        self.state()
            .clients
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix).map(str::to_string))
            .collect()
    }

    /// Accept `token` as belonging to `subject` in every realm.
    pub fn accept_token(&self, token: &str, subject: &str) {
        self.state()
            .tokens
            .insert(token.to_string(), subject.to_string());
    }

    /// Base URLs of every call, in order.
    pub fn endpoints_seen(&self) -> Vec<String> {
        self.state().endpoints_seen.clone()
    }

    fn enter(&self, endpoint: &AdminEndpoint, operation: &'static str) -> IdentityResult<MutexGuard<'_, FakeIdentityState>> {
        self.enter_url(&endpoint.base_url, operation)
    }

    fn enter_url(&self, base_url: &str, operation: &'static str) -> IdentityResult<MutexGuard<'_, FakeIdentityState>> {
        let mut state = self.state();
        state.endpoints_seen.push(base_url.to_string());
        if state.unavailable {
            return Err(IdentityError::Unexpected {
                operation,
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(state)
    }
}

#[async_trait]
impl IdentityAdmin for FakeIdentityAdmin {
    async fn create_realm(
        &self,
        endpoint: &AdminEndpoint,
        realm: &str,
        _display_name: &str,
    ) -> IdentityResult<()> {
        self.enter(endpoint, "create realm")?
            .realms
            .insert(realm.to_string());
        Ok(())
    }

    async fn create_oauth_client(
        &self,
        endpoint: &AdminEndpoint,
        realm: &str,
        client_id: &str,
        _redirect_uris: &[String],
        _description: &str,
    ) -> IdentityResult<OAuthCredentials> {
        let mut state = self.enter(endpoint, "create client")?;
        let secret = state
            .clients
            .entry(format!("{realm}/{client_id}"))
            .or_insert_with(|| format!("secret-{client_id}"))
            .clone();
        Ok(OAuthCredentials {
            client_id: client_id.to_string(),
            client_secret: secret,
        })
    }

    async fn delete_oauth_client(
        &self,
        endpoint: &AdminEndpoint,
        realm: &str,
        client_id: &str,
    ) -> IdentityResult<bool> {
        let mut state = self.enter(endpoint, "delete client")?;
        Ok(state.clients.remove(&format!("{realm}/{client_id}")).is_some())
    }

    async fn verify_token(
        &self,
        base_url: &str,
        _realm: &str,
        token: &str,
    ) -> IdentityResult<Option<TokenClaims>> {
        let state = self.enter_url(base_url, "verify token")?;
        Ok(state.tokens.get(token).map(|subject| TokenClaims {
            subject: subject.clone(),
            username: Some(subject.clone()),
            email: None,
        }))
    }
}
