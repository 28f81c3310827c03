//! Bearer-token gate for the API routes.
//!
//! Until the managed Keycloak realm is provisioned (`auth_enabled` unset)
//! every request is let through as anonymous. Afterwards each request needs
//! an `Authorization: Bearer` token that the realm's userinfo endpoint
//! accepts.

use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::Next;
use axum::response::Response;
use streamlink_identity::TokenClaims;
use streamlink_state::{StateResult, StateStore};
use tracing::{debug, warn};

use crate::ApiState;
use crate::handlers::{error_response, state_error};

/// Who made a request, attached as a request extension by [`require_auth`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    Anonymous,
    User(TokenClaims),
}

impl std::fmt::Display for Caller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Anonymous => f.write_str("anonymous"),
            Self::User(claims) => {
                f.write_str(claims.username.as_deref().unwrap_or(&claims.subject))
            }
        }
    }
}

pub async fn require_auth(State(state): State<ApiState>, mut req: Request, next: Next) -> Response {
    let flags = match state.store.bootstrap_state() {
        Ok(flags) => flags,
        Err(e) => return state_error(&e),
    };
    if !flags.auth_enabled {
        req.extensions_mut().insert(Caller::Anonymous);
        return next.run(req).await;
    }

    let Some(token) = bearer_token(req.headers()) else {
        return error_response(
            "authentication required; log in through Keycloak",
            StatusCode::UNAUTHORIZED,
        );
    };
    let (base_url, realm) = match identity_realm(&state.store) {
        Ok(Some(realm)) => realm,
        Ok(None) => {
            warn!("authentication is enabled but no provisioned keycloak was found");
            return error_response(
                "identity provider is not configured",
                StatusCode::SERVICE_UNAVAILABLE,
            );
        }
        Err(e) => return state_error(&e),
    };

    match state.identity.verify_token(&base_url, &realm, &token).await {
        Ok(Some(claims)) => {
            debug!(subject = %claims.subject, path = %req.uri().path(), "request authenticated");
            req.extensions_mut().insert(Caller::User(claims));
            next.run(req).await
        }
        Ok(None) => error_response("invalid or expired token", StatusCode::UNAUTHORIZED),
        Err(e) => {
            warn!(error = %e, "token verification failed");
            error_response("invalid or expired token", StatusCode::UNAUTHORIZED)
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

/// Base URL and realm the keycloak hook recorded on the active cluster's
/// keycloak service.
fn identity_realm(store: &StateStore) -> StateResult<Option<(String, String)>> {
    for cluster in store.list_clusters()?.into_iter().filter(|c| c.is_active) {
        let Some(keycloak) = store.get_active_service(&cluster.id, "keycloak")? else {
            continue;
        };
        if let (Some(url), Some(realm)) =
            (keycloak.config_str("external_url"), keycloak.config_str("realm"))
        {
            return Ok(Some((url.to_string(), realm.to_string())));
        }
    }
    Ok(None)
}
