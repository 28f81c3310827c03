//! streamlink-api — REST API for the StreamLink control plane.
//!
//! Thin axum layer over the [`Orchestrator`] and the state store.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/catalog` | Service catalog with dependencies |
//! | GET | `/api/v1/clusters` | List active clusters |
//! | POST | `/api/v1/clusters` | Register a cluster |
//! | GET | `/api/v1/clusters/{id}` | One cluster |
//! | PUT | `/api/v1/clusters/{id}` | Update name, API server or kubeconfig |
//! | DELETE | `/api/v1/clusters/{id}` | Deactivate a cluster |
//! | POST | `/api/v1/clusters/{id}/check-status` | Ping a cluster |
//! | GET | `/api/v1/clusters/{id}/services` | Active services on a cluster |
//! | GET | `/api/v1/clusters/{id}/services/{name}/plan` | Preview a deploy |
//! | POST | `/api/v1/clusters/{id}/services/{name}` | Deploy with dependencies |
//! | GET | `/api/v1/clusters/{id}/services/{name}/delete-plan` | Preview a delete |
//! | DELETE | `/api/v1/clusters/{id}/services/{name}?cascade=true` | Delete |
//! | POST | `/api/v1/clusters/{id}/services/{name}/check-status` | Refresh health |
//! | GET | `/api/v1/bootstrap/status` | Bootstrap progress |
//! | GET | `/health` | Liveness check |
//! | GET | `/health/ready` | Readiness check (state store readable) |
//!
//! Everything under `/api/v1` passes through [`auth::require_auth`]: open
//! until Keycloak has been provisioned, bearer-token only afterwards. The
//! health endpoints stay open.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use streamlink_identity::IdentityAdmin;
use streamlink_orchestrator::Orchestrator;
use streamlink_secrets::SecretCodec;
use streamlink_state::StateStore;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: StateStore,
    pub orchestrator: Arc<Orchestrator>,
    /// Encrypts kubeconfigs on cluster registration and update.
    pub codec: Arc<dyn SecretCodec>,
    /// Verifies bearer tokens once authentication is enabled.
    pub identity: Arc<dyn IdentityAdmin>,
}

impl ApiState {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        codec: Arc<dyn SecretCodec>,
        identity: Arc<dyn IdentityAdmin>,
    ) -> Self {
        Self {
            store: orchestrator.state().clone(),
            orchestrator,
            codec,
            identity,
        }
    }
}

/// Build the API router.
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/catalog", get(handlers::get_catalog))
        .route("/clusters", get(handlers::list_clusters).post(handlers::register_cluster))
        .route(
            "/clusters/{id}",
            get(handlers::get_cluster)
                .put(handlers::update_cluster)
                .delete(handlers::deactivate_cluster),
        )
        .route("/clusters/{id}/check-status", post(handlers::check_cluster))
        .route("/clusters/{id}/services", get(handlers::list_services))
        .route(
            "/clusters/{id}/services/{name}",
            post(handlers::deploy_service).delete(handlers::delete_service),
        )
        .route("/clusters/{id}/services/{name}/plan", get(handlers::plan_deployment))
        .route("/clusters/{id}/services/{name}/delete-plan", get(handlers::delete_plan))
        .route("/clusters/{id}/services/{name}/check-status", post(handlers::check_service))
        .route("/bootstrap/status", get(handlers::bootstrap_status))
        .route_layer(from_fn_with_state(state.clone(), auth::require_auth))
        .with_state(state.clone());

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(handlers::liveness))
        .route("/health/ready", get(handlers::readiness).with_state(state))
}
