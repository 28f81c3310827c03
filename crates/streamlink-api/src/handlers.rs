//! REST API handlers.
//!
//! Reads go straight to the `StateStore`; anything that touches a cluster
//! goes through the `Orchestrator`. Every response uses the same JSON
//! envelope.

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use streamlink_orchestrator::{ClusterUpdate, DeleteOutcome, DeletePlan, OrchestratorError};
use streamlink_state::*;

use crate::ApiState;
use crate::auth::Caller;

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

pub(crate) fn error_response(msg: &str, status: StatusCode) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
        .into_response()
}

pub(crate) fn state_error(e: &StateError) -> Response {
    let status = match e {
        StateError::NotFound(_) => StatusCode::NOT_FOUND,
        StateError::Conflict(_) | StateError::Inactive(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(&e.to_string(), status)
}

fn orchestrator_error(e: &OrchestratorError) -> Response {
    let status = match e {
        OrchestratorError::ClusterNotFound(_) | OrchestratorError::ServiceNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        OrchestratorError::AlreadyDeployed(_)
        | OrchestratorError::HasDependents { .. }
        | OrchestratorError::ConcurrentlyDeleted(_) => StatusCode::CONFLICT,
        OrchestratorError::ClusterUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        OrchestratorError::DependencyDeployFailed { .. }
        | OrchestratorError::DependencyNotReady(_)
        | OrchestratorError::TargetDeployFailed { .. }
        | OrchestratorError::TargetNotReady(_)
        | OrchestratorError::HookFailed { .. }
        | OrchestratorError::Executor(_) => StatusCode::BAD_GATEWAY,
        OrchestratorError::State(inner) => return state_error(inner),
        OrchestratorError::CircularDependency(_)
        | OrchestratorError::InvalidCatalog(_)
        | OrchestratorError::Decryption(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(&e.to_string(), status)
}

// ── Catalog ────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct CatalogItem {
    pub name: String,
    pub display_name: String,
    pub dependencies: Vec<String>,
    /// Transitive prerequisites in install order.
    pub all_dependencies: Vec<String>,
}

/// GET /api/v1/catalog
pub async fn get_catalog(State(state): State<ApiState>) -> Response {
    let catalog = state.orchestrator.catalog();
    let items: Vec<CatalogItem> = catalog
        .entries()
        .iter()
        .map(|e| CatalogItem {
            name: e.name.clone(),
            display_name: e.display_name.clone(),
            dependencies: e.dependencies.clone(),
            all_dependencies: catalog.all_dependencies(&e.name),
        })
        .collect();
    ApiResponse::ok(items).into_response()
}

// ── Clusters ───────────────────────────────────────────────────

/// A cluster as returned by the API. The kubeconfig never leaves the server.
#[derive(Serialize)]
pub struct ClusterView {
    pub id: String,
    pub name: String,
    pub api_server: String,
    pub status: ClusterStatus,
    pub last_checked: Option<u64>,
    pub is_active: bool,
    pub created_at: u64,
    pub updated_at: u64,
}

impl From<ClusterRecord> for ClusterView {
    fn from(c: ClusterRecord) -> Self {
        Self {
            id: c.id,
            name: c.name,
            api_server: c.api_server,
            status: c.status,
            last_checked: c.last_checked,
            is_active: c.is_active,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

/// Cluster registration body.
#[derive(Deserialize)]
pub struct RegisterCluster {
    pub name: String,
    pub api_server: String,
    /// Kubeconfig YAML in plain text; stored encrypted.
    pub kubeconfig: String,
}

/// Cluster update body. Omitted or empty fields are left unchanged.
#[derive(Deserialize, Default)]
pub struct UpdateCluster {
    pub name: Option<String>,
    pub api_server: Option<String>,
    /// Kubeconfig YAML in plain text; stored encrypted.
    pub kubeconfig: Option<String>,
}

/// GET /api/v1/clusters
pub async fn list_clusters(State(state): State<ApiState>) -> Response {
    match state.store.list_clusters() {
        Ok(clusters) => {
            let views: Vec<ClusterView> = clusters
                .into_iter()
                .filter(|c| c.is_active)
                .map(ClusterView::from)
                .collect();
            ApiResponse::ok(views).into_response()
        }
        Err(e) => state_error(&e),
    }
}

/// GET /api/v1/clusters/:id
pub async fn get_cluster(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    match state.orchestrator.cluster(&id) {
        Ok(cluster) => ApiResponse::ok(ClusterView::from(cluster)).into_response(),
        Err(e) => orchestrator_error(&e),
    }
}

/// PUT /api/v1/clusters/:id
///
/// New connection details trigger an immediate reachability check.
pub async fn update_cluster(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateCluster>,
) -> Response {
    let kubeconfig = match req.kubeconfig.filter(|k| !k.is_empty()) {
        Some(plain) => match state.codec.encrypt(&plain) {
            Ok(c) => Some(c),
            Err(e) => return error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR),
        },
        None => None,
    };
    let update = ClusterUpdate {
        name: req.name,
        api_server: req.api_server,
        kubeconfig,
    };
    let cluster = match state.orchestrator.update_cluster(&id, update) {
        Ok(cluster) => cluster,
        Err(e) => return orchestrator_error(&e),
    };
    if cluster.status != ClusterStatus::Unknown {
        return ApiResponse::ok(ClusterView::from(cluster)).into_response();
    }

    if let Err(e) = state.orchestrator.check_cluster(&id).await {
        warn!(cluster_id = %id, error = %e, "cluster check after update failed");
    }
    match state.orchestrator.cluster(&id) {
        Ok(cluster) => ApiResponse::ok(ClusterView::from(cluster)).into_response(),
        Err(e) => orchestrator_error(&e),
    }
}

/// DELETE /api/v1/clusters/:id
pub async fn deactivate_cluster(
    State(state): State<ApiState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Response {
    match state.orchestrator.deactivate_cluster(&id) {
        Ok(cluster) => {
            info!(cluster_id = %id, %caller, "cluster deactivated");
            ApiResponse::ok(ClusterView::from(cluster)).into_response()
        }
        Err(e) => orchestrator_error(&e),
    }
}

/// POST /api/v1/clusters
pub async fn register_cluster(
    State(state): State<ApiState>,
    Json(req): Json<RegisterCluster>,
) -> Response {
    let ciphertext = match state.codec.encrypt(&req.kubeconfig) {
        Ok(c) => c,
        Err(e) => return error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR),
    };
    let cluster = ClusterRecord::new(&req.name, &req.api_server, ciphertext);
    if let Err(e) = state.store.put_new_cluster(&cluster) {
        return state_error(&e);
    }
    info!(cluster_id = %cluster.id, name = %cluster.name, "cluster registered");

    if let Err(e) = state.orchestrator.check_cluster(&cluster.id).await {
        warn!(cluster_id = %cluster.id, error = %e, "initial cluster check failed");
    }
    match state.store.get_cluster(&cluster.id) {
        Ok(Some(stored)) => {
            (StatusCode::CREATED, ApiResponse::ok(ClusterView::from(stored))).into_response()
        }
        Ok(None) => error_response("cluster not found", StatusCode::NOT_FOUND),
        Err(e) => state_error(&e),
    }
}

/// POST /api/v1/clusters/:id/check-status
pub async fn check_cluster(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    match state.orchestrator.check_cluster(&id).await {
        Ok(status) => ApiResponse::ok(serde_json::json!({
            "cluster_id": id,
            "status": status,
        }))
        .into_response(),
        Err(e) => orchestrator_error(&e),
    }
}

// ── Services ───────────────────────────────────────────────────

/// A service record as returned by the API. Stored credentials stay on the
/// server.
#[derive(Serialize)]
pub struct ServiceView {
    pub id: String,
    pub cluster_id: String,
    pub catalog_name: Option<String>,
    pub deployed_name: String,
    pub display_name: String,
    pub namespace: String,
    pub status: ServiceStatus,
    pub hook_pending: bool,
    pub version: Option<String>,
    pub replicas: Option<String>,
    pub last_checked: Option<u64>,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teardown: Option<TeardownOutcome>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl From<DeployedServiceRecord> for ServiceView {
    fn from(r: DeployedServiceRecord) -> Self {
        Self {
            id: r.id,
            cluster_id: r.cluster_id,
            catalog_name: r.catalog_name,
            deployed_name: r.deployed_name,
            display_name: r.display_name,
            namespace: r.namespace,
            status: r.status,
            hook_pending: r.hook_pending,
            version: r.version,
            replicas: r.replicas,
            last_checked: r.last_checked,
            is_active: r.is_active,
            teardown: r.teardown,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Serialize)]
pub struct DeletePlanView {
    pub cluster_id: String,
    pub target: ServiceView,
    pub dependents: Vec<String>,
    pub requires_cascade: bool,
}

impl From<DeletePlan> for DeletePlanView {
    fn from(p: DeletePlan) -> Self {
        Self {
            cluster_id: p.cluster_id,
            target: p.target.into(),
            dependents: p.dependents,
            requires_cascade: p.requires_cascade,
        }
    }
}

#[derive(Serialize)]
pub struct DeleteOutcomeView {
    pub deleted: Vec<ServiceView>,
}

impl From<DeleteOutcome> for DeleteOutcomeView {
    fn from(o: DeleteOutcome) -> Self {
        Self {
            deleted: o.deleted.into_iter().map(ServiceView::from).collect(),
        }
    }
}

/// GET /api/v1/clusters/:id/services
pub async fn list_services(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    match state.store.get_cluster(&id) {
        Ok(Some(_)) => {}
        Ok(None) => return error_response("cluster not found", StatusCode::NOT_FOUND),
        Err(e) => return state_error(&e),
    }
    match state.store.list_active_services(&id) {
        Ok(services) => {
            let views: Vec<ServiceView> = services.into_iter().map(ServiceView::from).collect();
            ApiResponse::ok(views).into_response()
        }
        Err(e) => state_error(&e),
    }
}

/// GET /api/v1/clusters/:id/services/:name/plan
pub async fn plan_deployment(
    State(state): State<ApiState>,
    Path((id, name)): Path<(String, String)>,
) -> Response {
    match state.orchestrator.plan_deployment(&id, &name) {
        Ok(plan) => ApiResponse::ok(plan).into_response(),
        Err(e) => orchestrator_error(&e),
    }
}

/// POST /api/v1/clusters/:id/services/:name
pub async fn deploy_service(
    State(state): State<ApiState>,
    Extension(caller): Extension<Caller>,
    Path((id, name)): Path<(String, String)>,
) -> Response {
    info!(cluster_id = %id, service = %name, %caller, "deploy requested");
    match state.orchestrator.deploy(&id, &name).await {
        Ok(record) => {
            (StatusCode::CREATED, ApiResponse::ok(ServiceView::from(record))).into_response()
        }
        Err(e) => orchestrator_error(&e),
    }
}

/// GET /api/v1/clusters/:id/services/:name/delete-plan
pub async fn delete_plan(
    State(state): State<ApiState>,
    Path((id, name)): Path<(String, String)>,
) -> Response {
    match state.orchestrator.delete_plan(&id, &name) {
        Ok(plan) => ApiResponse::ok(DeletePlanView::from(plan)).into_response(),
        Err(e) => orchestrator_error(&e),
    }
}

#[derive(Deserialize)]
pub struct DeleteQuery {
    #[serde(default)]
    pub cascade: bool,
}

/// DELETE /api/v1/clusters/:id/services/:name?cascade=bool
pub async fn delete_service(
    State(state): State<ApiState>,
    Extension(caller): Extension<Caller>,
    Path((id, name)): Path<(String, String)>,
    Query(query): Query<DeleteQuery>,
) -> Response {
    info!(cluster_id = %id, service = %name, cascade = query.cascade, %caller, "delete requested");
    match state.orchestrator.delete(&id, &name, query.cascade).await {
        Ok(outcome) => ApiResponse::ok(DeleteOutcomeView::from(outcome)).into_response(),
        Err(e) => orchestrator_error(&e),
    }
}

/// POST /api/v1/clusters/:id/services/:name/check-status
pub async fn check_service(
    State(state): State<ApiState>,
    Path((id, name)): Path<(String, String)>,
) -> Response {
    match state.orchestrator.check_status(&id, &name).await {
        Ok(health) => ApiResponse::ok(health).into_response(),
        Err(e) => orchestrator_error(&e),
    }
}

// ── Bootstrap ──────────────────────────────────────────────────

/// GET /api/v1/bootstrap/status
pub async fn bootstrap_status(State(state): State<ApiState>) -> Response {
    match state.orchestrator.bootstrap_report().await {
        Ok(report) => ApiResponse::ok(report).into_response(),
        Err(e) => orchestrator_error(&e),
    }
}

// ── Health ──────────────────────────────────────────────────────

/// GET /health
pub async fn liveness() -> Response {
    ApiResponse::ok(serde_json::json!({
        "status": "healthy",
        "timestamp": epoch_secs(),
    }))
    .into_response()
}

/// GET /health/ready
pub async fn readiness(State(state): State<ApiState>) -> Response {
    match state.store.bootstrap_state() {
        Ok(_) => ApiResponse::ok(serde_json::json!({
            "status": "ready",
            "checks": { "database": true },
        }))
        .into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::SERVICE_UNAVAILABLE),
    }
}
