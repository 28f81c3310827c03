//! Standalone API tests.
//!
//! Drives the full router the daemon serves: cluster registration,
//! dependency-ordered deploys, plans, cascading deletes and health endpoints, with a
//! fake cluster behind the orchestrator.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use streamlink_api::{ApiState, build_router};
use streamlink_core::ServiceCatalog;
use streamlink_core::config::{KeycloakConfig, PostgresConfig};
use streamlink_executor::testing::{FakeConnector, FakeExecutor, HealthStep};
use streamlink_identity::testing::FakeIdentityAdmin;
use streamlink_orchestrator::{
    HookRegistry, KeycloakHook, Orchestrator, OrchestratorSettings, PostgresHook,
};
use streamlink_secrets::AesGcmCodec;
use streamlink_state::*;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    executor: Arc<FakeExecutor>,
    identity: Arc<FakeIdentityAdmin>,
    store: StateStore,
}

fn test_app() -> TestApp {
    let store = StateStore::open_in_memory().unwrap();
    let executor = Arc::new(FakeExecutor::new());
    executor.set_node_address(Some("203.0.113.7"));
    let identity = Arc::new(FakeIdentityAdmin::new());
    let codec = Arc::new(AesGcmCodec::new(&[5u8; 32]).unwrap());
    let hooks = HookRegistry::new()
        .with(
            "postgres",
            Arc::new(PostgresHook::new(
                codec.clone(),
                PostgresConfig::default(),
                Some("pg-pw".into()),
            )),
        )
        .with(
            "keycloak",
            Arc::new(KeycloakHook::new(
                codec.clone(),
                identity.clone(),
                KeycloakConfig::default(),
                Some("kc-pw".into()),
            )),
        );
    let orchestrator = Orchestrator::new(
        Arc::new(ServiceCatalog::streamlink().unwrap()),
        store.clone(),
        Arc::new(FakeConnector::new(executor.clone())),
        OrchestratorSettings {
            poll_interval: Duration::from_millis(2),
            ready_timeout: Duration::from_millis(50),
        },
    )
    .with_hooks(hooks);
    let router = build_router(ApiState::new(Arc::new(orchestrator), codec, identity.clone()));
    TestApp {
        router,
        executor,
        identity,
        store,
    }
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    send_as(router, method, uri, body, None).await
}

async fn send_as(
    router: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    token: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let req = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn register_cluster(router: &Router) -> String {
    let (status, body) = send(
        router,
        "POST",
        "/api/v1/clusters",
        Some(json!({
            "name": "local",
            "api_server": "https://127.0.0.1:6443",
            "kubeconfig": "apiVersion: v1\nkind: Config\n",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["data"]["id"].as_str().unwrap().to_string()
}

fn names(records: &Value) -> Vec<String> {
    records
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["catalog_name"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn catalog_lists_every_service_with_dependencies() {
    let app = test_app();
    let (status, body) = send(&app.router, "GET", "/api/v1/catalog", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let items = body["data"].as_array().unwrap();
    assert_eq!(items.len(), 8);
    let connect = items.iter().find(|i| i["name"] == "kafka-connect").unwrap();
    assert_eq!(connect["all_dependencies"], json!(["kafka", "schema-registry"]));
}

#[tokio::test]
async fn register_cluster_encrypts_kubeconfig_and_checks_status() {
    let app = test_app();
    let cluster_id = register_cluster(&app.router).await;

    let stored = app.store.get_cluster(&cluster_id).unwrap().unwrap();
    assert_ne!(stored.kubeconfig, "apiVersion: v1\nkind: Config\n");
    assert_eq!(stored.status, ClusterStatus::Up);

    let (status, body) = send(&app.router, "GET", "/api/v1/clusters", None).await;
    assert_eq!(status, StatusCode::OK);
    let clusters = body["data"].as_array().unwrap();
    assert_eq!(clusters.len(), 1);
    assert_eq!(clusters[0]["status"], "up");
    assert!(clusters[0].get("kubeconfig").is_none());
}

#[tokio::test]
async fn deploy_installs_dependencies_then_conflicts() {
    let app = test_app();
    let cluster_id = register_cluster(&app.router).await;
    let uri = format!("/api/v1/clusters/{cluster_id}/services/kafka-connect");

    let (status, body) = send(&app.router, "POST", &uri, None).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["catalog_name"], "kafka-connect");
    assert_eq!(body["data"]["status"], "running");
    assert_eq!(app.executor.applied(), vec!["kafka", "schema-registry", "kafka-connect"]);

    let (status, body) = send(&app.router, "POST", &uri, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);

    let (status, body) = send(
        &app.router,
        "GET",
        &format!("/api/v1/clusters/{cluster_id}/services"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let mut installed = names(&body["data"]);
    installed.sort();
    assert_eq!(installed, vec!["kafka", "kafka-connect", "schema-registry"]);
}

#[tokio::test]
async fn plan_reflects_installed_dependencies() {
    let app = test_app();
    let cluster_id = register_cluster(&app.router).await;

    let (status, _) = send(
        &app.router,
        "POST",
        &format!("/api/v1/clusters/{cluster_id}/services/kafka"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        &app.router,
        "GET",
        &format!("/api/v1/clusters/{cluster_id}/services/kafka-connect/plan"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let plan = &body["data"];
    assert_eq!(plan["target_installed"], false);
    assert_eq!(plan["to_install_count"], 1);
    assert_eq!(plan["entries"][0]["name"], "kafka");
    assert_eq!(plan["entries"][0]["state"], "installed");
    assert_eq!(plan["entries"][1]["name"], "schema-registry");
    assert_eq!(plan["entries"][1]["state"], "will_install");
}

#[tokio::test]
async fn delete_requires_cascade_when_dependents_exist() {
    let app = test_app();
    let cluster_id = register_cluster(&app.router).await;
    let (status, _) = send(
        &app.router,
        "POST",
        &format!("/api/v1/clusters/{cluster_id}/services/kafka-connect"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        &app.router,
        "GET",
        &format!("/api/v1/clusters/{cluster_id}/services/kafka/delete-plan"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["requires_cascade"], true);
    assert_eq!(body["data"]["dependents"], json!(["kafka-connect", "schema-registry"]));

    let kafka = format!("/api/v1/clusters/{cluster_id}/services/kafka");
    let (status, body) = send(&app.router, "DELETE", &kafka, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("kafka-connect"));

    let (status, body) = send(&app.router, "DELETE", &format!("{kafka}?cascade=true"), None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(
        names(&body["data"]["deleted"]),
        vec!["kafka-connect", "schema-registry", "kafka"]
    );
    assert!(app.store.list_active_services(&cluster_id).unwrap().is_empty());
}

#[tokio::test]
async fn failed_deploy_reports_bad_gateway_and_can_be_retried() {
    let app = test_app();
    let cluster_id = register_cluster(&app.router).await;
    let uri = format!("/api/v1/clusters/{cluster_id}/services/schema-registry");

    app.executor.script_health("schema-registry", [HealthStep::Crashed]);
    let (status, body) = send(&app.router, "POST", &uri, None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].as_str().unwrap().contains("schema-registry"));

    app.executor.heal();
    let (status, body) = send(&app.router, "POST", &uri, None).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["status"], "running");
}

#[tokio::test]
async fn deploy_on_unreachable_cluster_is_refused() {
    let app = test_app();
    app.executor.set_reachable(false);
    let cluster_id = register_cluster(&app.router).await;

    let (status, _) = send(
        &app.router,
        "POST",
        &format!("/api/v1/clusters/{cluster_id}/services/kafka"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(app.executor.applied().is_empty());
}

#[tokio::test]
async fn unknown_cluster_and_service_are_not_found() {
    let app = test_app();
    let (status, _) = send(&app.router, "POST", "/api/v1/clusters/nope/services/kafka", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let cluster_id = register_cluster(&app.router).await;
    let (status, _) = send(
        &app.router,
        "POST",
        &format!("/api/v1/clusters/{cluster_id}/services/redis"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app.router, "GET", "/api/v1/clusters/nope/services", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn service_status_check_reports_health() {
    let app = test_app();
    let cluster_id = register_cluster(&app.router).await;
    let uri = format!("/api/v1/clusters/{cluster_id}/services/kafka");
    let (status, _) = send(&app.router, "POST", &uri, None).await;
    assert_eq!(status, StatusCode::CREATED);

    app.executor.script_health("kafka", [HealthStep::Crashed]);
    let (status, body) = send(&app.router, "POST", &format!("{uri}/check-status"), None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "failed");

    let record = app
        .store
        .get_active_service(&cluster_id, "kafka")
        .unwrap()
        .unwrap();
    assert_eq!(record.status, ServiceStatus::Failed);
}

#[tokio::test]
async fn bootstrap_status_starts_disabled() {
    let app = test_app();
    let (status, body) = send(&app.router, "GET", "/api/v1/bootstrap/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["postgres_deployed"], false);
    assert_eq!(body["data"]["keycloak_deployed"], false);
    assert_eq!(body["data"]["ready_for_migration"], false);
    assert_eq!(body["data"]["auth_enabled"], false);
}

#[tokio::test]
async fn bootstrap_status_follows_postgres_readiness() {
    let app = test_app();
    let cluster_id = register_cluster(&app.router).await;
    let (status, _) = send(
        &app.router,
        "POST",
        &format!("/api/v1/clusters/{cluster_id}/services/postgres"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, body) = send(&app.router, "GET", "/api/v1/bootstrap/status", None).await;
    assert_eq!(body["data"]["postgres_deployed"], true);
    assert_eq!(body["data"]["ready_for_migration"], true);
    assert_eq!(body["data"]["keycloak_deployed"], false);

    app.executor.script_health("postgres", [HealthStep::Crashed]);
    let (_, body) = send(&app.router, "GET", "/api/v1/bootstrap/status", None).await;
    assert_eq!(body["data"]["ready_for_migration"], false);
}

#[tokio::test]
async fn api_requires_a_token_once_keycloak_is_provisioned() {
    let app = test_app();
    let cluster_id = register_cluster(&app.router).await;

    // Anonymous until the realm exists.
    let (status, body) = send(
        &app.router,
        "POST",
        &format!("/api/v1/clusters/{cluster_id}/services/keycloak"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert!(app.store.bootstrap_state().unwrap().auth_enabled);

    let (status, body) = send(&app.router, "GET", "/api/v1/catalog", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let (status, _) = send_as(&app.router, "GET", "/api/v1/catalog", None, Some("forged")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    app.identity.accept_token("user-token", "ada");
    let (status, body) = send_as(&app.router, "GET", "/api/v1/catalog", None, Some("user-token")).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(app.identity.endpoints_seen().contains(&"http://203.0.113.7:30081".to_string()));

    // Health endpoints stay open.
    let (status, _) = send(&app.router, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);

    // Removing keycloak opens the API again.
    let (status, _) = send_as(
        &app.router,
        "DELETE",
        &format!("/api/v1/clusters/{cluster_id}/services/keycloak"),
        None,
        Some("user-token"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app.router, "GET", "/api/v1/catalog", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn service_responses_never_carry_credentials() {
    let app = test_app();
    let cluster_id = register_cluster(&app.router).await;
    let (status, body) = send(
        &app.router,
        "POST",
        &format!("/api/v1/clusters/{cluster_id}/services/postgres"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["data"].get("credentials").is_none());

    let stored = app.store.get_active_service(&cluster_id, "postgres").unwrap().unwrap();
    let password = stored.credentials.password.unwrap();

    let (status, body) = send(
        &app.router,
        "GET",
        &format!("/api/v1/clusters/{cluster_id}/services"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"][0].get("credentials").is_none());
    assert!(!body.to_string().contains(&password));
}

#[tokio::test]
async fn cluster_can_be_updated_and_replaced() {
    let app = test_app();
    let cluster_id = register_cluster(&app.router).await;
    let uri = format!("/api/v1/clusters/{cluster_id}");

    let (status, body) = send(&app.router, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "local");
    assert!(body["data"].get("kubeconfig").is_none());

    let before = app.store.get_cluster(&cluster_id).unwrap().unwrap().kubeconfig;
    let (status, body) = send(
        &app.router,
        "PUT",
        &uri,
        Some(json!({ "name": "edge", "kubeconfig": "apiVersion: v1\nkind: Config\n# rotated\n" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["name"], "edge");
    assert_eq!(body["data"]["status"], "up");
    let stored = app.store.get_cluster(&cluster_id).unwrap().unwrap();
    assert_ne!(stored.kubeconfig, before);
    assert!(!stored.kubeconfig.contains("rotated"));

    let (status, body) = send(&app.router, "DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["is_active"], false);

    let (_, body) = send(&app.router, "GET", "/api/v1/clusters", None).await;
    assert!(body["data"].as_array().unwrap().is_empty());
    let (status, _) = send(
        &app.router,
        "POST",
        &format!("{uri}/services/kafka"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    register_cluster(&app.router).await;

    let (status, _) = send(&app.router, "GET", "/api/v1/clusters/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn concurrent_deploy_requests_are_serialized() {
    let app = test_app();
    let cluster_id = register_cluster(&app.router).await;
    app.executor.set_apply_delay(Duration::from_millis(10));
    let uri = format!("/api/v1/clusters/{cluster_id}/services/kafka");

    let (first, second) = tokio::join!(
        send(&app.router, "POST", &uri, None),
        send(&app.router, "POST", &uri, None),
    );

    let mut statuses = vec![first.0, second.0];
    statuses.sort();
    assert_eq!(statuses, vec![StatusCode::CREATED, StatusCode::CONFLICT]);
    assert_eq!(app.executor.applied(), vec!["kafka"]);
}

#[tokio::test]
async fn health_endpoints_answer() {
    let app = test_app();
    let (status, body) = send(&app.router, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "healthy");

    let (status, _) = send(&app.router, "GET", "/health/ready", None).await;
    assert_eq!(status, StatusCode::OK);
}
