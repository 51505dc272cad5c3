//! HttpBackend against a local stand-in for the web backend.

mod common;

use axum::{
    extract::Query,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use realtime_gateway::backend::{
    DocAuthorizer, HttpBackend, IdentityLookup, Session, TaskLogStore,
};
use realtime_gateway::config::GatewayConfig;
use realtime_gateway::tenant::ConnectRequest;
use realtime_gateway::{Collaborators, Gateway};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

type Params = Query<HashMap<String, String>>;

async fn user_info(headers: HeaderMap, Query(params): Params) -> impl IntoResponse {
    let site = headers
        .get("x-client-site")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let authorization = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    // Token callers must send the credential both ways.
    if authorization == "JWT abc" && params.get("token").map(String::as_str) == Some("abc") {
        return (
            StatusCode::OK,
            Json(json!({"message": {"user": "bob@example.com", "allow_guest": false}})),
        );
    }

    match params.get("sid").map(String::as_str) {
        Some("good-sid") if site == "site1.local" => (
            StatusCode::OK,
            Json(json!({"message": {"user": "alice@example.com", "sid": "good-sid", "allow_guest": 0}})),
        ),
        Some("broken") => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({}))),
        _ => (
            StatusCode::OK,
            Json(json!({"message": {"user": "Guest", "allow_guest": 1}})),
        ),
    }
}

async fn can_subscribe(Query(params): Params) -> StatusCode {
    match params.get("docname").map(String::as_str) {
        Some("INV-1") => StatusCode::OK,
        Some("INV-2") => StatusCode::FORBIDDEN,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn task_log(Query(params): Params) -> Json<serde_json::Value> {
    match params.get("task_id").map(String::as_str) {
        Some("t1") => Json(json!({"message": ["line 1", "line 2"]})),
        _ => Json(json!({"message": null})),
    }
}

async fn spawn_backend() -> String {
    let app = Router::new()
        .route("/api/method/realtime.get_user_info", get(user_info))
        .route("/api/method/realtime.can_subscribe_doc", get(can_subscribe))
        .route("/api/method/realtime.get_task_log", get(task_log));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn session(base_url: &str, sid: Option<&str>) -> Session {
    Session {
        site: "site1.local".into(),
        base_url: Some(base_url.to_string()),
        sid: sid.map(str::to_string),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_identity_lookup() {
    let base = spawn_backend().await;
    let backend = HttpBackend::new(&GatewayConfig::default()).unwrap();

    let info = backend
        .lookup(&session(&base, Some("good-sid")))
        .await
        .unwrap();
    assert_eq!(info.user, "alice@example.com");
    assert!(!info.allow_guest);

    let guest = backend.lookup(&session(&base, None)).await.unwrap();
    assert!(guest.is_guest());
    assert!(guest.allow_guest);

    assert!(backend
        .lookup(&session(&base, Some("broken")))
        .await
        .is_err());
}

#[tokio::test]
async fn test_doc_authorization_statuses() {
    let base = spawn_backend().await;
    let backend = HttpBackend::new(&GatewayConfig::default()).unwrap();
    let session = session(&base, Some("good-sid"));

    assert!(backend.can_subscribe(&session, "Invoice", "INV-1").await.unwrap());
    assert!(!backend.can_subscribe(&session, "Invoice", "INV-2").await.unwrap());
    assert!(backend.can_subscribe(&session, "Invoice", "INV-3").await.is_err());
}

#[tokio::test]
async fn test_task_log_backlog() {
    let base = spawn_backend().await;
    let backend = HttpBackend::new(&GatewayConfig::default()).unwrap();
    let session = session(&base, None);

    assert_eq!(
        backend.task_lines(&session, "t1").await.unwrap(),
        json!(["line 1", "line 2"])
    );
    assert_eq!(
        backend.task_lines(&session, "unknown").await.unwrap(),
        json!({})
    );
}

#[tokio::test]
async fn test_configured_backend_url_wins() {
    let base = spawn_backend().await;
    let config = GatewayConfig {
        backend_url: Some(format!("{}/", base)),
        ..Default::default()
    };
    let backend = HttpBackend::new(&config).unwrap();

    let info = backend
        .lookup(&session("http://127.0.0.1:1", Some("good-sid")))
        .await
        .unwrap();
    assert_eq!(info.user, "alice@example.com");
}

#[tokio::test]
async fn test_unreachable_backend_admits_guest() {
    // Bind then drop a listener so the port refuses connections.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = GatewayConfig {
        backend_url: Some(format!("http://{}", addr)),
        request_timeout_ms: 2_000,
        ..Default::default()
    };
    let backend = Arc::new(HttpBackend::new(&config).unwrap());
    let gateway = Gateway::new(config, Collaborators::http(backend));

    let (tx, _rx) = mpsc::channel(8);
    let request = ConnectRequest {
        site_header: Some("site1.local".into()),
        cookie: Some("sid=good-sid".into()),
        ..Default::default()
    };
    let id = gateway.connect(&request, tx).await;

    assert!(gateway.is_connected(&id));
    assert!(gateway.members("site1.local:all").is_empty());
}

#[tokio::test]
async fn test_token_sent_as_header_and_query() {
    let base = spawn_backend().await;
    let config = GatewayConfig {
        backend_url: Some(base.clone()),
        ..Default::default()
    };
    let backend = Arc::new(HttpBackend::new(&config).unwrap());
    let gateway = Gateway::new(config, Collaborators::http(backend.clone()));

    let (tx, _rx) = mpsc::channel(8);
    let request = ConnectRequest {
        site_header: Some("site1.local".into()),
        authorization: Some("JWT abc".into()),
        ..Default::default()
    };
    let id = gateway.connect(&request, tx).await;

    assert_eq!(gateway.members("site1.local:user:bob@example.com"), vec![id]);

    // The header without the query parameter is not recognised.
    let header_only = Session {
        authorization: Some("JWT abc".into()),
        ..session(&base, None)
    };
    assert!(backend.lookup(&header_only).await.unwrap().is_guest());
}

#[tokio::test]
async fn test_gateway_with_http_backend() {
    let base = spawn_backend().await;
    let config = GatewayConfig {
        backend_url: Some(base),
        ..Default::default()
    };
    let backend = Arc::new(HttpBackend::new(&config).unwrap());
    let gateway = Gateway::new(config, Collaborators::http(backend));

    let (tx, mut rx) = mpsc::channel(8);
    let request = ConnectRequest {
        site_header: Some("site1.local".into()),
        cookie: Some("theme=dark; sid=good-sid".into()),
        ..Default::default()
    };
    let id = gateway.connect(&request, tx).await;

    assert_eq!(
        gateway.members("site1.local:user:alice@example.com"),
        vec![id]
    );
    assert!(!common::drain(&mut rx).is_empty());
}
