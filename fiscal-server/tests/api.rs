//! HTTP API through the router, without a listener

use async_trait::async_trait;
use axum::body::Body;
use fiscal_server::broker::{BrokerConnector, BrokerError, BrokerResult, ConsumerSession};
use fiscal_server::core::{BackgroundTasks, BrokerConfig, Config};
use fiscal_server::{PrinterRegistry, ServerState};
use http::{Request, StatusCode};
use serde_json::{Value, json};
use shared::models::{Brand, DriverConfig, PrinterConfig};
use std::sync::Arc;
use tower::ServiceExt;

struct Offline;

#[async_trait]
impl BrokerConnector for Offline {
    async fn connect(&self, _config: &BrokerConfig) -> BrokerResult<Box<dyn ConsumerSession>> {
        Err(BrokerError::Connection("offline".into()))
    }
}

fn state() -> ServerState {
    let mut config = Config::with_overrides("unused.json", 0);
    config.device_id = "caja-1".into();
    let registry = Arc::new(PrinterRegistry::new(vec![
        PrinterConfig::new("P1", Brand::Epson, DriverConfig::Dummy).with_model("tm-220-af"),
        PrinterConfig::new("A0", Brand::Hasar, DriverConfig::Dummy),
    ]));
    ServerState::with_registry(&config, registry, Arc::new(Offline))
}

async fn call(state: &ServerState, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    let request = match body {
        Some(body) => request.body(Body::from(body.to_string())).unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };
    let response = fiscal_server::api::router(state.clone())
        .oneshot(request)
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_health_reports_queue_and_printers() {
    let state = state();
    let (status, body) = call(&state, "GET", "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["broker"], "disabled");
    assert_eq!(body["printers"], 2);
    assert_eq!(body["queue"]["capacity"], 500);
}

#[tokio::test]
async fn test_printers_sorted_by_name() {
    let state = state();
    let (status, body) = call(&state, "GET", "/api/printers", None).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["A0", "P1"]);
}

#[tokio::test]
async fn test_print_runs_job() {
    let state = state();
    let mut tasks = BackgroundTasks::new();
    state.start_background_tasks(&mut tasks);

    let payload = json!({"printerName": "P1", "openDrawer": {}});
    let (status, body) = call(&state, "POST", "/api/print", Some(payload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["result"]["drawer"], "opened");

    let payload = json!({"printerName": "nobody", "getStatus": {}});
    let (status, body) = call(&state, "POST", "/api/print", Some(payload)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);

    tasks.shutdown().await;
}

#[tokio::test]
async fn test_print_rejects_bad_payload() {
    let state = state();
    let (status, _) = call(&state, "POST", "/api/print", Some(json!({"printTicket": {}}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(state.queue.depth(), 0);

    let (status, _) = call(&state, "POST", "/api/print", Some(json!({"printerName": "P1"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_broker_replace_and_disable() {
    let state = state();

    let (status, _) = call(&state, "PUT", "/api/broker", Some(json!({"host": " "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let creds = json!({"host": "rabbit.local", "user": "fiscal", "password": "s3cret"});
    let (status, body) = call(&state, "PUT", "/api/broker", Some(creds)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["config"]["queue"], "caja-1");
    assert_eq!(body["config"]["password"], "***");
    assert_eq!(state.broker.current().unwrap().password, "s3cret");

    let (status, body) = call(&state, "DELETE", "/api/broker", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("config").is_none());
    assert!(state.broker.current().is_none());
}

#[tokio::test]
async fn test_queue_stats() {
    let state = state();
    let (status, body) = call(&state, "GET", "/api/queue", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["depth"], 0);
    assert_eq!(body["running"], 0);
}
