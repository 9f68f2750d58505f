//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use api::AppState;
use api::config::Config;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use tower::ServiceExt;
use transaction_log::{
    InMemoryTransactionLogStore, TransactionLogEntry, TransactionLogStore, TransactionStatus,
};
use uuid::Uuid;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn setup() -> (axum::Router, Arc<AppState<InMemoryTransactionLogStore>>) {
    let (app, state, _) = setup_with_store();
    (app, state)
}

fn setup_with_store() -> (
    axum::Router,
    Arc<AppState<InMemoryTransactionLogStore>>,
    InMemoryTransactionLogStore,
) {
    let store = InMemoryTransactionLogStore::new();
    let (state, _relay) = api::create_default_state(store.clone(), &Config::default());
    let app = api::create_app(Arc::clone(&state), get_metrics_handle());
    (app, state, store)
}

async fn send(app: &axum::Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

fn order_body(order_id: Uuid) -> Value {
    json!({
        "orderId": order_id,
        "userId": "user-42",
        "items": [{"sku": "SKU-001", "quantity": 2, "unitPrice": 2999}],
        "totalAmount": 5998,
        "creditCardNumber": "4111111111111111"
    })
}

#[tokio::test]
async fn test_health_check() {
    let (app, _) = setup();

    let (status, json) = send(&app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["activeMonitors"], 0);
}

#[tokio::test]
async fn test_confirm_order_starts_saga() {
    let (app, state) = setup();
    let order_id = Uuid::new_v4();

    let (status, json) = send(&app, "POST", "/api/v1/orders/confirm", Some(order_body(order_id))).await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["status"], "PROCESSING");
    let tx_id = json["txId"].as_str().unwrap().to_string();
    assert_eq!(state.monitors.active_count(), 1);

    let (status, json) = send(&app, "GET", &format!("/api/v1/transactions/{tx_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["overallStatus"], "PROCESSING");
    assert_eq!(json["orderId"], order_id.to_string());
    let services = json["services"].as_array().unwrap();
    assert_eq!(services.len(), 3);
    assert_eq!(services[0]["serviceName"], "CREDIT_CARD");
    assert_eq!(services[0]["status"], "PENDING");

    let (_, json) = send(&app, "GET", "/api/v1/admin/monitors", None).await;
    assert_eq!(json["count"], 1);
    assert_eq!(json["txIds"][0], tx_id.as_str());
}

#[tokio::test]
async fn test_confirm_rejects_invalid_order() {
    let (app, state) = setup();
    let mut body = order_body(Uuid::new_v4());
    body["items"] = json!([]);
    body["totalAmount"] = json!(0);

    let (status, json) = send(&app, "POST", "/api/v1/orders/confirm", Some(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().is_some());
    assert_eq!(state.monitors.active_count(), 0);
}

#[tokio::test]
async fn test_confirm_rejects_total_mismatch() {
    let (app, _) = setup();
    let mut body = order_body(Uuid::new_v4());
    body["totalAmount"] = json!(100);

    let (status, _) = send(&app, "POST", "/api/v1/orders/confirm", Some(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_confirm_rejects_overflowing_amount() {
    let (app, state) = setup();
    let body = json!({
        "orderId": Uuid::new_v4(),
        "userId": "user-42",
        "items": [{"sku": "SKU-001", "quantity": 2, "unitPrice": i64::MAX}],
        "creditCardNumber": "4111111111111111"
    });

    let (status, json) = send(&app, "POST", "/api/v1/orders/confirm", Some(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().ends_with("Order amount overflows"));
    assert_eq!(state.monitors.active_count(), 0);
}

fn reply_body(tx_id: &str, order_id: Uuid, service: &str, message_type: &str) -> Value {
    json!({
        "txId": tx_id,
        "orderId": order_id,
        "serviceName": service,
        "messageType": message_type,
        "participantReference": "REF-0001",
        "timestamp": "2026-01-01T00:00:00Z",
        "correlationId": tx_id
    })
}

#[tokio::test]
async fn test_participant_reply_is_recorded() {
    let (app, _) = setup();
    let order_id = Uuid::new_v4();
    let (_, json) = send(&app, "POST", "/api/v1/orders/confirm", Some(order_body(order_id))).await;
    let tx_id = json["txId"].as_str().unwrap().to_string();

    let body = reply_body(&tx_id, order_id, "CREDIT_CARD", "EXECUTE_SUCCESS");
    let (status, json) = send(&app, "POST", "/api/v1/participants/replies", Some(body)).await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["recorded"], true);
    assert_eq!(json["status"], "SUCCESS");
    let (_, json) = send(&app, "GET", &format!("/api/v1/transactions/{tx_id}"), None).await;
    assert_eq!(json["services"][0]["status"], "SUCCESS");
}

#[tokio::test]
async fn test_late_participant_success_is_compensated() {
    let (app, _, store) = setup_with_store();
    let order_id = Uuid::new_v4();
    let (_, json) = send(&app, "POST", "/api/v1/orders/confirm", Some(order_body(order_id))).await;
    let tx_id = json["txId"].as_str().unwrap().to_string();
    let parsed = common::TxId::from_uuid(Uuid::parse_str(&tx_id).unwrap());
    store
        .append(TransactionLogEntry::new(
            parsed,
            common::OrderId::from_uuid(order_id),
            common::ServiceName::Logistics,
            TransactionStatus::Done,
        ))
        .await
        .unwrap();

    let body = reply_body(&tx_id, order_id, "LOGISTICS", "EXECUTE_SUCCESS");
    let (status, json) = send(&app, "POST", "/api/v1/participants/replies", Some(body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["recorded"], false);
    assert_eq!(json["status"], "ROLLED_BACK");
    let entries = store.entries_for_transaction(parsed).await.unwrap();
    assert!(!entries.iter().any(|e| e.status == TransactionStatus::Success));
}

#[tokio::test]
async fn test_command_posted_as_reply_is_rejected() {
    let (app, _) = setup();
    let tx_id = Uuid::new_v4().to_string();

    let body = reply_body(&tx_id, Uuid::new_v4(), "INVENTORY", "EXECUTE_COMMAND");
    let (status, _) = send(&app, "POST", "/api/v1/participants/replies", Some(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_transaction_is_not_found() {
    let (app, _) = setup();

    let uri = format!("/api/v1/transactions/{}", Uuid::new_v4());
    let (status, json) = send(&app, "GET", &uri, None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().unwrap().contains("not found"));
}

#[tokio::test]
async fn test_invalid_transaction_id_format() {
    let (app, _) = setup();

    let (status, _) = send(&app, "GET", "/api/v1/transactions/not-a-uuid", None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_order_history_lists_newest_first() {
    let (app, _) = setup();
    let order_id = Uuid::new_v4();

    let (_, first) = send(&app, "POST", "/api/v1/orders/confirm", Some(order_body(order_id))).await;
    let (_, second) = send(&app, "POST", "/api/v1/orders/confirm", Some(order_body(order_id))).await;

    let uri = format!("/api/v1/orders/{order_id}/transactions");
    let (status, json) = send(&app, "GET", &uri, None).await;

    assert_eq!(status, StatusCode::OK);
    let transactions = json["transactions"].as_array().unwrap();
    assert_eq!(transactions.len(), 2);
    assert_eq!(transactions[0]["txId"], second["txId"]);
    assert_eq!(transactions[1]["txId"], first["txId"]);
}

#[tokio::test]
async fn test_config_staging_and_apply() {
    let (app, _) = setup();

    let (status, json) = send(&app, "GET", "/api/v1/admin/config/active", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 3);

    let (status, _) = send(&app, "GET", "/api/v1/admin/config/pending", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let staged = json!([
        {"order": 1, "serviceName": "INVENTORY", "timeoutSeconds": 45},
        {"order": 2, "serviceName": "CREDIT_CARD", "timeoutSeconds": 30}
    ]);
    let (status, json) = send(&app, "PUT", "/api/v1/admin/config/pending", Some(staged)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json[0]["serviceName"], "INVENTORY");

    let (status, json) = send(&app, "POST", "/api/v1/admin/config/apply", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 2);

    let (_, json) = send(&app, "GET", "/api/v1/admin/config/active", None).await;
    assert_eq!(json[0]["serviceName"], "INVENTORY");
    assert_eq!(json[0]["timeoutSeconds"], 45);
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let (app, _) = setup();
    let duplicate = json!([
        {"order": 1, "serviceName": "INVENTORY", "timeoutSeconds": 45},
        {"order": 1, "serviceName": "CREDIT_CARD", "timeoutSeconds": 30}
    ]);

    let (status, json) = send(&app, "PUT", "/api/v1/admin/config/pending", Some(duplicate)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("Duplicate service order: 1"));
    let (status, _) = send(&app, "GET", "/api/v1/admin/config/pending", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_apply_without_pending_is_conflict() {
    let (app, _) = setup();

    let (status, json) = send(&app, "POST", "/api/v1/admin/config/apply", None).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert!(json["error"].as_str().unwrap().contains("No pending configuration"));
}

#[tokio::test]
async fn test_discard_pending() {
    let (app, _) = setup();
    let staged = json!([{"order": 1, "serviceName": "LOGISTICS", "timeoutSeconds": 120}]);
    send(&app, "PUT", "/api/v1/admin/config/pending", Some(staged)).await;

    let (status, _) = send(&app, "DELETE", "/api/v1/admin/config/pending", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, "DELETE", "/api/v1/admin/config/pending", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, _) = setup();
    send(&app, "POST", "/api/v1/orders/confirm", Some(order_body(Uuid::new_v4()))).await;

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("saga_started_total"));
}
