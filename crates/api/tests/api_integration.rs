//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use api::{Config, Services, StaticTokenVerifier};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::UserId;
use inventory::InMemoryLedger;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

const ALICE: &str = "alice-token";
const BOB: &str = "bob-token";

async fn setup() -> (axum::Router, Services) {
    let tokens = StaticTokenVerifier::new();
    tokens.insert(ALICE, UserId::new(1)).await;
    tokens.insert(BOB, UserId::new(2)).await;

    let config = Config {
        handler_timeout: Duration::from_secs(2),
        retry_initial_delay: Duration::from_millis(5),
        ..Config::default()
    };
    let services = Services::start(&config, InMemoryLedger::new(), Arc::new(tokens))
        .await
        .unwrap();
    let app = api::create_app(services.state.clone(), get_metrics_handle());
    (app, services)
}

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn post(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn create_product(app: &axum::Router, name: &str, price: i64, inventory: i64) -> u64 {
    let (status, body) = send(
        app,
        post(
            "/products",
            None,
            json!({ "name": name, "brandName": "Acme", "price": price, "inventory": inventory }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_u64().unwrap()
}

async fn wait_for_outcome(app: &axum::Router, purchase_id: u64, token: &str) -> Value {
    for _ in 0..200 {
        let (status, body) = send(app, get(&format!("/purchases/{purchase_id}"), Some(token))).await;
        if status == StatusCode::OK && !body["outcome"].is_null() {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("purchase {purchase_id} did not finish");
}

#[tokio::test]
async fn test_health_check() {
    let (app, services) = setup().await;

    let (status, body) = send(&app, get("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["deadLetters"], 0);

    services.shutdown().await;
}

#[tokio::test]
async fn test_create_and_get_product() {
    let (app, services) = setup().await;

    let id = create_product(&app, "Widget", 250, 10).await;

    let (status, body) = send(&app, get(&format!("/products/{id}"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Widget");
    assert_eq!(body["inventory"], 10);

    let (status, body) = send(&app, get("/products", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    services.shutdown().await;
}

#[tokio::test]
async fn test_get_missing_product_returns_404() {
    let (app, services) = setup().await;

    let (status, body) = send(&app, get("/products/999", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());

    services.shutdown().await;
}

#[tokio::test]
async fn test_purchase_requires_bearer_token() {
    let (app, services) = setup().await;
    let id = create_product(&app, "Widget", 100, 5).await;
    let cart = json!({ "items": [{ "productId": id, "amount": 1 }], "currencyCode": "USD" });

    let (status, _) = send(&app, post("/purchases", None, cart.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, post("/purchases", Some("nobody"), cart)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    services.shutdown().await;
}

#[tokio::test]
async fn test_purchase_runs_saga_to_completion() {
    let (app, services) = setup().await;
    let id = create_product(&app, "Widget", 100, 5).await;

    let (status, body) = send(
        &app,
        post(
            "/purchases",
            Some(ALICE),
            json!({ "items": [{ "productId": id, "amount": 2 }], "currencyCode": "USD" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let purchase_id = body["purchaseId"].as_u64().unwrap();
    assert!(body["correlationId"].is_string());

    let finished = wait_for_outcome(&app, purchase_id, ALICE).await;
    assert_eq!(finished["outcome"], "ALL_SUCCEEDED");
    assert_eq!(finished["correlationId"], body["correlationId"]);

    let (_, product) = send(&app, get(&format!("/products/{id}"), None)).await;
    assert_eq!(product["inventory"], 3);

    let (status, mine) = send(&app, get("/purchases", Some(ALICE))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mine.as_array().unwrap().len(), 1);

    let (_, theirs) = send(&app, get("/purchases", Some(BOB))).await;
    assert!(theirs.as_array().unwrap().is_empty());

    services.shutdown().await;
}

#[tokio::test]
async fn test_insufficient_stock_is_compensated() {
    let (app, services) = setup().await;
    let id = create_product(&app, "Scarce", 100, 1).await;

    let (status, body) = send(
        &app,
        post(
            "/purchases",
            Some(ALICE),
            json!({ "items": [{ "productId": id, "amount": 3 }], "currencyCode": "USD" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let purchase_id = body["purchaseId"].as_u64().unwrap();
    let finished = wait_for_outcome(&app, purchase_id, ALICE).await;
    assert_eq!(finished["outcome"], "FULLY_COMPENSATED");

    let (_, product) = send(&app, get(&format!("/products/{id}"), None)).await;
    assert_eq!(product["inventory"], 1);

    services.shutdown().await;
}

#[tokio::test]
async fn test_other_users_purchase_is_forbidden() {
    let (app, services) = setup().await;
    let id = create_product(&app, "Widget", 100, 5).await;

    let (_, body) = send(
        &app,
        post(
            "/purchases",
            Some(ALICE),
            json!({ "items": [{ "productId": id, "amount": 1 }], "currencyCode": "USD" }),
        ),
    )
    .await;
    let purchase_id = body["purchaseId"].as_u64().unwrap();
    wait_for_outcome(&app, purchase_id, ALICE).await;

    let (status, _) = send(&app, get(&format!("/purchases/{purchase_id}"), Some(BOB))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    services.shutdown().await;
}

#[tokio::test]
async fn test_invalid_cart_returns_400() {
    let (app, services) = setup().await;
    let id = create_product(&app, "Widget", 100, 5).await;

    let (status, _) = send(
        &app,
        post(
            "/purchases",
            Some(ALICE),
            json!({ "items": [], "currencyCode": "USD" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        post(
            "/purchases",
            Some(ALICE),
            json!({ "items": [{ "productId": id, "amount": 0 }], "currencyCode": "USD" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    services.shutdown().await;
}

#[tokio::test]
async fn test_unknown_product_returns_422() {
    let (app, services) = setup().await;

    let (status, body) = send(
        &app,
        post(
            "/purchases",
            Some(ALICE),
            json!({ "items": [{ "productId": 404, "amount": 1 }], "currencyCode": "USD" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("404"));

    services.shutdown().await;
}

#[tokio::test]
async fn test_unknown_purchase_returns_404() {
    let (app, services) = setup().await;

    let (status, _) = send(&app, get("/purchases/12345", Some(ALICE))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    services.shutdown().await;
}

#[tokio::test]
async fn test_dead_letters_start_empty() {
    let (app, services) = setup().await;

    let (status, body) = send(&app, get("/dead-letters", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().unwrap().is_empty());

    services.shutdown().await;
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, services) = setup().await;
    let id = create_product(&app, "Widget", 100, 5).await;
    let (_, body) = send(
        &app,
        post(
            "/purchases",
            Some(ALICE),
            json!({ "items": [{ "productId": id, "amount": 1 }], "currencyCode": "USD" }),
        ),
    )
    .await;
    wait_for_outcome(&app, body["purchaseId"].as_u64().unwrap(), ALICE).await;

    let response = app.clone().oneshot(get("/metrics", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("purchases_created_total"));

    services.shutdown().await;
}
