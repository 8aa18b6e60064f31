//! Full-stack gateway tests: HTTP request in, scripted broker behind the
//! client traits, HTTP response out. No running broker required.

use axum::Router;
use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::{Request, StatusCode};
use busgate::bus::{self, GatewayState};
use busgate::config::Config;
use busgate::rpc::BusGateway;
use busgate_amqp::mocks::MockBroker;
use serde_json::{Value, json};
use std::time::Duration;
use tower::ServiceExt;

fn gateway_app(mock: &MockBroker) -> Router {
    let timing = Config::default()
        .with_response_timeout(Duration::from_millis(100))
        .with_message_ttl(Duration::from_millis(50))
        .timing;
    let gateway = BusGateway::new(Some(mock.clone()), timing);
    bus::router(GatewayState::new(gateway))
}

fn bus_post(uri: &str, body: &'static str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn calc_add_round_trip() {
    let mock = MockBroker::new();
    mock.reply_with(b"3".as_slice());
    let app = gateway_app(&mock);

    let response = app
        .oneshot(bus_post(
            "/bus/calc/adder/default/add",
            r#"{"data":{"data":{"a":1,"b":2}}}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "3");

    let published = mock.published();
    assert_eq!(published.len(), 1);
    let request: Value = serde_json::from_slice(&published[0].payload).unwrap();
    assert_eq!(
        request,
        json!({
            "app_name": "calc",
            "interface_name": "default",
            "object_name": "adder",
            "method_name": "add",
            "data": {"a": 1, "b": 2},
        })
    );

    // The per-call queue is gone once the reply is delivered.
    assert_eq!(mock.deleted_queues(), mock.declared_queues());
}

#[tokio::test(start_paused = true)]
async fn silent_worker_yields_timeout_envelope_and_no_leaked_queue() {
    let mock = MockBroker::new();
    let app = gateway_app(&mock);

    let response = app
        .oneshot(bus_post("/bus/calc/adder/default/add", "{}"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let envelope: Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(envelope, json!({"code": -1002, "message": "Timeout error"}));
    assert_eq!(mock.deleted_queues(), mock.declared_queues());
}

#[tokio::test]
async fn rejected_queue_declaration_is_reported_with_the_broker_message() {
    let mock = MockBroker::new();
    mock.fail_declare("access denied");
    let app = gateway_app(&mock);

    let response = app
        .oneshot(bus_post("/bus/calc/adder/default/add", "{}"))
        .await
        .unwrap();

    let envelope: Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(
        envelope,
        json!({
            "code": -1001,
            "message": "Failed to create temporary queue. access denied",
        })
    );
    assert!(mock.published().is_empty());
}

#[tokio::test(start_paused = true)]
async fn concurrent_requests_keep_their_own_replies() {
    let mock = MockBroker::new();
    // First declared queue receives a foreign reply, second the real one.
    mock.reply_with_correlation(Some("foreign"), b"not yours".as_slice());
    mock.reply_with(b"\"mine\"".as_slice());
    let app = gateway_app(&mock);

    // Start the starved call first so it owns the first declared queue,
    // then run the answered call while the starved one is still waiting.
    let starved = tokio::spawn(
        app.clone()
            .oneshot(bus_post("/bus/calc/adder/default/add", "{}")),
    );
    tokio::time::sleep(Duration::from_millis(10)).await;
    let answered = app
        .clone()
        .oneshot(bus_post("/bus/calc/adder/default/mul", "{}"))
        .await
        .unwrap();
    let starved = starved.await.unwrap().unwrap();

    let starved: Value = serde_json::from_str(&body_string(starved).await).unwrap();
    assert_eq!(starved["code"], json!(-1002));

    assert_eq!(body_string(answered).await, "\"mine\"");
    assert_eq!(mock.deleted_queues().len(), 2);
}
