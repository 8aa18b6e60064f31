//! The bus HTTP surface.
//!
//! One route does the work: `POST /bus/{app}/{object}/{interface}/{method}`
//! turns the request into a [`BusRequest`] and hands it to the coordinator.
//! Outcomes ride in the response body — the status line stays 200 for
//! compatibility with existing bus callers.

use axum::extract::{FromRequest, Multipart, Path, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use busgate_amqp::client::{BrokerReady, ConfirmPublishClient, ConsumeClient, ReplyQueueClient};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

use crate::error::BusError;
use crate::health::{self, HealthState};
use crate::rpc::{BusGateway, BusReply, BusRequest};

/// Shared state handed to every handler.
pub struct GatewayState<B> {
    pub gateway: Arc<BusGateway<B>>,
    pub health: HealthState,
}

impl<B> Clone for GatewayState<B> {
    fn clone(&self) -> Self {
        Self {
            gateway: Arc::clone(&self.gateway),
            health: self.health.clone(),
        }
    }
}

impl<B> GatewayState<B> {
    pub fn new(gateway: BusGateway<B>) -> Self {
        Self {
            gateway: Arc::new(gateway),
            health: HealthState::new(),
        }
    }
}

/// Build the gateway router: the bus route plus health endpoints.
pub fn router<B>(state: GatewayState<B>) -> Router
where
    B: BrokerReady + ReplyQueueClient + ConsumeClient + ConfirmPublishClient,
{
    Router::new()
        .route(
            "/bus/{app_name}/{object_name}/{interface_name}/{method_name}",
            post(bus_handler::<B>),
        )
        .route("/health", get(health::health_handler::<B>))
        .route("/metrics", get(health::metrics_handler::<B>))
        .route("/ready", get(health::ready_handler::<B>))
        .route("/live", get(health::live_handler))
        .with_state(state)
}

async fn bus_handler<B>(
    State(state): State<GatewayState<B>>,
    Path((app_name, object_name, interface_name, method_name)): Path<(
        String,
        String,
        String,
        String,
    )>,
    req: Request,
) -> Response
where
    B: BrokerReady + ReplyQueueClient + ConsumeClient + ConfirmPublishClient,
{
    state.health.increment_requests().await;

    let body = payload_from_request(req).await;
    let data = body
        .get("data")
        .and_then(|d| d.get("data"))
        .cloned()
        .unwrap_or_else(|| Value::Object(Map::new()));

    let request = BusRequest::new(app_name, object_name, interface_name, method_name, data);
    match state.gateway.call(request).await {
        Ok(reply) => {
            state.health.increment_replies().await;
            reply.into_response()
        }
        Err(err) => {
            match err {
                BusError::Timeout => state.health.increment_timeouts().await,
                _ => state.health.increment_errors().await,
            }
            Json(err.envelope()).into_response()
        }
    }
}

impl IntoResponse for BusReply {
    fn into_response(self) -> Response {
        match self {
            Self::Json(body) => ([(CONTENT_TYPE, "application/json")], body).into_response(),
            Self::Text(body) => body.into_response(),
        }
    }
}

/// Parse the request body into a JSON object regardless of how it was
/// encoded. An absent or unreadable body is an empty object — the bus
/// payload is optional by contract.
async fn payload_from_request(req: Request) -> Value {
    let content_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    if content_type.starts_with("multipart/form-data") {
        return match Multipart::from_request(req, &()).await {
            Ok(multipart) => multipart_payload(multipart).await,
            Err(e) => {
                debug!(error = %e, "Unreadable multipart body, treating as empty");
                Value::Object(Map::new())
            }
        };
    }

    let bytes = match axum::body::to_bytes(req.into_body(), usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(error = %e, "Unreadable request body, treating as empty");
            return Value::Object(Map::new());
        }
    };

    if content_type.starts_with("application/x-www-form-urlencoded") {
        form_payload(&bytes)
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::Object(Map::new()))
    }
}

fn form_payload(bytes: &[u8]) -> Value {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(bytes).unwrap_or_default();
    let mut map = Map::new();
    for (key, value) in pairs {
        map.insert(key, text_field(value));
    }
    Value::Object(map)
}

async fn multipart_payload(mut multipart: Multipart) -> Value {
    let mut map = Map::new();
    while let Ok(Some(field)) = multipart.next_field().await {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        if let Ok(text) = field.text().await {
            map.insert(name, text_field(text));
        }
    }
    Value::Object(map)
}

/// Form fields are text on the wire; a field holding a JSON document (like
/// `data`) is decoded so `data.data` stays reachable.
fn text_field(value: String) -> Value {
    serde_json::from_str(&value).unwrap_or(Value::String(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::body::Body;
    use axum::http::{Request as HttpRequest, StatusCode};
    use busgate_amqp::mocks::MockBroker;
    use serde_json::json;
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_router(mock: &MockBroker) -> Router {
        let timing = Config::default()
            .with_response_timeout(Duration::from_millis(100))
            .with_message_ttl(Duration::from_millis(50))
            .timing;
        let gateway = BusGateway::new(Some(mock.clone()), timing);
        router(GatewayState::new(gateway))
    }

    async fn response_body(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn bus_post(uri: &str, content_type: &str, body: impl Into<Body>) -> HttpRequest<Body> {
        HttpRequest::builder()
            .method("POST")
            .uri(uri)
            .header(CONTENT_TYPE, content_type)
            .body(body.into())
            .unwrap()
    }

    #[test]
    fn text_field_decodes_embedded_json() {
        assert_eq!(
            text_field(r#"{"data":{"a":1}}"#.to_string()),
            json!({"data": {"a": 1}})
        );
        assert_eq!(text_field("plain".to_string()), json!("plain"));
    }

    #[test]
    fn form_payload_collects_pairs() {
        let value = form_payload(b"data=%7B%22data%22%3A%7B%22a%22%3A1%7D%7D&other=x");
        assert_eq!(value["data"]["data"]["a"], json!(1));
        assert_eq!(value["other"], json!("x"));
    }

    #[tokio::test]
    async fn json_reply_is_forwarded_verbatim() {
        let mock = MockBroker::new();
        mock.reply_with(b"3".as_slice());
        let app = test_router(&mock);

        let response = app
            .oneshot(bus_post(
                "/bus/calc/adder/default/add",
                "application/json",
                r#"{"data":{"data":{"a":1,"b":2}}}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert_eq!(response_body(response).await, "3");

        let published: Value = serde_json::from_slice(&mock.published()[0].payload).unwrap();
        assert_eq!(published["data"], json!({"a": 1, "b": 2}));
        assert_eq!(published["app_name"], json!("calc"));
    }

    #[tokio::test]
    async fn text_reply_is_served_as_plain_text() {
        let mock = MockBroker::new();
        mock.reply_with(b"pong".as_slice());
        let app = test_router(&mock);

        let response = app
            .oneshot(bus_post(
                "/bus/calc/adder/default/ping",
                "application/json",
                "{}",
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response_body(response).await, "pong");
    }

    #[tokio::test]
    async fn missing_payload_defaults_to_empty_object() {
        let mock = MockBroker::new();
        mock.reply_with(b"1".as_slice());
        let app = test_router(&mock);

        app.oneshot(bus_post(
            "/bus/calc/adder/default/add",
            "application/json",
            r#"{"unrelated": true}"#,
        ))
        .await
        .unwrap();

        let published: Value = serde_json::from_slice(&mock.published()[0].payload).unwrap();
        assert_eq!(published["data"], json!({}));
    }

    #[tokio::test]
    async fn form_body_reaches_the_bus_payload() {
        let mock = MockBroker::new();
        mock.reply_with(b"1".as_slice());
        let app = test_router(&mock);

        let body = serde_urlencoded::to_string([("data", r#"{"data":{"x":7}}"#)]).unwrap();
        app.oneshot(bus_post(
            "/bus/calc/adder/default/add",
            "application/x-www-form-urlencoded",
            body,
        ))
        .await
        .unwrap();

        let published: Value = serde_json::from_slice(&mock.published()[0].payload).unwrap();
        assert_eq!(published["data"], json!({"x": 7}));
    }

    #[tokio::test]
    async fn multipart_body_reaches_the_bus_payload() {
        let mock = MockBroker::new();
        mock.reply_with(b"1".as_slice());
        let app = test_router(&mock);

        let body = concat!(
            "--boundary\r\n",
            "Content-Disposition: form-data; name=\"data\"\r\n",
            "\r\n",
            "{\"data\":{\"x\":7}}\r\n",
            "--boundary--\r\n",
        );
        app.oneshot(bus_post(
            "/bus/calc/adder/default/add",
            "multipart/form-data; boundary=boundary",
            body,
        ))
        .await
        .unwrap();

        let published: Value = serde_json::from_slice(&mock.published()[0].payload).unwrap();
        assert_eq!(published["data"], json!({"x": 7}));
    }

    #[tokio::test]
    async fn errors_come_back_as_http_200_envelopes() {
        let mock = MockBroker::new();
        mock.set_not_ready();
        let app = test_router(&mock);

        let response = app
            .oneshot(bus_post(
                "/bus/calc/adder/default/add",
                "application/json",
                "{}",
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_str(&response_body(response).await).unwrap();
        assert_eq!(body["code"], json!(-1003));
        assert_eq!(body["message"], json!("AMQP Channel is not defined"));
    }

    #[tokio::test]
    async fn ready_reports_broker_state() {
        let mock = MockBroker::new();
        let app = test_router(&mock);
        let response = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/ready")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let degraded = MockBroker::new();
        degraded.set_not_ready();
        let app = test_router(&degraded);
        let response = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/ready")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn metrics_count_requests_and_errors() {
        let mock = MockBroker::new();
        mock.set_not_ready();
        let app = test_router(&mock);

        app.clone()
            .oneshot(bus_post(
                "/bus/calc/adder/default/add",
                "application/json",
                "{}",
            ))
            .await
            .unwrap();

        let response = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let metrics: Value = serde_json::from_str(&response_body(response).await).unwrap();
        assert_eq!(metrics["requests"], json!(1));
        assert_eq!(metrics["errors"], json!(1));
        assert_eq!(metrics["replies"], json!(0));
    }

    #[tokio::test]
    async fn live_is_always_ok() {
        let mock = MockBroker::new();
        let app = test_router(&mock);
        let response = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/live")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
