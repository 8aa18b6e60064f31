//! Health check and metrics endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use busgate_amqp::client::{BrokerReady, ConfirmPublishClient, ConsumeClient, ReplyQueueClient};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::RwLock;

use crate::bus::GatewayState;

/// Health check status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub uptime_seconds: u64,
    pub amqp_ready: bool,
}

/// In-process counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metrics {
    pub requests: u64,
    pub replies: u64,
    pub timeouts: u64,
    pub errors: u64,
}

/// Shared counter state.
#[derive(Clone)]
pub struct HealthState {
    metrics: Arc<RwLock<Metrics>>,
    start_time: SystemTime,
}

impl HealthState {
    pub fn new() -> Self {
        Self {
            metrics: Arc::new(RwLock::new(Metrics::default())),
            start_time: SystemTime::now(),
        }
    }

    pub async fn increment_requests(&self) {
        self.metrics.write().await.requests += 1;
    }

    pub async fn increment_replies(&self) {
        self.metrics.write().await.replies += 1;
    }

    pub async fn increment_timeouts(&self) {
        self.metrics.write().await.timeouts += 1;
    }

    pub async fn increment_errors(&self) {
        self.metrics.write().await.errors += 1;
    }

    pub async fn snapshot(&self) -> Metrics {
        self.metrics.read().await.clone()
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

/// Health check endpoint handler.
pub async fn health_handler<B>(
    State(state): State<GatewayState<B>>,
) -> (StatusCode, Json<HealthStatus>)
where
    B: BrokerReady + ReplyQueueClient + ConsumeClient + ConfirmPublishClient,
{
    let uptime = state
        .health
        .start_time
        .elapsed()
        .unwrap_or_default()
        .as_secs();
    let amqp_ready = state.gateway.is_ready();

    let (status, status_code) = if amqp_ready {
        ("healthy", StatusCode::OK)
    } else {
        ("degraded", StatusCode::SERVICE_UNAVAILABLE)
    };

    (
        status_code,
        Json(HealthStatus {
            status: status.to_string(),
            uptime_seconds: uptime,
            amqp_ready,
        }),
    )
}

/// Metrics endpoint handler.
pub async fn metrics_handler<B>(State(state): State<GatewayState<B>>) -> Json<Metrics>
where
    B: BrokerReady + ReplyQueueClient + ConsumeClient + ConfirmPublishClient,
{
    Json(state.health.snapshot().await)
}

/// Readiness check (ready to accept traffic).
pub async fn ready_handler<B>(State(state): State<GatewayState<B>>) -> StatusCode
where
    B: BrokerReady + ReplyQueueClient + ConsumeClient + ConfirmPublishClient,
{
    if state.gateway.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Liveness check (process is alive).
pub async fn live_handler() -> StatusCode {
    StatusCode::OK
}
