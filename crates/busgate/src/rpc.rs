//! The RPC request coordinator.
//!
//! `BusGateway::call` owns the whole round trip for one request: lease a
//! private reply queue, start the reply waiter under a fresh correlation
//! token, publish the encoded request on the confirm channel, then race the
//! waiter against the wait window. Whichever of {matching reply, timeout,
//! publish failure, setup failure} happens first settles the call; the lease
//! is released exactly once on every path.

use busgate_amqp::client::{
    BrokerReady, ConfirmPublishClient, ConsumeClient, PublishProperties, ReplyQueueClient,
};
use busgate_amqp::correlation::{self, CorrelationToken, ReplyOutcome};
use busgate_amqp::lease::ReplyQueueLease;
use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;
use tokio::time::{sleep_until, timeout_at, Instant};
use tracing::{debug, instrument, warn};

use crate::config::TimingConfig;
use crate::error::BusError;

const DEFAULT_INTERFACE: &str = "default";

/// One logical bus call: which worker object to invoke and with what payload.
/// Field order is the wire order of the published JSON document.
#[derive(Debug, Clone, Serialize)]
pub struct BusRequest {
    pub app_name: String,
    pub interface_name: String,
    pub object_name: String,
    pub method_name: String,
    pub data: Value,
}

impl BusRequest {
    /// `interface_name` falls back to `"default"` when empty.
    pub fn new(
        app_name: impl Into<String>,
        object_name: impl Into<String>,
        interface_name: impl Into<String>,
        method_name: impl Into<String>,
        data: Value,
    ) -> Self {
        let interface_name = interface_name.into();
        Self {
            app_name: app_name.into(),
            interface_name: if interface_name.is_empty() {
                DEFAULT_INTERFACE.to_string()
            } else {
                interface_name
            },
            object_name: object_name.into(),
            method_name: method_name.into(),
            data,
        }
    }
}

/// A successful round trip: the reply body byte-for-byte, classified by
/// whether it parses as JSON so the HTTP layer can pick a content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusReply {
    Json(String),
    Text(String),
}

impl BusReply {
    fn from_payload(payload: &[u8]) -> Self {
        let text = String::from_utf8_lossy(payload).into_owned();
        if serde_json::from_str::<Value>(&text).is_ok() {
            Self::Json(text)
        } else {
            Self::Text(text)
        }
    }

    pub fn body(&self) -> &str {
        match self {
            Self::Json(body) | Self::Text(body) => body,
        }
    }
}

/// Bridges HTTP calls onto the message bus.
///
/// `broker` is `None` when channel setup failed at startup; calls then fail
/// fast instead of touching the broker.
pub struct BusGateway<B> {
    broker: Option<B>,
    timing: TimingConfig,
}

impl<B> BusGateway<B>
where
    B: BrokerReady + ReplyQueueClient + ConsumeClient + ConfirmPublishClient,
{
    pub fn new(broker: Option<B>, timing: TimingConfig) -> Self {
        Self { broker, timing }
    }

    pub fn is_ready(&self) -> bool {
        self.broker.as_ref().is_some_and(|b| b.is_ready())
    }

    /// Perform one request/reply round trip. Never panics and never returns
    /// before the caller can be answered: every failure is converted to a
    /// [`BusError`] here.
    #[instrument(
        name = "bus.call",
        skip(self, request),
        fields(
            app = %request.app_name,
            object = %request.object_name,
            method = %request.method_name,
        )
    )]
    pub async fn call(&self, request: BusRequest) -> Result<BusReply, BusError> {
        let Some(broker) = self.broker.as_ref().filter(|b| b.is_ready()) else {
            return Err(BusError::Connection);
        };

        let lease = ReplyQueueLease::acquire(broker.clone(), self.timing.queue_expires())
            .await
            .map_err(|e| BusError::lease(e))?;

        let token = CorrelationToken::new();
        let deadline = Instant::now() + self.timing.wait_window();
        let reply_rx = correlation::await_reply(broker.clone(), lease.clone(), token.clone());

        let payload = match serde_json::to_vec(&request) {
            Ok(payload) => Bytes::from(payload),
            Err(e) => {
                lease.release().await;
                return Err(BusError::Unknown(e.to_string()));
            }
        };
        let properties = PublishProperties {
            expiration: self.timing.message_ttl(),
            reply_to: lease.queue_name().to_string(),
            correlation_id: token.to_string(),
        };

        if let Err(e) = broker
            .publish_confirmed(&request.app_name, payload, properties)
            .await
        {
            warn!(error = %e, "Request publish failed");
            lease.release().await;
            return Err(BusError::Broker(e.to_string()));
        }
        debug!(queue = %lease.queue_name(), token = %token, "Request published, awaiting reply");

        let outcome = match timeout_at(deadline, reply_rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => {
                // A foreign reply consumed the queue and the waiter resolved
                // nothing; the call still gets its full window.
                sleep_until(deadline).await;
                lease.release().await;
                return Err(BusError::Timeout);
            }
            Err(_) => {
                lease.release().await;
                return Err(BusError::Timeout);
            }
        };

        match outcome {
            ReplyOutcome::Matched(payload) => Ok(BusReply::from_payload(&payload)),
            ReplyOutcome::Closed => Err(BusError::Broker("Message is null".to_string())),
            ReplyOutcome::Failed(message) => Err(BusError::Broker(message)),
        }
    }
}
