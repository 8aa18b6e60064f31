//! Correlation tokens and the single-delivery reply waiter.

use crate::client::{ConsumeClient, ReplyDelivery, ReplyQueueClient};
use crate::lease::ReplyQueueLease;
use bytes::Bytes;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use uuid::Uuid;

/// Opaque per-request token matched against the `correlation_id` of replies.
/// Generated once per request, never reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationToken(String);

impl CorrelationToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CorrelationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of waiting on a reply queue.
#[derive(Debug, PartialEq)]
pub enum ReplyOutcome {
    /// The first delivery carried the expected correlation id.
    Matched(Bytes),
    /// The queue was deleted before any delivery arrived.
    Closed,
    /// Consuming failed outright.
    Failed(String),
}

/// Start consuming the leased queue and resolve the returned channel with the
/// first delivery. The queue is single-use: whatever arrives first — the
/// expected reply, a foreign message, or nothing because the queue is gone —
/// the lease is released before the outcome is reported.
///
/// A foreign correlation id resolves nothing: the sender is dropped and the
/// caller runs out its deadline. Replies are at-most-once (no acks, sender
/// applies a TTL), so an ignored message is simply lost.
pub fn await_reply<B>(
    client: B,
    lease: ReplyQueueLease<B>,
    token: CorrelationToken,
) -> oneshot::Receiver<ReplyOutcome>
where
    B: ConsumeClient + ReplyQueueClient,
{
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let outcome = match client.first_delivery(lease.queue_name()).await {
            Ok(Some(delivery)) => match_delivery(delivery, &token),
            Ok(None) => {
                debug!(queue = %lease.queue_name(), "Reply queue closed before a delivery");
                Some(ReplyOutcome::Closed)
            }
            Err(e) => Some(ReplyOutcome::Failed(e.to_string())),
        };
        lease.release().await;
        if let Some(outcome) = outcome {
            // The receiver is gone when the call already settled (timeout,
            // client disconnect); a late reply is dropped on the floor.
            let _ = tx.send(outcome);
        }
    });
    rx
}

fn match_delivery(delivery: ReplyDelivery, token: &CorrelationToken) -> Option<ReplyOutcome> {
    match delivery.correlation_id.as_deref() {
        Some(id) if id == token.as_str() => Some(ReplyOutcome::Matched(delivery.payload)),
        other => {
            warn!(expected = %token, got = ?other, "Ignoring reply with foreign correlation id");
            None
        }
    }
}
