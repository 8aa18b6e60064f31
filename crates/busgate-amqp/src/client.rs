use bytes::Bytes;
use std::error::Error;
use std::future::Future;
use std::time::Duration;

/// Reports whether the broker channels behind a client are open.
///
/// The gateway consults this before every call and fails fast instead of
/// queueing work against a dead broker.
pub trait BrokerReady {
    fn is_ready(&self) -> bool;
}

/// One message taken from a reply queue.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyDelivery {
    pub correlation_id: Option<String>,
    pub payload: Bytes,
}

/// Properties stamped on a published request message.
///
/// `expiration` becomes the AMQP per-message TTL (milliseconds on the wire);
/// messages are always published transient (`delivery_mode = 1`).
#[derive(Debug, Clone, PartialEq)]
pub struct PublishProperties {
    pub expiration: Duration,
    pub reply_to: String,
    pub correlation_id: String,
}

pub trait ReplyQueueClient: Send + Sync + Clone + 'static {
    type QueueError: Error + Send + Sync;

    /// Declare a server-named reply queue: exclusive to this connection,
    /// non-durable, auto-delete, and destroyed server-side after `expires`
    /// of disuse.
    fn declare_reply_queue(
        &self,
        expires: Duration,
    ) -> impl Future<Output = Result<String, Self::QueueError>> + Send;

    /// Delete a reply queue. Deleting a queue that no longer exists is not
    /// an error the caller needs to observe.
    fn delete_reply_queue(
        &self,
        queue: &str,
    ) -> impl Future<Output = Result<(), Self::QueueError>> + Send;
}

pub trait ConsumeClient: Send + Sync + Clone + 'static {
    type ConsumeError: Error + Send + Sync;

    /// Consume `queue` in exclusive, no-acknowledgment mode and resolve with
    /// the first delivery. `None` means the queue was deleted out from under
    /// the consumer.
    fn first_delivery(
        &self,
        queue: &str,
    ) -> impl Future<Output = Result<Option<ReplyDelivery>, Self::ConsumeError>> + Send;
}

pub trait ConfirmPublishClient: Send + Sync + Clone + 'static {
    type PublishError: Error + Send + Sync;

    /// Publish to `exchange` with an empty routing key and await broker
    /// confirmation that the message was accepted.
    fn publish_confirmed(
        &self,
        exchange: &str,
        payload: Bytes,
        properties: PublishProperties,
    ) -> impl Future<Output = Result<(), Self::PublishError>> + Send;
}
