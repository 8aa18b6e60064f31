use crate::client::{
    BrokerReady, ConfirmPublishClient, ConsumeClient, PublishProperties, ReplyDelivery,
    ReplyQueueClient,
};
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How often an idle mock consumer re-checks for a scripted delivery. Under
/// `start_paused` tests this drives the auto-advancing clock.
const IDLE_TICK: Duration = Duration::from_millis(5);

#[derive(Debug, Clone)]
pub struct MockError(pub String);

impl std::fmt::Display for MockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for MockError {}

/// A request recorded by the mock's confirm-publish channel.
#[derive(Debug, Clone)]
pub struct PublishedRequest {
    pub exchange: String,
    pub payload: Bytes,
    pub properties: PublishProperties,
}

#[derive(Debug, Clone)]
enum ReplyCorrelation {
    /// Mirror the correlation id of the request published with this queue as
    /// its reply target — what a well-behaved worker does.
    Echo,
    Fixed(Option<String>),
}

#[derive(Debug, Clone)]
struct ScriptedReply {
    correlation: ReplyCorrelation,
    body: Bytes,
    delay: Duration,
}

#[derive(Default)]
struct MockState {
    not_ready: bool,
    declare_error: Option<String>,
    publish_error: Option<String>,
    consume_error: Option<String>,
    close_reply_queue: bool,
    /// Scripts waiting for a queue; each declared queue takes the next one.
    scripts: VecDeque<ScriptedReply>,
    replies: HashMap<String, ScriptedReply>,
    declared: Vec<String>,
    deleted: Vec<String>,
    published: Vec<PublishedRequest>,
    queue_seq: u32,
}

/// Scripted in-memory stand-in for [`GatewayChannels`](crate::GatewayChannels).
///
/// Replies are scripted up front with `reply_with*`; each queue declared
/// afterwards is bound to the next script in order, so concurrent calls stay
/// isolated the way per-call queues isolate them on a real broker. A queue
/// with no script never delivers, which is how timeout paths are exercised.
///
/// [`GatewayChannels`]: crate::connect::GatewayChannels
#[derive(Clone, Default)]
pub struct MockBroker {
    state: Arc<Mutex<MockState>>,
}

impl std::fmt::Debug for MockBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().unwrap();
        f.debug_struct("MockBroker")
            .field("declared", &state.declared)
            .field("deleted", &state.deleted)
            .field("published", &format!("{} messages", state.published.len()))
            .finish()
    }
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_not_ready(&self) {
        self.state.lock().unwrap().not_ready = true;
    }

    pub fn fail_declare(&self, message: &str) {
        self.state.lock().unwrap().declare_error = Some(message.to_string());
    }

    pub fn fail_publish(&self, message: &str) {
        self.state.lock().unwrap().publish_error = Some(message.to_string());
    }

    pub fn fail_consume(&self, message: &str) {
        self.state.lock().unwrap().consume_error = Some(message.to_string());
    }

    /// Make every consumer see its queue as deleted out from under it.
    pub fn close_reply_queue(&self) {
        self.state.lock().unwrap().close_reply_queue = true;
    }

    /// Script a reply echoing the published correlation id, delivered as soon
    /// as a matching request is published.
    pub fn reply_with(&self, body: impl Into<Bytes>) {
        self.script(ReplyCorrelation::Echo, body.into(), Duration::ZERO);
    }

    /// Script an echoing reply delivered `delay` after the request publish.
    pub fn reply_with_after(&self, body: impl Into<Bytes>, delay: Duration) {
        self.script(ReplyCorrelation::Echo, body.into(), delay);
    }

    /// Script a reply with an explicit (possibly absent) correlation id,
    /// delivered as soon as the queue is consumed.
    pub fn reply_with_correlation(&self, correlation_id: Option<&str>, body: impl Into<Bytes>) {
        self.script(
            ReplyCorrelation::Fixed(correlation_id.map(str::to_string)),
            body.into(),
            Duration::ZERO,
        );
    }

    fn script(&self, correlation: ReplyCorrelation, body: Bytes, delay: Duration) {
        self.state.lock().unwrap().scripts.push_back(ScriptedReply {
            correlation,
            body,
            delay,
        });
    }

    pub fn declared_queues(&self) -> Vec<String> {
        self.state.lock().unwrap().declared.clone()
    }

    pub fn deleted_queues(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }

    pub fn published(&self) -> Vec<PublishedRequest> {
        self.state.lock().unwrap().published.clone()
    }
}

impl BrokerReady for MockBroker {
    fn is_ready(&self) -> bool {
        !self.state.lock().unwrap().not_ready
    }
}

impl ReplyQueueClient for MockBroker {
    type QueueError = MockError;

    async fn declare_reply_queue(&self, _expires: Duration) -> Result<String, MockError> {
        let mut state = self.state.lock().unwrap();
        if let Some(message) = &state.declare_error {
            return Err(MockError(message.clone()));
        }
        state.queue_seq += 1;
        let name = format!("amq.gen-mock-{}", state.queue_seq);
        state.declared.push(name.clone());
        if let Some(script) = state.scripts.pop_front() {
            state.replies.insert(name.clone(), script);
        }
        Ok(name)
    }

    async fn delete_reply_queue(&self, queue: &str) -> Result<(), MockError> {
        self.state.lock().unwrap().deleted.push(queue.to_string());
        Ok(())
    }
}

impl ConsumeClient for MockBroker {
    type ConsumeError = MockError;

    async fn first_delivery(&self, queue: &str) -> Result<Option<ReplyDelivery>, MockError> {
        loop {
            let script = {
                let mut state = self.state.lock().unwrap();
                if let Some(message) = &state.consume_error {
                    return Err(MockError(message.clone()));
                }
                if state.close_reply_queue {
                    return Ok(None);
                }
                let ready = match state.replies.get(queue) {
                    Some(script) => match script.correlation {
                        // An echo reply only exists once the request it would
                        // answer has been published.
                        ReplyCorrelation::Echo => state
                            .published
                            .iter()
                            .any(|p| p.properties.reply_to == queue),
                        ReplyCorrelation::Fixed(_) => true,
                    },
                    None => false,
                };
                if ready { state.replies.remove(queue) } else { None }
            };

            match script {
                Some(script) => {
                    tokio::time::sleep(script.delay).await;
                    let correlation_id = match script.correlation {
                        ReplyCorrelation::Echo => self
                            .state
                            .lock()
                            .unwrap()
                            .published
                            .iter()
                            .find(|p| p.properties.reply_to == queue)
                            .map(|p| p.properties.correlation_id.clone()),
                        ReplyCorrelation::Fixed(id) => id,
                    };
                    return Ok(Some(ReplyDelivery {
                        correlation_id,
                        payload: script.body,
                    }));
                }
                None => tokio::time::sleep(IDLE_TICK).await,
            }
        }
    }
}

impl ConfirmPublishClient for MockBroker {
    type PublishError = MockError;

    async fn publish_confirmed(
        &self,
        exchange: &str,
        payload: Bytes,
        properties: PublishProperties,
    ) -> Result<(), MockError> {
        let mut state = self.state.lock().unwrap();
        if let Some(message) = &state.publish_error {
            return Err(MockError(message.clone()));
        }
        state.published.push(PublishedRequest {
            exchange: exchange.to_string(),
            payload,
            properties,
        });
        Ok(())
    }
}
