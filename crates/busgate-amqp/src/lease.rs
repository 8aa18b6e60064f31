//! Reply-queue leases.
//!
//! Each in-flight request owns exactly one server-named reply queue. The
//! reply waiter, the coordinator's timeout path, and the coordinator's error
//! paths all race to tear it down; `release` arbitrates so the delete happens
//! at most once, and the broker-side `x-expires` covers the case where no
//! path ever runs.

use crate::client::ReplyQueueClient;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// One private reply queue, owned by exactly one in-flight request.
pub struct ReplyQueueLease<Q: ReplyQueueClient> {
    inner: Arc<LeaseInner<Q>>,
}

struct LeaseInner<Q: ReplyQueueClient> {
    client: Q,
    queue_name: String,
    released: AtomicBool,
}

impl<Q: ReplyQueueClient> Clone for ReplyQueueLease<Q> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<Q: ReplyQueueClient> std::fmt::Debug for ReplyQueueLease<Q> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplyQueueLease")
            .field("queue_name", &self.inner.queue_name)
            .field("released", &self.inner.released.load(Ordering::SeqCst))
            .finish()
    }
}

impl<Q: ReplyQueueClient> ReplyQueueLease<Q> {
    /// Declare the reply queue. `expires` is the server-side disuse backstop.
    pub async fn acquire(client: Q, expires: Duration) -> Result<Self, Q::QueueError> {
        let queue_name = client.declare_reply_queue(expires).await?;
        debug!(queue = %queue_name, "Declared reply queue");
        Ok(Self {
            inner: Arc::new(LeaseInner {
                client,
                queue_name,
                released: AtomicBool::new(false),
            }),
        })
    }

    pub fn queue_name(&self) -> &str {
        &self.inner.queue_name
    }

    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::SeqCst)
    }

    /// Delete the queue. Idempotent: the first caller wins, later calls are
    /// no-ops. A delete error is logged and swallowed — the queue either no
    /// longer exists or will expire server-side.
    pub async fn release(&self) {
        if self.inner.released.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self
            .inner
            .client
            .delete_reply_queue(&self.inner.queue_name)
            .await
        {
            warn!(queue = %self.inner.queue_name, error = %e, "Failed to delete reply queue");
        } else {
            debug!(queue = %self.inner.queue_name, "Deleted reply queue");
        }
    }
}

impl<Q: ReplyQueueClient> Drop for LeaseInner<Q> {
    fn drop(&mut self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        // The owning future can be dropped mid-flight (client disconnect);
        // the delete still has to happen.
        let client = self.client.clone();
        let queue = self.queue_name.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let _ = client.delete_reply_queue(&queue).await;
            });
        }
    }
}
