//! Producing side of the transport.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::info;

use pipeline::{PortError, TaskId, WebhookEnqueuer, WebhookEnvelope};

use crate::task::{QueueKeys, Task, WEBHOOK_TASK_TYPE};
use crate::TransportError;

/// Enqueues webhook envelopes as durable tasks.
///
/// Cheap to clone; all clones share one multiplexed connection. Transient
/// broker errors are not retried here — they propagate to the gateway, whose
/// 500 response makes GitHub redeliver.
#[derive(Clone)]
pub struct QueueClient {
    conn: ConnectionManager,
    keys: QueueKeys,
}

impl QueueClient {
    /// Creates a client producing onto `queue`.
    pub fn new(conn: ConnectionManager, queue: &str) -> Self {
        Self {
            conn,
            keys: QueueKeys::for_queue(queue),
        }
    }

    /// Durably enqueues `envelope`, returning the id of the created task.
    ///
    /// # Errors
    ///
    /// [`TransportError::Encode`] if serialisation fails,
    /// [`TransportError::Redis`] if the push fails.
    pub async fn enqueue_webhook(
        &self,
        envelope: &WebhookEnvelope,
    ) -> Result<TaskId, TransportError> {
        let payload = serde_json::to_vec(envelope)?;
        let task = Task::new(WEBHOOK_TASK_TYPE, payload);
        let encoded = serde_json::to_string(&task)?;

        let mut conn = self.conn.clone();
        let () = conn.lpush(&self.keys.pending, encoded).await?;

        info!(
            task = %task.id,
            delivery = %envelope.delivery_id,
            queue = %self.keys.pending,
            "enqueued webhook task"
        );
        Ok(task.id)
    }
}

#[async_trait]
impl WebhookEnqueuer for QueueClient {
    async fn enqueue(&self, envelope: &WebhookEnvelope) -> Result<TaskId, PortError> {
        self.enqueue_webhook(envelope).await.map_err(Into::into)
    }
}
