//! The task record carried on the queue, and the key layout around it.

use serde::{Deserialize, Serialize};

use pipeline::TaskId;

/// Queue name for webhook processing.
pub const WEBHOOK_QUEUE: &str = "webhook";

/// Task-type tag for webhook-processing tasks.
pub const WEBHOOK_TASK_TYPE: &str = "webhook:process";

/// Retry budget for one task: five redeliveries after the first attempt.
pub const DEFAULT_MAX_RETRY: u32 = 5;

/// Per-attempt execution deadline. An attempt that has not acknowledged
/// within this window is considered hung and its lease reclaimed.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// One durable unit of work.
///
/// Serialised as JSON; the serialised form *is* the list/zset member in
/// Redis, so a task's raw string must stay byte-identical between the fetch
/// and the acknowledgement that removes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Stable id, generated at enqueue time; unchanged across redeliveries.
    pub id: TaskId,

    /// Task-type tag ([`WEBHOOK_TASK_TYPE`] for everything this system enqueues).
    pub task_type: String,

    /// The serialised [`pipeline::WebhookEnvelope`]. Opaque to the transport;
    /// decoded only by the handler so a malformed payload is the handler's
    /// terminal outcome, not a transport crash.
    pub payload: Vec<u8>,

    /// Number of redeliveries so far (0 on the first attempt).
    pub retry_count: u32,

    /// Retry budget; beyond it the task dead-letters.
    pub max_retry: u32,

    /// Per-attempt execution deadline in seconds.
    pub timeout_secs: u64,
}

impl Task {
    /// Builds a first-attempt task around an encoded payload.
    pub fn new(task_type: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            id: TaskId::new_random(),
            task_type: task_type.into(),
            payload,
            retry_count: 0,
            max_retry: DEFAULT_MAX_RETRY,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Returns `true` once the retry budget is exhausted.
    pub fn retries_exhausted(&self) -> bool {
        self.retry_count >= self.max_retry
    }
}

// ---------------------------------------------------------------------------
// Key layout
// ---------------------------------------------------------------------------

/// Redis key names for one queue.
#[derive(Debug, Clone)]
pub struct QueueKeys {
    pub pending: String,
    pub active: String,
    pub lease: String,
    pub scheduled: String,
    pub dead: String,
}

impl QueueKeys {
    /// Derives the key set for `queue`.
    pub fn for_queue(queue: &str) -> Self {
        Self {
            pending: format!("queue:{queue}:pending"),
            active: format!("queue:{queue}:active"),
            lease: format!("queue:{queue}:lease"),
            scheduled: format!("queue:{queue}:scheduled"),
            dead: format!("queue:{queue}:dead"),
        }
    }
}
