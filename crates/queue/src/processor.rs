//! The webhook task handler: decode, deduplicate, filter, act, record.
//!
//! One attempt walks the task through
//! `decode envelope → idempotency check → decode event → action filter →
//! reminder action → mark processed` and reports a terminal
//! [`Outcome`]; all retrying happens in the runtime.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use pipeline::{IdempotencyStore, IssuesEvent, Outcome, ReminderAction, WebhookEnvelope};

use crate::runtime::TaskHandler;
use crate::task::Task;

/// The only `issues` action that triggers the reminder.
const HANDLED_ACTION: &str = "opened";

/// Processes webhook tasks pulled off the transport.
pub struct WebhookProcessor {
    store: Arc<dyn IdempotencyStore>,
    action: ReminderAction,
}

impl WebhookProcessor {
    /// Creates a processor over the deduplication store and the reminder
    /// action.
    pub fn new(store: Arc<dyn IdempotencyStore>, action: ReminderAction) -> Self {
        Self { store, action }
    }
}

#[async_trait]
impl TaskHandler for WebhookProcessor {
    async fn process(&self, task: &Task) -> Outcome {
        let envelope: WebhookEnvelope = match serde_json::from_slice(&task.payload) {
            Ok(envelope) => envelope,
            Err(err) => return Outcome::Fatal(format!("undecodable task payload: {err}")),
        };

        info!(
            delivery = %envelope.delivery_id,
            event_type = %envelope.event_type,
            "processing webhook"
        );

        // Fails closed: a store outage is "unknown", never "not processed".
        match self.store.is_processed(&envelope.delivery_id).await {
            Ok(true) => {
                info!(delivery = %envelope.delivery_id, "already processed; skipping");
                return Outcome::Success;
            }
            Ok(false) => {}
            Err(err) => return Outcome::Retry(format!("idempotency check failed: {err}")),
        }

        let event: IssuesEvent = match serde_json::from_slice(&envelope.payload) {
            Ok(event) => event,
            Err(err) => return Outcome::Fatal(format!("undecodable issues event: {err}")),
        };

        if event.action != HANDLED_ACTION {
            debug!(delivery = %envelope.delivery_id, action = %event.action, "ignoring action");
            return Outcome::Success;
        }

        if let Err(err) = self.action.handle(&event).await {
            // Not marked processed, so the redelivery re-runs the action; the
            // estimate check makes that safe to repeat.
            return Outcome::Retry(format!("reminder action failed: {err}"));
        }

        // The action already succeeded; failing the task here would only buy
        // an unnecessary redelivery, so a mark failure is logged and dropped.
        if let Err(err) = self
            .store
            .mark_processed(&envelope.delivery_id, Duration::ZERO)
            .await
        {
            warn!(delivery = %envelope.delivery_id, error = %err, "failed to mark processed");
        }

        info!(delivery = %envelope.delivery_id, "webhook processed");
        Outcome::Success
    }
}
