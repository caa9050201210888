//! Port traits implemented by infrastructure crates.
//!
//! The domain depends only on these narrow capabilities; concrete adapters
//! (GitHub REST client, Redis queue, Redis store) live in their own crates
//! and are injected at the composition root. Every trait here is
//! object-safe so tests can substitute hand-rolled fakes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::{
    DeliveryId, InstallationId, IssueNumber, OwnerLogin, RepositoryName, TaskId, WebhookEnvelope,
};

/// Boxed error type for port boundaries.
///
/// Ports deliberately do not expose infrastructure error enums; the caller
/// only ever decides "retry or not", and the message is carried for logs.
pub type PortError = Box<dyn std::error::Error + Send + Sync>;

// ---------------------------------------------------------------------------
// GitHub-facing ports
// ---------------------------------------------------------------------------

/// The one GitHub capability the business action needs: posting an issue
/// comment under an already-authenticated client.
#[async_trait]
pub trait IssueCommenter: Send + Sync {
    /// Posts `body` as a new comment on the given issue.
    async fn post_comment(
        &self,
        owner: &OwnerLogin,
        repo: &RepositoryName,
        issue: IssueNumber,
        body: &str,
    ) -> Result<(), PortError>;
}

/// Supplies an authenticated [`IssueCommenter`] for an installation.
///
/// Implemented by the credential cache. The returned client is bound to a
/// token that is guaranteed usable for at least the cache's safety buffer,
/// so callers never hold a token that expires mid-request.
#[async_trait]
pub trait InstallationClientSource: Send + Sync {
    /// Returns a client scoped to `installation`, obtaining or refreshing the
    /// underlying installation token if necessary.
    async fn get_client(
        &self,
        installation: InstallationId,
    ) -> Result<Arc<dyn IssueCommenter>, PortError>;
}

// ---------------------------------------------------------------------------
// Pipeline-facing ports
// ---------------------------------------------------------------------------

/// Records which deliveries have already been fully processed.
///
/// `is_processed` followed by `mark_processed` is deliberately *not* atomic
/// with the business action in between: two concurrent redeliveries of the
/// same task can both observe "not processed" in a narrow window and run the
/// action twice. The action is idempotent at the business-rule level, so the
/// window is accepted instead of being closed with a distributed lock.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Returns `true` iff a record for `delivery` exists and has not expired.
    ///
    /// A store failure must propagate; treating it as "not processed" would
    /// defeat the purpose of the store.
    async fn is_processed(&self, delivery: &DeliveryId) -> Result<bool, PortError>;

    /// Writes (or overwrites) the record for `delivery` with the current
    /// timestamp. A zero `ttl` selects the store's default retention.
    async fn mark_processed(&self, delivery: &DeliveryId, ttl: Duration) -> Result<(), PortError>;
}

/// Accepts verified webhook envelopes for durable, retried processing.
///
/// Implemented by the task transport; the ingress gateway is its only caller.
/// An enqueue failure propagates to the gateway, which answers the upstream
/// with a server error so GitHub redelivers.
#[async_trait]
pub trait WebhookEnqueuer: Send + Sync {
    /// Durably enqueues `envelope` for processing, returning the id of the
    /// created task.
    async fn enqueue(&self, envelope: &WebhookEnvelope) -> Result<TaskId, PortError>;
}
