//! Error type for the task transport.

use thiserror::Error;

/// Transport failure on the producing or consuming side.
///
/// Enqueue failures are not retried by the transport; they propagate to the
/// ingress gateway, which answers the upstream with a server error so GitHub
/// redelivers the webhook.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The Redis round-trip failed.
    #[error("queue backend unavailable: {0}")]
    Redis(#[from] redis::RedisError),

    /// A task could not be serialised for the wire.
    #[error("failed to encode task: {0}")]
    Encode(#[from] serde_json::Error),
}
