//! Shared value types for the EstimateWorks domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! structured values that move between components: the webhook envelope that
//! travels over the task queue, the wall-clock timestamp wrapper, and the
//! terminal outcome of one processing attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::DeliveryId;

// ---------------------------------------------------------------------------
// Webhook envelope
// ---------------------------------------------------------------------------

/// One webhook delivery as captured by the ingress gateway.
///
/// Created at the HTTP boundary after signature verification and event-type
/// filtering, serialised into the task payload, and deserialised again by the
/// worker. Immutable once constructed; the raw event bytes are carried opaque
/// so the gateway never parses GitHub's event schema.
///
/// Wire format (JSON): `{"delivery_id": "...", "event_type": "...", "payload": [...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookEnvelope {
    /// The delivery identifier GitHub sent in `X-GitHub-Delivery`.
    pub delivery_id: DeliveryId,

    /// The event-type tag from `X-GitHub-Event` (e.g. `"issues"`).
    pub event_type: String,

    /// The raw request body, byte-for-byte as received. Parsed into
    /// [`crate::events::IssuesEvent`] only by the worker, after the
    /// idempotency check.
    #[serde(with = "serde_bytes_compat")]
    pub payload: Vec<u8>,
}

impl WebhookEnvelope {
    /// Creates an envelope from the verified parts of an inbound request.
    pub fn new(delivery_id: DeliveryId, event_type: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            delivery_id,
            event_type: event_type.into(),
            payload,
        }
    }
}

/// Serialise the payload as a plain JSON byte array.
///
/// Kept as an explicit module so the wire format is pinned independently of
/// whatever `Vec<u8>` serialises to by default in future serde versions.
mod serde_bytes_compat {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        bytes.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        Vec::<u8>::deserialize(deserializer)
    }
}

// ---------------------------------------------------------------------------
// Processing outcome
// ---------------------------------------------------------------------------

/// Terminal result of one processing attempt for one task.
///
/// The worker processor is a pure function from task to `Outcome`; all retry,
/// backoff, and dead-letter scheduling belongs to the transport runtime. The
/// processor never loops on its own.
#[derive(Debug)]
pub enum Outcome {
    /// The attempt completed; the task must be acknowledged and never
    /// redelivered. Covers genuine success *and* deliberate skips (already
    /// processed, filtered action).
    Success,

    /// The attempt failed in a way that a later attempt may resolve
    /// (store unavailable, token exchange failure, GitHub API failure).
    Retry(String),

    /// The attempt failed in a way no retry can resolve (malformed payload).
    ///
    /// The transport still applies its normal retry policy until the task
    /// dead-letters; the distinction exists so permanent failures are
    /// recognisable in logs before the dead-letter queue is inspected.
    Fatal(String),
}

impl Outcome {
    /// Returns `true` for [`Outcome::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly; the underlying representation can change without affecting the
/// domain API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Seconds since the Unix epoch.
    pub fn unix_seconds(self) -> i64 {
        self.0.timestamp()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trips_through_json() {
        let envelope = WebhookEnvelope::new(
            DeliveryId::new("72d3162e-cc78-11e3-81ab-4c9367dc0958").unwrap(),
            "issues",
            br#"{"action":"opened"}"#.to_vec(),
        );

        let encoded = serde_json::to_vec(&envelope).unwrap();
        let decoded: WebhookEnvelope = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn envelope_wire_field_names_are_stable() {
        let envelope = WebhookEnvelope::new(
            DeliveryId::new("abc").unwrap(),
            "issues",
            vec![1, 2, 3],
        );

        let value: serde_json::Value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["delivery_id"], "abc");
        assert_eq!(value["event_type"], "issues");
        assert_eq!(value["payload"], serde_json::json!([1, 2, 3]));
    }
}
