//! EstimateWorks webhook ingress.
//!
//! Receives GitHub webhook deliveries over HTTP, authenticates them against
//! the shared webhook secret, filters the event types this system handles,
//! and enqueues the rest as durable tasks through the
//! [`pipeline::WebhookEnqueuer`] port. No business logic runs here — an
//! accepted request produces exactly one enqueue call and a `200`.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP framing, header parsing, and signature
//! verification live here; the [`pipeline`] crate sees only the envelope.
//!
//! ## Response contract
//!
//! | Condition | Status |
//! |-----------|--------|
//! | accepted, or event type intentionally ignored | 200 |
//! | missing `X-GitHub-Delivery` | 400 |
//! | absent / malformed / mismatched `X-Hub-Signature-256` | 401 |
//! | non-POST on `/webhook` | 405 |
//! | enqueue failed (GitHub redelivers on this) | 500 |
//!
//! `GET /health` answers `200 OK` unconditionally, regardless of downstream
//! health.

pub mod server;
pub mod signature;

pub use server::{router, serve, ListenerState};
pub use signature::verify_signature;
