//! EstimateWorks task transport and worker.
//!
//! A Redis-backed queue giving at-least-once delivery with bounded retries
//! and dead-lettering, plus the worker that drains it.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Key layout, lease bookkeeping, and retry scheduling
//! all live here. The [`pipeline`] crate sees only
//! [`pipeline::WebhookEnqueuer`] on the producing side and hands the
//! consuming side a [`TaskHandler`] that maps one task to a terminal
//! [`pipeline::Outcome`] — the handler never schedules its own retries.
//!
//! ## Queue anatomy
//!
//! Per queue name `<q>`:
//!
//! | Key | Type | Contents |
//! |-----|------|----------|
//! | `queue:<q>:pending` | list | tasks awaiting a worker |
//! | `queue:<q>:active` | list | tasks currently held by a worker |
//! | `queue:<q>:lease` | zset | active tasks, scored by lease deadline |
//! | `queue:<q>:scheduled` | zset | failed tasks, scored by retry time |
//! | `queue:<q>:dead` | list | tasks that exhausted their retry budget |
//!
//! A worker atomically moves one task pending → active (`BLMOVE`) and
//! records a lease. Acknowledgement removes the task from `active` and
//! `lease`; failure moves it to `scheduled` with exponential backoff, or to
//! `dead` once the retry budget is spent. A housekeeping loop promotes due
//! `scheduled` tasks back to `pending`, reclaims expired leases from crashed
//! or hung workers, and requeues `active` members whose lease was never
//! recorded — the redelivery that makes the queue at-least-once rather than
//! at-most-once.

pub mod client;
pub mod errors;
pub mod processor;
pub mod runtime;
pub mod task;

pub use client::QueueClient;
pub use errors::TransportError;
pub use processor::WebhookProcessor;
pub use runtime::{TaskHandler, WorkerConfig, WorkerRuntime};
pub use task::{Task, DEFAULT_MAX_RETRY, DEFAULT_TIMEOUT_SECS, WEBHOOK_QUEUE, WEBHOOK_TASK_TYPE};
