//! Core domain for EstimateWorks.
//!
//! This crate contains every domain concept, newtype identifier, shared
//! primitive type, port trait, and the one piece of business logic the system
//! has: deciding whether a freshly opened issue needs an estimate reminder.
//! Infrastructure crates implement the traits defined here; they never add
//! domain rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed; infrastructure crates define *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype domain identifiers (`DeliveryId`, `InstallationId`, etc.) |
//! | [`types`] | Shared value types (`WebhookEnvelope`, `Timestamp`, `Outcome`) |
//! | [`events`] | The subset of GitHub's `issues` event schema this system reads |
//! | [`errors`] | Business-action error type |
//! | [`ports`] | Traits implemented by infrastructure (`IssueCommenter`, stores, queue) |
//! | [`reminder`] | The estimate check and the reminder action itself |

pub mod errors;
pub mod events;
pub mod identifiers;
pub mod ports;
pub mod reminder;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use errors::ActionError;
pub use events::{Installation, Issue, IssuesEvent, Owner, Repository};
pub use identifiers::{DeliveryId, InstallationId, IssueNumber, OwnerLogin, RepositoryName, TaskId};
pub use ports::{
    IdempotencyStore, InstallationClientSource, IssueCommenter, PortError, WebhookEnqueuer,
};
pub use reminder::{has_estimate, ReminderAction, REMINDER_MESSAGE};
pub use types::{Outcome, Timestamp, WebhookEnvelope};
