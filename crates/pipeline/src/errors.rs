//! Business-action error type.
//!
//! Infrastructure crates define their own error enums (`GitHubError`,
//! `TransportError`, `StoreError`); this module covers only the failures the
//! reminder action itself can produce. All of them fail the current task so
//! the transport redelivers it.

use thiserror::Error;

use crate::{InstallationId, IssueNumber};

/// Failure of one reminder-action invocation.
#[derive(Debug, Error)]
pub enum ActionError {
    /// The event payload carried no installation block, so no credential can
    /// be obtained. Retrying cannot fix this, but the transport's retry
    /// policy still applies until the task dead-letters.
    #[error("event carries no installation id; cannot authenticate")]
    MissingInstallation,

    /// The credential cache could not supply a client for the installation.
    ///
    /// The cache entry is left untouched by the failure, so a redelivery
    /// retries the token exchange from scratch.
    #[error("failed to obtain client for installation {installation}: {source}")]
    Credential {
        /// The installation the exchange was attempted for.
        installation: InstallationId,
        /// The underlying infrastructure error, stringly-typed so the domain
        /// crate does not depend on infrastructure error enums.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Posting the reminder comment failed.
    #[error("failed to comment on issue #{issue}: {source}")]
    Post {
        /// The issue the comment was destined for.
        issue: IssueNumber,
        /// The underlying infrastructure error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}
