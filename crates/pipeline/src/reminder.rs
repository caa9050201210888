//! The reminder business action.
//!
//! Given a parsed `issues` event, decide whether the issue already carries a
//! time estimate and, if not, post a fixed reminder comment through a client
//! obtained from the [`InstallationClientSource`]. This is the only place in
//! the system where a business rule lives; everything around it is transport
//! and authentication plumbing.

use std::sync::Arc;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, info};

use crate::{ActionError, InstallationClientSource, IssuesEvent};

/// The comment posted on issues that lack an estimate.
pub const REMINDER_MESSAGE: &str = "Hello! Please add a time estimate to this issue.

Format: Estimate: X days

Example: Estimate: 3 days

Thanks!";

/// Matches an `Estimate: X days` marker, case-insensitively, anywhere in the
/// issue body. Fractional day counts (`Estimate: 2.5 days`) count as well.
fn estimate_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)estimate:\s*\d+(?:\.\d+)?\s*days?").expect("pattern is well-formed")
    })
}

/// Returns `true` if `body` already contains an estimate marker.
pub fn has_estimate(body: &str) -> bool {
    estimate_pattern().is_match(body)
}

/// Posts estimate reminders on freshly opened issues.
///
/// Safe to invoke repeatedly for the same event: once a reminder (or a real
/// estimate) is in place the estimate check still governs only the issue
/// *body*, so a redelivered task re-posts at worst one duplicate comment —
/// the bounded duplicate-effect window the idempotency store narrows but does
/// not close.
pub struct ReminderAction {
    clients: Arc<dyn InstallationClientSource>,
}

impl ReminderAction {
    /// Creates the action around a client source (the credential cache in
    /// production, a fake in tests).
    pub fn new(clients: Arc<dyn InstallationClientSource>) -> Self {
        Self { clients }
    }

    /// Handles one `issues` event that already passed the worker's action
    /// filter.
    ///
    /// # Errors
    ///
    /// [`ActionError::MissingInstallation`] when the payload has no
    /// installation block, [`ActionError::Credential`] when no client could
    /// be obtained, [`ActionError::Post`] when the comment call failed. All
    /// of these fail the surrounding task so the transport redelivers it.
    pub async fn handle(&self, event: &IssuesEvent) -> Result<(), ActionError> {
        let installation = event
            .installation
            .ok_or(ActionError::MissingInstallation)?;

        let issue = &event.issue;
        info!(
            issue = issue.number.as_u64(),
            title = %issue.title,
            "processing opened issue"
        );

        if has_estimate(issue.body.as_deref().unwrap_or_default()) {
            debug!(issue = issue.number.as_u64(), "issue already has an estimate");
            return Ok(());
        }

        let client = self
            .clients
            .get_client(installation.id)
            .await
            .map_err(|source| ActionError::Credential {
                installation: installation.id,
                source,
            })?;

        client
            .post_comment(
                &event.repository.owner.login,
                &event.repository.name,
                issue.number,
                REMINDER_MESSAGE,
            )
            .await
            .map_err(|source| ActionError::Post {
                issue: issue.number,
                source,
            })?;

        info!(issue = issue.number.as_u64(), "posted reminder comment");
        Ok(())
    }
}
