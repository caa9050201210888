//! The subset of GitHub's `issues` webhook event schema this system reads.
//!
//! GitHub's payload is large; only the fields the reminder action needs are
//! modelled. Everything else is ignored during deserialisation, and the
//! optional fields GitHub occasionally omits (issue body, installation block)
//! are `Option` so a sparse payload deserialises instead of failing.

use serde::{Deserialize, Serialize};

use crate::{InstallationId, IssueNumber, OwnerLogin, RepositoryName};

/// An `issues` event as delivered by GitHub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuesEvent {
    /// What happened to the issue (`"opened"`, `"edited"`, `"closed"`, ...).
    pub action: String,

    /// The issue the event is about.
    pub issue: Issue,

    /// The repository the issue lives in.
    pub repository: Repository,

    /// The App installation that scopes API access for this event.
    ///
    /// Absent when the event did not originate from an App subscription;
    /// the reminder action treats that as an error since it cannot
    /// authenticate without it.
    pub installation: Option<Installation>,
}

/// The issue fields the reminder action reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Issue number within the repository.
    pub number: IssueNumber,

    /// Issue title, used only for logging.
    #[serde(default)]
    pub title: String,

    /// Issue body; `None` when the author left it empty.
    #[serde(default)]
    pub body: Option<String>,
}

/// The repository fields needed to address the comment API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    /// Repository name without the owner segment.
    pub name: RepositoryName,

    /// The owning account.
    pub owner: Owner,
}

/// The owning account of a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    /// Account login.
    pub login: OwnerLogin,
}

/// The App installation block of a webhook payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Installation {
    /// Installation id used for the installation-token exchange.
    pub id: InstallationId,
}
