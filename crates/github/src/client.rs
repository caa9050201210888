//! GitHub REST API adapter.
//!
//! Two concrete clients live here:
//!
//! - [`AppClient`] — authenticates as the App (signed assertion) and performs
//!   the installation-token exchange, producing a bound [`RestCommenter`].
//! - [`RestCommenter`] — authenticates with one installation token and
//!   implements the [`pipeline::IssueCommenter`] port.
//!
//! The API base URL is configurable so tests can point both clients at a
//! local mock server.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use pipeline::{InstallationId, IssueCommenter, IssueNumber, OwnerLogin, PortError, RepositoryName};

use crate::{AppAuth, GitHubError};

/// Production GitHub REST endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

const ACCEPT_HEADER: &str = "application/vnd.github+json";
const USER_AGENT: &str = concat!("estimate-works/", env!("CARGO_PKG_VERSION"));

/// A freshly exchanged installation credential and the client bound to it.
pub struct IssuedClient {
    /// Commenter authenticated with the new installation token.
    pub client: Arc<dyn IssueCommenter>,
    /// The opaque installation token (kept for cache bookkeeping only).
    pub token: String,
    /// Absolute expiry GitHub reported for the token.
    pub expires_at: DateTime<Utc>,
}

/// Creates authenticated clients for an installation.
///
/// Seam between the credential cache and the real token exchange; tests
/// substitute a counting fake to observe exchange traffic.
#[async_trait]
pub trait InstallationClientFactory: Send + Sync {
    /// Performs the token exchange for `installation` and returns the bound
    /// client together with the token's expiry.
    async fn create(&self, installation: InstallationId) -> Result<IssuedClient, GitHubError>;
}

#[derive(Deserialize)]
struct InstallationTokenResponse {
    token: String,
    expires_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// App-authenticated client
// ---------------------------------------------------------------------------

/// GitHub client authenticated as the App itself.
///
/// Its only job is the installation-token exchange; all per-installation
/// traffic goes through the [`RestCommenter`] it produces.
pub struct AppClient {
    http: reqwest::Client,
    auth: AppAuth,
    api_base: String,
}

impl AppClient {
    /// Creates an [`AppClient`] against the production API.
    ///
    /// # Errors
    ///
    /// [`GitHubError::Http`] if the underlying HTTP client cannot be built.
    pub fn new(auth: AppAuth) -> Result<Self, GitHubError> {
        Self::with_api_base(auth, DEFAULT_API_BASE)
    }

    /// Creates an [`AppClient`] against a custom API base (tests, GHES).
    ///
    /// # Errors
    ///
    /// [`GitHubError::Http`] if the underlying HTTP client cannot be built.
    pub fn with_api_base(auth: AppAuth, api_base: impl Into<String>) -> Result<Self, GitHubError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(std::time::Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http,
            auth,
            api_base: api_base.into(),
        })
    }
}

#[async_trait]
impl InstallationClientFactory for AppClient {
    async fn create(&self, installation: InstallationId) -> Result<IssuedClient, GitHubError> {
        let assertion = self.auth.generate_jwt()?;

        let url = format!(
            "{}/app/installations/{}/access_tokens",
            self.api_base, installation
        );
        let response = self
            .http
            .post(&url)
            .bearer_auth(&assertion)
            .header(reqwest::header::ACCEPT, ACCEPT_HEADER)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GitHubError::TokenExchange {
                installation,
                status: response.status(),
            });
        }

        let issued: InstallationTokenResponse = response.json().await?;
        debug!(
            installation = installation.as_u64(),
            expires_at = %issued.expires_at,
            "exchanged installation token"
        );

        let commenter = RestCommenter::with_api_base(issued.token.clone(), &self.api_base)?;
        Ok(IssuedClient {
            client: Arc::new(commenter),
            token: issued.token,
            expires_at: issued.expires_at,
        })
    }
}

// ---------------------------------------------------------------------------
// Installation-token client
// ---------------------------------------------------------------------------

/// [`pipeline::IssueCommenter`] implementation over the REST comments API,
/// authenticated with one installation token.
pub struct RestCommenter {
    http: reqwest::Client,
    token: String,
    api_base: String,
}

impl RestCommenter {
    /// Creates a commenter bound to `token` against a custom API base.
    ///
    /// # Errors
    ///
    /// [`GitHubError::Http`] if the underlying HTTP client cannot be built.
    pub fn with_api_base(
        token: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Result<Self, GitHubError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(std::time::Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http,
            token: token.into(),
            api_base: api_base.into(),
        })
    }

    async fn create_comment(
        &self,
        owner: &OwnerLogin,
        repo: &RepositoryName,
        issue: IssueNumber,
        body: &str,
    ) -> Result<(), GitHubError> {
        let url = format!(
            "{}/repos/{}/{}/issues/{}/comments",
            self.api_base, owner, repo, issue
        );
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, ACCEPT_HEADER)
            .json(&json!({ "body": body }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            body.truncate(512);
            return Err(GitHubError::Api { status, body });
        }

        Ok(())
    }
}

#[async_trait]
impl IssueCommenter for RestCommenter {
    async fn post_comment(
        &self,
        owner: &OwnerLogin,
        repo: &RepositoryName,
        issue: IssueNumber,
        body: &str,
    ) -> Result<(), PortError> {
        self.create_comment(owner, repo, issue, body)
            .await
            .map_err(Into::into)
    }
}
