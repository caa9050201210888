//! Error type for the GitHub adapter.

use thiserror::Error;

use pipeline::InstallationId;

/// Failures in App authentication, token exchange, or REST calls.
#[derive(Debug, Error)]
pub enum GitHubError {
    /// The App private key could not be parsed as an RSA PEM.
    #[error("invalid App private key: {0}")]
    InvalidKey(#[source] jsonwebtoken::errors::Error),

    /// Signing the App assertion failed.
    #[error("failed to sign App JWT: {0}")]
    Jwt(#[source] jsonwebtoken::errors::Error),

    /// The HTTP layer failed before a response was obtained.
    #[error("GitHub request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The installation-token exchange was refused.
    #[error("token exchange for installation {installation} returned {status}")]
    TokenExchange {
        /// The installation the exchange was attempted for.
        installation: InstallationId,
        /// The HTTP status GitHub answered with.
        status: reqwest::StatusCode,
    },

    /// A REST call completed with a non-success status.
    #[error("GitHub API returned {status}: {body}")]
    Api {
        /// The HTTP status GitHub answered with.
        status: reqwest::StatusCode,
        /// Response body, truncated for logging.
        body: String,
    },
}
