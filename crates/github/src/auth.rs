//! GitHub App assertion signing.
//!
//! A GitHub App authenticates to the token-exchange endpoint with a
//! short-lived JWT signed by the App's RSA private key. The assertion
//! identifies the App (`iss` claim) and is valid for ten minutes — the
//! maximum GitHub accepts.

use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::Serialize;

use crate::GitHubError;

/// Lifetime of one signed assertion, in seconds.
const ASSERTION_LIFETIME_SECS: i64 = 600;

#[derive(Serialize)]
struct Claims {
    iat: i64,
    exp: i64,
    iss: String,
}

/// Signs App assertions from the configured App id and private key.
///
/// The key is parsed once at construction so a malformed PEM fails fast at
/// startup rather than on the first webhook.
pub struct AppAuth {
    app_id: u64,
    key: EncodingKey,
}

impl AppAuth {
    /// Creates an [`AppAuth`] from the App id and the PEM-encoded RSA
    /// private key downloaded from the App settings page.
    ///
    /// # Errors
    ///
    /// [`GitHubError::InvalidKey`] if the PEM cannot be parsed.
    pub fn from_pem(app_id: u64, pem: &[u8]) -> Result<Self, GitHubError> {
        let key = EncodingKey::from_rsa_pem(pem).map_err(GitHubError::InvalidKey)?;
        Ok(Self { app_id, key })
    }

    /// The configured App id.
    pub fn app_id(&self) -> u64 {
        self.app_id
    }

    /// Signs a fresh ten-minute assertion.
    ///
    /// # Errors
    ///
    /// [`GitHubError::Jwt`] if signing fails.
    pub fn generate_jwt(&self) -> Result<String, GitHubError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
            iss: self.app_id.to_string(),
        };

        encode(&Header::new(Algorithm::RS256), &claims, &self.key).map_err(GitHubError::Jwt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_garbage_key_material() {
        let err = AppAuth::from_pem(1234, b"not a pem").err().unwrap();
        assert!(matches!(err, GitHubError::InvalidKey(_)));
    }
}
