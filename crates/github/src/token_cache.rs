//! Per-installation credential cache with stampede control.
//!
//! Installation tokens are valid for about an hour; exchanging one costs a
//! signed assertion plus a round-trip to GitHub. This cache keeps one bound
//! client per installation and refreshes it lazily once the token comes
//! within [`SAFETY_BUFFER_SECS`] of expiry, so no caller is ever handed a
//! token that expires mid-use.
//!
//! ## Locking discipline
//!
//! The map is guarded by a single `tokio::sync::RwLock`:
//!
//! 1. **Fast path** — read lock, return the cached client while it is still
//!    inside the buffer. The common case takes no exclusive lock.
//! 2. **Slow path** — write lock, then *re-check* the entry. Concurrent
//!    callers that missed the fast path simultaneously serialise on the
//!    write lock; whichever runs first performs the exchange and every
//!    waiter finds the fresh entry during its re-check. At most one exchange
//!    is in flight per cache at any instant.
//!
//! A failed exchange leaves the previous entry (or absence) untouched, so a
//! later call retries instead of finding a poisoned cache.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use async_trait::async_trait;
use pipeline::{InstallationClientSource, InstallationId, IssueCommenter, PortError};

use crate::client::InstallationClientFactory;
use crate::GitHubError;

/// A token must have at least this long to live before it is handed out.
pub const SAFETY_BUFFER_SECS: i64 = 5 * 60;

struct CachedToken {
    /// Inspected only by the test hook; never read on the production path.
    #[cfg_attr(not(test), allow(dead_code))]
    token: String,
    expires_at: DateTime<Utc>,
    client: Arc<dyn IssueCommenter>,
}

impl CachedToken {
    fn is_usable(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at - TimeDelta::seconds(SAFETY_BUFFER_SECS)
    }
}

/// Lazily refreshed map from installation id to bound client.
pub struct TokenCache {
    entries: RwLock<HashMap<InstallationId, CachedToken>>,
    factory: Arc<dyn InstallationClientFactory>,
}

impl TokenCache {
    /// Creates an empty cache that exchanges tokens through `factory`.
    pub fn new(factory: Arc<dyn InstallationClientFactory>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            factory,
        }
    }

    /// Returns a client for `installation`, exchanging a new token if the
    /// cached one is absent or within the expiry buffer.
    ///
    /// # Errors
    ///
    /// Propagates [`GitHubError`] from signing or the exchange; the cache
    /// state is left exactly as it was before the call.
    pub async fn get_client(
        &self,
        installation: InstallationId,
    ) -> Result<Arc<dyn IssueCommenter>, GitHubError> {
        {
            let entries = self.entries.read().await;
            if let Some(cached) = entries.get(&installation) {
                if cached.is_usable(Utc::now()) {
                    return Ok(cached.client.clone());
                }
            }
        }

        let mut entries = self.entries.write().await;

        // Re-check under the exclusive lock: another caller may have
        // refreshed the entry while this one waited.
        if let Some(cached) = entries.get(&installation) {
            if cached.is_usable(Utc::now()) {
                debug!(
                    installation = installation.as_u64(),
                    "token refreshed by concurrent caller"
                );
                return Ok(cached.client.clone());
            }
        }

        let issued = self.factory.create(installation).await.inspect_err(|err| {
            warn!(
                installation = installation.as_u64(),
                error = %err,
                "installation token exchange failed"
            );
        })?;

        info!(
            installation = installation.as_u64(),
            expires_at = %issued.expires_at,
            "cached fresh installation token"
        );

        let client = issued.client.clone();
        entries.insert(
            installation,
            CachedToken {
                token: issued.token,
                expires_at: issued.expires_at,
                client: issued.client,
            },
        );

        Ok(client)
    }

    /// The token currently cached for `installation`, if any. Test hook.
    #[cfg(test)]
    async fn cached_token(&self, installation: InstallationId) -> Option<String> {
        let entries = self.entries.read().await;
        entries.get(&installation).map(|c| c.token.clone())
    }
}

#[async_trait]
impl InstallationClientSource for TokenCache {
    async fn get_client(
        &self,
        installation: InstallationId,
    ) -> Result<Arc<dyn IssueCommenter>, PortError> {
        TokenCache::get_client(self, installation)
            .await
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use chrono::TimeDelta;

    use pipeline::{IssueNumber, OwnerLogin, RepositoryName};

    use super::*;
    use crate::client::IssuedClient;

    struct NoopCommenter;

    #[async_trait]
    impl IssueCommenter for NoopCommenter {
        async fn post_comment(
            &self,
            _owner: &OwnerLogin,
            _repo: &RepositoryName,
            _issue: IssueNumber,
            _body: &str,
        ) -> Result<(), PortError> {
            Ok(())
        }
    }

    /// Factory that counts exchanges and issues tokens with a fixed lifetime.
    struct CountingFactory {
        exchanges: AtomicUsize,
        lifetime: TimeDelta,
    }

    impl CountingFactory {
        fn with_lifetime(lifetime: TimeDelta) -> Self {
            Self {
                exchanges: AtomicUsize::new(0),
                lifetime,
            }
        }

        fn count(&self) -> usize {
            self.exchanges.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl InstallationClientFactory for CountingFactory {
        async fn create(&self, _installation: InstallationId) -> Result<IssuedClient, GitHubError> {
            let n = self.exchanges.fetch_add(1, Ordering::SeqCst);
            // Widen the race window so a missing re-check would be caught.
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(IssuedClient {
                client: Arc::new(NoopCommenter),
                token: format!("ghs_token_{n}"),
                expires_at: Utc::now() + self.lifetime,
            })
        }
    }

    struct FailingFactory {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl InstallationClientFactory for FailingFactory {
        async fn create(&self, installation: InstallationId) -> Result<IssuedClient, GitHubError> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Err(GitHubError::TokenExchange {
                    installation,
                    status: reqwest::StatusCode::BAD_GATEWAY,
                })
            } else {
                Ok(IssuedClient {
                    client: Arc::new(NoopCommenter),
                    token: "ghs_recovered".to_string(),
                    expires_at: Utc::now() + TimeDelta::hours(1),
                })
            }
        }
    }

    #[tokio::test]
    async fn concurrent_cold_misses_cause_exactly_one_exchange() {
        let factory = Arc::new(CountingFactory::with_lifetime(TimeDelta::hours(1)));
        let cache = Arc::new(TokenCache::new(factory.clone()));
        let installation = InstallationId::new(99);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache.get_client(installation).await.map(|_| ())
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(factory.count(), 1);
        assert_eq!(
            cache.cached_token(installation).await.as_deref(),
            Some("ghs_token_0")
        );
    }

    #[tokio::test]
    async fn token_inside_buffer_triggers_refresh() {
        // Four minutes to live is inside the five-minute buffer.
        let factory = Arc::new(CountingFactory::with_lifetime(TimeDelta::minutes(4)));
        let cache = TokenCache::new(factory.clone());
        let installation = InstallationId::new(7);

        cache.get_client(installation).await.unwrap();
        cache.get_client(installation).await.unwrap();

        assert_eq!(factory.count(), 2);
    }

    #[tokio::test]
    async fn token_outside_buffer_is_reused() {
        let factory = Arc::new(CountingFactory::with_lifetime(TimeDelta::minutes(10)));
        let cache = TokenCache::new(factory.clone());
        let installation = InstallationId::new(7);

        cache.get_client(installation).await.unwrap();
        cache.get_client(installation).await.unwrap();

        assert_eq!(factory.count(), 1);
    }

    #[tokio::test]
    async fn installations_are_cached_independently() {
        let factory = Arc::new(CountingFactory::with_lifetime(TimeDelta::hours(1)));
        let cache = TokenCache::new(factory.clone());

        cache.get_client(InstallationId::new(1)).await.unwrap();
        cache.get_client(InstallationId::new(2)).await.unwrap();
        cache.get_client(InstallationId::new(1)).await.unwrap();

        assert_eq!(factory.count(), 2);
    }

    #[tokio::test]
    async fn exchange_failure_does_not_poison_the_cache() {
        let factory = Arc::new(FailingFactory {
            attempts: AtomicUsize::new(0),
        });
        let cache = TokenCache::new(factory);
        let installation = InstallationId::new(3);

        let err = cache.get_client(installation).await.err().unwrap();
        assert!(matches!(err, GitHubError::TokenExchange { .. }));
        assert_eq!(cache.cached_token(installation).await, None);

        // Next call retries and succeeds.
        cache.get_client(installation).await.unwrap();
        assert_eq!(
            cache.cached_token(installation).await.as_deref(),
            Some("ghs_recovered")
        );
    }
}
