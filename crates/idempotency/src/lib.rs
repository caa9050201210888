//! EstimateWorks delivery-deduplication store.
//!
//! Implements the [`pipeline::IdempotencyStore`] port over Redis. Each fully
//! processed delivery leaves a record keyed by its delivery id; the record
//! carries the processing timestamp as its value and expires after a TTL
//! (seven days by default), after which a replay of the same delivery would
//! be processed again.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Key layout and Redis specifics live here; the worker
//! sees only `is_processed` / `mark_processed`.
//!
//! ## Failure semantics
//!
//! A store error on `is_processed` propagates to the caller and fails the
//! task (the transport retries it). The check never fails open: answering
//! "not processed" on a store outage would let the side effect fire twice.
//!
//! The check and the later mark are two independent calls — two workers
//! racing on redeliveries of one task can both pass the check before either
//! marks. That window is accepted; the business action is repeat-safe and a
//! distributed lock is not worth its failure modes here.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use thiserror::Error;
use tracing::debug;

use pipeline::{DeliveryId, IdempotencyStore, PortError, Timestamp};

/// Key prefix for delivery records.
const KEY_PREFIX: &str = "webhook:delivery:";

/// Default record retention: seven days.
pub const DEFAULT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Store failure; carries the underlying Redis error.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The Redis round-trip failed.
    #[error("idempotency store unavailable: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Redis-backed implementation of [`pipeline::IdempotencyStore`].
///
/// Cheap to clone; all clones share one multiplexed connection.
#[derive(Clone)]
pub struct RedisIdempotencyStore {
    conn: ConnectionManager,
}

impl RedisIdempotencyStore {
    /// Creates a store over an established connection manager.
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    fn build_key(delivery: &DeliveryId) -> String {
        format!("{KEY_PREFIX}{delivery}")
    }

    /// Returns `true` iff a record for `delivery` exists and has not expired.
    ///
    /// # Errors
    ///
    /// [`StoreError::Redis`] when the lookup fails; callers must treat this
    /// as "unknown", never as "not processed".
    pub async fn is_processed(&self, delivery: &DeliveryId) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(Self::build_key(delivery)).await?;
        Ok(exists)
    }

    /// Writes (or overwrites) the record for `delivery`, valid for `ttl`
    /// (the seven-day default when `ttl` is zero).
    ///
    /// # Errors
    ///
    /// [`StoreError::Redis`] when the write fails.
    pub async fn mark_processed(
        &self,
        delivery: &DeliveryId,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let ttl = if ttl.is_zero() { DEFAULT_TTL } else { ttl };

        let mut conn = self.conn.clone();
        let () = conn
            .set_ex(
                Self::build_key(delivery),
                Timestamp::now().unix_seconds(),
                ttl.as_secs(),
            )
            .await?;

        debug!(delivery = %delivery, ttl_secs = ttl.as_secs(), "marked delivery processed");
        Ok(())
    }
}

#[async_trait]
impl IdempotencyStore for RedisIdempotencyStore {
    async fn is_processed(&self, delivery: &DeliveryId) -> Result<bool, PortError> {
        RedisIdempotencyStore::is_processed(self, delivery)
            .await
            .map_err(Into::into)
    }

    async fn mark_processed(&self, delivery: &DeliveryId, ttl: Duration) -> Result<(), PortError> {
        RedisIdempotencyStore::mark_processed(self, delivery, ttl)
            .await
            .map_err(Into::into)
    }
}
