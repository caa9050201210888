//! Shared wiring for the EstimateWorks binaries.
//!
//! The two composition roots — `estimate-server` (webhook ingress) and
//! `estimate-worker` (queue consumer) — share configuration loading,
//! telemetry setup, and the Redis connection bootstrap defined here.

pub mod config;
pub mod telemetry;

use anyhow::Context;
use redis::aio::ConnectionManager;

pub use config::Config;

/// Connects to Redis and verifies the connection with a `PING`.
///
/// Both binaries fail fast here: a process that cannot reach its broker or
/// store should not pretend to start.
pub async fn connect_redis(url: &str) -> anyhow::Result<ConnectionManager> {
    let client = redis::Client::open(url).with_context(|| format!("invalid Redis URL {url}"))?;
    let mut conn = ConnectionManager::new(client)
        .await
        .with_context(|| format!("failed to connect to Redis at {url}"))?;

    let pong: String = redis::cmd("PING")
        .query_async(&mut conn)
        .await
        .context("Redis did not answer PING")?;
    anyhow::ensure!(pong == "PONG", "unexpected PING reply: {pong}");

    tracing::info!(url, "connected to Redis");
    Ok(conn)
}
