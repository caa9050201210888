//! `estimate-worker`: the queue consumer process.
//!
//! Drains the webhook queue, deduplicates deliveries, and posts estimate
//! reminders on newly opened issues. SIGINT/SIGTERM triggers a graceful
//! shutdown; in-flight leases are reclaimed by the runtime after restart.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::info;

use cli::{connect_redis, telemetry, Config};
use github::{AppAuth, AppClient, TokenCache};
use idempotency::RedisIdempotencyStore;
use pipeline::ReminderAction;
use queue::{WebhookProcessor, WorkerConfig, WorkerRuntime, WEBHOOK_QUEUE};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init();

    let config = Config::load().context("invalid configuration")?;
    let conn = connect_redis(&config.redis_url).await?;

    let pem = std::fs::read(&config.private_key_path)
        .with_context(|| format!("failed to read private key {}", config.private_key_path))?;
    let auth = AppAuth::from_pem(config.app_id, &pem).context("invalid App private key")?;
    let app_client = AppClient::new(auth).context("failed to build GitHub client")?;
    let cache = TokenCache::new(Arc::new(app_client));

    let action = ReminderAction::new(Arc::new(cache));
    let store = RedisIdempotencyStore::new(conn.clone());
    let processor = WebhookProcessor::new(Arc::new(store), action);

    let runtime = WorkerRuntime::new(
        conn,
        WorkerConfig {
            queue: WEBHOOK_QUEUE.to_string(),
            concurrency: config.worker_concurrency,
        },
    );

    let shutdown = shutdown_signal();
    info!(concurrency = config.worker_concurrency, "starting worker");
    runtime.run(Arc::new(processor), shutdown).await;

    info!("worker stopped");
    Ok(())
}

/// Returns a receiver that flips to `true` on SIGINT or SIGTERM.
fn shutdown_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(err) => {
                    tracing::error!(error = %err, "failed to install SIGTERM handler");
                    let _ = ctrl_c.await;
                    let _ = tx.send(true);
                    return;
                }
            };
            tokio::select! {
                _ = ctrl_c => info!("received SIGINT"),
                _ = sigterm.recv() => info!("received SIGTERM"),
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received shutdown signal");
        }

        let _ = tx.send(true);
    });

    rx
}
