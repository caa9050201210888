//! `estimate-server`: the webhook ingress process.
//!
//! Verifies GitHub webhook deliveries and enqueues `issues` events onto the
//! Redis task transport; all actual processing happens in `estimate-worker`.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use cli::{connect_redis, telemetry, Config};
use listener::ListenerState;
use queue::{QueueClient, WEBHOOK_QUEUE};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init();

    let config = Config::load().context("invalid configuration")?;
    let conn = connect_redis(&config.redis_url).await?;

    let client = QueueClient::new(conn, WEBHOOK_QUEUE);
    let state = ListenerState::new(
        config.webhook_secret.as_str(),
        ["issues".to_string()],
        Arc::new(client),
    );

    let addr = config.bind_addr();
    info!(addr = %addr, "starting webhook server");
    listener::serve(&addr, state)
        .await
        .with_context(|| format!("webhook server failed on {addr}"))
}
