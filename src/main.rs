//! Skywatch - Aircraft Tracking Backend
//!
//! Polls an external state-vector feed on a budget, reconciles snapshots
//! into a persistent tracking store, and serves cached positions.

use anyhow::{Context, Result};
use dotenv::dotenv;
use skywatch_backend::feed::FeedClient;
use skywatch_backend::models::Config;
use skywatch_backend::retry::RetryPolicy;
use skywatch_backend::service::TrackerService;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init_tracing();

    info!("🚀 Skywatch tracker starting");

    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        "⚙️  Feed: {} (budget {}/min, {}/day, batches of {})",
        config.feed_base_url,
        config.requests_per_minute,
        config.requests_per_day,
        config.max_batch_size
    );

    let feed = Arc::new(
        FeedClient::new(
            &config.feed_base_url,
            RetryPolicy::new(config.retry_limit),
            config.feed_timeout_secs,
        )
        .context("Failed to initialize feed client")?,
    );

    // Construction is fatal on misconfiguration - the service never runs
    // half-initialized.
    let service = TrackerService::new(config, feed)?;

    let state = service.get_database_state().await?;
    info!(
        "📊 Store ready: {} aircraft ({} pending, {} active, {} stale)",
        state.total, state.pending, state.active, state.stale
    );

    let tasks = service.spawn_background_tasks();

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("🛑 Shutting down");

    for task in tasks {
        task.abort();
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "skywatch_backend=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
