use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use governance_poll::clock::SystemClock;
use governance_poll::config::Config;
use governance_poll::feed::BroadcastFeed;
use governance_poll::service::PollService;
use governance_poll::store::{InMemoryStore, PollStore};
use governance_poll::web::{self, db::PgStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let feed = Arc::new(BroadcastFeed::new());
    let clock = Arc::new(SystemClock);
    let store: Arc<dyn PollStore> = match &config.database_url {
        Some(url) => Arc::new(
            PgStore::connect(url, config.pool_size, feed.clone()).context("could not open the Postgres pool")?,
        ),
        None => {
            warn!("DATABASE_URL is not set, polls are kept in memory only");
            Arc::new(InMemoryStore::new(feed.clone(), clock.clone()))
        }
    };

    let service = Arc::new(PollService::new(store, feed, clock));
    service.start().await;

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "Could not listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    };
    web::serve(service.clone(), config.bind_addr, shutdown)
        .await
        .with_context(|| format!("could not bind {}", config.bind_addr))?;

    service.shutdown();
    info!("Shut down");
    Ok(())
}
