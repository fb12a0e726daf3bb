//! Ledgerline Billing Worker
//!
//! Runs the scheduled billing jobs:
//! - Monthly charge run over every non-deleted invoice (first of the month, then every period)
//! - Retry run over FAILED invoices (immediately, then daily)
//!
//! Without `DATABASE_URL` the worker runs on a seeded in-memory store, which is
//! handy for local demos against Stripe test keys.

use std::sync::Arc;

use ledgerline_billing::{BillingConfig, BillingService, BillingStore, InMemoryStore, PgStore};
use ledgerline_shared::create_pool;
use tracing::{info, warn};

/// Pick the store backing this worker
async fn create_store(config: &BillingConfig) -> anyhow::Result<Arc<dyn BillingStore>> {
    match &config.database_url {
        Some(database_url) => {
            let pool = create_pool(database_url).await?;
            let store = PgStore::new(pool);
            store.migrate().await?;
            info!("Using Postgres store");
            Ok(Arc::new(store))
        }
        None => {
            warn!("DATABASE_URL not set, using seeded in-memory store");
            let store = InMemoryStore::new();
            store.seed_demo_data().await?;
            Ok(Arc::new(store))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting Ledgerline billing worker");

    let config = BillingConfig::from_env()?;
    let store = create_store(&config).await?;
    let billing = BillingService::from_config(&config, store);

    let handle = billing.scheduler().start()?;
    info!(
        max_charge_retries = config.max_charge_retries,
        stripe_enabled = config.stripe.is_some(),
        "Billing worker started"
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    handle.stop().await;

    Ok(())
}
