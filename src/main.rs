use anyhow::Context;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use charging_prices::config::Config;
use charging_prices::pricing::{PgPricingStore, VersionManager};
use charging_prices::retry::RetryPolicy;
use charging_prices::source::SnapshotSource;
use charging_prices::sync::sync_and_retire;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,charging_prices=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let snapshot_path = std::env::args()
        .nth(1)
        .context("usage: charging-prices <snapshot.json>")?;

    let config = Config::from_env()?;

    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(config.store_timeout)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    let store = PgPricingStore::new(pool.clone());
    tracing::info!("Running migrations...");
    store.migrate().await.context("Failed to run migrations")?;

    let source = SnapshotSource::from_path(&snapshot_path)
        .await
        .with_context(|| format!("Failed to load snapshot {snapshot_path}"))?;

    let manager = VersionManager::new(store).with_timeout(config.store_timeout);
    let policy = RetryPolicy::with_max_attempts(config.sync_max_attempts);
    let now = Utc::now();

    let result = async {
        let (report, retired) = sync_and_retire(
            &manager,
            &source,
            now,
            &policy,
            config.retired_models.as_slice(),
        )
        .await?;
        tracing::info!(report = %serde_json::to_string(&report)?, "Sync report");
        for record in &retired {
            tracing::info!(key = %record.key(), version = record.version(), "Retired pricing model");
        }
        anyhow::Ok(())
    }
    .await;

    pool.close().await;
    result
}
