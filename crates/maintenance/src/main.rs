//! Identity cache maintenance binary, intended to be driven by cron or a
//! process scheduler. One task per invocation; tasks never overlap because
//! the scheduler runs them serially.

use anyhow::{bail, Context};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tradepost_identity::{HttpIdentityProvider, IdentityCache, IdentityConfig, PgIdentityStore};

const USAGE: &str = "\
Usage: tradepost-maintenance <task>

Tasks:
  refresh-expired   Re-fetch every cached identity past its TTL
  refresh-all       Re-fetch every cached identity
  prune-expired     Delete every cached identity past its TTL
  precache <ids..>  Warm the cache for the given external ids
  stats             Print cache counters
  clear             Drop the entire identity cache";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tradepost_maintenance=info,tradepost_identity=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(task) = args.first() else {
        bail!("{USAGE}");
    };

    let config = IdentityConfig::from_env();
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

    let pool = tradepost_db::create_pool(&database_url)
        .await
        .context("Failed to connect to database")?;
    tradepost_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    tradepost_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    let cache = IdentityCache::new(
        HttpIdentityProvider::new(config.api_url.clone(), config.api_key.clone()),
        PgIdentityStore::new(pool),
        config.ttl(),
        config.timeout(),
    );

    match task.as_str() {
        "refresh-expired" => {
            let scheduled = cache.refresh_expired().await?;
            tracing::info!(scheduled, "Refreshed expired identity records");
        }
        "refresh-all" => {
            let scheduled = cache.refresh_all().await?;
            tracing::info!(scheduled, "Refreshed all cached identity records");
        }
        "prune-expired" => {
            let pruned = cache.prune_expired().await?;
            tracing::info!(pruned, "Pruned expired identity records");
        }
        "precache" => {
            let ids = args[1..]
                .iter()
                .map(|s| s.parse().context("precache ids must be integers"))
                .collect::<anyhow::Result<Vec<_>>>()?;
            if ids.is_empty() {
                bail!("precache requires at least one id");
            }
            let warmed = cache.refresh_many(&ids, true).await?;
            tracing::info!(
                requested = ids.len(),
                warmed = warmed.len(),
                "Precached identity records"
            );
        }
        "stats" => {
            let valid = cache.count_valid().await?;
            let expired = cache.count_expired().await?;
            let precached = cache.count_precached().await?;
            tracing::info!(valid, expired, precached, "Identity cache counters");
        }
        "clear" => {
            cache.clear_all().await?;
            tracing::info!("Identity cache cleared");
        }
        other => bail!("Unknown task '{other}'\n\n{USAGE}"),
    }

    Ok(())
}
