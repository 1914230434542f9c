//! FieldScout - Offline-First Robotics Scouting
//!
//! Command-line entry point: queue status, manual sync, and reference
//! cache refresh against the configured aggregation server.

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use fieldscout::cache::ReferenceCache;
use fieldscout::settings;
use fieldscout::storage::local::LocalStore;
use fieldscout::sync::{self, HttpApi, SyncEngine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting FieldScout v{}", env!("CARGO_PKG_VERSION"));

    let stored = settings::load_stored().context("loading settings")?;
    let resolved = settings::resolve(&stored, &settings::EnvDefaults::from_env());
    // persist so the generated device id survives restarts
    settings::save(&resolved).context("saving settings")?;

    let db_path = settings::data_dir().join("scouting.db");
    let mut store = LocalStore::open(&db_path).context("opening local store")?;
    let counts = store.unsynced_counts()?;
    tracing::info!(
        event = %resolved.event_key,
        device = %resolved.device_id,
        pending_pit = counts.pit,
        pending_matches = counts.matches,
        "local queue ready"
    );

    let command = std::env::args().nth(1).unwrap_or_else(|| "status".to_string());
    match command.as_str() {
        "status" => {
            println!("event: {}", resolved.event_key);
            println!("server: {}", resolved.sync_url);
            println!("pending pit records: {}", counts.pit);
            println!("pending match records: {}", counts.matches);
        }
        "sync" => {
            let api = HttpApi::new(&resolved.sync_url, &resolved.api_key);
            let engine = SyncEngine::new();
            let outcome = engine
                .sync_unsynced(&mut store, &api)
                .await
                .context("sync failed")?;
            println!(
                "synced {} pit, {} match records ({} photos uploaded, {} failed)",
                outcome.pit_count,
                outcome.match_count,
                outcome.photos_uploaded,
                outcome.photos_failed
            );
        }
        "refresh" => {
            let api = HttpApi::new(&resolved.sync_url, &resolved.api_key);
            let cache = ReferenceCache::default_location();
            let teams = sync::refresh_teams_cache(&api, &cache, &resolved.event_key)
                .await
                .context("roster refresh failed")?;
            let schedule = sync::refresh_schedule_cache(&api, &cache, &resolved.event_key)
                .await
                .context("schedule refresh failed")?;
            println!(
                "cached {} teams and {} scheduled matches for {}",
                teams.len(),
                schedule.len(),
                resolved.event_key
            );
        }
        other => {
            anyhow::bail!("unknown command '{other}' (expected status, sync, or refresh)");
        }
    }

    Ok(())
}
