//! Cardiq game server binary.
//!
//! Startup order: config, tracing, store (with open retries), active
//! settings, round-history backfill, engines, round loop, HTTP server.

use cardiq::{
    api::{ApiServer, AppState},
    bets::{aggregate::AggregateStore, engine::BettingEngine},
    cache::{Cache, MemoryCache},
    config::{CardiqConfig, ConfigLoader, SettingsHandle},
    game::{
        clock::SystemClock,
        round::{GameLobby, RoundDriver},
    },
    metrics::MetricsRegistry,
    session::{HttpAccountClient, SessionStore},
    settlement::SettlementEngine,
    store::{GameStore, RocksStore},
    wallet::HttpWallet,
};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "cardiq", about = "Timed multiplayer card wagering service")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cardiq=info,tower_http=info".into()),
        )
        .init();

    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_path(path);
    }
    let config = loader.load()?;

    let store = open_store_with_retry(&config)?;
    let settings = Arc::new(SettingsHandle::new(load_settings(&config, &store).await));

    let cache = Cache::new(Arc::new(MemoryCache::new()));
    let sessions = SessionStore::new(
        cache.clone(),
        Duration::from_secs(config.cache.session_ttl_secs),
    );
    let aggregates = Arc::new(AggregateStore::new(cache));
    let metrics = Arc::new(MetricsRegistry::new());

    let wallet = Arc::new(HttpWallet::new(
        config.upstream.service_base_url.clone(),
        config.upstream.game_name.clone(),
        Duration::from_secs(config.upstream.wallet_timeout_secs),
    )?);
    let accounts = Arc::new(HttpAccountClient::new(
        config.upstream.service_base_url.clone(),
        Duration::from_secs(config.upstream.wallet_timeout_secs),
    )?);

    let lobby = GameLobby::new(config.rounds.history_len);
    backfill_history(&config, &store, &lobby).await;

    let settlement = Arc::new(SettlementEngine::new(
        lobby.clone(),
        aggregates.clone(),
        sessions.clone(),
        wallet.clone(),
        store.clone(),
        settings.clone(),
        metrics.clone(),
    ));
    let betting = Arc::new(BettingEngine::new(
        lobby.clone(),
        sessions.clone(),
        aggregates.clone(),
        wallet,
        store.clone(),
        settings,
        metrics.clone(),
    ));

    let driver = Arc::new(RoundDriver::new(
        lobby.clone(),
        Arc::new(SystemClock),
        config.rounds.clone(),
        settlement,
        aggregates,
        store.clone(),
        metrics.clone(),
    ));
    tokio::spawn(driver.run());

    let state = Arc::new(AppState {
        lobby,
        betting,
        sessions,
        accounts,
        store,
        metrics,
    });
    ApiServer::new(config.server.clone(), state).run().await
}

/// Open the store, retrying with backoff per the startup fault policy.
fn open_store_with_retry(
    config: &CardiqConfig,
) -> Result<Arc<RocksStore>, Box<dyn std::error::Error>> {
    let mut attempt = 0;
    loop {
        match RocksStore::open(&config.storage.data_dir) {
            Ok(store) => return Ok(Arc::new(store)),
            Err(e) if attempt < config.storage.open_retries => {
                attempt += 1;
                let backoff = config.storage.open_retry_backoff_ms * u64::from(attempt);
                warn!(attempt, error = %e, "store open failed, retrying in {}ms", backoff);
                std::thread::sleep(Duration::from_millis(backoff));
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Persisted active settings, falling back to the built-in defaults.
async fn load_settings(
    config: &CardiqConfig,
    store: &Arc<RocksStore>,
) -> cardiq::config::GameSettings {
    match store.active_settings().await {
        Ok(Some(settings)) => {
            info!("game settings loaded from store");
            settings
        }
        Ok(None) => {
            info!("no active settings in store, using configured defaults");
            config.game.clone()
        }
        Err(e) => {
            warn!(error = %e, "failed to load settings, using configured defaults");
            config.game.clone()
        }
    }
}

/// Seed the in-memory history so late joiners see continuity.
async fn backfill_history(config: &CardiqConfig, store: &Arc<RocksStore>, lobby: &Arc<GameLobby>) {
    match store.recent_rounds(config.rounds.history_len).await {
        Ok(rounds) if !rounds.is_empty() => {
            info!(count = rounds.len(), "round history backfilled");
            lobby.backfill_history(rounds);
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "failed to backfill round history"),
    }
}
