//! Configuration management for the Cardiq game service
//!
//! Centralized configuration with TOML loading, environment variable
//! overrides and validation. Game odds/limits live in [`GameSettings`],
//! which is also persisted in the store and reloadable at runtime.

use crate::errors::{CardiqError, CardiqResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Top-level service configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CardiqConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub rounds: RoundConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// Built-in fallback used when the store has no active settings row.
    #[serde(default)]
    pub game: GameSettings,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            allowed_origins: vec!["*".to_string()],
            request_timeout_secs: 30,
        }
    }
}

/// Phase durations and history bound for the round loop
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoundConfig {
    pub place_bet_secs: u64,
    pub collect_bet_secs: u64,
    pub show_cards_secs: u64,
    pub ended_secs: u64,
    /// How many finished rounds are kept for late joiners (FIFO).
    pub history_len: usize,
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            place_bet_secs: 15,
            collect_bet_secs: 6,
            show_cards_secs: 8,
            ended_secs: 6,
            history_len: 3,
        }
    }
}

impl RoundConfig {
    pub fn place_bet(&self) -> Duration {
        Duration::from_secs(self.place_bet_secs)
    }

    pub fn collect_bet(&self) -> Duration {
        Duration::from_secs(self.collect_bet_secs)
    }

    pub fn show_cards(&self) -> Duration {
        Duration::from_secs(self.show_cards_secs)
    }

    pub fn ended(&self) -> Duration {
        Duration::from_secs(self.ended_secs)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
    /// Retries when opening the store at startup.
    pub open_retries: u32,
    pub open_retry_backoff_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data/cardiq".to_string(),
            open_retries: 5,
            open_retry_backoff_ms: 500,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Advisory TTL for session entries, seconds.
    pub session_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: 3600,
        }
    }
}

/// Upstream account/wallet service endpoints
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UpstreamConfig {
    pub service_base_url: String,
    pub wallet_timeout_secs: u64,
    /// Appears in wallet transaction descriptions.
    pub game_name: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            service_base_url: "http://localhost:9000".to_string(),
            wallet_timeout_secs: 5,
            game_name: "cardiq".to_string(),
        }
    }
}

/// Payout odds and stake limits, read-mostly shared configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameSettings {
    pub min_stake: f64,
    pub max_stake: f64,
    pub max_payout_cap: f64,
    pub main_odds: MainOdds,
    pub side_odds: SideOdds,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MainOdds {
    #[serde(rename = "PLAYER_A")]
    pub player_a: f64,
    #[serde(rename = "PLAYER_B")]
    pub player_b: f64,
}

/// Side-bet odds by winning hand category. Zero disables that category.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SideOdds {
    #[serde(rename = "PAIR")]
    pub pair: f64,
    #[serde(rename = "FLUSH")]
    pub flush: f64,
    #[serde(rename = "STRAIGHT")]
    pub straight: f64,
    #[serde(rename = "STRAIGHT_FLUSH")]
    pub straight_flush: f64,
    #[serde(rename = "TRIO")]
    pub trio: f64,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            min_stake: 25.0,
            max_stake: 200_000.0,
            max_payout_cap: 1_000_000.0,
            main_odds: MainOdds {
                player_a: 1.98,
                player_b: 1.98,
            },
            side_odds: SideOdds {
                pair: 1.0,
                flush: 4.0,
                straight: 6.0,
                straight_flush: 35.0,
                trio: 45.0,
            },
        }
    }
}

/// Shared handle over the active [`GameSettings`].
///
/// Reads clone an `Arc` under a short read lock; a reload swaps the whole
/// value so concurrent readers always observe a consistent snapshot.
pub struct SettingsHandle {
    inner: RwLock<Arc<GameSettings>>,
}

impl SettingsHandle {
    pub fn new(settings: GameSettings) -> Self {
        Self {
            inner: RwLock::new(Arc::new(settings)),
        }
    }

    pub fn load(&self) -> Arc<GameSettings> {
        self.inner.read().expect("settings lock poisoned").clone()
    }

    pub fn swap(&self, settings: GameSettings) {
        *self.inner.write().expect("settings lock poisoned") = Arc::new(settings);
    }
}

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    config_path: Option<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Load configuration from file and environment variables
    pub fn load(&self) -> CardiqResult<CardiqConfig> {
        let mut config = if let Some(ref path) = self.config_path {
            self.load_from_file(path)?
        } else {
            CardiqConfig::default()
        };

        self.apply_env_overrides(&mut config)?;
        self.validate(&config)?;

        Ok(config)
    }

    fn load_from_file(&self, path: &str) -> CardiqResult<CardiqConfig> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CardiqError::Configuration(format!("failed to read {}: {}", path, e))
        })?;

        toml::from_str(&content)
            .map_err(|e| CardiqError::Configuration(format!("failed to parse TOML: {}", e)))
    }

    fn apply_env_overrides(&self, config: &mut CardiqConfig) -> CardiqResult<()> {
        if let Ok(host) = env::var("CARDIQ_HOST") {
            config.server.host = host;
        }
        if let Ok(port) = env::var("CARDIQ_PORT") {
            config.server.port = port.parse().map_err(|_| {
                CardiqError::Configuration(format!("CARDIQ_PORT: invalid port '{}'", port))
            })?;
        }
        if let Ok(dir) = env::var("CARDIQ_DATA_DIR") {
            config.storage.data_dir = dir;
        }
        if let Ok(url) = env::var("CARDIQ_SERVICE_BASE_URL") {
            config.upstream.service_base_url = url;
        }
        if let Ok(name) = env::var("CARDIQ_GAME_NAME") {
            config.upstream.game_name = name;
        }
        Ok(())
    }

    fn validate(&self, config: &CardiqConfig) -> CardiqResult<()> {
        if config.server.port == 0 {
            return Err(CardiqError::Configuration(
                "server.port cannot be zero".to_string(),
            ));
        }
        if config.rounds.place_bet_secs == 0 {
            return Err(CardiqError::Configuration(
                "rounds.place_bet_secs must be > 0".to_string(),
            ));
        }
        if config.rounds.history_len == 0 {
            return Err(CardiqError::Configuration(
                "rounds.history_len must be > 0".to_string(),
            ));
        }
        if config.storage.data_dir.is_empty() {
            return Err(CardiqError::Configuration(
                "storage.data_dir is required".to_string(),
            ));
        }
        if config.game.min_stake < 0.0 || config.game.max_stake < config.game.min_stake {
            return Err(CardiqError::Configuration(
                "game stake limits must satisfy 0 <= min_stake <= max_stake".to_string(),
            ));
        }
        if config.game.max_payout_cap <= 0.0 {
            return Err(CardiqError::Configuration(
                "game.max_payout_cap must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
