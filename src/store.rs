//! Persistent records: accepted bets, settlements, round outcomes and the
//! active game settings.
//!
//! The store is append-only from the core's point of view; reads exist for
//! startup bootstrap (round history, settings) and the last-win lookup on
//! connect. The bundled implementation keeps everything in RocksDB under
//! key prefixes with a newest-first round index.

use crate::bets::types::BetTarget;
use crate::config::GameSettings;
use crate::errors::{CardiqResult, StoreError};
use crate::game::evaluator::RoundOutcome;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocksdb::{Direction, IteratorMode, Options, DB};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

const BET_PREFIX: &str = "bet:";
const SETTLEMENT_PREFIX: &str = "settlement:";
const ROUND_INDEX_PREFIX: &[u8] = b"round:index:";
const LAST_WIN_PREFIX: &str = "win:last:";
const ACTIVE_SETTINGS_KEY: &[u8] = b"settings:active";

/// Audit record of one accepted bet submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetRecord {
    pub user_id: String,
    pub round_id: u64,
    pub operator_id: String,
    pub bet_amt: f64,
    pub bet_values: BTreeMap<BetTarget, f64>,
    /// Debit receipt id for upstream reconciliation.
    pub txn_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementStatus {
    #[serde(rename = "WIN")]
    Win,
    #[serde(rename = "LOSS")]
    Loss,
}

/// One participant's settlement for one round. Written exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub user_id: String,
    pub round_id: u64,
    pub operator_id: String,
    pub bet_amt: f64,
    pub win_amt: f64,
    pub bet_values: BTreeMap<BetTarget, f64>,
    /// Gross payout per winning target, before the cap clamp.
    pub payouts: BTreeMap<BetTarget, f64>,
    pub round_result: RoundOutcome,
    pub status: SettlementStatus,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait GameStore: Send + Sync {
    async fn record_bet(&self, bet: &BetRecord) -> CardiqResult<()>;

    async fn record_settlement(&self, record: &SettlementRecord) -> CardiqResult<()>;

    async fn record_round(&self, outcome: &RoundOutcome) -> CardiqResult<()>;

    /// Most recent round outcomes, newest first.
    async fn recent_rounds(&self, limit: usize) -> CardiqResult<Vec<RoundOutcome>>;

    /// Latest positive win amount for the player, if any.
    async fn last_win(&self, user_id: &str, operator_id: &str) -> CardiqResult<Option<f64>>;

    /// Active settings row, if one was persisted.
    async fn active_settings(&self) -> CardiqResult<Option<GameSettings>>;
}

/// RocksDB-backed store.
#[derive(Clone)]
pub struct RocksStore {
    db: Arc<DB>,
}

fn round_index_key(round_id: u64) -> Vec<u8> {
    // Newest-first iteration via inverted round id.
    // Key layout: prefix | inv_round_id(be)
    let inv = u64::MAX - round_id;
    let mut key = Vec::with_capacity(ROUND_INDEX_PREFIX.len() + 8);
    key.extend_from_slice(ROUND_INDEX_PREFIX);
    key.extend_from_slice(&inv.to_be_bytes());
    key
}

fn bet_key(round_id: u64, user_id: &str, txn_id: &str) -> Vec<u8> {
    format!("{}{}:{}:{}", BET_PREFIX, round_id, user_id, txn_id).into_bytes()
}

fn settlement_key(round_id: u64, user_id: &str) -> Vec<u8> {
    format!("{}{}:{}", SETTLEMENT_PREFIX, round_id, user_id).into_bytes()
}

fn last_win_key(operator_id: &str, user_id: &str) -> Vec<u8> {
    format!("{}{}:{}", LAST_WIN_PREFIX, operator_id, user_id).into_bytes()
}

impl RocksStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let db = DB::open(&opts, path).map_err(|e| StoreError::OpenFailed(e.to_string()))?;
        Ok(Self { db: Arc::new(db) })
    }

    fn put_json<T: Serialize>(&self, key: &[u8], value: &T) -> Result<(), StoreError> {
        let bytes =
            serde_json::to_vec(value).map_err(|e| StoreError::WriteFailed(e.to_string()))?;
        self.db
            .put(key, bytes)
            .map_err(|e| StoreError::WriteFailed(e.to_string()))
    }

    fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        key: &[u8],
    ) -> Result<Option<T>, StoreError> {
        match self
            .db
            .get(key)
            .map_err(|e| StoreError::ReadFailed(e.to_string()))?
        {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| StoreError::CorruptedRecord(e.to_string())),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl GameStore for RocksStore {
    async fn record_bet(&self, bet: &BetRecord) -> CardiqResult<()> {
        let key = bet_key(bet.round_id, &bet.user_id, &bet.txn_id);
        self.put_json(&key, bet)?;
        Ok(())
    }

    async fn record_settlement(&self, record: &SettlementRecord) -> CardiqResult<()> {
        let key = settlement_key(record.round_id, &record.user_id);
        self.put_json(&key, record)?;

        if record.win_amt > 0.0 {
            let key = last_win_key(&record.operator_id, &record.user_id);
            self.put_json(&key, &record.win_amt)?;
        }
        Ok(())
    }

    async fn record_round(&self, outcome: &RoundOutcome) -> CardiqResult<()> {
        let key = round_index_key(outcome.round_id);
        self.put_json(&key, outcome)?;
        Ok(())
    }

    async fn recent_rounds(&self, limit: usize) -> CardiqResult<Vec<RoundOutcome>> {
        let mut rounds = Vec::with_capacity(limit);
        let iter = self.db.iterator(IteratorMode::From(
            ROUND_INDEX_PREFIX,
            Direction::Forward,
        ));
        for entry in iter {
            let (key, value) = entry.map_err(|e| StoreError::ReadFailed(e.to_string()))?;
            if !key.starts_with(ROUND_INDEX_PREFIX) || rounds.len() >= limit {
                break;
            }
            let outcome: RoundOutcome = serde_json::from_slice(&value)
                .map_err(|e| StoreError::CorruptedRecord(e.to_string()))?;
            rounds.push(outcome);
        }
        Ok(rounds)
    }

    async fn last_win(&self, user_id: &str, operator_id: &str) -> CardiqResult<Option<f64>> {
        let key = last_win_key(operator_id, user_id);
        Ok(self.get_json(&key)?)
    }

    async fn active_settings(&self) -> CardiqResult<Option<GameSettings>> {
        Ok(self.get_json(ACTIVE_SETTINGS_KEY)?)
    }
}

impl RocksStore {
    /// Persist the active settings row (operator tooling path).
    pub fn put_active_settings(&self, settings: &GameSettings) -> Result<(), StoreError> {
        self.put_json(ACTIVE_SETTINGS_KEY, settings)
    }
}
