//! The per-round bet aggregate.
//!
//! Cache-backed: the aggregate lives under the round id key for exactly as
//! long as the round has unsettled bets, and its presence is the signal
//! that settlement still owes work. Merges are attribute-level under a
//! per-round async mutex so concurrent admissions never lose updates.

use crate::bets::types::Wager;
use crate::cache::Cache;
use crate::errors::CardiqResult;
use crate::session::PlayerIdentity;
use crate::wallet::WalletReceipt;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// One participant's slice of the aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateEntry {
    pub session_key: String,
    pub identity: PlayerIdentity,
    pub wager: Wager,
    /// Latest debit receipt; stakes accumulate, the receipt tracks the
    /// most recent upstream transaction.
    pub receipt: WalletReceipt,
}

/// All wagers for one round, keyed by participant id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoundBets {
    pub entries: BTreeMap<String, AggregateEntry>,
}

impl RoundBets {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Cache-backed aggregate access serialized per round key.
pub struct AggregateStore {
    cache: Cache,
    locks: DashMap<u64, Arc<Mutex<()>>>,
}

fn round_key(round_id: u64) -> String {
    round_id.to_string()
}

impl AggregateStore {
    pub fn new(cache: Cache) -> Self {
        Self {
            cache,
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, round_id: u64) -> Arc<Mutex<()>> {
        self.locks
            .entry(round_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Merge one accepted wager into the round aggregate. Existing stakes
    /// accumulate per target; the identity snapshot and receipt refresh to
    /// the latest submission.
    pub async fn merge(&self, round_id: u64, user_id: &str, entry: AggregateEntry) -> CardiqResult<()> {
        let lock = self.lock_for(round_id);
        let _guard = lock.lock().await;

        let key = round_key(round_id);
        let mut bets: RoundBets = self
            .cache
            .get_json(&key)
            .await?
            .unwrap_or_default();

        match bets.entries.get_mut(user_id) {
            Some(existing) => {
                existing.wager.merge(&entry.wager);
                existing.session_key = entry.session_key;
                existing.identity = entry.identity;
                existing.receipt = entry.receipt;
            }
            None => {
                bets.entries.insert(user_id.to_string(), entry);
            }
        }

        self.cache.set_json(&key, &bets, None).await
    }

    /// Whether the round still has an unsettled aggregate.
    pub async fn exists(&self, round_id: u64) -> CardiqResult<bool> {
        Ok(self
            .cache
            .get_json::<RoundBets>(&round_key(round_id))
            .await?
            .map(|bets| !bets.is_empty())
            .unwrap_or(false))
    }

    /// Load the aggregate without consuming it.
    pub async fn load(&self, round_id: u64) -> CardiqResult<Option<RoundBets>> {
        let lock = self.lock_for(round_id);
        let _guard = lock.lock().await;
        self.cache.get_json(&round_key(round_id)).await
    }

    /// Delete the aggregate. This is settlement's commit point.
    pub async fn clear(&self, round_id: u64) -> CardiqResult<()> {
        {
            let lock = self.lock_for(round_id);
            let _guard = lock.lock().await;
            self.cache.delete(&round_key(round_id)).await?;
        }
        self.locks.remove(&round_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bets::types::{parse_bet_spec, BetTarget};
    use crate::cache::MemoryCache;

    fn aggregate_store() -> AggregateStore {
        AggregateStore::new(Cache::new(Arc::new(MemoryCache::new())))
    }

    fn entry(session_key: &str, spec: &str, txn: &str) -> AggregateEntry {
        AggregateEntry {
            session_key: session_key.to_string(),
            identity: PlayerIdentity {
                user_id: "u-1".to_string(),
                user_name: "alice".to_string(),
                operator_id: "op-1".to_string(),
                game_id: "g-1".to_string(),
                token: "tok".to_string(),
                ip: "10.0.0.1".to_string(),
            },
            wager: parse_bet_spec(spec).unwrap(),
            receipt: WalletReceipt {
                txn_id: txn.to_string(),
                amount: 0.0,
                round_ref: "100".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn repeated_merges_accumulate_stakes() {
        let store = aggregate_store();
        store.merge(100, "u-1", entry("s1", "A-100", "t1")).await.unwrap();
        store.merge(100, "u-1", entry("s1", "A-50,+B-25", "t2")).await.unwrap();

        let bets = store.load(100).await.unwrap().unwrap();
        let merged = &bets.entries["u-1"];
        assert_eq!(merged.wager.stake(BetTarget::MainA), 150.0);
        assert_eq!(merged.wager.stake(BetTarget::SideB), 25.0);
        assert_eq!(merged.receipt.txn_id, "t2");
    }

    #[tokio::test]
    async fn concurrent_merges_do_not_lose_updates() {
        let store = Arc::new(aggregate_store());
        let mut handles = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .merge(100, "u-1", entry("s1", "A-1", &format!("t{}", i)))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let bets = store.load(100).await.unwrap().unwrap();
        assert_eq!(bets.entries["u-1"].wager.stake(BetTarget::MainA), 32.0);
    }

    #[tokio::test]
    async fn clear_consumes_the_aggregate() {
        let store = aggregate_store();
        store.merge(100, "u-1", entry("s1", "A-10", "t1")).await.unwrap();
        assert!(store.exists(100).await.unwrap());

        store.clear(100).await.unwrap();
        assert!(!store.exists(100).await.unwrap());
        assert!(store.load(100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn separate_participants_hold_separate_entries() {
        let store = aggregate_store();
        let mut other = entry("s2", "B-40", "t9");
        other.identity.user_id = "u-2".to_string();

        store.merge(100, "u-1", entry("s1", "A-10", "t1")).await.unwrap();
        store.merge(100, "u-2", other).await.unwrap();

        let bets = store.load(100).await.unwrap().unwrap();
        assert_eq!(bets.len(), 2);
    }
}
