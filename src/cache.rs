//! Key-value session/aggregate cache.
//!
//! The external cache collaborator behind a narrow trait: `set`/`get`/
//! `delete` over JSON values with an advisory TTL. A miss is never an
//! error; callers treat it as "no session" / "empty aggregate".

use crate::errors::{CacheError, CardiqResult};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[async_trait]
pub trait KvCache: Send + Sync {
    async fn set(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> CardiqResult<()>;

    async fn get(&self, key: &str) -> CardiqResult<Option<serde_json::Value>>;

    async fn delete(&self, key: &str) -> CardiqResult<()>;
}

/// Typed convenience wrapper shared across the engines.
#[derive(Clone)]
pub struct Cache {
    inner: Arc<dyn KvCache>,
}

impl Cache {
    pub fn new(inner: Arc<dyn KvCache>) -> Self {
        Self { inner }
    }

    pub async fn set_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> CardiqResult<()> {
        let encoded = serde_json::to_value(value)
            .map_err(|e| CacheError::Encode(e.to_string()))?;
        self.inner.set(key, encoded, ttl).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> CardiqResult<Option<T>> {
        match self.inner.get(key).await? {
            Some(value) => {
                let decoded = serde_json::from_value(value)
                    .map_err(|e| CacheError::Decode(e.to_string()))?;
                Ok(Some(decoded))
            }
            None => Ok(None),
        }
    }

    pub async fn delete(&self, key: &str) -> CardiqResult<()> {
        self.inner.delete(key).await
    }
}

/// In-process cache with TTL expiry, the bundled default implementation.
pub struct MemoryCache {
    entries: DashMap<String, CacheEntry>,
}

struct CacheEntry {
    value: serde_json::Value,
    expires_at: Option<Instant>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvCache for MemoryCache {
    async fn set(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> CardiqResult<()> {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: ttl.map(|d| Instant::now() + d),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> CardiqResult<Option<serde_json::Value>> {
        if let Some(entry) = self.entries.get(key) {
            if let Some(expires_at) = entry.expires_at {
                if Instant::now() >= expires_at {
                    drop(entry);
                    self.entries.remove(key);
                    return Ok(None);
                }
            }
            return Ok(Some(entry.value.clone()));
        }
        Ok(None)
    }

    async fn delete(&self, key: &str) -> CardiqResult<()> {
        self.entries.remove(key);
        Ok(())
    }
}
