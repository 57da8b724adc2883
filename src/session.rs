//! Player sessions and upstream authentication.
//!
//! A session is created at WebSocket upgrade time by resolving the
//! connection token against the account service, then cached under the
//! connection's session key with the live balance. Disconnect deletes the
//! session; it never touches in-flight wagers or pending settlement.

use crate::cache::Cache;
use crate::errors::{CardiqError, CardiqResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Cached per-connection participant state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSession {
    pub user_id: String,
    pub user_name: String,
    pub balance: f64,
    pub session_key: String,
    pub operator_id: String,
    pub game_id: String,
    pub token: String,
    pub ip: String,
}

/// Identity snapshot carried into the round bet aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerIdentity {
    pub user_id: String,
    pub user_name: String,
    pub operator_id: String,
    pub game_id: String,
    pub token: String,
    pub ip: String,
}

impl PlayerSession {
    pub fn identity(&self) -> PlayerIdentity {
        PlayerIdentity {
            user_id: self.user_id.clone(),
            user_name: self.user_name.clone(),
            operator_id: self.operator_id.clone(),
            game_id: self.game_id.clone(),
            token: self.token.clone(),
            ip: self.ip.clone(),
        }
    }
}

/// Session cache facade.
#[derive(Clone)]
pub struct SessionStore {
    cache: Cache,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(cache: Cache, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    pub async fn put(&self, session: &PlayerSession) -> CardiqResult<()> {
        self.cache
            .set_json(&session.session_key, session, Some(self.ttl))
            .await
    }

    /// Cache miss means "no session".
    pub async fn get(&self, session_key: &str) -> CardiqResult<Option<PlayerSession>> {
        self.cache.get_json(session_key).await
    }

    pub async fn delete(&self, session_key: &str) -> CardiqResult<()> {
        self.cache.delete(session_key).await
    }

    /// Adjust the cached balance by `delta` and return the new value.
    pub async fn adjust_balance(
        &self,
        session_key: &str,
        delta: f64,
    ) -> CardiqResult<Option<f64>> {
        match self.get(session_key).await? {
            Some(mut session) => {
                session.balance += delta;
                self.put(&session).await?;
                Ok(Some(session.balance))
            }
            None => Ok(None),
        }
    }
}

/// Resolved user detail from the account service.
#[derive(Debug, Clone, Deserialize)]
pub struct UserDetail {
    pub user_id: String,
    pub name: String,
    pub balance: f64,
    #[serde(rename = "operatorId")]
    pub operator_id: String,
}

#[derive(Debug, Deserialize)]
struct UserDetailResponse {
    status: bool,
    user: Option<UserDetail>,
}

/// Upstream identity resolution at connection time.
#[async_trait]
pub trait AccountService: Send + Sync {
    async fn fetch_user_detail(&self, token: &str) -> CardiqResult<UserDetail>;
}

/// HTTP client for the account service's user-detail endpoint.
pub struct HttpAccountClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAccountClient {
    pub fn new(base_url: String, timeout: Duration) -> CardiqResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CardiqError::Account(e.to_string()))?;
        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl AccountService for HttpAccountClient {
    async fn fetch_user_detail(&self, token: &str) -> CardiqResult<UserDetail> {
        let url = format!("{}/service/user/detail", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("token", token)
            .send()
            .await
            .map_err(|e| CardiqError::Account(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CardiqError::Account(format!(
                "user detail request failed with status {}",
                response.status()
            )));
        }

        let body: UserDetailResponse = response
            .json()
            .await
            .map_err(|e| CardiqError::Account(e.to_string()))?;

        match body {
            UserDetailResponse {
                status: true,
                user: Some(user),
            } => Ok(user),
            _ => Err(CardiqError::Account(
                "invalid token or user not found".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use std::sync::Arc;

    fn session_store() -> SessionStore {
        SessionStore::new(
            Cache::new(Arc::new(MemoryCache::new())),
            Duration::from_secs(60),
        )
    }

    fn session(key: &str, balance: f64) -> PlayerSession {
        PlayerSession {
            user_id: "u-1".to_string(),
            user_name: "alice".to_string(),
            balance,
            session_key: key.to_string(),
            operator_id: "op-1".to_string(),
            game_id: "g-1".to_string(),
            token: "tok".to_string(),
            ip: "10.0.0.1".to_string(),
        }
    }

    #[tokio::test]
    async fn put_get_delete() {
        let store = session_store();
        store.put(&session("s1", 100.0)).await.unwrap();
        let loaded = store.get("s1").await.unwrap().unwrap();
        assert_eq!(loaded.user_name, "alice");
        assert_eq!(loaded.balance, 100.0);

        store.delete("s1").await.unwrap();
        assert!(store.get("s1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn adjust_balance_applies_delta() {
        let store = session_store();
        store.put(&session("s1", 100.0)).await.unwrap();

        let after_debit = store.adjust_balance("s1", -40.0).await.unwrap();
        assert_eq!(after_debit, Some(60.0));

        let after_credit = store.adjust_balance("s1", 79.2).await.unwrap();
        assert_eq!(after_credit, Some(139.2));
    }

    #[tokio::test]
    async fn adjust_balance_without_session_is_none() {
        let store = session_store();
        assert_eq!(store.adjust_balance("ghost", 5.0).await.unwrap(), None);
    }
}
