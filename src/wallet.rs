//! Wallet/ledger collaborator.
//!
//! Debits happen synchronously during bet admission, credits during
//! settlement. Both carry a fresh transaction id and the round reference;
//! the upstream is idempotent per (participant, round_ref, direction), so
//! the engines never re-issue a call once a receipt or a definitive
//! refusal came back. A timed-out debit counts as a refusal.

use crate::errors::WalletError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::error;
use uuid::Uuid;

/// A single debit or credit request.
#[derive(Debug, Clone)]
pub struct WalletRequest {
    pub user_id: String,
    pub operator_id: String,
    pub game_id: String,
    pub token: String,
    pub amount: f64,
    /// Round id string; the idempotence key alongside user and direction.
    pub round_ref: String,
    pub ip: String,
}

/// Proof of a completed wallet transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletReceipt {
    pub txn_id: String,
    pub amount: f64,
    pub round_ref: String,
}

#[async_trait]
pub trait WalletService: Send + Sync {
    async fn debit(&self, request: &WalletRequest) -> Result<WalletReceipt, WalletError>;

    async fn credit(&self, request: &WalletRequest) -> Result<WalletReceipt, WalletError>;
}

#[derive(Debug, Serialize)]
struct BalanceWebhook<'a> {
    txn_id: String,
    ip: &'a str,
    game_id: &'a str,
    user_id: &'a str,
    amount: f64,
    description: String,
    /// 0 = debit, 1 = credit
    txn_type: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    bet_id: Option<&'a str>,
    #[serde(rename = "operatorId")]
    operator_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    status: bool,
}

/// HTTP wallet client hitting the operator balance endpoint.
pub struct HttpWallet {
    client: reqwest::Client,
    base_url: String,
    game_name: String,
}

impl HttpWallet {
    pub fn new(
        base_url: String,
        game_name: String,
        timeout: Duration,
    ) -> Result<Self, WalletError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(WalletError::from)?;
        Ok(Self {
            client,
            base_url,
            game_name,
        })
    }

    async fn send(
        &self,
        request: &WalletRequest,
        txn_type: u8,
        description: String,
    ) -> Result<WalletReceipt, WalletError> {
        let txn_id = Uuid::new_v4().to_string();
        let payload = BalanceWebhook {
            txn_id: txn_id.clone(),
            ip: &request.ip,
            game_id: &request.game_id,
            user_id: &request.user_id,
            amount: request.amount,
            description,
            txn_type,
            bet_id: (txn_type == 0).then_some(request.round_ref.as_str()),
            operator_id: &request.operator_id,
        };

        let url = format!("{}/service/operator/user/balance/v2", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("token", &request.token)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            error!(
                target: "wallet",
                status = %response.status(),
                user_id = %request.user_id,
                round_ref = %request.round_ref,
                "wallet transaction rejected upstream"
            );
            return Err(WalletError::Refused);
        }

        let body: BalanceResponse = response
            .json()
            .await
            .map_err(|e| WalletError::Transport(e.to_string()))?;
        if !body.status {
            return Err(WalletError::Refused);
        }

        Ok(WalletReceipt {
            txn_id,
            amount: request.amount,
            round_ref: request.round_ref.clone(),
        })
    }
}

#[async_trait]
impl WalletService for HttpWallet {
    async fn debit(&self, request: &WalletRequest) -> Result<WalletReceipt, WalletError> {
        let description = format!(
            "{:.2} debited for {} game for Round {}",
            request.amount, self.game_name, request.round_ref
        );
        self.send(request, 0, description).await
    }

    async fn credit(&self, request: &WalletRequest) -> Result<WalletReceipt, WalletError> {
        let description = format!(
            "{:.2} credited for {} game for Round {}",
            request.amount, self.game_name, request.round_ref
        );
        self.send(request, 1, description).await
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingWallet;
    use super::*;

    fn request(amount: f64) -> WalletRequest {
        WalletRequest {
            user_id: "u-1".to_string(),
            operator_id: "op-1".to_string(),
            game_id: "g-1".to_string(),
            token: "tok".to_string(),
            amount,
            round_ref: "1745227259107".to_string(),
            ip: "10.0.0.1".to_string(),
        }
    }

    #[tokio::test]
    async fn approving_wallet_returns_receipts() {
        let wallet = RecordingWallet::approving();
        let receipt = wallet.debit(&request(100.0)).await.unwrap();
        assert_eq!(receipt.amount, 100.0);
        assert_eq!(receipt.round_ref, "1745227259107");
        assert_eq!(wallet.debit_count(), 1);
    }

    #[tokio::test]
    async fn refusing_wallet_fails_debit() {
        let wallet = RecordingWallet::refusing_debits();
        let result = wallet.debit(&request(100.0)).await;
        assert!(matches!(result, Err(WalletError::Refused)));
    }
}
