//! Bet admission pipeline.
//!
//! Validation order is fixed, first failure wins: session, phase, round
//! id, payload, stake limits, balance. Only then is the wallet debited;
//! a refused or timed-out debit rejects the wager with nothing persisted.

use crate::bets::aggregate::{AggregateEntry, AggregateStore};
use crate::bets::types::{parse_bet_spec, Wager};
use crate::config::SettingsHandle;
use crate::errors::BetRejection;
use crate::game::round::{GameLobby, RoundPhase};
use crate::metrics::MetricsRegistry;
use crate::session::{PlayerSession, SessionStore};
use crate::store::{BetRecord, GameStore};
use crate::wallet::{WalletRequest, WalletService};
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, warn};

/// Acknowledgement returned to the connection on acceptance.
#[derive(Debug, Clone)]
pub struct BetAccepted {
    pub user_id: String,
    pub user_name: String,
    pub operator_id: String,
    /// Balance after the debit.
    pub balance: f64,
    pub total_staked: f64,
}

pub struct BettingEngine {
    lobby: Arc<GameLobby>,
    sessions: SessionStore,
    aggregates: Arc<AggregateStore>,
    wallet: Arc<dyn WalletService>,
    store: Arc<dyn GameStore>,
    settings: Arc<SettingsHandle>,
    metrics: Arc<MetricsRegistry>,
}

impl BettingEngine {
    pub fn new(
        lobby: Arc<GameLobby>,
        sessions: SessionStore,
        aggregates: Arc<AggregateStore>,
        wallet: Arc<dyn WalletService>,
        store: Arc<dyn GameStore>,
        settings: Arc<SettingsHandle>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            lobby,
            sessions,
            aggregates,
            wallet,
            store,
            settings,
            metrics,
        }
    }

    /// Validate, debit and admit one wager submission.
    pub async fn place_wager(
        &self,
        session_key: &str,
        round_id: u64,
        bet_data: &str,
    ) -> Result<BetAccepted, BetRejection> {
        let result = self.admit(session_key, round_id, bet_data).await;
        match &result {
            Ok(accepted) => {
                MetricsRegistry::incr(&self.metrics.bets_accepted_total);
                tracing::info!(
                    round_id,
                    user_id = %accepted.user_id,
                    total = accepted.total_staked,
                    "bet accepted"
                );
            }
            Err(rejection) => {
                MetricsRegistry::incr(&self.metrics.bets_rejected_total);
                error!(
                    target: "failed_bets",
                    round_id,
                    session_key,
                    bet_data,
                    reason = %rejection,
                    "bet rejected"
                );
            }
        }
        result
    }

    async fn admit(
        &self,
        session_key: &str,
        round_id: u64,
        bet_data: &str,
    ) -> Result<BetAccepted, BetRejection> {
        let session = self.require_session(session_key).await?;
        self.require_open_phase()?;
        self.require_current_round(round_id)?;

        let wager = parse_bet_spec(bet_data).ok_or(BetRejection::InvalidPayload)?;
        let total = wager.total();

        let settings = self.settings.load();
        if total < settings.min_stake || total > settings.max_stake {
            return Err(BetRejection::AmountOutOfRange);
        }
        if total > session.balance {
            return Err(BetRejection::InsufficientBalance);
        }

        let receipt = self
            .wallet
            .debit(&WalletRequest {
                user_id: session.user_id.clone(),
                operator_id: session.operator_id.clone(),
                game_id: session.game_id.clone(),
                token: session.token.clone(),
                amount: total,
                round_ref: round_id.to_string(),
                ip: session.ip.clone(),
            })
            .await
            .map_err(|_| BetRejection::DebitRefused)?;

        let balance = match self.sessions.adjust_balance(session_key, -total).await {
            Ok(Some(balance)) => balance,
            Ok(None) => {
                // Session expired between validation and debit; the wager
                // stays live in the aggregate.
                warn!(round_id, session_key, "session vanished after debit");
                session.balance - total
            }
            Err(e) => {
                warn!(round_id, session_key, error = %e, "failed to update cached balance");
                session.balance - total
            }
        };

        let entry = AggregateEntry {
            session_key: session_key.to_string(),
            identity: session.identity(),
            wager: wager.clone(),
            receipt: receipt.clone(),
        };
        self.aggregates
            .merge(round_id, &session.user_id, entry)
            .await
            .map_err(|e| {
                error!(round_id, error = %e, "failed to merge wager into aggregate");
                BetRejection::Internal
            })?;

        self.persist_audit_record(&session, round_id, &wager, &receipt.txn_id)
            .await;

        Ok(BetAccepted {
            user_id: session.user_id,
            user_name: session.user_name,
            operator_id: session.operator_id,
            balance,
            total_staked: total,
        })
    }

    async fn require_session(&self, session_key: &str) -> Result<PlayerSession, BetRejection> {
        match self.sessions.get(session_key).await {
            Ok(Some(session)) => Ok(session),
            Ok(None) => Err(BetRejection::SessionNotFound),
            Err(e) => {
                error!(session_key, error = %e, "session cache unavailable");
                Err(BetRejection::Internal)
            }
        }
    }

    fn require_open_phase(&self) -> Result<(), BetRejection> {
        let phase = self.lobby.snapshot().phase;
        match phase {
            RoundPhase::PlaceBet => Ok(()),
            p if p < RoundPhase::PlaceBet => Err(BetRejection::BettingNotOpen),
            _ => Err(BetRejection::BettingClosed),
        }
    }

    fn require_current_round(&self, round_id: u64) -> Result<(), BetRejection> {
        if round_id != self.lobby.current_round_id() {
            return Err(BetRejection::StaleRound);
        }
        Ok(())
    }

    /// Audit persistence runs after the money moved; a failure here is a
    /// fault to log, not a reason to unwind the live wager.
    async fn persist_audit_record(
        &self,
        session: &PlayerSession,
        round_id: u64,
        wager: &Wager,
        txn_id: &str,
    ) {
        let record = BetRecord {
            user_id: session.user_id.clone(),
            round_id,
            operator_id: session.operator_id.clone(),
            bet_amt: wager.total(),
            bet_values: wager.stakes.clone(),
            txn_id: txn_id.to_string(),
            created_at: Utc::now(),
        };
        if let Err(e) = self.store.record_bet(&record).await {
            error!(
                target: "failed_bets",
                round_id,
                user_id = %session.user_id,
                error = %e,
                "failed to persist accepted bet"
            );
        }
    }
}
