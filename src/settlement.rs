//! Settlement: payout computation and application at round end.
//!
//! Runs once per round on its own task. Idempotence is carried by the
//! aggregate: it is read at the start and deleted only after every record
//! is persisted, so a retry before the delete re-processes safely (the
//! wallet is idempotent per participant/round/direction) and a retry
//! after it is a no-op.

use crate::bets::aggregate::AggregateStore;
use crate::bets::types::{BetTarget, Wager};
use crate::config::{GameSettings, SettingsHandle};
use crate::errors::{CardiqError, CardiqResult};
use crate::game::evaluator::{HandCategory, RoundOutcome, Winner};
use crate::game::round::{GameEvent, GameLobby};
use crate::metrics::MetricsRegistry;
use crate::session::SessionStore;
use crate::store::{GameStore, SettlementRecord, SettlementStatus};
use crate::wallet::{WalletRequest, WalletService};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Outcome of one settlement pass, mostly for logging and tests.
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementSummary {
    pub round_id: u64,
    pub participants: usize,
    pub total_paid: f64,
}

impl SettlementSummary {
    fn empty(round_id: u64) -> Self {
        Self {
            round_id,
            participants: 0,
            total_paid: 0.0,
        }
    }
}

/// Gross payouts per winning target plus the cap-clamped total.
pub fn compute_payouts(
    wager: &Wager,
    outcome: &RoundOutcome,
    settings: &GameSettings,
) -> (BTreeMap<BetTarget, f64>, f64) {
    let mut payouts = BTreeMap::new();

    match outcome.winner {
        Winner::PlayerA => {
            pay_main(&mut payouts, wager, BetTarget::MainA, settings.main_odds.player_a);
            pay_side(&mut payouts, wager, BetTarget::SideA, outcome.hand_a.category, settings);
        }
        Winner::PlayerB => {
            pay_main(&mut payouts, wager, BetTarget::MainB, settings.main_odds.player_b);
            pay_side(&mut payouts, wager, BetTarget::SideB, outcome.hand_b.category, settings);
        }
        Winner::Tie => {
            // No main bet wins; both hands share side A's category on a
            // true tie, and side bets on either marker settle against it.
            pay_side(&mut payouts, wager, BetTarget::SideA, outcome.hand_a.category, settings);
            pay_side(&mut payouts, wager, BetTarget::SideB, outcome.hand_a.category, settings);
        }
    }

    let gross: f64 = payouts.values().sum();
    (payouts, gross.min(settings.max_payout_cap))
}

fn pay_main(
    payouts: &mut BTreeMap<BetTarget, f64>,
    wager: &Wager,
    target: BetTarget,
    odds: f64,
) {
    let stake = wager.stake(target);
    if stake > 0.0 {
        payouts.insert(target, stake * odds);
    }
}

fn pay_side(
    payouts: &mut BTreeMap<BetTarget, f64>,
    wager: &Wager,
    target: BetTarget,
    category: HandCategory,
    settings: &GameSettings,
) {
    let stake = wager.stake(target);
    let odds = side_odds_for(settings, category);
    if stake > 0.0 && odds > 0.0 {
        payouts.insert(target, stake * odds);
    }
}

fn side_odds_for(settings: &GameSettings, category: HandCategory) -> f64 {
    match category {
        HandCategory::HighCard => 0.0,
        HandCategory::Pair => settings.side_odds.pair,
        HandCategory::Flush => settings.side_odds.flush,
        HandCategory::Straight => settings.side_odds.straight,
        HandCategory::StraightFlush => settings.side_odds.straight_flush,
        HandCategory::Trio => settings.side_odds.trio,
    }
}

pub struct SettlementEngine {
    lobby: Arc<GameLobby>,
    aggregates: Arc<AggregateStore>,
    sessions: SessionStore,
    wallet: Arc<dyn WalletService>,
    store: Arc<dyn GameStore>,
    settings: Arc<SettingsHandle>,
    metrics: Arc<MetricsRegistry>,
}

impl SettlementEngine {
    pub fn new(
        lobby: Arc<GameLobby>,
        aggregates: Arc<AggregateStore>,
        sessions: SessionStore,
        wallet: Arc<dyn WalletService>,
        store: Arc<dyn GameStore>,
        settings: Arc<SettingsHandle>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            lobby,
            aggregates,
            sessions,
            wallet,
            store,
            settings,
            metrics,
        }
    }

    /// Settle every participant of the round, then consume the aggregate.
    pub async fn settle_round(&self, outcome: &RoundOutcome) -> CardiqResult<SettlementSummary> {
        let round_id = outcome.round_id;

        let bets = match self.aggregates.load(round_id).await? {
            Some(bets) if !bets.is_empty() => bets,
            _ => {
                debug!(round_id, "no bets to settle");
                return Ok(SettlementSummary::empty(round_id));
            }
        };

        let settings = self.settings.load();
        let pair_marker = match outcome.winner {
            Winner::PlayerB => "+B",
            Winner::PlayerA | Winner::Tie => "+A",
        };

        let mut summary = SettlementSummary::empty(round_id);
        let mut persist_failed = false;

        for (user_id, entry) in &bets.entries {
            let (payouts, win_amount) = compute_payouts(&entry.wager, outcome, &settings);
            let status = if win_amount > 0.0 {
                SettlementStatus::Win
            } else {
                SettlementStatus::Loss
            };

            if win_amount > 0.0 {
                self.credit_winner(round_id, user_id, entry, win_amount).await;
                summary.total_paid += win_amount;
            }

            let record = SettlementRecord {
                user_id: user_id.clone(),
                round_id,
                operator_id: entry.identity.operator_id.clone(),
                bet_amt: entry.wager.total(),
                win_amt: win_amount,
                bet_values: entry.wager.stakes.clone(),
                payouts,
                round_result: outcome.clone(),
                status,
                created_at: Utc::now(),
            };
            if let Err(e) = self.store.record_settlement(&record).await {
                persist_failed = true;
                error!(
                    target: "failed_settlements",
                    round_id,
                    user_id = %user_id,
                    error = %e,
                    "failed to persist settlement record"
                );
            }

            self.lobby.emit(GameEvent::Settled {
                session_key: entry.session_key.clone(),
                win_amount,
                status,
                winner: outcome.winner,
                pair: pair_marker.to_string(),
            });
            summary.participants += 1;
        }

        if persist_failed {
            // Keep the aggregate so the round is flagged and retryable;
            // the wallet dedupes per participant/round/direction.
            return Err(CardiqError::Settlement(format!(
                "round {} left unpersisted records",
                round_id
            )));
        }

        self.aggregates.clear(round_id).await?;
        MetricsRegistry::incr(&self.metrics.settlements_completed_total);
        Ok(summary)
    }

    /// Credit one winner and refresh their cached balance. A refused or
    /// timed-out credit is a logged fault; it never aborts the pass.
    async fn credit_winner(
        &self,
        round_id: u64,
        user_id: &str,
        entry: &crate::bets::aggregate::AggregateEntry,
        win_amount: f64,
    ) {
        let request = WalletRequest {
            user_id: entry.identity.user_id.clone(),
            operator_id: entry.identity.operator_id.clone(),
            game_id: entry.identity.game_id.clone(),
            token: entry.identity.token.clone(),
            amount: win_amount,
            round_ref: round_id.to_string(),
            ip: entry.identity.ip.clone(),
        };
        if let Err(e) = self.wallet.credit(&request).await {
            MetricsRegistry::incr(&self.metrics.settlement_credit_failures_total);
            error!(
                target: "failed_settlements",
                round_id,
                user_id = %user_id,
                error = %e,
                "credit transaction failed"
            );
        }

        match self.sessions.adjust_balance(&entry.session_key, win_amount).await {
            Ok(Some(balance)) => {
                self.lobby.emit(GameEvent::Balance {
                    session_key: entry.session_key.clone(),
                    user_id: entry.identity.user_id.clone(),
                    user_name: entry.identity.user_name.clone(),
                    operator_id: entry.identity.operator_id.clone(),
                    balance,
                });
            }
            Ok(None) => {
                // Player disconnected; the credit still went through.
                debug!(round_id, user_id = %user_id, "no session to update after credit");
            }
            Err(e) => {
                warn!(round_id, user_id = %user_id, error = %e, "failed to update cached balance");
            }
        }
    }
}
