//! The round state machine.
//!
//! One perpetual loop drives `STARTED → PLACE_BET → COLLECT_BET →
//! SHOW_CARDS → ENDED` with fixed, configurable phase durations. The
//! [`GameLobby`] owns the current round's identity, phase and outcome and
//! is the only writer; everything else reads through narrow accessors or
//! listens on the broadcast channel.

use crate::bets::aggregate::AggregateStore;
use crate::config::RoundConfig;
use crate::game::clock::Clock;
use crate::game::evaluator::{play_round, RoundOutcome, Winner};
use crate::metrics::MetricsRegistry;
use crate::settlement::SettlementEngine;
use crate::store::{GameStore, SettlementStatus};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Round phases in lifecycle order; the derived ordering answers
/// "precedes/follows the betting window".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum RoundPhase {
    #[serde(rename = "STARTED")]
    Started,
    #[serde(rename = "PLACE_BET")]
    PlaceBet,
    #[serde(rename = "COLLECT_BET")]
    CollectBet,
    #[serde(rename = "SHOW_CARDS")]
    ShowCards,
    #[serde(rename = "ENDED")]
    Ended,
}

impl RoundPhase {
    /// Wire phase code: PLACE_BET=1 .. ENDED=4.
    pub fn code(&self) -> u8 {
        match self {
            RoundPhase::Started => 0,
            RoundPhase::PlaceBet => 1,
            RoundPhase::CollectBet => 2,
            RoundPhase::ShowCards => 3,
            RoundPhase::Ended => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RoundPhase::Started => "STARTED",
            RoundPhase::PlaceBet => "PLACE_BET",
            RoundPhase::CollectBet => "COLLECT_BET",
            RoundPhase::ShowCards => "SHOW_CARDS",
            RoundPhase::Ended => "ENDED",
        }
    }
}

/// Read-only view of the machine's position.
#[derive(Debug, Clone, Copy)]
pub struct RoundSnapshot {
    pub round_id: u64,
    pub phase: RoundPhase,
}

/// Events fanned out to every connection plus targeted per-session
/// notices routed through the same channel and filtered at the socket.
#[derive(Debug, Clone)]
pub enum GameEvent {
    Phase {
        round_id: u64,
        phase: RoundPhase,
    },
    Tick {
        round_id: u64,
        phase: RoundPhase,
        seconds_left: u64,
    },
    /// Dealt hands, re-emitted on every SHOW_CARDS tick.
    Cards { outcome: Arc<RoundOutcome> },
    /// Canonical round result, emitted at the transition into ENDED.
    Result { outcome: Arc<RoundOutcome> },
    /// Targeted: updated identity/balance for one session.
    Balance {
        session_key: String,
        user_id: String,
        user_name: String,
        operator_id: String,
        balance: f64,
    },
    /// Targeted: settlement notice for one session.
    Settled {
        session_key: String,
        win_amount: f64,
        status: SettlementStatus,
        winner: Winner,
        pair: String,
    },
}

struct LobbyState {
    round_id: u64,
    phase: RoundPhase,
    outcome: Option<Arc<RoundOutcome>>,
}

/// Owner of the current round context and the bounded result history.
pub struct GameLobby {
    state: RwLock<LobbyState>,
    history: RwLock<VecDeque<Arc<RoundOutcome>>>,
    history_len: usize,
    events: broadcast::Sender<GameEvent>,
}

impl GameLobby {
    pub fn new(history_len: usize) -> Arc<Self> {
        let (events, _) = broadcast::channel(1024);
        Arc::new(Self {
            state: RwLock::new(LobbyState {
                round_id: 0,
                phase: RoundPhase::Started,
                outcome: None,
            }),
            history: RwLock::new(VecDeque::with_capacity(history_len)),
            history_len,
            events,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GameEvent> {
        self.events.subscribe()
    }

    pub fn emit(&self, event: GameEvent) {
        // A send error only means no connected receivers right now.
        if self.events.send(event).is_err() {
            debug!("no subscribers for game event");
        }
    }

    pub fn current_round_id(&self) -> u64 {
        self.state.read().expect("lobby lock poisoned").round_id
    }

    pub fn snapshot(&self) -> RoundSnapshot {
        let state = self.state.read().expect("lobby lock poisoned");
        RoundSnapshot {
            round_id: state.round_id,
            phase: state.phase,
        }
    }

    /// The current outcome; `None` before SHOW_CARDS.
    pub fn outcome(&self) -> Option<Arc<RoundOutcome>> {
        self.state.read().expect("lobby lock poisoned").outcome.clone()
    }

    /// Finished rounds, oldest first, at most `history_len`.
    pub fn history(&self) -> Vec<Arc<RoundOutcome>> {
        self.history
            .read()
            .expect("history lock poisoned")
            .iter()
            .cloned()
            .collect()
    }

    /// Seed history from persisted outcomes (newest first on input), used
    /// once at startup when the in-memory history is empty.
    pub fn backfill_history(&self, mut outcomes: Vec<RoundOutcome>) {
        let mut history = self.history.write().expect("history lock poisoned");
        if !history.is_empty() {
            return;
        }
        outcomes.truncate(self.history_len);
        for outcome in outcomes.into_iter().rev() {
            history.push_back(Arc::new(outcome));
        }
    }

    /// Mint the next round id and reset per-round state.
    pub(crate) fn begin_round(&self, now_millis: u64) -> u64 {
        let mut state = self.state.write().expect("lobby lock poisoned");
        state.round_id = now_millis.max(state.round_id + 1);
        state.phase = RoundPhase::Started;
        state.outcome = None;
        let round_id = state.round_id;
        drop(state);
        self.emit(GameEvent::Phase {
            round_id,
            phase: RoundPhase::Started,
        });
        round_id
    }

    pub(crate) fn set_phase(&self, phase: RoundPhase) {
        let round_id = {
            let mut state = self.state.write().expect("lobby lock poisoned");
            state.phase = phase;
            state.round_id
        };
        self.emit(GameEvent::Phase { round_id, phase });
    }

    /// Enter SHOW_CARDS with the evaluated outcome.
    pub(crate) fn publish_outcome(&self, outcome: Arc<RoundOutcome>) {
        let round_id = {
            let mut state = self.state.write().expect("lobby lock poisoned");
            state.phase = RoundPhase::ShowCards;
            state.outcome = Some(outcome.clone());
            state.round_id
        };
        self.emit(GameEvent::Phase {
            round_id,
            phase: RoundPhase::ShowCards,
        });
    }

    pub(crate) fn push_history(&self, outcome: Arc<RoundOutcome>) {
        let mut history = self.history.write().expect("history lock poisoned");
        if history.len() >= self.history_len {
            history.pop_front();
        }
        history.push_back(outcome);
    }
}

/// Drives the lobby through rounds forever.
pub struct RoundDriver {
    lobby: Arc<GameLobby>,
    clock: Arc<dyn Clock>,
    timings: RoundConfig,
    settlement: Arc<SettlementEngine>,
    aggregates: Arc<AggregateStore>,
    store: Arc<dyn GameStore>,
    metrics: Arc<MetricsRegistry>,
}

impl RoundDriver {
    pub fn new(
        lobby: Arc<GameLobby>,
        clock: Arc<dyn Clock>,
        timings: RoundConfig,
        settlement: Arc<SettlementEngine>,
        aggregates: Arc<AggregateStore>,
        store: Arc<dyn GameStore>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            lobby,
            clock,
            timings,
            settlement,
            aggregates,
            store,
            metrics,
        }
    }

    /// The perpetual loop. Per-round failures never escape it.
    pub async fn run(self: Arc<Self>) {
        info!("round loop starting");
        loop {
            self.run_round().await;
        }
    }

    /// One full round, from minting the id through the cooldown.
    pub async fn run_round(&self) {
        let prev_round = self.lobby.current_round_id();
        let round_id = self.lobby.begin_round(self.clock.now_millis());
        info!(round_id, "round started");

        if prev_round != 0 {
            self.check_previous_round_settled(prev_round).await;
        }

        self.lobby.set_phase(RoundPhase::PlaceBet);
        self.countdown(round_id, RoundPhase::PlaceBet, self.timings.place_bet_secs, None)
            .await;

        self.lobby.set_phase(RoundPhase::CollectBet);
        self.countdown(
            round_id,
            RoundPhase::CollectBet,
            self.timings.collect_bet_secs,
            None,
        )
        .await;

        let outcome = Arc::new(play_round(round_id, &mut rand::thread_rng()));
        self.lobby.publish_outcome(outcome.clone());
        self.spawn_settlement(outcome.clone());
        self.countdown(
            round_id,
            RoundPhase::ShowCards,
            self.timings.show_cards_secs,
            Some(&outcome),
        )
        .await;

        self.lobby.set_phase(RoundPhase::Ended);
        self.lobby.emit(GameEvent::Result {
            outcome: outcome.clone(),
        });
        self.countdown(round_id, RoundPhase::Ended, self.timings.ended_secs, None)
            .await;

        if let Err(e) = self.store.record_round(&outcome).await {
            error!(round_id, error = %e, "failed to persist round outcome");
        }
        self.lobby.push_history(outcome);
        MetricsRegistry::incr(&self.metrics.rounds_played_total);
    }

    /// Settlement never blocks the timer: it runs on its own task and the
    /// loop proceeds on schedule regardless of completion.
    fn spawn_settlement(&self, outcome: Arc<RoundOutcome>) {
        let engine = self.settlement.clone();
        tokio::spawn(async move {
            if let Err(e) = engine.settle_round(&outcome).await {
                error!(
                    target: "failed_settlements",
                    round_id = outcome.round_id,
                    error = %e,
                    "settlement failed"
                );
            }
        });
    }

    /// An aggregate that survived into the next round means settlement did
    /// not finish inside the ENDED window: alert, never auto-correct.
    async fn check_previous_round_settled(&self, prev_round: u64) {
        match self.aggregates.exists(prev_round).await {
            Ok(true) => {
                MetricsRegistry::incr(&self.metrics.unsettled_aggregates_detected);
                error!(
                    target: "failed_settlements",
                    round_id = prev_round,
                    "bet aggregate still present at next round start; manual reconciliation required"
                );
            }
            Ok(false) => {}
            Err(e) => {
                warn!(round_id = prev_round, error = %e, "could not verify previous round aggregate");
            }
        }
    }

    /// Per-second countdown against absolute deadlines. During SHOW_CARDS
    /// the dealt hands ride along with every tick.
    async fn countdown(
        &self,
        round_id: u64,
        phase: RoundPhase,
        seconds: u64,
        outcome: Option<&Arc<RoundOutcome>>,
    ) {
        let phase_start = self.clock.now_millis();
        for remaining in (1..=seconds).rev() {
            self.lobby.emit(GameEvent::Tick {
                round_id,
                phase,
                seconds_left: remaining,
            });
            if let Some(outcome) = outcome {
                self.lobby.emit(GameEvent::Cards {
                    outcome: outcome.clone(),
                });
            }
            let deadline = phase_start + (seconds - remaining + 1) * 1000;
            self.clock.sleep_until(deadline).await;
        }
    }
}
