//! End-to-end round flow: open betting, admit wagers, reveal, settle.
//!
//! A stepped clock parks the round driver at every countdown tick so the
//! test controls exactly when the round advances.

use async_trait::async_trait;
use cardiq::bets::aggregate::AggregateStore;
use cardiq::bets::engine::BettingEngine;
use cardiq::cache::{Cache, MemoryCache};
use cardiq::config::{GameSettings, RoundConfig, SettingsHandle};
use cardiq::errors::WalletError;
use cardiq::game::clock::Clock;
use cardiq::game::evaluator::Winner;
use cardiq::game::round::{GameLobby, RoundDriver, RoundPhase};
use cardiq::metrics::MetricsRegistry;
use cardiq::session::{PlayerSession, SessionStore};
use cardiq::settlement::SettlementEngine;
use cardiq::store::{GameStore, RocksStore};
use cardiq::wallet::{WalletReceipt, WalletRequest, WalletService};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Clock that only advances when the test grants a step permit.
struct SteppedClock {
    now: AtomicU64,
    steps: Semaphore,
}

impl SteppedClock {
    fn new(start: u64) -> Self {
        Self {
            now: AtomicU64::new(start),
            steps: Semaphore::new(0),
        }
    }

    fn release(&self, steps: usize) {
        self.steps.add_permits(steps);
    }
}

#[async_trait]
impl Clock for SteppedClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    async fn sleep_until(&self, deadline_millis: u64) {
        let permit = self.steps.acquire().await.expect("clock closed");
        permit.forget();
        self.now.fetch_max(deadline_millis, Ordering::SeqCst);
    }
}

/// Counts wallet calls and approves everything.
struct CountingWallet {
    debits: AtomicUsize,
    credits: AtomicUsize,
}

impl CountingWallet {
    fn new() -> Self {
        Self {
            debits: AtomicUsize::new(0),
            credits: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl WalletService for CountingWallet {
    async fn debit(&self, request: &WalletRequest) -> Result<WalletReceipt, WalletError> {
        let n = self.debits.fetch_add(1, Ordering::SeqCst);
        Ok(WalletReceipt {
            txn_id: format!("debit-{}", n),
            amount: request.amount,
            round_ref: request.round_ref.clone(),
        })
    }

    async fn credit(&self, request: &WalletRequest) -> Result<WalletReceipt, WalletError> {
        let n = self.credits.fetch_add(1, Ordering::SeqCst);
        Ok(WalletReceipt {
            txn_id: format!("credit-{}", n),
            amount: request.amount,
            round_ref: request.round_ref.clone(),
        })
    }
}

struct Harness {
    lobby: Arc<GameLobby>,
    clock: Arc<SteppedClock>,
    driver: Arc<RoundDriver>,
    betting: Arc<BettingEngine>,
    settlement: Arc<SettlementEngine>,
    aggregates: Arc<AggregateStore>,
    sessions: SessionStore,
    wallet: Arc<CountingWallet>,
    store: Arc<RocksStore>,
    _dir: tempfile::TempDir,
}

fn harness() -> Harness {
    let dir = tempfile::TempDir::new().unwrap();
    let store = Arc::new(RocksStore::open(dir.path()).unwrap());
    let cache = Cache::new(Arc::new(MemoryCache::new()));
    let sessions = SessionStore::new(cache.clone(), Duration::from_secs(60));
    let aggregates = Arc::new(AggregateStore::new(cache));
    let wallet = Arc::new(CountingWallet::new());
    let settings = Arc::new(SettingsHandle::new(GameSettings::default()));
    let metrics = Arc::new(MetricsRegistry::new());
    let lobby = GameLobby::new(3);
    let clock = Arc::new(SteppedClock::new(1_745_227_259_107));

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
        wallet.clone(),
        store.clone(),
        settings,
        metrics.clone(),
    ));
    let timings = RoundConfig {
        place_bet_secs: 2,
        collect_bet_secs: 1,
        show_cards_secs: 1,
        ended_secs: 1,
        history_len: 3,
    };
    let driver = Arc::new(RoundDriver::new(
        lobby.clone(),
        clock.clone(),
        timings,
        settlement.clone(),
        aggregates.clone(),
        store.clone(),
        metrics,
    ));

    Harness {
        lobby,
        clock,
        driver,
        betting,
        settlement,
        aggregates,
        sessions,
        wallet,
        store,
        _dir: dir,
    }
}

async fn connect_player(h: &Harness, session_key: &str, user_id: &str, balance: f64) {
    h.sessions
        .put(&PlayerSession {
            user_id: user_id.to_string(),
            user_name: format!("name-{}", user_id),
            balance,
            session_key: session_key.to_string(),
            operator_id: "op-1".to_string(),
            game_id: "g-1".to_string(),
            token: "tok".to_string(),
            ip: "10.0.0.1".to_string(),
        })
        .await
        .unwrap();
}

async fn wait_for_phase(h: &Harness, phase: RoundPhase) {
    for _ in 0..200 {
        if h.lobby.snapshot().phase == phase {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("lobby never reached {:?}", phase);
}

async fn wait_for_settlement(h: &Harness, round_id: u64) {
    for _ in 0..200 {
        if !h.aggregates.exists(round_id).await.unwrap() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("round {} never settled", round_id);
}

#[tokio::test(flavor = "multi_thread")]
async fn full_round_settles_wagers_and_records_history() {
    let h = harness();
    connect_player(&h, "sid-1", "u-1", 1000.0).await;

    let driver = h.driver.clone();
    let round_task = tokio::spawn(async move { driver.run_round().await });

    wait_for_phase(&h, RoundPhase::PlaceBet).await;
    let round_id = h.lobby.current_round_id();

    // Cover both mains so exactly one wins on any decisive outcome.
    let accepted = h
        .betting
        .place_wager("sid-1", round_id, "A-100,B-100")
        .await
        .unwrap();
    assert_eq!(accepted.balance, 800.0);
    assert_eq!(h.wallet.debits.load(Ordering::SeqCst), 1);

    // Let the round run out.
    h.clock.release(64);
    round_task.await.unwrap();
    wait_for_settlement(&h, round_id).await;

    let outcome = h.lobby.outcome().expect("outcome published");
    assert_eq!(outcome.round_id, round_id);

    // History and persistence both carry the round.
    let history = h.lobby.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].round_id, round_id);
    let persisted = h.store.recent_rounds(3).await.unwrap();
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].round_id, round_id);

    // Settlement math: one main bet of 100 won at 1.98 unless it tied.
    let expected_win = match outcome.winner {
        Winner::PlayerA | Winner::PlayerB => 198.0,
        Winner::Tie => 0.0,
    };
    let session = h.sessions.get("sid-1").await.unwrap().unwrap();
    assert_eq!(session.balance, 800.0 + expected_win);
    assert_eq!(
        h.wallet.credits.load(Ordering::SeqCst),
        usize::from(expected_win > 0.0)
    );

    let last_win = h.store.last_win("u-1", "op-1").await.unwrap();
    if expected_win > 0.0 {
        assert_eq!(last_win, Some(expected_win));
    } else {
        assert!(last_win.is_none());
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn settlement_retrigger_is_a_no_op() {
    let h = harness();
    connect_player(&h, "sid-1", "u-1", 1000.0).await;

    let driver = h.driver.clone();
    let round_task = tokio::spawn(async move { driver.run_round().await });

    wait_for_phase(&h, RoundPhase::PlaceBet).await;
    let round_id = h.lobby.current_round_id();
    h.betting
        .place_wager("sid-1", round_id, "A-100,B-100")
        .await
        .unwrap();

    h.clock.release(64);
    round_task.await.unwrap();
    wait_for_settlement(&h, round_id).await;

    let outcome = h.lobby.outcome().expect("outcome published");
    let credits_after_first = h.wallet.credits.load(Ordering::SeqCst);

    // The aggregate is gone, so a second invocation settles nobody.
    let summary = h.settlement.settle_round(&outcome).await.unwrap();
    assert_eq!(summary.participants, 0);
    assert_eq!(h.wallet.credits.load(Ordering::SeqCst), credits_after_first);
}

#[tokio::test(flavor = "multi_thread")]
async fn bets_outside_the_window_are_rejected() {
    let h = harness();
    connect_player(&h, "sid-1", "u-1", 1000.0).await;

    let driver = h.driver.clone();
    let round_task = tokio::spawn(async move { driver.run_round().await });

    wait_for_phase(&h, RoundPhase::PlaceBet).await;
    let round_id = h.lobby.current_round_id();

    // Stale round id fails even while betting is open.
    let err = h
        .betting
        .place_wager("sid-1", round_id + 1, "A-100")
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "invalid roundId");

    // Step past the betting window, then try again.
    h.clock.release(2);
    wait_for_phase(&h, RoundPhase::CollectBet).await;
    let err = h
        .betting
        .place_wager("sid-1", round_id, "A-100")
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "bets closed for this round");

    h.clock.release(64);
    round_task.await.unwrap();
    assert_eq!(h.wallet.debits.load(Ordering::SeqCst), 0);
}
