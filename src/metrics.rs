//! Metrics collection with Prometheus text export.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters and gauges exposed at `/metrics`.
pub struct MetricsRegistry {
    /// Betting
    pub bets_accepted_total: AtomicU64,
    pub bets_rejected_total: AtomicU64,

    /// Rounds and settlement
    pub rounds_played_total: AtomicU64,
    pub settlements_completed_total: AtomicU64,
    pub settlement_credit_failures_total: AtomicU64,

    /// Operational fault: a round's bet aggregate survived into the next
    /// round. Requires manual reconciliation, never auto-corrected.
    pub unsettled_aggregates_detected: AtomicU64,

    /// WebSocket
    pub websocket_connections_active: AtomicU64,
    pub websocket_messages_sent: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            bets_accepted_total: AtomicU64::new(0),
            bets_rejected_total: AtomicU64::new(0),
            rounds_played_total: AtomicU64::new(0),
            settlements_completed_total: AtomicU64::new(0),
            settlement_credit_failures_total: AtomicU64::new(0),
            unsettled_aggregates_detected: AtomicU64::new(0),
            websocket_connections_active: AtomicU64::new(0),
            websocket_messages_sent: AtomicU64::new(0),
        }
    }

    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Render the registry in Prometheus exposition format.
    pub fn to_prometheus_format(&self) -> String {
        let mut output = String::new();

        let counters: [(&str, &str, &AtomicU64); 8] = [
            (
                "cardiq_bets_accepted_total",
                "Total accepted bet submissions",
                &self.bets_accepted_total,
            ),
            (
                "cardiq_bets_rejected_total",
                "Total rejected bet submissions",
                &self.bets_rejected_total,
            ),
            (
                "cardiq_rounds_played_total",
                "Total completed rounds",
                &self.rounds_played_total,
            ),
            (
                "cardiq_settlements_completed_total",
                "Total rounds settled",
                &self.settlements_completed_total,
            ),
            (
                "cardiq_settlement_credit_failures_total",
                "Wallet credit failures during settlement",
                &self.settlement_credit_failures_total,
            ),
            (
                "cardiq_unsettled_aggregates_detected",
                "Bet aggregates found alive at next round start",
                &self.unsettled_aggregates_detected,
            ),
            (
                "cardiq_websocket_connections_active",
                "Currently connected WebSocket clients",
                &self.websocket_connections_active,
            ),
            (
                "cardiq_websocket_messages_sent_total",
                "Outbound WebSocket messages",
                &self.websocket_messages_sent,
            ),
        ];

        for (name, help, value) in counters {
            let kind = if name.ends_with("_total") {
                "counter"
            } else {
                "gauge"
            };
            output.push_str(&format!(
                "# HELP {name} {help}\n# TYPE {name} {kind}\n{name} {}\n\n",
                value.load(Ordering::Relaxed)
            ));
        }

        output
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
