//! Outbound WebSocket wire events.
//!
//! JSON messages carry an `event` tag; countdown ticks go out as the raw
//! `round:{roundId}:{phaseCode}:{seconds}` string the clients parse in
//! their render loop.

use crate::game::cards::Hand;
use crate::game::evaluator::{RoundOutcome, Winner};
use crate::game::round::RoundPhase;
use crate::store::SettlementStatus;
use axum::extract::ws::Message;
use serde::Serialize;
use std::sync::Arc;

/// Everything the service sends to a connection.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// Broadcast phase change.
    GameStatus { status: RoundPhase },
    /// Per-second countdown tick.
    Countdown {
        round_id: u64,
        phase_code: u8,
        seconds_left: u64,
    },
    /// Dealt hands, re-sent on each SHOW_CARDS tick.
    RoundCards { outcome: Arc<RoundOutcome> },
    /// Canonical round result at ENDED.
    RoundResult { outcome: Arc<RoundOutcome> },
    /// Identity + live balance for this connection.
    Info {
        user_id: String,
        user_name: String,
        balance: f64,
        operator_id: String,
    },
    /// Wager acknowledgement.
    BetAccepted,
    /// Wager or protocol rejection with the reason string.
    BetError { reason: String },
    /// Settlement notice for this connection.
    Settlement {
        win_amount: f64,
        status: SettlementStatus,
        winner: Winner,
        pair: String,
    },
    /// Connect-time snapshot for continuity.
    GameState {
        round_id: u64,
        phase: RoundPhase,
        history: Vec<Arc<RoundOutcome>>,
        outcome: Option<Arc<RoundOutcome>>,
    },
    /// Most recent winning amount, on connect.
    LastWin { amount: f64 },
}

#[derive(Serialize)]
#[serde(tag = "event")]
enum WireEvent<'a> {
    #[serde(rename = "game_status")]
    GameStatus { status: &'a str },
    #[serde(rename = "round_cards")]
    RoundCards {
        #[serde(rename = "roundId")]
        round_id: u64,
        #[serde(rename = "handA")]
        hand_a: &'a Hand,
        #[serde(rename = "handB")]
        hand_b: &'a Hand,
    },
    #[serde(rename = "round_result")]
    RoundResult {
        #[serde(rename = "roundResult")]
        round_result: &'a RoundOutcome,
    },
    #[serde(rename = "info")]
    Info {
        #[serde(rename = "urId")]
        user_id: &'a str,
        #[serde(rename = "urNm")]
        user_name: &'a str,
        #[serde(rename = "bl")]
        balance: f64,
        #[serde(rename = "operatorId")]
        operator_id: &'a str,
    },
    #[serde(rename = "bet_result")]
    BetResult { message: &'a str },
    #[serde(rename = "betError")]
    BetError { message: &'a str },
    #[serde(rename = "settlement")]
    Settlement {
        #[serde(rename = "winAmt")]
        win_amount: String,
        status: SettlementStatus,
        winner: Winner,
        pair: &'a str,
    },
    #[serde(rename = "game_state")]
    GameState {
        #[serde(rename = "roundId")]
        round_id: u64,
        status: &'a str,
        #[serde(rename = "statusCode")]
        status_code: u8,
        #[serde(rename = "prevRoundResults")]
        prev_round_results: &'a [Arc<RoundOutcome>],
        #[serde(rename = "roundResult")]
        round_result: Option<&'a RoundOutcome>,
    },
    #[serde(rename = "lastWin")]
    LastWin {
        #[serde(rename = "lastWin")]
        amount: String,
    },
}

impl Outbound {
    /// Render the event as a WebSocket message.
    pub fn into_message(self) -> Message {
        match &self {
            Outbound::Countdown {
                round_id,
                phase_code,
                seconds_left,
            } => {
                return Message::Text(format!(
                    "round:{}:{}:{}",
                    round_id, phase_code, seconds_left
                ));
            }
            _ => {}
        }

        let wire = match &self {
            Outbound::GameStatus { status } => WireEvent::GameStatus {
                status: status.as_str(),
            },
            Outbound::RoundCards { outcome } => WireEvent::RoundCards {
                round_id: outcome.round_id,
                hand_a: &outcome.hand_a.cards,
                hand_b: &outcome.hand_b.cards,
            },
            Outbound::RoundResult { outcome } => WireEvent::RoundResult {
                round_result: outcome,
            },
            Outbound::Info {
                user_id,
                user_name,
                balance,
                operator_id,
            } => WireEvent::Info {
                user_id,
                user_name,
                balance: *balance,
                operator_id,
            },
            Outbound::BetAccepted => WireEvent::BetResult {
                message: "bet has been accepted successfully",
            },
            Outbound::BetError { reason } => WireEvent::BetError { message: reason },
            Outbound::Settlement {
                win_amount,
                status,
                winner,
                pair,
            } => WireEvent::Settlement {
                win_amount: format!("{:.2}", win_amount),
                status: *status,
                winner: *winner,
                pair,
            },
            Outbound::GameState {
                round_id,
                phase,
                history,
                outcome,
            } => WireEvent::GameState {
                round_id: *round_id,
                status: phase.as_str(),
                status_code: phase.code(),
                prev_round_results: history,
                round_result: outcome.as_deref(),
            },
            Outbound::LastWin { amount } => WireEvent::LastWin {
                amount: format!("{:.2}", amount),
            },
            Outbound::Countdown { .. } => unreachable!("handled above"),
        };

        Message::Text(serde_json::to_string(&wire).expect("wire event serializes"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::evaluator::play_round;

    fn text(msg: Message) -> String {
        match msg {
            Message::Text(t) => t,
            other => panic!("expected text frame, got {:?}", other),
        }
    }

    #[test]
    fn countdown_renders_raw_tick_string() {
        let msg = Outbound::Countdown {
            round_id: 1_745_227_259_107,
            phase_code: 1,
            seconds_left: 9,
        }
        .into_message();
        assert_eq!(text(msg), "round:1745227259107:1:9");
    }

    #[test]
    fn settlement_formats_two_decimals() {
        let msg = Outbound::Settlement {
            win_amount: 198.0,
            status: SettlementStatus::Win,
            winner: Winner::PlayerA,
            pair: "+A".to_string(),
        }
        .into_message();
        let json: serde_json::Value = serde_json::from_str(&text(msg)).unwrap();
        assert_eq!(json["event"], "settlement");
        assert_eq!(json["winAmt"], "198.00");
        assert_eq!(json["status"], "WIN");
        assert_eq!(json["winner"], "PLAYER_A");
        assert_eq!(json["pair"], "+A");
    }

    #[test]
    fn info_uses_compact_field_names() {
        let msg = Outbound::Info {
            user_id: "u-1".to_string(),
            user_name: "alice".to_string(),
            balance: 875.0,
            operator_id: "op-1".to_string(),
        }
        .into_message();
        let json: serde_json::Value = serde_json::from_str(&text(msg)).unwrap();
        assert_eq!(json["event"], "info");
        assert_eq!(json["urId"], "u-1");
        assert_eq!(json["urNm"], "alice");
        assert_eq!(json["bl"], 875.0);
        assert_eq!(json["operatorId"], "op-1");
    }

    #[test]
    fn game_state_carries_snapshot_and_history() {
        let outcome = Arc::new(play_round(100, &mut rand::thread_rng()));
        let msg = Outbound::GameState {
            round_id: 100,
            phase: RoundPhase::ShowCards,
            history: vec![outcome.clone()],
            outcome: Some(outcome),
        }
        .into_message();
        let json: serde_json::Value = serde_json::from_str(&text(msg)).unwrap();
        assert_eq!(json["event"], "game_state");
        assert_eq!(json["status"], "SHOW_CARDS");
        assert_eq!(json["statusCode"], 3);
        assert_eq!(json["prevRoundResults"].as_array().unwrap().len(), 1);
        assert!(json["roundResult"]["handA"].is_object());
    }

    #[test]
    fn game_state_before_reveal_has_no_result() {
        let msg = Outbound::GameState {
            round_id: 100,
            phase: RoundPhase::PlaceBet,
            history: vec![],
            outcome: None,
        }
        .into_message();
        let json: serde_json::Value = serde_json::from_str(&text(msg)).unwrap();
        assert!(json["roundResult"].is_null());
    }
}
