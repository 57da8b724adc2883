//! Bet admission: wire parsing, the per-round aggregate, and the
//! validation/debit pipeline.

pub mod aggregate;
pub mod engine;
pub mod types;

pub use aggregate::{AggregateEntry, AggregateStore, RoundBets};
pub use engine::{BetAccepted, BettingEngine};
pub use types::{parse_bet_spec, BetTarget, Wager};
