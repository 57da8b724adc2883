//! Error types for the Cardiq game service
//!
//! Bet validation faults carry the exact reason string surfaced to the
//! player; upstream faults (wallet, cache, store) carry enough context
//! for the audit log.

use thiserror::Error;

/// Root error type for Cardiq operations
#[derive(Debug, Error)]
pub enum CardiqError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("wallet error: {0}")]
    Wallet(#[from] WalletError),

    #[error("account service error: {0}")]
    Account(String),

    #[error("settlement error: {0}")]
    Settlement(String),
}

/// Persistence store faults
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open store: {0}")]
    OpenFailed(String),

    #[error("write failed: {0}")]
    WriteFailed(String),

    #[error("read failed: {0}")]
    ReadFailed(String),

    #[error("corrupted record: {0}")]
    CorruptedRecord(String),
}

/// Session/aggregate cache faults
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    #[error("failed to encode cache value: {0}")]
    Encode(String),

    #[error("failed to decode cache value: {0}")]
    Decode(String),
}

/// Wallet/ledger collaborator faults
#[derive(Debug, Error)]
pub enum WalletError {
    /// The upstream answered with a definitive refusal.
    #[error("transaction refused by upstream")]
    Refused,

    /// Bounded timeout elapsed. Treated as a refusal for debits.
    #[error("wallet request timed out")]
    Timeout,

    #[error("wallet transport error: {0}")]
    Transport(String),
}

/// Bet admission rejections, in validation order.
///
/// `Display` yields the reason string sent back over the wire, so the
/// variants double as the caller-facing protocol vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BetRejection {
    #[error("player details not found in cache")]
    SessionNotFound,

    /// Betting has not opened yet for this round.
    #[error("not accepting bets for this round")]
    BettingNotOpen,

    /// Betting already closed for this round.
    #[error("bets closed for this round")]
    BettingClosed,

    #[error("invalid roundId")]
    StaleRound,

    #[error("Invalid Bet Payload")]
    InvalidPayload,

    #[error("Invalid Bet Amount")]
    AmountOutOfRange,

    #[error("Insufficient Balance")]
    InsufficientBalance,

    #[error("Bet Cancelled By Upstream Server.")]
    DebitRefused,

    /// Cache or store became unreachable mid-admission.
    #[error("unable to place bet")]
    Internal,
}

/// Convenience alias used throughout the crate
pub type CardiqResult<T> = Result<T, CardiqError>;

impl From<reqwest::Error> for WalletError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            WalletError::Timeout
        } else {
            WalletError::Transport(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_reasons_match_wire_strings() {
        assert_eq!(
            BetRejection::BettingNotOpen.to_string(),
            "not accepting bets for this round"
        );
        assert_eq!(
            BetRejection::BettingClosed.to_string(),
            "bets closed for this round"
        );
        assert_eq!(BetRejection::StaleRound.to_string(), "invalid roundId");
        assert_eq!(
            BetRejection::DebitRefused.to_string(),
            "Bet Cancelled By Upstream Server."
        );
    }

    #[test]
    fn wallet_error_wraps_into_crate_error() {
        let err: CardiqError = WalletError::Refused.into();
        assert!(err.to_string().contains("refused"));
    }
}
