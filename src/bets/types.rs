//! Bet targets and wager parsing.
//!
//! Wire format: `<target>-<amount>[,<target>-<amount>...]` with target
//! symbols `A`, `B` (main bets) and `+A`, `+B` (side bets). A submission
//! is atomic: one bad target or amount invalidates the whole payload.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The four legal bet targets.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum BetTarget {
    #[serde(rename = "MAIN_A")]
    MainA,
    #[serde(rename = "MAIN_B")]
    MainB,
    #[serde(rename = "SIDE_A")]
    SideA,
    #[serde(rename = "SIDE_B")]
    SideB,
}

impl BetTarget {
    /// Parse the wire symbol.
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "A" => Some(BetTarget::MainA),
            "B" => Some(BetTarget::MainB),
            "+A" => Some(BetTarget::SideA),
            "+B" => Some(BetTarget::SideB),
            _ => None,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            BetTarget::MainA => "A",
            BetTarget::MainB => "B",
            BetTarget::SideA => "+A",
            BetTarget::SideB => "+B",
        }
    }

    pub fn is_side(&self) -> bool {
        matches!(self, BetTarget::SideA | BetTarget::SideB)
    }
}

impl fmt::Display for BetTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BetTarget::MainA => "MAIN_A",
            BetTarget::MainB => "MAIN_B",
            BetTarget::SideA => "SIDE_A",
            BetTarget::SideB => "SIDE_B",
        };
        write!(f, "{}", name)
    }
}

/// One participant's stakes for a round. Repeated submissions accumulate
/// per target; they never replace existing stakes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Wager {
    pub stakes: BTreeMap<BetTarget, f64>,
}

impl Wager {
    pub fn total(&self) -> f64 {
        self.stakes.values().sum()
    }

    pub fn stake(&self, target: BetTarget) -> f64 {
        self.stakes.get(&target).copied().unwrap_or(0.0)
    }

    /// Attribute-level merge: add the other wager's stakes per target.
    pub fn merge(&mut self, other: &Wager) {
        for (target, amount) in &other.stakes {
            *self.stakes.entry(*target).or_insert(0.0) += amount;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.stakes.is_empty()
    }
}

/// Parse a bet payload. Returns `None` when any part of the submission is
/// invalid; duplicate targets within one payload accumulate.
pub fn parse_bet_spec(data: &str) -> Option<Wager> {
    if data.is_empty() {
        return None;
    }

    let mut wager = Wager::default();
    for part in data.split(',') {
        let (symbol, amount) = part.split_once('-')?;
        let target = BetTarget::from_symbol(symbol)?;
        let stake: f64 = amount.parse().ok()?;
        if !stake.is_finite() || stake < 0.0 {
            return None;
        }
        *wager.stakes.entry(target).or_insert(0.0) += stake;
    }
    Some(wager)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_four_targets() {
        let wager = parse_bet_spec("A-10,B-20,+A-5,+B-2.5").unwrap();
        assert_eq!(wager.stake(BetTarget::MainA), 10.0);
        assert_eq!(wager.stake(BetTarget::MainB), 20.0);
        assert_eq!(wager.stake(BetTarget::SideA), 5.0);
        assert_eq!(wager.stake(BetTarget::SideB), 2.5);
        assert_eq!(wager.total(), 37.5);
    }

    #[test]
    fn duplicate_targets_accumulate_within_one_payload() {
        let wager = parse_bet_spec("A-10,A-15").unwrap();
        assert_eq!(wager.stake(BetTarget::MainA), 25.0);
    }

    #[test]
    fn one_invalid_part_rejects_the_whole_payload() {
        assert!(parse_bet_spec("A-10,C-5").is_none());
        assert!(parse_bet_spec("A-10,B-abc").is_none());
        assert!(parse_bet_spec("A-10,B--5").is_none());
        assert!(parse_bet_spec("A-10,B-NaN").is_none());
        assert!(parse_bet_spec("").is_none());
        assert!(parse_bet_spec("A10").is_none());
    }

    #[test]
    fn merge_accumulates_per_target() {
        let mut first = parse_bet_spec("A-100").unwrap();
        let second = parse_bet_spec("A-50,+B-25").unwrap();
        first.merge(&second);
        assert_eq!(first.stake(BetTarget::MainA), 150.0);
        assert_eq!(first.stake(BetTarget::SideB), 25.0);
    }

    #[test]
    fn targets_serialize_canonical_names() {
        let json = serde_json::to_value(BetTarget::SideA).unwrap();
        assert_eq!(json, "SIDE_A");
    }
}
