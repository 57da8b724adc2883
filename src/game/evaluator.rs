//! Hand ranking and winner determination.
//!
//! Pure functions of their inputs: the same hands always produce the same
//! rank and the same winner. Category precedence, highest first:
//! TRIO > STRAIGHT_FLUSH > STRAIGHT > FLUSH > PAIR > HIGH_CARD, with the
//! Ace-low run {A,2,3} counting as a straight valued 3.

use crate::game::cards::{Card, Hand};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Hand categories, declared in ascending precedence so the derived
/// ordering matches comparison order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum HandCategory {
    #[serde(rename = "HIGH_CARD")]
    HighCard,
    #[serde(rename = "PAIR")]
    Pair,
    #[serde(rename = "FLUSH")]
    Flush,
    #[serde(rename = "STRAIGHT")]
    Straight,
    #[serde(rename = "STRAIGHT_FLUSH")]
    StraightFlush,
    #[serde(rename = "TRIO")]
    Trio,
}

impl HandCategory {
    /// Numeric precedence carried alongside the name in round results.
    pub fn precedence(&self) -> u8 {
        *self as u8
    }
}

/// Comparable rank of a hand: category first, then the primary value.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct HandRank {
    pub category: HandCategory,
    pub value: u8,
}

/// Round winner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Winner {
    #[serde(rename = "PLAYER_A")]
    PlayerA,
    #[serde(rename = "PLAYER_B")]
    PlayerB,
    #[serde(rename = "TIE")]
    Tie,
}

impl Winner {
    pub fn as_str(&self) -> &'static str {
        match self {
            Winner::PlayerA => "PLAYER_A",
            Winner::PlayerB => "PLAYER_B",
            Winner::Tie => "TIE",
        }
    }
}

/// One side's ranked hand as published in round results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedHand {
    #[serde(rename = "handType")]
    pub category: HandCategory,
    pub rank: u8,
    pub value: u8,
    pub cards: Hand,
}

impl RankedHand {
    fn new(cards: Hand) -> Self {
        let HandRank { category, value } = rank(&cards);
        Self {
            category,
            rank: category.precedence(),
            value,
            cards,
        }
    }

    pub fn hand_rank(&self) -> HandRank {
        HandRank {
            category: self.category,
            value: self.value,
        }
    }
}

/// Immutable outcome of one round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundOutcome {
    #[serde(rename = "roundId")]
    pub round_id: u64,
    pub winner: Winner,
    #[serde(rename = "handA")]
    pub hand_a: RankedHand,
    #[serde(rename = "handB")]
    pub hand_b: RankedHand,
}

/// Rank a three-card hand.
pub fn rank(hand: &Hand) -> HandRank {
    let mut vals = [hand[0].val, hand[1].val, hand[2].val];
    vals.sort_unstable();

    let flush = hand[0].suit == hand[1].suit && hand[1].suit == hand[2].suit;
    let trio = vals[0] == vals[1] && vals[1] == vals[2];
    let straight_high = straight_high(vals);

    if trio {
        return HandRank {
            category: HandCategory::Trio,
            value: vals[0],
        };
    }
    if let Some(high) = straight_high {
        return HandRank {
            category: if flush {
                HandCategory::StraightFlush
            } else {
                HandCategory::Straight
            },
            value: high,
        };
    }
    if flush {
        return HandRank {
            category: HandCategory::Flush,
            value: vals[2],
        };
    }
    if vals[0] == vals[1] || vals[1] == vals[2] {
        // The middle of the sorted triple is always the paired value.
        return HandRank {
            category: HandCategory::Pair,
            value: vals[1],
        };
    }
    HandRank {
        category: HandCategory::HighCard,
        value: vals[2],
    }
}

/// High end of a three-card run, if the sorted values form one.
/// The Ace-low run {A,2,3} is valued 3, not 14.
fn straight_high(sorted: [u8; 3]) -> Option<u8> {
    if sorted[0] + 1 == sorted[1] && sorted[1] + 1 == sorted[2] {
        return Some(sorted[2]);
    }
    if sorted == [2, 3, 14] {
        return Some(3);
    }
    None
}

/// Decide the round winner. Total order over hands: category precedence,
/// then primary value, then cards sorted by descending value compared
/// position-by-position, then suits under the fixed D < C < H < S order.
pub fn determine_winner(hand_a: &Hand, hand_b: &Hand) -> Winner {
    let rank_a = rank(hand_a);
    let rank_b = rank(hand_b);

    match rank_a.cmp(&rank_b) {
        std::cmp::Ordering::Greater => return Winner::PlayerA,
        std::cmp::Ordering::Less => return Winner::PlayerB,
        std::cmp::Ordering::Equal => {}
    }

    let sorted_a = sorted_desc(hand_a);
    let sorted_b = sorted_desc(hand_b);

    for i in 0..3 {
        if sorted_a[i].val != sorted_b[i].val {
            return if sorted_a[i].val > sorted_b[i].val {
                Winner::PlayerA
            } else {
                Winner::PlayerB
            };
        }
    }

    for i in 0..3 {
        let wa = sorted_a[i].suit.tiebreak_weight();
        let wb = sorted_b[i].suit.tiebreak_weight();
        if wa != wb {
            return if wa > wb { Winner::PlayerA } else { Winner::PlayerB };
        }
    }

    Winner::Tie
}

fn sorted_desc(hand: &Hand) -> Hand {
    let mut sorted = *hand;
    sorted.sort_by(|a, b| b.val.cmp(&a.val));
    sorted
}

/// Deal and evaluate one full round.
pub fn play_round<R: Rng + ?Sized>(round_id: u64, rng: &mut R) -> RoundOutcome {
    let mut deck = crate::game::cards::Deck::standard();
    deck.shuffle(rng);
    let (cards_a, cards_b) = deck.deal_two_hands();

    let winner = determine_winner(&cards_a, &cards_b);
    RoundOutcome {
        round_id,
        winner,
        hand_a: RankedHand::new(cards_a),
        hand_b: RankedHand::new(cards_b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::cards::Suit::{Clubs, Diamonds, Hearts, Spades};

    fn hand(cards: [(crate::game::cards::Suit, u8); 3]) -> Hand {
        [
            Card::new(cards[0].0, cards[0].1),
            Card::new(cards[1].0, cards[1].1),
            Card::new(cards[2].0, cards[2].1),
        ]
    }

    #[test]
    fn category_precedence_is_total() {
        assert!(HandCategory::Trio > HandCategory::StraightFlush);
        assert!(HandCategory::StraightFlush > HandCategory::Straight);
        assert!(HandCategory::Straight > HandCategory::Flush);
        assert!(HandCategory::Flush > HandCategory::Pair);
        assert!(HandCategory::Pair > HandCategory::HighCard);
    }

    #[test]
    fn ranks_each_category() {
        let trio = hand([(Hearts, 7), (Clubs, 7), (Spades, 7)]);
        assert_eq!(
            rank(&trio),
            HandRank { category: HandCategory::Trio, value: 7 }
        );

        let straight_flush = hand([(Hearts, 5), (Hearts, 6), (Hearts, 7)]);
        assert_eq!(
            rank(&straight_flush),
            HandRank { category: HandCategory::StraightFlush, value: 7 }
        );

        let straight = hand([(Hearts, 9), (Clubs, 10), (Spades, 11)]);
        assert_eq!(
            rank(&straight),
            HandRank { category: HandCategory::Straight, value: 11 }
        );

        let flush = hand([(Diamonds, 2), (Diamonds, 9), (Diamonds, 13)]);
        assert_eq!(
            rank(&flush),
            HandRank { category: HandCategory::Flush, value: 13 }
        );

        let pair = hand([(Hearts, 4), (Clubs, 4), (Spades, 12)]);
        assert_eq!(
            rank(&pair),
            HandRank { category: HandCategory::Pair, value: 4 }
        );

        let high = hand([(Hearts, 2), (Clubs, 8), (Spades, 13)]);
        assert_eq!(
            rank(&high),
            HandRank { category: HandCategory::HighCard, value: 13 }
        );
    }

    #[test]
    fn ace_low_run_is_a_straight_valued_three() {
        let wheel = hand([(Hearts, 14), (Clubs, 2), (Spades, 3)]);
        assert_eq!(
            rank(&wheel),
            HandRank { category: HandCategory::Straight, value: 3 }
        );

        // 2-3-4 outranks the ace-low run; a non-straight never beats it.
        let low_run = hand([(Hearts, 2), (Clubs, 3), (Spades, 4)]);
        assert_eq!(determine_winner(&low_run, &wheel), Winner::PlayerA);

        let ace_high = hand([(Hearts, 14), (Clubs, 9), (Spades, 5)]);
        assert_eq!(determine_winner(&wheel, &ace_high), Winner::PlayerA);
    }

    #[test]
    fn ace_low_straight_flush_recognized() {
        let wheel_flush = hand([(Spades, 14), (Spades, 2), (Spades, 3)]);
        assert_eq!(
            rank(&wheel_flush),
            HandRank { category: HandCategory::StraightFlush, value: 3 }
        );
    }

    #[test]
    fn pair_of_elevens_beats_pair_of_fives() {
        let a = hand([(Spades, 11), (Spades, 11), (Clubs, 9)]);
        let b = hand([(Clubs, 5), (Clubs, 5), (Clubs, 4)]);
        assert_eq!(rank(&a).category, HandCategory::Pair);
        assert_eq!(rank(&b).category, HandCategory::Pair);
        assert_eq!(determine_winner(&a, &b), Winner::PlayerA);
    }

    #[test]
    fn equal_pairs_fall_through_to_kicker() {
        let a = hand([(Hearts, 5), (Clubs, 5), (Spades, 13)]);
        let b = hand([(Diamonds, 5), (Spades, 5), (Clubs, 12)]);
        assert_eq!(determine_winner(&a, &b), Winner::PlayerA);
    }

    #[test]
    fn suit_tiebreak_decides_otherwise_identical_hands() {
        // Same values position-by-position; spades outranks hearts.
        let a = hand([(Spades, 13), (Diamonds, 9), (Diamonds, 4)]);
        let b = hand([(Hearts, 13), (Clubs, 9), (Clubs, 4)]);
        assert_eq!(determine_winner(&a, &b), Winner::PlayerA);
        assert_eq!(determine_winner(&b, &a), Winner::PlayerB);
    }

    #[test]
    fn winner_is_antisymmetric() {
        let mut rng = rand::thread_rng();
        for round in 0..200 {
            let outcome = play_round(round, &mut rng);
            let forward = determine_winner(&outcome.hand_a.cards, &outcome.hand_b.cards);
            let backward = determine_winner(&outcome.hand_b.cards, &outcome.hand_a.cards);
            match forward {
                Winner::PlayerA => assert_eq!(backward, Winner::PlayerB),
                Winner::PlayerB => assert_eq!(backward, Winner::PlayerA),
                Winner::Tie => assert_eq!(backward, Winner::Tie),
            }
        }
    }

    #[test]
    fn rank_is_deterministic() {
        let mut rng = rand::thread_rng();
        for round in 0..100 {
            let outcome = play_round(round, &mut rng);
            let first = rank(&outcome.hand_a.cards);
            let second = rank(&outcome.hand_a.cards);
            assert_eq!(first, second);
        }
    }

    #[test]
    fn winner_is_stable_under_re_evaluation() {
        let mut rng = rand::thread_rng();
        for round in 0..100 {
            let outcome = play_round(round, &mut rng);
            let recomputed = determine_winner(&outcome.hand_a.cards, &outcome.hand_b.cards);
            assert_eq!(outcome.winner, recomputed);
        }
    }

    #[test]
    fn outcome_serializes_wire_field_names() {
        let mut rng = rand::thread_rng();
        let outcome = play_round(1_745_227_259_107, &mut rng);
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["roundId"], 1_745_227_259_107u64);
        assert!(json["handA"]["handType"].is_string());
        assert!(json["handB"]["cards"].as_array().unwrap().len() == 3);
        assert!(matches!(
            json["winner"].as_str().unwrap(),
            "PLAYER_A" | "PLAYER_B" | "TIE"
        ));
    }
}
