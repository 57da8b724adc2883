//! Cards and decks.
//!
//! A deck is built fresh for every round, shuffled uniformly and consumed
//! by dealing; it is never reused. Cards serialize in the wire shape
//! `{"card": "H14", "suit": "H", "val": 14}`.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Card suits. Wire letters: H, C, D, S.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Suit {
    #[serde(rename = "H")]
    Hearts,
    #[serde(rename = "C")]
    Clubs,
    #[serde(rename = "D")]
    Diamonds,
    #[serde(rename = "S")]
    Spades,
}

impl Suit {
    pub const ALL: [Suit; 4] = [Suit::Hearts, Suit::Clubs, Suit::Diamonds, Suit::Spades];

    pub fn letter(&self) -> char {
        match self {
            Suit::Hearts => 'H',
            Suit::Clubs => 'C',
            Suit::Diamonds => 'D',
            Suit::Spades => 'S',
        }
    }

    /// Weight used for the final positional tie-break: D < C < H < S.
    pub fn tiebreak_weight(&self) -> u8 {
        match self {
            Suit::Diamonds => 1,
            Suit::Clubs => 2,
            Suit::Hearts => 3,
            Suit::Spades => 4,
        }
    }
}

impl fmt::Display for Suit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// Lowest card value in the deck (2).
pub const MIN_VAL: u8 = 2;
/// Highest card value in the deck (Ace = 14; J=11, Q=12, K=13).
pub const MAX_VAL: u8 = 14;

/// One playing card. Immutable value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "CardRepr", into = "CardRepr")]
pub struct Card {
    pub suit: Suit,
    pub val: u8,
}

impl Card {
    pub fn new(suit: Suit, val: u8) -> Self {
        debug_assert!((MIN_VAL..=MAX_VAL).contains(&val));
        Self { suit, val }
    }

    /// Compact label, e.g. "S11".
    pub fn label(&self) -> String {
        format!("{}{}", self.suit.letter(), self.val)
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.suit.letter(), self.val)
    }
}

/// Wire representation carrying the redundant `card` label.
#[derive(Serialize, Deserialize)]
struct CardRepr {
    #[serde(default)]
    card: String,
    suit: Suit,
    val: u8,
}

impl From<CardRepr> for Card {
    fn from(repr: CardRepr) -> Self {
        Card {
            suit: repr.suit,
            val: repr.val,
        }
    }
}

impl From<Card> for CardRepr {
    fn from(card: Card) -> Self {
        CardRepr {
            card: card.label(),
            suit: card.suit,
            val: card.val,
        }
    }
}

/// Three cards dealt to one side.
pub type Hand = [Card; 3];

/// An ordered 52-card deck.
pub struct Deck {
    cards: Vec<Card>,
}

impl Deck {
    pub const SIZE: usize = 52;

    /// Build the full 52-card deck in canonical order.
    pub fn standard() -> Self {
        let mut cards = Vec::with_capacity(Self::SIZE);
        for suit in Suit::ALL {
            for val in MIN_VAL..=MAX_VAL {
                cards.push(Card::new(suit, val));
            }
        }
        Self { cards }
    }

    /// Uniform Fisher-Yates shuffle.
    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.cards.shuffle(rng);
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Deal the round's two hands: the first three cards to side A, the
    /// next three to side B. Consumes the deck; the remainder is discarded.
    pub fn deal_two_hands(self) -> (Hand, Hand) {
        let c = &self.cards;
        let hand_a = [c[0], c[1], c[2]];
        let hand_b = [c[3], c[4], c[5]];
        (hand_a, hand_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn standard_deck_has_52_distinct_cards() {
        let deck = Deck::standard();
        assert_eq!(deck.len(), Deck::SIZE);
        let distinct: HashSet<(char, u8)> =
            deck.cards.iter().map(|c| (c.suit.letter(), c.val)).collect();
        assert_eq!(distinct.len(), Deck::SIZE);
    }

    #[test]
    fn dealt_hands_are_disjoint() {
        for _ in 0..50 {
            let mut deck = Deck::standard();
            deck.shuffle(&mut rand::thread_rng());
            let (a, b) = deck.deal_two_hands();
            let mut seen = HashSet::new();
            for card in a.iter().chain(b.iter()) {
                assert!(seen.insert((card.suit.letter(), card.val)));
            }
            assert_eq!(seen.len(), 6);
        }
    }

    #[test]
    fn card_serializes_with_label() {
        let card = Card::new(Suit::Spades, 11);
        let json = serde_json::to_value(card).unwrap();
        assert_eq!(json["card"], "S11");
        assert_eq!(json["suit"], "S");
        assert_eq!(json["val"], 11);
    }

    #[test]
    fn card_deserializes_from_wire_shape() {
        let card: Card =
            serde_json::from_str(r#"{"card":"H14","suit":"H","val":14}"#).unwrap();
        assert_eq!(card, Card::new(Suit::Hearts, 14));
    }

    #[test]
    fn suit_tiebreak_order_is_d_c_h_s() {
        assert!(Suit::Diamonds.tiebreak_weight() < Suit::Clubs.tiebreak_weight());
        assert!(Suit::Clubs.tiebreak_weight() < Suit::Hearts.tiebreak_weight());
        assert!(Suit::Hearts.tiebreak_weight() < Suit::Spades.tiebreak_weight());
    }
}
