//! Cards, the multi-deck shoe, and hand-total arithmetic.

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Shoe is rebuilt once the remaining fraction drops to this level.
pub const RESHUFFLE_THRESHOLD: f64 = 0.25;

/// Cards in a single standard deck.
pub const DECK_SIZE: usize = 52;

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Suit {
    Spades,
    Hearts,
    Diamonds,
    Clubs,
}

impl Suit {
    pub const ALL: [Suit; 4] = [Suit::Spades, Suit::Hearts, Suit::Diamonds, Suit::Clubs];
}

impl fmt::Display for Suit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::Spades => "♠",
            Self::Hearts => "♥",
            Self::Diamonds => "♦",
            Self::Clubs => "♣",
        };
        write!(f, "{repr}")
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Rank {
    #[serde(rename = "A")]
    Ace,
    #[serde(rename = "2")]
    Two,
    #[serde(rename = "3")]
    Three,
    #[serde(rename = "4")]
    Four,
    #[serde(rename = "5")]
    Five,
    #[serde(rename = "6")]
    Six,
    #[serde(rename = "7")]
    Seven,
    #[serde(rename = "8")]
    Eight,
    #[serde(rename = "9")]
    Nine,
    #[serde(rename = "10")]
    Ten,
    #[serde(rename = "J")]
    Jack,
    #[serde(rename = "Q")]
    Queen,
    #[serde(rename = "K")]
    King,
}

impl Rank {
    pub const ALL: [Rank; 13] = [
        Rank::Ace,
        Rank::Two,
        Rank::Three,
        Rank::Four,
        Rank::Five,
        Rank::Six,
        Rank::Seven,
        Rank::Eight,
        Rank::Nine,
        Rank::Ten,
        Rank::Jack,
        Rank::Queen,
        Rank::King,
    ];

    /// Blackjack value with the ace counted high.
    #[must_use]
    pub const fn value(self) -> u32 {
        match self {
            Self::Ace => 11,
            Self::Two => 2,
            Self::Three => 3,
            Self::Four => 4,
            Self::Five => 5,
            Self::Six => 6,
            Self::Seven => 7,
            Self::Eight => 8,
            Self::Nine => 9,
            Self::Ten | Self::Jack | Self::Queen | Self::King => 10,
        }
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::Ace => "A",
            Self::Two => "2",
            Self::Three => "3",
            Self::Four => "4",
            Self::Five => "5",
            Self::Six => "6",
            Self::Seven => "7",
            Self::Eight => "8",
            Self::Nine => "9",
            Self::Ten => "10",
            Self::Jack => "J",
            Self::Queen => "Q",
            Self::King => "K",
        };
        write!(f, "{repr}")
    }
}

/// A playing card. `index` is the card's position in the unshuffled shoe and
/// only exists so clients can keep a stable identity for animations.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Card {
    pub rank: Rank,
    pub suit: Suit,
    pub index: usize,
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = format!("{}{}", self.rank, self.suit);
        write!(f, "{repr:>3}")
    }
}

/// Builds `decks` standard decks in a fixed, unshuffled order.
#[must_use]
pub fn build_shoe(decks: usize) -> Vec<Card> {
    let mut cards = Vec::with_capacity(decks * DECK_SIZE);
    for _ in 0..decks {
        for suit in Suit::ALL {
            for rank in Rank::ALL {
                let index = cards.len();
                cards.push(Card { rank, suit, index });
            }
        }
    }
    cards
}

/// Hard sum of the cards, then one ace at a time drops from 11 to 1 while the
/// total is over 21. Returns the total and how many aces still count as 11.
fn resolve_total(cards: &[Card]) -> (u32, usize) {
    let mut total: u32 = cards.iter().map(|card| card.rank.value()).sum();
    let mut high_aces = cards.iter().filter(|card| card.rank == Rank::Ace).count();
    while total > 21 && high_aces > 0 {
        total -= 10;
        high_aces -= 1;
    }
    (total, high_aces)
}

#[must_use]
pub fn compute_total(cards: &[Card]) -> u32 {
    resolve_total(cards).0
}

/// True iff an ace is still counted as 11 and the hand hasn't busted.
#[must_use]
pub fn is_soft(cards: &[Card]) -> bool {
    let (total, high_aces) = resolve_total(cards);
    high_aces > 0 && total <= 21
}

/// Two-card 21.
#[must_use]
pub fn is_natural(cards: &[Card]) -> bool {
    cards.len() == 2 && compute_total(cards) == 21
}

/// Multi-deck shoe drawn from the back.
#[derive(Debug, Clone)]
pub struct Shoe {
    cards: Vec<Card>,
    decks: usize,
    cards_played: usize,
}

impl Shoe {
    /// Creates a freshly shuffled shoe. A deck count of zero is treated as one.
    #[must_use]
    pub fn new(decks: usize) -> Self {
        let mut shoe = Self {
            cards: Vec::new(),
            decks: decks.max(1),
            cards_played: 0,
        };
        shoe.reshuffle();
        shoe
    }

    /// Creates a shuffled shoe whose next draws are the given ranks, in order.
    ///
    /// Each rank is taken from the shoe's own cards, so the shoe still holds
    /// exactly `decks * 52` cards. Ranks that run out are skipped.
    #[must_use]
    pub fn stacked(decks: usize, next: &[Rank]) -> Self {
        let mut shoe = Self::new(decks);
        let mut placed = 0;
        for rank in next.iter().rev() {
            let loose = shoe.cards.len() - placed;
            if let Some(pos) = shoe.cards[..loose].iter().position(|card| card.rank == *rank) {
                let card = shoe.cards.remove(pos);
                shoe.cards.push(card);
                placed += 1;
            }
        }
        shoe
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.cards.len()
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.decks * DECK_SIZE
    }

    /// Cards drawn since the last reshuffle.
    #[must_use]
    pub fn cards_played(&self) -> usize {
        self.cards_played
    }

    #[must_use]
    pub fn needs_reshuffle(&self) -> bool {
        self.remaining() as f64 / self.total() as f64 <= RESHUFFLE_THRESHOLD
    }

    /// Rebuilds every deck and shuffles.
    pub fn reshuffle(&mut self) {
        self.cards = build_shoe(self.decks);
        self.cards.shuffle(&mut rand::rng());
        self.cards_played = 0;
    }

    /// Draws the next card, reshuffling first if the shoe is depleted.
    ///
    /// When a reshuffle happened, the second value carries how many cards
    /// were left before it.
    pub fn draw(&mut self) -> (Card, Option<usize>) {
        let reshuffled = if self.needs_reshuffle() {
            let remaining = self.remaining();
            self.reshuffle();
            Some(remaining)
        } else {
            None
        };
        let card = self
            .cards
            .pop()
            .expect("Shoe exhausted after reshuffle check - this indicates a critical bug!");
        self.cards_played += 1;
        (card, reshuffled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cards(ranks: &[Rank]) -> Vec<Card> {
        ranks
            .iter()
            .enumerate()
            .map(|(index, &rank)| Card {
                rank,
                suit: Suit::Spades,
                index,
            })
            .collect()
    }

    #[test]
    fn test_build_shoe_counts() {
        let shoe = build_shoe(2);
        assert_eq!(shoe.len(), 104);
        let aces = shoe.iter().filter(|c| c.rank == Rank::Ace).count();
        assert_eq!(aces, 8);
        assert!(shoe.iter().enumerate().all(|(i, c)| c.index == i));
    }

    #[test]
    fn test_totals() {
        assert_eq!(compute_total(&cards(&[Rank::King, Rank::Nine])), 19);
        assert_eq!(compute_total(&cards(&[Rank::Ace, Rank::King])), 21);
        assert_eq!(compute_total(&cards(&[Rank::Ace, Rank::Ace])), 12);
        assert_eq!(
            compute_total(&cards(&[Rank::Ace, Rank::Ace, Rank::Ace, Rank::Ace])),
            14
        );
        assert_eq!(
            compute_total(&cards(&[Rank::King, Rank::Queen, Rank::Five])),
            25
        );
    }

    #[test]
    fn test_soft_totals() {
        assert!(is_soft(&cards(&[Rank::Ace, Rank::Six])));
        assert!(!is_soft(&cards(&[Rank::Ace, Rank::Six, Rank::King])));
        assert!(is_soft(&cards(&[Rank::Ace, Rank::Ace, Rank::Five])));
        assert!(!is_soft(&cards(&[Rank::Ten, Rank::Seven])));
    }

    #[test]
    fn test_natural() {
        assert!(is_natural(&cards(&[Rank::Ace, Rank::Jack])));
        assert!(!is_natural(&cards(&[Rank::Seven, Rank::Seven, Rank::Seven])));
    }

    #[test]
    fn test_shoe_draw_without_reshuffle() {
        let mut shoe = Shoe::new(1);
        let (_, reshuffled) = shoe.draw();
        assert!(reshuffled.is_none());
        assert_eq!(shoe.remaining(), 51);
        assert_eq!(shoe.cards_played(), 1);
    }

    #[test]
    fn test_shoe_reshuffles_at_threshold() {
        let mut shoe = Shoe::new(1);
        // 13 of 52 remaining is exactly 0.25
        for _ in 0..39 {
            let (_, reshuffled) = shoe.draw();
            assert!(reshuffled.is_none());
        }
        assert_eq!(shoe.remaining(), 13);

        let (_, reshuffled) = shoe.draw();
        assert_eq!(reshuffled, Some(13));
        assert_eq!(shoe.remaining(), 51);
        assert_eq!(shoe.cards_played(), 1);
    }

    #[test]
    fn test_zero_decks_treated_as_one() {
        let shoe = Shoe::new(0);
        assert_eq!(shoe.total(), 52);
        assert_eq!(shoe.remaining(), 52);
    }

    #[test]
    fn test_stacked_shoe_draw_order() {
        let mut shoe = Shoe::stacked(1, &[Rank::Ace, Rank::King, Rank::Five]);
        assert_eq!(shoe.remaining(), 52);
        assert_eq!(shoe.draw().0.rank, Rank::Ace);
        assert_eq!(shoe.draw().0.rank, Rank::King);
        assert_eq!(shoe.draw().0.rank, Rank::Five);
    }
}
