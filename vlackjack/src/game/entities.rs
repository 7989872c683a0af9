//! Hands, player seats and the dealer seat.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::cards::{Card, compute_total, is_natural};

/// Whole chips. Banks and bets are never negative, but settlement deltas are.
pub type Chips = i64;

/// Stable participant identifier supplied by the identity collaborator.
pub type UserId = String;

/// Participant id used for dealer-side events.
pub const DEALER_ID: &str = "dealer";

pub(crate) fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HandStatus {
    Waiting,
    Playing,
    Stand,
    Bust,
    Blackjack,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HandResult {
    Win,
    Lose,
    Push,
    Blackjack,
    Bust,
}

impl HandResult {
    /// Amount returned to the bank for a settled bet.
    #[must_use]
    pub fn payout(self, bet: Chips) -> Chips {
        match self {
            Self::Blackjack => bet * 5 / 2,
            Self::Win => bet * 2,
            Self::Push => bet,
            Self::Lose | Self::Bust => 0,
        }
    }
}

impl fmt::Display for HandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::Win => "win",
            Self::Lose => "lose",
            Self::Push => "push",
            Self::Blackjack => "blackjack",
            Self::Bust => "bust",
        };
        write!(f, "{repr}")
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Hand {
    pub id: String,
    pub cards: Vec<Card>,
    pub bet: Chips,
    pub status: HandStatus,
    pub result: Option<HandResult>,
    pub is_split: bool,
    pub is_doubled: bool,
}

impl Hand {
    #[must_use]
    pub fn new(status: HandStatus, bet: Chips) -> Self {
        Self {
            id: new_id(),
            cards: Vec::with_capacity(4),
            bet,
            status,
            result: None,
            is_split: false,
            is_doubled: false,
        }
    }

    #[must_use]
    pub fn total(&self) -> u32 {
        compute_total(&self.cards)
    }

    #[must_use]
    pub fn is_natural(&self) -> bool {
        is_natural(&self.cards)
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.status == HandStatus::Playing
    }

    /// Whether the first two cards share a rank.
    #[must_use]
    pub fn is_pair(&self) -> bool {
        matches!(self.cards.as_slice(), [a, b] if a.rank == b.rank)
    }
}

/// A participant's seat within a round.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Seat {
    pub user_id: UserId,
    pub display_name: String,
    pub bank: Chips,
    pub hands: Vec<Hand>,
    pub active_hand_index: usize,
}

impl Seat {
    #[must_use]
    pub fn new(user_id: UserId, display_name: String, bank: Chips) -> Self {
        Self {
            user_id,
            display_name,
            bank,
            hands: Vec::with_capacity(2),
            active_hand_index: 0,
        }
    }

    #[must_use]
    pub fn has_playing_hand(&self) -> bool {
        self.hands.iter().any(Hand::is_playing)
    }

    #[must_use]
    pub fn has_split(&self) -> bool {
        self.hands.len() > 1
    }

    #[must_use]
    pub fn first_playing_hand(&self) -> Option<usize> {
        self.hands.iter().position(Hand::is_playing)
    }

    #[must_use]
    pub fn active_hand(&self) -> Option<&Hand> {
        self.hands.get(self.active_hand_index)
    }

    /// Whether this seat placed a bet in the current round.
    #[must_use]
    pub fn is_betting(&self) -> bool {
        self.hands.iter().any(|hand| hand.bet > 0)
    }
}

/// The dealer holds exactly one hand and never bets.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct DealerSeat {
    pub hand: Hand,
}

impl DealerSeat {
    pub const DISPLAY_NAME: &'static str = "Dealer";

    pub fn reset(&mut self) {
        self.hand = Hand::new(HandStatus::Playing, 0);
    }
}

impl Default for DealerSeat {
    fn default() -> Self {
        Self {
            hand: Hand::new(HandStatus::Waiting, 0),
        }
    }
}
