//! Domain events produced by a round.
//!
//! Every event carries a typed payload whose variant doubles as the action
//! name. Serialized, an event looks like
//! `{"table_id": .., "round_id": .., "user_id": .., "action": "split",
//! "payload": {"hand_id": .., "split_id": ..}, "created_at": ..}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

use super::entities::{Chips, UserId};

/// Net bank change per participant over one round.
pub type Summary = BTreeMap<UserId, Chips>;

/// Outcome vocabulary accepted by the force-result override.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ForcedOutcome {
    DealerWin,
    DealerBlackjack,
    PlayerWin,
    DealerBust,
    Push,
}

impl fmt::Display for ForcedOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::DealerWin => "dealer_win",
            Self::DealerBlackjack => "dealer_blackjack",
            Self::PlayerWin => "player_win",
            Self::DealerBust => "dealer_bust",
            Self::Push => "push",
        };
        write!(f, "{repr}")
    }
}

impl std::str::FromStr for ForcedOutcome {
    type Err = super::errors::RoundError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "dealer_win" => Ok(Self::DealerWin),
            "dealer_blackjack" => Ok(Self::DealerBlackjack),
            "player_win" => Ok(Self::PlayerWin),
            "dealer_bust" => Ok(Self::DealerBust),
            "push" => Ok(Self::Push),
            other => Err(super::errors::RoundError::UnknownOutcome(other.to_string())),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "action", content = "payload", rename_all = "snake_case")]
pub enum EventPayload {
    RoundStart { min_bet: Chips },
    Deal { hand_id: String },
    Blackjack { hand_id: String },
    Hit { hand_id: String },
    Bust { hand_id: String },
    Stand { hand_id: String },
    AutoStand { hand_id: String },
    Double { hand_id: String },
    Split { hand_id: String, split_id: String },
    DealerHit { hand_id: String },
    Shuffle { remaining: usize },
    BankCredit { amount: Chips },
    RoundEnd { summary: Summary },
    ForceResult { result: ForcedOutcome, summary: Summary },
}

impl EventPayload {
    /// Action name as logged and persisted.
    #[must_use]
    pub fn action(&self) -> &'static str {
        match self {
            Self::RoundStart { .. } => "round_start",
            Self::Deal { .. } => "deal",
            Self::Blackjack { .. } => "blackjack",
            Self::Hit { .. } => "hit",
            Self::Bust { .. } => "bust",
            Self::Stand { .. } => "stand",
            Self::AutoStand { .. } => "auto_stand",
            Self::Double { .. } => "double",
            Self::Split { .. } => "split",
            Self::DealerHit { .. } => "dealer_hit",
            Self::Shuffle { .. } => "shuffle",
            Self::BankCredit { .. } => "bank_credit",
            Self::RoundEnd { .. } => "round_end",
            Self::ForceResult { .. } => "force_result",
        }
    }

    /// Settlement summary for round-closing events.
    #[must_use]
    pub fn summary(&self) -> Option<&Summary> {
        match self {
            Self::RoundEnd { summary } | Self::ForceResult { summary, .. } => Some(summary),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct GameEvent {
    pub table_id: String,
    pub round_id: Option<String>,
    pub user_id: Option<UserId>,
    #[serde(flatten)]
    pub payload: EventPayload,
    pub created_at: DateTime<Utc>,
}

impl GameEvent {
    #[must_use]
    pub fn action(&self) -> &'static str {
        self.payload.action()
    }
}

impl fmt::Display for GameEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.user_id {
            Some(user_id) => write!(f, "{} by {} at table {}", self.action(), user_id, self.table_id),
            None => write!(f, "{} at table {}", self.action(), self.table_id),
        }
    }
}
