//! Serializable views of a round, as broadcast to every table participant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    cards::Card,
    entities::{Chips, Hand, HandResult, HandStatus, UserId},
    round::RoundStatus,
};

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct HandSnapshot {
    pub id: String,
    pub cards: Vec<Card>,
    pub bet: Chips,
    pub result: Option<HandResult>,
    pub status: HandStatus,
}

impl From<&Hand> for HandSnapshot {
    fn from(hand: &Hand) -> Self {
        Self {
            id: hand.id.clone(),
            cards: hand.cards.clone(),
            bet: hand.bet,
            result: hand.result,
            status: hand.status,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SeatSnapshot {
    pub user_id: UserId,
    pub display_name: String,
    pub is_dealer: bool,
    pub bank: Chips,
    pub hands: Vec<HandSnapshot>,
}

/// Full round view. The dealer's hand always carries every card; clients
/// hide the hole card until `show_dealer_hole_card` is set.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct RoundSnapshot {
    pub table_id: String,
    pub status: RoundStatus,
    pub min_bet: Chips,
    pub max_bet: Chips,
    pub cards_played: usize,
    pub shoe_count: usize,
    pub show_dealer_hole_card: bool,
    pub active_player_id: Option<UserId>,
    pub active_hand_id: Option<String>,
    pub turn_ends_at: Option<DateTime<Utc>>,
    /// Seats in join order, dealer last.
    pub players: Vec<SeatSnapshot>,
}

impl RoundSnapshot {
    #[must_use]
    pub fn player(&self, user_id: &str) -> Option<&SeatSnapshot> {
        self.players
            .iter()
            .find(|seat| !seat.is_dealer && seat.user_id == user_id)
    }

    #[must_use]
    pub fn dealer(&self) -> Option<&SeatSnapshot> {
        self.players.iter().find(|seat| seat.is_dealer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::TableConfig, game::round::Round};

    #[test]
    fn test_snapshot_serializes_snake_case() {
        let mut round = Round::new("t1", &TableConfig::default());
        round.sync_players(&[("u1".to_string(), "Alice".to_string())]);
        let value = serde_json::to_value(round.snapshot()).unwrap();

        assert_eq!(value["status"], "waiting");
        assert_eq!(value["min_bet"], 10);
        assert_eq!(value["shoe_count"], 312);
        assert_eq!(value["show_dealer_hole_card"], false);
        assert!(value["active_player_id"].is_null());
        assert_eq!(value["players"][0]["display_name"], "Alice");
        assert_eq!(value["players"][1]["is_dealer"], true);
    }

    #[test]
    fn test_snapshot_lookup_helpers() {
        let mut round = Round::new("t1", &TableConfig::default());
        round.sync_players(&[("u1".to_string(), "Alice".to_string())]);
        let snapshot = round.snapshot();
        assert_eq!(snapshot.player("u1").map(|s| s.bank), Some(2500));
        assert!(snapshot.player("dealer").is_none());
        assert_eq!(snapshot.dealer().map(|s| s.display_name.as_str()), Some("Dealer"));
    }
}
