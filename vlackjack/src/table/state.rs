//! Per-table state owned by the lobby, and its serializable projections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::{
    config::TableConfig,
    game::{Chips, Round, TurnToken, UserId, entities::new_id},
};

/// Opaque id of one live client connection.
pub type ConnectionId = String;

pub type TableId = String;

/// A connected participant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
    pub display_name: String,
    pub muted_until: Option<DateTime<Utc>>,
    pub last_chat_at: Option<DateTime<Utc>>,
}

impl Session {
    #[must_use]
    pub fn is_muted(&self, now: DateTime<Utc>) -> bool {
        self.muted_until.is_some_and(|until| until > now)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSeat {
    pub user_id: UserId,
    pub display_name: String,
    #[serde(skip)]
    pub connection_id: ConnectionId,
    pub is_ready: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub table_id: TableId,
    /// `None` for system announcements.
    pub user_id: Option<UserId>,
    pub display_name: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub system: bool,
}

impl ChatMessage {
    #[must_use]
    pub fn from_user(
        table_id: &str,
        user_id: &str,
        display_name: &str,
        message: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: new_id(),
            table_id: table_id.to_string(),
            user_id: Some(user_id.to_string()),
            display_name: display_name.to_string(),
            message,
            created_at: now,
            system: false,
        }
    }

    #[must_use]
    pub fn system(table_id: &str, message: String, now: DateTime<Utc>) -> Self {
        Self {
            id: new_id(),
            table_id: table_id.to_string(),
            user_id: None,
            display_name: "System".to_string(),
            message,
            created_at: now,
            system: true,
        }
    }
}

#[derive(Debug)]
pub struct TableState {
    pub id: TableId,
    pub name: String,
    pub is_private: bool,
    pub max_players: usize,
    pub invite_code: Option<String>,
    pub config: TableConfig,
    pub is_paused: bool,
    pub betting_locked: bool,
    /// Seats in join order.
    pub seats: Vec<TableSeat>,
    /// Created lazily on the first deal and reused across deals.
    pub round: Option<Round>,
    /// Turn token of the last discarded round. A rebuilt round continues
    /// above it so deadlines armed before the rebuild stay stale.
    pub last_turn_token: TurnToken,
    pub chat: VecDeque<ChatMessage>,
    pub created_at: DateTime<Utc>,
}

impl TableState {
    #[must_use]
    pub fn seat(&self, user_id: &str) -> Option<&TableSeat> {
        self.seats.iter().find(|seat| seat.user_id == user_id)
    }

    pub fn seat_mut(&mut self, user_id: &str) -> Option<&mut TableSeat> {
        self.seats.iter_mut().find(|seat| seat.user_id == user_id)
    }

    #[must_use]
    pub fn is_seated(&self, user_id: &str) -> bool {
        self.seat(user_id).is_some()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.seats.len() >= self.max_players
    }

    #[must_use]
    pub fn is_round_active(&self) -> bool {
        self.round.as_ref().is_some_and(Round::is_round_active)
    }

    /// Participants as the round sees them, in join order.
    #[must_use]
    pub fn roster(&self) -> Vec<(UserId, String)> {
        self.seats
            .iter()
            .map(|seat| (seat.user_id.clone(), seat.display_name.clone()))
            .collect()
    }

    /// Drops the round, remembering its turn token.
    pub fn discard_round(&mut self) {
        if let Some(round) = self.round.take() {
            self.last_turn_token = round.turn_token();
        }
    }

    /// Resynchronizes the round's seats with the table's, if a round exists.
    pub fn sync_round(&mut self) {
        let roster = self.roster();
        if let Some(round) = self.round.as_mut() {
            round.sync_players(&roster);
        }
    }

    /// Returns the round, creating it with the table's rules on first use, and
    /// makes sure its seats match the table's.
    pub fn ensure_round(&mut self) -> &mut Round {
        let roster = self.roster();
        let round = self.round.get_or_insert_with(|| {
            Round::new(self.id.clone(), &self.config).continuing_from(self.last_turn_token)
        });
        round.sync_players(&roster);
        round
    }

    #[must_use]
    pub fn connections(&self) -> Vec<ConnectionId> {
        self.seats
            .iter()
            .map(|seat| seat.connection_id.clone())
            .collect()
    }

    #[must_use]
    pub fn summary(&self) -> TableSummary {
        TableSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            is_private: self.is_private,
            max_players: self.max_players,
            player_count: self.seats.len(),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> TableSnapshot {
        TableSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            is_private: self.is_private,
            max_players: self.max_players,
            invite_code: self.invite_code.clone(),
            is_paused: self.is_paused,
            betting_locked: self.betting_locked,
            min_bet: self.config.min_bet,
            max_bet: self.config.max_bet,
            decks: self.config.decks,
            starting_bank: self.config.starting_bank,
            players: self.seats.clone(),
        }
    }
}

/// Lobby listing entry. Only public tables are listed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSummary {
    pub id: TableId,
    pub name: String,
    pub is_private: bool,
    pub max_players: usize,
    pub player_count: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSnapshot {
    pub id: TableId,
    pub name: String,
    pub is_private: bool,
    pub max_players: usize,
    pub invite_code: Option<String>,
    pub is_paused: bool,
    pub betting_locked: bool,
    pub min_bet: Chips,
    pub max_bet: Chips,
    pub decks: usize,
    pub starting_bank: Chips,
    pub players: Vec<TableSeat>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn table() -> TableState {
        TableState {
            id: "t1".to_string(),
            name: "Main".to_string(),
            is_private: false,
            max_players: 2,
            invite_code: None,
            config: TableConfig::default(),
            is_paused: false,
            betting_locked: false,
            seats: vec![TableSeat {
                user_id: "u1".to_string(),
                display_name: "Alice".to_string(),
                connection_id: "c1".to_string(),
                is_ready: false,
            }],
            round: None,
            last_turn_token: 0,
            chat: VecDeque::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_ensure_round_is_lazy_and_synced() {
        let mut table = table();
        assert!(table.round.is_none());
        assert!(!table.is_round_active());

        let round = table.ensure_round();
        assert_eq!(round.seats().len(), 1);

        table.seats.push(TableSeat {
            user_id: "u2".to_string(),
            display_name: "Bob".to_string(),
            connection_id: "c2".to_string(),
            is_ready: false,
        });
        assert!(table.is_full());
        table.sync_round();
        assert_eq!(table.round.as_ref().map(|r| r.seats().len()), Some(2));
    }

    #[test]
    fn test_rebuilt_round_keeps_turn_tokens_increasing() {
        let mut table = table();
        table.ensure_round().disarm_turn();
        table.ensure_round().disarm_turn();
        table.discard_round();
        assert_eq!(table.last_turn_token, 2);
        assert!(table.round.is_none());

        assert_eq!(table.ensure_round().turn_token(), 2);
    }

    #[test]
    fn test_snapshot_hides_connections() {
        let table = table();
        let value = serde_json::to_value(table.snapshot()).unwrap();
        assert_eq!(value["players"][0]["user_id"], "u1");
        assert!(value["players"][0].get("connection_id").is_none());
        assert_eq!(value["starting_bank"], 2500);
    }

    #[test]
    fn test_session_mute_window() {
        let now = Utc::now();
        let mut session = Session {
            connection_id: "c1".to_string(),
            user_id: "u1".to_string(),
            display_name: "Alice".to_string(),
            muted_until: Some(now + Duration::minutes(5)),
            last_chat_at: None,
        };
        assert!(session.is_muted(now));
        session.muted_until = Some(now - Duration::seconds(1));
        assert!(!session.is_muted(now));
    }
}
