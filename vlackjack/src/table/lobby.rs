//! The table and session registry.
//!
//! [`Lobby`] is plain synchronous state. It does no locking and no I/O of its
//! own; the [`TableManager`](super::TableManager) wraps it in the single mutex
//! every mutation goes through, which is what makes leave-then-join moves
//! atomic to observers.

use chrono::{DateTime, Utc};
use log::{debug, info};
use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

use super::{
    errors::{TableError, TableResult},
    state::{ChatMessage, ConnectionId, Session, TableId, TableSeat, TableState, TableSummary},
};
use crate::{
    config::{LobbyConfig, MAX_TABLE_PLAYERS, MIN_TABLE_PLAYERS, TableConfig},
    game::{Round, UserId},
};

/// Length of a private table's invite code.
pub const INVITE_CODE_LEN: usize = 6;

/// A participant left a table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Departure {
    pub table_id: TableId,
    /// The table emptied and was deleted together with its invite code.
    pub removed: bool,
}

/// Result of moving a participant onto a table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Arrival {
    pub table_id: TableId,
    /// The table the participant was seated at before, if any.
    pub previous: Option<Departure>,
    /// False when the participant was already seated at the target table.
    pub moved: bool,
}

/// Normalizes a user-typed invite code.
#[must_use]
pub fn normalize_invite_code(code: &str) -> String {
    code.trim().to_uppercase()
}

#[derive(Debug, Default)]
pub struct Lobby {
    config: LobbyConfig,
    tables: HashMap<TableId, TableState>,
    sessions: HashMap<ConnectionId, Session>,
    user_tables: HashMap<UserId, TableId>,
    invite_codes: HashMap<String, TableId>,
    /// System chat lines appended since the last drain.
    announcements: Vec<ChatMessage>,
}

impl Lobby {
    #[must_use]
    pub fn new(config: LobbyConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn config(&self) -> &LobbyConfig {
        &self.config
    }

    #[must_use]
    pub fn table(&self, table_id: &str) -> Option<&TableState> {
        self.tables.get(table_id)
    }

    pub fn table_mut(&mut self, table_id: &str) -> Option<&mut TableState> {
        self.tables.get_mut(table_id)
    }

    #[must_use]
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    #[must_use]
    pub fn session(&self, connection_id: &str) -> Option<&Session> {
        self.sessions.get(connection_id)
    }

    #[must_use]
    pub fn connections(&self) -> Vec<ConnectionId> {
        self.sessions.keys().cloned().collect()
    }

    #[must_use]
    pub fn user_table(&self, user_id: &str) -> Option<&str> {
        self.user_tables.get(user_id).map(String::as_str)
    }

    /// The table the connection's participant is seated at.
    pub fn session_table(&self, connection_id: &str) -> TableResult<&TableId> {
        let session = self.sessions.get(connection_id).ok_or(TableError::NoSession)?;
        self.user_tables
            .get(&session.user_id)
            .ok_or(TableError::NotAtTable)
    }

    pub fn register_session(
        &mut self,
        connection_id: &str,
        user_id: &str,
        display_name: &str,
        muted_until: Option<DateTime<Utc>>,
    ) -> &Session {
        // A reconnecting participant keeps their seat on the new connection.
        if let Some(table) = self
            .user_tables
            .get(user_id)
            .and_then(|table_id| self.tables.get_mut(table_id))
            && let Some(seat) = table.seat_mut(user_id)
        {
            seat.connection_id = connection_id.to_string();
        }

        debug!("Registered connection {} for user {}", connection_id, user_id);
        self.sessions
            .entry(connection_id.to_string())
            .insert_entry(Session {
                connection_id: connection_id.to_string(),
                user_id: user_id.to_string(),
                display_name: display_name.to_string(),
                muted_until,
                last_chat_at: None,
            })
            .into_mut()
    }

    /// Drops the session and unseats its participant, unless the seat has
    /// already moved to a newer connection.
    pub fn unregister_session(&mut self, connection_id: &str) -> Option<Departure> {
        let session = self.sessions.remove(connection_id)?;
        debug!("Unregistered connection {}", connection_id);
        let superseded = self
            .user_tables
            .get(&session.user_id)
            .and_then(|table_id| self.tables.get(table_id))
            .and_then(|table| table.seat(&session.user_id))
            .is_some_and(|seat| seat.connection_id != connection_id);
        if superseded {
            return None;
        }
        self.remove_from_table(&session.user_id)
    }

    /// Public tables, oldest first.
    #[must_use]
    pub fn list_tables(&self) -> Vec<TableSummary> {
        let mut tables: Vec<&TableState> =
            self.tables.values().filter(|table| !table.is_private).collect();
        tables.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        tables.into_iter().map(TableState::summary).collect()
    }

    #[must_use]
    pub fn resolve_invite_code(&self, code: &str) -> Option<&TableId> {
        self.invite_codes.get(&normalize_invite_code(code))
    }

    fn register_invite_code(&mut self, table_id: &str) -> String {
        loop {
            let mut code = Uuid::new_v4().simple().to_string();
            code.truncate(INVITE_CODE_LEN);
            let code = code.to_uppercase();
            if !self.invite_codes.contains_key(&code) {
                self.invite_codes.insert(code.clone(), table_id.to_string());
                return code;
            }
        }
    }

    fn new_table_id(&self) -> TableId {
        loop {
            let mut id = Uuid::new_v4().simple().to_string();
            id.truncate(8);
            if !self.tables.contains_key(&id) {
                return id;
            }
        }
    }

    /// Deletes the table if nobody is seated, otherwise resyncs its round.
    /// Returns whether the table was deleted.
    fn settle_membership(&mut self, table_id: &str) -> bool {
        let Some(table) = self.tables.get_mut(table_id) else {
            return false;
        };
        if table.seats.is_empty() {
            if let Some(code) = table.invite_code.take() {
                self.invite_codes.remove(&code);
            }
            self.tables.remove(table_id);
            info!("Removed empty table {}", table_id);
            true
        } else {
            table.sync_round();
            false
        }
    }

    fn announce(&mut self, table_id: &str, text: String) {
        let limit = self.config.chat_history_limit;
        if let Some(table) = self.tables.get_mut(table_id) {
            let message = ChatMessage::system(table_id, text, Utc::now());
            push_bounded(&mut table.chat, message.clone(), limit);
            self.announcements.push(message);
        }
    }

    /// Drains system chat lines produced by membership changes.
    pub fn take_announcements(&mut self) -> Vec<ChatMessage> {
        std::mem::take(&mut self.announcements)
    }

    /// Unseats a participant from whatever table they sit at.
    pub fn remove_from_table(&mut self, user_id: &str) -> Option<Departure> {
        let table_id = self.user_tables.remove(user_id)?;
        let table = self.tables.get_mut(&table_id)?;
        let position = table.seats.iter().position(|seat| seat.user_id == user_id)?;
        let seat = table.seats.remove(position);

        let removed = self.settle_membership(&table_id);
        if !removed {
            self.announce(&table_id, format!("{} left the table", seat.display_name));
        }
        debug!("User {} left table {}", user_id, table_id);
        Some(Departure { table_id, removed })
    }

    /// Creates a table seated with its creator, who first leaves any table
    /// they were at. Capacity is clamped to the supported range.
    pub fn create_table(
        &mut self,
        connection_id: &str,
        name: &str,
        is_private: bool,
        max_players: usize,
        config: Option<TableConfig>,
    ) -> TableResult<Arrival> {
        let session = self
            .sessions
            .get(connection_id)
            .ok_or(TableError::NoSession)?
            .clone();
        let config = config.unwrap_or_else(|| self.config.table_defaults.clone());
        config
            .validate()
            .map_err(|err| TableError::InvalidRules(err.to_string()))?;

        let previous = self.remove_from_table(&session.user_id);

        let table_id = self.new_table_id();
        let invite_code = is_private.then(|| self.register_invite_code(&table_id));
        let name = name.trim();
        let table = TableState {
            id: table_id.clone(),
            name: if name.is_empty() { "Table".to_string() } else { name.to_string() },
            is_private,
            max_players: max_players.clamp(MIN_TABLE_PLAYERS, MAX_TABLE_PLAYERS),
            invite_code,
            config,
            is_paused: false,
            betting_locked: false,
            seats: vec![TableSeat {
                user_id: session.user_id.clone(),
                display_name: session.display_name.clone(),
                connection_id: session.connection_id.clone(),
                is_ready: false,
            }],
            round: None,
            last_turn_token: 0,
            chat: VecDeque::new(),
            created_at: Utc::now(),
        };
        self.tables.insert(table_id.clone(), table);
        self.user_tables.insert(session.user_id.clone(), table_id.clone());
        info!("Created table {} for user {}", table_id, session.user_id);

        Ok(Arrival {
            table_id,
            previous,
            moved: true,
        })
    }

    /// Seats the connection's participant at `table_id`, leaving their
    /// previous table in the same mutation.
    ///
    /// Private tables require their invite code unless the participant is
    /// already seated there.
    pub fn move_to_table(
        &mut self,
        connection_id: &str,
        table_id: &str,
        invite_code: Option<&str>,
    ) -> TableResult<Arrival> {
        let table_id = table_id.trim();
        if table_id.is_empty() {
            return Err(TableError::MissingTableId);
        }
        let session = self
            .sessions
            .get(connection_id)
            .ok_or(TableError::NoSession)?
            .clone();
        let current = self.user_tables.get(&session.user_id).cloned();

        let table = self.tables.get_mut(table_id).ok_or(TableError::NotFound)?;
        if current.as_deref() == Some(table_id) {
            return Ok(Arrival {
                table_id: table_id.to_string(),
                previous: None,
                moved: false,
            });
        }
        if table.is_private {
            match invite_code.map(normalize_invite_code) {
                None => return Err(TableError::Private),
                Some(code) if table.invite_code.as_deref() != Some(code.as_str()) => {
                    return Err(TableError::InvalidInvite);
                }
                Some(_) => {}
            }
        }
        if table.is_round_active() {
            return Err(TableError::InProgress);
        }
        if table.is_full() {
            return Err(TableError::TableFull);
        }

        table.seats.push(TableSeat {
            user_id: session.user_id.clone(),
            display_name: session.display_name.clone(),
            connection_id: session.connection_id.clone(),
            is_ready: false,
        });
        table.sync_round();
        self.user_tables
            .insert(session.user_id.clone(), table_id.to_string());

        let previous = current.map(|prev_id| {
            let mut removed = false;
            if let Some(prev) = self.tables.get_mut(&prev_id)
                && let Some(position) =
                    prev.seats.iter().position(|seat| seat.user_id == session.user_id)
            {
                prev.seats.remove(position);
                removed = self.settle_membership(&prev_id);
                if !removed {
                    self.announce(&prev_id, format!("{} left the table", session.display_name));
                }
            }
            Departure {
                table_id: prev_id,
                removed,
            }
        });

        self.announce(table_id, format!("{} joined the table", session.display_name));
        debug!("User {} joined table {}", session.user_id, table_id);

        Ok(Arrival {
            table_id: table_id.to_string(),
            previous,
            moved: true,
        })
    }

    /// Returns the id of the table whose seat changed.
    pub fn set_ready(&mut self, connection_id: &str, is_ready: bool) -> TableResult<TableId> {
        let session = self.sessions.get(connection_id).ok_or(TableError::NoSession)?;
        let table_id = self
            .user_tables
            .get(&session.user_id)
            .ok_or(TableError::NotAtTable)?;
        let table = self.tables.get_mut(table_id).ok_or(TableError::NotFound)?;
        let seat = table
            .seat_mut(&session.user_id)
            .ok_or(TableError::NotAtTable)?;
        seat.is_ready = is_ready;
        Ok(table_id.clone())
    }

    /// Validates and appends a participant's chat line.
    pub fn add_chat_message(
        &mut self,
        connection_id: &str,
        text: &str,
        now: DateTime<Utc>,
    ) -> TableResult<ChatMessage> {
        let cooldown = self.config.chat_cooldown();
        let max_length = self.config.chat_max_length;
        let limit = self.config.chat_history_limit;

        let session = self
            .sessions
            .get_mut(connection_id)
            .ok_or(TableError::NoSession)?;
        let table_id = self
            .user_tables
            .get(&session.user_id)
            .ok_or(TableError::NotAtTable)?;
        let table = self.tables.get_mut(table_id).ok_or(TableError::NotFound)?;

        let text = text.trim();
        if text.is_empty() {
            return Err(TableError::EmptyMessage);
        }
        if text.chars().count() > max_length {
            return Err(TableError::MessageTooLong(max_length));
        }
        if session.is_muted(now) {
            return Err(TableError::Muted);
        }
        if let Some(last) = session.last_chat_at
            && (now - last).to_std().is_ok_and(|elapsed| elapsed < cooldown)
        {
            return Err(TableError::ChatCooldown);
        }

        session.last_chat_at = Some(now);
        let message = ChatMessage::from_user(
            table_id,
            &session.user_id,
            &session.display_name,
            text.to_string(),
            now,
        );
        push_bounded(&mut table.chat, message.clone(), limit);
        Ok(message)
    }

    #[must_use]
    pub fn chat_history(&self, table_id: &str) -> Vec<ChatMessage> {
        self.tables
            .get(table_id)
            .map(|table| table.chat.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// The table's round, created on first use and synced with its seats.
    pub fn ensure_round(&mut self, table_id: &str) -> TableResult<&mut Round> {
        let table = self.tables.get_mut(table_id).ok_or(TableError::NotFound)?;
        Ok(table.ensure_round())
    }

    /// Replaces a table's rules. The current round is discarded so the next
    /// deal is built with the new rules; refused while a round is active.
    pub fn update_config(&mut self, table_id: &str, config: TableConfig) -> TableResult<()> {
        config
            .validate()
            .map_err(|err| TableError::InvalidRules(err.to_string()))?;
        let table = self.tables.get_mut(table_id).ok_or(TableError::NotFound)?;
        if table.is_round_active() {
            return Err(TableError::RulesLocked);
        }
        table.config = config;
        table.discard_round();
        info!("Updated rules for table {}", table_id);
        Ok(())
    }
}

fn push_bounded(chat: &mut VecDeque<ChatMessage>, message: ChatMessage, limit: usize) {
    chat.push_back(message);
    while chat.len() > limit {
        chat.pop_front();
    }
}
