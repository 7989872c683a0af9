//! Table manager: the service every connection and admin call goes through.
//!
//! All lobby, table and round state lives behind one async mutex. Each
//! operation runs to completion under that lock, collecting what it wants to
//! say into an [`Outbox`]; broadcasting, persistence and timer arming happen
//! only after the lock is released.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{
    errors::{TableError, TableResult},
    lobby::{Arrival, Departure, Lobby},
    messages::{Audience, Broadcaster, Envelope, Outbound},
    recorder::{BankLedger, GameRecorder},
    scheduler::{TurnDeadline, TurnScheduler},
    state::{ChatMessage, TableId, TableSnapshot, TableState, TableSummary},
};
use crate::{
    config::{LobbyConfig, TableConfig},
    game::{
        Chips, EventPayload, ForcedOutcome, GameEvent, Round, RoundError, RoundSnapshot, Shoe,
        TurnToken,
    },
};

/// A participant's move on their active hand.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerAction {
    Hit,
    Stand,
    Double,
    Split,
}

/// Side effects of one operation, applied after the lobby lock is released.
#[derive(Debug, Default)]
struct Outbox {
    envelopes: Vec<Envelope>,
    events: Vec<GameEvent>,
    deadlines: Vec<TurnDeadline>,
}

impl Outbox {
    fn send(&mut self, lobby: &Lobby, audience: Audience, message: Outbound) {
        let recipients = match &audience {
            Audience::Lobby => lobby.connections(),
            Audience::Table(table_id) => lobby
                .table(table_id)
                .map(TableState::connections)
                .unwrap_or_default(),
            Audience::Connection(connection_id) => vec![connection_id.clone()],
        };
        self.envelopes.push(Envelope {
            audience,
            recipients,
            message,
        });
    }

    fn lobby_snapshot(&mut self, lobby: &Lobby) {
        let tables = lobby.list_tables();
        self.send(lobby, Audience::Lobby, Outbound::LobbySnapshot { tables });
    }

    fn table_state(&mut self, lobby: &Lobby, table_id: &str) {
        if let Some(table) = lobby.table(table_id) {
            let snapshot = table.snapshot();
            self.send(
                lobby,
                Audience::Table(table_id.to_string()),
                Outbound::TableState(snapshot),
            );
        }
    }

    fn announcements(&mut self, lobby: &mut Lobby) {
        for message in lobby.take_announcements() {
            let audience = Audience::Table(message.table_id.clone());
            self.send(lobby, audience, Outbound::Chat(message));
        }
    }

    fn error(&mut self, connection_id: &str, err: &TableError) {
        if err.is_structural() {
            debug!("Dropping {} for connection {}", err, connection_id);
            return;
        }
        self.envelopes.push(Envelope {
            audience: Audience::Connection(connection_id.to_string()),
            recipients: vec![connection_id.to_string()],
            message: Outbound::Error(err.into()),
        });
    }
}

/// Shared handle to the lobby. Cloning is cheap; every clone drives the
/// same tables.
#[derive(Clone)]
pub struct TableManager {
    lobby: Arc<Mutex<Lobby>>,
    scheduler: TurnScheduler,
    broadcaster: Arc<dyn Broadcaster>,
    recorder: Arc<dyn GameRecorder>,
}

impl TableManager {
    /// Create a table manager with an empty lobby.
    ///
    /// Spawns the turn-timeout worker, so it must be called from within a
    /// tokio runtime.
    #[must_use]
    pub fn new(
        config: LobbyConfig,
        broadcaster: Arc<dyn Broadcaster>,
        recorder: Arc<dyn GameRecorder>,
    ) -> Self {
        Self::with_lobby(Lobby::new(config), broadcaster, recorder)
    }

    /// Create a table manager around an existing lobby.
    #[must_use]
    pub fn with_lobby(
        lobby: Lobby,
        broadcaster: Arc<dyn Broadcaster>,
        recorder: Arc<dyn GameRecorder>,
    ) -> Self {
        let (scheduler, mut expired) = TurnScheduler::new(lobby.config().turn_timeout());
        let manager = Self {
            lobby: Arc::new(Mutex::new(lobby)),
            scheduler,
            broadcaster,
            recorder,
        };

        let worker = manager.clone();
        tokio::spawn(async move {
            while let Some(deadline) = expired.recv().await {
                worker
                    .fire_turn_timeout(&deadline.table_id, deadline.token)
                    .await;
            }
        });

        manager
    }

    /// Runs `op` under the lobby lock, reports its error to `origin` if it
    /// fails, then flushes the outbox.
    async fn run<T, F>(&self, origin: Option<&str>, op: F) -> TableResult<T>
    where
        F: FnOnce(&Self, &mut Lobby, &mut Outbox) -> TableResult<T> + Send,
        T: Send,
    {
        let mut outbox = Outbox::default();
        let result = {
            let mut lobby = self.lobby.lock().await;
            let result = op(self, &mut *lobby, &mut outbox);
            if let (Err(err), Some(connection_id)) = (&result, origin) {
                outbox.error(connection_id, err);
            }
            result
        };
        self.flush(outbox).await;
        result
    }

    async fn flush(&self, outbox: Outbox) {
        for deadline in outbox.deadlines {
            self.scheduler.arm(deadline.table_id, deadline.token);
        }
        for event in &outbox.events {
            self.record(event).await;
        }
        for envelope in outbox.envelopes {
            let name = envelope.message.name();
            if let Err(e) = self.broadcaster.deliver(envelope).await {
                error!("Failed to deliver {}: {}", name, e);
            }
        }
    }

    async fn record(&self, event: &GameEvent) {
        if let Some(round_id) = event.round_id.as_deref() {
            let result = match &event.payload {
                EventPayload::RoundStart { .. } => {
                    self.recorder
                        .record_round_start(&event.table_id, round_id, event)
                        .await
                }
                payload => match payload.summary() {
                    Some(summary) => {
                        self.recorder
                            .record_round_end(&event.table_id, round_id, summary)
                            .await
                    }
                    None => Ok(()),
                },
            };
            if let Err(e) = result {
                error!("Failed to record round {}: {}", round_id, e);
            }
        }
        if let Err(e) = self.recorder.record_action(event).await {
            error!("Failed to record {}: {}", event, e);
        }
    }

    /// Stamps and arms the current turn, drains round events and queues the
    /// game snapshot for the table. Paused tables are never armed.
    fn collect_round(&self, lobby: &mut Lobby, table_id: &str, outbox: &mut Outbox) {
        let Some(table) = lobby.table_mut(table_id) else {
            return;
        };
        let paused = table.is_paused;
        let Some(round) = table.round.as_mut() else {
            return;
        };
        if !paused && let Some(token) = self.scheduler.refresh(round, Utc::now()) {
            outbox.deadlines.push(TurnDeadline {
                table_id: table_id.to_string(),
                token,
            });
        }
        let events = round.consume_events();
        let snapshot = round.snapshot();

        for event in &events {
            if let (EventPayload::RoundStart { .. }, Some(round_id)) = (&event.payload, &event.round_id) {
                info!("Table {} round {} started", table_id, round_id);
            } else if let (Some(summary), Some(round_id)) = (event.payload.summary(), &event.round_id) {
                info!("Table {} round {} settled: {:?}", table_id, round_id, summary);
            }
        }

        let audience = Audience::Table(table_id.to_string());
        if !events.is_empty() {
            outbox.events.extend(events.iter().cloned());
            outbox.send(lobby, audience.clone(), Outbound::GameEvents { events });
        }
        outbox.send(lobby, audience, Outbound::GameState(snapshot));
    }

    fn after_departure(&self, lobby: &mut Lobby, departure: &Departure, outbox: &mut Outbox) {
        if departure.removed {
            return;
        }
        outbox.table_state(lobby, &departure.table_id);
        self.collect_round(lobby, &departure.table_id, outbox);
    }

    fn after_arrival(
        &self,
        lobby: &mut Lobby,
        arrival: &Arrival,
        connection_id: &str,
        outbox: &mut Outbox,
    ) {
        if let Some(previous) = &arrival.previous {
            self.after_departure(lobby, previous, outbox);
        }
        outbox.send(
            lobby,
            Audience::Connection(connection_id.to_string()),
            Outbound::TableJoined {
                table_id: arrival.table_id.clone(),
            },
        );
        outbox.table_state(lobby, &arrival.table_id);
        self.collect_round(lobby, &arrival.table_id, outbox);
        outbox.announcements(lobby);
        outbox.lobby_snapshot(lobby);
    }

    /// Registers a connection and sends it the lobby. A participant who is
    /// still seated somewhere is reattached to that table.
    pub async fn connect(
        &self,
        connection_id: &str,
        user_id: &str,
        display_name: &str,
        muted_until: Option<DateTime<Utc>>,
    ) {
        let _ = self
            .run(None, |_, lobby, outbox| {
                lobby.register_session(connection_id, user_id, display_name, muted_until);
                let to = Audience::Connection(connection_id.to_string());
                let tables = lobby.list_tables();
                outbox.send(lobby, to.clone(), Outbound::LobbySnapshot { tables });

                if let Some(table) = lobby.user_table(user_id).and_then(|id| lobby.table(id)) {
                    let table_id = table.id.clone();
                    let snapshot = table.snapshot();
                    let round = table.round.as_ref().map(Round::snapshot);
                    outbox.send(lobby, to.clone(), Outbound::TableJoined { table_id });
                    outbox.send(lobby, to.clone(), Outbound::TableState(snapshot));
                    if let Some(round) = round {
                        outbox.send(lobby, to, Outbound::GameState(round));
                    }
                }
                Ok(())
            })
            .await;
        info!("Connection {} opened for user {}", connection_id, user_id);
    }

    /// Drops a connection. Its participant leaves their table exactly as if
    /// they had asked to.
    pub async fn disconnect(&self, connection_id: &str) {
        let _ = self
            .run(None, |manager, lobby, outbox| {
                if let Some(departure) = lobby.unregister_session(connection_id) {
                    manager.after_departure(lobby, &departure, outbox);
                }
                outbox.announcements(lobby);
                outbox.lobby_snapshot(lobby);
                Ok(())
            })
            .await;
        info!("Connection {} closed", connection_id);
    }

    /// Public tables. Also sent to the requesting connection.
    pub async fn list_tables(&self, connection_id: &str) -> Vec<TableSummary> {
        self.run(None, |_, lobby, outbox| {
            let tables = lobby.list_tables();
            outbox.send(
                lobby,
                Audience::Connection(connection_id.to_string()),
                Outbound::LobbySnapshot {
                    tables: tables.clone(),
                },
            );
            Ok(tables)
        })
        .await
        .unwrap_or_default()
    }

    /// Creates a table with the lobby's default rules and seats the creator.
    pub async fn create_table(
        &self,
        connection_id: &str,
        name: &str,
        is_private: bool,
        max_players: usize,
    ) -> TableResult<TableId> {
        self.run(Some(connection_id), |manager, lobby, outbox| {
            let arrival = lobby.create_table(connection_id, name, is_private, max_players, None)?;
            manager.after_arrival(lobby, &arrival, connection_id, outbox);
            Ok(arrival.table_id)
        })
        .await
    }

    /// Moves the connection's participant to `table_id`.
    pub async fn join_table(
        &self,
        connection_id: &str,
        table_id: &str,
        invite_code: Option<&str>,
    ) -> TableResult<TableId> {
        self.run(Some(connection_id), |manager, lobby, outbox| {
            manager.join_locked(lobby, connection_id, table_id, invite_code, outbox)
        })
        .await
    }

    /// Joins the private table an invite code points to.
    pub async fn join_by_invite(&self, connection_id: &str, code: &str) -> TableResult<TableId> {
        self.run(Some(connection_id), |manager, lobby, outbox| {
            let table_id = lobby
                .resolve_invite_code(code)
                .cloned()
                .ok_or(TableError::InvalidInvite)?;
            manager.join_locked(lobby, connection_id, &table_id, Some(code), outbox)
        })
        .await
    }

    fn join_locked(
        &self,
        lobby: &mut Lobby,
        connection_id: &str,
        table_id: &str,
        invite_code: Option<&str>,
        outbox: &mut Outbox,
    ) -> TableResult<TableId> {
        match lobby.move_to_table(connection_id, table_id, invite_code) {
            Ok(arrival) => {
                self.after_arrival(lobby, &arrival, connection_id, outbox);
                Ok(arrival.table_id)
            }
            Err(err) => {
                if !err.is_structural() {
                    let tables = lobby.list_tables();
                    outbox.send(
                        lobby,
                        Audience::Connection(connection_id.to_string()),
                        Outbound::LobbySnapshot { tables },
                    );
                }
                Err(err)
            }
        }
    }

    pub async fn leave_table(&self, connection_id: &str) -> TableResult<()> {
        self.run(Some(connection_id), |manager, lobby, outbox| {
            let user_id = lobby
                .session(connection_id)
                .ok_or(TableError::NoSession)?
                .user_id
                .clone();
            let departure = lobby
                .remove_from_table(&user_id)
                .ok_or(TableError::NotAtTable)?;
            manager.after_departure(lobby, &departure, outbox);
            outbox.announcements(lobby);
            outbox.lobby_snapshot(lobby);
            Ok(())
        })
        .await
    }

    pub async fn set_ready(&self, connection_id: &str, is_ready: bool) -> TableResult<()> {
        self.run(Some(connection_id), |_, lobby, outbox| {
            let table_id = lobby.set_ready(connection_id, is_ready)?;
            outbox.table_state(lobby, &table_id);
            Ok(())
        })
        .await
    }

    pub async fn send_chat(&self, connection_id: &str, text: &str) -> TableResult<ChatMessage> {
        self.run(Some(connection_id), |_, lobby, outbox| {
            let message = lobby.add_chat_message(connection_id, text, Utc::now())?;
            outbox.send(
                lobby,
                Audience::Table(message.table_id.clone()),
                Outbound::Chat(message.clone()),
            );
            Ok(message)
        })
        .await
    }

    /// The chat history of the connection's table, also sent to it.
    pub async fn chat_history(&self, connection_id: &str) -> TableResult<Vec<ChatMessage>> {
        self.run(Some(connection_id), |_, lobby, outbox| {
            let table_id = lobby.session_table(connection_id)?.clone();
            let messages = lobby.chat_history(&table_id);
            outbox.send(
                lobby,
                Audience::Connection(connection_id.to_string()),
                Outbound::ChatHistory {
                    table_id,
                    messages: messages.clone(),
                },
            );
            Ok(messages)
        })
        .await
    }

    /// Deals a new round at the connection's table.
    pub async fn start_round(&self, connection_id: &str) -> TableResult<()> {
        self.run(Some(connection_id), |manager, lobby, outbox| {
            let table_id = lobby.session_table(connection_id)?.clone();
            let table = lobby.table_mut(&table_id).ok_or(TableError::NotFound)?;
            if table.is_paused {
                return Err(TableError::Paused);
            }
            if table.betting_locked {
                return Err(TableError::BettingLocked);
            }
            table.ensure_round().start_round()?;
            manager.collect_round(lobby, &table_id, outbox);
            Ok(())
        })
        .await
    }

    pub async fn player_action(&self, connection_id: &str, action: PlayerAction) -> TableResult<()> {
        self.run(Some(connection_id), |manager, lobby, outbox| {
            let user_id = lobby
                .session(connection_id)
                .ok_or(TableError::NoSession)?
                .user_id
                .clone();
            let table_id = lobby
                .user_table(&user_id)
                .ok_or(TableError::NotAtTable)?
                .to_string();
            let table = lobby.table_mut(&table_id).ok_or(TableError::NotFound)?;
            if table.is_paused {
                return Err(TableError::Paused);
            }
            let round = table
                .round
                .as_mut()
                .ok_or(RoundError::NoRoundInProgress)?;
            match action {
                PlayerAction::Hit => round.hit(&user_id),
                PlayerAction::Stand => round.stand(&user_id, false),
                PlayerAction::Double => round.double_down(&user_id),
                PlayerAction::Split => round.split(&user_id),
            }?;
            manager.collect_round(lobby, &table_id, outbox);
            Ok(())
        })
        .await
    }

    /// Freezes a table. The turn clock is disarmed until [`Self::resume_table`].
    pub async fn pause_table(&self, table_id: &str) -> TableResult<()> {
        self.run(None, |manager, lobby, outbox| {
            let table = lobby.table_mut(table_id).ok_or(TableError::NotFound)?;
            table.is_paused = true;
            if let Some(round) = table.round.as_mut() {
                round.disarm_turn();
            }
            info!("Paused table {}", table_id);
            outbox.table_state(lobby, table_id);
            manager.collect_round(lobby, table_id, outbox);
            Ok(())
        })
        .await
    }

    /// Unfreezes a table and gives the active participant a fresh deadline.
    pub async fn resume_table(&self, table_id: &str) -> TableResult<()> {
        self.run(None, |manager, lobby, outbox| {
            let table = lobby.table_mut(table_id).ok_or(TableError::NotFound)?;
            table.is_paused = false;
            info!("Resumed table {}", table_id);
            outbox.table_state(lobby, table_id);
            manager.collect_round(lobby, table_id, outbox);
            Ok(())
        })
        .await
    }

    /// While locked, no new round can be dealt at the table.
    pub async fn set_betting_locked(&self, table_id: &str, locked: bool) -> TableResult<()> {
        self.run(None, |_, lobby, outbox| {
            let table = lobby.table_mut(table_id).ok_or(TableError::NotFound)?;
            table.betting_locked = locked;
            info!("Table {} betting locked: {}", table_id, locked);
            outbox.table_state(lobby, table_id);
            Ok(())
        })
        .await
    }

    pub async fn force_end_round(&self, table_id: &str) -> TableResult<()> {
        self.run(None, |manager, lobby, outbox| {
            let table = lobby.table_mut(table_id).ok_or(TableError::NotFound)?;
            table
                .round
                .as_mut()
                .ok_or(RoundError::NoRoundInProgress)?
                .force_end_round()?;
            info!("Forced end of round at table {}", table_id);
            manager.collect_round(lobby, table_id, outbox);
            Ok(())
        })
        .await
    }

    pub async fn force_result(&self, table_id: &str, outcome: ForcedOutcome) -> TableResult<()> {
        self.run(None, |manager, lobby, outbox| {
            let table = lobby.table_mut(table_id).ok_or(TableError::NotFound)?;
            table
                .round
                .as_mut()
                .ok_or(RoundError::NoRoundInProgress)?
                .force_result(outcome)?;
            info!("Forced {} at table {}", outcome, table_id);
            manager.collect_round(lobby, table_id, outbox);
            Ok(())
        })
        .await
    }

    /// Replaces a table's rules between rounds.
    pub async fn update_table_config(&self, table_id: &str, config: TableConfig) -> TableResult<()> {
        self.run(None, |_, lobby, outbox| {
            lobby.update_config(table_id, config)?;
            outbox.table_state(lobby, table_id);
            Ok(())
        })
        .await
    }

    /// Installs a prepared shoe for the table's next deals.
    pub async fn replace_shoe(&self, table_id: &str, shoe: Shoe) -> TableResult<()> {
        self.run(None, |_, lobby, _| {
            let table = lobby.table_mut(table_id).ok_or(TableError::NotFound)?;
            if table.ensure_round().replace_shoe(shoe) {
                Ok(())
            } else {
                Err(TableError::InProgress)
            }
        })
        .await
    }

    pub async fn game_snapshot(&self, table_id: &str) -> Option<RoundSnapshot> {
        let lobby = self.lobby.lock().await;
        lobby
            .table(table_id)
            .and_then(|table| table.round.as_ref())
            .map(Round::snapshot)
    }

    pub async fn table_snapshot(&self, table_id: &str) -> Option<TableSnapshot> {
        let lobby = self.lobby.lock().await;
        lobby.table(table_id).map(TableState::snapshot)
    }

    /// Id of the table a participant is seated at.
    pub async fn user_table(&self, user_id: &str) -> Option<TableId> {
        let lobby = self.lobby.lock().await;
        lobby.user_table(user_id).map(str::to_string)
    }

    pub async fn table_count(&self) -> usize {
        self.lobby.lock().await.table_count()
    }

    /// Handles an expired turn deadline. Stands the active hand only if the
    /// table still exists, is not paused and `token` is still the round's
    /// current token; anything else is a stale timer and does nothing.
    ///
    /// Returns whether a hand was stood.
    pub async fn fire_turn_timeout(&self, table_id: &str, token: TurnToken) -> bool {
        self.run(None, |manager, lobby, outbox| {
            let Some(table) = lobby.table_mut(table_id) else {
                debug!("Turn timeout for missing table {}", table_id);
                return Ok(false);
            };
            if table.is_paused {
                return Ok(false);
            }
            let Some(round) = table.round.as_mut() else {
                return Ok(false);
            };
            if round.turn_token() != token {
                debug!(
                    "Stale turn timeout at table {} ({} != {})",
                    table_id,
                    token,
                    round.turn_token()
                );
                return Ok(false);
            }
            let Some(user_id) = round.active_seat().map(str::to_string) else {
                return Ok(false);
            };
            if let Err(e) = round.stand(&user_id, true) {
                debug!("Auto-stand for {} at table {} failed: {}", user_id, table_id, e);
                return Ok(false);
            }
            debug!("Auto-stood {} at table {}", user_id, table_id);
            manager.collect_round(lobby, table_id, outbox);
            Ok(true)
        })
        .await
        .unwrap_or(false)
    }
}

#[async_trait]
impl BankLedger for TableManager {
    async fn credit_bank(&self, table_id: &str, user_id: &str, amount: Chips) -> TableResult<()> {
        self.run(None, |manager, lobby, outbox| {
            let table = lobby.table_mut(table_id).ok_or(TableError::NotFound)?;
            if !table.is_seated(user_id) {
                return Err(TableError::NotAtTable);
            }
            table.ensure_round().credit_bank(user_id, amount)?;
            manager.collect_round(lobby, table_id, outbox);
            Ok(())
        })
        .await
    }
}
