//! Persistence and wallet collaborator interfaces.
//!
//! The table manager calls these only after releasing the lobby lock, so a
//! slow or failing collaborator can delay delivery but never game state.

use async_trait::async_trait;
use log::{debug, info};
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::game::{Chips, GameEvent, Summary};

/// Failure reported by a broadcast or persistence collaborator.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Channel full, message dropped")]
    Backpressure,
    #[error("Channel closed")]
    Closed,
    #[error("Sink failure: {0}")]
    Other(String),
}

/// Durable record of rounds and player actions.
#[async_trait]
pub trait GameRecorder: Send + Sync {
    /// A new round was dealt
    async fn record_round_start(
        &self,
        table_id: &str,
        round_id: &str,
        event: &GameEvent,
    ) -> Result<(), SinkError>;

    /// A round settled (normally or by override) with the given net deltas
    async fn record_round_end(
        &self,
        table_id: &str,
        round_id: &str,
        summary: &Summary,
    ) -> Result<(), SinkError>;

    /// Any game event, including the ones above
    async fn record_action(&self, event: &GameEvent) -> Result<(), SinkError>;
}

/// Writes the game log through the `log` facade.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogRecorder;

#[async_trait]
impl GameRecorder for LogRecorder {
    async fn record_round_start(
        &self,
        table_id: &str,
        round_id: &str,
        _event: &GameEvent,
    ) -> Result<(), SinkError> {
        info!("Table {} round {} started", table_id, round_id);
        Ok(())
    }

    async fn record_round_end(
        &self,
        table_id: &str,
        round_id: &str,
        summary: &Summary,
    ) -> Result<(), SinkError> {
        info!("Table {} round {} ended: {:?}", table_id, round_id, summary);
        Ok(())
    }

    async fn record_action(&self, event: &GameEvent) -> Result<(), SinkError> {
        let line = serde_json::to_string(event).map_err(|e| SinkError::Other(e.to_string()))?;
        debug!("{}", line);
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum RecordedEntry {
    RoundStart { table_id: String, round_id: String },
    RoundEnd { table_id: String, round_id: String, summary: Summary },
    Action(GameEvent),
}

/// Keeps every record in memory. Useful for tests and local tooling.
#[derive(Clone, Debug, Default)]
pub struct MemoryRecorder {
    entries: Arc<Mutex<Vec<RecordedEntry>>>,
}

impl MemoryRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn entries(&self) -> Vec<RecordedEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Actions recorded so far, by name.
    #[must_use]
    pub fn actions(&self) -> Vec<&'static str> {
        self.entries()
            .iter()
            .filter_map(|entry| match entry {
                RecordedEntry::Action(event) => Some(event.action()),
                _ => None,
            })
            .collect()
    }

    fn push(&self, entry: RecordedEntry) -> Result<(), SinkError> {
        self.entries
            .lock()
            .map_err(|e| SinkError::Other(e.to_string()))?
            .push(entry);
        Ok(())
    }
}

#[async_trait]
impl GameRecorder for MemoryRecorder {
    async fn record_round_start(
        &self,
        table_id: &str,
        round_id: &str,
        _event: &GameEvent,
    ) -> Result<(), SinkError> {
        self.push(RecordedEntry::RoundStart {
            table_id: table_id.to_string(),
            round_id: round_id.to_string(),
        })
    }

    async fn record_round_end(
        &self,
        table_id: &str,
        round_id: &str,
        summary: &Summary,
    ) -> Result<(), SinkError> {
        self.push(RecordedEntry::RoundEnd {
            table_id: table_id.to_string(),
            round_id: round_id.to_string(),
            summary: summary.clone(),
        })
    }

    async fn record_action(&self, event: &GameEvent) -> Result<(), SinkError> {
        self.push(RecordedEntry::Action(event.clone()))
    }
}

/// Deposits from the wallet collaborator into a participant's in-round bank.
#[async_trait]
pub trait BankLedger: Send + Sync {
    /// Credit `amount` chips to `user_id`'s seat at `table_id`
    async fn credit_bank(
        &self,
        table_id: &str,
        user_id: &str,
        amount: Chips,
    ) -> Result<(), super::TableError>;
}
