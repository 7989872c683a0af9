//! Outbound message types and the broadcast collaborator.

use async_trait::async_trait;
use log::{debug, warn};
use serde::Serialize;
use tokio::sync::mpsc;

use super::{
    errors::ErrorBody,
    recorder::SinkError,
    state::{ChatMessage, ConnectionId, TableId, TableSnapshot, TableSummary},
};
use crate::game::{GameEvent, RoundSnapshot};

/// Who a message is meant for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Audience {
    /// Every connected participant
    Lobby,
    /// Everyone seated at a table
    Table(TableId),
    /// A single connection
    Connection(ConnectionId),
}

/// Messages produced by the table manager
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum Outbound {
    /// Public table listing
    LobbySnapshot { tables: Vec<TableSummary> },

    /// Table membership and rules changed
    TableState(TableSnapshot),

    /// The recipient is now seated at this table
    TableJoined { table_id: TableId },

    /// Round state changed
    GameState(RoundSnapshot),

    /// Events drained from a round, in order
    GameEvents { events: Vec<GameEvent> },

    /// A chat line, user or system
    Chat(ChatMessage),

    /// Full chat history of a table
    ChatHistory {
        table_id: TableId,
        messages: Vec<ChatMessage>,
    },

    /// An operation by the recipient failed
    Error(ErrorBody),
}

impl Outbound {
    /// Name used in logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::LobbySnapshot { .. } => "lobby_snapshot",
            Self::TableState(_) => "table_state",
            Self::TableJoined { .. } => "table_joined",
            Self::GameState(_) => "game_state",
            Self::GameEvents { .. } => "game_events",
            Self::Chat(_) => "chat",
            Self::ChatHistory { .. } => "chat_history",
            Self::Error(_) => "error",
        }
    }
}

/// An outbound message together with the connections it resolved to when it
/// was produced.
#[derive(Clone, Debug, Serialize)]
pub struct Envelope {
    pub audience: Audience,
    #[serde(skip)]
    pub recipients: Vec<ConnectionId>,
    pub message: Outbound,
}

/// Fan-out to connected clients.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Deliver one message to its recipients
    async fn deliver(&self, envelope: Envelope) -> Result<(), SinkError>;
}

/// Forwards envelopes to a transport task over a bounded channel.
#[derive(Clone, Debug)]
pub struct ChannelBroadcaster {
    sender: mpsc::Sender<Envelope>,
}

impl ChannelBroadcaster {
    #[must_use]
    pub fn new(sender: mpsc::Sender<Envelope>) -> Self {
        Self { sender }
    }

    /// Creates a broadcaster together with the receiving end of its channel.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Envelope>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self::new(sender), receiver)
    }
}

#[async_trait]
impl Broadcaster for ChannelBroadcaster {
    async fn deliver(&self, envelope: Envelope) -> Result<(), SinkError> {
        let name = envelope.message.name();
        match self.sender.try_send(envelope) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Broadcast channel full, dropping {}", name);
                Err(SinkError::Backpressure)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Broadcast channel closed, dropping {}", name);
                Err(SinkError::Closed)
            }
        }
    }
}

/// Logs every envelope instead of sending it anywhere.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogBroadcaster;

#[async_trait]
impl Broadcaster for LogBroadcaster {
    async fn deliver(&self, envelope: Envelope) -> Result<(), SinkError> {
        debug!(
            "Broadcast {} to {:?} ({} recipients)",
            envelope.message.name(),
            envelope.audience,
            envelope.recipients.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joined(table_id: &str) -> Envelope {
        Envelope {
            audience: Audience::Connection("c1".to_string()),
            recipients: vec!["c1".to_string()],
            message: Outbound::TableJoined {
                table_id: table_id.to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_channel_broadcaster_forwards() {
        let (broadcaster, mut rx) = ChannelBroadcaster::channel(4);
        broadcaster.deliver(joined("t1")).await.unwrap();
        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.recipients, vec!["c1".to_string()]);
        assert_eq!(envelope.message.name(), "table_joined");
    }

    #[tokio::test]
    async fn test_channel_broadcaster_backpressure_and_close() {
        let (broadcaster, rx) = ChannelBroadcaster::channel(1);
        broadcaster.deliver(joined("t1")).await.unwrap();
        assert!(matches!(
            broadcaster.deliver(joined("t2")).await,
            Err(SinkError::Backpressure)
        ));
        drop(rx);
        assert!(matches!(
            broadcaster.deliver(joined("t3")).await,
            Err(SinkError::Closed)
        ));
    }

    #[test]
    fn test_outbound_wire_shape() {
        let value = serde_json::to_value(joined("t1")).unwrap();
        assert_eq!(value["audience"]["kind"], "connection");
        assert_eq!(value["message"]["event"], "table_joined");
        assert_eq!(value["message"]["data"]["table_id"], "t1");
        assert!(value.get("recipients").is_none());
    }
}
