//! Multi-table registry and the service that serializes access to it.
//!
//! ## Architecture
//!
//! A single [`Lobby`] holds every table, its round, the connected sessions and
//! the invite-code index. [`TableManager`] owns the lobby behind one
//! `tokio::sync::Mutex`, so every mutation, cross-table moves included, is
//! applied atomically. Broadcasts, game-log writes and turn timers are
//! collected while the lock is held and performed after it is released.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vlackjack::{
//!     LobbyConfig,
//!     table::{LogBroadcaster, LogRecorder, PlayerAction, TableManager},
//! };
//!
//! # async fn demo() -> Result<(), vlackjack::table::TableError> {
//! let manager = TableManager::new(
//!     LobbyConfig::default(),
//!     Arc::new(LogBroadcaster),
//!     Arc::new(LogRecorder),
//! );
//! manager.connect("conn-1", "user-1", "Alice", None).await;
//! manager.create_table("conn-1", "Main", false, 6).await?;
//! manager.start_round("conn-1").await?;
//! manager.player_action("conn-1", PlayerAction::Stand).await?;
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub mod lobby;
pub mod manager;
pub mod messages;
pub mod recorder;
pub mod scheduler;
pub mod state;

pub use errors::{ErrorBody, TableError, TableResult};
pub use lobby::{Arrival, Departure, Lobby};
pub use manager::{PlayerAction, TableManager};
pub use messages::{Audience, Broadcaster, ChannelBroadcaster, Envelope, LogBroadcaster, Outbound};
pub use recorder::{BankLedger, GameRecorder, LogRecorder, MemoryRecorder, RecordedEntry, SinkError};
pub use scheduler::{TurnDeadline, TurnScheduler};
pub use state::{
    ChatMessage, ConnectionId, Session, TableId, TableSeat, TableSnapshot, TableState, TableSummary,
};
