//! # Vlackjack
//!
//! A real-time, multi-table blackjack core.
//!
//! Many connected participants share per-table state (seats, bets, cards and
//! turn order) while a background timer stands hands for participants who
//! run out of time.
//!
//! ## Core Modules
//!
//! - [`game`]: cards and the shoe, the per-table [`Round`] state machine, and
//!   the events and snapshots it produces
//! - [`table`]: the lobby registry, the [`TableManager`] service that
//!   serializes every mutation, turn deadlines and the broadcast/persistence
//!   collaborators
//! - [`config`]: table rules and lobby settings
//!
//! ## Round lifecycle
//!
//! - **waiting**: seated, nothing dealt
//! - **dealing**: minimum bets placed, two cards each
//! - **player**: seats act in join order, one hand at a time
//! - **dealer**: hole card revealed, dealer draws to 17 (hits soft 17)
//! - **settle** / **round_end**: payouts credited, summary emitted
//!
//! ## Example
//!
//! ```
//! use vlackjack::{Round, TableConfig};
//!
//! let mut round = Round::new("table-1", &TableConfig::default());
//! round.sync_players(&[("u1".to_string(), "Alice".to_string())]);
//! round.start_round().unwrap();
//! assert!(round.snapshot().player("u1").is_some());
//! ```

/// Table rules and lobby-wide settings.
pub mod config;
pub use config::{ConfigError, LobbyConfig, TableConfig};

/// Blackjack engine: cards, round state machine, events.
pub mod game;
pub use game::{
    ForcedOutcome, GameEvent, Round, RoundError, RoundSnapshot, RoundStatus, Shoe, TurnToken,
};

/// Lobby registry and table manager.
pub mod table;
pub use table::{TableError, TableManager};
