//! Blackjack game engine: cards, the per-table round state machine and the
//! events and snapshots it produces.
//!
//! This module is synchronous and owns no locks. A [`round::Round`] is only
//! ever mutated by the table layer from inside its single serialization
//! domain.

pub mod cards;
pub mod entities;
pub mod errors;
pub mod events;
pub mod round;
pub mod snapshot;

pub use cards::{Card, Rank, Shoe, Suit, compute_total, is_natural, is_soft};
pub use entities::{Chips, DealerSeat, Hand, HandResult, HandStatus, Seat, UserId};
pub use errors::{RoundError, RoundResult};
pub use events::{EventPayload, ForcedOutcome, GameEvent, Summary};
pub use round::{Round, RoundStatus, TurnToken};
pub use snapshot::{HandSnapshot, RoundSnapshot, SeatSnapshot};
