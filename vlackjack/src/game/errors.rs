//! Round validation errors.
//!
//! These are recoverable, user-facing failures: the display string is what the
//! acting participant sees, and a failed operation never changes round state.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::entities::Chips;

#[derive(Clone, Debug, Deserialize, Eq, Error, PartialEq, Serialize)]
pub enum RoundError {
    #[error("Round already in progress.")]
    RoundInProgress,
    #[error("No players available.")]
    NoPlayers,
    #[error("Players do not have enough balance.")]
    InsufficientBalance,
    #[error("No round in progress.")]
    NoRoundInProgress,
    #[error("Round is not accepting actions.")]
    NotAcceptingActions,
    #[error("Not your turn.")]
    NotYourTurn,
    #[error("Hand is not active.")]
    HandNotActive,
    #[error("Cannot double down.")]
    CannotDoubleDown,
    #[error("Cannot split.")]
    CannotSplit,
    #[error("Not enough balance to split.")]
    InsufficientBankToSplit,
    #[error("Not seated at this table.")]
    SeatNotFound,
    #[error("Amount must be positive, got {0}.")]
    InvalidAmount(Chips),
    #[error("Bank balance would overflow.")]
    BankOverflow,
    #[error("Unknown result '{0}'.")]
    UnknownOutcome(String),
}

pub type RoundResult<T> = Result<T, RoundError>;
