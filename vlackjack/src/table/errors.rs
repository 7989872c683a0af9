//! Registry validation errors.

use serde::Serialize;
use thiserror::Error;

use crate::game::RoundError;

#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum TableError {
    #[error("Table not found")]
    NotFound,
    #[error("Round already started")]
    InProgress,
    #[error("Table is full")]
    TableFull,
    #[error("Invite code required")]
    Private,
    #[error("Invalid invite code")]
    InvalidInvite,
    #[error("Missing table id")]
    MissingTableId,
    #[error("Not seated at a table")]
    NotAtTable,
    #[error("Table is paused")]
    Paused,
    #[error("Betting is locked")]
    BettingLocked,
    #[error("Rules cannot change during a round")]
    RulesLocked,
    #[error("Invalid table rules: {0}")]
    InvalidRules(String),
    #[error("Message cannot be empty")]
    EmptyMessage,
    #[error("Message is longer than {0} characters")]
    MessageTooLong(usize),
    #[error("You are muted")]
    Muted,
    #[error("You are sending messages too quickly")]
    ChatCooldown,
    /// The connection has no registered session. Never shown to anyone.
    #[error("Unknown connection")]
    NoSession,
    #[error(transparent)]
    Round(#[from] RoundError),
}

impl TableError {
    /// Stable machine-readable code sent alongside the message.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::InProgress => "in_progress",
            Self::TableFull => "table_full",
            Self::Private => "private",
            Self::InvalidInvite => "invalid_invite",
            Self::MissingTableId => "invalid",
            Self::NotAtTable => "not_at_table",
            Self::Paused => "paused",
            Self::BettingLocked => "betting_locked",
            Self::RulesLocked => "rules_locked",
            Self::InvalidRules(_) => "invalid_rules",
            Self::EmptyMessage => "chat_empty",
            Self::MessageTooLong(_) => "chat_too_long",
            Self::Muted => "muted",
            Self::ChatCooldown => "chat_cooldown",
            Self::NoSession => "no_session",
            Self::Round(_) => "game",
        }
    }

    /// Structural failures are races with membership churn, not user errors,
    /// and are dropped instead of being reported.
    #[must_use]
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::NoSession)
    }
}

/// Error payload delivered to the originating connection.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

impl From<&TableError> for ErrorBody {
    fn from(err: &TableError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

pub type TableResult<T> = Result<T, TableError>;
