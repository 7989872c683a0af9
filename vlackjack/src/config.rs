//! Table rules and lobby-wide settings.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::game::entities::Chips;

/// Smallest seat capacity a table can be created with.
pub const MIN_TABLE_PLAYERS: usize = 2;

/// Largest seat capacity a table can be created with.
pub const MAX_TABLE_PLAYERS: usize = 8;

/// Largest shoe a table may use.
pub const MAX_DECKS: usize = 8;

/// Per-table game rules. Changing these discards the table's round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
    /// Bet placed automatically for every seat at the start of a round
    pub min_bet: Chips,

    /// Advertised table maximum
    pub max_bet: Chips,

    /// Decks in the shoe
    pub decks: usize,

    /// Bank each seat starts with when it first sits down
    pub starting_bank: Chips,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            min_bet: 10,
            max_bet: 500,
            decks: 6,
            starting_bank: 2500,
        }
    }
}

impl TableConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_bet <= 0 {
            return Err(ConfigError::Invalid {
                var: "TABLE_MIN_BET".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.max_bet < self.min_bet {
            return Err(ConfigError::Invalid {
                var: "TABLE_MAX_BET".to_string(),
                reason: format!("Must be at least the minimum bet ({})", self.min_bet),
            });
        }

        if self.decks == 0 || self.decks > MAX_DECKS {
            return Err(ConfigError::Invalid {
                var: "TABLE_DECKS".to_string(),
                reason: format!("Must be between 1 and {MAX_DECKS}"),
            });
        }

        if self.starting_bank < 0 {
            return Err(ConfigError::Invalid {
                var: "TABLE_STARTING_BANK".to_string(),
                reason: "Must not be negative".to_string(),
            });
        }

        Ok(())
    }
}

/// Lobby-wide settings shared by every table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbyConfig {
    /// Seconds a participant has to act before being stood automatically
    pub turn_timeout_secs: u64,
    /// Minimum gap between two chat messages from the same participant
    pub chat_cooldown_ms: u64,
    /// Messages kept per table
    pub chat_history_limit: usize,
    /// Longest accepted chat message, in characters
    pub chat_max_length: usize,
    /// Rules for newly created tables
    pub table_defaults: TableConfig,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            turn_timeout_secs: 20,
            chat_cooldown_ms: 1000,
            chat_history_limit: 150,
            chat_max_length: 280,
            table_defaults: TableConfig::default(),
        }
    }
}

impl LobbyConfig {
    /// Load configuration from environment variables, reading `.env` first if present.
    ///
    /// # Errors
    ///
    /// Returns error if a loaded value fails validation
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let defaults = Self::default();
        let table_defaults = TableConfig {
            min_bet: parse_env_or("TABLE_MIN_BET", defaults.table_defaults.min_bet),
            max_bet: parse_env_or("TABLE_MAX_BET", defaults.table_defaults.max_bet),
            decks: parse_env_or("TABLE_DECKS", defaults.table_defaults.decks),
            starting_bank: parse_env_or(
                "TABLE_STARTING_BANK",
                defaults.table_defaults.starting_bank,
            ),
        };

        let config = Self {
            turn_timeout_secs: parse_env_or("TURN_TIMEOUT_SECS", defaults.turn_timeout_secs),
            chat_cooldown_ms: parse_env_or("CHAT_COOLDOWN_MS", defaults.chat_cooldown_ms),
            chat_history_limit: parse_env_or("CHAT_HISTORY_LIMIT", defaults.chat_history_limit),
            chat_max_length: parse_env_or("CHAT_MAX_LENGTH", defaults.chat_max_length),
            table_defaults,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.turn_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "TURN_TIMEOUT_SECS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.chat_history_limit == 0 {
            return Err(ConfigError::Invalid {
                var: "CHAT_HISTORY_LIMIT".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.chat_max_length == 0 {
            return Err(ConfigError::Invalid {
                var: "CHAT_MAX_LENGTH".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        self.table_defaults.validate()
    }

    #[must_use]
    pub fn turn_timeout(&self) -> Duration {
        Duration::from_secs(self.turn_timeout_secs)
    }

    #[must_use]
    pub fn chat_cooldown(&self) -> Duration {
        Duration::from_millis(self.chat_cooldown_ms)
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Helper to parse environment variable with default fallback
fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
