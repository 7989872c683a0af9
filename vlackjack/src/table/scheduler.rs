//! Turn deadlines.
//!
//! Every time a round hands the turn to someone it bumps its turn token and
//! clears its deadline. [`TurnScheduler::refresh`] stamps a fresh deadline and
//! hands back the token, which [`TurnScheduler::arm`] carries through a timer.
//! When the timer expires the token is delivered to the table manager, which
//! compares it against the round's current token under the lobby lock. A
//! mismatch means the turn already moved on and the expiry is ignored; there
//! is no other way to cancel a timer.

use chrono::{DateTime, Utc};
use log::debug;
use std::time::Duration;
use tokio::sync::mpsc;

use super::state::TableId;
use crate::game::{Round, TurnToken};

/// Capacity of the expired-deadline channel.
const DEADLINE_CHANNEL_CAPACITY: usize = 256;

/// An armed deadline that has run out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnDeadline {
    pub table_id: TableId,
    pub token: TurnToken,
}

#[derive(Clone, Debug)]
pub struct TurnScheduler {
    timeout: Duration,
    expired: mpsc::Sender<TurnDeadline>,
}

impl TurnScheduler {
    /// Creates a scheduler and the receiver its expired deadlines arrive on.
    #[must_use]
    pub fn new(timeout: Duration) -> (Self, mpsc::Receiver<TurnDeadline>) {
        let (expired, receiver) = mpsc::channel(DEADLINE_CHANNEL_CAPACITY);
        (Self { timeout, expired }, receiver)
    }

    /// Stamps a deadline on a round whose current turn has none yet and
    /// returns the token to arm with.
    pub fn refresh(&self, round: &mut Round, now: DateTime<Utc>) -> Option<TurnToken> {
        if !round.needs_turn_deadline() {
            return None;
        }
        let ends_at = chrono::Duration::from_std(self.timeout)
            .ok()
            .and_then(|timeout| now.checked_add_signed(timeout))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        round.set_turn_deadline(ends_at);
        Some(round.turn_token())
    }

    /// Starts the timer for `token`. Must be called from within a tokio runtime.
    pub fn arm(&self, table_id: TableId, token: TurnToken) {
        let timeout = self.timeout;
        let expired = self.expired.clone();
        debug!("Armed turn {} at table {} for {:?}", token, table_id, timeout);
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if expired.send(TurnDeadline { table_id, token }).await.is_err() {
                debug!("Turn deadline receiver gone, dropping expiry");
            }
        });
    }
}
