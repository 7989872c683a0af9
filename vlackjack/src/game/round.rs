//! Blackjack round state machine for a single table.
//!
//! ```text
//! waiting --start_round--> dealing --deal + naturals--> player
//! player  --hit/double/split/stand (turn advances)--> player | dealer
//! dealer  --draw to hard 17--> settle --payouts--> round_end
//! round_end --start_round--> dealing
//! ```
//!
//! Every public operation either succeeds or returns a [`RoundError`] without
//! touching round state. Domain events accumulate in an internal queue that
//! is drained with [`Round::consume_events`].

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{
    cards::{Card, Shoe, compute_total, is_natural, is_soft},
    entities::{Chips, DEALER_ID, DealerSeat, Hand, HandResult, HandStatus, Seat, UserId, new_id},
    errors::{RoundError, RoundResult},
    events::{EventPayload, ForcedOutcome, GameEvent, Summary},
    snapshot::{HandSnapshot, RoundSnapshot, SeatSnapshot},
};
use crate::config::TableConfig;

/// Identifies the currently authorized turn. Bumped on every turn change so
/// deferred timeouts armed for an older turn can recognise themselves as stale.
pub type TurnToken = u64;

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    Waiting,
    Dealing,
    Player,
    Dealer,
    Settle,
    RoundEnd,
}

impl RoundStatus {
    /// Statuses during which the table is mid-round.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Self::Dealing | Self::Player | Self::Dealer | Self::Settle
        )
    }
}

impl fmt::Display for RoundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::Waiting => "waiting",
            Self::Dealing => "dealing",
            Self::Player => "player",
            Self::Dealer => "dealer",
            Self::Settle => "settle",
            Self::RoundEnd => "round_end",
        };
        write!(f, "{repr}")
    }
}

#[derive(Debug)]
pub struct Round {
    table_id: String,
    config: TableConfig,
    shoe: Shoe,
    /// Seats in join order.
    seats: Vec<Seat>,
    dealer: DealerSeat,
    status: RoundStatus,
    show_dealer_hole_card: bool,
    active_seat: Option<UserId>,
    active_hand: Option<String>,
    round_id: Option<String>,
    turn_token: TurnToken,
    turn_ends_at: Option<DateTime<Utc>>,
    events: Vec<GameEvent>,
}

impl Round {
    #[must_use]
    pub fn new(table_id: impl Into<String>, config: &TableConfig) -> Self {
        Self::with_shoe(table_id, config, Shoe::new(config.decks))
    }

    /// Creates a round drawing from a prepared shoe, for deterministic deals.
    #[must_use]
    pub fn with_shoe(table_id: impl Into<String>, config: &TableConfig, shoe: Shoe) -> Self {
        Self {
            table_id: table_id.into(),
            config: config.clone(),
            shoe,
            seats: Vec::new(),
            dealer: DealerSeat::default(),
            status: RoundStatus::Waiting,
            show_dealer_hole_card: false,
            active_seat: None,
            active_hand: None,
            round_id: None,
            turn_token: 0,
            turn_ends_at: None,
            events: Vec::new(),
        }
    }

    /// Starts the turn token at `token`, for a round replacing an earlier one
    /// at the same table.
    #[must_use]
    pub fn continuing_from(mut self, token: TurnToken) -> Self {
        self.turn_token = token;
        self
    }

    /// Swaps the shoe between rounds. Ignored while a round is active.
    pub fn replace_shoe(&mut self, shoe: Shoe) -> bool {
        if self.is_round_active() {
            return false;
        }
        self.shoe = shoe;
        true
    }

    #[must_use]
    pub fn table_id(&self) -> &str {
        &self.table_id
    }

    #[must_use]
    pub fn status(&self) -> RoundStatus {
        self.status
    }

    #[must_use]
    pub fn is_round_active(&self) -> bool {
        self.status.is_active()
    }

    #[must_use]
    pub fn round_id(&self) -> Option<&str> {
        self.round_id.as_deref()
    }

    #[must_use]
    pub fn seats(&self) -> &[Seat] {
        &self.seats
    }

    #[must_use]
    pub fn seat(&self, user_id: &str) -> Option<&Seat> {
        self.seats.iter().find(|seat| seat.user_id == user_id)
    }

    #[must_use]
    pub fn dealer(&self) -> &DealerSeat {
        &self.dealer
    }

    #[must_use]
    pub fn active_seat(&self) -> Option<&str> {
        self.active_seat.as_deref()
    }

    #[must_use]
    pub fn active_hand(&self) -> Option<&str> {
        self.active_hand.as_deref()
    }

    #[must_use]
    pub fn show_dealer_hole_card(&self) -> bool {
        self.show_dealer_hole_card
    }

    #[must_use]
    pub fn turn_token(&self) -> TurnToken {
        self.turn_token
    }

    #[must_use]
    pub fn turn_ends_at(&self) -> Option<DateTime<Utc>> {
        self.turn_ends_at
    }

    /// True when a participant holds the turn but no deadline has been stamped
    /// for it yet.
    #[must_use]
    pub fn needs_turn_deadline(&self) -> bool {
        self.status == RoundStatus::Player
            && self.active_seat.is_some()
            && self.turn_ends_at.is_none()
    }

    pub fn set_turn_deadline(&mut self, ends_at: DateTime<Utc>) {
        self.turn_ends_at = Some(ends_at);
    }

    /// Invalidates any armed deadline without changing whose turn it is.
    pub fn disarm_turn(&mut self) {
        self.bump_turn();
    }

    /// Drains pending events. Each event is returned exactly once.
    pub fn consume_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    fn bump_turn(&mut self) {
        self.turn_token += 1;
        self.turn_ends_at = None;
    }

    fn log_event(&mut self, user_id: Option<&str>, payload: EventPayload) {
        debug!(
            "Table {}: {} {}",
            self.table_id,
            payload.action(),
            user_id.unwrap_or("-")
        );
        self.events.push(GameEvent {
            table_id: self.table_id.clone(),
            round_id: self.round_id.clone(),
            user_id: user_id.map(str::to_string),
            payload,
            created_at: Utc::now(),
        });
    }

    fn draw_card(&mut self) -> Card {
        let (card, reshuffled) = self.shoe.draw();
        if let Some(remaining) = reshuffled {
            self.log_event(None, EventPayload::Shuffle { remaining });
        }
        card
    }

    fn seat_index(&self, user_id: &str) -> Option<usize> {
        self.seats.iter().position(|seat| seat.user_id == user_id)
    }

    /// Reconciles seats with the table roster: new participants sit down with
    /// the starting bank, absent ones are removed, names are refreshed.
    ///
    /// Removing the participant who holds the turn hands the turn to the next
    /// playable seat, or to the dealer when none is left.
    pub fn sync_players(&mut self, roster: &[(UserId, String)]) {
        for (user_id, display_name) in roster {
            match self.seat_index(user_id) {
                Some(idx) => self.seats[idx].display_name.clone_from(display_name),
                None => self.seats.push(Seat::new(
                    user_id.clone(),
                    display_name.clone(),
                    self.config.starting_bank,
                )),
            }
        }

        self.seats
            .retain(|seat| roster.iter().any(|(user_id, _)| *user_id == seat.user_id));

        let active_gone = self
            .active_seat
            .as_deref()
            .is_some_and(|user_id| self.seat_index(user_id).is_none());
        if active_gone {
            self.clear_active();
        }

        if self.is_round_active() && self.active_seat.is_none() && !self.set_next_active_player() {
            self.dealer_turn();
        }
    }

    /// Places minimum bets, deals, and hands out the first turn.
    pub fn start_round(&mut self) -> RoundResult<()> {
        if self.is_round_active() {
            return Err(RoundError::RoundInProgress);
        }
        if self.seats.is_empty() {
            return Err(RoundError::NoPlayers);
        }
        let min_bet = self.config.min_bet;
        if self.seats.iter().all(|seat| seat.bank < min_bet) {
            return Err(RoundError::InsufficientBalance);
        }

        self.round_id = Some(new_id());
        self.status = RoundStatus::Dealing;
        self.show_dealer_hole_card = false;
        self.active_seat = None;
        self.active_hand = None;
        self.bump_turn();

        for seat in &mut self.seats {
            seat.hands.clear();
            seat.active_hand_index = 0;
            if seat.bank < min_bet {
                seat.hands.push(Hand::new(HandStatus::Waiting, 0));
            } else {
                seat.bank -= min_bet;
                seat.hands.push(Hand::new(HandStatus::Playing, min_bet));
            }
        }
        self.dealer.reset();

        self.log_event(None, EventPayload::RoundStart { min_bet });
        self.deal_initial_cards();
        self.mark_natural_blackjacks();

        if is_natural(&self.dealer.hand.cards) {
            self.show_dealer_hole_card = true;
            self.settle_round();
            return Ok(());
        }

        if !self.set_next_active_player() {
            self.dealer_turn();
        }
        Ok(())
    }

    /// Two passes, one card per betting seat in join order, then the dealer.
    fn deal_initial_cards(&mut self) {
        for _ in 0..2 {
            for idx in 0..self.seats.len() {
                if !self.seats[idx].is_betting() {
                    continue;
                }
                let card = self.draw_card();
                let seat = &mut self.seats[idx];
                if let Some(hand) = seat.hands.first_mut() {
                    hand.cards.push(card);
                    let hand_id = hand.id.clone();
                    let user_id = seat.user_id.clone();
                    self.log_event(Some(&user_id), EventPayload::Deal { hand_id });
                }
            }
            let card = self.draw_card();
            self.dealer.hand.cards.push(card);
            let hand_id = self.dealer.hand.id.clone();
            self.log_event(Some(DEALER_ID), EventPayload::Deal { hand_id });
        }
    }

    fn mark_natural_blackjacks(&mut self) {
        let mut naturals = Vec::new();
        for seat in &mut self.seats {
            for hand in &mut seat.hands {
                if hand.bet > 0 && hand.is_natural() {
                    hand.status = HandStatus::Blackjack;
                    hand.result = Some(HandResult::Blackjack);
                    naturals.push((seat.user_id.clone(), hand.id.clone()));
                }
            }
        }
        for (user_id, hand_id) in naturals {
            self.log_event(Some(&user_id), EventPayload::Blackjack { hand_id });
        }
    }

    fn activate(&mut self, seat_idx: usize, hand_idx: usize) {
        let seat = &mut self.seats[seat_idx];
        seat.active_hand_index = hand_idx;
        self.active_seat = Some(seat.user_id.clone());
        self.active_hand = Some(seat.hands[hand_idx].id.clone());
        self.status = RoundStatus::Player;
        self.bump_turn();
    }

    fn clear_active(&mut self) {
        self.active_seat = None;
        self.active_hand = None;
        self.bump_turn();
    }

    /// Grants the turn to the first seat, in join order, holding a playing
    /// hand. Returns false (and clears the turn) when there is none.
    fn set_next_active_player(&mut self) -> bool {
        let next = self.seats.iter().enumerate().find_map(|(seat_idx, seat)| {
            seat.first_playing_hand()
                .map(|hand_idx| (seat_idx, hand_idx))
        });
        match next {
            Some((seat_idx, hand_idx)) => {
                self.activate(seat_idx, hand_idx);
                true
            }
            None => {
                if self.active_seat.is_some() || self.active_hand.is_some() {
                    self.clear_active();
                }
                false
            }
        }
    }

    /// Moves the turn after the active hand resolved: the same seat's later
    /// hands first (post-split), then any seat, then the dealer.
    fn advance_turn(&mut self) {
        let Some(user_id) = self.active_seat.clone() else {
            return;
        };

        if let Some(seat_idx) = self.seat_index(&user_id) {
            let seat = &self.seats[seat_idx];
            let later = (seat.active_hand_index + 1..seat.hands.len())
                .find(|&idx| seat.hands[idx].is_playing());
            if let Some(hand_idx) = later {
                self.activate(seat_idx, hand_idx);
                return;
            }
        }

        if !self.set_next_active_player() {
            self.dealer_turn();
        }
    }

    /// Validates that `user_id` may act now and returns its seat index.
    fn acting_seat(&self, user_id: &str) -> RoundResult<usize> {
        if self.status != RoundStatus::Player {
            return Err(RoundError::NotAcceptingActions);
        }
        if self.active_seat.as_deref() != Some(user_id) {
            return Err(RoundError::NotYourTurn);
        }
        let seat_idx = self.seat_index(user_id).ok_or(RoundError::HandNotActive)?;
        match self.seats[seat_idx].active_hand() {
            Some(hand) if hand.is_playing() => Ok(seat_idx),
            _ => Err(RoundError::HandNotActive),
        }
    }

    fn hand_mut(&mut self, seat_idx: usize) -> &mut Hand {
        let seat = &mut self.seats[seat_idx];
        &mut seat.hands[seat.active_hand_index]
    }

    pub fn hit(&mut self, user_id: &str) -> RoundResult<()> {
        let seat_idx = self.acting_seat(user_id)?;
        let card = self.draw_card();

        let hand = self.hand_mut(seat_idx);
        hand.cards.push(card);
        let hand_id = hand.id.clone();
        let total = hand.total();
        if total > 21 {
            hand.status = HandStatus::Bust;
            hand.result = Some(HandResult::Bust);
        } else if total == 21 {
            hand.status = HandStatus::Stand;
        }

        self.log_event(
            Some(user_id),
            EventPayload::Hit {
                hand_id: hand_id.clone(),
            },
        );
        if total > 21 {
            self.log_event(Some(user_id), EventPayload::Bust { hand_id });
        }
        if total >= 21 {
            self.advance_turn();
        }
        Ok(())
    }

    /// Stands the active hand. `auto` marks a stand forced by the turn timer.
    pub fn stand(&mut self, user_id: &str, auto: bool) -> RoundResult<()> {
        let seat_idx = self.acting_seat(user_id)?;

        let hand = self.hand_mut(seat_idx);
        hand.status = HandStatus::Stand;
        let hand_id = hand.id.clone();

        let payload = if auto {
            EventPayload::AutoStand { hand_id }
        } else {
            EventPayload::Stand { hand_id }
        };
        self.log_event(Some(user_id), payload);
        self.advance_turn();
        Ok(())
    }

    pub fn double_down(&mut self, user_id: &str) -> RoundResult<()> {
        let seat_idx = self.acting_seat(user_id)?;
        {
            let seat = &self.seats[seat_idx];
            let bet = seat.hands[seat.active_hand_index].bet;
            let cards = seat.hands[seat.active_hand_index].cards.len();
            if cards != 2 || seat.bank < bet || seat.has_split() {
                return Err(RoundError::CannotDoubleDown);
            }
        }

        let seat = &mut self.seats[seat_idx];
        let hand = &mut seat.hands[seat.active_hand_index];
        seat.bank -= hand.bet;
        hand.bet *= 2;
        hand.is_doubled = true;
        let hand_id = hand.id.clone();
        self.log_event(
            Some(user_id),
            EventPayload::Double {
                hand_id: hand_id.clone(),
            },
        );

        let card = self.draw_card();
        let hand = self.hand_mut(seat_idx);
        hand.cards.push(card);
        let busted = hand.total() > 21;
        if busted {
            hand.status = HandStatus::Bust;
            hand.result = Some(HandResult::Bust);
        } else {
            hand.status = HandStatus::Stand;
        }
        if busted {
            self.log_event(Some(user_id), EventPayload::Bust { hand_id });
        }
        self.advance_turn();
        Ok(())
    }

    /// Splits a pair into two hands. The first hand keeps the turn.
    pub fn split(&mut self, user_id: &str) -> RoundResult<()> {
        let seat_idx = self.acting_seat(user_id)?;
        {
            let seat = &self.seats[seat_idx];
            let hand = &seat.hands[seat.active_hand_index];
            if seat.has_split() || !hand.is_pair() {
                return Err(RoundError::CannotSplit);
            }
            if seat.bank < hand.bet {
                return Err(RoundError::InsufficientBankToSplit);
            }
        }

        let seat = &mut self.seats[seat_idx];
        let hand_idx = seat.active_hand_index;
        let hand = &mut seat.hands[hand_idx];
        let bet = hand.bet;
        let Some(moved) = hand.cards.pop() else {
            return Err(RoundError::CannotSplit);
        };
        hand.is_split = true;
        let hand_id = hand.id.clone();

        let mut split_hand = Hand::new(HandStatus::Playing, bet);
        split_hand.cards.push(moved);
        split_hand.is_split = true;
        let split_id = split_hand.id.clone();

        seat.bank -= bet;
        seat.hands.push(split_hand);
        seat.active_hand_index = hand_idx;
        self.active_hand = Some(hand_id.clone());

        self.log_event(Some(user_id), EventPayload::Split { hand_id, split_id });
        Ok(())
    }

    /// Admin override: stop taking player actions and let the dealer finish.
    pub fn force_end_round(&mut self) -> RoundResult<()> {
        if !self.is_round_active() {
            return Err(RoundError::NoRoundInProgress);
        }
        self.show_dealer_hole_card = true;
        self.dealer_turn();
        Ok(())
    }

    /// Admin override: settles every betting hand with the same outcome.
    pub fn force_result(&mut self, outcome: ForcedOutcome) -> RoundResult<()> {
        if !self.is_round_active() {
            return Err(RoundError::NoRoundInProgress);
        }
        self.show_dealer_hole_card = true;

        let result = match outcome {
            ForcedOutcome::DealerWin | ForcedOutcome::DealerBlackjack => HandResult::Lose,
            ForcedOutcome::PlayerWin | ForcedOutcome::DealerBust => HandResult::Win,
            ForcedOutcome::Push => HandResult::Push,
        };

        let mut summary = Summary::new();
        for seat in &mut self.seats {
            for hand in &mut seat.hands {
                if hand.bet == 0 {
                    continue;
                }
                hand.result = Some(result);
                hand.status = HandStatus::Stand;
                let payout = result.payout(hand.bet);
                seat.bank += payout;
                *summary.entry(seat.user_id.clone()).or_insert(0) += payout - hand.bet;
            }
        }

        self.log_event(
            None,
            EventPayload::ForceResult {
                result: outcome,
                summary,
            },
        );
        self.status = RoundStatus::RoundEnd;
        self.clear_active();
        Ok(())
    }

    /// Deposits chips into a seat's bank. Used for external wallet top-ups.
    pub fn credit_bank(&mut self, user_id: &str, amount: Chips) -> RoundResult<()> {
        if amount <= 0 {
            return Err(RoundError::InvalidAmount(amount));
        }
        let seat_idx = self.seat_index(user_id).ok_or(RoundError::SeatNotFound)?;
        let seat = &mut self.seats[seat_idx];
        seat.bank = seat
            .bank
            .checked_add(amount)
            .ok_or(RoundError::BankOverflow)?;
        self.log_event(Some(user_id), EventPayload::BankCredit { amount });
        Ok(())
    }

    /// Reveals the hole card and draws while under 17 or on soft 17.
    fn dealer_turn(&mut self) {
        self.status = RoundStatus::Dealer;
        self.show_dealer_hole_card = true;
        loop {
            let cards = &self.dealer.hand.cards;
            let total = compute_total(cards);
            if total < 17 || (total == 17 && is_soft(cards)) {
                let card = self.draw_card();
                self.dealer.hand.cards.push(card);
                let hand_id = self.dealer.hand.id.clone();
                self.log_event(Some(DEALER_ID), EventPayload::DealerHit { hand_id });
            } else {
                break;
            }
        }
        self.settle_round();
    }

    fn settle_round(&mut self) {
        self.status = RoundStatus::Settle;
        let dealer_cards = &self.dealer.hand.cards;
        let dealer = DealerOutcome {
            total: compute_total(dealer_cards),
            blackjack: is_natural(dealer_cards),
        };

        let mut summary = Summary::new();
        for seat in &mut self.seats {
            for hand in &mut seat.hands {
                if hand.bet == 0 {
                    continue;
                }
                let result = if hand.result == Some(HandResult::Bust) {
                    HandResult::Bust
                } else {
                    let result = settle_hand(hand, dealer);
                    hand.result = Some(result);
                    result
                };
                let payout = result.payout(hand.bet);
                seat.bank += payout;
                *summary.entry(seat.user_id.clone()).or_insert(0) += payout - hand.bet;
            }
        }

        self.log_event(None, EventPayload::RoundEnd { summary });
        self.status = RoundStatus::RoundEnd;
        self.clear_active();
    }

    #[must_use]
    pub fn snapshot(&self) -> RoundSnapshot {
        let mut players: Vec<SeatSnapshot> = self
            .seats
            .iter()
            .map(|seat| SeatSnapshot {
                user_id: seat.user_id.clone(),
                display_name: seat.display_name.clone(),
                is_dealer: false,
                bank: seat.bank,
                hands: seat.hands.iter().map(HandSnapshot::from).collect(),
            })
            .collect();
        players.push(SeatSnapshot {
            user_id: DEALER_ID.to_string(),
            display_name: DealerSeat::DISPLAY_NAME.to_string(),
            is_dealer: true,
            bank: 0,
            hands: vec![HandSnapshot::from(&self.dealer.hand)],
        });

        RoundSnapshot {
            table_id: self.table_id.clone(),
            status: self.status,
            min_bet: self.config.min_bet,
            max_bet: self.config.max_bet,
            cards_played: self.shoe.cards_played(),
            shoe_count: self.shoe.remaining(),
            show_dealer_hole_card: self.show_dealer_hole_card,
            active_player_id: self.active_seat.clone(),
            active_hand_id: self.active_hand.clone(),
            turn_ends_at: self.turn_ends_at,
            players,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct DealerOutcome {
    total: u32,
    blackjack: bool,
}

/// Settles one non-bust hand against the dealer. Branch order matters: a
/// two-card 21 is paid as blackjack before any comparison with the dealer.
fn settle_hand(hand: &Hand, dealer: DealerOutcome) -> HandResult {
    let total = hand.total();
    let dealer_bust = dealer.total > 21;
    if hand.result == Some(HandResult::Blackjack) && dealer.blackjack {
        HandResult::Push
    } else if total == 21 && hand.cards.len() == 2 && !dealer.blackjack {
        HandResult::Blackjack
    } else if dealer.blackjack && total != 21 {
        HandResult::Lose
    } else if dealer_bust && total <= 21 {
        HandResult::Win
    } else if total > 21 {
        HandResult::Bust
    } else if total > dealer.total {
        HandResult::Win
    } else if total == dealer.total {
        HandResult::Push
    } else {
        HandResult::Lose
    }
}
