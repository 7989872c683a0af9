/// Integration tests for complete rounds driven through the public API
///
/// Deals use stacked shoes so every scenario is deterministic. Draw order is
/// seat by seat in join order, then the dealer, twice.
use vlackjack::{
    ForcedOutcome, Round, RoundError, RoundStatus, Shoe, TableConfig,
    game::{HandResult, HandStatus, Rank, Rank::*},
};

fn config() -> TableConfig {
    TableConfig {
        min_bet: 10,
        max_bet: 500,
        decks: 6,
        starting_bank: 2500,
    }
}

fn seated(draws: &[Rank], players: &[&str]) -> Round {
    let config = config();
    let mut round = Round::with_shoe("table-1", &config, Shoe::stacked(config.decks, draws));
    let roster: Vec<(String, String)> = players
        .iter()
        .map(|id| (id.to_string(), format!("Player {id}")))
        .collect();
    round.sync_players(&roster);
    round
}

fn bank(round: &Round, user_id: &str) -> i64 {
    round.seat(user_id).map(|seat| seat.bank).unwrap()
}

#[test]
fn test_stand_on_19_loses_to_dealer_21() {
    // p1: 10, 9 / dealer: 6, K, then 5
    let mut round = seated(&[Ten, Six, Nine, King, Five], &["p1"]);
    round.start_round().unwrap();
    assert_eq!(round.active_seat(), Some("p1"));

    round.stand("p1", false).unwrap();

    let snapshot = round.snapshot();
    assert_eq!(snapshot.status, RoundStatus::RoundEnd);
    assert!(snapshot.show_dealer_hole_card);
    let hand = &snapshot.player("p1").unwrap().hands[0];
    assert_eq!(hand.result, Some(HandResult::Lose));
    assert_eq!(bank(&round, "p1"), 2490);

    let events = round.consume_events();
    let end = events.last().unwrap();
    assert_eq!(end.action(), "round_end");
    assert_eq!(end.payload.summary().and_then(|s| s.get("p1")), Some(&-10));
}

#[test]
fn test_natural_blackjack_pays_25_on_10() {
    // p1: A, K / dealer: 9, 8
    let mut round = seated(&[Ace, Nine, King, Eight], &["p1"]);
    round.start_round().unwrap();

    assert_eq!(round.status(), RoundStatus::RoundEnd);
    let seat = round.seat("p1").unwrap();
    assert_eq!(seat.hands[0].status, HandStatus::Blackjack);
    assert_eq!(seat.hands[0].result, Some(HandResult::Blackjack));
    assert_eq!(seat.bank, 2500 - 10 + 25);
}

#[test]
fn test_unpaired_split_leaves_round_untouched() {
    // p1: 7, 8 / dealer: 10, 9
    let mut round = seated(&[Seven, Ten, Eight, Nine], &["p1"]);
    round.start_round().unwrap();
    round.consume_events();

    let before = round.snapshot();
    let token = round.turn_token();
    assert_eq!(round.split("p1"), Err(RoundError::CannotSplit));
    assert_eq!(round.snapshot(), before);
    assert_eq!(round.turn_token(), token);
    assert!(round.consume_events().is_empty());
}

#[test]
fn test_removing_active_seat_hands_turn_on() {
    // p1: 10, 6 / p2: 9, 8 / dealer: 7, 10
    let mut round = seated(&[Ten, Nine, Seven, Six, Eight, Ten], &["p1", "p2"]);
    round.start_round().unwrap();
    assert_eq!(round.active_seat(), Some("p1"));
    let token = round.turn_token();

    round.sync_players(&[("p2".to_string(), "Player p2".to_string())]);

    assert_eq!(round.active_seat(), Some("p2"));
    assert!(round.turn_token() > token);
    assert!(round.seat("p1").is_none());
    assert_eq!(round.status(), RoundStatus::Player);
}

#[test]
fn test_token_strictly_increases_across_turns() {
    // p1: 5, 6 / p2: 9, 8 / p3: 10, 7 / dealer: 7, 10
    let mut round = seated(
        &[Five, Nine, Ten, Seven, Six, Eight, Seven, Ten, Two],
        &["p1", "p2", "p3"],
    );
    let mut tokens = vec![round.turn_token()];
    round.start_round().unwrap();
    tokens.push(round.turn_token());

    round.hit("p1").unwrap();
    // a hit that keeps the turn does not change the token
    assert_eq!(round.turn_token(), *tokens.last().unwrap());
    round.stand("p1", false).unwrap();
    tokens.push(round.turn_token());
    round.stand("p2", false).unwrap();
    tokens.push(round.turn_token());
    round.disarm_turn();
    tokens.push(round.turn_token());
    round.stand("p3", true).unwrap();
    tokens.push(round.turn_token());

    assert!(tokens.windows(2).all(|pair| pair[0] < pair[1]));
    assert_eq!(round.status(), RoundStatus::RoundEnd);
}

#[test]
fn test_split_hands_cannot_double_and_settle_separately() {
    // p1: 8, 8 / dealer: 10, 7 / hand one draws 3 (11), hand two draws 10 (18)
    let mut round = seated(&[Eight, Ten, Eight, Seven, Three, Ten], &["p1"]);
    round.start_round().unwrap();
    round.split("p1").unwrap();
    assert_eq!(bank(&round, "p1"), 2480);

    round.hit("p1").unwrap();
    assert_eq!(round.double_down("p1"), Err(RoundError::CannotDoubleDown));
    round.stand("p1", false).unwrap();
    round.hit("p1").unwrap();
    round.stand("p1", false).unwrap();

    let seat = round.seat("p1").unwrap();
    assert_eq!(seat.hands[0].result, Some(HandResult::Lose));
    assert_eq!(seat.hands[1].result, Some(HandResult::Win));
    assert_eq!(seat.bank, 2480 + 20);
}

#[test]
fn test_double_down_bust_loses_doubled_bet() {
    // p1: 10, 2 / dealer: 9, 8 / double draws K
    let mut round = seated(&[Ten, Nine, Two, Eight, King], &["p1"]);
    round.start_round().unwrap();
    round.double_down("p1").unwrap();

    let seat = round.seat("p1").unwrap();
    assert_eq!(seat.hands[0].status, HandStatus::Bust);
    assert_eq!(seat.hands[0].bet, 20);
    assert_eq!(seat.bank, 2480);

    let actions: Vec<&str> = round.consume_events().iter().map(|e| e.action()).collect();
    let double_at = actions.iter().position(|a| *a == "double").unwrap();
    assert_eq!(actions[double_at + 1], "bust");
    assert_eq!(actions.last(), Some(&"round_end"));
}

#[test]
fn test_force_result_dealer_win_takes_every_bet() {
    let mut round = seated(&[Ten, Nine, Seven, Six, Eight, Ten], &["p1", "p2"]);
    round.start_round().unwrap();
    round.force_result(ForcedOutcome::DealerWin).unwrap();

    assert_eq!(bank(&round, "p1"), 2490);
    assert_eq!(bank(&round, "p2"), 2490);
    assert!(round.show_dealer_hole_card());
    let events = round.consume_events();
    let last = events.last().unwrap();
    assert_eq!(last.action(), "force_result");
    assert_eq!(last.payload.summary().map(|s| s.len()), Some(2));
}

#[test]
fn test_broke_seat_sits_out_the_deal() {
    let rules = TableConfig {
        starting_bank: 5,
        ..config()
    };
    // p1: 10, 9 / dealer: 7, 10; p2 is skipped
    let mut round = Round::with_shoe("table-2", &rules, Shoe::stacked(6, &[Ten, Seven, Nine, Ten]));
    round.sync_players(&[
        ("p1".to_string(), "Player p1".to_string()),
        ("p2".to_string(), "Player p2".to_string()),
    ]);
    assert_eq!(round.start_round(), Err(RoundError::InsufficientBalance));
    assert_eq!(round.status(), RoundStatus::Waiting);

    round.credit_bank("p1", 100).unwrap();
    round.start_round().unwrap();

    let p2 = round.seat("p2").unwrap();
    assert_eq!(p2.bank, 5);
    assert_eq!(p2.hands[0].bet, 0);
    assert!(p2.hands[0].cards.is_empty());
    assert_eq!(round.seat("p1").unwrap().hands[0].total(), 19);
    assert_eq!(round.active_seat(), Some("p1"));
}
