/// Integration tests for the turn clock
///
/// These run on tokio's paused clock, so sleeping advances virtual time
/// instantly and timers fire in a deterministic order.
use std::{sync::Arc, time::Duration};
use vlackjack::{
    LobbyConfig, RoundStatus, TableConfig, TableError, TableManager,
    game::{HandResult, Rank::*, Shoe},
    table::{LogBroadcaster, MemoryRecorder, PlayerAction},
};

struct Fixture {
    manager: TableManager,
    recorder: MemoryRecorder,
    table_id: String,
}

/// Seats a (u1) and b (u2) and deals a: 10, 9 / b: 9, 8 / dealer: 7, 10.
async fn dealt() -> Fixture {
    let _ = env_logger::builder().is_test(true).try_init();
    let recorder = MemoryRecorder::new();
    let manager = TableManager::new(
        LobbyConfig::default(),
        Arc::new(LogBroadcaster),
        Arc::new(recorder.clone()),
    );
    manager.connect("c1", "u1", "Alice", None).await;
    manager.connect("c2", "u2", "Bob", None).await;
    let table_id = manager.create_table("c1", "Main", false, 4).await.unwrap();
    manager.join_table("c2", &table_id, None).await.unwrap();

    let shoe = Shoe::stacked(6, &[Ten, Nine, Seven, Nine, Eight, Ten]);
    manager.replace_shoe(&table_id, shoe).await.unwrap();
    manager.start_round("c1").await.unwrap();

    Fixture {
        manager,
        recorder,
        table_id,
    }
}

async fn advance(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
    // let the expiry worker take the lobby lock
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

impl Fixture {
    async fn active(&self) -> Option<String> {
        self.manager
            .game_snapshot(&self.table_id)
            .await
            .and_then(|snapshot| snapshot.active_player_id)
    }

    fn auto_stands(&self) -> usize {
        self.recorder
            .actions()
            .iter()
            .filter(|action| **action == "auto_stand")
            .count()
    }
}

#[tokio::test(start_paused = true)]
async fn test_idle_players_are_stood_in_turn() {
    let fixture = dealt().await;
    let snapshot = fixture.manager.game_snapshot(&fixture.table_id).await.unwrap();
    assert_eq!(snapshot.active_player_id.as_deref(), Some("u1"));
    assert!(snapshot.turn_ends_at.is_some());

    advance(19).await;
    assert_eq!(fixture.active().await.as_deref(), Some("u1"));

    advance(2).await;
    assert_eq!(fixture.active().await.as_deref(), Some("u2"));
    assert_eq!(fixture.auto_stands(), 1);

    advance(20).await;
    let snapshot = fixture.manager.game_snapshot(&fixture.table_id).await.unwrap();
    assert_eq!(snapshot.status, RoundStatus::RoundEnd);
    assert_eq!(snapshot.active_player_id, None);
    assert_eq!(fixture.auto_stands(), 2);

    let a = snapshot.player("u1").unwrap();
    assert_eq!(a.hands[0].result, Some(HandResult::Win));
    assert_eq!(a.bank, 2510);
    let b = snapshot.player("u2").unwrap();
    assert_eq!(b.hands[0].result, Some(HandResult::Push));
    assert_eq!(b.bank, 2500);
}

#[tokio::test(start_paused = true)]
async fn test_stale_deadline_after_manual_stand_is_ignored() {
    let fixture = dealt().await;

    advance(5).await;
    fixture
        .manager
        .player_action("c1", PlayerAction::Stand)
        .await
        .unwrap();
    assert_eq!(fixture.active().await.as_deref(), Some("u2"));

    // a's original deadline expires at 20s and must not touch b
    advance(16).await;
    assert_eq!(fixture.active().await.as_deref(), Some("u2"));
    assert_eq!(fixture.auto_stands(), 0);

    // b's own deadline is 20s after a stood
    advance(5).await;
    assert_eq!(fixture.auto_stands(), 1);
    let snapshot = fixture.manager.game_snapshot(&fixture.table_id).await.unwrap();
    assert_eq!(snapshot.status, RoundStatus::RoundEnd);
}

#[tokio::test(start_paused = true)]
async fn test_pause_stops_the_clock_until_resume() {
    let fixture = dealt().await;

    advance(5).await;
    fixture.manager.pause_table(&fixture.table_id).await.unwrap();
    let snapshot = fixture.manager.game_snapshot(&fixture.table_id).await.unwrap();
    assert_eq!(snapshot.turn_ends_at, None);
    assert_eq!(
        fixture.manager.player_action("c1", PlayerAction::Hit).await,
        Err(TableError::Paused)
    );

    advance(60).await;
    assert_eq!(fixture.active().await.as_deref(), Some("u1"));
    assert_eq!(fixture.auto_stands(), 0);

    fixture.manager.resume_table(&fixture.table_id).await.unwrap();
    assert!(fixture
        .manager
        .game_snapshot(&fixture.table_id)
        .await
        .and_then(|snapshot| snapshot.turn_ends_at)
        .is_some());

    advance(19).await;
    assert_eq!(fixture.active().await.as_deref(), Some("u1"));
    advance(2).await;
    assert_eq!(fixture.active().await.as_deref(), Some("u2"));
}

#[tokio::test(start_paused = true)]
async fn test_deadline_from_discarded_round_is_ignored() {
    let fixture = dealt().await;
    let manager = &fixture.manager;

    // a's deadline at 20s is still armed when the round is dropped
    advance(1).await;
    manager.force_end_round(&fixture.table_id).await.unwrap();
    advance(1).await;
    manager
        .update_table_config(&fixture.table_id, TableConfig::default())
        .await
        .unwrap();

    advance(1).await;
    let shoe = Shoe::stacked(6, &[Ten, Nine, Seven, Nine, Eight, Ten]);
    manager.replace_shoe(&fixture.table_id, shoe).await.unwrap();
    manager.start_round("c1").await.unwrap();
    assert_eq!(fixture.active().await.as_deref(), Some("u1"));

    advance(18).await;
    assert_eq!(fixture.active().await.as_deref(), Some("u1"));
    assert_eq!(fixture.auto_stands(), 0);

    // the new round's own deadline lands at 23s
    advance(3).await;
    assert_eq!(fixture.active().await.as_deref(), Some("u2"));
    assert_eq!(fixture.auto_stands(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_for_removed_table_is_inert() {
    let fixture = dealt().await;

    fixture.manager.disconnect("c1").await;
    fixture.manager.disconnect("c2").await;
    assert_eq!(fixture.manager.table_count().await, 0);

    assert!(!fixture.manager.fire_turn_timeout(&fixture.table_id, 1).await);
    advance(30).await;
    assert_eq!(fixture.auto_stands(), 0);
}
