use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use vlackjack::{
    Round, Shoe, TableConfig,
    game::{Card, Rank, Suit, compute_total, is_soft},
};

/// Helper to create a round with N seated players and nothing dealt
fn setup_round_with_players(n_players: usize) -> Round {
    let mut round = Round::new("bench", &TableConfig::default());
    let roster: Vec<(String, String)> = (0..n_players)
        .map(|i| (format!("player{i}"), format!("Player {i}")))
        .collect();
    round.sync_players(&roster);
    round
}

/// Stands every hand in seat order until the dealer has played
fn play_out(round: &mut Round) {
    while let Some(user_id) = round.active_seat().map(str::to_string) {
        if round.stand(&user_id, false).is_err() {
            break;
        }
    }
}

fn hand(ranks: &[Rank]) -> Vec<Card> {
    ranks
        .iter()
        .enumerate()
        .map(|(index, &rank)| Card {
            rank,
            suit: Suit::Spades,
            index,
        })
        .collect()
}

/// Benchmark totals of a two-card hand
fn bench_total_2_cards(c: &mut Criterion) {
    let cards = hand(&[Rank::Ace, Rank::Seven]);

    c.bench_function("total_2_cards", |b| {
        b.iter(|| (compute_total(&cards), is_soft(&cards)));
    });
}

/// Benchmark totals of a long hand with several aces to adjust
fn bench_total_many_aces(c: &mut Criterion) {
    let cards = hand(&[
        Rank::Ace,
        Rank::Ace,
        Rank::Two,
        Rank::Ace,
        Rank::Three,
        Rank::Ace,
        Rank::Four,
    ]);

    c.bench_function("total_many_aces", |b| {
        b.iter(|| compute_total(&cards));
    });
}

/// Benchmark drawing through a six-deck shoe, reshuffles included
fn bench_shoe_draw(c: &mut Criterion) {
    c.bench_function("shoe_draw_500", |b| {
        b.iter_batched(
            || Shoe::new(6),
            |mut shoe| {
                for _ in 0..500 {
                    shoe.draw();
                }
                shoe
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

/// Benchmark a full round with different player counts
fn bench_full_round(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_round");

    for n_players in [1, 4, 8].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}_players", n_players)),
            n_players,
            |b, &n| {
                b.iter_batched(
                    || setup_round_with_players(n),
                    |mut round| {
                        if round.start_round().is_ok() {
                            play_out(&mut round);
                        }
                        round
                    },
                    criterion::BatchSize::SmallInput,
                );
            },
        );
    }

    group.finish();
}

/// Benchmark snapshot generation mid-round
fn bench_snapshot(c: &mut Criterion) {
    let mut round = setup_round_with_players(8);
    let _ = round.start_round();

    c.bench_function("snapshot_8_players", |b| {
        b.iter(|| round.snapshot());
    });
}

criterion_group!(
    hand_totals,
    bench_total_2_cards,
    bench_total_many_aces,
    bench_shoe_draw,
);

criterion_group!(round_operations, bench_full_round, bench_snapshot);

criterion_main!(hand_totals, round_operations);
