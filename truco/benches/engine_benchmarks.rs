use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use truco::{
    game::{Action, Deck, GameSession, SeededShuffle, TrucoResponse},
    wallet::{PlayerStats, Transaction, TransactionKind, TransactionStatus},
};

/// Play a dealt hand to the end with the timeout policy
fn play_out(mut session: GameSession) -> GameSession {
    while let Some((seat, action)) = session.timeout_action() {
        if session.apply(seat, action).is_err() {
            break;
        }
    }
    session
}

/// Benchmark shuffling and dealing with different seat counts
fn bench_deal(c: &mut Criterion) {
    let mut group = c.benchmark_group("deal");
    let shuffle = SeededShuffle::new(7);

    for seats in [2, 4, 6].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}_seats", seats)),
            seats,
            |b, &n| {
                b.iter(|| GameSession::deal(n, &shuffle).unwrap());
            },
        );
    }

    group.finish();
}

/// Benchmark a full hand played card by card
fn bench_full_hand(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_hand");
    let shuffle = SeededShuffle::new(11);

    for seats in [2, 6].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}_seats", seats)),
            seats,
            |b, &n| {
                b.iter_batched(
                    || GameSession::deal(n, &shuffle).unwrap(),
                    play_out,
                    criterion::BatchSize::SmallInput,
                );
            },
        );
    }

    group.finish();
}

/// Benchmark truco escalation up to twelve and a fold
fn bench_truco_escalation(c: &mut Criterion) {
    let shuffle = SeededShuffle::new(3);

    c.bench_function("truco_escalation", |b| {
        b.iter_batched(
            || GameSession::deal(2, &shuffle).unwrap(),
            |mut session| {
                session.apply(0, Action::CallTruco).unwrap();
                for seat in [1, 0, 1] {
                    session
                        .apply(
                            seat,
                            Action::RespondTruco {
                                response: TrucoResponse::Raise,
                            },
                        )
                        .unwrap();
                }
                session
                    .apply(
                        0,
                        Action::RespondTruco {
                            response: TrucoResponse::Fold,
                        },
                    )
                    .unwrap();
                session
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

/// Benchmark deck conservation check (runs after every action)
fn bench_conservation_check(c: &mut Criterion) {
    let session = GameSession::deal(6, &SeededShuffle::new(5)).unwrap();

    c.bench_function("conservation_check", |b| {
        b.iter(|| black_box(&session).check_conservation());
    });
}

/// Benchmark view generation (one per seat after every action)
fn bench_view_generation(c: &mut Criterion) {
    let session = GameSession::deal(4, &SeededShuffle::new(9)).unwrap();

    c.bench_function("view_generation_4_seats", |b| {
        b.iter(|| (0..4).map(|seat| session.view(Some(seat))).collect::<Vec<_>>());
    });
}

/// Benchmark player stats over a long history
fn bench_player_stats(c: &mut Criterion) {
    let history: Vec<Transaction> = (0..1000)
        .map(|i| Transaction {
            id: i,
            user_id: 1,
            kind: if i % 3 == 0 {
                TransactionKind::BetLoss
            } else {
                TransactionKind::BetWin
            },
            amount: if i % 3 == 0 { -10 } else { 18 },
            balance_after: 0,
            status: TransactionStatus::Completed,
            reason: "bench".to_string(),
            external_reference: None,
            created_at: chrono::Utc::now(),
        })
        .collect();

    c.bench_function("player_stats_1000_rows", |b| {
        b.iter(|| PlayerStats::from_transactions(&history, 18_000));
    });
}

/// Benchmark building and validating a deck
fn bench_deck_validation(c: &mut Criterion) {
    let cards = Deck::default().cards().to_vec();

    c.bench_function("deck_from_cards", |b| {
        b.iter(|| Deck::from_cards(black_box(cards.clone())).unwrap());
    });
}

criterion_group!(
    engine,
    bench_deal,
    bench_full_hand,
    bench_truco_escalation,
    bench_conservation_check,
);

criterion_group!(
    projections,
    bench_view_generation,
    bench_player_stats,
    bench_deck_validation,
);

criterion_main!(engine, projections);
