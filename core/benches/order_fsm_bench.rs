//! Benchmark: per-brokerage-order typestate transition overhead.
//!
//! The state machine (spec §4.4) sits on the hot path of every fill poll;
//! this should compile down to plain struct field updates with no
//! allocation beyond the `String` id already carried by `BrokerOrderData`.

use brokerage_core::order_fsm::{BrokerOrderNew, BrokerOrderState, FillOutcome};
use brokerage_core::symbol::SymbolId;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rust_decimal_macros::dec;

fn bench_acknowledge_transition(c: &mut Criterion) {
    let mut group = c.benchmark_group("order_fsm");
    group.significance_level(0.01).sample_size(10_000);

    group.bench_function("new_to_submitted", |b| {
        b.iter(|| {
            let order = BrokerOrderNew::new("B-1".into(), SymbolId::from_index(0), dec!(10));
            black_box(order.acknowledge());
        });
    });

    group.finish();
}

fn bench_new_to_filled(c: &mut Criterion) {
    let mut group = c.benchmark_group("order_fsm");
    group.significance_level(0.01).sample_size(10_000);

    group.bench_function("new_to_filled", |b| {
        b.iter(|| {
            let order = BrokerOrderNew::new("B-1".into(), SymbolId::from_index(0), dec!(10));
            black_box(order.fill(dec!(10), dec!(100)).unwrap());
        });
    });

    group.finish();
}

fn bench_partial_then_full_fill(c: &mut Criterion) {
    let mut group = c.benchmark_group("order_fsm");
    group.significance_level(0.01).sample_size(10_000);

    group.bench_function("partial_then_full", |b| {
        b.iter(|| {
            let order = BrokerOrderNew::new("B-1".into(), SymbolId::from_index(0), dec!(10));
            let partial = match order.fill(dec!(4), dec!(100)).unwrap() {
                FillOutcome::PartiallyFilled(p) => p,
                FillOutcome::Filled(_) => panic!("expected partial fill"),
            };
            black_box(partial.fill(dec!(6), dec!(101)).unwrap());
        });
    });

    group.finish();
}

fn bench_100_partial_fills(c: &mut Criterion) {
    let mut group = c.benchmark_group("order_fsm");
    group.significance_level(0.01).sample_size(1_000);

    group.bench_function("100_partial_fills", |b| {
        b.iter(|| {
            let order = BrokerOrderNew::new("B-1".into(), SymbolId::from_index(0), dec!(1000));
            let mut current = match order.fill(dec!(1), dec!(100)).unwrap() {
                FillOutcome::PartiallyFilled(p) => p,
                FillOutcome::Filled(_) => panic!("expected partial fill"),
            };
            for _ in 0..98 {
                current = match current.fill(dec!(1), dec!(100)).unwrap() {
                    FillOutcome::PartiallyFilled(p) => p,
                    FillOutcome::Filled(_) => panic!("expected partial fill"),
                };
            }
            black_box(current.fill(dec!(901), dec!(100)).unwrap());
        });
    });

    group.finish();
}

fn bench_dynamic_dispatch_fill(c: &mut Criterion) {
    let mut group = c.benchmark_group("order_fsm");
    group.significance_level(0.01).sample_size(10_000);

    group.bench_function("dynamic_state_fill", |b| {
        b.iter(|| {
            let state = BrokerOrderState::New(BrokerOrderNew::new("B-1".into(), SymbolId::from_index(0), dec!(10)));
            black_box(state.fill(dec!(10), dec!(100)).unwrap());
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_acknowledge_transition,
    bench_new_to_filled,
    bench_partial_then_full_fill,
    bench_100_partial_fills,
    bench_dynamic_dispatch_fill,
);
criterion_main!(benches);
