//! Benchmark: fill reconciliation tick overhead (spec §4.4).
//!
//! `FillReconciler::tick` runs on a fixed poll cadence regardless of
//! strategy activity, so its per-call cost bounds how many tracked orders
//! a single reconciliation loop can service within one interval. Uses a
//! `MockBrokerageAdapter` (so the benchmark measures reconciler-side work,
//! not network latency) driven through a single-threaded Tokio runtime
//! spun up once per sample, the way the teacher's own benches isolate
//! setup cost from the operation under measurement.

use std::sync::Arc;

use brokerage_core::brokerage::WireDirection;
use brokerage_core::contingent::ContingentQueue;
use brokerage_core::events::{error_event_channel, order_event_channel};
use brokerage_core::fees::FeeModel;
use brokerage_core::order::InternalOrderId;
use brokerage_core::reconciler::FillReconciler;
use brokerage_core::symbol::SymbolId;
use brokerage_core::testing::{new_wire_order, MockBrokerageAdapter};
use brokerage_core::transaction::TransactionManager;
use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use rust_decimal_macros::dec;

/// Builds a fresh adapter + reconciler pair with `tracked_orders` orders
/// registered in both, each already filled on the adapter side when
/// `pre_filled` is set — simulating the worst case where a single tick
/// must reconcile every tracked order at once.
fn build(tracked_orders: usize, pre_filled: bool) -> (Arc<MockBrokerageAdapter>, Arc<FillReconciler<MockBrokerageAdapter>>) {
    let adapter = Arc::new(MockBrokerageAdapter::new());
    let (event_tx, _event_rx) = order_event_channel(tracked_orders + 16);
    let (error_tx, _error_rx) = error_event_channel(tracked_orders + 16);
    let reconciler = Arc::new(FillReconciler::new(
        adapter.clone(),
        FeeModel::zero(),
        Arc::new(ContingentQueue::new()),
        Arc::new(TransactionManager::new(1_000_000)),
        event_tx,
        error_tx,
        Utc::now(),
    ));

    for i in 0..tracked_orders {
        let id = format!("B-{i}");
        adapter.seed_order(new_wire_order(&id, "AAPL", WireDirection::OpenLong, dec!(10)));
        reconciler.track(id.clone(), InternalOrderId(i as u64), SymbolId::from_index(0), dec!(10));
        if pre_filled {
            adapter.fill(&id, dec!(10), dec!(100));
        }
    }

    (adapter, reconciler)
}

fn bench_tick_idle(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap();
    let mut group = c.benchmark_group("reconciliation");
    group.sample_size(50);

    for size in [10, 100, 1_000] {
        let (_adapter, reconciler) = build(size, false);
        group.bench_function(format!("tick_idle_{size}_tracked"), |b| {
            b.iter(|| {
                rt.block_on(async { black_box(reconciler.tick(Utc::now()).await.unwrap()) });
            });
        });
    }

    group.finish();
}

fn bench_tick_all_filled(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap();
    let mut group = c.benchmark_group("reconciliation");
    group.sample_size(50);

    group.bench_function("tick_all_filled_100_tracked", |b| {
        b.iter_batched(
            || build(100, true),
            |(_adapter, reconciler)| {
                rt.block_on(async { black_box(reconciler.tick(Utc::now()).await.unwrap()) });
            },
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_tick_idle, bench_tick_all_filled);
criterion_main!(benches);
