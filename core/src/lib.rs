//! Brokerage order lifecycle core: submission, a per-order finite state
//! machine, position-crossing decomposition into contingent orders,
//! polling-based fill reconciliation against a brokerage, settlement-aware
//! cash tracking, and the ambient configuration/metrics/logging/persistence
//! surface around all of it.
//!
//! Grounded throughout in the teacher's `bog-core` crate: a single
//! workspace member exposing its engine pieces as public modules rather
//! than behind one facade type, with a thin [`Engine`] at the crate root
//! that wires the pieces that must share state (the order registry and
//! contingent queue are constructed once and shared between the router
//! that creates them and the reconciler that consumes them).

pub mod brokerage;
pub mod cash;
pub mod config;
pub mod contingent;
pub mod error;
pub mod events;
pub mod fees;
pub mod logging;
pub mod metrics;
pub mod order;
pub mod order_fsm;
pub mod persistence;
pub mod portfolio;
pub mod ratelimit;
pub mod reconciler;
pub mod retry;
pub mod router;
pub mod security;
pub mod settlement;
pub mod symbol;
pub mod transaction;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

use std::sync::Arc;

use chrono::Utc;

use crate::brokerage::BrokerageAdapter;
use crate::config::EngineConfig;
use crate::contingent::ContingentQueue;
use crate::events::{error_event_channel, order_event_channel, ErrorEvent, DEFAULT_EVENT_CHANNEL_CAPACITY};
use crate::fees::FeeModel;
use crate::order::OrderEvent;
use crate::reconciler::FillReconciler;
use crate::router::OrderRouter;
use crate::transaction::TransactionManager;

/// Owns the pieces of a running engine that must agree on the same
/// [`TransactionManager`] and [`ContingentQueue`] instances: the
/// [`OrderRouter`] a strategy submits through, and the [`FillReconciler`]
/// that polls the brokerage and applies fills against that same registry.
///
/// Constructing these independently (each calling its own `new`) would
/// give the router and reconciler disjoint views of open tickets and
/// pending contingent children, so [`Engine::new`] is the one place that
/// builds the shared `Arc`s and threads them into both.
pub struct Engine<A: BrokerageAdapter> {
    pub router: OrderRouter,
    pub reconciler: Arc<FillReconciler<A>>,
    pub order_events: tokio::sync::mpsc::Receiver<OrderEvent>,
    pub error_events: tokio::sync::mpsc::Receiver<ErrorEvent>,
}

impl<A: BrokerageAdapter + 'static> Engine<A> {
    pub fn new(adapter: Arc<A>, fee_model: FeeModel, config: &EngineConfig) -> Self {
        let transaction_manager = Arc::new(TransactionManager::new(config.risk.max_orders));
        let contingent_queue = Arc::new(ContingentQueue::new());

        let router = OrderRouter::with_shared(transaction_manager.clone(), contingent_queue.clone());

        let (event_tx, order_events) = order_event_channel(DEFAULT_EVENT_CHANNEL_CAPACITY);
        let (error_tx, error_events) = error_event_channel(DEFAULT_EVENT_CHANNEL_CAPACITY);

        let reconciler = Arc::new(FillReconciler::new(
            adapter,
            fee_model,
            contingent_queue,
            transaction_manager,
            event_tx,
            error_tx,
            Utc::now(),
        ));

        Self {
            router,
            reconciler,
            order_events,
            error_events,
        }
    }

    /// Runs the reconciliation poll loop at `config.reconciliation.poll_interval`
    /// until the process is torn down. Intended to be spawned as its own
    /// task by the strategy runner (spec §4.4: the reconciler ticks on a
    /// fixed cadence independent of strategy activity).
    pub async fn run_reconciliation_loop(reconciler: Arc<FillReconciler<A>>, poll_interval: std::time::Duration) {
        let mut ticker = tokio::time::interval(poll_interval);
        loop {
            ticker.tick().await;
            if let Err(err) = reconciler.tick(Utc::now()).await {
                tracing::warn!(error = %err, "reconciliation tick failed");
            }
        }
    }
}
