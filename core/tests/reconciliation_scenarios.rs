//! Fill reconciliation scenarios that only show up once `FillReconciler`
//! is driven against a real `BrokerageAdapter` implementation end-to-end,
//! rather than the crate's own white-box test module.

use std::sync::Arc;
use std::time::Duration;

use brokerage_core::brokerage::{WireDirection, WireStatus};
use brokerage_core::contingent::ContingentQueue;
use brokerage_core::events::{error_event_channel, order_event_channel};
use brokerage_core::fees::FeeModel;
use brokerage_core::order::InternalOrderId;
use brokerage_core::order_fsm::OrderStatus;
use brokerage_core::reconciler::FillReconciler;
use brokerage_core::symbol::SymbolId;
use brokerage_core::testing::{new_wire_order, MockBrokerageAdapter};
use brokerage_core::transaction::TransactionManager;
use chrono::Utc;
use rust_decimal_macros::dec;

/// Scenario 5: the brokerage cancels an order out-of-band (e.g. the trader
/// cancels it through the brokerage's own UI). `get_open_orders` no longer
/// returns it, so the reconciler must fall back to a single-order lookup
/// to discover the Canceled status.
#[tokio::test]
async fn out_of_band_cancel_is_discovered_via_single_order_lookup() {
    let adapter = Arc::new(MockBrokerageAdapter::new());
    let (event_tx, mut event_rx) = order_event_channel(16);
    let (error_tx, _error_rx) = error_event_channel(16);
    let reconciler = Arc::new(FillReconciler::new(
        adapter.clone(),
        FeeModel::zero(),
        Arc::new(ContingentQueue::new()),
        Arc::new(TransactionManager::new(1000)),
        event_tx,
        error_tx,
        Utc::now() - chrono::Duration::hours(1),
    ));

    adapter.seed_order(new_wire_order("B-5", "AAPL", WireDirection::OpenLong, dec!(10)));
    reconciler.track("B-5".into(), InternalOrderId(1), SymbolId::from_index(0), dec!(10));
    reconciler.tick(Utc::now()).await.unwrap();
    assert!(event_rx.try_recv().is_err());

    // `get_open_orders` filters out terminal statuses, so this cancel is
    // invisible to the bulk fetch; only `get_order` sees it.
    adapter.set_status("B-5", WireStatus::Canceled);
    reconciler.tick(Utc::now()).await.unwrap();

    let event = event_rx.try_recv().expect("expected a Canceled event via single-order fallback");
    assert_eq!(event.status, OrderStatus::Canceled);
    assert_eq!(reconciler.cached_len(), 0);
    assert_eq!(reconciler.filled_ring_len(), 1);
}

/// Scenario 6: the brokerage reports an order id the engine never
/// submitted and never resolves it (no direct lookup hit, not in the
/// recently-rejected window). After the deferred verification delay this
/// must surface as a fatal `UnknownOrderId` error.
#[tokio::test]
async fn persistently_unknown_id_surfaces_as_fatal_error() {
    let adapter = Arc::new(MockBrokerageAdapter::new());
    let (event_tx, _event_rx) = order_event_channel(16);
    let (error_tx, mut error_rx) = error_event_channel(16);
    let reconciler = Arc::new(FillReconciler::new(
        adapter.clone(),
        FeeModel::zero(),
        Arc::new(ContingentQueue::new()),
        Arc::new(TransactionManager::new(1000)),
        event_tx,
        error_tx,
        Utc::now() - chrono::Duration::hours(1),
    ));

    adapter.seed_order(new_wire_order("B-GHOST", "AAPL", WireDirection::OpenLong, dec!(1)));
    reconciler.tick(Utc::now()).await.unwrap();

    // Remove it entirely before the deferred verification pass runs, so
    // the direct `get_order` lookup and the recently-rejected window both
    // come back empty: truly unresolvable.
    adapter.forget("B-GHOST");

    let fatal = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = error_rx.recv().await.expect("error channel closed");
            if event.is_fatal() {
                return event;
            }
        }
    })
    .await
    .expect("expected a fatal error within the deferred verification window");

    assert_eq!(fatal.code, "UnknownOrderId");
}
