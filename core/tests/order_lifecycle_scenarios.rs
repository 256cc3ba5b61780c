//! End-to-end order lifecycle scenarios spanning `OrderRouter`,
//! `TransactionManager`, `FillReconciler`, and `Portfolio` together.
//!
//! Each module already unit-tests its own math; these exercise the seams
//! between modules that a single-module test cannot reach.

use std::sync::Arc;

use brokerage_core::brokerage::WireDirection;
use brokerage_core::cash::CashBook;
use brokerage_core::contingent::ContingentQueue;
use brokerage_core::error::OrderErrorKind;
use brokerage_core::events::{error_event_channel, order_event_channel};
use brokerage_core::fees::FeeModel;
use brokerage_core::order::{OrderType, SubmitRequest};
use brokerage_core::order_fsm::OrderStatus;
use brokerage_core::portfolio::Portfolio;
use brokerage_core::reconciler::FillReconciler;
use brokerage_core::security::{ExchangeHours, ModelId, Security, SecurityArena, SymbolProperties};
use brokerage_core::symbol::{Symbol, SymbolId};
use brokerage_core::testing::{new_wire_order, MockBrokerageAdapter};
use brokerage_core::transaction::TransactionManager;
use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn arena_with_aapl() -> (SecurityArena, SymbolId) {
    let mut arena = SecurityArena::new();
    let id = arena.insert(Security {
        symbol: Symbol::equity("AAPL", "NASDAQ"),
        price: dec!(100),
        exchange_hours: ExchangeHours::always_open(),
        quote_currency: "USD".into(),
        properties: SymbolProperties::default(),
        tradable: true,
        has_data: true,
        fee_model: ModelId(0),
        margin_model: ModelId(0),
        settlement_model: ModelId(0),
        fill_model: ModelId(0),
    });
    (arena, id)
}

/// Scenario 1: flat AAPL, buy 10 @ 100. The router registers a valid
/// ticket, the reconciler discovers the brokerage fill on the next tick,
/// and the portfolio ends up long 10 @ average price 100.
#[tokio::test]
async fn simple_long_open_flows_from_submission_through_portfolio() {
    let (arena, symbol) = arena_with_aapl();
    let portfolio = Portfolio::new("USD");
    let transactions = Arc::new(TransactionManager::new(1000));
    let contingent = Arc::new(ContingentQueue::new());

    let router_cash_book = CashBook::new("USD");
    let request = SubmitRequest::market(symbol, dec!(10));
    let internal_id = {
        let orders_count = transactions.orders_count();
        let max_orders = transactions.maximum_orders();
        brokerage_core::router::pre_order_checks(&arena, &router_cash_book, symbol, &request, Utc::now(), orders_count, max_orders)
            .expect("valid submission");
        transactions.register(request)
    };

    let adapter = Arc::new(MockBrokerageAdapter::new());
    adapter.seed_order(new_wire_order("B-1", "AAPL", WireDirection::OpenLong, dec!(10)));

    let (event_tx, mut event_rx) = order_event_channel(16);
    let (error_tx, _error_rx) = error_event_channel(16);
    let reconciler = Arc::new(FillReconciler::new(
        adapter.clone(),
        FeeModel::zero(),
        contingent,
        transactions.clone(),
        event_tx,
        error_tx,
        Utc::now() - chrono::Duration::hours(1),
    ));
    reconciler.track("B-1".into(), internal_id, symbol, dec!(10));

    reconciler.tick(Utc::now()).await.unwrap();
    assert!(event_rx.try_recv().is_err(), "order still New on the brokerage side");

    adapter.fill("B-1", dec!(10), dec!(100));
    reconciler.tick(Utc::now()).await.unwrap();

    let event = event_rx.try_recv().expect("expected a Filled event");
    assert_eq!(event.status, OrderStatus::Filled);
    assert_eq!(event.fill_quantity, dec!(10));
    assert_eq!(event.fill_price, dec!(100));

    portfolio.process_fill(symbol, event.fill_quantity, event.fill_price, event.fee);
    portfolio.cash_book.add_cash("USD", -(event.fill_price * event.fill_quantity));

    let holding = portfolio.holding(symbol);
    assert_eq!(holding.quantity, dec!(10));
    assert_eq!(holding.average_price, dec!(100));
    assert_eq!(portfolio.cash_book.get("USD").unwrap().balance, dec!(-1000));

    let ticket = transactions.ticket(internal_id).unwrap();
    assert_eq!(ticket.status, OrderStatus::Filled);
    assert_eq!(ticket.filled_quantity, dec!(10));
}

/// Scenario 3: a zero-quantity submission is rejected by the pre-order
/// pipeline but still consumes a registry slot as an invalid ticket.
#[tokio::test]
async fn zero_quantity_submission_is_rejected_and_still_registered() {
    let (arena, symbol) = arena_with_aapl();
    let book = CashBook::new("USD");
    let router = brokerage_core::router::OrderRouter::new(100);

    let request = SubmitRequest::market(symbol, Decimal::ZERO);
    let internal_id = router.submit(&arena, &book, symbol, request, Utc::now());

    let ticket = router.transaction_manager.ticket(internal_id).unwrap();
    assert_eq!(ticket.status, OrderStatus::Invalid);
    assert_eq!(ticket.error, Some(OrderErrorKind::ZeroQuantity));
    assert_eq!(router.transaction_manager.orders_count(), 1);
}

/// Scenario 4: a MarketOnClose order submitted inside the 16-minute cutoff
/// before the next market close is rejected end-to-end through the router.
#[tokio::test]
async fn market_on_close_too_late_is_rejected_through_router() {
    let mut arena = SecurityArena::new();
    let symbol = arena.insert(Security {
        symbol: Symbol::equity("AAPL", "NASDAQ"),
        price: dec!(100),
        exchange_hours: ExchangeHours::standard_equity_market(0),
        quote_currency: "USD".into(),
        properties: SymbolProperties::default(),
        tradable: true,
        has_data: true,
        fee_model: ModelId(0),
        margin_model: ModelId(0),
        settlement_model: ModelId(0),
        fill_model: ModelId(0),
    });
    let book = CashBook::new("USD");
    let router = brokerage_core::router::OrderRouter::new(100);

    // 15:55 local, close at 16:00: inside the 16-minute cutoff.
    let now = Utc.with_ymd_and_hms(2026, 1, 6, 15, 55, 0).unwrap();
    let request = SubmitRequest::market(symbol, dec!(10)).with_type(OrderType::MarketOnClose);
    let internal_id = router.submit(&arena, &book, symbol, request, now);

    let ticket = router.transaction_manager.ticket(internal_id).unwrap();
    assert_eq!(ticket.error, Some(OrderErrorKind::MarketOnCloseOrderTooLate));
}

/// Scenario 2 end-to-end: crossing from long 5 to short 7 decomposes into
/// a closing child that registers immediately and an opening child that
/// waits in the contingent queue until the closing child reports Filled.
#[tokio::test]
async fn position_crossing_order_chains_through_contingent_queue() {
    let (arena, symbol) = arena_with_aapl();
    let book = CashBook::new("USD");
    let router = brokerage_core::router::OrderRouter::new(100);

    let intent = SubmitRequest::market(symbol, dec!(-12));
    let parent_id = router.submit_with_decomposition(&arena, &book, symbol, intent, dec!(5), Utc::now());

    let parent_ticket = router.transaction_manager.ticket(parent_id).unwrap();
    assert_eq!(parent_ticket.request.quantity, dec!(-5), "closing child flattens the existing long");
    assert!(router.contingent_queue.has_pending(parent_id));

    let opening_child = router.contingent_queue.dequeue_next(parent_id).unwrap();
    assert_eq!(opening_child.quantity, dec!(-7));
    assert!(!router.contingent_queue.has_pending(parent_id));
}
