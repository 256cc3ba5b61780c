//! Mock brokerage adapter and fixture builders, for this crate's own
//! tests and for downstream strategy crates (spec §1: a mock adapter is
//! in-scope so a strategy can be exercised without a live brokerage).
//!
//! Grounded in the teacher's `testing::mock_huginn::MockHuginnFeed`: a
//! programmable fake behind the same trait the real implementation
//! speaks, with explicit `push_*`/`set_*` knobs to script a scenario
//! rather than relying on randomness.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;

use crate::brokerage::{
    BrokerageAdapter, SubmitOutcome, UpdateRequest, WireBalance, WireDirection, WireOrder, WireOrderType, WirePosition, WireStatus,
};
use crate::error::ReconcilerErrorKind;
use crate::order::TimeInForce;

/// Programmable in-memory stand-in for a real brokerage connection.
///
/// Every `place_order` call is accepted and immediately recorded in `New`
/// status; the test then drives fills, rejections, and cancellations
/// through [`MockBrokerageAdapter::set_status`] / [`MockBrokerageAdapter::fill`]
/// rather than this adapter inventing behavior of its own.
pub struct MockBrokerageAdapter {
    orders: DashMap<String, WireOrder>,
    holdings: Mutex<Vec<WirePosition>>,
    balances: Mutex<Vec<WireBalance>>,
    next_id: AtomicU64,
    connected: std::sync::atomic::AtomicBool,
    /// If set, the next `place_order` call returns this outcome instead of
    /// accepting, and is then cleared.
    reject_next: Mutex<Option<Vec<String>>>,
}

impl MockBrokerageAdapter {
    pub fn new() -> Self {
        Self {
            orders: DashMap::new(),
            holdings: Mutex::new(Vec::new()),
            balances: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            connected: std::sync::atomic::AtomicBool::new(true),
            reject_next: Mutex::new(None),
        }
    }

    /// The next `place_order` call is rejected with `errors` instead of
    /// being accepted.
    pub fn reject_next_submission(&self, errors: Vec<String>) {
        *self.reject_next.lock().unwrap() = Some(errors);
    }

    /// Directly seeds an order into the mock's table, bypassing
    /// `place_order` — used to set up a scenario's starting state.
    pub fn seed_order(&self, order: WireOrder) {
        self.orders.insert(order.id.clone(), order);
    }

    pub fn set_holdings(&self, holdings: Vec<WirePosition>) {
        *self.holdings.lock().unwrap() = holdings;
    }

    pub fn set_cash_balances(&self, balances: Vec<WireBalance>) {
        *self.balances.lock().unwrap() = balances;
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Records a fill against a tracked order: advances `executed`,
    /// shrinks `remaining`, and flips to `Filled` once remaining hits zero
    /// (mirrors the sign/magnitude convention real wire orders use).
    pub fn fill(&self, brokerage_id: &str, fill_quantity: Decimal, fill_price: Decimal) {
        if let Some(mut order) = self.orders.get_mut(brokerage_id) {
            order.executed += fill_quantity;
            order.remaining -= fill_quantity;
            order.last_fill_price = fill_price;
            order.last_fill_quantity = fill_quantity;
            order.status = if order.remaining.is_zero() { WireStatus::Filled } else { WireStatus::PartiallyFilled };
            order.transaction_date = Utc::now();
        }
    }

    pub fn set_status(&self, brokerage_id: &str, status: WireStatus) {
        if let Some(mut order) = self.orders.get_mut(brokerage_id) {
            order.status = status;
            order.transaction_date = Utc::now();
        }
    }

    /// Removes an order from the mock's table entirely — simulates a
    /// brokerage that has no record at all of a given id (spec §4.4
    /// scenario 6, "unknown id").
    pub fn forget(&self, brokerage_id: &str) {
        self.orders.remove(brokerage_id);
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }
}

impl Default for MockBrokerageAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl BrokerageAdapter for MockBrokerageAdapter {
    async fn place_order(
        &self,
        symbol: &str,
        direction: WireDirection,
        order_type: WireOrderType,
        quantity: Decimal,
        _limit_price: Option<Decimal>,
        _stop_price: Option<Decimal>,
        _duration: TimeInForce,
    ) -> anyhow::Result<SubmitOutcome> {
        if let Some(errors) = self.reject_next.lock().unwrap().take() {
            return Ok(SubmitOutcome::Rejected { errors });
        }
        let id = format!("MOCK-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.orders.insert(
            id.clone(),
            WireOrder {
                id: id.clone(),
                symbol: symbol.to_string(),
                direction,
                order_type,
                status: WireStatus::New,
                quantity,
                remaining: quantity,
                executed: Decimal::ZERO,
                last_fill_price: Decimal::ZERO,
                last_fill_quantity: Decimal::ZERO,
                transaction_date: Utc::now(),
            },
        );
        Ok(SubmitOutcome::Accepted { brokerage_id: id })
    }

    async fn cancel_order(&self, brokerage_id: &str) -> anyhow::Result<()> {
        if let Some(mut order) = self.orders.get_mut(brokerage_id) {
            order.status = WireStatus::Canceled;
            order.transaction_date = Utc::now();
        }
        Ok(())
    }

    async fn update_order(&self, brokerage_id: &str, update: UpdateRequest) -> Result<(), ReconcilerErrorKind> {
        let mut order = self.orders.get_mut(brokerage_id).ok_or(ReconcilerErrorKind::NullResponse)?;
        if let Some(order_type) = update.order_type {
            order.order_type = crate::brokerage::convert_order_type(order_type);
        }
        Ok(())
    }

    async fn get_open_orders(&self) -> anyhow::Result<Vec<WireOrder>> {
        Ok(self
            .orders
            .iter()
            .filter(|o| !matches!(o.status, WireStatus::Filled | WireStatus::Canceled | WireStatus::Rejected | WireStatus::Expired))
            .map(|o| o.clone())
            .collect())
    }

    async fn get_order(&self, brokerage_id: &str) -> anyhow::Result<Option<WireOrder>> {
        Ok(self.orders.get(brokerage_id).map(|o| o.clone()))
    }

    async fn get_recent_orders(&self, statuses: &[WireStatus], since: DateTime<Utc>) -> anyhow::Result<Vec<WireOrder>> {
        Ok(self
            .orders
            .iter()
            .filter(|o| statuses.contains(&o.status) && o.transaction_date >= since)
            .map(|o| o.clone())
            .collect())
    }

    async fn get_holdings(&self) -> anyhow::Result<Vec<WirePosition>> {
        Ok(self.holdings.lock().unwrap().clone())
    }

    async fn get_cash_balances(&self) -> anyhow::Result<Vec<WireBalance>> {
        Ok(self.balances.lock().unwrap().clone())
    }

    async fn connect(&self) -> anyhow::Result<()> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> anyhow::Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Fixture builder for a plain market `WireOrder`, reducing scenario setup
/// to one line the way the teacher's `create_test_snapshot` does for
/// market data.
pub fn new_wire_order(id: &str, symbol: &str, direction: WireDirection, quantity: Decimal) -> WireOrder {
    WireOrder {
        id: id.to_string(),
        symbol: symbol.to_string(),
        direction,
        order_type: WireOrderType::Market,
        status: WireStatus::New,
        quantity,
        remaining: quantity,
        executed: Decimal::ZERO,
        last_fill_price: Decimal::ZERO,
        last_fill_quantity: Decimal::ZERO,
        transaction_date: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn place_order_is_accepted_and_tracked() {
        let mock = MockBrokerageAdapter::new();
        let outcome = mock
            .place_order("AAPL", WireDirection::OpenLong, WireOrderType::Market, dec!(10), None, None, TimeInForce::Day)
            .await
            .unwrap();
        let id = match outcome {
            SubmitOutcome::Accepted { brokerage_id } => brokerage_id,
            _ => panic!("expected acceptance"),
        };
        assert_eq!(mock.order_count(), 1);
        let fetched = mock.get_order(&id).await.unwrap().unwrap();
        assert_eq!(fetched.status, WireStatus::New);
    }

    #[tokio::test]
    async fn reject_next_submission_overrides_one_call() {
        let mock = MockBrokerageAdapter::new();
        mock.reject_next_submission(vec!["insufficient buying power".into()]);
        let outcome = mock
            .place_order("AAPL", WireDirection::OpenLong, WireOrderType::Market, dec!(10), None, None, TimeInForce::Day)
            .await
            .unwrap();
        assert!(matches!(outcome, SubmitOutcome::Rejected { .. }));

        // The override only applies once.
        let outcome2 = mock
            .place_order("AAPL", WireDirection::OpenLong, WireOrderType::Market, dec!(10), None, None, TimeInForce::Day)
            .await
            .unwrap();
        assert!(matches!(outcome2, SubmitOutcome::Accepted { .. }));
    }

    #[tokio::test]
    async fn fill_advances_toward_filled_status() {
        let mock = MockBrokerageAdapter::new();
        mock.seed_order(new_wire_order("M-1", "AAPL", WireDirection::OpenLong, dec!(10)));
        mock.fill("M-1", dec!(4), dec!(100));
        let order = mock.get_order("M-1").await.unwrap().unwrap();
        assert_eq!(order.status, WireStatus::PartiallyFilled);
        assert_eq!(order.remaining, dec!(6));

        mock.fill("M-1", dec!(6), dec!(101));
        let order = mock.get_order("M-1").await.unwrap().unwrap();
        assert_eq!(order.status, WireStatus::Filled);
    }

    #[tokio::test]
    async fn forgotten_order_is_unknown_to_get_order() {
        let mock = MockBrokerageAdapter::new();
        mock.seed_order(new_wire_order("M-2", "AAPL", WireDirection::OpenLong, dec!(1)));
        mock.forget("M-2");
        assert!(mock.get_order("M-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn get_open_orders_excludes_terminal_statuses() {
        let mock = MockBrokerageAdapter::new();
        mock.seed_order(new_wire_order("M-3", "AAPL", WireDirection::OpenLong, dec!(1)));
        mock.set_status("M-3", WireStatus::Canceled);
        assert!(mock.get_open_orders().await.unwrap().is_empty());
    }
}
