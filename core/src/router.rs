//! Order Router: the strategy-facing entry point, the pre-order check
//! pipeline, and the target-quantity sizing algorithm (spec §4.1, §4.2).
//!
//! Grounded in the teacher's strategy-facing `Engine` driver loop, which
//! owns the same pattern of "validate, then hand off to a registry,
//! return a handle" — here generalized from a single in-process matching
//! step to a pipeline of ten independent checks plus zero-crossing
//! decomposition.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::cash::CashBook;
use crate::contingent::{decompose_if_crossing, ContingentQueue};
use crate::error::OrderErrorKind;
use crate::order::{InternalOrderId, OrderType, SubmitRequest};
use crate::portfolio::Portfolio;
use crate::security::SecurityArena;
use crate::symbol::SymbolId;
use crate::transaction::TransactionManager;

/// Maximum iterations of the target-quantity shrink loop (spec §9 Open
/// Question, resolved): exceeding this returns the last feasible `n`
/// found, logged at `warn`.
pub const MAX_SIZING_ITERATIONS: u32 = 64;

/// Minutes before `nextMarketClose` after which a MarketOnClose submission
/// is rejected (spec §4.2 check 10).
pub const MARKET_ON_CLOSE_CUTOFF_MINUTES: i64 = 16;

/// Runs the ten-check pre-order pipeline in order; returns the first
/// failing check's error kind (spec §4.2).
pub fn pre_order_checks(
    arena: &SecurityArena,
    cash_book: &CashBook,
    symbol: SymbolId,
    request: &SubmitRequest,
    now_utc: chrono::DateTime<chrono::Utc>,
    orders_count: u64,
    max_orders: u64,
) -> Result<(), OrderErrorKind> {
    // 1. Security exists in the subscribed set.
    let security = arena.get(symbol).ok_or(OrderErrorKind::MissingSecurity)?;

    // 2. |quantity| >= lotSize, quantity != 0, symbol non-empty.
    if request.quantity.is_zero() || request.quantity.abs() < Decimal::from(security.properties.lot_size) {
        return Err(OrderErrorKind::ZeroQuantity);
    }
    if security.symbol.ticker.is_empty() {
        return Err(OrderErrorKind::MissingSecurity);
    }

    // 3. Security is marked tradable.
    if !security.tradable {
        return Err(OrderErrorKind::NonTradableSecurity);
    }

    // 4. For MarketOnClose: exchange is currently open.
    if request.order_type == OrderType::MarketOnClose && !security.exchange_hours.is_open(now_utc) {
        return Err(OrderErrorKind::ExchangeNotOpen);
    }

    // 5. Security's price is strictly positive.
    if security.price <= Decimal::ZERO {
        return Err(OrderErrorKind::SecurityPriceZero);
    }

    // 6 & 7. Quote/forex-base currency checks.
    cash_book.validate_for_order(&security.symbol, &security.quote_currency)?;

    // 8. Security has at least one data point.
    if !security.has_data {
        return Err(OrderErrorKind::SecurityHasNoData);
    }

    // 9. Total orders submitted this run <= maxOrders.
    if orders_count >= max_orders {
        return Err(OrderErrorKind::ExceededMaximumOrders);
    }

    // 10. For MarketOnClose: now <= nextMarketClose - 16 minutes.
    if request.order_type == OrderType::MarketOnClose {
        let next_close = security.exchange_hours.next_market_close(now_utc);
        let cutoff = next_close - chrono::Duration::minutes(MARKET_ON_CLOSE_CUTOFF_MINUTES);
        if now_utc > cutoff {
            return Err(OrderErrorKind::MarketOnCloseOrderTooLate);
        }
    }

    Ok(())
}

/// Per-unit price used by the sizing algorithm: the security's current
/// price times its contract multiplier (spec §4.1.1 `unitPrice`).
fn unit_price(arena: &SecurityArena, symbol: SymbolId) -> Decimal {
    arena
        .get(symbol)
        .map(|s| s.price * Decimal::from(s.properties.contract_multiplier))
        .unwrap_or(Decimal::ZERO)
}

/// Target-quantity algorithm (spec §4.1.1). `fee_per_unit` approximates
/// the marginal fee of one additional unit, used only by the shrink loop's
/// fee-dominant step.
#[allow(clippy::too_many_arguments)]
pub fn target_quantity(
    arena: &SecurityArena,
    portfolio: &Portfolio,
    symbol: SymbolId,
    fraction: Decimal,
    current_quantity: Decimal,
    exchange_open: bool,
    fee_per_unit: Decimal,
) -> Decimal {
    let security = match arena.get(symbol) {
        Some(s) => s,
        None => return Decimal::ZERO,
    };
    let price = security.price;
    if price.is_zero() {
        return Decimal::ZERO;
    }
    if fraction.is_zero() {
        return -current_quantity;
    }

    let total_portfolio_value = portfolio.total_portfolio_value();
    let target_value = fraction * total_portfolio_value;
    let current_value = price * current_quantity;
    let delta_value = (target_value - current_value).abs();
    let dir = if target_value >= current_value { Decimal::ONE } else { -Decimal::ONE };

    let unit = unit_price(arena, symbol);
    if unit.is_zero() {
        return Decimal::ZERO;
    }

    let margin_avail = portfolio.margin_remaining_for_order(symbol, dir, exchange_open);
    if margin_avail <= Decimal::ZERO {
        return Decimal::ZERO;
    }

    let mut n = (delta_value / unit).floor();
    let mut iterations = 0u32;
    loop {
        let margin_required = n * unit;
        let cost_fits = n * unit + fee_per_unit <= delta_value;
        if margin_required <= margin_avail && cost_fits {
            break;
        }
        if n <= Decimal::ZERO {
            break;
        }
        iterations += 1;
        if iterations > MAX_SIZING_ITERATIONS {
            warn!(symbol = %symbol, iterations, "target quantity sizing did not converge, using last feasible n");
            break;
        }
        // Shrink by 1, or faster when the fee dominates the remaining slack.
        let shrink = if fee_per_unit > Decimal::ZERO && unit > Decimal::ZERO {
            (fee_per_unit / unit).ceil().max(Decimal::ONE)
        } else {
            Decimal::ONE
        };
        n -= shrink;
    }
    n = n.max(Decimal::ZERO);

    // Round down to the nearest multiple of lotSize.
    let lot_size = Decimal::from(security.properties.lot_size);
    if lot_size > Decimal::ONE {
        n = (n / lot_size).floor() * lot_size;
    }

    dir * n
}

/// Strategy-facing entry point: validation, sizing, decomposition, and
/// registration. Owns the lock that `setMaximumOrders` respects (spec
/// §4.1 "effective only before the algorithm is locked").
pub struct OrderRouter {
    pub transaction_manager: Arc<TransactionManager>,
    pub contingent_queue: Arc<ContingentQueue>,
    locked: AtomicBool,
    next_tag_id: AtomicU64,
}

impl OrderRouter {
    pub fn new(max_orders: u64) -> Self {
        Self {
            transaction_manager: Arc::new(TransactionManager::new(max_orders)),
            contingent_queue: Arc::new(ContingentQueue::new()),
            locked: AtomicBool::new(false),
            next_tag_id: AtomicU64::new(1),
        }
    }

    /// Builds a router sharing an existing registry and contingent queue —
    /// the reconciler is constructed against the same two instances so
    /// chaining (spec §4.4) and ticket updates land on the router's view
    /// of the world.
    pub fn with_shared(transaction_manager: Arc<TransactionManager>, contingent_queue: Arc<ContingentQueue>) -> Self {
        Self {
            transaction_manager,
            contingent_queue,
            locked: AtomicBool::new(false),
            next_tag_id: AtomicU64::new(1),
        }
    }

    pub fn lock(&self) {
        self.locked.store(true, Ordering::SeqCst);
    }

    /// `setMaximumOrders(n)` (spec §4.1): effective only before the
    /// algorithm is locked.
    pub fn set_maximum_orders(&self, n: u64) -> bool {
        if self.locked.load(Ordering::SeqCst) {
            return false;
        }
        self.transaction_manager.set_maximum_orders(n);
        true
    }

    /// Runs the pipeline and either registers a valid ticket or an invalid
    /// one; in both cases a slot in the registry is consumed (spec §4.2).
    pub fn submit(
        &self,
        arena: &SecurityArena,
        cash_book: &CashBook,
        symbol: SymbolId,
        request: SubmitRequest,
        now_utc: chrono::DateTime<chrono::Utc>,
    ) -> InternalOrderId {
        let orders_count = self.transaction_manager.orders_count();
        let max_orders = self.transaction_manager.maximum_orders();
        match pre_order_checks(arena, cash_book, symbol, &request, now_utc, orders_count, max_orders) {
            Ok(()) => {
                if orders_count + 1 >= max_orders {
                    warn!("approaching maxOrders limit; algorithm will stop accepting new submissions");
                }
                self.transaction_manager.register(request)
            }
            Err(kind) => {
                warn!(?kind, "pre-order check rejected submission");
                self.transaction_manager.register_invalid(request, kind)
            }
        }
    }

    /// `order(symbol, qty, asynchronous, tag)` (spec §4.1): rewrites to
    /// MarketOnOpen when the exchange is closed and every subscription for
    /// the symbol is daily-resolution. This core does not model data
    /// subscriptions directly, so the rewrite decision is taken as an
    /// explicit parameter from the caller (the strategy-facing layer knows
    /// its own subscription resolutions).
    #[allow(clippy::too_many_arguments)]
    pub fn order(
        &self,
        arena: &SecurityArena,
        cash_book: &CashBook,
        symbol: SymbolId,
        quantity: Decimal,
        exchange_open: bool,
        daily_resolution_only: bool,
        tag: &str,
        now_utc: chrono::DateTime<chrono::Utc>,
    ) -> InternalOrderId {
        let order_type = if !exchange_open && daily_resolution_only {
            info!(symbol = %symbol, "exchange closed and subscriptions are daily-only, rewriting to MarketOnOpen");
            OrderType::MarketOnOpen
        } else {
            OrderType::Market
        };
        let request = SubmitRequest::market(symbol, quantity).with_type(order_type).with_tag(tag);
        self.submit(arena, cash_book, symbol, request, now_utc)
    }

    /// `liquidate(symbol?)` (spec §4.1): cancels non-market open orders for
    /// the target symbol(s) and submits a single closing market order.
    /// Cancellation of brokerage-side open orders is the caller's (the
    /// reconciler's) responsibility; this returns the set of symbols that
    /// need a closing submission plus their signed quantity.
    pub fn liquidation_targets(&self, portfolio: &Portfolio, symbol: Option<SymbolId>) -> Vec<(SymbolId, Decimal)> {
        let holdings = portfolio.holdings_snapshot();
        let open_orders = self.transaction_manager.open_orders(symbol);
        holdings
            .into_iter()
            .filter(|h| symbol.map(|s| s == h.symbol).unwrap_or(true))
            .filter_map(|h| {
                let open_market_remaining: Decimal = open_orders
                    .iter()
                    .filter(|t| t.request.symbol == h.symbol && t.request.order_type == OrderType::Market)
                    .map(|t| t.request.quantity - t.filled_quantity)
                    .sum();
                let closing_quantity = -(h.quantity + open_market_remaining);
                if closing_quantity.is_zero() {
                    None
                } else {
                    Some((h.symbol, closing_quantity))
                }
            })
            .collect()
    }

    /// `setHoldings(symbol, fraction, liquidateExisting, tag)` (spec §4.1).
    /// Returns the internal id of the submitted market order, if any.
    #[allow(clippy::too_many_arguments)]
    pub fn set_holdings(
        &self,
        arena: &SecurityArena,
        cash_book: &CashBook,
        portfolio: &Portfolio,
        symbol: SymbolId,
        fraction: Decimal,
        exchange_open: bool,
        fee_per_unit: Decimal,
        tag: &str,
        now_utc: chrono::DateTime<chrono::Utc>,
    ) -> Option<InternalOrderId> {
        let current = portfolio.holding(symbol).quantity;
        let target = target_quantity(arena, portfolio, symbol, fraction, current, exchange_open, fee_per_unit);
        if target.is_zero() {
            return None;
        }
        let request = SubmitRequest::market(symbol, target).with_tag(tag);
        Some(self.submit(arena, cash_book, symbol, request, now_utc))
    }

    /// Decomposes `request` into closing/opening children if it crosses
    /// zero against `current_holdings`, registers the closing child
    /// immediately, and enqueues the opening child in the contingent queue
    /// (spec §4.3).
    pub fn submit_with_decomposition(
        &self,
        arena: &SecurityArena,
        cash_book: &CashBook,
        symbol: SymbolId,
        request: SubmitRequest,
        current_holdings: Decimal,
        now_utc: chrono::DateTime<chrono::Utc>,
    ) -> InternalOrderId {
        match decompose_if_crossing(&request, current_holdings) {
            Some(decomposition) => {
                let parent = self.submit(arena, cash_book, symbol, decomposition.closing_child, now_utc);
                self.contingent_queue.create(parent, decomposition.opening_child);
                parent
            }
            None => self.submit(arena, cash_book, symbol, request, now_utc),
        }
    }

    /// Single-outstanding-symbol rule (spec §4.3): true if `symbol` already
    /// has an open, brokerage-tracked order and a new submission should
    /// first attempt to cancel it.
    pub fn has_conflicting_open_order(&self, symbol: SymbolId) -> bool {
        self.transaction_manager.has_open_order_for_symbol(symbol)
    }

    pub fn fresh_tag(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.next_tag_id.fetch_add(1, Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::{ExchangeHours, ModelId, Security, SymbolProperties};
    use crate::symbol::Symbol;
    use chrono::TimeZone;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn arena_with_one_security() -> (SecurityArena, SymbolId) {
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

    #[test]
    fn pre_order_checks_reject_zero_quantity_below_lot() {
        let (arena, id) = arena_with_one_security();
        let book = CashBook::new("USD");
        let req = SubmitRequest::market(id, dec!(0.5));
        let err = pre_order_checks(&arena, &book, id, &req, Utc::now(), 0, 100).unwrap_err();
        assert_eq!(err, OrderErrorKind::ZeroQuantity);
    }

    #[test]
    fn pre_order_checks_reject_market_on_close_too_late() {
        let mut arena = SecurityArena::new();
        let hours = ExchangeHours::standard_equity_market(0);
        let id = arena.insert(Security {
            symbol: Symbol::equity("AAPL", "NASDAQ"),
            price: dec!(100),
            exchange_hours: hours,
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
        let req = SubmitRequest::market(id, dec!(10)).with_type(OrderType::MarketOnClose);
        // 15:55 local, close at 16:00: inside the 16-minute cutoff.
        let now = Utc.with_ymd_and_hms(2026, 1, 6, 15, 55, 0).unwrap();
        let err = pre_order_checks(&arena, &book, id, &req, now, 0, 100).unwrap_err();
        assert_eq!(err, OrderErrorKind::MarketOnCloseOrderTooLate);
    }

    #[test]
    fn pre_order_checks_pass_for_valid_market_order() {
        let (arena, id) = arena_with_one_security();
        let book = CashBook::new("USD");
        let req = SubmitRequest::market(id, dec!(10));
        assert!(pre_order_checks(&arena, &book, id, &req, Utc::now(), 0, 100).is_ok());
    }

    #[test]
    fn submit_registers_invalid_ticket_on_rejection() {
        let (arena, id) = arena_with_one_security();
        let book = CashBook::new("USD");
        let router = OrderRouter::new(100);
        let req = SubmitRequest::market(id, Decimal::ZERO);
        let ticket_id = router.submit(&arena, &book, id, req, Utc::now());
        let ticket = router.transaction_manager.ticket(ticket_id).unwrap();
        assert_eq!(ticket.error, Some(OrderErrorKind::ZeroQuantity));
    }

    #[test]
    fn set_maximum_orders_rejected_once_locked() {
        let router = OrderRouter::new(100);
        router.lock();
        assert!(!router.set_maximum_orders(50));
        assert_eq!(router.transaction_manager.maximum_orders(), 100);
    }

    #[test]
    fn target_quantity_returns_zero_when_margin_unavailable() {
        let (arena, id) = arena_with_one_security();
        let portfolio = Portfolio::new("USD");
        // No cash, no margin model registered: free margin is zero.
        let target = target_quantity(&arena, &portfolio, id, dec!(0.5), Decimal::ZERO, true, Decimal::ZERO);
        assert_eq!(target, Decimal::ZERO);
    }

    #[test]
    fn target_quantity_full_liquidation_when_fraction_zero() {
        let (arena, id) = arena_with_one_security();
        let portfolio = Portfolio::new("USD");
        let target = target_quantity(&arena, &portfolio, id, Decimal::ZERO, dec!(10), true, Decimal::ZERO);
        assert_eq!(target, dec!(-10));
    }
}
