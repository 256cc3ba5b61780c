//! Logical order types: the instruction a strategy issues, the ticket it
//! gets back, and the events that update it (spec §3).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::order_fsm::OrderStatus;
use crate::symbol::SymbolId;

/// Monotonically assigned identifier for a logical (strategy-facing) order.
/// Unlike the teacher's `OrderId` (random u128, timestamp+rng+counter
/// packed for zero-allocation uniqueness across threads with no shared
/// counter), this core has exactly one allocator — the Transaction
/// Manager — so a plain `AtomicU64` counter is simpler and still unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[repr(transparent)]
pub struct InternalOrderId(pub u64);

impl std::fmt::Display for InternalOrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ord#{}", self.0)
    }
}

/// Order variant tag (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum OrderType {
    Market,
    MarketOnOpen,
    MarketOnClose,
    Limit,
    StopMarket,
    StopLimit,
}

impl OrderType {
    /// Position-crossing decomposition converts a stop component to its
    /// base type on the opening child (spec §4.3).
    pub fn to_base_type(self) -> Self {
        match self {
            OrderType::StopMarket => OrderType::Market,
            OrderType::StopLimit => OrderType::Limit,
            other => other,
        }
    }

    pub fn has_stop(self) -> bool {
        matches!(self, OrderType::StopMarket | OrderType::StopLimit)
    }

    pub fn has_limit(self) -> bool {
        matches!(self, OrderType::Limit | OrderType::StopLimit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TimeInForce {
    Day,
    GoodTilCanceled,
}

/// A registered request to submit an order, as handed to the Transaction
/// Manager by the router after the pre-order check pipeline passes.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub symbol: SymbolId,
    /// Signed; positive = buy, negative = sell.
    pub quantity: Decimal,
    pub order_type: OrderType,
    pub limit_price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub duration: TimeInForce,
    pub tag: String,
    pub asynchronous: bool,
}

impl SubmitRequest {
    pub fn market(symbol: SymbolId, quantity: Decimal) -> Self {
        Self {
            symbol,
            quantity,
            order_type: OrderType::Market,
            limit_price: None,
            stop_price: None,
            duration: TimeInForce::Day,
            tag: String::new(),
            asynchronous: false,
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    pub fn with_type(mut self, order_type: OrderType) -> Self {
        self.order_type = order_type;
        self
    }

    pub fn with_limit_price(mut self, price: Decimal) -> Self {
        self.limit_price = Some(price);
        self
    }

    pub fn with_stop_price(mut self, price: Decimal) -> Self {
        self.stop_price = Some(price);
        self
    }
}

/// A logical instruction, assigned an internal id and zero, one, or two
/// brokerage ids (two only for a zero-crossing order's closing/opening
/// children, spec §4.3).
#[derive(Debug, Clone)]
pub struct Order {
    pub internal_id: InternalOrderId,
    pub symbol: SymbolId,
    pub quantity: Decimal,
    pub limit_price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub order_type: OrderType,
    pub duration: TimeInForce,
    pub submitted_utc: DateTime<Utc>,
    pub tag: String,
    pub brokerage_ids: Vec<String>,
}

/// An immutable record of a state transition on one logical order
/// (spec §3). `status` reuses the brokerage order FSM's tag set plus
/// `New`, which both enumerations already share.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct OrderEvent {
    pub internal_order_id: InternalOrderId,
    pub utc_time: DateTime<Utc>,
    pub status: OrderStatus,
    pub fill_price: Decimal,
    pub fill_quantity: Decimal,
    pub fee: Decimal,
    pub message: String,
}

impl OrderEvent {
    pub fn new(internal_order_id: InternalOrderId, status: OrderStatus, utc_time: DateTime<Utc>) -> Self {
        Self {
            internal_order_id,
            utc_time,
            status,
            fill_price: Decimal::ZERO,
            fill_quantity: Decimal::ZERO,
            fee: Decimal::ZERO,
            message: String::new(),
        }
    }

    pub fn with_fill(mut self, fill_price: Decimal, fill_quantity: Decimal) -> Self {
        self.fill_price = fill_price;
        self.fill_quantity = fill_quantity;
        self
    }

    pub fn with_fee(mut self, fee: Decimal) -> Self {
        self.fee = fee;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

/// The handle returned to the strategy. Mutated only by the Transaction
/// Manager (spec §3, §4.9).
#[derive(Debug, Clone)]
pub struct OrderTicket {
    pub internal_id: InternalOrderId,
    pub status: OrderStatus,
    pub filled_quantity: Decimal,
    pub average_fill_price: Decimal,
    pub request: SubmitRequest,
    /// Populated only when `status == Invalid`.
    pub error: Option<crate::error::OrderErrorKind>,
}

impl OrderTicket {
    pub fn new(internal_id: InternalOrderId, request: SubmitRequest) -> Self {
        Self {
            internal_id,
            status: OrderStatus::New,
            filled_quantity: Decimal::ZERO,
            average_fill_price: Decimal::ZERO,
            request,
            error: None,
        }
    }

    pub fn invalid(internal_id: InternalOrderId, request: SubmitRequest, error: crate::error::OrderErrorKind) -> Self {
        Self {
            internal_id,
            status: OrderStatus::Invalid,
            filled_quantity: Decimal::ZERO,
            average_fill_price: Decimal::ZERO,
            request,
            error: Some(error),
        }
    }

    /// Apply an event's fill to this ticket's running average-price
    /// tracking. `event.fill_quantity`/`fill_price` follow the reconciler's
    /// sign and lossy-single-price conventions (spec §4.4, §9).
    pub fn apply_event(&mut self, event: &OrderEvent) {
        self.status = event.status;
        if !event.fill_quantity.is_zero() {
            let prior_notional = self.average_fill_price * self.filled_quantity;
            let new_notional = event.fill_price * event.fill_quantity;
            self.filled_quantity += event.fill_quantity;
            if !self.filled_quantity.is_zero() {
                self.average_fill_price = (prior_notional + new_notional) / self.filled_quantity;
            }
        }
    }
}
