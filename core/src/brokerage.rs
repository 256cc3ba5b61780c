//! Brokerage adapter: the abstract wire contract and the internal↔wire
//! translation tables (spec §4.5, §6).
//!
//! The `Executor` trait shape (placement/cancel/fills/status as the seam
//! between engine and backend) is grounded in the teacher's
//! `execution::Executor`, generalized from a synchronous in-process
//! simulator interface to an async, network-calling one — this core polls
//! a real brokerage over HTTP rather than stepping a simulated fill queue.
//! The `ConnectionState` typestate is grounded in `core::connection_fsm`.

use rust_decimal::Decimal;

use crate::error::ReconcilerErrorKind;
use crate::order::{OrderType, TimeInForce};

/// Order type as understood by the wire protocol. MarketOnOpen and
/// MarketOnClose both collapse to `Market` at the wire (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireOrderType {
    Market,
    Limit,
    Stop,
    StopLimit,
}

pub fn convert_order_type(internal: OrderType) -> WireOrderType {
    match internal {
        OrderType::Market | OrderType::MarketOnOpen | OrderType::MarketOnClose => WireOrderType::Market,
        OrderType::Limit => WireOrderType::Limit,
        OrderType::StopMarket => WireOrderType::Stop,
        OrderType::StopLimit => WireOrderType::StopLimit,
    }
}

/// Wire-side direction, holdings-aware per spec §4.5's table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireDirection {
    OpenLong,
    AddLong,
    CloseLong,
    OpenShort,
    AddShort,
    CloseShort,
}

/// `convertDirection(orderDir, holdingsQty) -> wire-direction` (spec §4.5).
pub fn convert_direction(order_quantity: Decimal, holdings_quantity: Decimal) -> WireDirection {
    let is_buy = order_quantity > Decimal::ZERO;
    if holdings_quantity.is_zero() {
        if is_buy { WireDirection::OpenLong } else { WireDirection::OpenShort }
    } else if holdings_quantity > Decimal::ZERO {
        if is_buy { WireDirection::AddLong } else { WireDirection::CloseLong }
    } else if is_buy {
        WireDirection::CloseShort
    } else {
        WireDirection::AddShort
    }
}

/// `convertQuantity(wireOrder) -> signed-internal` (spec §4.5): sign is
/// derived from the wire direction rather than carried separately.
pub fn convert_quantity(direction: WireDirection, magnitude: Decimal) -> Decimal {
    match direction {
        WireDirection::OpenLong | WireDirection::AddLong | WireDirection::CloseShort => magnitude,
        WireDirection::OpenShort | WireDirection::AddShort | WireDirection::CloseLong => -magnitude,
    }
}

/// Status as reported by the wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireStatus {
    New,
    Accepted,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    Expired,
}

/// `convertStatus` (spec §4.5): Expired and Rejected both map to internal
/// Invalid.
pub fn convert_status(wire: WireStatus) -> crate::order_fsm::OrderStatus {
    use crate::order_fsm::OrderStatus;
    match wire {
        WireStatus::New => OrderStatus::New,
        WireStatus::Accepted => OrderStatus::Submitted,
        WireStatus::PartiallyFilled => OrderStatus::PartiallyFilled,
        WireStatus::Filled => OrderStatus::Filled,
        WireStatus::Canceled => OrderStatus::Canceled,
        WireStatus::Rejected | WireStatus::Expired => OrderStatus::Invalid,
    }
}

/// A wire-format open/pending order as returned by `getOpenOrders` (spec §6).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct WireOrder {
    pub id: String,
    pub symbol: String,
    pub direction: WireDirection,
    pub order_type: WireOrderType,
    pub status: WireStatus,
    pub quantity: Decimal,
    pub remaining: Decimal,
    pub executed: Decimal,
    pub last_fill_price: Decimal,
    pub last_fill_quantity: Decimal,
    pub transaction_date: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct WirePosition {
    pub symbol: String,
    pub quantity: Decimal,
    pub average_price: Decimal,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct WireBalance {
    pub currency: String,
    pub amount: Decimal,
}

/// Outcome of a submit call: either the brokerage accepted it and
/// returned an id, or it rejected with a list of error messages (spec §6).
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    Accepted { brokerage_id: String },
    Rejected { errors: Vec<String> },
}

/// An update request only ever changes limit/stop/type/duration;
/// quantity changes are rejected at the type level by omitting a quantity
/// field entirely (spec §4.5 `updateOrder`).
#[derive(Debug, Clone, Default)]
pub struct UpdateRequest {
    pub limit_price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub order_type: Option<OrderType>,
    pub duration: Option<TimeInForce>,
}

/// The abstract wire contract (spec §4.5, §6). Implementations speak to a
/// concrete brokerage's REST/WebSocket surface; this crate only defines
/// the trait and the translation tables above, not a client for any
/// specific broker (spec §1 Non-goals).
pub trait BrokerageAdapter: Send + Sync {
    fn place_order(
        &self,
        symbol: &str,
        direction: WireDirection,
        order_type: WireOrderType,
        quantity: Decimal,
        limit_price: Option<Decimal>,
        stop_price: Option<Decimal>,
        duration: TimeInForce,
    ) -> impl std::future::Future<Output = anyhow::Result<SubmitOutcome>> + Send;

    fn cancel_order(&self, brokerage_id: &str) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;

    fn update_order(
        &self,
        brokerage_id: &str,
        update: UpdateRequest,
    ) -> impl std::future::Future<Output = Result<(), ReconcilerErrorKind>> + Send;

    fn get_open_orders(&self) -> impl std::future::Future<Output = anyhow::Result<Vec<WireOrder>>> + Send;

    /// Single-order lookup used by the reconciler's out-of-band resolution
    /// path when an id disappears from `get_open_orders` between polls
    /// (spec §4.4, scenario 5 "Out-of-band cancel discovered by reconciler").
    /// `Ok(None)` means the brokerage has no record of the id at all.
    fn get_order(&self, brokerage_id: &str) -> impl std::future::Future<Output = anyhow::Result<Option<WireOrder>>> + Send;

    fn get_recent_orders(
        &self,
        statuses: &[WireStatus],
        since: chrono::DateTime<chrono::Utc>,
    ) -> impl std::future::Future<Output = anyhow::Result<Vec<WireOrder>>> + Send;

    fn get_holdings(&self) -> impl std::future::Future<Output = anyhow::Result<Vec<WirePosition>>> + Send;

    fn get_cash_balances(&self) -> impl std::future::Future<Output = anyhow::Result<Vec<WireBalance>>> + Send;

    fn connect(&self) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;

    fn disconnect(&self) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;

    fn is_connected(&self) -> bool;
}

/// Shared connection data.
#[derive(Debug, Clone)]
pub struct ConnectionData {
    pub name: String,
    pub attempt: u32,
}

macro_rules! connection_state {
    ($name:ident) => {
        #[derive(Debug, Clone)]
        pub struct $name {
            data: ConnectionData,
        }

        impl $name {
            pub fn data(&self) -> &ConnectionData {
                &self.data
            }
        }
    };
}

connection_state!(ConnectionDisconnected);
connection_state!(ConnectionConnected);
connection_state!(ConnectionReconnecting);
connection_state!(ConnectionFailed);

impl ConnectionDisconnected {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            data: ConnectionData { name: name.into(), attempt: 0 },
        }
    }

    pub fn connect(self) -> ConnectionConnected {
        ConnectionConnected { data: self.data }
    }
}

impl ConnectionConnected {
    pub fn disconnect(self) -> ConnectionDisconnected {
        ConnectionDisconnected { data: self.data }
    }

    pub fn lost(mut self) -> ConnectionReconnecting {
        self.data.attempt = 0;
        ConnectionReconnecting { data: self.data }
    }
}

pub enum ReconnectOutcome {
    Connected(ConnectionConnected),
    Reconnecting(ConnectionReconnecting),
    Failed(ConnectionFailed),
}

impl ConnectionReconnecting {
    pub fn succeeded(self) -> ConnectionConnected {
        ConnectionConnected { data: self.data }
    }

    pub fn failed_attempt(mut self, max_attempts: u32) -> ReconnectOutcome {
        self.data.attempt += 1;
        if self.data.attempt >= max_attempts {
            ReconnectOutcome::Failed(ConnectionFailed { data: self.data })
        } else {
            ReconnectOutcome::Reconnecting(self)
        }
    }
}

impl ConnectionFailed {
    pub fn manual_retry(self) -> ConnectionReconnecting {
        ConnectionReconnecting { data: self.data }
    }
}
