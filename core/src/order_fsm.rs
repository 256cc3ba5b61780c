//! Per-brokerage-order state machine — typestate pattern.
//!
//! Compile-time verified transitions for a single brokerage order id
//! (spec §4.4 "State machine per brokerage order"). States are zero-sized
//! wrappers around [`BrokerOrderData`]; invalid transitions simply do not
//! compile. Generalized from the teacher's `core::order_fsm` (which models
//! Pending/Open/Filled/Cancelled/Expired/Rejected for a single exchange
//! order) to this spec's six-state set.
//!
//! # State Diagram
//!
//! ```text
//!      New ──┐
//!            ├──► PartiallyFilled ──► Filled
//!  Submitted ┤                   └──► Canceled
//!            ├──► Filled
//!            ├──► Canceled
//!            └──► Invalid
//! ```
//!
//! Because the reconciler stores these states behind a concurrent map
//! keyed by brokerage order id (it cannot know at compile time which state
//! a given entry is in), [`BrokerOrderState`] is a runtime enum wrapping
//! each typestate struct for storage; all actual transition logic still
//! lives on the typestate methods below, and `BrokerOrderState`'s own
//! transition methods just dispatch into them.

use rust_decimal::Decimal;

use crate::symbol::SymbolId;

/// Terminal/non-terminal status tag. Kept separate from the typestate
/// structs so [`crate::order::OrderTicket`] has something `Copy` to store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum OrderStatus {
    New,
    Submitted,
    PartiallyFilled,
    Filled,
    Canceled,
    Invalid,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Invalid
        )
    }
}

/// Errors applying a fill — mirrors the teacher's `FillError`, generalized
/// to signed (possibly negative, for sell fills) quantities.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FillError {
    #[error("fill quantity cannot be zero")]
    ZeroQuantity,
    #[error("fill price must be strictly positive")]
    NonPositivePrice,
    #[error("fill quantity {fill_qty} exceeds remaining {remaining_qty} (total order: {total_qty})")]
    ExceedsRemaining {
        fill_qty: Decimal,
        remaining_qty: Decimal,
        total_qty: Decimal,
    },
}

/// Data shared by every state of a brokerage order's lifecycle.
#[derive(Debug, Clone)]
pub struct BrokerOrderData {
    pub brokerage_id: String,
    pub symbol: SymbolId,
    /// Total signed quantity requested; positive = buy, negative = sell.
    pub quantity: Decimal,
    /// Signed quantity filled so far, same sign convention as `quantity`.
    pub filled_quantity: Decimal,
    pub last_fill_price: Decimal,
    pub transacted_after_init: bool,
}

impl BrokerOrderData {
    pub fn remaining_quantity(&self) -> Decimal {
        self.quantity - self.filled_quantity
    }

    pub fn is_fully_filled(&self) -> bool {
        self.filled_quantity.abs() >= self.quantity.abs()
    }
}

macro_rules! state_struct {
    ($name:ident) => {
        #[derive(Debug, Clone)]
        pub struct $name {
            data: BrokerOrderData,
        }

        impl $name {
            pub fn data(&self) -> &BrokerOrderData {
                &self.data
            }
        }
    };
}

state_struct!(BrokerOrderNew);
state_struct!(BrokerOrderSubmitted);
state_struct!(BrokerOrderPartiallyFilled);
state_struct!(BrokerOrderFilled);
state_struct!(BrokerOrderCanceled);
state_struct!(BrokerOrderInvalid);

/// Outcome of applying a fill to an order that can still receive more fills.
pub enum FillOutcome {
    PartiallyFilled(BrokerOrderPartiallyFilled),
    Filled(BrokerOrderFilled),
}

impl FillOutcome {
    pub fn is_filled(&self) -> bool {
        matches!(self, FillOutcome::Filled(_))
    }
}

fn apply_fill(
    mut data: BrokerOrderData,
    fill_quantity: Decimal,
    fill_price: Decimal,
) -> Result<FillOutcome, (FillError, BrokerOrderData)> {
    if fill_quantity.is_zero() {
        return Err((FillError::ZeroQuantity, data));
    }
    if fill_price <= Decimal::ZERO {
        return Err((FillError::NonPositivePrice, data));
    }
    let remaining = data.remaining_quantity();
    // Remaining and fill share sign by construction; compare magnitudes.
    if fill_quantity.abs() > remaining.abs() {
        return Err((
            FillError::ExceedsRemaining {
                fill_qty: fill_quantity,
                remaining_qty: remaining,
                total_qty: data.quantity,
            },
            data,
        ));
    }
    data.filled_quantity += fill_quantity;
    data.last_fill_price = fill_price;
    if data.is_fully_filled() {
        Ok(FillOutcome::Filled(BrokerOrderFilled { data }))
    } else {
        Ok(FillOutcome::PartiallyFilled(BrokerOrderPartiallyFilled { data }))
    }
}

impl BrokerOrderNew {
    pub fn new(brokerage_id: String, symbol: SymbolId, quantity: Decimal) -> Self {
        Self {
            data: BrokerOrderData {
                brokerage_id,
                symbol,
                quantity,
                filled_quantity: Decimal::ZERO,
                last_fill_price: Decimal::ZERO,
                transacted_after_init: true,
            },
        }
    }

    pub fn status(&self) -> OrderStatus {
        OrderStatus::New
    }

    pub fn acknowledge(self) -> BrokerOrderSubmitted {
        BrokerOrderSubmitted { data: self.data }
    }

    pub fn fill(
        self,
        fill_quantity: Decimal,
        fill_price: Decimal,
    ) -> Result<FillOutcome, (FillError, Self)> {
        apply_fill(self.data, fill_quantity, fill_price).map_err(|(e, data)| (e, Self { data }))
    }

    pub fn cancel(self) -> BrokerOrderCanceled {
        BrokerOrderCanceled { data: self.data }
    }

    pub fn invalidate(self) -> BrokerOrderInvalid {
        BrokerOrderInvalid { data: self.data }
    }
}

impl BrokerOrderSubmitted {
    pub fn status(&self) -> OrderStatus {
        OrderStatus::Submitted
    }

    pub fn fill(
        self,
        fill_quantity: Decimal,
        fill_price: Decimal,
    ) -> Result<FillOutcome, (FillError, Self)> {
        apply_fill(self.data, fill_quantity, fill_price).map_err(|(e, data)| (e, Self { data }))
    }

    pub fn cancel(self) -> BrokerOrderCanceled {
        BrokerOrderCanceled { data: self.data }
    }

    pub fn invalidate(self) -> BrokerOrderInvalid {
        BrokerOrderInvalid { data: self.data }
    }
}

impl BrokerOrderPartiallyFilled {
    pub fn status(&self) -> OrderStatus {
        OrderStatus::PartiallyFilled
    }

    pub fn fill(
        self,
        fill_quantity: Decimal,
        fill_price: Decimal,
    ) -> Result<FillOutcome, (FillError, Self)> {
        apply_fill(self.data, fill_quantity, fill_price).map_err(|(e, data)| (e, Self { data }))
    }

    pub fn cancel(self) -> BrokerOrderCanceled {
        BrokerOrderCanceled { data: self.data }
    }
}

impl BrokerOrderFilled {
    pub fn status(&self) -> OrderStatus {
        OrderStatus::Filled
    }
}

impl BrokerOrderCanceled {
    pub fn status(&self) -> OrderStatus {
        OrderStatus::Canceled
    }
}

impl BrokerOrderInvalid {
    pub fn status(&self) -> OrderStatus {
        OrderStatus::Invalid
    }
}

/// Runtime-dispatched wrapper over the typestate above, used wherever a
/// brokerage order's state must live behind a concurrent map (the
/// reconciler's `CachedOpenOrder`). Transition methods here just forward
/// into the typestate's own methods and re-wrap the result; they do not
/// reimplement the lifecycle rules.
#[derive(Debug, Clone)]
pub enum BrokerOrderState {
    New(BrokerOrderNew),
    Submitted(BrokerOrderSubmitted),
    PartiallyFilled(BrokerOrderPartiallyFilled),
    Filled(BrokerOrderFilled),
    Canceled(BrokerOrderCanceled),
    Invalid(BrokerOrderInvalid),
}

impl BrokerOrderState {
    pub fn data(&self) -> &BrokerOrderData {
        match self {
            BrokerOrderState::New(s) => s.data(),
            BrokerOrderState::Submitted(s) => s.data(),
            BrokerOrderState::PartiallyFilled(s) => s.data(),
            BrokerOrderState::Filled(s) => s.data(),
            BrokerOrderState::Canceled(s) => s.data(),
            BrokerOrderState::Invalid(s) => s.data(),
        }
    }

    pub fn status(&self) -> OrderStatus {
        match self {
            BrokerOrderState::New(s) => s.status(),
            BrokerOrderState::Submitted(s) => s.status(),
            BrokerOrderState::PartiallyFilled(s) => s.status(),
            BrokerOrderState::Filled(s) => s.status(),
            BrokerOrderState::Canceled(s) => s.status(),
            BrokerOrderState::Invalid(s) => s.status(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    /// Apply a fill observation. Returns an error (protocol violation) if
    /// the current state cannot receive fills (spec §4.4: "any other
    /// transition ... raises an error").
    pub fn fill(self, fill_quantity: Decimal, fill_price: Decimal) -> Result<Self, FillError> {
        match self {
            BrokerOrderState::New(s) => match s.fill(fill_quantity, fill_price) {
                Ok(FillOutcome::Filled(f)) => Ok(BrokerOrderState::Filled(f)),
                Ok(FillOutcome::PartiallyFilled(p)) => Ok(BrokerOrderState::PartiallyFilled(p)),
                Err((e, _)) => Err(e),
            },
            BrokerOrderState::Submitted(s) => match s.fill(fill_quantity, fill_price) {
                Ok(FillOutcome::Filled(f)) => Ok(BrokerOrderState::Filled(f)),
                Ok(FillOutcome::PartiallyFilled(p)) => Ok(BrokerOrderState::PartiallyFilled(p)),
                Err((e, _)) => Err(e),
            },
            BrokerOrderState::PartiallyFilled(s) => match s.fill(fill_quantity, fill_price) {
                Ok(FillOutcome::Filled(f)) => Ok(BrokerOrderState::Filled(f)),
                Ok(FillOutcome::PartiallyFilled(p)) => Ok(BrokerOrderState::PartiallyFilled(p)),
                Err((e, _)) => Err(e),
            },
            other => Err(match other.status() {
                OrderStatus::Filled => FillError::ExceedsRemaining {
                    fill_qty: fill_quantity,
                    remaining_qty: Decimal::ZERO,
                    total_qty: other.data().quantity,
                },
                _ => FillError::ZeroQuantity,
            }),
        }
    }

    pub fn cancel(self) -> Result<Self, &'static str> {
        match self {
            BrokerOrderState::New(s) => Ok(BrokerOrderState::Canceled(s.cancel())),
            BrokerOrderState::Submitted(s) => Ok(BrokerOrderState::Canceled(s.cancel())),
            BrokerOrderState::PartiallyFilled(s) => Ok(BrokerOrderState::Canceled(s.cancel())),
            _ => Err("cannot cancel a terminal order"),
        }
    }

    pub fn invalidate(self) -> Result<Self, &'static str> {
        match self {
            BrokerOrderState::New(s) => Ok(BrokerOrderState::Invalid(s.invalidate())),
            BrokerOrderState::Submitted(s) => Ok(BrokerOrderState::Invalid(s.invalidate())),
            _ => Err("can only invalidate New or Submitted orders"),
        }
    }
}
