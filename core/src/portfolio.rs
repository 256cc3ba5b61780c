//! Holdings, portfolio valuation, and margin models (spec §3, §4.7).
//!
//! `Portfolio` is the only writer of holdings and realized P&L — every
//! fill funnels through [`Portfolio::process_fill`] (spec §2). Margin
//! math is grounded in rotala's liquidation calculations
//! (`broker/calculations.rs`), restated here against `Decimal` and the
//! three named margin variants from spec §4.7.

use dashmap::DashMap;
use rust_decimal::Decimal;

use crate::cash::CashBook;
use crate::symbol::SymbolId;

/// Per-symbol position (spec §3 "Holding").
#[derive(Debug, Clone)]
pub struct Holding {
    pub symbol: SymbolId,
    /// Signed; positive = long, negative = short.
    pub quantity: Decimal,
    pub average_price: Decimal,
    pub realized_profit: Decimal,
    pub cumulative_fees: Decimal,
    pub last_market_price: Decimal,
    pub last_closed_trade_profit: Decimal,
}

impl Holding {
    pub fn flat(symbol: SymbolId) -> Self {
        Self {
            symbol,
            quantity: Decimal::ZERO,
            average_price: Decimal::ZERO,
            realized_profit: Decimal::ZERO,
            cumulative_fees: Decimal::ZERO,
            last_market_price: Decimal::ZERO,
            last_closed_trade_profit: Decimal::ZERO,
        }
    }

    pub fn market_value(&self) -> Decimal {
        self.quantity * self.last_market_price
    }

    pub fn unrealized_pnl(&self) -> Decimal {
        (self.last_market_price - self.average_price) * self.quantity
    }

    /// Applies a signed fill to this holding, updating average price and
    /// realized profit per spec §3's Holding invariants: average price
    /// never negative, realized profit only moves on position-reducing
    /// fills, and a full close resets average price to zero.
    pub fn apply_fill(&mut self, fill_quantity: Decimal, fill_price: Decimal, fee: Decimal) {
        self.cumulative_fees += fee;
        if self.quantity.is_zero() || self.quantity.signum() == fill_quantity.signum() {
            // Opening or adding to the position: blend the average price.
            let prior_notional = self.average_price * self.quantity;
            let new_notional = fill_price * fill_quantity;
            self.quantity += fill_quantity;
            if !self.quantity.is_zero() {
                self.average_price = (prior_notional + new_notional) / self.quantity;
            } else {
                self.average_price = Decimal::ZERO;
            }
        } else {
            // Reducing or flipping the position.
            let closing_quantity = fill_quantity.abs().min(self.quantity.abs()) * fill_quantity.signum();
            let realized = (fill_price - self.average_price) * (-closing_quantity);
            self.realized_profit += realized;
            self.last_closed_trade_profit = realized;
            self.quantity += fill_quantity;
            if self.quantity.is_zero() {
                self.average_price = Decimal::ZERO;
            } else if closing_quantity.abs() < fill_quantity.abs() {
                // Flipped through zero: the remainder opens a new position
                // at the fill price.
                self.average_price = fill_price;
            }
        }
    }
}

/// Tagged margin model variants (spec §4.7); dispatch is exhaustive rather
/// than a trait object, per the "pluggable models" design note (spec §9).
#[derive(Debug, Clone, Copy)]
pub enum MarginModel {
    Constant {
        initial_margin_rate: Decimal,
        maintenance_margin_rate: Decimal,
    },
    PatternDayTrading {
        maintenance_margin_rate: Decimal,
        open_leverage: Decimal,
        closed_leverage: Decimal,
    },
    Null {
        leverage: Decimal,
    },
}

impl MarginModel {
    /// Returns `(initial_margin_rate, maintenance_margin_rate)`, applying
    /// the PDT open/closed correction factor when the exchange is closed.
    pub fn margin_rates(&self, exchange_open: bool) -> (Decimal, Decimal) {
        match *self {
            MarginModel::Constant {
                initial_margin_rate,
                maintenance_margin_rate,
            } => (initial_margin_rate, maintenance_margin_rate),
            MarginModel::PatternDayTrading {
                maintenance_margin_rate,
                open_leverage,
                closed_leverage,
            } => {
                let leverage = if exchange_open { open_leverage } else { closed_leverage };
                let correction = open_leverage / closed_leverage;
                let maintenance = if exchange_open {
                    maintenance_margin_rate
                } else {
                    maintenance_margin_rate * correction
                };
                (Decimal::ONE / leverage, maintenance)
            }
            MarginModel::Null { leverage } => {
                let rate = Decimal::ONE / leverage;
                (rate, rate)
            }
        }
    }

    pub fn pattern_day_trading_default() -> Self {
        MarginModel::PatternDayTrading {
            maintenance_margin_rate: Decimal::new(25, 2),
            open_leverage: Decimal::new(4, 0),
            closed_leverage: Decimal::new(2, 0),
        }
    }
}

pub struct Portfolio {
    pub account_currency: String,
    pub cash_book: CashBook,
    holdings: DashMap<SymbolId, Holding>,
    margin_models: DashMap<SymbolId, MarginModel>,
}

impl Portfolio {
    pub fn new(account_currency: impl Into<String>) -> Self {
        let account_currency = account_currency.into();
        Self {
            cash_book: CashBook::new(&account_currency),
            account_currency,
            holdings: DashMap::new(),
            margin_models: DashMap::new(),
        }
    }

    pub fn set_margin_model(&self, symbol: SymbolId, model: MarginModel) {
        self.margin_models.insert(symbol, model);
    }

    pub fn holding(&self, symbol: SymbolId) -> Holding {
        self.holdings
            .get(&symbol)
            .map(|h| h.clone())
            .unwrap_or_else(|| Holding::flat(symbol))
    }

    pub fn holdings_snapshot(&self) -> Vec<Holding> {
        self.holdings.iter().filter(|h| !h.quantity.is_zero()).map(|h| h.clone()).collect()
    }

    pub fn update_market_price(&self, symbol: SymbolId, price: Decimal) {
        self.holdings
            .entry(symbol)
            .or_insert_with(|| Holding::flat(symbol))
            .last_market_price = price;
    }

    /// The only writer of holdings and realized P&L (spec §2).
    pub fn process_fill(&self, symbol: SymbolId, fill_quantity: Decimal, fill_price: Decimal, fee: Decimal) {
        let mut holding = self.holdings.entry(symbol).or_insert_with(|| Holding::flat(symbol));
        holding.apply_fill(fill_quantity, fill_price, fee);
    }

    pub fn total_holdings_value(&self) -> Decimal {
        self.holdings.iter().map(|h| h.market_value()).sum()
    }

    pub fn total_portfolio_value(&self) -> Decimal {
        self.total_holdings_value() + self.cash_book.total_in_account_currency()
    }

    pub fn net_liquidation_value(&self) -> Decimal {
        self.total_portfolio_value()
    }

    fn total_margin_used(&self, exchange_open_for: impl Fn(SymbolId) -> bool) -> Decimal {
        self.holdings
            .iter()
            .filter(|h| !h.quantity.is_zero())
            .map(|h| {
                let model = self.margin_models.get(&h.symbol);
                let (_, maintenance) = model
                    .map(|m| m.margin_rates(exchange_open_for(h.symbol)))
                    .unwrap_or((Decimal::ZERO, Decimal::ZERO));
                h.market_value().abs() * maintenance
            })
            .sum()
    }

    /// `marginRemaining` (spec §4.7): free margin = net liquidation value
    /// minus margin currently in use.
    pub fn margin_remaining(&self, exchange_open_for: impl Fn(SymbolId) -> bool) -> Decimal {
        self.net_liquidation_value() - self.total_margin_used(exchange_open_for)
    }

    /// `marginRemaining(symbol, direction)` (spec §4.1.1/§4.7): accounts
    /// for whether `direction` aligns with or opposes current holdings.
    pub fn margin_remaining_for_order(&self, symbol: SymbolId, direction: Decimal, exchange_open: bool) -> Decimal {
        let holding = self.holding(symbol);
        let free_margin = self.margin_remaining(|_| exchange_open);
        if holding.quantity.is_zero() || holding.quantity.signum() == direction.signum() {
            return free_margin;
        }
        let model = self.margin_models.get(&symbol);
        let (initial, maintenance) = model.map(|m| m.margin_rates(exchange_open)).unwrap_or((Decimal::ZERO, Decimal::ZERO));
        let holdings_value = holding.market_value().abs();
        holdings_value * maintenance + holdings_value * initial + free_margin
    }

    /// Margin call check and sizing (spec §4.7). Returns `Some(quantity)`
    /// — signed, reducing the offending position — if `totalMargin` has
    /// breached `netLiquidationValue * 1.10`.
    pub fn margin_call_quantity(&self, symbol: SymbolId, exchange_open: bool) -> Option<Decimal> {
        let total_margin = self.total_margin_used(|_| exchange_open);
        let nlv = self.net_liquidation_value();
        if total_margin <= nlv * Decimal::new(110, 2) {
            return None;
        }
        let holding = self.holding(symbol);
        if holding.quantity.is_zero() {
            return None;
        }
        let model = self.margin_models.get(&symbol);
        let (_, maintenance) = model.map(|m| m.margin_rates(exchange_open)).unwrap_or((Decimal::ZERO, Decimal::ZERO));
        if maintenance.is_zero() || holding.last_market_price.is_zero() {
            return None;
        }
        let excess = total_margin - nlv;
        let shares_to_sell = (excess / (maintenance * holding.last_market_price)).ceil();
        let clipped = shares_to_sell.clamp(Decimal::ONE, holding.quantity.abs());
        Some(-clipped * holding.quantity.signum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn opening_fill_sets_average_price() {
        let mut h = Holding::flat(SymbolId::from_index(0));
        h.apply_fill(dec!(10), dec!(100), dec!(1));
        assert_eq!(h.quantity, dec!(10));
        assert_eq!(h.average_price, dec!(100));
    }

    #[test]
    fn reducing_fill_realizes_profit_and_keeps_average() {
        let mut h = Holding::flat(SymbolId::from_index(0));
        h.apply_fill(dec!(10), dec!(90), Decimal::ZERO);
        h.apply_fill(dec!(-5), dec!(100), Decimal::ZERO);
        assert_eq!(h.quantity, dec!(5));
        assert_eq!(h.average_price, dec!(90));
        assert_eq!(h.realized_profit, dec!(50));
    }

    #[test]
    fn flipping_through_zero_resets_average_to_new_fill_price() {
        let mut h = Holding::flat(SymbolId::from_index(0));
        h.apply_fill(dec!(5), dec!(90), Decimal::ZERO);
        h.apply_fill(dec!(-12), dec!(100), Decimal::ZERO);
        assert_eq!(h.quantity, dec!(-7));
        assert_eq!(h.average_price, dec!(100));
        assert_eq!(h.realized_profit, dec!(50));
    }

    #[test]
    fn pdt_model_applies_correction_factor_when_closed() {
        let model = MarginModel::pattern_day_trading_default();
        let (_, maint_open) = model.margin_rates(true);
        let (_, maint_closed) = model.margin_rates(false);
        assert_eq!(maint_open, dec!(0.25));
        assert_eq!(maint_closed, dec!(0.50));
    }

    #[test]
    fn margin_call_triggers_above_110_percent_threshold() {
        let portfolio = Portfolio::new("USD");
        let sym = SymbolId::from_index(0);
        portfolio.set_margin_model(sym, MarginModel::Constant {
            initial_margin_rate: dec!(0.5),
            maintenance_margin_rate: dec!(0.5),
        });
        portfolio.process_fill(sym, dec!(100), dec!(100), Decimal::ZERO);
        portfolio.update_market_price(sym, dec!(100));
        portfolio.cash_book.add_cash("USD", dec!(-9000));
        let call = portfolio.margin_call_quantity(sym, true);
        assert!(call.is_some());
        assert!(call.unwrap() < Decimal::ZERO);
    }
}
