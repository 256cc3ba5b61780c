//! Settlement models and the unsettled-cash queue (spec §3, §4.8).

use std::collections::BinaryHeap;
use std::cmp::Ordering as CmpOrdering;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;

use crate::cash::CashBook;
use crate::security::ExchangeHours;

/// `(settlement_time_utc, currency, amount)` (spec §3 "UnsettledCashAmount").
#[derive(Debug, Clone)]
pub struct UnsettledCashAmount {
    pub settlement_time_utc: DateTime<Utc>,
    pub currency: String,
    pub amount: Decimal,
}

impl PartialEq for UnsettledCashAmount {
    fn eq(&self, other: &Self) -> bool {
        self.settlement_time_utc == other.settlement_time_utc
    }
}
impl Eq for UnsettledCashAmount {}

impl PartialOrd for UnsettledCashAmount {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for UnsettledCashAmount {
    // Reversed so `BinaryHeap` (a max-heap) pops the earliest settlement time first.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other.settlement_time_utc.cmp(&self.settlement_time_utc)
    }
}

#[derive(Debug, Clone, Copy)]
pub enum SettlementModel {
    Immediate,
    Delayed { days: u32, hour_of_day: u32, minute_of_day: u32 },
}

impl SettlementModel {
    pub fn t_plus(days: u32) -> Self {
        SettlementModel::Delayed {
            days,
            hour_of_day: 0,
            minute_of_day: 0,
        }
    }
}

/// Drains entries in time order as simulated time advances (spec §4.8).
pub struct SettlementQueue {
    queue: Mutex<BinaryHeap<UnsettledCashAmount>>,
}

impl SettlementQueue {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(BinaryHeap::new()),
        }
    }

    pub fn push(&self, entry: UnsettledCashAmount) {
        self.queue.lock().push(entry);
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Settles a fill against the cash book per §4.8: immediate sale
    /// proceeds credit settled cash directly; delayed-settlement sells go
    /// to the queue while the (negative, buy-side) cash movement is always
    /// immediate regardless of model.
    pub fn settle_fill(
        &self,
        model: SettlementModel,
        exchange_hours: &ExchangeHours,
        cash_book: &CashBook,
        currency: &str,
        fill_time_utc: DateTime<Utc>,
        amount: Decimal,
    ) {
        if amount <= Decimal::ZERO {
            // Buys (and fees) settle immediately — negative cash movement.
            cash_book.add_cash(currency, amount);
            return;
        }
        match model {
            SettlementModel::Immediate => cash_book.add_cash(currency, amount),
            SettlementModel::Delayed { days, hour_of_day, minute_of_day } => {
                let settle_date = exchange_hours.add_trading_days(fill_time_utc, days);
                let settlement_time_utc = settle_date
                    .date_naive()
                    .and_hms_opt(hour_of_day, minute_of_day, 0)
                    .expect("valid settlement time")
                    .and_utc();
                self.push(UnsettledCashAmount {
                    settlement_time_utc,
                    currency: currency.to_string(),
                    amount,
                });
            }
        }
    }

    /// Drains every entry whose settlement time has passed, moving the
    /// amount atomically into settled cash.
    pub fn drain_due(&self, now_utc: DateTime<Utc>, cash_book: &CashBook) -> usize {
        let mut drained = 0;
        let mut queue = self.queue.lock();
        while let Some(top) = queue.peek() {
            if top.settlement_time_utc > now_utc {
                break;
            }
            let entry = queue.pop().expect("peek guaranteed Some");
            cash_book.add_cash(&entry.currency, entry.amount);
            drained += 1;
        }
        drained
    }
}

impl Default for SettlementQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn immediate_model_credits_settled_cash_directly() {
        let book = CashBook::new("USD");
        let queue = SettlementQueue::new();
        let hours = ExchangeHours::standard_equity_market(0);
        let now = Utc.with_ymd_and_hms(2026, 1, 5, 16, 0, 0).unwrap();
        queue.settle_fill(SettlementModel::Immediate, &hours, &book, "USD", now, dec!(10000));
        assert_eq!(book.get("USD").unwrap().balance, dec!(10000));
        assert!(queue.is_empty());
    }

    #[test]
    fn delayed_model_t_plus_3_skips_weekend() {
        let book = CashBook::new("USD");
        let queue = SettlementQueue::new();
        let hours = ExchangeHours::standard_equity_market(0);
        // Monday 16:00.
        let monday = Utc.with_ymd_and_hms(2026, 1, 5, 16, 0, 0).unwrap();
        queue.settle_fill(SettlementModel::t_plus(3), &hours, &book, "USD", monday, dec!(10000));
        assert_eq!(book.get("USD").unwrap().balance, Decimal::ZERO);
        assert_eq!(queue.len(), 1);

        // Not yet due on Wednesday.
        let wednesday = Utc.with_ymd_and_hms(2026, 1, 7, 12, 0, 0).unwrap();
        assert_eq!(queue.drain_due(wednesday, &book), 0);

        // Due on Thursday (Mon + 3 trading days).
        let thursday = Utc.with_ymd_and_hms(2026, 1, 8, 12, 0, 0).unwrap();
        assert_eq!(queue.drain_due(thursday, &book), 1);
        assert_eq!(book.get("USD").unwrap().balance, dec!(10000));
    }

    #[test]
    fn buy_side_cash_movement_is_always_immediate() {
        let book = CashBook::new("USD");
        let queue = SettlementQueue::new();
        let hours = ExchangeHours::standard_equity_market(0);
        let now = Utc.with_ymd_and_hms(2026, 1, 5, 16, 0, 0).unwrap();
        queue.settle_fill(SettlementModel::t_plus(3), &hours, &book, "USD", now, dec!(-5000));
        assert_eq!(book.get("USD").unwrap().balance, dec!(-5000));
        assert!(queue.is_empty());
    }
}
