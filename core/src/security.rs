//! Securities, exchange hours, and the flat arena that owns them.
//!
//! Grounded in the teacher's preference for plain owned data over shared
//! references (`core/types.rs`) and in rotala's `Quote`/`Asset` shapes,
//! but indexed by [`SymbolId`] instead of holding live cross-references,
//! per the arena-index design note (spec §9).

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use rust_decimal::Decimal;

use crate::symbol::{Symbol, SymbolId};

/// Per-symbol trading constraints (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolProperties {
    pub lot_size: u64,
    pub contract_multiplier: u32,
    /// Smallest quoted price increment; zero for instruments with no pip convention.
    pub pip_size: Decimal,
}

impl Default for SymbolProperties {
    fn default() -> Self {
        Self {
            lot_size: 1,
            contract_multiplier: 1,
            pip_size: Decimal::ZERO,
        }
    }
}

/// Daily open/close in exchange-local time, plus the holiday calendar used
/// for settlement trading-day counting (spec §4.8).
#[derive(Debug, Clone)]
pub struct ExchangeHours {
    pub open_hour: u32,
    pub open_minute: u32,
    pub close_hour: u32,
    pub close_minute: u32,
    /// UTC offset in minutes of the exchange's local time, fixed for the
    /// run rather than resolved from a tz database; DST is handled by the
    /// reconciler recomputing against this value every tick (spec §9).
    pub utc_offset_minutes: i32,
    pub holidays: Vec<DateTime<Utc>>,
}

impl ExchangeHours {
    pub fn always_open() -> Self {
        Self {
            open_hour: 0,
            open_minute: 0,
            close_hour: 23,
            close_minute: 59,
            utc_offset_minutes: 0,
            holidays: Vec::new(),
        }
    }

    pub fn standard_equity_market(utc_offset_minutes: i32) -> Self {
        Self {
            open_hour: 9,
            open_minute: 30,
            close_hour: 16,
            close_minute: 0,
            utc_offset_minutes,
            holidays: Vec::new(),
        }
    }

    fn local(&self, now_utc: DateTime<Utc>) -> DateTime<Utc> {
        now_utc + chrono::Duration::minutes(self.utc_offset_minutes as i64)
    }

    fn is_holiday_local(&self, local_date: DateTime<Utc>) -> bool {
        self.holidays.iter().any(|h| {
            let h_local = *h + chrono::Duration::minutes(self.utc_offset_minutes as i64);
            h_local.date_naive() == local_date.date_naive()
        })
    }

    pub fn is_trading_day(&self, now_utc: DateTime<Utc>) -> bool {
        let local = self.local(now_utc);
        !matches!(local.weekday(), Weekday::Sat | Weekday::Sun) && !self.is_holiday_local(local)
    }

    /// Whether the exchange is open for trading at `now_utc`.
    pub fn is_open(&self, now_utc: DateTime<Utc>) -> bool {
        if !self.is_trading_day(now_utc) {
            return false;
        }
        let local = self.local(now_utc);
        let minutes_of_day = local.hour() * 60 + local.minute();
        let open = self.open_hour * 60 + self.open_minute;
        let close = self.close_hour * 60 + self.close_minute;
        minutes_of_day >= open && minutes_of_day < close
    }

    /// The next market close at or after `now_utc`, recomputed fresh every
    /// call rather than cached (spec §4.4/§9: avoids a DST-ambiguous cached
    /// instant across a calendar day boundary).
    pub fn next_market_close(&self, now_utc: DateTime<Utc>) -> DateTime<Utc> {
        let mut cursor = self.local(now_utc);
        loop {
            let close_today = cursor
                .date_naive()
                .and_hms_opt(self.close_hour, self.close_minute, 0)
                .expect("valid close time");
            let close_today_utc = DateTime::<Utc>::from_naive_utc_and_offset(close_today, Utc)
                - chrono::Duration::minutes(self.utc_offset_minutes as i64);
            if self.is_trading_day(cursor) && close_today_utc >= now_utc {
                return close_today_utc;
            }
            cursor += chrono::Duration::days(1);
            cursor = cursor
                .date_naive()
                .and_hms_opt(0, 0, 0)
                .expect("midnight")
                .and_utc();
        }
    }

    /// Advance `from` by `n` trading days, skipping weekends and holidays.
    pub fn add_trading_days(&self, from: DateTime<Utc>, n: u32) -> DateTime<Utc> {
        let mut cursor = from;
        let mut remaining = n;
        while remaining > 0 {
            cursor += chrono::Duration::days(1);
            if self.is_trading_day(cursor) {
                remaining -= 1;
            }
        }
        cursor
    }
}

/// Identifier for a pluggable fee/margin/settlement/fill model variant,
/// resolved against the engine's model registries rather than carried as a
/// trait object (spec §9: "tagged variants whose dispatch is exhaustive").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelId(pub u16);

/// A tradable instrument. Created once at subscription time and never
/// destroyed during a run (spec §3).
#[derive(Debug, Clone)]
pub struct Security {
    pub symbol: Symbol,
    pub price: Decimal,
    pub exchange_hours: ExchangeHours,
    pub quote_currency: String,
    pub properties: SymbolProperties,
    pub tradable: bool,
    pub has_data: bool,
    pub fee_model: ModelId,
    pub margin_model: ModelId,
    pub settlement_model: ModelId,
    pub fill_model: ModelId,
}

impl Security {
    pub fn is_forex(&self) -> bool {
        self.symbol.security_type == crate::symbol::SecurityType::Forex
    }
}

/// Flat, append-only store of [`Security`] values indexed by [`SymbolId`],
/// with a ticker lookup on the side. This is the one place a `Symbol`
/// resolves to a `Security`; nothing else in the crate holds that mapping.
#[derive(Debug, Default)]
pub struct SecurityArena {
    securities: Vec<Security>,
    by_symbol: HashMap<Symbol, SymbolId>,
}

impl SecurityArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, security: Security) -> SymbolId {
        if let Some(existing) = self.by_symbol.get(&security.symbol) {
            return *existing;
        }
        let id = SymbolId::from_index(self.securities.len() as u32);
        self.by_symbol.insert(security.symbol.clone(), id);
        self.securities.push(security);
        id
    }

    pub fn get(&self, id: SymbolId) -> Option<&Security> {
        self.securities.get(id.index())
    }

    pub fn get_mut(&mut self, id: SymbolId) -> Option<&mut Security> {
        self.securities.get_mut(id.index())
    }

    pub fn resolve(&self, symbol: &Symbol) -> Option<SymbolId> {
        self.by_symbol.get(symbol).copied()
    }

    pub fn len(&self) -> usize {
        self.securities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.securities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SymbolId, &Security)> {
        self.securities
            .iter()
            .enumerate()
            .map(|(i, s)| (SymbolId::from_index(i as u32), s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::SecurityType;

    fn test_security(ticker: &str) -> Security {
        Security {
            symbol: Symbol::new(ticker, SecurityType::Equity, "NASDAQ"),
            price: Decimal::new(10000, 2),
            exchange_hours: ExchangeHours::standard_equity_market(-300),
            quote_currency: "USD".into(),
            properties: SymbolProperties::default(),
            tradable: true,
            has_data: true,
            fee_model: ModelId(0),
            margin_model: ModelId(0),
            settlement_model: ModelId(0),
            fill_model: ModelId(0),
        }
    }

    #[test]
    fn arena_is_idempotent_per_symbol() {
        let mut arena = SecurityArena::new();
        let id1 = arena.insert(test_security("AAPL"));
        let id2 = arena.insert(test_security("AAPL"));
        assert_eq!(id1, id2);
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn resolve_finds_inserted_symbol() {
        let mut arena = SecurityArena::new();
        let sym = Symbol::new("MSFT", SecurityType::Equity, "NASDAQ");
        let mut sec = test_security("MSFT");
        sec.symbol = sym.clone();
        let id = arena.insert(sec);
        assert_eq!(arena.resolve(&sym), Some(id));
    }

    #[test]
    fn trading_day_skips_weekend_and_holiday() {
        use chrono::TimeZone;
        let mut hours = ExchangeHours::standard_equity_market(0);
        let monday_holiday = Utc.with_ymd_and_hms(2026, 1, 5, 12, 0, 0).unwrap();
        hours.holidays.push(monday_holiday);

        let saturday = Utc.with_ymd_and_hms(2026, 1, 3, 12, 0, 0).unwrap();
        assert!(!hours.is_trading_day(saturday));
        assert!(!hours.is_trading_day(monday_holiday));

        let tuesday = Utc.with_ymd_and_hms(2026, 1, 6, 12, 0, 0).unwrap();
        assert!(hours.is_trading_day(tuesday));
    }

    #[test]
    fn add_trading_days_skips_weekend() {
        use chrono::TimeZone;
        let hours = ExchangeHours::standard_equity_market(0);
        // Thursday close-of-session + 3 trading days lands on Tuesday.
        let thursday = Utc.with_ymd_and_hms(2026, 1, 1, 16, 0, 0).unwrap();
        let settled = hours.add_trading_days(thursday, 3);
        assert_eq!(settled.weekday(), Weekday::Tue);
    }
}
