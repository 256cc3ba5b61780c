//! Symbol identity and the arena index used to refer to a [`crate::security::Security`]
//! without holding a live reference to it (spec §9, "Cyclic references").

use std::fmt;

/// Instrument class tag carried by a [`Symbol`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum SecurityType {
    Equity,
    Forex,
    Cfd,
    Option,
    Base,
}

impl fmt::Display for SecurityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SecurityType::Equity => "equity",
            SecurityType::Forex => "forex",
            SecurityType::Cfd => "cfd",
            SecurityType::Option => "option",
            SecurityType::Base => "base",
        };
        f.write_str(s)
    }
}

/// Opaque identity of a tradable instrument: ticker plus instrument class
/// plus market. Two symbols are equal only if all three match, so the same
/// ticker can be subscribed on more than one market without collision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Symbol {
    pub ticker: String,
    pub security_type: SecurityType,
    pub market: String,
}

impl Symbol {
    pub fn new(ticker: impl Into<String>, security_type: SecurityType, market: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            security_type,
            market: market.into(),
        }
    }

    pub fn equity(ticker: impl Into<String>, market: impl Into<String>) -> Self {
        Self::new(ticker, SecurityType::Equity, market)
    }

    /// Forex symbol for the ordered currency pair `base/quote`, e.g. `EURUSD`.
    pub fn forex(base: &str, quote: &str, market: impl Into<String>) -> Self {
        Self::new(format!("{base}{quote}"), SecurityType::Forex, market)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.market, self.ticker, self.security_type)
    }
}

/// Index into the engine's security arena. Never dereferenced without going
/// through a `SecurityArena`/`PortfolioContext` accessor; no type in this
/// crate stores a live `&Security` across an await point or a lock release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct SymbolId(u32);

impl SymbolId {
    pub const fn from_index(index: u32) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sym#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_equality_accounts_for_market_and_type() {
        let a = Symbol::equity("AAPL", "NASDAQ");
        let b = Symbol::equity("AAPL", "NYSE");
        let c = Symbol::new("AAPL", SecurityType::Forex, "NASDAQ");
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, Symbol::equity("AAPL", "NASDAQ"));
    }

    #[test]
    fn forex_symbol_concatenates_pair() {
        let eurusd = Symbol::forex("EUR", "USD", "OANDA");
        assert_eq!(eurusd.ticker, "EURUSD");
        assert_eq!(eurusd.security_type, SecurityType::Forex);
    }
}
