//! Closed error taxonomies for the order lifecycle core.
//!
//! Two enums cover every failure surfaced to the strategy through a
//! ticket or an error event. Anything outside these closed sets (I/O,
//! JSON decoding, pool exhaustion) is carried as `anyhow::Error` at the
//! call boundary instead of being folded into the domain taxonomy.

use thiserror::Error;

/// Rejections produced by the pre-order check pipeline (spec §4.2, §7).
///
/// Exactly one variant per check, in pipeline order. The router never
/// constructs more than one of these per submit attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OrderErrorKind {
    #[error("security is not in the subscribed set")]
    MissingSecurity,
    #[error("order quantity is zero or below the symbol's lot size")]
    ZeroQuantity,
    #[error("security is not marked tradable")]
    NonTradableSecurity,
    #[error("exchange is not currently open")]
    ExchangeNotOpen,
    #[error("security price is not strictly positive")]
    SecurityPriceZero,
    #[error("quote currency is missing from the cash book or has a zero conversion rate")]
    QuoteCurrencyRequired,
    #[error("conversion rate for the security's currency is zero")]
    ConversionRateZero,
    #[error("forex order requires both base and quote currency entries in the cash book")]
    ForexBaseAndQuoteCurrenciesRequired,
    #[error("forex base currency conversion rate is zero")]
    ForexConversionRateZero,
    #[error("security has no data point yet")]
    SecurityHasNoData,
    #[error("maximum order count for this run has been exceeded")]
    ExceededMaximumOrders,
    #[error("market-on-close order submitted past the cutoff before the next market close")]
    MarketOnCloseOrderTooLate,
}

/// Non-fatal and fatal kinds emitted by the fill reconciliation engine
/// (spec §7). Fatal kinds additionally terminate the algorithm on
/// delivery; see [`ReconcilerErrorKind::is_fatal`].
#[derive(Debug, Clone, Error)]
pub enum ReconcilerErrorKind {
    #[error("failed to decode brokerage response: {0}")]
    JsonError(String),
    #[error("order was already filled when an update was received")]
    OrderAlreadyFilled,
    #[error("brokerage rejected an order update request")]
    UpdateRejected,
    #[error("order update request failed: {0}")]
    UpdateFailed(String),
    #[error("brokerage reported a generic order error: {0}")]
    OrderError(String),
    #[error("brokerage returned an empty response where one was expected")]
    NullResponse,
    #[error("a tracked pending order was not returned by the brokerage")]
    PendingOrderNotReturned,
    #[error("failed to poll for fills: {0}")]
    CheckForFillsError(String),
    #[error("unknown order id could not be resolved: {0}")]
    UnknownIdResolution(String),
    #[error("contingent order bookkeeping error: {0}")]
    ContingentOrderError(String),
    #[error("submission of a contingent child order failed: {0}")]
    ContingentOrderFailed(String),
    #[error("brokerage adapter can only track one open order per symbol")]
    OneOrderPerSymbol,
    #[error("session token refresh failed")]
    RefreshSession,
    #[error("brokerage reported an order id the engine has no record of: {0}")]
    UnknownOrderId(String),
}

impl ReconcilerErrorKind {
    /// Fatal kinds terminate the algorithm on delivery (spec §6, §7).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ReconcilerErrorKind::RefreshSession | ReconcilerErrorKind::UnknownOrderId(_)
        )
    }
}
