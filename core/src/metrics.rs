//! Prometheus metrics for the order lifecycle core.
//!
//! Trimmed from the teacher's `monitoring::metrics::MetricsRegistry` (which
//! also carries market-data-feed and latency-microbenchmark gauges that
//! have no counterpart here) down to the families this core actually
//! emits: order/fill/reconciliation/cash.

use std::sync::Arc;

use prometheus::{Counter, CounterVec, Gauge, GaugeVec, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use tracing::info;

#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Arc<Registry>,
    orders: Arc<OrderMetrics>,
    reconciliation: Arc<ReconciliationMetrics>,
    cash: Arc<CashMetrics>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Arc::new(Registry::new());
        let orders = Arc::new(OrderMetrics::new(&registry)?);
        let reconciliation = Arc::new(ReconciliationMetrics::new(&registry)?);
        let cash = Arc::new(CashMetrics::new(&registry)?);
        info!("metrics registry initialized");
        Ok(Self {
            registry,
            orders,
            reconciliation,
            cash,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn orders(&self) -> &OrderMetrics {
        &self.orders
    }

    pub fn reconciliation(&self) -> &ReconciliationMetrics {
        &self.reconciliation
    }

    pub fn cash(&self) -> &CashMetrics {
        &self.cash
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new().unwrap_or_else(|e| {
            tracing::error!("failed to create metrics registry: {}", e);
            panic!("cannot create metrics registry")
        })
    }
}

pub struct OrderMetrics {
    pub submitted_total: IntCounterVec,
    pub rejected_total: IntCounterVec,
    pub filled_total: IntCounter,
    pub canceled_total: IntCounter,
    pub fill_quantity: Histogram,
}

impl OrderMetrics {
    fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let submitted_total = IntCounterVec::new(
            Opts::new("orders_submitted_total", "Total orders submitted").namespace("brokerage_core"),
            &["order_type"],
        )?;
        registry.register(Box::new(submitted_total.clone()))?;

        let rejected_total = IntCounterVec::new(
            Opts::new("orders_rejected_total", "Total orders rejected by the pre-order pipeline")
                .namespace("brokerage_core"),
            &["reason"],
        )?;
        registry.register(Box::new(rejected_total.clone()))?;

        let filled_total = IntCounter::with_opts(
            Opts::new("orders_filled_total", "Total orders reaching terminal Filled").namespace("brokerage_core"),
        )?;
        registry.register(Box::new(filled_total.clone()))?;

        let canceled_total = IntCounter::with_opts(
            Opts::new("orders_canceled_total", "Total orders reaching terminal Canceled").namespace("brokerage_core"),
        )?;
        registry.register(Box::new(canceled_total.clone()))?;

        let fill_quantity = Histogram::with_opts(
            HistogramOpts::new("order_fill_quantity", "Distribution of per-event fill quantities")
                .namespace("brokerage_core"),
        )?;
        registry.register(Box::new(fill_quantity.clone()))?;

        Ok(Self {
            submitted_total,
            rejected_total,
            filled_total,
            canceled_total,
            fill_quantity,
        })
    }
}

pub struct ReconciliationMetrics {
    pub ticks_total: IntCounter,
    pub unknown_ids_total: IntCounter,
    pub fatal_errors_total: IntCounter,
    pub tick_duration: Histogram,
    pub cached_open_orders: IntGauge,
}

impl ReconciliationMetrics {
    fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let ticks_total = IntCounter::with_opts(
            Opts::new("reconciliation_ticks_total", "Total reconciliation poll ticks completed")
                .namespace("brokerage_core"),
        )?;
        registry.register(Box::new(ticks_total.clone()))?;

        let unknown_ids_total = IntCounter::with_opts(
            Opts::new("reconciliation_unknown_ids_total", "Total brokerage ids not resolvable to a cached order")
                .namespace("brokerage_core"),
        )?;
        registry.register(Box::new(unknown_ids_total.clone()))?;

        let fatal_errors_total = IntCounter::with_opts(
            Opts::new("reconciliation_fatal_errors_total", "Total fatal reconciler errors emitted")
                .namespace("brokerage_core"),
        )?;
        registry.register(Box::new(fatal_errors_total.clone()))?;

        let tick_duration = Histogram::with_opts(
            HistogramOpts::new("reconciliation_tick_duration_seconds", "Wall time per reconciliation tick")
                .namespace("brokerage_core"),
        )?;
        registry.register(Box::new(tick_duration.clone()))?;

        let cached_open_orders = IntGauge::with_opts(
            Opts::new("reconciliation_cached_open_orders", "Current size of the cached open order map")
                .namespace("brokerage_core"),
        )?;
        registry.register(Box::new(cached_open_orders.clone()))?;

        Ok(Self {
            ticks_total,
            unknown_ids_total,
            fatal_errors_total,
            tick_duration,
            cached_open_orders,
        })
    }
}

pub struct CashMetrics {
    pub balance_by_currency: GaugeVec,
    pub unsettled_total: Gauge,
    pub conversions_total: CounterVec,
    pub margin_calls_total: IntCounter,
}

impl CashMetrics {
    fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let balance_by_currency = GaugeVec::new(
            Opts::new("cash_balance", "Settled cash balance by currency").namespace("brokerage_core"),
            &["currency"],
        )?;
        registry.register(Box::new(balance_by_currency.clone()))?;

        let unsettled_total = Gauge::with_opts(
            Opts::new("cash_unsettled_total", "Total unsettled cash across all currencies, in account currency")
                .namespace("brokerage_core"),
        )?;
        registry.register(Box::new(unsettled_total.clone()))?;

        let conversions_total = CounterVec::new(
            Opts::new("cash_conversions_total", "Total currency conversion operations").namespace("brokerage_core"),
            &["from", "to"],
        )?;
        registry.register(Box::new(conversions_total.clone()))?;

        let margin_calls_total = IntCounter::with_opts(
            Opts::new("margin_calls_total", "Total margin call liquidation orders generated").namespace("brokerage_core"),
        )?;
        registry.register(Box::new(margin_calls_total.clone()))?;

        Ok(Self {
            balance_by_currency,
            unsettled_total,
            conversions_total,
            margin_calls_total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_construction_registers_all_families() {
        let metrics = MetricsRegistry::new().expect("metrics registry should construct");
        metrics.orders().submitted_total.with_label_values(&["Market"]).inc();
        metrics.reconciliation().ticks_total.inc();
        metrics.cash().balance_by_currency.with_label_values(&["USD"]).set(1000.0);
        let families = metrics.registry().gather();
        assert!(!families.is_empty());
    }
}
