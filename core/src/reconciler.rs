//! Fill Reconciliation Engine (spec §4.4): the polling diff loop between
//! the local `CachedOpenOrder` map and the brokerage's authoritative view.
//!
//! Shaped after the teacher's `engine::position_reconciliation::PositionReconciler`
//! (periodic diff against an external source of truth, drift counters,
//! halt-on-mismatch policy) generalized from a single scalar position
//! comparison to a per-brokerage-id order diff, and after
//! `other_examples`' `OrderReconciler` (`713e573f_..._order_reconciler.rs`)
//! for the pending/tentative-until-synced and TTL-guarded-inflight-lookup
//! idioms.
//!
//! # Lossy fill price (spec §9 Open Question, resolved)
//!
//! `fresh.last_fill_price` is the brokerage's *most recent* fill price.
//! When more than one fill lands within a single poll interval, the
//! intermediate prices are lost — the emitted `OrderEvent` reports the
//! aggregate `fillQuantity` at the *last* fill's price, not a
//! quantity-weighted average across the interval's fills. This is
//! accepted as documented lossy behavior rather than inventing a richer
//! per-fill brokerage API.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::brokerage::{convert_direction, convert_order_type, convert_status, BrokerageAdapter, SubmitOutcome, WireOrder, WireStatus};
use crate::contingent::ContingentQueue;
use crate::error::ReconcilerErrorKind;
use crate::events::ErrorEvent;
use crate::fees::FeeModel;
use crate::order::{InternalOrderId, OrderEvent, SubmitRequest};
use crate::order_fsm::OrderStatus;
use crate::symbol::SymbolId;
use crate::transaction::TransactionManager;

/// Number of recently-terminated brokerage ids remembered so a legitimate
/// late fill is never mistaken for a protocol-corrupting unknown id
/// (spec §3 "Filled ring").
pub const FILLED_RING_CAPACITY: usize = 10_000;

/// Delay before the deferred unknown-id verification pass (spec §4.4).
pub const UNKNOWN_ID_VERIFICATION_DELAY: Duration = Duration::from_secs(2);

/// Window searched for a recently-Rejected order when resolving an
/// outstanding unknown id (spec §4.4).
pub const RECENTLY_REJECTED_WINDOW: Duration = Duration::from_secs(60);

/// The last known brokerage view of an open order, plus the one-shot fee
/// flag (spec §3 "CachedOpenOrder").
#[derive(Debug, Clone)]
pub struct CachedOpenOrder {
    pub internal_id: InternalOrderId,
    pub symbol: SymbolId,
    /// +1 for a buy-side order, -1 for a sell-side order; applied to the
    /// wire's unsigned executed/remaining magnitudes to recover sign.
    pub direction: Decimal,
    pub total_quantity: Decimal,
    pub executed_magnitude: Decimal,
    pub remaining_magnitude: Decimal,
    pub status: OrderStatus,
    pub emitted_fee: bool,
}

impl CachedOpenOrder {
    pub fn new(internal_id: InternalOrderId, symbol: SymbolId, signed_quantity: Decimal) -> Self {
        Self {
            internal_id,
            symbol,
            direction: if signed_quantity.is_sign_negative() { -Decimal::ONE } else { Decimal::ONE },
            total_quantity: signed_quantity,
            executed_magnitude: Decimal::ZERO,
            remaining_magnitude: signed_quantity.abs(),
            status: OrderStatus::New,
            emitted_fee: false,
        }
    }
}

/// Bounded FIFO of recently-terminated brokerage ids (spec §3 "Filled
/// ring"), with O(1) membership testing via a side `DashSet`.
pub struct FilledRing {
    capacity: usize,
    order: Mutex<std::collections::VecDeque<String>>,
    members: DashSet<String>,
}

impl FilledRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: Mutex::new(std::collections::VecDeque::with_capacity(capacity)),
            members: DashSet::new(),
        }
    }

    pub fn insert(&self, id: String) {
        if self.members.contains(&id) {
            return;
        }
        let mut order = self.order.lock();
        order.push_back(id.clone());
        self.members.insert(id);
        if order.len() > self.capacity {
            if let Some(evicted) = order.pop_front() {
                self.members.remove(&evicted);
            }
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.members.contains(id)
    }

    pub fn len(&self) -> usize {
        self.order.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for FilledRing {
    fn default() -> Self {
        Self::new(FILLED_RING_CAPACITY)
    }
}

/// Result of diffing one cached order against the brokerage's fresh view
/// (spec §4.4 `processUpdate`). `None` means nothing changed.
fn process_update(
    cached: &mut CachedOpenOrder,
    fresh: &WireOrder,
    fee_model: &FeeModel,
    now: DateTime<Utc>,
) -> Option<OrderEvent> {
    let fresh_status = convert_status(fresh.status);
    if fresh.remaining == cached.remaining_magnitude && fresh_status == cached.status {
        return None;
    }

    let executed_delta = fresh.executed - cached.executed_magnitude;
    let signed_fill_quantity = executed_delta * cached.direction;

    let fee = if !cached.emitted_fee && !signed_fill_quantity.is_zero() {
        cached.emitted_fee = true;
        fee_model.compute(cached.total_quantity, fresh.last_fill_price)
    } else {
        Decimal::ZERO
    };

    let event = OrderEvent::new(cached.internal_id, fresh_status, now)
        .with_fill(fresh.last_fill_price, signed_fill_quantity)
        .with_fee(fee);

    cached.executed_magnitude = fresh.executed;
    cached.remaining_magnitude = fresh.remaining;
    cached.status = fresh_status;

    Some(event)
}

/// Drives the polling loop (spec §4.4). Owns the `CachedOpenOrder` map and
/// the `ContingentQueue` exclusively (spec §3 "Ownership").
pub struct FillReconciler<A: BrokerageAdapter> {
    adapter: Arc<A>,
    fee_model: FeeModel,
    cached: DashMap<String, CachedOpenOrder>,
    contingent: Arc<ContingentQueue>,
    transactions: Arc<TransactionManager>,
    filled_ring: FilledRing,
    /// At-most-one-inflight-per-id guard for out-of-band resolution of a
    /// cached id that vanished from the fetch (spec §4.4 step 2).
    resolve_inflight: DashSet<String>,
    /// Ids observed in the fetch that match neither the cache nor the
    /// filled ring (spec §4.4 step 3), awaiting deferred verification.
    unknown: DashSet<String>,
    /// Reentrance guard for contingent-queue chaining, keyed by parent
    /// internal id (spec §4.4 "Contingent chaining").
    chaining_inflight: DashSet<InternalOrderId>,
    /// Non-reentrant tick lock; a failed `try_lock` returns immediately
    /// rather than blocking (spec §5 lock (b)).
    tick_lock: Mutex<()>,
    init_time: DateTime<Utc>,
    event_tx: mpsc::Sender<OrderEvent>,
    error_tx: mpsc::Sender<ErrorEvent>,
    deferred_scheduled: AtomicBool,
}

impl<A: BrokerageAdapter + 'static> FillReconciler<A> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        adapter: Arc<A>,
        fee_model: FeeModel,
        contingent: Arc<ContingentQueue>,
        transactions: Arc<TransactionManager>,
        event_tx: mpsc::Sender<OrderEvent>,
        error_tx: mpsc::Sender<ErrorEvent>,
        init_time: DateTime<Utc>,
    ) -> Self {
        Self {
            adapter,
            fee_model,
            cached: DashMap::new(),
            contingent,
            transactions,
            filled_ring: FilledRing::default(),
            resolve_inflight: DashSet::new(),
            unknown: DashSet::new(),
            chaining_inflight: DashSet::new(),
            tick_lock: Mutex::new(()),
            init_time,
            event_tx,
            error_tx,
            deferred_scheduled: AtomicBool::new(false),
        }
    }

    /// Registers a newly-submitted brokerage order for tracking.
    pub fn track(&self, brokerage_id: String, internal_id: InternalOrderId, symbol: SymbolId, signed_quantity: Decimal) {
        self.cached.insert(brokerage_id, CachedOpenOrder::new(internal_id, symbol, signed_quantity));
    }

    pub fn cached_len(&self) -> usize {
        self.cached.len()
    }

    pub fn filled_ring_len(&self) -> usize {
        self.filled_ring.len()
    }

    /// One reconciliation tick (spec §4.4). Returns immediately without
    /// polling if a previous tick is still in flight — this MUST NOT block
    /// the strategy thread (spec §5).
    pub async fn tick(self: &Arc<Self>, now: DateTime<Utc>) -> anyhow::Result<()> {
        let _guard = match self.tick_lock.try_lock() {
            Some(guard) => guard,
            None => {
                debug!("reconciliation tick already in progress, skipping");
                return Ok(());
            }
        };

        let fresh_orders = self.adapter.get_open_orders().await?;
        let fresh_by_id: HashMap<&str, &WireOrder> = fresh_orders.iter().map(|o| (o.id.as_str(), o)).collect();

        let cached_ids: Vec<String> = self.cached.iter().map(|e| e.key().clone()).collect();
        for id in cached_ids {
            match fresh_by_id.get(id.as_str()) {
                Some(fresh) => self.apply_fresh_order(&id, fresh, now).await,
                None => self.resolve_missing(id, now).await,
            }
        }

        let mut new_unknowns = false;
        for order in &fresh_orders {
            if self.cached.contains_key(&order.id) {
                continue;
            }
            if order.transaction_date <= self.init_time {
                continue;
            }
            if self.filled_ring.contains(&order.id) {
                continue;
            }
            if self.unknown.insert(order.id.clone()) {
                new_unknowns = true;
            }
        }

        if new_unknowns && !self.deferred_scheduled.swap(true, Ordering::SeqCst) {
            self.schedule_unknown_verification();
        }

        Ok(())
    }

    /// Applies a fresh brokerage view to the matching cached entry: fires
    /// an `OrderEvent` if anything changed, chains the contingent queue on
    /// Filled, and retires terminal orders into the filled ring.
    async fn apply_fresh_order(self: &Arc<Self>, id: &str, fresh: &WireOrder, now: DateTime<Utc>) {
        let (event, symbol) = {
            let mut cached = match self.cached.get_mut(id) {
                Some(c) => c,
                None => return,
            };
            let symbol = cached.symbol;
            (process_update(&mut cached, fresh, &self.fee_model, now), symbol)
        };

        let Some(mut event) = event else { return };

        if event.status.is_terminal() {
            self.cached.remove(id);
            self.filled_ring.insert(id.to_string());
        }

        if event.status == OrderStatus::Canceled {
            // Spec §3 "ContingentQueue" lifecycle: destroyed when the
            // parent is canceled, whether or not any child was pending.
            self.contingent.cancel(event.internal_order_id);
        }

        if event.status == OrderStatus::Filled {
            event = self.chain_contingent_if_pending(event, symbol, &fresh.symbol).await;
        }

        self.transactions.apply_event(&event);
        if self.event_tx.send(event).await.is_err() {
            warn!("order event receiver dropped; strategy is no longer consuming events");
        }
    }

    /// Contingent chaining (spec §4.4): under a per-parent-id reentrance
    /// guard, dequeue and submit the next child. While any contingent
    /// remains for this parent, the reported status is downgraded to
    /// `PartiallyFilled`; the true `Filled` is reported only once the
    /// queue is empty at the moment of the final fill.
    async fn chain_contingent_if_pending(self: &Arc<Self>, mut event: OrderEvent, symbol: SymbolId, symbol_ticker: &str) -> OrderEvent {
        let parent = event.internal_order_id;
        if !self.contingent.has_pending(parent) {
            return event;
        }
        if !self.chaining_inflight.insert(parent) {
            // Another task is already chaining this parent; report partial
            // and let that task finish the dequeue.
            event.status = OrderStatus::PartiallyFilled;
            return event;
        }

        let next_child = self.contingent.dequeue_next(parent);
        self.chaining_inflight.remove(&parent);

        match next_child {
            Some(child) => {
                event.status = OrderStatus::PartiallyFilled;
                self.spawn_child_submission(parent, symbol, symbol_ticker.to_string(), child);
            }
            None => {
                // Queue was already empty: this really is the final fill.
            }
        }
        event
    }

    /// Submits a contingent child asynchronously on the worker task pool,
    /// never on the strategy thread (spec §4.4, §5). The closing child has
    /// just brought the position exactly flat, so the opening child's
    /// holdings-aware wire direction is always computed against zero
    /// holdings (spec §4.3, §4.5).
    fn spawn_child_submission(self: &Arc<Self>, parent: InternalOrderId, symbol: SymbolId, symbol_ticker: String, child: SubmitRequest) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let direction = convert_direction(child.quantity, Decimal::ZERO);
            let wire_type = convert_order_type(child.order_type);
            let result = this
                .adapter
                .place_order(
                    &symbol_ticker,
                    direction,
                    wire_type,
                    child.quantity.abs(),
                    child.limit_price,
                    child.stop_price,
                    child.duration,
                )
                .await;

            match result {
                Ok(SubmitOutcome::Accepted { brokerage_id }) => {
                    this.track(brokerage_id, parent, symbol, child.quantity);
                }
                Ok(SubmitOutcome::Rejected { errors }) => {
                    let message = format!("contingent child for {parent} rejected: {}", errors.join("; "));
                    warn!(%message, "contingent child submission rejected");
                    let _ = this.error_tx.send(ErrorEvent::warning("ContingentOrderFailed", message)).await;
                }
                Err(err) => {
                    let message = format!("contingent child for {parent} failed: {err}");
                    warn!(%message, "contingent child submission errored");
                    let _ = this.error_tx.send(ErrorEvent::warning("ContingentOrderFailed", message)).await;
                }
            }
        });
    }

    /// Out-of-band resolution for a cached id that disappeared from the
    /// fetch (spec §4.4 step 2, scenario 5). At most one inflight lookup
    /// per id.
    async fn resolve_missing(self: &Arc<Self>, id: String, now: DateTime<Utc>) {
        if !self.resolve_inflight.insert(id.clone()) {
            return;
        }
        match self.adapter.get_order(&id).await {
            Ok(Some(fresh)) => self.apply_fresh_order(&id, &fresh, now).await,
            Ok(None) => {
                warn!(brokerage_id = %id, "order missing from brokerage fetch and single-order lookup");
                let _ = self
                    .error_tx
                    .send(ErrorEvent::warning("PendingOrderNotReturned", format!("order {id} vanished from brokerage state")))
                    .await;
            }
            Err(err) => {
                let _ = self
                    .error_tx
                    .send(ErrorEvent::warning("CheckForFillsError", err.to_string()))
                    .await;
            }
        }
        self.resolve_inflight.remove(&id);
    }

    /// Schedules the 2-second deferred unknown-id verification pass on the
    /// worker task pool (spec §4.4 "Deferred unknown-id verification").
    fn schedule_unknown_verification(self: &Arc<Self>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(UNKNOWN_ID_VERIFICATION_DELAY).await;
            this.verify_unknown_ids().await;
            this.deferred_scheduled.store(false, Ordering::SeqCst);
        });
    }

    /// After the 2s delay: resolve each outstanding unknown id via a direct
    /// lookup, then against the recently-Rejected window; anything still
    /// unresolved is a fatal protocol error (spec §4.4, §7 `UnknownOrderId`).
    async fn verify_unknown_ids(&self) {
        let ids: Vec<String> = self.unknown.iter().map(|id| id.clone()).collect();
        if ids.is_empty() {
            return;
        }

        let mut still_unknown = Vec::new();
        for id in &ids {
            match self.adapter.get_order(id).await {
                Ok(Some(_)) => {
                    self.unknown.remove(id);
                }
                Ok(None) => still_unknown.push(id.clone()),
                Err(_) => still_unknown.push(id.clone()),
            }
        }

        if still_unknown.is_empty() {
            return;
        }

        let since = Utc::now() - chrono::Duration::from_std(RECENTLY_REJECTED_WINDOW).expect("fixed duration");
        let rejected = self
            .adapter
            .get_recent_orders(&[WireStatus::Rejected], since)
            .await
            .unwrap_or_default();
        let rejected_ids: std::collections::HashSet<&str> = rejected.iter().map(|o| o.id.as_str()).collect();

        let mut truly_unresolved = Vec::new();
        for id in still_unknown {
            if rejected_ids.contains(id.as_str()) {
                self.unknown.remove(&id);
            } else {
                truly_unresolved.push(id);
            }
        }

        for id in &truly_unresolved {
            self.unknown.remove(id);
        }

        if !truly_unresolved.is_empty() {
            let message = format!("unresolved brokerage order ids: {}", truly_unresolved.join(", "));
            tracing::error!(%message, "fatal: unknown order id could not be resolved");
            let _ = self.error_tx.send(ErrorEvent::fatal("UnknownOrderId", message)).await;
        }
    }
}
