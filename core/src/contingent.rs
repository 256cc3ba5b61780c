//! Position-crossing decomposition and the contingent-order queue
//! (spec §4.3).
//!
//! The queue-per-parent shape follows the `HashMap<id, PendingOrder>`
//! tracking idiom used by `other_examples`' `OrderReconciler`
//! (`713e573f_..._order_reconciler.rs`), generalized from one pending
//! order per id to an ordered FIFO of child requests per parent id.

use std::collections::VecDeque;

use dashmap::DashMap;
use rust_decimal::Decimal;

use crate::order::{InternalOrderId, OrderType, SubmitRequest};

/// A closing-then-opening child pair produced when an order would flip
/// the sign of current holdings (spec §4.3).
pub struct Decomposition {
    pub closing_child: SubmitRequest,
    pub opening_child: SubmitRequest,
}

/// Returns `Some` if submitting `delta` against current signed holdings
/// `q` would cross zero (`q * (q + delta) < 0`), decomposed per spec
/// §4.3: the closing child brings the position exactly flat, and the
/// opening child has any stop component converted to its base type.
pub fn decompose_if_crossing(base: &SubmitRequest, current_holdings: Decimal) -> Option<Decomposition> {
    let target = current_holdings + base.quantity;
    if current_holdings.is_zero() || (current_holdings * target) >= Decimal::ZERO {
        return None;
    }

    let closing_quantity = -current_holdings;
    let opening_quantity = base.quantity - closing_quantity;

    let closing_child = SubmitRequest {
        quantity: closing_quantity,
        order_type: OrderType::Market,
        limit_price: None,
        stop_price: None,
        ..base.clone()
    };

    let opening_child = SubmitRequest {
        quantity: opening_quantity,
        order_type: base.order_type.to_base_type(),
        stop_price: if base.order_type.has_stop() { None } else { base.stop_price },
        ..base.clone()
    };

    Some(Decomposition {
        closing_child,
        opening_child,
    })
}

/// FIFO of child submit-requests behind a parent internal order id (spec
/// §3 "ContingentQueue"). Owned exclusively by the Fill Reconciler.
#[derive(Default)]
pub struct ContingentQueue {
    queues: DashMap<InternalOrderId, VecDeque<SubmitRequest>>,
}

impl ContingentQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, parent: InternalOrderId, opening_child: SubmitRequest) {
        let mut queue = VecDeque::new();
        queue.push_back(opening_child);
        self.queues.insert(parent, queue);
    }

    pub fn has_pending(&self, parent: InternalOrderId) -> bool {
        self.queues.get(&parent).map(|q| !q.is_empty()).unwrap_or(false)
    }

    /// Dequeues the next child for `parent`, destroying the queue entry if
    /// it becomes empty.
    pub fn dequeue_next(&self, parent: InternalOrderId) -> Option<SubmitRequest> {
        let (next, now_empty) = {
            let mut queue = self.queues.get_mut(&parent)?;
            let next = queue.pop_front();
            (next, queue.is_empty())
        };
        if now_empty {
            self.queues.remove(&parent);
        }
        next
    }

    /// Destroys the queue for `parent` outright (spec §3: "destroyed ...
    /// when the parent is canceled").
    pub fn cancel(&self, parent: InternalOrderId) {
        self.queues.remove(&parent);
    }
}
