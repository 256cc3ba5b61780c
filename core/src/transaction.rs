//! Transaction Manager: the order ticket registry (spec §3, §4.9).
//!
//! Stateless apart from the registry itself; style grounded in the
//! teacher's atomic-counter registries (`engine::position_reconciliation`),
//! generalized to an id allocator plus a `DashMap`-backed ticket table.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};

use crate::order::{InternalOrderId, OrderTicket, SubmitRequest};
use crate::order_fsm::OrderStatus;
use crate::symbol::SymbolId;

/// Blocking primitive backing `waitForOrder` (spec §4.9). One per ticket;
/// the reconciler and router both notify it as the ticket's status
/// changes.
struct TicketWaiter {
    lock: Mutex<bool>,
    condvar: Condvar,
}

impl TicketWaiter {
    fn new() -> Self {
        Self {
            lock: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    fn notify_terminal(&self) {
        let mut done = self.lock.lock();
        *done = true;
        self.condvar.notify_all();
    }

    fn wait(&self) {
        let mut done = self.lock.lock();
        while !*done {
            self.condvar.wait(&mut done);
        }
    }
}

/// Registry + blocking primitive for order tickets (spec §4.9).
pub struct TransactionManager {
    next_id: AtomicU64,
    tickets: DashMap<InternalOrderId, OrderTicket>,
    waiters: DashMap<InternalOrderId, Arc<TicketWaiter>>,
    orders_count: AtomicU64,
    max_orders: AtomicU64,
}

impl TransactionManager {
    pub fn new(max_orders: u64) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            tickets: DashMap::new(),
            waiters: DashMap::new(),
            orders_count: AtomicU64::new(0),
            max_orders: AtomicU64::new(max_orders),
        }
    }

    /// Effective only before the algorithm is locked (spec §4.1
    /// `setMaximumOrders`); the router enforces that externally.
    pub fn set_maximum_orders(&self, n: u64) {
        self.max_orders.store(n, Ordering::SeqCst);
    }

    pub fn maximum_orders(&self) -> u64 {
        self.max_orders.load(Ordering::SeqCst)
    }

    pub fn orders_count(&self) -> u64 {
        self.orders_count.load(Ordering::SeqCst)
    }

    /// Assigns a monotonic internal id, registers a ticket in `New`
    /// status, and returns the id. Does not check `maxOrders`; that is
    /// pre-order-check #9, evaluated by the router before this is called.
    pub fn register(&self, request: SubmitRequest) -> InternalOrderId {
        let id = InternalOrderId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.orders_count.fetch_add(1, Ordering::SeqCst);
        self.tickets.insert(id, OrderTicket::new(id, request));
        self.waiters.insert(id, Arc::new(TicketWaiter::new()));
        id
    }

    /// Registers an already-rejected ticket (pre-order check failure) so
    /// it still occupies a slot in the registry and counts against
    /// `ordersCount`.
    pub fn register_invalid(&self, request: SubmitRequest, error: crate::error::OrderErrorKind) -> InternalOrderId {
        let id = InternalOrderId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.orders_count.fetch_add(1, Ordering::SeqCst);
        self.tickets.insert(id, OrderTicket::invalid(id, request, error));
        id
    }

    pub fn ticket(&self, id: InternalOrderId) -> Option<OrderTicket> {
        self.tickets.get(&id).map(|t| t.clone())
    }

    /// Applies an event to the ticket, notifying any blocked waiter if the
    /// resulting status is terminal.
    pub fn apply_event(&self, event: &crate::order::OrderEvent) {
        let became_terminal = {
            let mut ticket = match self.tickets.get_mut(&event.internal_order_id) {
                Some(t) => t,
                None => return,
            };
            ticket.apply_event(event);
            ticket.status.is_terminal()
        };
        if became_terminal {
            if let Some(waiter) = self.waiters.get(&event.internal_order_id) {
                waiter.notify_terminal();
            }
        }
    }

    /// Blocks the calling thread until `id`'s ticket reaches a terminal
    /// status (spec §4.9 `waitForOrder`).
    pub fn wait_for_order(&self, id: InternalOrderId) -> Option<OrderTicket> {
        if let Some(waiter) = self.waiters.get(&id) {
            let waiter = waiter.clone();
            waiter.wait();
        }
        self.ticket(id)
    }

    /// Consistent snapshot of open (non-terminal) tickets, optionally
    /// filtered by symbol (spec §4.9 `getOpenOrders`).
    pub fn open_orders(&self, symbol: Option<SymbolId>) -> Vec<OrderTicket> {
        self.tickets
            .iter()
            .filter(|t| !t.status.is_terminal())
            .filter(|t| symbol.map(|s| t.request.symbol == s).unwrap_or(true))
            .map(|t| t.clone())
            .collect()
    }

    pub fn has_open_order_for_symbol(&self, symbol: SymbolId) -> bool {
        self.tickets.iter().any(|t| !t.status.is_terminal() && t.request.symbol == symbol)
    }
}
