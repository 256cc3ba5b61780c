//! The strategy-facing event bus and the error-event channel (spec §6,
//! §9 "Events / callbacks").
//!
//! The order-event bus is a bounded, single-consumer queue: the
//! reconciler and router push, the strategy drains between time slices
//! and never itself pushes, guaranteeing per-symbol event order (spec
//! §5). Severity tagging for the error channel is grounded in the
//! teacher's `monitoring::alerts::AlertSeverity`, trimmed to the two
//! tiers spec §6 actually names.

use tokio::sync::mpsc;

use crate::order::OrderEvent;

/// Non-fatal items are informational; fatal items terminate the algorithm
/// on delivery (spec §6, §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct ErrorEvent {
    pub severity: ErrorSeverity,
    pub code: String,
    pub message: String,
}

impl ErrorEvent {
    pub fn warning(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: ErrorSeverity::Warning,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn fatal(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: ErrorSeverity::Error,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == ErrorSeverity::Error
    }
}

/// Default channel capacity; bounded so a stalled strategy applies
/// backpressure to the reconciler rather than letting memory grow
/// unbounded.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 4096;

/// The strategy-facing order-event bus: one sender side shared by the
/// router and reconciler, one receiver side owned exclusively by the
/// strategy runner.
pub fn order_event_channel(capacity: usize) -> (mpsc::Sender<OrderEvent>, mpsc::Receiver<OrderEvent>) {
    mpsc::channel(capacity)
}

/// The error-event channel (spec §6 "Error-event channel").
pub fn error_event_channel(capacity: usize) -> (mpsc::Sender<ErrorEvent>, mpsc::Receiver<ErrorEvent>) {
    mpsc::channel(capacity)
}
