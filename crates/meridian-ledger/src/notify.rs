//! # Notification Sink
//!
//! Routes operation outcomes to whoever is watching: toasts in a desktop
//! shell, log lines in headless runs, a buffer in tests.
//!
//! ## Severity Policy
//! ```text
//! Success - payment recorded and applied as planned
//! Warning - payment recorded but auto-apply did not run to completion
//!           (the money is safe; allocation can be retried)
//! Error   - an over-applied receipt was repaired; staff should review
//!           the affected invoices
//! ```

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use ts_rs::TS;

// =============================================================================
// Notification Types
// =============================================================================

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum NotifyKind {
    Success,
    Warning,
    Error,
}

/// A user-facing notification about a ledger operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub kind: NotifyKind,
    pub title: String,
    pub message: String,
}

impl Notification {
    pub fn success(title: impl Into<String>, message: impl Into<String>) -> Self {
        Notification {
            kind: NotifyKind::Success,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn warning(title: impl Into<String>, message: impl Into<String>) -> Self {
        Notification {
            kind: NotifyKind::Warning,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Notification {
            kind: NotifyKind::Error,
            title: title.into(),
            message: message.into(),
        }
    }
}

// =============================================================================
// Sink Trait
// =============================================================================

/// Destination for notifications.
///
/// The reconciler calls this synchronously after each operation; sinks
/// must be cheap and must never fail the operation that produced the
/// notification.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: &Notification);
}

/// Sink that writes notifications to the tracing log.
///
/// The default for headless runs and services.
#[derive(Debug, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, notification: &Notification) {
        match notification.kind {
            NotifyKind::Success => {
                info!(title = %notification.title, "{}", notification.message)
            }
            NotifyKind::Warning => {
                warn!(title = %notification.title, "{}", notification.message)
            }
            NotifyKind::Error => {
                error!(title = %notification.title, "{}", notification.message)
            }
        }
    }
}

/// Sink that buffers notifications in memory.
///
/// For tests, and for UIs that poll rather than push.
#[derive(Debug, Default)]
pub struct MemorySink {
    buffer: Mutex<Vec<Notification>>,
}

impl MemorySink {
    pub fn new() -> Self {
        MemorySink::default()
    }

    /// Drains and returns all buffered notifications.
    pub fn take(&self) -> Vec<Notification> {
        match self.buffer.lock() {
            Ok(mut buf) => std::mem::take(&mut *buf),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl NotificationSink for MemorySink {
    fn notify(&self, notification: &Notification) {
        if let Ok(mut buf) = self.buffer.lock() {
            buf.push(notification.clone());
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_buffers_and_drains() {
        let sink = MemorySink::new();
        sink.notify(&Notification::success("Payment recorded", "ADV-0001"));
        sink.notify(&Notification::warning("Allocation deferred", "retry"));

        let taken = sink.take();
        assert_eq!(taken.len(), 2);
        assert_eq!(taken[0].kind, NotifyKind::Success);
        assert_eq!(taken[1].kind, NotifyKind::Warning);

        assert!(sink.take().is_empty());
    }

    #[test]
    fn constructors_set_kind() {
        assert_eq!(Notification::error("t", "m").kind, NotifyKind::Error);
        assert_eq!(Notification::success("t", "m").kind, NotifyKind::Success);
    }
}
