//! # Outbox Processor
//!
//! Drains the ledger_outbox table and republishes entries on the event bus.
//!
//! ## Outbox Processing Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Outbox Processor Flow                                │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    ledger_outbox Table                          │   │
//! │  │                                                                 │   │
//! │  │  id | entity_type      | action  | payload | published_at      │   │
//! │  │  ───┼──────────────────┼─────────┼─────────┼───────────────────│   │
//! │  │  1  │ ADVANCE_PAYMENT  │ created │ {...}   │ NULL              │   │
//! │  │  2  │ ADVANCE_PAYMENT  │ updated │ {...}   │ NULL              │   │
//! │  └────────────────────────────┬────────────────────────────────────┘   │
//! │                               │                                         │
//! │                               ▼                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    OutboxProcessor                              │   │
//! │  │                                                                 │   │
//! │  │  1. Poll: get_pending(batch) every poll_interval               │   │
//! │  │  2. Parse: payload JSON → PaymentEvent                         │   │
//! │  │  3. Publish: EventBus.publish(event)                           │   │
//! │  │  4. Mark: mark_published(id) on success                        │   │
//! │  │  5. Retry: mark_failed(id, error), skip after MAX attempts     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  The reconciler ALSO publishes live right after each commit; the       │
//! │  processor is the safety net that replays anything a crash or a       │
//! │  lagged subscriber missed. Subscribers treat events as refresh        │
//! │  hints, so a duplicate publish is harmless.                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::time::Duration;

use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use meridian_core::{AdvancePayment, LedgerOutboxEntry};
use meridian_db::Database;

use crate::error::{LedgerError, LedgerResult};
use crate::events::{EventBus, PaymentAction, PaymentEvent};

// =============================================================================
// Constants
// =============================================================================

/// Maximum number of publish attempts before skipping an entry.
const MAX_RETRY_ATTEMPTS: i64 = 10;

/// Default poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default batch size per poll.
pub const DEFAULT_BATCH_SIZE: u32 = 100;

// =============================================================================
// Outbox Processor
// =============================================================================

/// Drains pending outbox entries onto the event bus.
pub struct OutboxProcessor {
    /// Database handle.
    db: Database,

    /// Event bus to publish on.
    bus: EventBus,

    /// How often to poll for pending entries.
    poll_interval: Duration,

    /// Maximum entries per poll.
    batch_size: u32,

    /// Shutdown receiver.
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for controlling the outbox processor.
#[derive(Clone)]
pub struct OutboxProcessorHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl OutboxProcessorHandle {
    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) -> LedgerResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| LedgerError::Channel("Outbox shutdown channel closed".into()))
    }
}

impl OutboxProcessor {
    /// Creates a new outbox processor and returns a handle.
    pub fn new(db: Database, bus: EventBus) -> (Self, OutboxProcessorHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let processor = OutboxProcessor {
            db,
            bus,
            poll_interval: DEFAULT_POLL_INTERVAL,
            batch_size: DEFAULT_BATCH_SIZE,
            shutdown_rx,
        };

        let handle = OutboxProcessorHandle { shutdown_tx };

        (processor, handle)
    }

    /// Overrides the poll interval (mainly for tests).
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Runs the processor loop.
    ///
    /// This should be spawned as a background task.
    pub async fn run(mut self) {
        info!("Outbox processor starting");

        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.process_batch().await {
                        error!(?e, "Failed to process outbox batch");
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Outbox processor shutting down");
                    break;
                }
            }
        }

        info!("Outbox processor stopped");
    }

    /// Processes one batch of pending entries.
    ///
    /// Public so tests (and shutdown paths) can drain the queue without
    /// waiting for the poll interval.
    pub async fn process_batch(&self) -> LedgerResult<()> {
        let entries = self.db.outbox().get_pending(self.batch_size).await?;

        if entries.is_empty() {
            debug!("No pending outbox entries");
            return Ok(());
        }

        info!(count = entries.len(), "Processing outbox batch");

        for entry in entries {
            if entry.attempts >= MAX_RETRY_ATTEMPTS {
                warn!(
                    id = %entry.id,
                    entity_id = %entry.entity_id,
                    attempts = entry.attempts,
                    "Skipping entry that exceeded max publish attempts"
                );
                continue;
            }

            match parse_event(&entry) {
                Ok(event) => {
                    self.bus.publish(event);
                    self.db.outbox().mark_published(&entry.id).await?;
                }
                Err(e) => {
                    // A malformed payload never heals itself; record the
                    // error so attempts climbs toward the skip threshold.
                    error!(id = %entry.id, %e, "Unparseable outbox payload");
                    self.db.outbox().mark_failed(&entry.id, &e).await?;
                }
            }
        }

        Ok(())
    }
}

// =============================================================================
// Payload Parsing
// =============================================================================

/// The JSON shape written by the payment repository.
#[derive(Debug, Deserialize)]
struct OutboxPayload {
    payment: AdvancePayment,
}

/// Reconstructs the bus event from a durable outbox row.
fn parse_event(entry: &LedgerOutboxEntry) -> Result<PaymentEvent, String> {
    let action = match entry.action.as_str() {
        "created" => PaymentAction::Created,
        "updated" => PaymentAction::Updated,
        other => return Err(format!("unknown action '{other}'")),
    };

    let payload: OutboxPayload =
        serde_json::from_str(&entry.payload).map_err(|e| format!("invalid payload: {e}"))?;

    Ok(PaymentEvent::new(action, payload.payment))
}

// =============================================================================
// Unit Tests
// =============================================================================
