//! # Typed Event Bus
//!
//! In-process pub/sub for ledger mutations, built on `tokio::sync::broadcast`.
//!
//! ## Why a Typed Bus?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Cross-View Notification                              │
//! │                                                                         │
//! │  A payment recorded in the registration form must refresh:             │
//! │                                                                         │
//! │  ┌──────────────────┐  ┌──────────────────┐  ┌────────────────────┐    │
//! │  │ Customer detail  │  │ Billing list     │  │ Payment history    │    │
//! │  │ (credit usage)   │  │ (statuses moved) │  │ (new receipt row)  │    │
//! │  └────────▲─────────┘  └────────▲─────────┘  └─────────▲──────────┘    │
//! │           │                     │                      │               │
//! │           └──────────┬──────────┴──────────────────────┘               │
//! │                      │ subscribe()                                     │
//! │              ┌───────┴────────┐                                        │
//! │              │    EventBus    │ ◄── publish(PaymentEvent)              │
//! │              │  (broadcast)   │     from the Reconciler                │
//! │              └────────────────┘                                        │
//! │                                                                         │
//! │  Each event carries the customer_id so a view showing customer A       │
//! │  ignores events for customer B instead of refetching everything.       │
//! │                                                                         │
//! │  Delivery is fire-and-forget: a view that misses the live broadcast    │
//! │  (not yet mounted, lagged receiver) replays from the durable outbox.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;
use ts_rs::TS;

use meridian_core::{AdvancePayment, CustomerType};

// =============================================================================
// Constants
// =============================================================================

/// Broadcast channel capacity.
///
/// Slow subscribers past this many buffered events see `Lagged` and should
/// fall back to an outbox replay.
pub const EVENT_BUS_CAPACITY: usize = 256;

// =============================================================================
// Event Types
// =============================================================================

/// What happened to the payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentAction {
    Created,
    Updated,
}

/// A ledger mutation, as seen by subscribers.
///
/// The full payment is embedded so most views can update without a
/// follow-up read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PaymentEvent {
    /// Customer whose financial views should refresh.
    pub customer_id: String,
    pub customer_type: CustomerType,
    pub action: PaymentAction,
    pub payment: AdvancePayment,
}

impl PaymentEvent {
    /// Builds an event from a payment snapshot.
    pub fn new(action: PaymentAction, payment: AdvancePayment) -> Self {
        PaymentEvent {
            customer_id: payment.customer_id.clone(),
            customer_type: payment.customer_type,
            action,
            payment,
        }
    }
}

// =============================================================================
// Event Bus
// =============================================================================

/// Typed broadcast hub for payment events.
///
/// Cloning is cheap; every part of the system (reconciler, outbox
/// processor, API layer) holds its own handle to the same channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PaymentEvent>,
}

impl EventBus {
    /// Creates a new event bus with the default capacity.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        EventBus { tx }
    }

    /// Subscribes to payment events.
    ///
    /// Subscribers only see events published after this call; history
    /// lives in the outbox.
    pub fn subscribe(&self) -> broadcast::Receiver<PaymentEvent> {
        self.tx.subscribe()
    }

    /// Publishes an event to all current subscribers.
    ///
    /// Zero subscribers is not an error: the outbox still records the
    /// mutation durably.
    pub fn publish(&self, event: PaymentEvent) {
        debug!(
            customer_id = %event.customer_id,
            payment_id = %event.payment.id,
            action = ?event.action,
            subscribers = self.tx.receiver_count(),
            "Publishing payment event"
        );
        let _ = self.tx.send(event);
    }

    /// Returns the number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        EventBus::new()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
