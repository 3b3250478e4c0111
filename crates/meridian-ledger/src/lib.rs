//! # meridian-ledger: Reconciliation Engine for Meridian CRM
//!
//! This crate is the orchestration layer of the Meridian ledger: it drives
//! the auto-apply and correction flows, fans mutations out to live
//! subscribers, and drains the durable outbox.
//!
//! ## The Full Reconciliation Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Advance Payment Lifecycle                           │
//! │                                                                         │
//! │  Staff records a payment                                               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Reconciler::record_advance_payment                                    │
//! │  ├── validate input (meridian-core)                                    │
//! │  ├── TX 1: insert payment + outbox 'created'                           │
//! │  ├── publish PaymentEvent::Created on the bus                          │
//! │  └── auto_apply                                                        │
//! │       ├── plan_auto_apply over open billings (oldest first)            │
//! │       ├── TX 2: allocations + billing updates + outbox 'updated'       │
//! │       ├── publish PaymentEvent::Updated                                │
//! │       └── notify Success ("applied 650.00 across 2 invoices")          │
//! │                                                                         │
//! │  Staff corrects the amount downward                                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Reconciler::update_advance_payment                                    │
//! │  ├── plan_repair (reverse most-recent allocations)                     │
//! │  ├── TX 3: guarded payment update + reversals + outbox 'updated'       │
//! │  ├── publish PaymentEvent::Updated                                     │
//! │  └── notify Error with the full repair report when over-applied        │
//! │                                                                         │
//! │  Any open view (customer detail, billing list, payment history)        │
//! │  subscribes to the EventBus and refreshes on matching customer_id.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`reconciler`] - The auto-apply and correction orchestrator
//! - [`events`] - Typed in-process pub/sub (EventBus)
//! - [`outbox`] - Durable outbox processor
//! - [`notify`] - Notification sink trait and implementations
//! - [`error`] - Orchestration error types

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod events;
pub mod notify;
pub mod outbox;
pub mod reconciler;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{LedgerError, LedgerResult};
pub use events::{EventBus, PaymentAction, PaymentEvent};
pub use notify::{MemorySink, Notification, NotificationSink, NotifyKind, TracingSink};
pub use outbox::{OutboxProcessor, OutboxProcessorHandle};
pub use reconciler::{PaymentCorrection, Reconciler, RecordPayment, RepairReport, ReversalDetail};
