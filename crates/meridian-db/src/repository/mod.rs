//! # Repository Module
//!
//! Database repository implementations for the Meridian ledger.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern Explained                         │
//! │                                                                         │
//! │  The Repository pattern abstracts database access behind a clean API.  │
//! │                                                                         │
//! │  Reconciler operation                                                  │
//! │       │                                                                 │
//! │       │  db.billings().list_open_for_customer(&id)                     │
//! │       │  ↓                                                              │
//! │       ▼                                                                 │
//! │  BillingRepository                                                     │
//! │  ├── list_open_for_customer(&self, customer_id)                        │
//! │  ├── get_by_id(&self, id)                                              │
//! │  └── insert(&self, billing)                                            │
//! │       │                                                                 │
//! │       │  SQL Query                                                      │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! │  The PaymentRepository is the one place that opens multi-statement     │
//! │  transactions: an allocation plan and its outbox row are one commit.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`CustomerRepository`] - Customer CRUD and credit usage
//! - [`BillingRepository`] - Billing CRUD and open-billing queries
//! - [`PaymentRepository`] - Advance payments, allocations, transactional plan application
//! - [`LedgerOutboxRepository`] - Durable broadcast queue management

pub mod billing;
pub mod customer;
pub mod outbox;
pub mod payment;

pub use billing::BillingRepository;
pub use customer::CustomerRepository;
pub use outbox::LedgerOutboxRepository;
pub use payment::PaymentRepository;
