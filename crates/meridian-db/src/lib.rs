//! # meridian-db: Ledger Store for Meridian CRM
//!
//! This crate provides database access for the Meridian ledger.
//! It uses SQLite for local storage with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Meridian Ledger Data Flow                          │
//! │                                                                         │
//! │  Reconciler (meridian-ledger)                                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   meridian-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐    ┌──────────────┐ │   │
//! │  │   │   Database    │    │  Repositories  │    │  Migrations  │ │   │
//! │  │   │   (pool.rs)   │    │ (customer.rs,  │    │  (embedded)  │ │   │
//! │  │   │               │    │  billing.rs,   │    │              │ │   │
//! │  │   │ SqlitePool    │◄───│  payment.rs,   │    │ 001_init.sql │ │   │
//! │  │   │ Connection    │    │  outbox.rs)    │    │              │ │   │
//! │  │   │ Management    │    │                │    │              │ │   │
//! │  │   └───────────────┘    └────────────────┘    └──────────────┘ │   │
//! │  │                                                                 │   │
//! │  │   PaymentRepository owns the TRANSACTIONAL seam: an allocation │   │
//! │  │   plan (or repair plan) and its outbox row commit as one unit. │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite database (WAL mode)                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations (customer, billing, payment, outbox)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use meridian_db::{Database, DbConfig};
//!
//! let config = DbConfig::new("path/to/meridian.db");
//! let db = Database::new(config).await?;
//!
//! let open = db.billings().list_open_for_customer(&customer_id).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::billing::BillingRepository;
pub use repository::customer::CustomerRepository;
pub use repository::outbox::LedgerOutboxRepository;
pub use repository::payment::{NewPayment, PaymentRepository, PaymentUpdate};
