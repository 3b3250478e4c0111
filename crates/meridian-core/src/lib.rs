//! # meridian-core: Pure Business Logic for Meridian CRM
//!
//! This crate is the **heart** of the Meridian ledger. It contains all
//! business logic as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Meridian CRM Architecture                          │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 Web Front End (out of scope)                    │   │
//! │  │   Registration form ──► Edit modal ──► Billing list views      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              meridian-ledger (Reconciler service)               │   │
//! │  │    record_advance_payment, auto_apply, update_advance_payment   │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ meridian-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌────────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   money   │  │ allocation │  │ validation│  │   │
//! │  │   │  Customer │  │   Money   │  │  planners  │  │   rules   │  │   │
//! │  │   │  Billing  │  │  GstRate  │  │ auto-apply │  │  checks   │  │   │
//! │  │   │  Payment  │  │           │  │  + repair  │  │           │  │   │
//! │  │   └───────────┘  └───────────┘  └────────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                  meridian-db (Ledger store)                     │   │
//! │  │          SQLite queries, migrations, repositories               │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Customer, Billing, AdvancePayment, etc.)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`allocation`] - Auto-apply and correction-repair planners
//! - [`error`] - Domain error types
//! - [`validation`] - Business rule validation
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: the allocation planner is deterministic - the same
//!    ledger snapshot always produces the same plan
//! 2. **No I/O**: Database, network, file system access is FORBIDDEN here
//! 3. **Integer Money**: All monetary values are in cents (i64)
//! 4. **Explicit Errors**: All errors are typed, never strings or panics

// =============================================================================
// Module Declarations
// =============================================================================

pub mod allocation;
pub mod error;
pub mod money;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use meridian_core::Money` instead of
// `use meridian_core::money::Money`

pub use allocation::{
    plan_auto_apply, plan_repair, AllocationPlan, AutoApplyResult, PlannedAllocation,
    PlannedReversal, RepairPlan,
};
pub use error::{CoreError, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Default actor recorded on ledger mutations when no staff id is supplied.
///
/// ## Why a constant?
/// v0.1 runs behind a single shared staff login; the schema keeps `created_by`
/// per row so per-user attribution can land later without a migration.
pub const DEFAULT_ACTOR_ID: &str = "system";
