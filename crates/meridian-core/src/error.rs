//! # Error Types
//!
//! Domain-specific error types for meridian-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  meridian-core errors (this file)                                      │
//! │  ├── CoreError        - Ledger rule violations                         │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  meridian-db errors (separate crate)                                   │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  meridian-ledger errors (separate crate)                               │
//! │  └── LedgerError      - Reconciler orchestration failures              │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → LedgerError → caller    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (amounts, IDs)
//! 3. Errors are enum variants, never String
//! 4. Validation errors never reach the reconciler

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core ledger errors.
///
/// These errors represent business rule violations or ledger inconsistencies.
/// They should be caught and translated to user-facing messages.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Customer cannot be found.
    #[error("Customer not found: {0}")]
    CustomerNotFound(String),

    /// Advance payment cannot be found.
    #[error("Advance payment not found: {0}")]
    PaymentNotFound(String),

    /// Billing cannot be found.
    #[error("Billing not found: {0}")]
    BillingNotFound(String),

    /// Auto-apply was invoked on a payment that already has allocations.
    ///
    /// ## When This Occurs
    /// - A form double-submit fires the reconciler twice
    /// - Two open views both trigger auto-apply for the same receipt
    ///
    /// Re-invocation must never double the allocations, so this is an
    /// explicit error rather than a silent no-op.
    #[error("Advance payment {payment_id} already has {allocation_count} allocation(s); auto-apply is a one-shot operation")]
    PaymentAlreadyApplied {
        payment_id: String,
        allocation_count: usize,
    },

    /// An over-applied receipt that could not be repaired automatically.
    ///
    /// ## When This Occurs
    /// The sum of a payment's historical allocations exceeds its (corrected)
    /// amount and the reversal planner could not restore the invariant.
    /// This must be surfaced in full detail - it implies prior invoices may
    /// need re-review - and must never be silently truncated.
    #[error("Ledger inconsistency on payment {payment_id}: {applied_cents} cents applied against a receipt of {amount_cents} cents")]
    LedgerInconsistency {
        payment_id: String,
        applied_cents: i64,
        amount_cents: i64,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when form input doesn't meet requirements.
/// Used for early validation before any persistence call runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid UUID).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Duplicate value (e.g., duplicate invoice number).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::LedgerInconsistency {
            payment_id: "pay-1".to_string(),
            applied_cents: 20_000,
            amount_cents: 12_000,
        };
        assert_eq!(
            err.to_string(),
            "Ledger inconsistency on payment pay-1: 20000 cents applied against a receipt of 12000 cents"
        );
    }

    #[test]
    fn test_already_applied_message_names_payment() {
        let err = CoreError::PaymentAlreadyApplied {
            payment_id: "pay-9".to_string(),
            allocation_count: 2,
        };
        assert!(err.to_string().contains("pay-9"));
        assert!(err.to_string().contains("2 allocation"));
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::MustBePositive {
            field: "amount".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
