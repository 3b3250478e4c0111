//! # Ledger Orchestration Errors
//!
//! Error type for the reconciler and its background machinery. Wraps the
//! domain errors from `meridian-core` and the storage errors from
//! `meridian-db` so callers get one error surface.

use thiserror::Error;

use meridian_core::CoreError;
use meridian_db::DbError;

/// Reconciler orchestration errors.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A business rule or validation failure from the core planners.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A storage failure from the ledger store.
    #[error(transparent)]
    Db(#[from] DbError),

    /// An optimistic retry loop exhausted its attempts.
    ///
    /// ## When This Occurs
    /// Every attempt hit a [`DbError::Conflict`]: some other writer kept
    /// changing the rows between the snapshot read and the guarded write.
    /// Extremely unlikely outside of a stress test; surfaced so staff can
    /// simply retry the operation.
    #[error("Operation on {entity} {id} kept conflicting after {attempts} attempts")]
    RetriesExhausted {
        entity: String,
        id: String,
        attempts: u32,
    },

    /// An internal channel closed unexpectedly.
    #[error("Channel error: {0}")]
    Channel(String),
}

impl From<meridian_core::ValidationError> for LedgerError {
    fn from(err: meridian_core::ValidationError) -> Self {
        LedgerError::Core(CoreError::Validation(err))
    }
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_surface_through_core() {
        let err: LedgerError = meridian_core::ValidationError::MustBePositive {
            field: "amount".to_string(),
        }
        .into();

        assert!(matches!(err, LedgerError::Core(CoreError::Validation(_))));
    }

    #[test]
    fn retries_exhausted_message_names_entity() {
        let err = LedgerError::RetriesExhausted {
            entity: "Advance payment".to_string(),
            id: "pay-1".to_string(),
            attempts: 3,
        };
        assert!(err.to_string().contains("pay-1"));
        assert!(err.to_string().contains("3 attempts"));
    }
}
