//! # Validation Rules
//!
//! Field-level and form-level validation, run before any persistence call.
//!
//! ## Validation Layers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Form (frontend, out of scope)   - UX hints only              │
//! │  Layer 2: THIS MODULE                     - authoritative rules        │
//! │  Layer 3: SQLite CHECK constraints        - last line of defense       │
//! │                                                                         │
//! │  Layer 2 failing means layers below are never reached: a rejected      │
//! │  amount never opens a transaction.                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use uuid::Uuid;

use crate::error::ValidationError;

// =============================================================================
// Limits
// =============================================================================

/// Maximum length for customer / display names.
pub const MAX_NAME_LEN: usize = 200;

/// Maximum length for external payment references (UTR, cheque no, auth code).
pub const MAX_REFERENCE_LEN: usize = 100;

/// Maximum length for free-text notes.
pub const MAX_NOTES_LEN: usize = 1000;

/// Maximum single receipt amount in cents (100 million in major units).
///
/// Anything above this is a data-entry mistake, not a payment.
pub const MAX_PAYMENT_CENTS: i64 = 10_000_000_000;

/// Maximum GST rate in basis points (50%).
pub const MAX_GST_BPS: i64 = 5000;

// =============================================================================
// Field Validators
// =============================================================================

/// Validates that a required text field is present and non-blank.
pub fn validate_required(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates a field against a maximum character length.
pub fn validate_max_length(field: &str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }
    Ok(())
}

/// Validates an optional field against a maximum character length.
pub fn validate_optional_max_length(
    field: &str,
    value: Option<&str>,
    max: usize,
) -> Result<(), ValidationError> {
    match value {
        Some(v) => validate_max_length(field, v, max),
        None => Ok(()),
    }
}

/// Validates that an amount in cents is strictly positive.
pub fn validate_positive_amount(field: &str, cents: i64) -> Result<(), ValidationError> {
    if cents <= 0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates that an amount in cents is zero or more (credit limits).
pub fn validate_non_negative(field: &str, cents: i64) -> Result<(), ValidationError> {
    if cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: i64::MAX,
        });
    }
    Ok(())
}

/// Validates that a string parses as a UUID.
pub fn validate_uuid(field: &str, value: &str) -> Result<(), ValidationError> {
    Uuid::parse_str(value).map_err(|e| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: e.to_string(),
    })?;
    Ok(())
}

/// Validates a GST rate in basis points.
pub fn validate_gst_rate(bps: i64) -> Result<(), ValidationError> {
    if !(0..=MAX_GST_BPS).contains(&bps) {
        return Err(ValidationError::OutOfRange {
            field: "gst_rate_bps".to_string(),
            min: 0,
            max: MAX_GST_BPS,
        });
    }
    Ok(())
}

// =============================================================================
// Form Validators
// =============================================================================

/// Validates the fields of a new advance payment before it is recorded.
///
/// Covers the registration form's server-side rules:
/// * customer must be a valid id
/// * amount must be positive and within the sanity cap
/// * reference and notes are bounded free text
pub fn validate_new_payment(
    customer_id: &str,
    amount_cents: i64,
    payment_reference: Option<&str>,
    notes: Option<&str>,
) -> Result<(), ValidationError> {
    validate_required("customer_id", customer_id)?;
    validate_uuid("customer_id", customer_id)?;
    validate_payment_amount(amount_cents)?;
    validate_optional_max_length("payment_reference", payment_reference, MAX_REFERENCE_LEN)?;
    validate_optional_max_length("notes", notes, MAX_NOTES_LEN)?;
    Ok(())
}

/// Validates a corrected payment amount (the edit path).
///
/// The same amount rules apply on edit as on creation: a correction can
/// shrink a receipt but never zero it out. Deleting a receipt is a
/// separate, unsupported operation.
pub fn validate_payment_amount(amount_cents: i64) -> Result<(), ValidationError> {
    validate_positive_amount("amount", amount_cents)?;
    if amount_cents > MAX_PAYMENT_CENTS {
        return Err(ValidationError::OutOfRange {
            field: "amount".to_string(),
            min: 1,
            max: MAX_PAYMENT_CENTS,
        });
    }
    Ok(())
}

/// Validates the fields of a new customer.
pub fn validate_new_customer(name: &str, credit_limit_cents: i64) -> Result<(), ValidationError> {
    validate_required("name", name)?;
    validate_max_length("name", name, MAX_NAME_LEN)?;
    validate_non_negative("credit_limit", credit_limit_cents)?;
    Ok(())
}

/// Validates the fields of a new billing.
pub fn validate_new_billing(
    customer_id: &str,
    invoice_number: &str,
    total_amount_due_cents: i64,
    gst_rate_bps: i64,
) -> Result<(), ValidationError> {
    validate_required("customer_id", customer_id)?;
    validate_uuid("customer_id", customer_id)?;
    validate_required("invoice_number", invoice_number)?;
    validate_max_length("invoice_number", invoice_number, MAX_REFERENCE_LEN)?;
    validate_positive_amount("total_amount_due", total_amount_due_cents)?;
    validate_gst_rate(gst_rate_bps)?;
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
