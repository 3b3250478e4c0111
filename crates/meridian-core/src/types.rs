//! # Domain Types
//!
//! Core domain types for the Meridian ledger.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────────┐   │
//! │  │    Customer     │   │     Billing     │   │   AdvancePayment    │   │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────────  │   │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  id (UUID)          │   │
//! │  │  customer_type  │   │  invoice_number │   │  receipt_number     │   │
//! │  │  credit_limit   │   │  amount_paid    │   │  amount_cents       │   │
//! │  └─────────────────┘   │  status         │   │  status             │   │
//! │                        └─────────────────┘   └─────────────────────┘   │
//! │                                                                         │
//! │  ┌─────────────────────┐         ┌─────────────────────────────────┐   │
//! │  │  BillingAllocation  │         │        LedgerOutboxEntry        │   │
//! │  │  ─────────────────  │  N : 1  │  ─────────────────────────────  │   │
//! │  │  advance_payment_id ├────────►│  written in the same tx as the  │   │
//! │  │  billing_id         │ payment │  mutation it describes          │   │
//! │  │  applied_amount     │         └─────────────────────────────────┘   │
//! │  └─────────────────────┘                                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every entity has:
//! - `id`: UUID v4 - immutable, used for database relations
//! - Business ID: (invoice_number, receipt_number) - human-readable

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// GST Rate
// =============================================================================

/// GST rate represented in basis points (bps).
///
/// ## Why Basis Points?
/// 1 basis point = 0.01% = 1/10000
/// 1800 bps = 18% (the common services rate)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct GstRate(u32);

impl GstRate {
    /// Creates a GST rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        GstRate(bps)
    }

    /// Creates a GST rate from a percentage (for convenience).
    pub fn from_percentage(pct: f64) -> Self {
        GstRate((pct * 100.0).round() as u32)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Zero GST rate.
    #[inline]
    pub const fn zero() -> Self {
        GstRate(0)
    }
}

impl Default for GstRate {
    fn default() -> Self {
        GstRate::zero()
    }
}

// =============================================================================
// Customer
// =============================================================================

/// Whether a customer is a registered company or a private individual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum CustomerType {
    Company,
    Individual,
}

/// A customer registered through the CRM (company or individual).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Customer {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Company or individual.
    pub customer_type: CustomerType,

    /// Legal / display name.
    pub name: String,

    pub email: Option<String>,

    pub phone: Option<String>,

    /// Credit extended to this customer, in cents.
    pub credit_limit_cents: i64,

    /// Whether the customer is active (soft delete).
    pub is_active: bool,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    /// Returns the credit limit as Money.
    #[inline]
    pub fn credit_limit(&self) -> Money {
        Money::from_cents(self.credit_limit_cents)
    }
}

// =============================================================================
// Billing
// =============================================================================

/// Payment state of a billing.
///
/// Transitions: `Unpaid → PartiallyPaid → Paid`, and back down when a
/// correction reverses an allocation. `Paid` only when
/// `amount_paid == total_amount_due`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum BillingStatus {
    Unpaid,
    PartiallyPaid,
    Paid,
}

impl Default for BillingStatus {
    fn default() -> Self {
        BillingStatus::Unpaid
    }
}

impl BillingStatus {
    /// Derives the status from paid vs. due amounts.
    ///
    /// Single source of truth for the transition rule, used by both the
    /// auto-apply planner and the correction-repair planner.
    pub fn derive(amount_paid: Money, total_due: Money) -> Self {
        if amount_paid.is_zero() {
            BillingStatus::Unpaid
        } else if amount_paid >= total_due {
            BillingStatus::Paid
        } else {
            BillingStatus::PartiallyPaid
        }
    }
}

/// A billing (invoice) raised against a customer.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Billing {
    pub id: String,
    pub customer_id: String,
    /// Business identifier, unique across the ledger.
    pub invoice_number: String,
    /// Gross amount due, in cents (GST included).
    pub total_amount_due_cents: i64,
    /// Amount covered so far by allocations, in cents.
    pub amount_paid_cents: i64,
    /// GST rate applied when the billing was raised, in basis points.
    pub gst_rate_bps: i64,
    pub status: BillingStatus,
    #[ts(as = "Option<String>")]
    pub due_date: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Billing {
    /// Returns the total amount due as Money.
    #[inline]
    pub fn total_due(&self) -> Money {
        Money::from_cents(self.total_amount_due_cents)
    }

    /// Returns the amount paid as Money.
    #[inline]
    pub fn amount_paid(&self) -> Money {
        Money::from_cents(self.amount_paid_cents)
    }

    /// Returns the outstanding balance (`total_due - amount_paid`).
    #[inline]
    pub fn outstanding(&self) -> Money {
        self.total_due().saturating_sub(self.amount_paid())
    }

    /// Whether auto-apply should consider this billing.
    #[inline]
    pub fn is_open(&self) -> bool {
        matches!(
            self.status,
            BillingStatus::Unpaid | BillingStatus::PartiallyPaid
        )
    }
}

// =============================================================================
// Advance Payment
// =============================================================================

/// How an advance payment was received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    BankTransfer,
    Cheque,
    Card,
}

/// How much of an advance payment has been allocated to billings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// No allocations yet; the full amount is available.
    Unapplied,
    /// Some allocations exist; a surplus remains on the payment.
    PartiallyApplied,
    /// The full amount has been allocated.
    Applied,
}

impl Default for PaymentStatus {
    fn default() -> Self {
        PaymentStatus::Unapplied
    }
}

impl PaymentStatus {
    /// Derives the status from the allocated total vs. the payment amount.
    pub fn derive(total_applied: Money, amount: Money) -> Self {
        if total_applied.is_zero() {
            PaymentStatus::Unapplied
        } else if total_applied >= amount {
            PaymentStatus::Applied
        } else {
            PaymentStatus::PartiallyApplied
        }
    }
}

/// Money received from a customer before or independent of a specific
/// invoice, to be applied against existing or future dues.
///
/// `amount_cents` is immutable once allocations exist, except through the
/// correction path which re-validates every dependent allocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct AdvancePayment {
    pub id: String,
    pub customer_id: String,
    pub customer_type: CustomerType,
    /// Receipt amount in cents. Always > 0.
    pub amount_cents: i64,
    #[ts(as = "String")]
    pub payment_date: DateTime<Utc>,
    pub method: PaymentMethod,
    /// External reference (bank UTR, cheque number, auth code).
    pub payment_reference: Option<String>,
    pub notes: Option<String>,
    /// Business identifier: `ADV-YYYYMMDD-NNNN`.
    pub receipt_number: String,
    /// Staff member who recorded the payment.
    pub created_by: String,
    pub status: PaymentStatus,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl AdvancePayment {
    /// Returns the receipt amount as Money.
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

// =============================================================================
// Billing Allocation
// =============================================================================

/// The application of part (or all) of an advance payment to one billing.
///
/// Invariant: for a given `advance_payment_id`,
/// `SUM(applied_amount_cents) <= payment.amount_cents`. The correction
/// path exists to restore this when a payment amount is edited down.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct BillingAllocation {
    pub id: String,
    pub advance_payment_id: String,
    pub billing_id: String,
    /// Amount applied to the billing, in cents. Always > 0.
    pub applied_amount_cents: i64,
    #[ts(as = "String")]
    pub applied_at: DateTime<Utc>,
}

impl BillingAllocation {
    /// Returns the applied amount as Money.
    #[inline]
    pub fn applied_amount(&self) -> Money {
        Money::from_cents(self.applied_amount_cents)
    }
}

// =============================================================================
// Ledger Outbox
// =============================================================================

/// An entry in the durable broadcast queue.
///
/// Written in the SAME transaction as the ledger mutation it describes, so
/// cross-process consumers can replay exactly what in-process subscribers
/// saw on the event bus (outbox pattern).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct LedgerOutboxEntry {
    pub id: String,
    /// Type of entity: "ADVANCE_PAYMENT".
    pub entity_type: String,
    /// ID of the entity the event describes.
    pub entity_id: String,
    /// Customer whose financial views should refresh.
    pub customer_id: String,
    /// "created" or "updated".
    pub action: String,
    /// The full event payload as JSON.
    pub payload: String,
    /// Number of publish attempts.
    pub attempts: i64,
    /// Last error message if publishing failed.
    pub last_error: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub attempted_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub published_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Credit Usage (derived view)
// =============================================================================

/// A customer's outstanding balance relative to their credit limit.
///
/// Never persisted - recomputed from the billing ledger on read. Allocations
/// change it indirectly by reducing unpaid billing balances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CreditUsage {
    pub credit_limit_cents: i64,
    pub total_outstanding_cents: i64,
    /// `credit_limit - total_outstanding`. Negative means over the limit.
    pub available_cents: i64,
}

impl CreditUsage {
    /// Derives credit usage from a limit and the outstanding total.
    pub fn derive(credit_limit: Money, total_outstanding: Money) -> Self {
        CreditUsage {
            credit_limit_cents: credit_limit.cents(),
            total_outstanding_cents: total_outstanding.cents(),
            available_cents: (credit_limit - total_outstanding).cents(),
        }
    }

    /// Whether the customer has exceeded their credit limit.
    #[inline]
    pub fn is_over_limit(&self) -> bool {
        self.available_cents < 0
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gst_rate_from_bps() {
        let rate = GstRate::from_bps(1800);
        assert_eq!(rate.bps(), 1800);
        assert!((rate.percentage() - 18.0).abs() < 0.001);
    }

    #[test]
    fn test_gst_rate_from_percentage() {
        let rate = GstRate::from_percentage(8.25);
        assert_eq!(rate.bps(), 825);
    }

    #[test]
    fn test_billing_status_derive() {
        let due = Money::from_cents(500);

        assert_eq!(
            BillingStatus::derive(Money::zero(), due),
            BillingStatus::Unpaid
        );
        assert_eq!(
            BillingStatus::derive(Money::from_cents(200), due),
            BillingStatus::PartiallyPaid
        );
        assert_eq!(BillingStatus::derive(due, due), BillingStatus::Paid);
    }

    #[test]
    fn test_payment_status_derive() {
        let amount = Money::from_cents(650);

        assert_eq!(
            PaymentStatus::derive(Money::zero(), amount),
            PaymentStatus::Unapplied
        );
        assert_eq!(
            PaymentStatus::derive(Money::from_cents(650), amount),
            PaymentStatus::Applied
        );
        assert_eq!(
            PaymentStatus::derive(Money::from_cents(100), amount),
            PaymentStatus::PartiallyApplied
        );
    }

    #[test]
    fn test_credit_usage() {
        let usage = CreditUsage::derive(Money::from_cents(100_000), Money::from_cents(35_000));
        assert_eq!(usage.available_cents, 65_000);
        assert!(!usage.is_over_limit());

        let over = CreditUsage::derive(Money::from_cents(10_000), Money::from_cents(15_000));
        assert!(over.is_over_limit());
    }

    #[test]
    fn test_billing_outstanding() {
        let billing = Billing {
            id: "b1".to_string(),
            customer_id: "c1".to_string(),
            invoice_number: "INV-001".to_string(),
            total_amount_due_cents: 50_000,
            amount_paid_cents: 20_000,
            gst_rate_bps: 1800,
            status: BillingStatus::PartiallyPaid,
            due_date: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert_eq!(billing.outstanding().cents(), 30_000);
        assert!(billing.is_open());
    }
}
