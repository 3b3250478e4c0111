//! # Allocation Planners
//!
//! Pure planning logic for advance-payment reconciliation. This module
//! decides *what* the ledger should look like; `meridian-db` applies the
//! plan inside a single transaction.
//!
//! ## Auto-Apply Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Auto-Apply Planning                                │
//! │                                                                         │
//! │  Advance payment: 650                                                  │
//! │  Open billings (oldest first):  B1 due 500 paid 0                      │
//! │                                 B2 due 300 paid 0                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  remaining = 650                                                       │
//! │  B1: allocate min(500, 650) = 500  → B1 paid      remaining = 150     │
//! │  B2: allocate min(300, 150) = 150  → B2 partial   remaining = 0       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Plan: [(B1, 500), (B2, 150)]  total 650  surplus 0                   │
//! │                                                                         │
//! │  GUARANTEES:                                                           │
//! │  • sum(allocations) never exceeds the payment amount                   │
//! │  • no billing is ever paid past its total due                          │
//! │  • a surplus stays on the payment, available for later application     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Correction Repair
//! When a payment amount is edited below what was already allocated (an
//! "over-applied receipt"), the repair planner reverses allocations
//! most-recently-applied-first until the invariant
//! `sum(allocations) <= amount` holds again, reverting billing balances and
//! statuses along the way.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{AdvancePayment, Billing, BillingAllocation, BillingStatus, PaymentStatus};

// =============================================================================
// Auto-Apply Plan
// =============================================================================

/// One planned application of payment money to a billing.
///
/// Carries the billing's before/after balances so the store can apply the
/// update with an optimistic guard (`WHERE amount_paid_cents = previous`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedAllocation {
    pub billing_id: String,
    /// Amount to apply to this billing, in cents. Always > 0.
    pub amount_cents: i64,
    /// The billing's `amount_paid_cents` as read when planning.
    pub previous_amount_paid_cents: i64,
    /// The billing's `amount_paid_cents` after the allocation.
    pub new_amount_paid_cents: i64,
    /// The billing's status after the allocation.
    pub new_status: BillingStatus,
}

/// The full outcome of planning one auto-apply pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationPlan {
    pub payment_id: String,
    pub entries: Vec<PlannedAllocation>,
    /// Sum of all planned allocations, in cents.
    pub total_applied_cents: i64,
    /// Surplus left on the payment after the plan, in cents.
    pub remaining_cents: i64,
    /// The payment's status once the plan is applied.
    pub payment_status: PaymentStatus,
}

impl AllocationPlan {
    /// Whether the plan allocates anything at all.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Plans the application of an advance payment across open billings.
///
/// ## Contract
/// * `open_billings` must be the customer's unpaid / partially-paid billings
///   ordered **oldest first** (creation date ascending) - oldest-debt-first
///   is the tie-break policy so the longest-outstanding invoices clear
///   before newer ones.
/// * The caller has already verified the payment has no allocations
///   (idempotency guard lives at the reconciler seam).
///
/// ## Guarantees
/// * `total_applied <= payment.amount`
/// * no billing's `amount_paid` exceeds its `total_amount_due`
/// * `remaining = payment.amount - total_applied` stays on the payment
pub fn plan_auto_apply(payment: &AdvancePayment, open_billings: &[Billing]) -> AllocationPlan {
    let mut remaining = payment.amount();
    let mut entries = Vec::new();

    for billing in open_billings {
        if remaining.is_zero() {
            break;
        }

        let due = billing.outstanding();
        let allocate = due.min(remaining);

        if !allocate.is_positive() {
            // Already settled (or inconsistent row); skip rather than allocate zero.
            continue;
        }

        let new_paid = billing.amount_paid() + allocate;
        entries.push(PlannedAllocation {
            billing_id: billing.id.clone(),
            amount_cents: allocate.cents(),
            previous_amount_paid_cents: billing.amount_paid_cents,
            new_amount_paid_cents: new_paid.cents(),
            new_status: BillingStatus::derive(new_paid, billing.total_due()),
        });

        remaining -= allocate;
    }

    let total_applied = payment.amount() - remaining;

    AllocationPlan {
        payment_id: payment.id.clone(),
        total_applied_cents: total_applied.cents(),
        remaining_cents: remaining.cents(),
        payment_status: PaymentStatus::derive(total_applied, payment.amount()),
        entries,
    }
}

// =============================================================================
// Auto-Apply Result
// =============================================================================

/// One applied allocation, as reported back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct AllocationApplied {
    pub billing_id: String,
    pub amount_cents: i64,
}

/// What an auto-apply pass did, for display to staff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct AutoApplyResult {
    /// True if at least one allocation was made.
    pub applied: bool,
    /// Sum of allocations made by this pass, in cents.
    pub total_applied_cents: i64,
    /// Surplus left unallocated on the payment, in cents.
    pub remaining_cents: i64,
    pub applications: Vec<AllocationApplied>,
    /// Human-readable summary when nothing was applied.
    pub message: Option<String>,
}

impl AutoApplyResult {
    /// Builds the caller-facing result from an applied plan.
    pub fn from_plan(plan: &AllocationPlan) -> Self {
        let applications: Vec<AllocationApplied> = plan
            .entries
            .iter()
            .map(|e| AllocationApplied {
                billing_id: e.billing_id.clone(),
                amount_cents: e.amount_cents,
            })
            .collect();

        let message = if applications.is_empty() {
            Some("No unpaid billings to apply against; the full amount remains on the receipt".to_string())
        } else {
            None
        };

        AutoApplyResult {
            applied: !applications.is_empty(),
            total_applied_cents: plan.total_applied_cents,
            remaining_cents: plan.remaining_cents,
            applications,
            message,
        }
    }

    /// Result for the nothing-was-attempted path (e.g. auto-apply failed
    /// after the payment was recorded).
    pub fn not_applied(message: impl Into<String>, amount_cents: i64) -> Self {
        AutoApplyResult {
            applied: false,
            total_applied_cents: 0,
            remaining_cents: amount_cents,
            applications: Vec::new(),
            message: Some(message.into()),
        }
    }
}

// =============================================================================
// Correction Repair Plan
// =============================================================================

/// One planned reversal of an existing allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedReversal {
    pub allocation_id: String,
    pub billing_id: String,
    /// How much of the allocation to take back, in cents.
    pub reduce_by_cents: i64,
    /// True when the allocation is fully reversed and should be deleted.
    pub remove: bool,
    /// The billing's `amount_paid_cents` as read when planning.
    pub billing_previous_amount_paid_cents: i64,
    /// The billing's `amount_paid_cents` after the reversal.
    pub billing_new_amount_paid_cents: i64,
    /// The billing's status after the reversal.
    pub billing_new_status: BillingStatus,
}

/// The full outcome of planning an over-applied-receipt repair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairPlan {
    pub payment_id: String,
    /// Reversals in application order (most recently applied first).
    pub reversals: Vec<PlannedReversal>,
    /// The payment amount before the correction, in cents.
    pub old_amount_cents: i64,
    /// Sum of allocations before the repair, in cents.
    pub previously_applied_cents: i64,
    /// Sum of allocations once the plan is applied, in cents.
    pub total_applied_after_cents: i64,
    /// The payment's status once the plan is applied.
    pub payment_status_after: PaymentStatus,
}

impl RepairPlan {
    /// Whether the correction actually reduced any allocation.
    #[inline]
    pub fn was_over_applied(&self) -> bool {
        !self.reversals.is_empty()
    }
}

/// Plans the repair of an over-applied receipt.
///
/// ## Contract
/// * `allocations` are the payment's allocations paired with their billings,
///   ordered by `applied_at` **ascending** (the planner walks them from the
///   most recent end).
/// * `new_amount` is the corrected payment amount, already validated > 0.
///
/// ## Policy
/// Reduce allocations most-recently-applied-first until
/// `sum(allocations) <= new_amount`, reverting each billing's
/// `amount_paid` and deriving its status back down
/// (`paid → partially_paid → unpaid`).
///
/// ## Errors
/// `CoreError::LedgerInconsistency` if reversing every allocation still
/// cannot restore the invariant. With a non-negative `new_amount` this
/// cannot happen; the branch exists so the inconsistency is surfaced in
/// full detail instead of silently truncated if the ledger is corrupt.
pub fn plan_repair(
    payment: &AdvancePayment,
    new_amount: Money,
    allocations: &[(BillingAllocation, Billing)],
) -> CoreResult<RepairPlan> {
    let previously_applied: Money = allocations
        .iter()
        .fold(Money::zero(), |acc, (a, _)| acc + a.applied_amount());

    let mut excess = previously_applied.saturating_sub(new_amount);
    let mut reversals = Vec::new();

    // Two allocations of one payment never target the same billing today,
    // but the planner tracks adjusted balances per billing anyway so the
    // math stays right if that ever changes.
    let mut adjusted_paid: HashMap<&str, Money> = HashMap::new();

    for (allocation, billing) in allocations.iter().rev() {
        if excess.is_zero() {
            break;
        }

        let take = allocation.applied_amount().min(excess);
        let current_paid = adjusted_paid
            .get(billing.id.as_str())
            .copied()
            .unwrap_or_else(|| billing.amount_paid());
        let new_paid = current_paid.saturating_sub(take);

        reversals.push(PlannedReversal {
            allocation_id: allocation.id.clone(),
            billing_id: billing.id.clone(),
            reduce_by_cents: take.cents(),
            remove: take == allocation.applied_amount(),
            billing_previous_amount_paid_cents: current_paid.cents(),
            billing_new_amount_paid_cents: new_paid.cents(),
            billing_new_status: BillingStatus::derive(new_paid, billing.total_due()),
        });

        adjusted_paid.insert(billing.id.as_str(), new_paid);
        excess -= take;
    }

    if excess.is_positive() {
        return Err(CoreError::LedgerInconsistency {
            payment_id: payment.id.clone(),
            applied_cents: previously_applied.cents(),
            amount_cents: new_amount.cents(),
        });
    }

    let total_after = previously_applied.min(new_amount);

    Ok(RepairPlan {
        payment_id: payment.id.clone(),
        reversals,
        old_amount_cents: payment.amount_cents,
        previously_applied_cents: previously_applied.cents(),
        total_applied_after_cents: total_after.cents(),
        payment_status_after: PaymentStatus::derive(total_after, new_amount),
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CustomerType, PaymentMethod};
    use chrono::{Duration, Utc};

    fn payment(amount_cents: i64) -> AdvancePayment {
        let now = Utc::now();
        AdvancePayment {
            id: "pay-1".to_string(),
            customer_id: "cust-1".to_string(),
            customer_type: CustomerType::Company,
            amount_cents,
            payment_date: now,
            method: PaymentMethod::BankTransfer,
            payment_reference: None,
            notes: None,
            receipt_number: "ADV-20260825-0001".to_string(),
            created_by: "staff-1".to_string(),
            status: PaymentStatus::Unapplied,
            created_at: now,
            updated_at: now,
        }
    }

    fn billing(id: &str, due_cents: i64, paid_cents: i64, age_days: i64) -> Billing {
        let created = Utc::now() - Duration::days(age_days);
        Billing {
            id: id.to_string(),
            customer_id: "cust-1".to_string(),
            invoice_number: format!("INV-{id}"),
            total_amount_due_cents: due_cents,
            amount_paid_cents: paid_cents,
            gst_rate_bps: 1800,
            status: BillingStatus::derive(
                Money::from_cents(paid_cents),
                Money::from_cents(due_cents),
            ),
            due_date: None,
            created_at: created,
            updated_at: created,
        }
    }

    fn allocation(id: &str, billing_id: &str, amount_cents: i64, order: i64) -> BillingAllocation {
        BillingAllocation {
            id: id.to_string(),
            advance_payment_id: "pay-1".to_string(),
            billing_id: billing_id.to_string(),
            applied_amount_cents: amount_cents,
            applied_at: Utc::now() + Duration::seconds(order),
        }
    }

    // -------------------------------------------------------------------------
    // Auto-apply planner
    // -------------------------------------------------------------------------

    #[test]
    fn allocations_never_exceed_payment_amount() {
        let pay = payment(400);
        let billings = vec![billing("b1", 500, 0, 10), billing("b2", 300, 0, 5)];

        let plan = plan_auto_apply(&pay, &billings);

        assert_eq!(plan.total_applied_cents, 400);
        assert_eq!(plan.remaining_cents, 0);
        let sum: i64 = plan.entries.iter().map(|e| e.amount_cents).sum();
        assert!(sum <= pay.amount_cents);
    }

    #[test]
    fn no_billing_paid_past_its_total_due() {
        let pay = payment(100_000);
        let billings = vec![billing("b1", 500, 0, 10), billing("b2", 300, 100, 5)];

        let plan = plan_auto_apply(&pay, &billings);

        for entry in &plan.entries {
            let b = billings.iter().find(|b| b.id == entry.billing_id).unwrap();
            assert!(entry.new_amount_paid_cents <= b.total_amount_due_cents);
        }
        // 500 + 200 outstanding; 99_300 stays on the payment.
        assert_eq!(plan.total_applied_cents, 700);
        assert_eq!(plan.remaining_cents, 99_300);
        assert_eq!(plan.payment_status, PaymentStatus::PartiallyApplied);
    }

    #[test]
    fn oldest_billing_is_cleared_first() {
        let pay = payment(150);
        // b_old created 10 days ago, b_new 1 day ago; both due 100.
        let billings = vec![billing("b_old", 100, 0, 10), billing("b_new", 100, 0, 1)];

        let plan = plan_auto_apply(&pay, &billings);

        assert_eq!(plan.entries.len(), 2);
        assert_eq!(plan.entries[0].billing_id, "b_old");
        assert_eq!(plan.entries[0].amount_cents, 100);
        assert_eq!(plan.entries[0].new_status, BillingStatus::Paid);
        assert_eq!(plan.entries[1].billing_id, "b_new");
        assert_eq!(plan.entries[1].amount_cents, 50);
        assert_eq!(plan.entries[1].new_status, BillingStatus::PartiallyPaid);
    }

    #[test]
    fn zero_open_billings_yields_empty_plan() {
        let pay = payment(650);
        let plan = plan_auto_apply(&pay, &[]);

        assert!(plan.is_empty());
        assert_eq!(plan.total_applied_cents, 0);
        assert_eq!(plan.remaining_cents, 650);
        assert_eq!(plan.payment_status, PaymentStatus::Unapplied);

        let result = AutoApplyResult::from_plan(&plan);
        assert!(!result.applied);
        assert!(result.message.is_some());
    }

    #[test]
    fn end_to_end_example_650_against_500_and_300() {
        let pay = payment(650);
        let billings = vec![billing("b1", 500, 0, 10), billing("b2", 300, 0, 5)];

        let plan = plan_auto_apply(&pay, &billings);

        assert_eq!(plan.entries.len(), 2);
        assert_eq!(plan.entries[0].amount_cents, 500);
        assert_eq!(plan.entries[0].new_status, BillingStatus::Paid);
        assert_eq!(plan.entries[1].amount_cents, 150);
        assert_eq!(plan.entries[1].new_status, BillingStatus::PartiallyPaid);
        assert_eq!(plan.remaining_cents, 0);
        assert_eq!(plan.payment_status, PaymentStatus::Applied);
    }

    #[test]
    fn walk_exhausts_every_open_billing_while_funds_remain() {
        // The walk has no length cap: it stops only when the payment is
        // exhausted or no open billing is left.
        let count = 750;
        let pay = payment(count);
        let billings: Vec<Billing> = (0..count)
            .map(|i| billing(&format!("b{i}"), 1, 0, count - i))
            .collect();

        let plan = plan_auto_apply(&pay, &billings);

        assert_eq!(plan.entries.len(), count as usize);
        assert_eq!(plan.total_applied_cents, count);
        assert_eq!(plan.remaining_cents, 0);
        assert_eq!(plan.payment_status, PaymentStatus::Applied);
    }

    #[test]
    fn settled_rows_are_skipped_not_zero_allocated() {
        let pay = payment(100);
        // Fully-settled billing slipped into the list; planner must skip it.
        let billings = vec![billing("b1", 500, 500, 10), billing("b2", 300, 0, 5)];

        let plan = plan_auto_apply(&pay, &billings);

        assert_eq!(plan.entries.len(), 1);
        assert_eq!(plan.entries[0].billing_id, "b2");
        assert!(plan.entries.iter().all(|e| e.amount_cents > 0));
    }

    // -------------------------------------------------------------------------
    // Repair planner
    // -------------------------------------------------------------------------

    #[test]
    fn repair_reduces_most_recent_allocation_first() {
        // Payment 200 fully applied as 100 + 100; corrected down to 120.
        let pay = payment(200);
        let b1 = billing("b1", 100, 100, 10);
        let b2 = billing("b2", 100, 100, 5);
        let pairs = vec![
            (allocation("a1", "b1", 100, 0), b1),
            (allocation("a2", "b2", 100, 1), b2),
        ];

        let plan = plan_repair(&pay, Money::from_cents(120), &pairs).unwrap();

        assert!(plan.was_over_applied());
        assert_eq!(plan.old_amount_cents, 200);
        assert_eq!(plan.previously_applied_cents, 200);
        assert_eq!(plan.total_applied_after_cents, 120);

        // Only the most recent allocation (a2) is touched: 100 → 20.
        assert_eq!(plan.reversals.len(), 1);
        let rev = &plan.reversals[0];
        assert_eq!(rev.allocation_id, "a2");
        assert_eq!(rev.reduce_by_cents, 80);
        assert!(!rev.remove);
        assert_eq!(rev.billing_new_amount_paid_cents, 20);
        assert_eq!(rev.billing_new_status, BillingStatus::PartiallyPaid);
    }

    #[test]
    fn repair_removes_allocations_entirely_when_needed() {
        // Payment 200 applied as 100 + 100; corrected down to 50.
        let pay = payment(200);
        let b1 = billing("b1", 100, 100, 10);
        let b2 = billing("b2", 100, 100, 5);
        let pairs = vec![
            (allocation("a1", "b1", 100, 0), b1),
            (allocation("a2", "b2", 100, 1), b2),
        ];

        let plan = plan_repair(&pay, Money::from_cents(50), &pairs).unwrap();

        assert_eq!(plan.reversals.len(), 2);
        // a2 fully removed, billing back to unpaid.
        assert!(plan.reversals[0].remove);
        assert_eq!(plan.reversals[0].billing_new_amount_paid_cents, 0);
        assert_eq!(plan.reversals[0].billing_new_status, BillingStatus::Unpaid);
        // a1 reduced 100 → 50.
        assert!(!plan.reversals[1].remove);
        assert_eq!(plan.reversals[1].reduce_by_cents, 50);
        assert_eq!(plan.reversals[1].billing_new_status, BillingStatus::PartiallyPaid);
        assert_eq!(plan.total_applied_after_cents, 50);
    }

    #[test]
    fn repair_is_a_noop_when_amount_grows() {
        let pay = payment(200);
        let b1 = billing("b1", 100, 100, 10);
        let pairs = vec![(allocation("a1", "b1", 100, 0), b1)];

        let plan = plan_repair(&pay, Money::from_cents(300), &pairs).unwrap();

        assert!(!plan.was_over_applied());
        assert!(plan.reversals.is_empty());
        assert_eq!(plan.total_applied_after_cents, 100);
        assert_eq!(plan.payment_status_after, PaymentStatus::PartiallyApplied);
    }

    #[test]
    fn invariant_holds_after_any_repair() {
        let pay = payment(500);
        let b1 = billing("b1", 300, 300, 10);
        let b2 = billing("b2", 200, 200, 5);
        let pairs = vec![
            (allocation("a1", "b1", 300, 0), b1),
            (allocation("a2", "b2", 200, 1), b2),
        ];

        for new_amount in [1, 100, 250, 300, 499, 500, 700] {
            let plan = plan_repair(&pay, Money::from_cents(new_amount), &pairs).unwrap();
            assert!(plan.total_applied_after_cents <= new_amount);
        }
    }
}
