//! # Reconciler
//!
//! The single orchestrator for advance-payment reconciliation. Every write
//! path of the ledger - recording a receipt, auto-applying it, correcting
//! it - goes through this module, so the allocation rules live in exactly
//! one place.
//!
//! ## Failure Policy: Separable Steps
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  record_advance_payment is TWO transactions, not one:                   │
//! │                                                                         │
//! │  TX 1: payment row + 'created' outbox row      ← must succeed          │
//! │  TX 2: allocations + billing updates + status  ← may fail              │
//! │                                                                         │
//! │  If TX 2 fails the receipt still exists: money a customer handed       │
//! │  over is never un-recorded because an allocation hiccuped. The         │
//! │  caller gets the payment back plus a Warning notification, and the     │
//! │  payment stays 'unapplied' so auto_apply can be re-invoked.            │
//! │                                                                         │
//! │  Inside each transaction it is strictly all-or-nothing: a failed       │
//! │  optimistic guard rolls the whole plan back and the reconciler         │
//! │  re-reads and re-plans (bounded retries).                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use ts_rs::TS;

use meridian_core::{
    plan_auto_apply, plan_repair, validation, AdvancePayment, AutoApplyResult, CoreError, Money,
    PaymentMethod, DEFAULT_ACTOR_ID,
};
use meridian_db::{Database, DbError, NewPayment, PaymentUpdate};

use crate::error::{LedgerError, LedgerResult};
use crate::events::{EventBus, PaymentAction, PaymentEvent};
use crate::notify::{Notification, NotificationSink};

// =============================================================================
// Constants
// =============================================================================

/// Attempts before an optimistic-conflict loop gives up.
const MAX_CONFLICT_RETRIES: u32 = 3;

// =============================================================================
// Inputs
// =============================================================================

/// Input for recording a new advance payment.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct RecordPayment {
    pub customer_id: String,
    /// Receipt amount in cents. Must be > 0.
    pub amount_cents: i64,
    #[ts(as = "String")]
    pub payment_date: DateTime<Utc>,
    pub method: PaymentMethod,
    pub payment_reference: Option<String>,
    pub notes: Option<String>,
    /// Staff member recording the payment; defaults to the system actor.
    pub created_by: Option<String>,
}

/// Input for correcting an existing advance payment.
///
/// A partial patch: unset fields keep the stored value, so correcting only
/// the amount cannot accidentally erase the reference or notes. Customer,
/// receipt number, and audit fields are immutable.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PaymentCorrection {
    /// Corrected receipt amount in cents. Must be > 0.
    pub amount_cents: i64,
    #[ts(as = "Option<String>")]
    pub payment_date: Option<DateTime<Utc>>,
    pub method: Option<PaymentMethod>,
    pub payment_reference: Option<String>,
    pub notes: Option<String>,
}

// =============================================================================
// Repair Report
// =============================================================================

/// One reversed allocation, for display to staff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ReversalDetail {
    pub billing_id: String,
    pub invoice_number: String,
    /// Amount taken back from the invoice, in cents.
    pub reduced_by_cents: i64,
    /// True if the allocation was removed entirely.
    pub removed: bool,
}

/// What a payment correction did to the ledger.
///
/// When `over_applied` is true this report must reach the user in full -
/// an edit that silently rewrote invoice balances is exactly the failure
/// mode the correction path exists to prevent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct RepairReport {
    /// True if allocations had to be reversed to fit the new amount.
    pub over_applied: bool,
    pub old_amount_cents: i64,
    pub new_amount_cents: i64,
    pub previously_applied_cents: i64,
    pub total_applied_after_cents: i64,
    pub reversals: Vec<ReversalDetail>,
}

// =============================================================================
// Reconciler
// =============================================================================

/// Orchestrates payment recording, auto-apply, and corrections.
#[derive(Clone)]
pub struct Reconciler {
    db: Database,
    bus: EventBus,
    sink: Arc<dyn NotificationSink>,
}

impl Reconciler {
    /// Creates a new reconciler.
    pub fn new(db: Database, bus: EventBus, sink: Arc<dyn NotificationSink>) -> Self {
        Reconciler { db, bus, sink }
    }

    /// Returns the event bus so views can subscribe.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Records an advance payment and immediately attempts to apply it.
    ///
    /// ## Returns
    /// The payment as stored (post auto-apply when it succeeded) and the
    /// auto-apply outcome.
    ///
    /// ## Errors
    /// Validation and customer-lookup failures happen before anything is
    /// written. After the payment row exists, allocation failures are
    /// downgraded to a Warning notification - see the module docs.
    #[instrument(skip(self, input), fields(customer_id = %input.customer_id, amount_cents = input.amount_cents))]
    pub async fn record_advance_payment(
        &self,
        input: RecordPayment,
    ) -> LedgerResult<(AdvancePayment, AutoApplyResult)> {
        validation::validate_new_payment(
            &input.customer_id,
            input.amount_cents,
            input.payment_reference.as_deref(),
            input.notes.as_deref(),
        )
        .map_err(CoreError::from)?;

        let customer = self
            .db
            .customers()
            .get_by_id(&input.customer_id)
            .await?
            .filter(|c| c.is_active)
            .ok_or_else(|| CoreError::CustomerNotFound(input.customer_id.clone()))?;

        let payment = self
            .db
            .payments()
            .create(NewPayment {
                customer_id: customer.id.clone(),
                customer_type: customer.customer_type,
                amount_cents: input.amount_cents,
                payment_date: input.payment_date,
                method: input.method,
                payment_reference: input.payment_reference,
                notes: input.notes,
                created_by: input
                    .created_by
                    .unwrap_or_else(|| DEFAULT_ACTOR_ID.to_string()),
            })
            .await?;

        info!(
            payment_id = %payment.id,
            receipt_number = %payment.receipt_number,
            "Advance payment recorded"
        );

        self.bus
            .publish(PaymentEvent::new(PaymentAction::Created, payment.clone()));

        // The receipt exists from here on; allocation failure must not
        // unwind it.
        match self.auto_apply(&payment.id).await {
            Ok((updated, result)) => {
                self.sink.notify(&record_notification(&updated, &result));
                Ok((updated, result))
            }
            Err(e) => {
                warn!(payment_id = %payment.id, %e, "Auto-apply failed after recording");
                self.sink.notify(&Notification::warning(
                    "Payment recorded, allocation deferred",
                    format!(
                        "Receipt {} for {} was saved, but applying it to open invoices failed: {}. \
                         It remains available as unapplied credit.",
                        payment.receipt_number,
                        Money::from_cents(payment.amount_cents),
                        e
                    ),
                ));
                let amount = payment.amount_cents;
                Ok((
                    payment,
                    AutoApplyResult::not_applied(
                        "Allocation failed; the amount remains on the receipt",
                        amount,
                    ),
                ))
            }
        }
    }

    /// Applies an unapplied payment across the customer's open billings.
    ///
    /// One-shot by design: a payment that already has allocations fails
    /// with [`CoreError::PaymentAlreadyApplied`] so a double submit can
    /// never double-pay invoices.
    #[instrument(skip(self), fields(payment_id = %payment_id))]
    pub async fn auto_apply(
        &self,
        payment_id: &str,
    ) -> LedgerResult<(AdvancePayment, AutoApplyResult)> {
        for attempt in 0..MAX_CONFLICT_RETRIES {
            let payment = self.db.payments().require(payment_id).await?;

            let existing = self.db.payments().count_allocations(payment_id).await?;
            if existing > 0 {
                return Err(CoreError::PaymentAlreadyApplied {
                    payment_id: payment_id.to_string(),
                    allocation_count: existing as usize,
                }
                .into());
            }

            let billings = self
                .db
                .billings()
                .list_open_for_customer(&payment.customer_id)
                .await?;

            let plan = plan_auto_apply(&payment, &billings);

            if plan.is_empty() {
                info!(payment_id = %payment.id, "No open billings; payment stays unapplied");
                return Ok((payment, AutoApplyResult::from_plan(&plan)));
            }

            match self.db.payments().apply_plan(&payment, &plan).await {
                Ok((updated, _allocations)) => {
                    info!(
                        payment_id = %updated.id,
                        total_applied_cents = plan.total_applied_cents,
                        billings = plan.entries.len(),
                        "Auto-apply complete"
                    );
                    self.bus
                        .publish(PaymentEvent::new(PaymentAction::Updated, updated.clone()));
                    return Ok((updated, AutoApplyResult::from_plan(&plan)));
                }
                Err(DbError::Conflict { .. }) => {
                    warn!(
                        payment_id = %payment.id,
                        attempt = attempt + 1,
                        "Billing snapshot went stale during auto-apply; re-planning"
                    );
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(LedgerError::RetriesExhausted {
            entity: "Advance payment".to_string(),
            id: payment_id.to_string(),
            attempts: MAX_CONFLICT_RETRIES,
        })
    }

    /// Corrects an advance payment, repairing over-applied allocations.
    ///
    /// When the corrected amount is below what was already allocated, the
    /// repair planner reverses allocations most-recently-applied-first
    /// until the ledger invariant holds again, and the returned
    /// [`RepairReport`] (also sent through the notification sink as an
    /// Error) lists every touched invoice.
    #[instrument(skip(self, correction), fields(payment_id = %payment_id, new_amount_cents = correction.amount_cents))]
    pub async fn update_advance_payment(
        &self,
        payment_id: &str,
        correction: PaymentCorrection,
    ) -> LedgerResult<(AdvancePayment, RepairReport)> {
        validation::validate_payment_amount(correction.amount_cents).map_err(CoreError::from)?;
        validation::validate_optional_max_length(
            "payment_reference",
            correction.payment_reference.as_deref(),
            validation::MAX_REFERENCE_LEN,
        )
        .map_err(CoreError::from)?;
        validation::validate_optional_max_length(
            "notes",
            correction.notes.as_deref(),
            validation::MAX_NOTES_LEN,
        )
        .map_err(CoreError::from)?;

        for attempt in 0..MAX_CONFLICT_RETRIES {
            let payment = self.db.payments().require(payment_id).await?;
            let pairs = self.db.payments().allocations_with_billings(payment_id).await?;

            let plan = plan_repair(
                &payment,
                Money::from_cents(correction.amount_cents),
                &pairs,
            )?;

            let report = build_report(&correction, &plan, &pairs);

            // Merge the patch onto the stored payment.
            let update = PaymentUpdate {
                amount_cents: correction.amount_cents,
                payment_date: correction.payment_date.unwrap_or(payment.payment_date),
                method: correction.method.unwrap_or(payment.method),
                payment_reference: correction
                    .payment_reference
                    .clone()
                    .or_else(|| payment.payment_reference.clone()),
                notes: correction.notes.clone().or_else(|| payment.notes.clone()),
            };

            match self.db.payments().apply_repair(&payment, &update, &plan).await {
                Ok(updated) => {
                    info!(
                        payment_id = %updated.id,
                        reversals = report.reversals.len(),
                        over_applied = report.over_applied,
                        "Payment correction complete"
                    );
                    self.bus
                        .publish(PaymentEvent::new(PaymentAction::Updated, updated.clone()));
                    self.sink.notify(&repair_notification(&updated, &report));
                    return Ok((updated, report));
                }
                Err(DbError::Conflict { .. }) => {
                    warn!(
                        payment_id = %payment.id,
                        attempt = attempt + 1,
                        "Payment changed during correction; re-planning"
                    );
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(LedgerError::RetriesExhausted {
            entity: "Advance payment".to_string(),
            id: payment_id.to_string(),
            attempts: MAX_CONFLICT_RETRIES,
        })
    }
}

// =============================================================================
// Report / Notification Builders
// =============================================================================

/// Joins the repair plan with invoice numbers for the report.
fn build_report(
    correction: &PaymentCorrection,
    plan: &meridian_core::RepairPlan,
    pairs: &[(meridian_core::BillingAllocation, meridian_core::Billing)],
) -> RepairReport {
    let reversals = plan
        .reversals
        .iter()
        .map(|rev| {
            let invoice_number = pairs
                .iter()
                .find(|(a, _)| a.id == rev.allocation_id)
                .map(|(_, b)| b.invoice_number.clone())
                .unwrap_or_default();
            ReversalDetail {
                billing_id: rev.billing_id.clone(),
                invoice_number,
                reduced_by_cents: rev.reduce_by_cents,
                removed: rev.remove,
            }
        })
        .collect();

    RepairReport {
        over_applied: plan.was_over_applied(),
        old_amount_cents: plan.old_amount_cents,
        new_amount_cents: correction.amount_cents,
        previously_applied_cents: plan.previously_applied_cents,
        total_applied_after_cents: plan.total_applied_after_cents,
        reversals,
    }
}

fn record_notification(payment: &AdvancePayment, result: &AutoApplyResult) -> Notification {
    if result.applied {
        Notification::success(
            "Payment recorded",
            format!(
                "Receipt {}: applied {} across {} invoice(s); {} remains as credit.",
                payment.receipt_number,
                Money::from_cents(result.total_applied_cents),
                result.applications.len(),
                Money::from_cents(result.remaining_cents),
            ),
        )
    } else {
        Notification::success(
            "Payment recorded",
            format!(
                "Receipt {}: no open invoices; {} held as unapplied credit.",
                payment.receipt_number,
                Money::from_cents(result.remaining_cents),
            ),
        )
    }
}

fn repair_notification(payment: &AdvancePayment, report: &RepairReport) -> Notification {
    if report.over_applied {
        let invoices: Vec<String> = report
            .reversals
            .iter()
            .map(|r| {
                format!(
                    "{} (-{}{})",
                    r.invoice_number,
                    Money::from_cents(r.reduced_by_cents),
                    if r.removed { ", allocation removed" } else { "" }
                )
            })
            .collect();
        Notification::error(
            "Over-applied receipt repaired",
            format!(
                "Receipt {} was reduced from {} to {}; {} had been applied. \
                 Reversed: {}. Please review the affected invoices.",
                payment.receipt_number,
                Money::from_cents(report.old_amount_cents),
                Money::from_cents(report.new_amount_cents),
                Money::from_cents(report.previously_applied_cents),
                invoices.join(", "),
            ),
        )
    } else {
        Notification::success(
            "Payment updated",
            format!("Receipt {} was updated.", payment.receipt_number),
        )
    }
}
