//! # Advance Payment Repository
//!
//! Database operations for advance payments, their allocations, and the
//! transactional application of allocation and repair plans.
//!
//! ## Transaction Boundaries
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   Payment Write Transactions                            │
//! │                                                                         │
//! │  TX 1: create()                                                        │
//! │  ├── generate receipt number (daily counter)                           │
//! │  ├── INSERT advance_payments                                           │
//! │  └── INSERT ledger_outbox ('created')                                  │
//! │                                                                         │
//! │  TX 2: apply_plan()            ← auto-apply, all-or-nothing            │
//! │  ├── INSERT billing_allocations (one per planned entry)                │
//! │  ├── UPDATE billings  ... WHERE amount_paid_cents = <snapshot>  ◄──┐   │
//! │  ├── UPDATE advance_payments SET status                            │   │
//! │  └── INSERT ledger_outbox ('updated')                              │   │
//! │                                                                    │   │
//! │  TX 3: apply_repair()          ← correction, all-or-nothing        │   │
//! │  ├── UPDATE advance_payments ... WHERE amount_cents = <snapshot> ◄─┤   │
//! │  ├── UPDATE / DELETE billing_allocations (reversals)               │   │
//! │  ├── UPDATE billings  ... WHERE amount_paid_cents = <snapshot>  ◄──┘   │
//! │  └── INSERT ledger_outbox ('updated')       optimistic guards ─────    │
//! │                                                                         │
//! │  A failed guard rolls the WHOLE transaction back with DbError::        │
//! │  Conflict; the reconciler re-reads and re-plans.                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! TX 1 and TX 2 are deliberately separate: a recorded receipt must survive
//! even if its auto-apply pass fails. The reconciler turns that split into a
//! Warning notification rather than a rollback.

use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::outbox::{self, ENTITY_ADVANCE_PAYMENT};
use meridian_core::{
    AdvancePayment, AllocationPlan, Billing, BillingAllocation, CustomerType, PaymentMethod,
    RepairPlan,
};

const PAYMENT_COLUMNS: &str = r#"
    id, customer_id, customer_type, amount_cents, payment_date,
    method, payment_reference, notes, receipt_number, created_by,
    status, created_at, updated_at
"#;

/// Fields accepted when recording a new advance payment.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub customer_id: String,
    pub customer_type: CustomerType,
    pub amount_cents: i64,
    pub payment_date: DateTime<Utc>,
    pub method: PaymentMethod,
    pub payment_reference: Option<String>,
    pub notes: Option<String>,
    pub created_by: String,
}

/// Fields accepted when correcting an existing advance payment.
///
/// The receipt number, customer, and creation audit fields are immutable.
#[derive(Debug, Clone)]
pub struct PaymentUpdate {
    pub amount_cents: i64,
    pub payment_date: DateTime<Utc>,
    pub method: PaymentMethod,
    pub payment_reference: Option<String>,
    pub notes: Option<String>,
}

/// Repository for advance payment database operations.
#[derive(Debug, Clone)]
pub struct PaymentRepository {
    pool: SqlitePool,
}

impl PaymentRepository {
    /// Creates a new PaymentRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PaymentRepository { pool }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Gets an advance payment by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<AdvancePayment>> {
        let payment = sqlx::query_as::<_, AdvancePayment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM advance_payments WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payment)
    }

    /// Fetches an advance payment or fails with NotFound.
    pub async fn require(&self, id: &str) -> DbResult<AdvancePayment> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Advance payment", id))
    }

    /// Gets an advance payment by its receipt number.
    pub async fn get_by_receipt_number(
        &self,
        receipt_number: &str,
    ) -> DbResult<Option<AdvancePayment>> {
        let payment = sqlx::query_as::<_, AdvancePayment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM advance_payments WHERE receipt_number = ?1"
        ))
        .bind(receipt_number)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payment)
    }

    /// Lists a customer's advance payments, newest first.
    pub async fn list_for_customer(&self, customer_id: &str) -> DbResult<Vec<AdvancePayment>> {
        let payments = sqlx::query_as::<_, AdvancePayment>(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS} FROM advance_payments
            WHERE customer_id = ?1
            ORDER BY created_at DESC
            "#
        ))
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(payments)
    }

    /// Lists a payment's allocations in application order (oldest first).
    pub async fn allocations(&self, payment_id: &str) -> DbResult<Vec<BillingAllocation>> {
        let allocations = sqlx::query_as::<_, BillingAllocation>(
            r#"
            SELECT id, advance_payment_id, billing_id, applied_amount_cents, applied_at
            FROM billing_allocations
            WHERE advance_payment_id = ?1
            ORDER BY applied_at ASC, id ASC
            "#,
        )
        .bind(payment_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(allocations)
    }

    /// Sums a payment's allocations, in cents.
    pub async fn total_applied(&self, payment_id: &str) -> DbResult<i64> {
        let total: Option<i64> = sqlx::query_scalar(
            "SELECT SUM(applied_amount_cents) FROM billing_allocations WHERE advance_payment_id = ?1",
        )
        .bind(payment_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(total.unwrap_or(0))
    }

    /// Counts a payment's allocations (the auto-apply idempotency check).
    pub async fn count_allocations(&self, payment_id: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM billing_allocations WHERE advance_payment_id = ?1",
        )
        .bind(payment_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Loads a payment's allocations together with their billings, in
    /// application order. This is the snapshot the repair planner consumes.
    pub async fn allocations_with_billings(
        &self,
        payment_id: &str,
    ) -> DbResult<Vec<(BillingAllocation, Billing)>> {
        let allocations = self.allocations(payment_id).await?;

        let mut pairs = Vec::with_capacity(allocations.len());
        for allocation in allocations {
            let billing = sqlx::query_as::<_, Billing>(
                r#"
                SELECT id, customer_id, invoice_number,
                       total_amount_due_cents, amount_paid_cents, gst_rate_bps,
                       status, due_date, created_at, updated_at
                FROM billings
                WHERE id = ?1
                "#,
            )
            .bind(&allocation.billing_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Billing", &allocation.billing_id))?;

            pairs.push((allocation, billing));
        }

        Ok(pairs)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Records a new advance payment (TX 1).
    ///
    /// Generates the receipt number, inserts the row, and queues the
    /// `created` outbox event - all in one transaction. Allocation happens
    /// afterwards in its own transaction so the receipt survives an
    /// allocation failure.
    pub async fn create(&self, input: NewPayment) -> DbResult<AdvancePayment> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let receipt_number = generate_receipt_number(&mut tx, now).await?;

        let payment = AdvancePayment {
            id: Uuid::new_v4().to_string(),
            customer_id: input.customer_id,
            customer_type: input.customer_type,
            amount_cents: input.amount_cents,
            payment_date: input.payment_date,
            method: input.method,
            payment_reference: input.payment_reference,
            notes: input.notes,
            receipt_number,
            created_by: input.created_by,
            status: meridian_core::PaymentStatus::Unapplied,
            created_at: now,
            updated_at: now,
        };

        debug!(
            id = %payment.id,
            receipt_number = %payment.receipt_number,
            amount_cents = payment.amount_cents,
            "Recording advance payment"
        );

        sqlx::query(
            r#"
            INSERT INTO advance_payments (
                id, customer_id, customer_type, amount_cents, payment_date,
                method, payment_reference, notes, receipt_number, created_by,
                status, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&payment.id)
        .bind(&payment.customer_id)
        .bind(payment.customer_type)
        .bind(payment.amount_cents)
        .bind(payment.payment_date)
        .bind(payment.method)
        .bind(&payment.payment_reference)
        .bind(&payment.notes)
        .bind(&payment.receipt_number)
        .bind(&payment.created_by)
        .bind(payment.status)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&mut *tx)
        .await?;

        let payload = payment_event_payload(&payment)?;
        outbox::queue_in_tx(
            &mut tx,
            ENTITY_ADVANCE_PAYMENT,
            &payment.id,
            &payment.customer_id,
            "created",
            &payload,
        )
        .await?;

        tx.commit().await?;

        Ok(payment)
    }

    /// Applies an allocation plan atomically (TX 2).
    ///
    /// All allocation inserts, billing updates, the payment status change,
    /// and the `updated` outbox event commit together. Every billing update
    /// is guarded on the `amount_paid_cents` snapshot the plan was built
    /// from; a stale snapshot aborts the whole transaction with
    /// [`DbError::Conflict`].
    ///
    /// ## Returns
    /// The updated payment and the allocation rows that were created.
    pub async fn apply_plan(
        &self,
        payment: &AdvancePayment,
        plan: &AllocationPlan,
    ) -> DbResult<(AdvancePayment, Vec<BillingAllocation>)> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let mut created = Vec::with_capacity(plan.entries.len());

        for entry in &plan.entries {
            let allocation = BillingAllocation {
                id: Uuid::new_v4().to_string(),
                advance_payment_id: payment.id.clone(),
                billing_id: entry.billing_id.clone(),
                applied_amount_cents: entry.amount_cents,
                applied_at: now,
            };

            sqlx::query(
                r#"
                INSERT INTO billing_allocations (
                    id, advance_payment_id, billing_id, applied_amount_cents, applied_at
                ) VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .bind(&allocation.id)
            .bind(&allocation.advance_payment_id)
            .bind(&allocation.billing_id)
            .bind(allocation.applied_amount_cents)
            .bind(allocation.applied_at)
            .execute(&mut *tx)
            .await?;

            // Optimistic guard: only write if the billing is unchanged since
            // the snapshot read that produced this plan.
            let result = sqlx::query(
                r#"
                UPDATE billings SET
                    amount_paid_cents = ?3,
                    status = ?4,
                    updated_at = ?5
                WHERE id = ?1 AND amount_paid_cents = ?2
                "#,
            )
            .bind(&entry.billing_id)
            .bind(entry.previous_amount_paid_cents)
            .bind(entry.new_amount_paid_cents)
            .bind(entry.new_status)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                return Err(DbError::conflict("Billing", &entry.billing_id));
            }

            created.push(allocation);
        }

        let mut updated = payment.clone();
        updated.status = plan.payment_status;
        updated.updated_at = now;

        sqlx::query(
            r#"
            UPDATE advance_payments SET status = ?2, updated_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(&updated.id)
        .bind(updated.status)
        .bind(updated.updated_at)
        .execute(&mut *tx)
        .await?;

        let payload = payment_event_payload(&updated)?;
        outbox::queue_in_tx(
            &mut tx,
            ENTITY_ADVANCE_PAYMENT,
            &updated.id,
            &updated.customer_id,
            "updated",
            &payload,
        )
        .await?;

        tx.commit().await?;

        debug!(
            payment_id = %updated.id,
            allocations = created.len(),
            total_applied_cents = plan.total_applied_cents,
            "Allocation plan applied"
        );

        Ok((updated, created))
    }

    /// Applies a payment correction and its repair plan atomically (TX 3).
    ///
    /// The payment row update is guarded on the amount the plan was built
    /// against, so two concurrent edits of the same receipt cannot
    /// interleave: the loser gets [`DbError::Conflict`] and must re-read.
    ///
    /// ## Returns
    /// The updated payment row.
    pub async fn apply_repair(
        &self,
        payment: &AdvancePayment,
        update: &PaymentUpdate,
        plan: &RepairPlan,
    ) -> DbResult<AdvancePayment> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let mut updated = payment.clone();
        updated.amount_cents = update.amount_cents;
        updated.payment_date = update.payment_date;
        updated.method = update.method;
        updated.payment_reference = update.payment_reference.clone();
        updated.notes = update.notes.clone();
        updated.status = plan.payment_status_after;
        updated.updated_at = now;

        // Guard on the amount snapshot the repair plan was computed from.
        let result = sqlx::query(
            r#"
            UPDATE advance_payments SET
                amount_cents = ?3,
                payment_date = ?4,
                method = ?5,
                payment_reference = ?6,
                notes = ?7,
                status = ?8,
                updated_at = ?9
            WHERE id = ?1 AND amount_cents = ?2
            "#,
        )
        .bind(&payment.id)
        .bind(plan.old_amount_cents)
        .bind(updated.amount_cents)
        .bind(updated.payment_date)
        .bind(updated.method)
        .bind(&updated.payment_reference)
        .bind(&updated.notes)
        .bind(updated.status)
        .bind(updated.updated_at)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::conflict("Advance payment", &payment.id));
        }

        for reversal in &plan.reversals {
            if reversal.remove {
                sqlx::query("DELETE FROM billing_allocations WHERE id = ?1")
                    .bind(&reversal.allocation_id)
                    .execute(&mut *tx)
                    .await?;
            } else {
                sqlx::query(
                    r#"
                    UPDATE billing_allocations SET
                        applied_amount_cents = applied_amount_cents - ?2
                    WHERE id = ?1
                    "#,
                )
                .bind(&reversal.allocation_id)
                .bind(reversal.reduce_by_cents)
                .execute(&mut *tx)
                .await?;
            }

            let result = sqlx::query(
                r#"
                UPDATE billings SET
                    amount_paid_cents = ?3,
                    status = ?4,
                    updated_at = ?5
                WHERE id = ?1 AND amount_paid_cents = ?2
                "#,
            )
            .bind(&reversal.billing_id)
            .bind(reversal.billing_previous_amount_paid_cents)
            .bind(reversal.billing_new_amount_paid_cents)
            .bind(reversal.billing_new_status)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                return Err(DbError::conflict("Billing", &reversal.billing_id));
            }
        }

        let payload = payment_event_payload(&updated)?;
        outbox::queue_in_tx(
            &mut tx,
            ENTITY_ADVANCE_PAYMENT,
            &updated.id,
            &updated.customer_id,
            "updated",
            &payload,
        )
        .await?;

        tx.commit().await?;

        debug!(
            payment_id = %updated.id,
            reversals = plan.reversals.len(),
            new_amount_cents = updated.amount_cents,
            "Payment correction applied"
        );

        Ok(updated)
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Serializes the outbox payload for a payment event.
fn payment_event_payload(payment: &AdvancePayment) -> DbResult<String> {
    let payload = json!({
        "payment": payment,
    });
    Ok(serde_json::to_string(&payload)?)
}

/// Generates a receipt number in format: `ADV-YYYYMMDD-NNNN`
///
/// ## Format
/// - ADV: advance payment prefix
/// - YYYYMMDD: date the receipt was recorded
/// - NNNN: daily sequence, starting at 0001
///
/// The sequence is derived from a count inside the creation transaction;
/// the UNIQUE constraint on `receipt_number` backstops a race between two
/// simultaneous creates.
async fn generate_receipt_number(
    tx: &mut Transaction<'_, Sqlite>,
    now: DateTime<Utc>,
) -> DbResult<String> {
    let prefix = format!("ADV-{}-", now.format("%Y%m%d"));
    let like = format!("{prefix}%");

    let existing: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM advance_payments WHERE receipt_number LIKE ?1")
            .bind(&like)
            .fetch_one(&mut **tx)
            .await?;

    Ok(format!("{}{:04}", prefix, existing + 1))
}
