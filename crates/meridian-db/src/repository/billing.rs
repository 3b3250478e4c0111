//! # Billing Repository
//!
//! Database operations for billings (invoices) and their allocation history.
//!
//! ## The Open-Billing Query
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Auto-apply reads ONE ordered snapshot:                                 │
//! │                                                                         │
//! │  SELECT ... FROM billings                                              │
//! │  WHERE customer_id = ? AND status IN ('unpaid', 'partially_paid')      │
//! │  ORDER BY created_at ASC          ← oldest debt clears first           │
//! │                                                                         │
//! │  Backed by idx_billings_customer_status (customer_id, status,          │
//! │  created_at) so the walk never scans the whole ledger.                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use meridian_core::{Billing, BillingAllocation, BillingStatus, GstRate, Money};

const BILLING_COLUMNS: &str = r#"
    id, customer_id, invoice_number,
    total_amount_due_cents, amount_paid_cents, gst_rate_bps,
    status, due_date, created_at, updated_at
"#;

/// Repository for billing database operations.
#[derive(Debug, Clone)]
pub struct BillingRepository {
    pool: SqlitePool,
}

impl BillingRepository {
    /// Creates a new BillingRepository.
    pub fn new(pool: SqlitePool) -> Self {
        BillingRepository { pool }
    }

    /// Creates a new billing in `unpaid` state.
    ///
    /// `net_amount_cents` is the pre-tax invoice value; the stored
    /// `total_amount_due` is the gross (`net + GST` at the given rate,
    /// half-up rounding via [`Money::calculate_gst`]).
    pub async fn create(
        &self,
        customer_id: &str,
        invoice_number: &str,
        net_amount_cents: i64,
        gst_rate: GstRate,
        due_date: Option<DateTime<Utc>>,
    ) -> DbResult<Billing> {
        let now = Utc::now();
        let net = Money::from_cents(net_amount_cents);
        let total_due = net + net.calculate_gst(gst_rate);

        let billing = Billing {
            id: Uuid::new_v4().to_string(),
            customer_id: customer_id.to_string(),
            invoice_number: invoice_number.to_string(),
            total_amount_due_cents: total_due.cents(),
            amount_paid_cents: 0,
            gst_rate_bps: gst_rate.bps() as i64,
            status: BillingStatus::Unpaid,
            due_date,
            created_at: now,
            updated_at: now,
        };

        debug!(
            id = %billing.id,
            invoice_number = %billing.invoice_number,
            "Creating billing"
        );

        sqlx::query(
            r#"
            INSERT INTO billings (
                id, customer_id, invoice_number,
                total_amount_due_cents, amount_paid_cents, gst_rate_bps,
                status, due_date, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&billing.id)
        .bind(&billing.customer_id)
        .bind(&billing.invoice_number)
        .bind(billing.total_amount_due_cents)
        .bind(billing.amount_paid_cents)
        .bind(billing.gst_rate_bps)
        .bind(billing.status)
        .bind(billing.due_date)
        .bind(billing.created_at)
        .bind(billing.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(billing)
    }

    /// Gets a billing by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Billing>> {
        let billing = sqlx::query_as::<_, Billing>(&format!(
            "SELECT {BILLING_COLUMNS} FROM billings WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(billing)
    }

    /// Lists a customer's open billings, oldest first.
    ///
    /// This is the exact snapshot the auto-apply planner consumes: unpaid
    /// and partially-paid billings in creation order.
    pub async fn list_open_for_customer(&self, customer_id: &str) -> DbResult<Vec<Billing>> {
        let billings = sqlx::query_as::<_, Billing>(&format!(
            r#"
            SELECT {BILLING_COLUMNS} FROM billings
            WHERE customer_id = ?1 AND status IN ('unpaid', 'partially_paid')
            ORDER BY created_at ASC
            "#
        ))
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(billings)
    }

    /// Lists all billings for a customer, newest first.
    pub async fn list_for_customer(&self, customer_id: &str) -> DbResult<Vec<Billing>> {
        let billings = sqlx::query_as::<_, Billing>(&format!(
            r#"
            SELECT {BILLING_COLUMNS} FROM billings
            WHERE customer_id = ?1
            ORDER BY created_at DESC
            "#
        ))
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(billings)
    }

    /// Lists the allocations applied to one billing, oldest first.
    ///
    /// Feeds the billing detail view: which receipts paid this invoice down.
    pub async fn allocation_history(&self, billing_id: &str) -> DbResult<Vec<BillingAllocation>> {
        let allocations = sqlx::query_as::<_, BillingAllocation>(
            r#"
            SELECT id, advance_payment_id, billing_id, applied_amount_cents, applied_at
            FROM billing_allocations
            WHERE billing_id = ?1
            ORDER BY applied_at ASC
            "#,
        )
        .bind(billing_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(allocations)
    }

    /// Sums a customer's outstanding balance over open billings.
    pub async fn total_outstanding(&self, customer_id: &str) -> DbResult<i64> {
        let total: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT SUM(total_amount_due_cents - amount_paid_cents)
            FROM billings
            WHERE customer_id = ?1 AND status IN ('unpaid', 'partially_paid')
            "#,
        )
        .bind(customer_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(total.unwrap_or(0))
    }

    /// Fetches a billing or fails with NotFound.
    pub async fn require(&self, id: &str) -> DbResult<Billing> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Billing", id))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use meridian_core::CustomerType;

    async fn setup() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn create_computes_gross_from_net_and_gst_rate() {
        let db = setup().await;
        let customer = db
            .customers()
            .create(CustomerType::Company, "Apex Consulting", None, None, 0)
            .await
            .unwrap();

        // 500.00 net at 18% GST → 590.00 gross due.
        let billing = db
            .billings()
            .create(&customer.id, "INV-001", 50_000, GstRate::from_bps(1800), None)
            .await
            .unwrap();

        assert_eq!(billing.total_amount_due_cents, 59_000);
        assert_eq!(billing.gst_rate_bps, 1800);
        assert_eq!(billing.status, BillingStatus::Unpaid);

        let stored = db.billings().require(&billing.id).await.unwrap();
        assert_eq!(stored.total_amount_due_cents, 59_000);
    }

    #[tokio::test]
    async fn create_with_zero_rate_stores_net_as_due() {
        let db = setup().await;
        let customer = db
            .customers()
            .create(CustomerType::Individual, "Grace Liu", None, None, 0)
            .await
            .unwrap();

        let billing = db
            .billings()
            .create(&customer.id, "INV-002", 25_000, GstRate::zero(), None)
            .await
            .unwrap();

        assert_eq!(billing.total_amount_due_cents, 25_000);
        assert_eq!(billing.gst_rate_bps, 0);
    }
}
