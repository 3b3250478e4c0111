//! # Customer Repository
//!
//! Database operations for customers and their derived credit usage.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use meridian_core::{CreditUsage, Customer, CustomerType, Money};

/// Repository for customer database operations.
#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
}

impl CustomerRepository {
    /// Creates a new CustomerRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CustomerRepository { pool }
    }

    /// Creates a new customer.
    pub async fn create(
        &self,
        customer_type: CustomerType,
        name: &str,
        email: Option<&str>,
        phone: Option<&str>,
        credit_limit_cents: i64,
    ) -> DbResult<Customer> {
        let now = Utc::now();
        let customer = Customer {
            id: Uuid::new_v4().to_string(),
            customer_type,
            name: name.to_string(),
            email: email.map(str::to_string),
            phone: phone.map(str::to_string),
            credit_limit_cents,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        debug!(id = %customer.id, name = %customer.name, "Creating customer");

        sqlx::query(
            r#"
            INSERT INTO customers (
                id, customer_type, name, email, phone,
                credit_limit_cents, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&customer.id)
        .bind(customer.customer_type)
        .bind(&customer.name)
        .bind(&customer.email)
        .bind(&customer.phone)
        .bind(customer.credit_limit_cents)
        .bind(customer.is_active)
        .bind(customer.created_at)
        .bind(customer.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(customer)
    }

    /// Gets a customer by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Customer>> {
        let customer = sqlx::query_as::<_, Customer>(
            r#"
            SELECT id, customer_type, name, email, phone,
                   credit_limit_cents, is_active, created_at, updated_at
            FROM customers
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(customer)
    }

    /// Lists active customers, most recently registered first.
    pub async fn list_active(&self, limit: u32) -> DbResult<Vec<Customer>> {
        let customers = sqlx::query_as::<_, Customer>(
            r#"
            SELECT id, customer_type, name, email, phone,
                   credit_limit_cents, is_active, created_at, updated_at
            FROM customers
            WHERE is_active = 1
            ORDER BY created_at DESC
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(customers)
    }

    /// Updates a customer's credit limit.
    pub async fn update_credit_limit(&self, id: &str, credit_limit_cents: i64) -> DbResult<()> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE customers SET credit_limit_cents = ?2, updated_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(credit_limit_cents)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Customer", id));
        }

        Ok(())
    }

    /// Deactivates a customer (soft delete).
    pub async fn deactivate(&self, id: &str) -> DbResult<()> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE customers SET is_active = 0, updated_at = ?2
            WHERE id = ?1 AND is_active = 1
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Customer", id));
        }

        Ok(())
    }

    /// Computes a customer's credit usage from the billing ledger.
    ///
    /// ## Derivation
    /// `total_outstanding = SUM(total_amount_due - amount_paid)` over the
    /// customer's open billings. Never persisted; allocations change it
    /// indirectly by raising `amount_paid` on billings.
    pub async fn credit_usage(&self, id: &str) -> DbResult<CreditUsage> {
        let customer = self
            .get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Customer", id))?;

        let outstanding: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT SUM(total_amount_due_cents - amount_paid_cents)
            FROM billings
            WHERE customer_id = ?1 AND status IN ('unpaid', 'partially_paid')
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        Ok(CreditUsage::derive(
            customer.credit_limit(),
            Money::from_cents(outstanding.unwrap_or(0)),
        ))
    }
}
