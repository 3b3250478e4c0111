//! # Ledger Outbox Repository
//!
//! Manages the durable broadcast queue behind the event bus.
//!
//! ## The Outbox Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Outbox Pattern Implementation                        │
//! │                                                                         │
//! │  LEDGER MUTATION (e.g., auto-apply commits allocations)                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   SINGLE TRANSACTION                            │   │
//! │  │                                                                 │   │
//! │  │  1. INSERT INTO billing_allocations ... / UPDATE billings ...  │   │
//! │  │                                                                 │   │
//! │  │  2. INSERT INTO ledger_outbox (entity_type, entity_id,         │   │
//! │  │     customer_id, action, payload) VALUES                       │   │
//! │  │     ('ADVANCE_PAYMENT', ?, ?, 'updated', <payment JSON>)       │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMMIT ← Both succeed or both fail (atomicity guaranteed)             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │         OUTBOX PROCESSOR (meridian-ledger, async)               │   │
//! │  │                                                                 │   │
//! │  │  1. SELECT * FROM ledger_outbox WHERE published_at IS NULL     │   │
//! │  │  2. For each entry:                                            │   │
//! │  │     a. Broadcast on the event bus                              │   │
//! │  │     b. On success: mark_published(id)                          │   │
//! │  │     c. On failure: mark_failed(id, error)                      │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  KEY GUARANTEES:                                                       │
//! │  • A committed mutation always has its event row                       │
//! │  • An aborted mutation never leaks a phantom event                     │
//! │  • A view that missed the live broadcast can replay from here          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use meridian_core::LedgerOutboxEntry;

/// Entity type tag for advance payment events.
pub const ENTITY_ADVANCE_PAYMENT: &str = "ADVANCE_PAYMENT";

/// Queues an outbox entry inside an already-open transaction.
///
/// This is the same-transaction write the pattern depends on: callers that
/// mutate the ledger (PaymentRepository) use this so the event row commits
/// or rolls back with the mutation itself.
pub(crate) async fn queue_in_tx(
    tx: &mut Transaction<'_, Sqlite>,
    entity_type: &str,
    entity_id: &str,
    customer_id: &str,
    action: &str,
    payload: &str,
) -> DbResult<LedgerOutboxEntry> {
    let now = Utc::now();
    let entry = LedgerOutboxEntry {
        id: Uuid::new_v4().to_string(),
        entity_type: entity_type.to_string(),
        entity_id: entity_id.to_string(),
        customer_id: customer_id.to_string(),
        action: action.to_string(),
        payload: payload.to_string(),
        attempts: 0,
        last_error: None,
        created_at: now,
        attempted_at: None,
        published_at: None,
    };

    debug!(
        entity_type = %entity_type,
        entity_id = %entity_id,
        action = %action,
        "Queuing outbox entry"
    );

    sqlx::query(
        r#"
        INSERT INTO ledger_outbox (
            id, entity_type, entity_id, customer_id, action, payload,
            attempts, last_error, created_at, attempted_at, published_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.entity_type)
    .bind(&entry.entity_id)
    .bind(&entry.customer_id)
    .bind(&entry.action)
    .bind(&entry.payload)
    .bind(entry.attempts)
    .bind(&entry.last_error)
    .bind(entry.created_at)
    .bind(entry.attempted_at)
    .bind(entry.published_at)
    .execute(&mut **tx)
    .await?;

    Ok(entry)
}

const OUTBOX_COLUMNS: &str = r#"
    id, entity_type, entity_id, customer_id, action, payload,
    attempts, last_error, created_at, attempted_at, published_at
"#;

/// Repository for ledger outbox operations.
#[derive(Debug, Clone)]
pub struct LedgerOutboxRepository {
    pool: SqlitePool,
}

impl LedgerOutboxRepository {
    /// Creates a new LedgerOutboxRepository.
    pub fn new(pool: SqlitePool) -> Self {
        LedgerOutboxRepository { pool }
    }

    /// Gets pending entries that still need publishing.
    ///
    /// ## Returns
    /// Entries where `published_at IS NULL`, ordered by created_at
    /// (oldest first) so subscribers observe events in ledger order.
    pub async fn get_pending(&self, limit: u32) -> DbResult<Vec<LedgerOutboxEntry>> {
        let entries = sqlx::query_as::<_, LedgerOutboxEntry>(&format!(
            r#"
            SELECT {OUTBOX_COLUMNS} FROM ledger_outbox
            WHERE published_at IS NULL
            ORDER BY created_at ASC
            LIMIT ?1
            "#
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Marks an entry as successfully published.
    pub async fn mark_published(&self, id: &str) -> DbResult<()> {
        let now = Utc::now();

        sqlx::query(
            r#"
            UPDATE ledger_outbox SET
                published_at = ?2,
                attempted_at = ?2
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Records a publish failure.
    pub async fn mark_failed(&self, id: &str, error: &str) -> DbResult<()> {
        let now = Utc::now();

        sqlx::query(
            r#"
            UPDATE ledger_outbox SET
                attempts = attempts + 1,
                last_error = ?2,
                attempted_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Counts pending entries.
    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM ledger_outbox WHERE published_at IS NULL")
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    /// Deletes old published entries (cleanup).
    ///
    /// ## Arguments
    /// * `days_old` - Delete entries published more than this many days ago
    ///
    /// ## Returns
    /// Number of deleted entries.
    pub async fn cleanup_old_entries(&self, days_old: u32) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM ledger_outbox
            WHERE published_at IS NOT NULL
            AND published_at < datetime('now', '-' || ?1 || ' days')
            "#,
        )
        .bind(days_old)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
