//! Integration tests for the reconciliation flow, end to end over an
//! in-memory SQLite database: record → auto-apply → correct → repair,
//! plus the outbox and event-bus plumbing around it.

use std::sync::Arc;

use chrono::Utc;
use meridian_core::{
    BillingStatus, CoreError, CustomerType, GstRate, Money, PaymentMethod, PaymentStatus,
};
use meridian_db::{Database, DbConfig, DbError};
use meridian_ledger::{
    EventBus, LedgerError, MemorySink, NotifyKind, OutboxProcessor, PaymentAction,
    PaymentCorrection, Reconciler, RecordPayment,
};

// =============================================================================
// Helpers
// =============================================================================

struct Harness {
    db: Database,
    reconciler: Reconciler,
    sink: Arc<MemorySink>,
    bus: EventBus,
}

async fn setup() -> Harness {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let bus = EventBus::new();
    let sink = Arc::new(MemorySink::new());
    let reconciler = Reconciler::new(db.clone(), bus.clone(), sink.clone());
    Harness {
        db,
        reconciler,
        sink,
        bus,
    }
}

async fn customer(h: &Harness, name: &str) -> String {
    h.db.customers()
        .create(CustomerType::Company, name, None, None, 1_000_000)
        .await
        .unwrap()
        .id
}

/// Zero-rated invoices so `due_cents` is the exact amount due.
async fn billing(h: &Harness, customer_id: &str, invoice: &str, due_cents: i64) -> String {
    let billing = h
        .db
        .billings()
        .create(customer_id, invoice, due_cents, GstRate::zero(), None)
        .await
        .unwrap();
    // Creation order drives auto-apply order; keep timestamps distinct.
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    billing.id
}

fn record_input(customer_id: &str, amount_cents: i64) -> RecordPayment {
    RecordPayment {
        customer_id: customer_id.to_string(),
        amount_cents,
        payment_date: Utc::now(),
        method: PaymentMethod::BankTransfer,
        payment_reference: Some("UTR-1001".to_string()),
        notes: None,
        created_by: Some("staff-1".to_string()),
    }
}

/// An amount-only patch; everything else keeps the stored value.
fn correction(amount_cents: i64) -> PaymentCorrection {
    PaymentCorrection {
        amount_cents,
        payment_date: None,
        method: None,
        payment_reference: None,
        notes: None,
    }
}

// =============================================================================
// Record + Auto-Apply
// =============================================================================

#[tokio::test]
async fn payment_covers_oldest_billings_first() {
    let h = setup().await;
    let cust = customer(&h, "Apex Consulting").await;
    let b1 = billing(&h, &cust, "INV-001", 500).await;
    let b2 = billing(&h, &cust, "INV-002", 300).await;

    let (payment, result) = h
        .reconciler
        .record_advance_payment(record_input(&cust, 650))
        .await
        .unwrap();

    assert!(result.applied);
    assert_eq!(result.total_applied_cents, 650);
    assert_eq!(result.remaining_cents, 0);
    assert_eq!(result.applications.len(), 2);
    assert_eq!(payment.status, PaymentStatus::Applied);

    // Oldest billing fully paid, newer one partial.
    let b1 = h.db.billings().require(&b1).await.unwrap();
    assert_eq!(b1.status, BillingStatus::Paid);
    assert_eq!(b1.amount_paid_cents, 500);

    let b2 = h.db.billings().require(&b2).await.unwrap();
    assert_eq!(b2.status, BillingStatus::PartiallyPaid);
    assert_eq!(b2.amount_paid_cents, 150);
}

#[tokio::test]
async fn surplus_stays_on_payment_as_credit() {
    let h = setup().await;
    let cust = customer(&h, "Summit Trading").await;
    billing(&h, &cust, "INV-010", 700).await;

    let (payment, result) = h
        .reconciler
        .record_advance_payment(record_input(&cust, 100_000))
        .await
        .unwrap();

    assert_eq!(result.total_applied_cents, 700);
    assert_eq!(result.remaining_cents, 99_300);
    assert_eq!(payment.status, PaymentStatus::PartiallyApplied);

    // Allocations never exceed the payment amount.
    let applied = h.db.payments().total_applied(&payment.id).await.unwrap();
    assert_eq!(applied, 700);
    assert!(applied <= payment.amount_cents);
}

#[tokio::test]
async fn no_open_billings_leaves_payment_unapplied() {
    let h = setup().await;
    let cust = customer(&h, "Cascade Holdings").await;

    let (payment, result) = h
        .reconciler
        .record_advance_payment(record_input(&cust, 650))
        .await
        .unwrap();

    assert!(!result.applied);
    assert!(result.message.is_some());
    assert_eq!(payment.status, PaymentStatus::Unapplied);
    assert!(h
        .db
        .payments()
        .allocations(&payment.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn receipt_numbers_follow_daily_sequence() {
    let h = setup().await;
    let cust = customer(&h, "Pinnacle Services").await;

    let (p1, _) = h
        .reconciler
        .record_advance_payment(record_input(&cust, 100))
        .await
        .unwrap();
    let (p2, _) = h
        .reconciler
        .record_advance_payment(record_input(&cust, 200))
        .await
        .unwrap();

    let prefix = format!("ADV-{}-", Utc::now().format("%Y%m%d"));
    assert!(p1.receipt_number.starts_with(&prefix));
    assert!(p1.receipt_number.ends_with("0001"));
    assert!(p2.receipt_number.ends_with("0002"));
}

#[tokio::test]
async fn auto_apply_is_one_shot() {
    let h = setup().await;
    let cust = customer(&h, "Horizon Analytics").await;
    billing(&h, &cust, "INV-020", 500).await;

    let (payment, _) = h
        .reconciler
        .record_advance_payment(record_input(&cust, 650))
        .await
        .unwrap();

    // A second invocation (double submit) must not double the allocations.
    let err = h.reconciler.auto_apply(&payment.id).await.unwrap_err();
    assert!(matches!(
        err,
        LedgerError::Core(CoreError::PaymentAlreadyApplied { .. })
    ));

    let allocations = h.db.payments().allocations(&payment.id).await.unwrap();
    assert_eq!(allocations.len(), 1);
}

#[tokio::test]
async fn credit_usage_reflects_allocations() {
    let h = setup().await;
    let cust = customer(&h, "Vertex Industries").await;
    billing(&h, &cust, "INV-030", 40_000).await;

    let before = h.db.customers().credit_usage(&cust).await.unwrap();
    assert_eq!(before.total_outstanding_cents, 40_000);

    h.reconciler
        .record_advance_payment(record_input(&cust, 15_000))
        .await
        .unwrap();

    let after = h.db.customers().credit_usage(&cust).await.unwrap();
    assert_eq!(after.total_outstanding_cents, 25_000);
    assert!(!after.is_over_limit());
}

// =============================================================================
// Validation and Lookup Failures
// =============================================================================

#[tokio::test]
async fn zero_amount_is_rejected_before_any_write() {
    let h = setup().await;
    let cust = customer(&h, "Sterling Partners").await;

    let err = h
        .reconciler
        .record_advance_payment(record_input(&cust, 0))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::Core(CoreError::Validation(_))
    ));

    let payments = h.db.payments().list_for_customer(&cust).await.unwrap();
    assert!(payments.is_empty());
    assert_eq!(h.db.outbox().count_pending().await.unwrap(), 0);
}

#[tokio::test]
async fn unknown_customer_is_rejected() {
    let h = setup().await;
    let bogus = uuid::Uuid::new_v4().to_string();

    let err = h
        .reconciler
        .record_advance_payment(record_input(&bogus, 500))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::Core(CoreError::CustomerNotFound(_))
    ));
}

// =============================================================================
// Correction / Repair
// =============================================================================

#[tokio::test]
async fn correction_down_reverses_most_recent_allocation_first() {
    let h = setup().await;
    let cust = customer(&h, "Northgate Logistics").await;
    let b1 = billing(&h, &cust, "INV-040", 100).await;
    let b2 = billing(&h, &cust, "INV-041", 100).await;

    let (payment, _) = h
        .reconciler
        .record_advance_payment(record_input(&cust, 200))
        .await
        .unwrap();
    h.sink.take();

    // 200 fully applied as 100 + 100; corrected down to 120.
    let (updated, report) = h
        .reconciler
        .update_advance_payment(&payment.id, correction(120))
        .await
        .unwrap();

    assert!(report.over_applied);
    assert_eq!(report.old_amount_cents, 200);
    assert_eq!(report.new_amount_cents, 120);
    assert_eq!(report.previously_applied_cents, 200);
    assert_eq!(report.total_applied_after_cents, 120);
    assert_eq!(updated.status, PaymentStatus::Applied);

    // Only the most recent allocation was touched: 100 → 20.
    assert_eq!(report.reversals.len(), 1);
    assert_eq!(report.reversals[0].invoice_number, "INV-041");
    assert_eq!(report.reversals[0].reduced_by_cents, 80);
    assert!(!report.reversals[0].removed);

    let b1 = h.db.billings().require(&b1).await.unwrap();
    assert_eq!(b1.status, BillingStatus::Paid);
    let b2 = h.db.billings().require(&b2).await.unwrap();
    assert_eq!(b2.amount_paid_cents, 20);
    assert_eq!(b2.status, BillingStatus::PartiallyPaid);

    // The repair must be surfaced loudly.
    let notifications = h.sink.take();
    assert!(notifications
        .iter()
        .any(|n| n.kind == NotifyKind::Error && n.message.contains("INV-041")));
}

#[tokio::test]
async fn correction_can_remove_allocations_entirely() {
    let h = setup().await;
    let cust = customer(&h, "Coastal Engineering").await;
    let b1 = billing(&h, &cust, "INV-050", 100).await;
    let b2 = billing(&h, &cust, "INV-051", 100).await;

    let (payment, _) = h
        .reconciler
        .record_advance_payment(record_input(&cust, 200))
        .await
        .unwrap();

    let (updated, report) = h
        .reconciler
        .update_advance_payment(&payment.id, correction(50))
        .await
        .unwrap();

    assert_eq!(report.reversals.len(), 2);
    assert!(report.reversals[0].removed);
    assert_eq!(report.total_applied_after_cents, 50);
    assert_eq!(updated.amount_cents, 50);

    // Newest billing fully reverted, oldest reduced to 50.
    let b2 = h.db.billings().require(&b2).await.unwrap();
    assert_eq!(b2.amount_paid_cents, 0);
    assert_eq!(b2.status, BillingStatus::Unpaid);
    let b1 = h.db.billings().require(&b1).await.unwrap();
    assert_eq!(b1.amount_paid_cents, 50);
    assert_eq!(b1.status, BillingStatus::PartiallyPaid);

    // One remaining allocation row, reduced in place.
    let allocations = h.db.payments().allocations(&payment.id).await.unwrap();
    assert_eq!(allocations.len(), 1);
    assert_eq!(allocations[0].applied_amount_cents, 50);
}

#[tokio::test]
async fn amount_only_correction_keeps_reference_and_notes() {
    let h = setup().await;
    let cust = customer(&h, "Elmwood Advisory").await;

    let mut input = record_input(&cust, 300);
    input.notes = Some("Quarterly retainer deposit".to_string());
    let (payment, _) = h.reconciler.record_advance_payment(input).await.unwrap();

    let (updated, _) = h
        .reconciler
        .update_advance_payment(&payment.id, correction(250))
        .await
        .unwrap();

    assert_eq!(updated.amount_cents, 250);
    assert_eq!(updated.method, PaymentMethod::BankTransfer);
    assert_eq!(updated.payment_reference.as_deref(), Some("UTR-1001"));
    assert_eq!(updated.notes.as_deref(), Some("Quarterly retainer deposit"));
}

#[tokio::test]
async fn correction_up_touches_no_allocations() {
    let h = setup().await;
    let cust = customer(&h, "Ironwood Solutions").await;
    billing(&h, &cust, "INV-060", 100).await;

    let (payment, _) = h
        .reconciler
        .record_advance_payment(record_input(&cust, 200))
        .await
        .unwrap();
    h.sink.take();

    let (updated, report) = h
        .reconciler
        .update_advance_payment(&payment.id, correction(300))
        .await
        .unwrap();

    assert!(!report.over_applied);
    assert!(report.reversals.is_empty());
    assert_eq!(updated.amount_cents, 300);
    // 100 of 300 applied now.
    assert_eq!(updated.status, PaymentStatus::PartiallyApplied);

    let notifications = h.sink.take();
    assert!(notifications.iter().all(|n| n.kind != NotifyKind::Error));
}

// =============================================================================
// Events and Outbox
// =============================================================================

#[tokio::test]
async fn subscribers_see_created_then_updated() {
    let h = setup().await;
    let cust = customer(&h, "Lakeshore Trading").await;
    billing(&h, &cust, "INV-070", 500).await;

    let mut rx = h.bus.subscribe();

    h.reconciler
        .record_advance_payment(record_input(&cust, 650))
        .await
        .unwrap();

    let created = rx.recv().await.unwrap();
    assert_eq!(created.action, PaymentAction::Created);
    assert_eq!(created.customer_id, cust);
    assert_eq!(created.payment.status, PaymentStatus::Unapplied);

    let updated = rx.recv().await.unwrap();
    assert_eq!(updated.action, PaymentAction::Updated);
    assert_eq!(updated.payment.status, PaymentStatus::PartiallyApplied);
}

#[tokio::test]
async fn outbox_records_every_mutation_durably() {
    let h = setup().await;
    let cust = customer(&h, "Bluepeak Services").await;
    billing(&h, &cust, "INV-080", 500).await;

    let (payment, _) = h
        .reconciler
        .record_advance_payment(record_input(&cust, 650))
        .await
        .unwrap();

    // 'created' + 'updated' (auto-apply) rows.
    assert_eq!(h.db.outbox().count_pending().await.unwrap(), 2);

    h.reconciler
        .update_advance_payment(&payment.id, correction(400))
        .await
        .unwrap();
    assert_eq!(h.db.outbox().count_pending().await.unwrap(), 3);

    let pending = h.db.outbox().get_pending(10).await.unwrap();
    assert_eq!(pending[0].action, "created");
    assert!(pending.iter().all(|e| e.customer_id == cust));
}

#[tokio::test]
async fn outbox_processor_replays_onto_the_bus() {
    let h = setup().await;
    let cust = customer(&h, "Redstone Industries").await;

    h.reconciler
        .record_advance_payment(record_input(&cust, 650))
        .await
        .unwrap();

    // Subscribe only now: the live broadcast was missed, the outbox was not.
    let mut rx = h.bus.subscribe();
    let (processor, _handle) = OutboxProcessor::new(h.db.clone(), h.bus.clone());
    processor.process_batch().await.unwrap();

    let replayed = rx.recv().await.unwrap();
    assert_eq!(replayed.action, PaymentAction::Created);
    assert_eq!(replayed.customer_id, cust);

    assert_eq!(h.db.outbox().count_pending().await.unwrap(), 0);
}

// =============================================================================
// Optimistic Concurrency
// =============================================================================

#[tokio::test]
async fn stale_billing_snapshot_aborts_the_whole_plan() {
    let h = setup().await;
    let cust = customer(&h, "Silverline Holdings").await;
    billing(&h, &cust, "INV-090", 500).await;

    let (payment, _) = h
        .reconciler
        .record_advance_payment(record_input(&cust, 100))
        .await
        .unwrap();

    // Build a plan against the current snapshot, then move the billing
    // out from under it.
    let fresh = h.db.payments().require(&payment.id).await.unwrap();
    let open = h.db.billings().list_open_for_customer(&cust).await.unwrap();
    let plan = meridian_core::plan_auto_apply(&fresh, &open);
    assert!(!plan.is_empty());

    sqlx::query("UPDATE billings SET amount_paid_cents = amount_paid_cents + 1 WHERE id = ?1")
        .bind(&open[0].id)
        .execute(h.db.pool())
        .await
        .unwrap();

    let err = h
        .db
        .payments()
        .apply_plan(&fresh, &plan)
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Conflict { .. }));

    // Nothing from the aborted plan leaked into the ledger.
    let outbox_before = h.db.outbox().count_pending().await.unwrap();
    let allocations = h.db.payments().allocations(&payment.id).await.unwrap();
    // The recorded payment's own auto-apply already made one allocation.
    assert_eq!(allocations.len(), 1);
    assert_eq!(outbox_before, 2);
}

#[tokio::test]
async fn concurrent_edit_of_payment_amount_conflicts() {
    let h = setup().await;
    let cust = customer(&h, "Meridian Partners").await;
    billing(&h, &cust, "INV-100", 100).await;

    let (payment, _) = h
        .reconciler
        .record_advance_payment(record_input(&cust, 200))
        .await
        .unwrap();

    // First editor wins.
    h.reconciler
        .update_advance_payment(&payment.id, correction(150))
        .await
        .unwrap();

    // A repair plan built against the stale 200-cent snapshot must lose.
    let stale = payment.clone();
    let pairs = h
        .db
        .payments()
        .allocations_with_billings(&payment.id)
        .await
        .unwrap();
    let plan = meridian_core::plan_repair(&stale, Money::from_cents(180), &pairs).unwrap();
    let update = meridian_db::PaymentUpdate {
        amount_cents: 180,
        payment_date: Utc::now(),
        method: PaymentMethod::BankTransfer,
        payment_reference: None,
        notes: None,
    };

    let err = h
        .db
        .payments()
        .apply_repair(&stale, &update, &plan)
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Conflict { .. }));
}
