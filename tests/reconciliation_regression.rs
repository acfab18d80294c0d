mod common;

use chrono::Utc;
use tempfile::TempDir;

use common::{project, seed_parties, sent_invoice, task};
use marketfs::{
    config::{Config, RetryConfig},
    entities::{InvoiceStatus, InvoicingMethod, PaymentDetails, ProjectStatus, TaskStatus},
    error::StoreError,
    money::Money,
    reconciliation::{MarkPaidOutcome, ReconciliationService},
    store::StorageClient,
    wallet::TransactionKind,
};

fn setup(tmp: &TempDir) -> (Config, StorageClient) {
    let config = common::test_config(tmp);
    let storage = StorageClient::open(&config).unwrap();
    seed_parties(&storage);
    (config, storage)
}

#[test]
fn completion_invoicing_scenario_divides_the_post_upfront_pool() {
    let tmp = TempDir::new().unwrap();
    let (config, storage) = setup(&tmp);
    let service = ReconciliationService::new(&storage, &config);

    // P-100: completion method, 5000 budget, 600 upfront, one approved task.
    storage
        .projects
        .create(&project("P-100", InvoicingMethod::Completion))
        .unwrap();
    storage
        .tasks
        .create(&task("T1", "P-100", TaskStatus::Approved))
        .unwrap();

    let invoice = service.generate_invoice("P-100").unwrap();
    // (5000 - 600) / 1 unbilled task.
    assert_eq!(invoice.total_amount, Money::from_units(4_400));
    assert_eq!(invoice.status, InvoiceStatus::Draft);
    assert_eq!(invoice.milestones.len(), 1);
    assert_eq!(invoice.milestones[0].task_id.as_deref(), Some("T1"));

    service.send_invoice(&invoice.id).unwrap();
    let outcome = service.mark_invoice_paid(&invoice.id).unwrap();
    let summary = match outcome {
        MarkPaidOutcome::Paid(summary) => summary,
        MarkPaidOutcome::AlreadyPaid(_) => panic!("first settlement must be Paid"),
    };

    // Wallet credited with totalAmount x 0.95, paidToDate advanced.
    assert_eq!(summary.freelancer_amount, Money::from_units(4_180));
    assert_eq!(summary.platform_fee, Money::from_units(220));
    assert_eq!(summary.new_paid_to_date, Money::from_units(4_400));

    let credit = storage.wallet.find_credit(&summary.invoice_number).unwrap().unwrap();
    assert_eq!(credit.kind, TransactionKind::Credit);
    assert_eq!(credit.amount, Money::from_units(4_180));
    assert_eq!(credit.user_id, "u-free");

    let paid = storage.projects.read("P-100").unwrap().unwrap();
    assert_eq!(paid.paid_to_date, Money::from_units(4_400));
    assert_eq!(paid.remaining_budget(), Money::from_units(600));
}

#[test]
fn marking_paid_twice_credits_the_wallet_once() {
    let tmp = TempDir::new().unwrap();
    let (config, storage) = setup(&tmp);
    let service = ReconciliationService::new(&storage, &config);

    storage
        .projects
        .create(&project("P-1", InvoicingMethod::Completion))
        .unwrap();
    storage
        .tasks
        .create(&task("T-1", "P-1", TaskStatus::Approved))
        .unwrap();
    storage
        .invoices
        .create(&sent_invoice("INV-1", "P-1", Money::from_cents(174_833), "T-1"))
        .unwrap();

    let first = service.mark_invoice_paid("INV-1").unwrap();
    let second = service.mark_invoice_paid("INV-1").unwrap();

    assert!(matches!(first, MarkPaidOutcome::Paid(_)));
    assert!(matches!(second, MarkPaidOutcome::AlreadyPaid(_)));
    assert_eq!(first.summary(), second.summary());

    // Exactly one credit on the ledger, equal to the freelancer amount.
    let credits: Vec<_> = storage
        .wallet
        .list(Some("u-free"))
        .unwrap()
        .into_iter()
        .filter(|tx| tx.kind == TransactionKind::Credit)
        .collect();
    assert_eq!(credits.len(), 1);
    assert_eq!(credits[0].amount, Money::from_cents(166_091));

    // paidToDate advanced exactly once.
    let project = storage.projects.read("P-1").unwrap().unwrap();
    assert_eq!(project.paid_to_date, Money::from_cents(174_833));
}

#[test]
fn rerun_after_a_crash_mid_settlement_resumes_the_project_totals() {
    let tmp = TempDir::new().unwrap();
    let (config, storage) = setup(&tmp);
    let service = ReconciliationService::new(&storage, &config);

    storage
        .projects
        .create(&project("P-1", InvoicingMethod::Completion))
        .unwrap();
    storage
        .invoices
        .create(&sent_invoice("INV-1", "P-1", Money::from_units(1_000), "T-1"))
        .unwrap();

    // First two settlement steps already durable, as after a crash between
    // the wallet credit and the project update.
    storage
        .invoices
        .update("INV-1", |invoice| {
            invoice.status = InvoiceStatus::Paid;
            invoice.payment_details = Some(PaymentDetails {
                platform_fee: Money::from_units(50),
                freelancer_amount: Money::from_units(950),
            });
            Ok(())
        })
        .unwrap();
    storage
        .wallet
        .credit_once("u-free", Money::from_units(950), "P-1", "INV-1", Utc::now())
        .unwrap();

    let outcome = service.mark_invoice_paid("INV-1").unwrap();
    assert_eq!(
        outcome.summary().new_paid_to_date,
        Money::from_units(1_000),
        "resumed run must advance the totals"
    );

    let resumed = storage.projects.read("P-1").unwrap().unwrap();
    assert_eq!(resumed.paid_to_date, Money::from_units(1_000));

    // The resume did not double-credit the wallet.
    assert_eq!(storage.wallet.list(Some("u-free")).unwrap().len(), 1);
}

#[test]
fn freelance_settlement_without_a_project_moves_nothing() {
    let tmp = TempDir::new().unwrap();
    let (config, storage) = setup(&tmp);
    let service = ReconciliationService::new(&storage, &config);

    storage
        .invoices
        .create(&sent_invoice("INV-1", "P-gone", Money::from_units(100), "T-1"))
        .unwrap();

    let err = service.mark_invoice_paid("INV-1").unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)), "got {err}");

    let invoice = storage.invoices.read("INV-1").unwrap().unwrap();
    assert_eq!(
        invoice.status,
        InvoiceStatus::Sent,
        "a failed settlement must not advance the invoice"
    );
    assert!(invoice.payment_details.is_none());
    assert!(storage.wallet.find_credit("INV-1").unwrap().is_none());
}

#[test]
fn transient_failures_retry_then_report_exhaustion() {
    let tmp = TempDir::new().unwrap();
    let mut config = common::test_config(&tmp);
    config.retry = RetryConfig {
        max_attempts: 3,
        base_delay_ms: 1,
        backoff_multiplier: 2,
        max_delay_ms: 5,
    };
    let storage = StorageClient::open(&config).unwrap();
    let service = ReconciliationService::new(&storage, &config);

    storage
        .projects
        .create(&project("P-1", InvoicingMethod::Completion))
        .unwrap();
    storage
        .tasks
        .create(&task("T-1", "P-1", TaskStatus::Approved))
        .unwrap();

    // A file where the invoices partition tree should be makes every
    // invoice scan fail with an io error.
    std::fs::write(config.data_dir.join("invoices"), b"not a directory").unwrap();

    let err = service.generate_invoice_with_retry("P-1").unwrap_err();
    match err {
        StoreError::RetryExhausted { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("expected RetryExhausted, got {other}"),
    }
}

#[test]
fn fee_split_reconciles_exactly_for_both_schedules() {
    let tmp = TempDir::new().unwrap();
    let (config, storage) = setup(&tmp);
    let service = ReconciliationService::new(&storage, &config);

    storage
        .projects
        .create(&project("P-1", InvoicingMethod::Completion))
        .unwrap();
    storage
        .invoices
        .create(&sent_invoice("INV-1", "P-1", Money::from_cents(174_833), "T-1"))
        .unwrap();

    let outcome = service.mark_invoice_paid("INV-1").unwrap();
    let summary = outcome.summary();
    assert_eq!(summary.platform_fee, Money::from_cents(8_742));
    assert_eq!(summary.freelancer_amount, Money::from_cents(166_091));
    assert_eq!(
        summary.platform_fee + summary.freelancer_amount,
        Money::from_cents(174_833)
    );

    // Storefront schedule: 30% of the sale, settled outside a project.
    let mut sale = sent_invoice("SALE-1", "G-shop", Money::from_cents(174_833), "unused");
    sale.fee_schedule = marketfs::money::FeeSchedule::Storefront;
    sale.milestones.clear();
    storage.invoices.create(&sale).unwrap();

    let sale_outcome = service.mark_invoice_paid("SALE-1").unwrap();
    let sale_summary = sale_outcome.summary();
    assert_eq!(sale_summary.platform_fee, Money::from_cents(52_450));
    assert_eq!(
        sale_summary.platform_fee + sale_summary.freelancer_amount,
        Money::from_cents(174_833)
    );
}

#[test]
fn send_rejects_double_billing_a_task() {
    let tmp = TempDir::new().unwrap();
    let (config, storage) = setup(&tmp);
    let service = ReconciliationService::new(&storage, &config);

    storage
        .projects
        .create(&project("P-1", InvoicingMethod::Completion))
        .unwrap();
    storage
        .invoices
        .create(&sent_invoice("INV-1", "P-1", Money::from_units(100), "T-1"))
        .unwrap();

    let mut draft = sent_invoice("INV-2", "P-1", Money::from_units(100), "T-1");
    draft.status = InvoiceStatus::Draft;
    storage.invoices.create(&draft).unwrap();

    let err = service.send_invoice("INV-2").unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)), "got {err}");
    assert_eq!(
        storage.invoices.read("INV-2").unwrap().unwrap().status,
        InvoiceStatus::Draft,
        "failed transition must leave the draft untouched"
    );
}

#[test]
fn discarded_drafts_never_move_again() {
    let tmp = TempDir::new().unwrap();
    let (config, storage) = setup(&tmp);
    let service = ReconciliationService::new(&storage, &config);

    storage
        .projects
        .create(&project("P-1", InvoicingMethod::Completion))
        .unwrap();
    let mut draft = sent_invoice("INV-1", "P-1", Money::from_units(100), "T-1");
    draft.status = InvoiceStatus::Draft;
    storage.invoices.create(&draft).unwrap();

    service.discard_draft("INV-1").unwrap();
    assert!(service.send_invoice("INV-1").is_err());
    assert!(service.mark_invoice_paid("INV-1").is_err());
}

#[test]
fn generation_with_no_eligible_tasks_fails_without_retry() {
    let tmp = TempDir::new().unwrap();
    let (config, storage) = setup(&tmp);
    let service = ReconciliationService::new(&storage, &config);

    storage
        .projects
        .create(&project("P-1", InvoicingMethod::Completion))
        .unwrap();
    storage
        .tasks
        .create(&task("T-1", "P-1", TaskStatus::Ongoing))
        .unwrap();

    // Validation failures are not retried, so this returns immediately
    // with the validation error, not RetryExhausted.
    let err = service.generate_invoice_with_retry("P-1").unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)), "got {err}");
    assert!(storage.invoices.list_all().unwrap().is_empty());
}

#[test]
fn milestone_invoicing_divides_the_budget_across_all_tasks() {
    let tmp = TempDir::new().unwrap();
    let (config, storage) = setup(&tmp);
    let service = ReconciliationService::new(&storage, &config);

    storage
        .projects
        .create(&project("P-1", InvoicingMethod::Milestone))
        .unwrap();
    storage
        .tasks
        .create(&task("T-1", "P-1", TaskStatus::Approved))
        .unwrap();
    storage
        .tasks
        .create(&task("T-2", "P-1", TaskStatus::Approved))
        .unwrap();
    storage
        .tasks
        .create(&task("T-3", "P-1", TaskStatus::Ongoing))
        .unwrap();

    let invoice = service.generate_invoice("P-1").unwrap();
    // 5000 / 3 tasks = 1666.66 per task, two approved tasks billed.
    assert_eq!(invoice.milestones.len(), 2);
    assert_eq!(invoice.milestones[0].amount, Money::from_cents(166_666));
    assert_eq!(invoice.total_amount, Money::from_cents(333_332));
}

#[test]
fn project_completes_exactly_when_all_tasks_are_approved() {
    let tmp = TempDir::new().unwrap();
    let (config, storage) = setup(&tmp);
    let service = ReconciliationService::new(&storage, &config);

    storage
        .projects
        .create(&project("P-1", InvoicingMethod::Milestone))
        .unwrap();
    storage
        .tasks
        .create(&task("T-1", "P-1", TaskStatus::Approved))
        .unwrap();
    storage
        .tasks
        .create(&task("T-2", "P-1", TaskStatus::InReview))
        .unwrap();

    let still_ongoing = service.refresh_project_status("P-1").unwrap();
    assert_eq!(still_ongoing.status, ProjectStatus::Ongoing);

    storage
        .tasks
        .update("T-2", |t| {
            t.status = TaskStatus::Approved;
            t.completed = true;
            Ok(())
        })
        .unwrap();

    let completed = service.refresh_project_status("P-1").unwrap();
    assert_eq!(completed.status, ProjectStatus::Completed);
}
