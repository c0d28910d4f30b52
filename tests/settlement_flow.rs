use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::Value;
use tokio::sync::Mutex;

use ozziework_core::error::EngineError;
use ozziework_core::model::{EntryInput, OfferPatch, OfferStatus, OfferTerms, RateType};
use ozziework_core::notify::NotifyService;
use ozziework_core::outbox::process_next_task;
use ozziework_core::{config, db, offers, settlement, timesheets};

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::from_str(s).unwrap()
}

fn test_config(data_dir: &std::path::Path) -> config::Config {
    let mut cfg: config::Config = serde_yaml::from_str(config::example()).unwrap();
    cfg.app.data_dir = data_dir.to_string_lossy().to_string();
    cfg
}

async fn setup_pool() -> sqlx::SqlitePool {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

/// Seeds one employer (party 1, employer 1), one worker (party 2) and one
/// application (id 1) for job 7.
async fn seed_engagement(pool: &sqlx::SqlitePool) {
    sqlx::query(
        "INSERT INTO parties (display_name, address, tax_id, bank_name, bank_bsb, bank_account) \
         VALUES ('Mango Farms Pty Ltd', '12 Orchard Rd, Mareeba QLD, 4880', '51824753556', \
                 'NAB', '083-001', '11223344')",
    )
    .execute(pool)
    .await
    .unwrap();
    sqlx::query("INSERT INTO employers (party_id) VALUES (1)")
        .execute(pool)
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO parties (display_name, address, tax_id, bank_name, bank_bsb, bank_account) \
         VALUES ('Sam Picker', '5 Hostel Ln, Cairns QLD, 4870', '123456782', \
                 'CBA', '062-000', '12345678')",
    )
    .execute(pool)
    .await
    .unwrap();
    sqlx::query("INSERT INTO applications (job_id, employer_id, worker_id) VALUES (7, 1, 2)")
        .execute(pool)
        .await
        .unwrap();
}

const EMPLOYER: i64 = 1; // party id of the employer
const WORKER: i64 = 2;

fn hourly_terms() -> OfferTerms {
    OfferTerms {
        start_date: date("2024-01-01"),
        end_date: None,
        rate_type: RateType::Hourly,
        rate_amount: dec("20.00"),
        rate_currency: "AUD".into(),
        accommodation_details: "".into(),
        notes: "".into(),
    }
}

/// Runs offer -> accept -> log 10h + 10h -> submit -> approve, returning the
/// offer id.
async fn engage_and_approve(pool: &sqlx::SqlitePool) -> i64 {
    let offer_id = offers::create_offer(pool, 1, EMPLOYER, &hourly_terms())
        .await
        .unwrap();
    offers::update_offer(
        pool,
        offer_id,
        WORKER,
        &OfferPatch {
            status: Some(OfferStatus::Accepted),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let entries = vec![
        EntryInput {
            entry_date: date("2024-01-01"),
            hours_worked: dec("10"),
            notes: "picking".into(),
        },
        EntryInput {
            entry_date: date("2024-01-02"),
            hours_worked: dec("10"),
            notes: "".into(),
        },
    ];
    timesheets::replace_entries(pool, offer_id, WORKER, &entries, None)
        .await
        .unwrap();
    timesheets::submit(pool, offer_id, WORKER).await.unwrap();
    timesheets::approve(pool, offer_id, EMPLOYER, Some("good work"))
        .await
        .unwrap();
    offer_id
}

#[derive(Clone, Default)]
struct RecordingNotify {
    events: Arc<Mutex<Vec<Value>>>,
}

impl RecordingNotify {
    async fn events(&self) -> Vec<Value> {
        self.events.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl NotifyService for RecordingNotify {
    async fn deliver(&self, event: &Value) -> Result<()> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

#[tokio::test]
async fn offer_lifecycle_mirrors_application_status() {
    let pool = setup_pool().await;
    seed_engagement(&pool).await;

    let offer_id = offers::create_offer(&pool, 1, EMPLOYER, &hourly_terms())
        .await
        .unwrap();
    let status: String = sqlx::query_scalar("SELECT status FROM applications WHERE id = 1")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(status, "offer_sent");

    // A second offer for the same application is rejected.
    let err = offers::create_offer(&pool, 1, EMPLOYER, &hourly_terms())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));

    offers::update_offer(
        &pool,
        offer_id,
        WORKER,
        &OfferPatch {
            status: Some(OfferStatus::Accepted),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    let status: String = sqlx::query_scalar("SELECT status FROM applications WHERE id = 1")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(status, "offer_accepted");

    // Acceptance instantiated exactly one timesheet.
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM timesheets WHERE offer_id = ?")
        .bind(offer_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);

    // The worker cannot re-decline an accepted offer.
    let err = offers::update_offer(
        &pool,
        offer_id,
        WORKER,
        &OfferPatch {
            status: Some(OfferStatus::Declined),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));
}

#[tokio::test]
async fn settle_computes_breakdown_and_marks_entries_paid() {
    let pool = setup_pool().await;
    seed_engagement(&pool).await;
    let td = tempfile::tempdir().unwrap();
    let cfg = test_config(td.path());

    let offer_id = engage_and_approve(&pool).await;
    let payslip_id = settlement::settle(&pool, &cfg, offer_id, EMPLOYER)
        .await
        .unwrap();

    let row = sqlx::query(
        "SELECT hour_count, gross_amount, commission_amount, net_before_tax, tax_withheld, \
                net_payment, super_amount, pay_period_start, pay_period_end, \
                instructions_status, status, worker_name, employer_name, instructions_metadata \
         FROM payslips WHERE id = ?",
    )
    .bind(payslip_id)
    .fetch_one(&pool)
    .await
    .unwrap();

    use sqlx::Row as _;
    assert_eq!(row.get::<String, _>("hour_count"), "20");
    assert_eq!(row.get::<String, _>("gross_amount"), "400.00");
    assert_eq!(row.get::<String, _>("commission_amount"), "4.00");
    assert_eq!(row.get::<String, _>("net_before_tax"), "396.00");
    assert_eq!(row.get::<String, _>("tax_withheld"), "59.40");
    assert_eq!(row.get::<String, _>("net_payment"), "336.60");
    assert_eq!(row.get::<String, _>("super_amount"), "44.00");
    assert_eq!(row.get::<NaiveDate, _>("pay_period_start"), date("2024-01-01"));
    assert_eq!(row.get::<NaiveDate, _>("pay_period_end"), date("2024-01-02"));
    assert_eq!(
        row.get::<String, _>("instructions_status"),
        "instructions_generated"
    );
    assert_eq!(row.get::<String, _>("status"), "processing");
    assert_eq!(row.get::<String, _>("worker_name"), "Sam Picker");
    assert_eq!(row.get::<String, _>("employer_name"), "Mango Farms Pty Ltd");
    let metadata: String = row.get("instructions_metadata");
    assert!(metadata.contains("NET PAYMENT"));
    assert!(metadata.contains("336.60"));

    // Every settled entry is paid and carries the instruction state.
    let rows: Vec<(bool, String)> = sqlx::query_as(
        "SELECT is_paid, payment_status FROM timesheet_entries ORDER BY entry_date",
    )
    .fetch_all(&pool)
    .await
    .unwrap();
    assert_eq!(rows.len(), 2);
    for (is_paid, payment_status) in rows {
        assert!(is_paid);
        assert_eq!(payment_status, "instructions_generated");
    }

    // Both artifacts landed in the document store: snapshot for the worker,
    // instruction file for the employer.
    let docs: Vec<(i64, String, String, i64)> = sqlx::query_as(
        "SELECT owner_id, category, path, size_bytes FROM documents ORDER BY id",
    )
    .fetch_all(&pool)
    .await
    .unwrap();
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0].0, WORKER);
    assert_eq!(docs[0].1, "payslip_snapshot");
    assert_eq!(docs[1].0, EMPLOYER);
    assert_eq!(docs[1].1, "payment_instructions");
    for (_, _, path, size_bytes) in &docs {
        let on_disk = std::fs::read(td.path().join(path)).unwrap();
        assert_eq!(on_disk.len() as i64, *size_bytes);
    }
}

#[tokio::test]
async fn settle_is_idempotent_without_new_hours() {
    let pool = setup_pool().await;
    seed_engagement(&pool).await;
    let td = tempfile::tempdir().unwrap();
    let cfg = test_config(td.path());

    let offer_id = engage_and_approve(&pool).await;
    settlement::settle(&pool, &cfg, offer_id, EMPLOYER)
        .await
        .unwrap();

    let err = settlement::settle(&pool, &cfg, offer_id, EMPLOYER)
        .await
        .unwrap_err();
    match err {
        EngineError::Conflict(msg) => assert!(msg.contains("No approved unpaid hours")),
        other => panic!("expected conflict, got {other:?}"),
    }

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM payslips")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn settle_requires_bank_details() {
    let pool = setup_pool().await;
    seed_engagement(&pool).await;
    let td = tempfile::tempdir().unwrap();
    let cfg = test_config(td.path());

    sqlx::query("UPDATE parties SET bank_bsb = '', bank_account = '' WHERE id = 2")
        .execute(&pool)
        .await
        .unwrap();

    let offer_id = engage_and_approve(&pool).await;
    let err = settlement::settle(&pool, &cfg, offer_id, EMPLOYER)
        .await
        .unwrap_err();
    match err {
        EngineError::Validation(msg) => {
            assert!(msg.contains("Worker missing bank details"));
        }
        other => panic!("expected validation, got {other:?}"),
    }

    // Nothing was persisted: no payslip, entries still unpaid and claimable.
    let payslips: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM payslips")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(payslips, 0);
    let unpaid: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM timesheet_entries WHERE is_paid = 0 AND is_locked = 1",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(unpaid, 2);
}

#[tokio::test]
async fn confirmation_completes_payslip_and_entries() {
    let pool = setup_pool().await;
    seed_engagement(&pool).await;
    let td = tempfile::tempdir().unwrap();
    let cfg = test_config(td.path());

    let offer_id = engage_and_approve(&pool).await;
    let payslip_id = settlement::settle(&pool, &cfg, offer_id, EMPLOYER)
        .await
        .unwrap();

    // Only the employer may confirm.
    let err = settlement::confirm_instructions(&pool, offer_id, WORKER)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Permission(_)));

    let confirmed = settlement::confirm_instructions(&pool, offer_id, EMPLOYER)
        .await
        .unwrap();
    assert_eq!(confirmed, payslip_id);

    let (instructions_status, status): (String, String) =
        sqlx::query_as("SELECT instructions_status, status FROM payslips WHERE id = ?")
            .bind(payslip_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(instructions_status, "completed");
    assert_eq!(status, "completed");

    let paid: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM timesheet_entries WHERE payment_status = 'paid'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(paid, 2);

    let last_paid_at: Option<String> =
        sqlx::query_scalar("SELECT last_paid_at FROM applications WHERE id = 1")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert!(last_paid_at.is_some());

    // Re-confirming finds nothing outstanding.
    let err = settlement::confirm_instructions(&pool, offer_id, EMPLOYER)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));
}

#[tokio::test]
async fn outbox_delivers_structured_events() {
    let pool = setup_pool().await;
    seed_engagement(&pool).await;
    let td = tempfile::tempdir().unwrap();
    let cfg = test_config(td.path());

    let offer_id = engage_and_approve(&pool).await;
    settlement::settle(&pool, &cfg, offer_id, EMPLOYER)
        .await
        .unwrap();
    settlement::confirm_instructions(&pool, offer_id, EMPLOYER)
        .await
        .unwrap();

    let notify = RecordingNotify::default();
    while process_next_task(&pool, &notify, 60).await.unwrap() {}

    let remaining = db::count_remaining_outbox_tasks(&pool).await.unwrap();
    assert_eq!(remaining, 0);

    let events = notify.events().await;
    let kinds: Vec<String> = events
        .iter()
        .map(|e| {
            format!(
                "{}:{}",
                e["kind"].as_str().unwrap(),
                e["event"].as_str().unwrap()
            )
        })
        .collect();
    assert!(kinds.contains(&"job_offer:created".to_string()));
    assert!(kinds.contains(&"job_offer:accepted".to_string()));
    assert!(kinds.contains(&"timesheet:updated".to_string()));
    assert!(kinds.contains(&"timesheet:submitted".to_string()));
    assert!(kinds.contains(&"timesheet:approved".to_string()));
    assert!(kinds.contains(&"payslip:created".to_string()));
    assert!(kinds.contains(&"payslip:instructions_confirmed".to_string()));

    let payslip_event = events
        .iter()
        .find(|e| e["kind"] == "payslip" && e["event"] == "created")
        .unwrap();
    assert_eq!(payslip_event["net_payment"], "336.60");
    assert_eq!(payslip_event["gross_amount"], "400.00");
}

#[tokio::test]
async fn concurrent_settlements_produce_exactly_one_payslip() {
    let td = tempfile::tempdir().unwrap();
    let url = format!(
        "sqlite://{}?mode=rwc",
        td.path().join("engine.db").display()
    );
    let pool = db::init_pool(&url).await.unwrap();
    db::run_migrations(&pool).await.unwrap();
    seed_engagement(&pool).await;
    let cfg = test_config(td.path());

    let offer_id = engage_and_approve(&pool).await;

    let (first, second) = tokio::join!(
        settlement::settle(&pool, &cfg, offer_id, EMPLOYER),
        settlement::settle(&pool, &cfg, offer_id, EMPLOYER),
    );
    let successes = [&first, &second].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "first: {first:?}, second: {second:?}");

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM payslips")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}
