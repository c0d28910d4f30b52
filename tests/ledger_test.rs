use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use ozziework_core::error::EngineError;
use ozziework_core::model::{EntryInput, OfferPatch, OfferStatus, OfferTerms, RateType};
use ozziework_core::{offers, timesheets};

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::from_str(s).unwrap()
}

async fn setup_pool() -> sqlx::SqlitePool {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

async fn seed_engagement(pool: &sqlx::SqlitePool) {
    sqlx::query(
        "INSERT INTO parties (display_name, bank_name, bank_bsb, bank_account) \
         VALUES ('Mango Farms Pty Ltd', 'NAB', '083-001', '11223344')",
    )
    .execute(pool)
    .await
    .unwrap();
    sqlx::query("INSERT INTO employers (party_id) VALUES (1)")
        .execute(pool)
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO parties (display_name, bank_name, bank_bsb, bank_account) \
         VALUES ('Sam Picker', 'CBA', '062-000', '12345678')",
    )
    .execute(pool)
    .await
    .unwrap();
    sqlx::query("INSERT INTO applications (job_id, employer_id, worker_id) VALUES (7, 1, 2)")
        .execute(pool)
        .await
        .unwrap();
}

const EMPLOYER: i64 = 1;
const WORKER: i64 = 2;

fn entry(d: &str, hours: &str, notes: &str) -> EntryInput {
    EntryInput {
        entry_date: date(d),
        hours_worked: dec(hours),
        notes: notes.into(),
    }
}

async fn accepted_offer(pool: &sqlx::SqlitePool) -> i64 {
    let terms = OfferTerms {
        start_date: date("2024-01-01"),
        end_date: None,
        rate_type: RateType::Hourly,
        rate_amount: dec("20.00"),
        rate_currency: "AUD".into(),
        accommodation_details: "".into(),
        notes: "".into(),
    };
    let offer_id = offers::create_offer(pool, 1, EMPLOYER, &terms).await.unwrap();
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
    offer_id
}

async fn timesheet_status(pool: &sqlx::SqlitePool, offer_id: i64) -> String {
    sqlx::query_scalar("SELECT status FROM timesheets WHERE offer_id = ?")
        .bind(offer_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn locked_entries_are_immutable() {
    let pool = setup_pool().await;
    seed_engagement(&pool).await;
    let offer_id = accepted_offer(&pool).await;

    timesheets::replace_entries(
        &pool,
        offer_id,
        WORKER,
        &[entry("2024-01-01", "8", "picking")],
        None,
    )
    .await
    .unwrap();
    timesheets::submit(&pool, offer_id, WORKER).await.unwrap();
    timesheets::approve(&pool, offer_id, EMPLOYER, None)
        .await
        .unwrap();
    assert_eq!(timesheet_status(&pool, offer_id).await, "approved");

    // Differing hours for a locked date fail the whole call.
    let err = timesheets::replace_entries(
        &pool,
        offer_id,
        WORKER,
        &[entry("2024-01-01", "9", "picking")],
        None,
    )
    .await
    .unwrap_err();
    match err {
        EngineError::Validation(msg) => assert!(msg.contains("already been approved")),
        other => panic!("expected validation, got {other:?}"),
    }
    let hours: String =
        sqlx::query_scalar("SELECT hours_worked FROM timesheet_entries WHERE entry_date = '2024-01-01'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(hours, "8");

    // A matching payload is a no-op and leaves the approval standing.
    timesheets::replace_entries(
        &pool,
        offer_id,
        WORKER,
        &[entry("2024-01-01", "8", "picking")],
        None,
    )
    .await
    .unwrap();
    assert_eq!(timesheet_status(&pool, offer_id).await, "approved");

    // Omitting the locked date from the payload does not delete it.
    timesheets::replace_entries(&pool, offer_id, WORKER, &[], None)
        .await
        .unwrap();
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM timesheet_entries")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn new_entries_reset_approval_to_draft() {
    let pool = setup_pool().await;
    seed_engagement(&pool).await;
    let offer_id = accepted_offer(&pool).await;

    timesheets::replace_entries(&pool, offer_id, WORKER, &[entry("2024-01-01", "8", "")], None)
        .await
        .unwrap();
    timesheets::submit(&pool, offer_id, WORKER).await.unwrap();
    timesheets::approve(&pool, offer_id, EMPLOYER, None)
        .await
        .unwrap();

    timesheets::replace_entries(
        &pool,
        offer_id,
        WORKER,
        &[entry("2024-01-01", "8", ""), entry("2024-01-02", "6", "")],
        None,
    )
    .await
    .unwrap();
    assert_eq!(timesheet_status(&pool, offer_id).await, "draft");

    let (submitted_at, approved_at): (Option<String>, Option<String>) =
        sqlx::query_as("SELECT submitted_at, approved_at FROM timesheets WHERE offer_id = ?")
            .bind(offer_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert!(submitted_at.is_none());
    assert!(approved_at.is_none());

    // The locked day survived untouched, the new day is unlocked.
    let rows: Vec<(String, bool)> = sqlx::query_as(
        "SELECT entry_date, is_locked FROM timesheet_entries ORDER BY entry_date",
    )
    .fetch_all(&pool)
    .await
    .unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows[0].1);
    assert!(!rows[1].1);
}

#[tokio::test]
async fn unlocked_rows_follow_replace_semantics() {
    let pool = setup_pool().await;
    seed_engagement(&pool).await;
    let offer_id = accepted_offer(&pool).await;

    timesheets::replace_entries(
        &pool,
        offer_id,
        WORKER,
        &[entry("2024-01-01", "8", ""), entry("2024-01-02", "6", "")],
        None,
    )
    .await
    .unwrap();

    // Update one, drop the other, add a third.
    timesheets::replace_entries(
        &pool,
        offer_id,
        WORKER,
        &[entry("2024-01-01", "7.5", "short day"), entry("2024-01-03", "9", "")],
        None,
    )
    .await
    .unwrap();

    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT entry_date, hours_worked FROM timesheet_entries ORDER BY entry_date",
    )
    .fetch_all(&pool)
    .await
    .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].0, "2024-01-01");
    assert_eq!(rows[0].1, "7.5");
    assert_eq!(rows[1].0, "2024-01-03");
}

#[tokio::test]
async fn input_validation_rejects_bad_entries() {
    let pool = setup_pool().await;
    seed_engagement(&pool).await;
    let offer_id = accepted_offer(&pool).await;

    let err =
        timesheets::replace_entries(&pool, offer_id, WORKER, &[entry("2024-01-01", "0", "")], None)
            .await
            .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let err = timesheets::replace_entries(
        &pool,
        offer_id,
        WORKER,
        &[entry("2024-01-01", "4", ""), entry("2024-01-01", "5", "")],
        None,
    )
    .await
    .unwrap_err();
    match err {
        EngineError::Validation(msg) => assert!(msg.contains("Duplicate entry")),
        other => panic!("expected validation, got {other:?}"),
    }
}

#[tokio::test]
async fn actor_and_state_guards() {
    let pool = setup_pool().await;
    seed_engagement(&pool).await;

    // No accepted offer yet: the ledger is unreachable.
    let terms = OfferTerms {
        start_date: date("2024-01-01"),
        end_date: None,
        rate_type: RateType::Hourly,
        rate_amount: dec("20.00"),
        rate_currency: "AUD".into(),
        accommodation_details: "".into(),
        notes: "".into(),
    };
    let offer_id = offers::create_offer(&pool, 1, EMPLOYER, &terms).await.unwrap();
    let err =
        timesheets::replace_entries(&pool, offer_id, WORKER, &[entry("2024-01-01", "8", "")], None)
            .await
            .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));

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

    // Only the worker edits and submits.
    let err =
        timesheets::replace_entries(&pool, offer_id, EMPLOYER, &[entry("2024-01-01", "8", "")], None)
            .await
            .unwrap_err();
    assert!(matches!(err, EngineError::Permission(_)));
    let err = timesheets::submit(&pool, offer_id, EMPLOYER).await.unwrap_err();
    assert!(matches!(err, EngineError::Permission(_)));

    // Submitting an empty ledger is rejected.
    let err = timesheets::submit(&pool, offer_id, WORKER).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    timesheets::replace_entries(&pool, offer_id, WORKER, &[entry("2024-01-01", "8", "")], None)
        .await
        .unwrap();

    // Only submitted timesheets can be approved, and only by the employer.
    let err = timesheets::approve(&pool, offer_id, WORKER, None).await.unwrap_err();
    assert!(matches!(err, EngineError::Permission(_)));
    let err = timesheets::approve(&pool, offer_id, EMPLOYER, None).await.unwrap_err();
    match err {
        EngineError::Conflict(msg) => assert!(msg.contains("Only submitted")),
        other => panic!("expected conflict, got {other:?}"),
    }

    // Strangers are rejected before any state is touched.
    let err = timesheets::submit(&pool, offer_id, 99).await.unwrap_err();
    assert!(matches!(err, EngineError::Permission(_)));
}
