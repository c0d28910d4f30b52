use std::str::FromStr;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{Row, Transaction};
use sqlx::{Sqlite, SqlitePool};
use tracing::instrument;

use super::model::{
    ApplicationContext, ClaimedEntry, EntryRow, NewPayslip, OfferContext, OfferForNotify,
    OfferRow, OverduePayslip, Party, PayslipForNotify, PayslipRow, PayslipSummary,
    TimesheetForNotify, TimesheetRow,
};
use crate::error::{EngineError, EngineResult};
use crate::model::{
    ApplicationStatus, EntryPaymentStatus, InstructionsStatus, OfferStatus, OfferTerms,
    OutboxKind, PayslipStatus, RateType, TimesheetStatus,
};

pub type Pool = SqlitePool;
type OutboxItem = (i64, String, i64, String, i32);

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA foreign_keys=ON;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the parent
/// directory exists. Leaves in-memory URLs untouched. Returns possibly-updated URL.
fn prepare_sqlite_url(url: &str) -> String {
    // Pass through non-sqlite schemes
    if !url.starts_with("sqlite:") {
        return url.to_string();
    }

    // In-memory URLs like sqlite::memory: or sqlite::memory:?cache=shared
    if url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    // Strip prefix and optional //
    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);

    // Separate query string if any
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };

    if path_part.is_empty() {
        // nothing to normalize
        return url.to_string();
    }

    // Expand leading ~/ to HOME
    let expanded_path = if let Some(rest) = path_part.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            format!("{}/{}", home.trim_end_matches('/'), rest)
        } else {
            path_part.to_string()
        }
    } else {
        path_part.to_string()
    };

    // Ensure parent directory exists if any
    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    // Rebuild URL, prefer sqlite:// form
    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn parse_decimal(value: &str) -> EngineResult<Decimal> {
    Decimal::from_str(value).map_err(|e| EngineError::Decode(format!("decimal {value:?}: {e}")))
}

fn parse_offer_status(value: &str) -> EngineResult<OfferStatus> {
    OfferStatus::parse(value)
        .ok_or_else(|| EngineError::Decode(format!("unknown offer status {value:?}")))
}

fn parse_application_status(value: &str) -> EngineResult<ApplicationStatus> {
    ApplicationStatus::parse(value)
        .ok_or_else(|| EngineError::Decode(format!("unknown application status {value:?}")))
}

fn parse_timesheet_status(value: &str) -> EngineResult<TimesheetStatus> {
    TimesheetStatus::parse(value)
        .ok_or_else(|| EngineError::Decode(format!("unknown timesheet status {value:?}")))
}

fn parse_rate_type(value: &str) -> EngineResult<RateType> {
    RateType::parse(value).ok_or_else(|| EngineError::Decode(format!("unknown rate type {value:?}")))
}

fn parse_instructions_status(value: &str) -> EngineResult<InstructionsStatus> {
    InstructionsStatus::parse(value)
        .ok_or_else(|| EngineError::Decode(format!("unknown instructions status {value:?}")))
}

fn parse_payslip_status(value: &str) -> EngineResult<PayslipStatus> {
    PayslipStatus::parse(value)
        .ok_or_else(|| EngineError::Decode(format!("unknown payslip status {value:?}")))
}

fn parse_entry_payment_status(value: &str) -> EngineResult<EntryPaymentStatus> {
    EntryPaymentStatus::parse(value)
        .ok_or_else(|| EngineError::Decode(format!("unknown payment status {value:?}")))
}

#[instrument(skip_all)]
pub async fn fetch_party(pool: &Pool, party_id: i64) -> EngineResult<Party> {
    let row = sqlx::query(
        "SELECT id, display_name, address, tax_id, bank_name, bank_bsb, bank_account \
         FROM parties WHERE id = ?",
    )
    .bind(party_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Err(EngineError::NotFound(format!("party {party_id} not found")));
    };

    Ok(Party {
        id: row.get("id"),
        display_name: row.get("display_name"),
        address: row.get("address"),
        tax_id: row.get("tax_id"),
        bank_name: row.get("bank_name"),
        bank_bsb: row.get("bank_bsb"),
        bank_account: row.get("bank_account"),
    })
}

#[instrument(skip_all)]
pub async fn fetch_application_context(
    pool: &Pool,
    application_id: i64,
) -> EngineResult<Option<ApplicationContext>> {
    let row = sqlx::query(
        "SELECT a.id, a.job_id, a.employer_id, a.worker_id, a.status, \
                e.party_id AS employer_party_id, e.is_suspended AS employer_suspended \
         FROM applications a \
         JOIN employers e ON e.id = a.employer_id \
         WHERE a.id = ?",
    )
    .bind(application_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let status: String = row.get("status");
    Ok(Some(ApplicationContext {
        id: row.get("id"),
        job_id: row.get("job_id"),
        employer_id: row.get("employer_id"),
        employer_party_id: row.get("employer_party_id"),
        employer_suspended: row.get("employer_suspended"),
        worker_id: row.get("worker_id"),
        status: parse_application_status(&status)?,
    }))
}

fn map_offer_context(row: &sqlx::sqlite::SqliteRow) -> EngineResult<OfferContext> {
    let status: String = row.get("status");
    let application_status: String = row.get("application_status");
    let rate_amount: String = row.get("rate_amount");
    Ok(OfferContext {
        offer_id: row.get("id"),
        application_id: row.get("application_id"),
        job_id: row.get("job_id"),
        employer_id: row.get("employer_id"),
        employer_party_id: row.get("employer_party_id"),
        employer_suspended: row.get("employer_suspended"),
        worker_id: row.get("worker_id"),
        status: parse_offer_status(&status)?,
        rate_amount: parse_decimal(&rate_amount)?,
        rate_currency: row.get("rate_currency"),
        application_status: parse_application_status(&application_status)?,
    })
}

const OFFER_CONTEXT_SQL: &str =
    "SELECT o.id, o.application_id, o.job_id, o.employer_id, o.worker_id, o.status, \
            o.rate_amount, o.rate_currency, \
            e.party_id AS employer_party_id, e.is_suspended AS employer_suspended, \
            a.status AS application_status \
     FROM offers o \
     JOIN employers e ON e.id = o.employer_id \
     JOIN applications a ON a.id = o.application_id";

#[instrument(skip_all)]
pub async fn fetch_offer_context(pool: &Pool, offer_id: i64) -> EngineResult<Option<OfferContext>> {
    let row = sqlx::query(&format!("{OFFER_CONTEXT_SQL} WHERE o.id = ?"))
        .bind(offer_id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(map_offer_context).transpose()
}

pub async fn offer_exists_for_application_tx(
    tx: &mut Transaction<'_, Sqlite>,
    application_id: i64,
) -> EngineResult<bool> {
    let id: Option<i64> = sqlx::query_scalar("SELECT id FROM offers WHERE application_id = ?")
        .bind(application_id)
        .fetch_optional(&mut **tx)
        .await?;
    Ok(id.is_some())
}

/// A job may carry at most one pending or accepted offer at a time.
pub async fn job_has_active_offer_tx(
    tx: &mut Transaction<'_, Sqlite>,
    job_id: i64,
    exclude_application_id: i64,
) -> EngineResult<bool> {
    let id: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM offers \
         WHERE job_id = ? AND status IN ('pending', 'accepted') AND application_id != ? \
         LIMIT 1",
    )
    .bind(job_id)
    .bind(exclude_application_id)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(id.is_some())
}

pub async fn insert_offer_tx(
    tx: &mut Transaction<'_, Sqlite>,
    application_id: i64,
    job_id: i64,
    employer_id: i64,
    worker_id: i64,
    terms: &OfferTerms,
) -> EngineResult<i64> {
    let rec = sqlx::query(
        "INSERT INTO offers (application_id, job_id, employer_id, worker_id, start_date, \
                             end_date, rate_type, rate_amount, rate_currency, \
                             accommodation_details, notes, status) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending') RETURNING id",
    )
    .bind(application_id)
    .bind(job_id)
    .bind(employer_id)
    .bind(worker_id)
    .bind(terms.start_date)
    .bind(terms.end_date)
    .bind(terms.rate_type.as_str())
    .bind(terms.rate_amount.to_string())
    .bind(&terms.rate_currency)
    .bind(&terms.accommodation_details)
    .bind(&terms.notes)
    .fetch_one(&mut **tx)
    .await?;
    Ok(rec.get("id"))
}

pub async fn fetch_offer_row_tx(
    tx: &mut Transaction<'_, Sqlite>,
    offer_id: i64,
) -> EngineResult<OfferRow> {
    let row = sqlx::query(
        "SELECT id, start_date, end_date, rate_type, rate_amount, rate_currency, \
                accommodation_details, notes, status \
         FROM offers WHERE id = ?",
    )
    .bind(offer_id)
    .fetch_optional(&mut **tx)
    .await?;

    let Some(row) = row else {
        return Err(EngineError::NotFound(format!("offer {offer_id} not found")));
    };

    let rate_type: String = row.get("rate_type");
    let rate_amount: String = row.get("rate_amount");
    let status: String = row.get("status");
    Ok(OfferRow {
        id: row.get("id"),
        start_date: row.get("start_date"),
        end_date: row.get("end_date"),
        rate_type: parse_rate_type(&rate_type)?,
        rate_amount: parse_decimal(&rate_amount)?,
        rate_currency: row.get("rate_currency"),
        accommodation_details: row.get("accommodation_details"),
        notes: row.get("notes"),
        status: parse_offer_status(&status)?,
    })
}

pub async fn update_offer_row_tx(
    tx: &mut Transaction<'_, Sqlite>,
    offer: &OfferRow,
) -> EngineResult<()> {
    sqlx::query(
        "UPDATE offers SET start_date = ?, end_date = ?, rate_type = ?, rate_amount = ?, \
                rate_currency = ?, accommodation_details = ?, notes = ?, status = ?, \
                updated_at = CURRENT_TIMESTAMP \
         WHERE id = ?",
    )
    .bind(offer.start_date)
    .bind(offer.end_date)
    .bind(offer.rate_type.as_str())
    .bind(offer.rate_amount.to_string())
    .bind(&offer.rate_currency)
    .bind(&offer.accommodation_details)
    .bind(&offer.notes)
    .bind(offer.status.as_str())
    .bind(offer.id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Mirror an offer status onto the owning application. Applications already
/// in a terminal hiring state are left untouched.
pub async fn sync_application_status_tx(
    tx: &mut Transaction<'_, Sqlite>,
    application_id: i64,
    status: ApplicationStatus,
) -> EngineResult<()> {
    sqlx::query(
        "UPDATE applications SET status = ?, updated_at = CURRENT_TIMESTAMP \
         WHERE id = ? AND status NOT IN ('hired', 'rejected') AND status != ?",
    )
    .bind(status.as_str())
    .bind(application_id)
    .bind(status.as_str())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn stamp_application_last_paid_tx(
    tx: &mut Transaction<'_, Sqlite>,
    application_id: i64,
    at: DateTime<Utc>,
) -> EngineResult<()> {
    sqlx::query(
        "UPDATE applications SET last_paid_at = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(at)
    .bind(application_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Find-or-create the timesheet for an offer. The unique constraint on
/// `offer_id` makes the insert race-safe; a concurrent creator just loses the
/// insert and both callers read the same row.
pub async fn ensure_timesheet_tx(
    tx: &mut Transaction<'_, Sqlite>,
    offer_id: i64,
) -> EngineResult<i64> {
    sqlx::query("INSERT INTO timesheets (offer_id) VALUES (?) ON CONFLICT(offer_id) DO NOTHING")
        .bind(offer_id)
        .execute(&mut **tx)
        .await?;
    let id: i64 = sqlx::query_scalar("SELECT id FROM timesheets WHERE offer_id = ?")
        .bind(offer_id)
        .fetch_one(&mut **tx)
        .await?;
    Ok(id)
}

pub async fn fetch_timesheet_by_offer_tx(
    tx: &mut Transaction<'_, Sqlite>,
    offer_id: i64,
) -> EngineResult<Option<TimesheetRow>> {
    let row = sqlx::query(
        "SELECT id, offer_id, status, worker_notes, employer_notes, submitted_at, approved_at \
         FROM timesheets WHERE offer_id = ?",
    )
    .bind(offer_id)
    .fetch_optional(&mut **tx)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    let status: String = row.get("status");
    Ok(Some(TimesheetRow {
        id: row.get("id"),
        offer_id: row.get("offer_id"),
        status: parse_timesheet_status(&status)?,
        worker_notes: row.get("worker_notes"),
        employer_notes: row.get("employer_notes"),
        submitted_at: row.get("submitted_at"),
        approved_at: row.get("approved_at"),
    }))
}

pub async fn fetch_entries_tx(
    tx: &mut Transaction<'_, Sqlite>,
    timesheet_id: i64,
) -> EngineResult<Vec<EntryRow>> {
    let rows = sqlx::query(
        "SELECT id, entry_date, hours_worked, notes, is_locked, is_paid, payment_status \
         FROM timesheet_entries WHERE timesheet_id = ? ORDER BY entry_date",
    )
    .bind(timesheet_id)
    .fetch_all(&mut **tx)
    .await?;

    rows.into_iter()
        .map(|row| {
            let hours: String = row.get("hours_worked");
            let payment_status: String = row.get("payment_status");
            Ok(EntryRow {
                id: row.get("id"),
                entry_date: row.get("entry_date"),
                hours_worked: parse_decimal(&hours)?,
                notes: row.get("notes"),
                is_locked: row.get("is_locked"),
                is_paid: row.get("is_paid"),
                payment_status: parse_entry_payment_status(&payment_status)?,
            })
        })
        .collect()
}

pub async fn insert_entry_tx(
    tx: &mut Transaction<'_, Sqlite>,
    timesheet_id: i64,
    entry_date: NaiveDate,
    hours_worked: Decimal,
    notes: &str,
) -> EngineResult<()> {
    sqlx::query(
        "INSERT INTO timesheet_entries (timesheet_id, entry_date, hours_worked, notes) \
         VALUES (?, ?, ?, ?)",
    )
    .bind(timesheet_id)
    .bind(entry_date)
    .bind(hours_worked.to_string())
    .bind(notes)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn update_entry_tx(
    tx: &mut Transaction<'_, Sqlite>,
    entry_id: i64,
    hours_worked: Decimal,
    notes: &str,
) -> EngineResult<()> {
    sqlx::query("UPDATE timesheet_entries SET hours_worked = ?, notes = ? WHERE id = ?")
        .bind(hours_worked.to_string())
        .bind(notes)
        .bind(entry_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

pub async fn delete_entry_tx(tx: &mut Transaction<'_, Sqlite>, entry_id: i64) -> EngineResult<()> {
    sqlx::query("DELETE FROM timesheet_entries WHERE id = ?")
        .bind(entry_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

pub async fn count_unlocked_entries_tx(
    tx: &mut Transaction<'_, Sqlite>,
    timesheet_id: i64,
) -> EngineResult<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM timesheet_entries WHERE timesheet_id = ? AND is_locked = 0",
    )
    .bind(timesheet_id)
    .fetch_one(&mut **tx)
    .await?;
    Ok(count)
}

/// Lock every currently-unlocked entry. Runs inside the approval transaction
/// so the lock and the status flip land together.
pub async fn lock_all_unlocked_tx(
    tx: &mut Transaction<'_, Sqlite>,
    timesheet_id: i64,
) -> EngineResult<u64> {
    let result = sqlx::query(
        "UPDATE timesheet_entries SET is_locked = 1 WHERE timesheet_id = ? AND is_locked = 0",
    )
    .bind(timesheet_id)
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected())
}

pub async fn update_worker_notes_tx(
    tx: &mut Transaction<'_, Sqlite>,
    timesheet_id: i64,
    notes: &str,
) -> EngineResult<()> {
    sqlx::query(
        "UPDATE timesheets SET worker_notes = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(notes)
    .bind(timesheet_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Any ledger mutation invalidates a prior submission or approval.
pub async fn reset_timesheet_to_draft_tx(
    tx: &mut Transaction<'_, Sqlite>,
    timesheet_id: i64,
) -> EngineResult<()> {
    sqlx::query(
        "UPDATE timesheets SET status = 'draft', submitted_at = NULL, approved_at = NULL, \
                updated_at = CURRENT_TIMESTAMP \
         WHERE id = ? AND status IN ('submitted', 'approved')",
    )
    .bind(timesheet_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn mark_timesheet_submitted_tx(
    tx: &mut Transaction<'_, Sqlite>,
    timesheet_id: i64,
    at: DateTime<Utc>,
) -> EngineResult<()> {
    sqlx::query(
        "UPDATE timesheets SET status = 'submitted', submitted_at = ?, \
                updated_at = CURRENT_TIMESTAMP \
         WHERE id = ?",
    )
    .bind(at)
    .bind(timesheet_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn mark_timesheet_approved_tx(
    tx: &mut Transaction<'_, Sqlite>,
    timesheet_id: i64,
    at: DateTime<Utc>,
    employer_notes: Option<&str>,
) -> EngineResult<()> {
    sqlx::query(
        "UPDATE timesheets SET status = 'approved', approved_at = ?, \
                employer_notes = COALESCE(?, employer_notes), updated_at = CURRENT_TIMESTAMP \
         WHERE id = ?",
    )
    .bind(at)
    .bind(employer_notes)
    .bind(timesheet_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Atomically claim every approved, unpaid entry for settlement. The
/// conditional update doubles as the row lock: of two racing settlements only
/// one can flip `is_paid` and the loser gets an empty claim back.
pub async fn claim_unpaid_locked_entries_tx(
    tx: &mut Transaction<'_, Sqlite>,
    timesheet_id: i64,
) -> EngineResult<Vec<ClaimedEntry>> {
    let rows = sqlx::query(
        "UPDATE timesheet_entries \
         SET is_paid = 1, payment_status = 'instructions_generated' \
         WHERE timesheet_id = ? AND is_locked = 1 AND is_paid = 0 \
         RETURNING id, entry_date, hours_worked",
    )
    .bind(timesheet_id)
    .fetch_all(&mut **tx)
    .await?;

    rows.into_iter()
        .map(|row| {
            let hours: String = row.get("hours_worked");
            Ok(ClaimedEntry {
                id: row.get("id"),
                entry_date: row.get("entry_date"),
                hours_worked: parse_decimal(&hours)?,
            })
        })
        .collect()
}

pub async fn insert_payslip_tx(
    tx: &mut Transaction<'_, Sqlite>,
    payslip: &NewPayslip,
) -> EngineResult<i64> {
    let rec = sqlx::query(
        "INSERT INTO payslips (timesheet_id, offer_id, employer_id, worker_id, hour_count, \
                rate_amount, rate_currency, gross_amount, commission_amount, net_before_tax, \
                tax_withheld, net_payment, super_amount, pay_period_start, pay_period_end, \
                employer_name, employer_address, employer_tax_id, worker_name, worker_address, \
                worker_tax_id) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(payslip.timesheet_id)
    .bind(payslip.offer_id)
    .bind(payslip.employer_id)
    .bind(payslip.worker_id)
    .bind(payslip.hour_count.to_string())
    .bind(payslip.rate_amount.to_string())
    .bind(&payslip.rate_currency)
    .bind(payslip.gross_amount.to_string())
    .bind(payslip.commission_amount.to_string())
    .bind(payslip.net_before_tax.to_string())
    .bind(payslip.tax_withheld.to_string())
    .bind(payslip.net_payment.to_string())
    .bind(payslip.super_amount.to_string())
    .bind(payslip.pay_period_start)
    .bind(payslip.pay_period_end)
    .bind(&payslip.employer_name)
    .bind(&payslip.employer_address)
    .bind(&payslip.employer_tax_id)
    .bind(&payslip.worker_name)
    .bind(&payslip.worker_address)
    .bind(&payslip.worker_tax_id)
    .fetch_one(&mut **tx)
    .await?;
    Ok(rec.get("id"))
}

pub async fn attach_instruction_metadata_tx(
    tx: &mut Transaction<'_, Sqlite>,
    payslip_id: i64,
    metadata_json: &str,
    generated_at: DateTime<Utc>,
) -> EngineResult<()> {
    sqlx::query(
        "UPDATE payslips SET instructions_metadata = ?, instructions_generated_at = ?, \
                instructions_status = 'instructions_generated', updated_at = CURRENT_TIMESTAMP \
         WHERE id = ?",
    )
    .bind(metadata_json)
    .bind(generated_at)
    .bind(payslip_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn latest_payslip_for_offer_tx(
    tx: &mut Transaction<'_, Sqlite>,
    offer_id: i64,
) -> EngineResult<Option<PayslipSummary>> {
    let row = sqlx::query(
        "SELECT p.id, p.timesheet_id, p.employer_id, p.instructions_status, p.status, \
                o.application_id \
         FROM payslips p JOIN offers o ON o.id = p.offer_id \
         WHERE p.offer_id = ? ORDER BY p.id DESC LIMIT 1",
    )
    .bind(offer_id)
    .fetch_optional(&mut **tx)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    let instructions_status: String = row.get("instructions_status");
    let status: String = row.get("status");
    Ok(Some(PayslipSummary {
        id: row.get("id"),
        timesheet_id: row.get("timesheet_id"),
        application_id: row.get("application_id"),
        employer_id: row.get("employer_id"),
        instructions_status: parse_instructions_status(&instructions_status)?,
        status: parse_payslip_status(&status)?,
    }))
}

pub async fn mark_payslip_completed_tx(
    tx: &mut Transaction<'_, Sqlite>,
    payslip_id: i64,
) -> EngineResult<()> {
    sqlx::query(
        "UPDATE payslips SET instructions_status = 'completed', status = 'completed', \
                updated_at = CURRENT_TIMESTAMP \
         WHERE id = ?",
    )
    .bind(payslip_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Advance every entry still carrying outstanding instructions to `paid`.
pub async fn advance_entries_paid_tx(
    tx: &mut Transaction<'_, Sqlite>,
    timesheet_id: i64,
) -> EngineResult<u64> {
    let result = sqlx::query(
        "UPDATE timesheet_entries SET payment_status = 'paid' \
         WHERE timesheet_id = ? \
           AND payment_status IN ('instructions_generated', 'awaiting_bank_import')",
    )
    .bind(timesheet_id)
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected())
}

#[instrument(skip_all)]
pub async fn fetch_payslip(pool: &Pool, payslip_id: i64) -> EngineResult<PayslipRow> {
    let row = sqlx::query("SELECT * FROM payslips WHERE id = ?")
        .bind(payslip_id)
        .fetch_optional(pool)
        .await?;

    let Some(row) = row else {
        return Err(EngineError::NotFound(format!(
            "payslip {payslip_id} not found"
        )));
    };

    let hour_count: String = row.get("hour_count");
    let rate_amount: String = row.get("rate_amount");
    let gross: String = row.get("gross_amount");
    let commission: String = row.get("commission_amount");
    let net_before_tax: String = row.get("net_before_tax");
    let tax_withheld: String = row.get("tax_withheld");
    let net_payment: String = row.get("net_payment");
    let super_amount: String = row.get("super_amount");
    let instructions_status: String = row.get("instructions_status");
    let status: String = row.get("status");

    Ok(PayslipRow {
        id: row.get("id"),
        timesheet_id: row.get("timesheet_id"),
        offer_id: row.get("offer_id"),
        employer_id: row.get("employer_id"),
        worker_id: row.get("worker_id"),
        hour_count: parse_decimal(&hour_count)?,
        rate_amount: parse_decimal(&rate_amount)?,
        rate_currency: row.get("rate_currency"),
        gross_amount: parse_decimal(&gross)?,
        commission_amount: parse_decimal(&commission)?,
        net_before_tax: parse_decimal(&net_before_tax)?,
        tax_withheld: parse_decimal(&tax_withheld)?,
        net_payment: parse_decimal(&net_payment)?,
        super_amount: parse_decimal(&super_amount)?,
        pay_period_start: row.get("pay_period_start"),
        pay_period_end: row.get("pay_period_end"),
        employer_name: row.get("employer_name"),
        employer_address: row.get("employer_address"),
        employer_tax_id: row.get("employer_tax_id"),
        worker_name: row.get("worker_name"),
        worker_address: row.get("worker_address"),
        worker_tax_id: row.get("worker_tax_id"),
        instructions_status: parse_instructions_status(&instructions_status)?,
        status: parse_payslip_status(&status)?,
        created_at: row.get("created_at"),
    })
}

/// Unpaid payslips whose pay period ended before `cutoff`, oldest first.
#[instrument(skip_all)]
pub async fn overdue_payslips(pool: &Pool, cutoff: NaiveDate) -> EngineResult<Vec<OverduePayslip>> {
    let rows = sqlx::query(
        "SELECT p.id, p.employer_id, p.pay_period_end, \
                e.is_suspended AS employer_suspended \
         FROM payslips p JOIN employers e ON e.id = p.employer_id \
         WHERE p.status IN ('processing', 'failed') \
           AND p.instructions_status IN ('instructions_generated', 'awaiting_bank_import') \
           AND p.pay_period_end < ? \
         ORDER BY p.pay_period_end ASC",
    )
    .bind(cutoff)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| OverduePayslip {
            id: row.get("id"),
            employer_id: row.get("employer_id"),
            employer_suspended: row.get("employer_suspended"),
            pay_period_end: row.get("pay_period_end"),
        })
        .collect())
}

pub async fn mark_payslip_overdue_tx(
    tx: &mut Transaction<'_, Sqlite>,
    payslip_id: i64,
) -> EngineResult<()> {
    sqlx::query(
        "UPDATE payslips SET status = 'overdue', updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(payslip_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn enqueue_outbox_tx(
    tx: &mut Transaction<'_, Sqlite>,
    kind: OutboxKind,
    ref_id: i64,
    event: &str,
    due_at: DateTime<Utc>,
) -> EngineResult<i64> {
    let rec = sqlx::query(
        "INSERT INTO outbox (kind, ref_id, event, attempt, due_at) VALUES (?, ?, ?, 0, ?) \
         RETURNING id",
    )
    .bind(kind.as_str())
    .bind(ref_id)
    .bind(event)
    .bind(due_at)
    .fetch_one(&mut **tx)
    .await?;
    Ok(rec.get("id"))
}

#[instrument(skip_all)]
pub async fn next_due_outbox(pool: &Pool) -> EngineResult<Option<OutboxItem>> {
    let row = sqlx::query(
        "SELECT id, kind, ref_id, event, attempt FROM outbox \
         WHERE datetime(due_at) <= CURRENT_TIMESTAMP \
         ORDER BY datetime(due_at) ASC, id ASC LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|row| {
        (
            row.get("id"),
            row.get("kind"),
            row.get("ref_id"),
            row.get("event"),
            row.get("attempt"),
        )
    }))
}

#[instrument(skip_all)]
pub async fn delete_outbox(pool: &Pool, id: i64) -> EngineResult<()> {
    sqlx::query("DELETE FROM outbox WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn backoff_outbox_with_cap(
    pool: &Pool,
    id: i64,
    attempt: i32,
    max_cap_secs: i64,
) -> EngineResult<()> {
    // Exponential backoff: 5s * 2^attempt, capped.
    let secs = (5_i64) * (1_i64 << attempt.min(10));
    let cap = if max_cap_secs <= 0 {
        secs
    } else {
        max_cap_secs
    };
    let secs = secs.min(cap);
    sqlx::query(
        "UPDATE outbox SET attempt = ?, due_at = datetime('now', ? || ' seconds') WHERE id = ?",
    )
    .bind(attempt + 1)
    .bind(secs)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn count_remaining_outbox_tasks(pool: &Pool) -> EngineResult<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM outbox")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

#[instrument(skip_all)]
pub async fn offer_for_notify(pool: &Pool, offer_id: i64) -> EngineResult<OfferForNotify> {
    let row = sqlx::query(
        "SELECT id, application_id, job_id, status, rate_type, rate_amount, rate_currency, \
                start_date, end_date, accommodation_details \
         FROM offers WHERE id = ?",
    )
    .bind(offer_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Err(EngineError::NotFound(format!("offer {offer_id} not found")));
    };
    let status: String = row.get("status");
    let rate_type: String = row.get("rate_type");
    let rate_amount: String = row.get("rate_amount");
    Ok(OfferForNotify {
        offer_id: row.get("id"),
        application_id: row.get("application_id"),
        job_id: row.get("job_id"),
        status: parse_offer_status(&status)?,
        rate_type: parse_rate_type(&rate_type)?,
        rate_amount: parse_decimal(&rate_amount)?,
        rate_currency: row.get("rate_currency"),
        start_date: row.get("start_date"),
        end_date: row.get("end_date"),
        accommodation_details: row.get("accommodation_details"),
    })
}

#[instrument(skip_all)]
pub async fn timesheet_for_notify(
    pool: &Pool,
    timesheet_id: i64,
) -> EngineResult<TimesheetForNotify> {
    let row = sqlx::query(
        "SELECT t.id, t.offer_id, t.status, o.application_id \
         FROM timesheets t JOIN offers o ON o.id = t.offer_id \
         WHERE t.id = ?",
    )
    .bind(timesheet_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Err(EngineError::NotFound(format!(
            "timesheet {timesheet_id} not found"
        )));
    };
    let status: String = row.get("status");

    let hours: Vec<String> =
        sqlx::query_scalar("SELECT hours_worked FROM timesheet_entries WHERE timesheet_id = ?")
            .bind(timesheet_id)
            .fetch_all(pool)
            .await?;
    let entry_count = hours.len() as i64;
    let mut total_hours = Decimal::ZERO;
    for h in &hours {
        total_hours += parse_decimal(h)?;
    }

    Ok(TimesheetForNotify {
        timesheet_id: row.get("id"),
        offer_id: row.get("offer_id"),
        application_id: row.get("application_id"),
        status: parse_timesheet_status(&status)?,
        entry_count,
        total_hours,
    })
}

#[instrument(skip_all)]
pub async fn payslip_for_notify(pool: &Pool, payslip_id: i64) -> EngineResult<PayslipForNotify> {
    let row = sqlx::query(
        "SELECT p.id, p.offer_id, p.status, p.instructions_status, p.hour_count, p.rate_amount, \
                p.rate_currency, p.gross_amount, p.commission_amount, p.tax_withheld, \
                p.net_payment, p.super_amount, p.pay_period_start, p.pay_period_end, \
                o.application_id \
         FROM payslips p JOIN offers o ON o.id = p.offer_id \
         WHERE p.id = ?",
    )
    .bind(payslip_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Err(EngineError::NotFound(format!(
            "payslip {payslip_id} not found"
        )));
    };
    let status: String = row.get("status");
    let instructions_status: String = row.get("instructions_status");
    let hour_count: String = row.get("hour_count");
    let rate_amount: String = row.get("rate_amount");
    let gross: String = row.get("gross_amount");
    let commission: String = row.get("commission_amount");
    let tax: String = row.get("tax_withheld");
    let net: String = row.get("net_payment");
    let super_amount: String = row.get("super_amount");

    Ok(PayslipForNotify {
        payslip_id: row.get("id"),
        offer_id: row.get("offer_id"),
        application_id: row.get("application_id"),
        status: parse_payslip_status(&status)?,
        instructions_status: parse_instructions_status(&instructions_status)?,
        hour_count: parse_decimal(&hour_count)?,
        rate_amount: parse_decimal(&rate_amount)?,
        rate_currency: row.get("rate_currency"),
        gross_amount: parse_decimal(&gross)?,
        commission_amount: parse_decimal(&commission)?,
        tax_withheld: parse_decimal(&tax)?,
        net_payment: parse_decimal(&net)?,
        super_amount: parse_decimal(&super_amount)?,
        pay_period_start: row.get("pay_period_start"),
        pay_period_end: row.get("pay_period_end"),
    })
}
