//! Timesheet ledger: draft editing by the worker, submission, and employer
//! approval which locks entries.
//!
//! Replacement semantics: the incoming entry set is authoritative for
//! unlocked rows: matching dates are updated, new dates inserted, absent
//! dates deleted. Locked rows are immutable; an incoming row for a locked
//! date must match it exactly or the whole call fails.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, instrument};

use crate::db::{self, Pool};
use crate::error::{EngineError, EngineResult};
use crate::model::{EntryInput, OfferStatus, OutboxKind, TimesheetStatus};

async fn accepted_offer_context(
    pool: &Pool,
    offer_id: i64,
) -> EngineResult<crate::db::OfferContext> {
    let Some(ctx) = db::fetch_offer_context(pool, offer_id).await? else {
        return Err(EngineError::NotFound(format!("offer {offer_id} not found")));
    };
    if ctx.status != OfferStatus::Accepted {
        return Err(EngineError::NotFound(
            "No accepted offer found for this application.".into(),
        ));
    }
    Ok(ctx)
}

/// Replace the unlocked portion of the ledger with the incoming entry set.
/// Any actual mutation drops a prior submission or approval back to draft.
#[instrument(skip_all)]
pub async fn replace_entries(
    pool: &Pool,
    offer_id: i64,
    actor: i64,
    entries: &[EntryInput],
    worker_notes: Option<&str>,
) -> EngineResult<()> {
    let ctx = accepted_offer_context(pool, offer_id).await?;
    if actor != ctx.worker_id {
        return Err(EngineError::Permission(
            "Only the worker may update the timesheet entries.".into(),
        ));
    }

    let mut seen_dates = BTreeSet::new();
    for entry in entries {
        if entry.hours_worked <= Decimal::ZERO {
            return Err(EngineError::Validation(
                "Hours must be greater than zero.".into(),
            ));
        }
        if !seen_dates.insert(entry.entry_date) {
            return Err(EngineError::Validation(format!(
                "Duplicate entry for {}.",
                entry.entry_date
            )));
        }
    }

    let mut tx = pool.begin().await?;
    let timesheet_id = db::ensure_timesheet_tx(&mut tx, offer_id).await?;
    let Some(timesheet) = db::fetch_timesheet_by_offer_tx(&mut tx, offer_id).await? else {
        return Err(EngineError::NotFound("timesheet not found".into()));
    };

    let existing: BTreeMap<_, _> = db::fetch_entries_tx(&mut tx, timesheet_id)
        .await?
        .into_iter()
        .map(|e| (e.entry_date, e))
        .collect();

    let mut changed = false;
    for entry in entries {
        match existing.get(&entry.entry_date) {
            Some(current) if current.is_locked => {
                if current.hours_worked != entry.hours_worked || current.notes != entry.notes {
                    return Err(EngineError::Validation(format!(
                        "Hours for {} have already been approved and cannot be changed.",
                        entry.entry_date
                    )));
                }
            }
            Some(current) => {
                if current.hours_worked != entry.hours_worked || current.notes != entry.notes {
                    db::update_entry_tx(&mut tx, current.id, entry.hours_worked, &entry.notes)
                        .await?;
                    changed = true;
                }
            }
            None => {
                db::insert_entry_tx(
                    &mut tx,
                    timesheet_id,
                    entry.entry_date,
                    entry.hours_worked,
                    &entry.notes,
                )
                .await?;
                changed = true;
            }
        }
    }

    // Unlocked rows whose date is absent from the incoming set are removed.
    for (entry_date, entry) in &existing {
        if entry.is_locked || seen_dates.contains(entry_date) {
            continue;
        }
        db::delete_entry_tx(&mut tx, entry.id).await?;
        changed = true;
    }

    if let Some(notes) = worker_notes {
        if notes != timesheet.worker_notes {
            db::update_worker_notes_tx(&mut tx, timesheet_id, notes).await?;
            changed = true;
        }
    }

    if changed {
        // Edits invalidate any prior submission or approval.
        db::reset_timesheet_to_draft_tx(&mut tx, timesheet_id).await?;
        db::enqueue_outbox_tx(
            &mut tx,
            OutboxKind::PushTimesheet,
            timesheet_id,
            "updated",
            Utc::now(),
        )
        .await?;
    }
    tx.commit().await?;

    info!(offer_id, timesheet_id, changed, "timesheet entries replaced");
    Ok(())
}

/// Worker submits the ledger for approval.
#[instrument(skip_all)]
pub async fn submit(pool: &Pool, offer_id: i64, actor: i64) -> EngineResult<()> {
    let ctx = accepted_offer_context(pool, offer_id).await?;
    if actor != ctx.worker_id {
        return Err(EngineError::Permission(
            "Only the worker may submit the timesheet.".into(),
        ));
    }

    let mut tx = pool.begin().await?;
    let timesheet_id = db::ensure_timesheet_tx(&mut tx, offer_id).await?;
    let Some(timesheet) = db::fetch_timesheet_by_offer_tx(&mut tx, offer_id).await? else {
        return Err(EngineError::NotFound("timesheet not found".into()));
    };

    if db::count_unlocked_entries_tx(&mut tx, timesheet_id).await? == 0 {
        return Err(EngineError::Validation(
            "Add at least one new entry before submitting.".into(),
        ));
    }
    if timesheet.status == TimesheetStatus::Approved {
        return Err(EngineError::Conflict("Timesheet already approved.".into()));
    }

    db::mark_timesheet_submitted_tx(&mut tx, timesheet_id, Utc::now()).await?;
    db::enqueue_outbox_tx(
        &mut tx,
        OutboxKind::PushTimesheet,
        timesheet_id,
        "submitted",
        Utc::now(),
    )
    .await?;
    tx.commit().await?;

    info!(offer_id, timesheet_id, "timesheet submitted");
    Ok(())
}

/// Employer approves a submitted ledger: every unlocked entry is locked and
/// the status flips, atomically: a concurrent edit either lands before the
/// approval transaction or fails against the locked rows afterwards.
#[instrument(skip_all)]
pub async fn approve(
    pool: &Pool,
    offer_id: i64,
    actor: i64,
    employer_notes: Option<&str>,
) -> EngineResult<()> {
    let ctx = accepted_offer_context(pool, offer_id).await?;
    if actor != ctx.employer_party_id {
        return Err(EngineError::Permission(
            "Only the employer may approve the timesheet.".into(),
        ));
    }

    let mut tx = pool.begin().await?;
    let timesheet_id = db::ensure_timesheet_tx(&mut tx, offer_id).await?;
    let Some(timesheet) = db::fetch_timesheet_by_offer_tx(&mut tx, offer_id).await? else {
        return Err(EngineError::NotFound("timesheet not found".into()));
    };

    if timesheet.status != TimesheetStatus::Submitted {
        return Err(EngineError::Conflict(
            "Only submitted timesheets can be approved.".into(),
        ));
    }
    if db::count_unlocked_entries_tx(&mut tx, timesheet_id).await? == 0 {
        return Err(EngineError::Conflict(
            "No pending entries to approve.".into(),
        ));
    }

    let locked = db::lock_all_unlocked_tx(&mut tx, timesheet_id).await?;
    db::mark_timesheet_approved_tx(&mut tx, timesheet_id, Utc::now(), employer_notes).await?;
    db::enqueue_outbox_tx(
        &mut tx,
        OutboxKind::PushTimesheet,
        timesheet_id,
        "approved",
        Utc::now(),
    )
    .await?;
    tx.commit().await?;

    info!(offer_id, timesheet_id, locked, "timesheet approved");
    Ok(())
}
