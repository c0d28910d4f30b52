//! Overdue-payment sweep: marks unpaid payslips overdue once their pay period
//! is old enough and suspends the responsible employer. Designed to run as a
//! single-flight periodic batch, safely re-runnable.

use chrono::{Duration, NaiveDate};
use tracing::{info, instrument, warn};

use crate::db::{self, OverduePayslip, Pool};
use crate::error::EngineResult;
use crate::suspension;

/// What a sweep run did, or in dry-run mode would have done.
#[derive(Debug, Clone, Default)]
pub struct SweepOutcome {
    pub payslips_marked: Vec<i64>,
    pub employers_suspended: Vec<i64>,
    pub dry_run: bool,
}

/// Scan for payslips with outstanding instructions whose pay period ended
/// more than `overdue_after_days` before `today`. Each hit is processed in
/// its own transaction; one bad row is logged and skipped, never aborting
/// the batch.
#[instrument(skip_all)]
pub async fn sweep_overdue(
    pool: &Pool,
    today: NaiveDate,
    overdue_after_days: u32,
    dry_run: bool,
) -> EngineResult<SweepOutcome> {
    let cutoff = today - Duration::days(i64::from(overdue_after_days));
    let candidates = db::overdue_payslips(pool, cutoff).await?;

    let mut outcome = SweepOutcome {
        dry_run,
        ..Default::default()
    };

    for candidate in candidates {
        let result = sweep_one(pool, &candidate, dry_run, &outcome.employers_suspended).await;
        match result {
            Ok(newly_suspended) => {
                warn!(
                    payslip_id = candidate.id,
                    employer_id = candidate.employer_id,
                    pay_period_end = %candidate.pay_period_end,
                    dry_run,
                    "payslip overdue"
                );
                outcome.payslips_marked.push(candidate.id);
                if newly_suspended {
                    warn!(
                        employer_id = candidate.employer_id,
                        payslip_id = candidate.id,
                        dry_run,
                        "employer suspended over overdue payslip"
                    );
                    outcome.employers_suspended.push(candidate.employer_id);
                }
            }
            Err(err) => {
                warn!(?err, payslip_id = candidate.id, "sweep row failed; continuing");
            }
        }
    }

    if outcome.payslips_marked.is_empty() {
        info!("no overdue payslips detected");
    } else {
        info!(
            marked = outcome.payslips_marked.len(),
            suspended = outcome.employers_suspended.len(),
            dry_run,
            "overdue sweep finished"
        );
    }

    Ok(outcome)
}

async fn sweep_one(
    pool: &Pool,
    candidate: &OverduePayslip,
    dry_run: bool,
    already_reported: &[i64],
) -> EngineResult<bool> {
    let would_suspend =
        !candidate.employer_suspended && !already_reported.contains(&candidate.employer_id);
    if dry_run {
        return Ok(would_suspend);
    }

    let mut tx = pool.begin().await?;
    db::mark_payslip_overdue_tx(&mut tx, candidate.id).await?;
    let newly_suspended = if candidate.employer_suspended {
        false
    } else {
        suspension::suspend_employer_tx(&mut tx, candidate.employer_id).await?
    };
    tx.commit().await?;
    Ok(newly_suspended)
}
