//! Employer suspension transitions.
//!
//! `is_suspended` has exactly two writers: the overdue sweep suspends, the
//! settle-confirm path unsuspends once nothing overdue remains. Everything
//! else only reads the flag through the guard below.

use sqlx::{Sqlite, Transaction};
use tracing::instrument;

use crate::db::Pool;
use crate::error::{EngineError, EngineResult};

pub const SUSPENSION_MESSAGE: &str =
    "Employer account is suspended over an unpaid payout. Confirm the outstanding \
     bank transfers to restore hiring features.";

/// Guard employer-side operations on an already-fetched suspension flag.
pub fn ensure_employer_not_suspended(is_suspended: bool) -> EngineResult<()> {
    if is_suspended {
        return Err(EngineError::Validation(SUSPENSION_MESSAGE.to_string()));
    }
    Ok(())
}

/// Suspend an employer. Returns `false` when the employer was already
/// suspended, making repeated sweeps side-effect free.
pub async fn suspend_employer_tx(
    tx: &mut Transaction<'_, Sqlite>,
    employer_id: i64,
) -> EngineResult<bool> {
    let result = sqlx::query(
        "UPDATE employers SET is_suspended = 1, updated_at = CURRENT_TIMESTAMP \
         WHERE id = ? AND is_suspended = 0",
    )
    .bind(employer_id)
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Lift a suspension once no overdue payslip remains for the employer.
/// Returns `true` when the employer was actually unsuspended.
#[instrument(skip_all)]
pub async fn unsuspend_employer_if_settled(pool: &Pool, employer_id: i64) -> EngineResult<bool> {
    let mut tx = pool.begin().await?;
    let overdue: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM payslips WHERE employer_id = ? AND status = 'overdue' LIMIT 1",
    )
    .bind(employer_id)
    .fetch_optional(&mut *tx)
    .await?;
    if overdue.is_some() {
        return Ok(false);
    }
    let result = sqlx::query(
        "UPDATE employers SET is_suspended = 0, updated_at = CURRENT_TIMESTAMP \
         WHERE id = ? AND is_suspended = 1",
    )
    .bind(employer_id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(result.rows_affected() > 0)
}
