use crate::db;
use crate::model::OutboxKind;
use crate::notify::{self, NotifyService};
use anyhow::{anyhow, Result};
use sqlx::SqlitePool;
use tracing::{info, instrument, warn};

/// Deliver the next due notification event, if any. Returns `true` when a
/// task was picked up (delivered or backed off), `false` when the queue is
/// idle.
#[instrument(skip_all)]
pub async fn process_next_task(
    pool: &SqlitePool,
    service: &dyn NotifyService,
    max_backoff_secs: i64,
) -> Result<bool> {
    if let Some((id, kind, ref_id, event, attempt)) = db::next_due_outbox(pool).await? {
        let res = push_event(pool, service, &kind, ref_id, &event).await;
        match res {
            Ok(_) => {
                db::delete_outbox(pool, id).await?;
                info!(id, kind, ref_id, event, "outbox task succeeded");
            }
            Err(err) => {
                warn!(
                    ?err,
                    id, kind, ref_id, event, attempt, "outbox task failed; backoff"
                );
                db::backoff_outbox_with_cap(pool, id, attempt, max_backoff_secs).await?;
            }
        }
        return Ok(true);
    }
    Ok(false)
}

async fn push_event(
    pool: &SqlitePool,
    service: &dyn NotifyService,
    kind: &str,
    ref_id: i64,
    event: &str,
) -> Result<()> {
    let payload = match OutboxKind::parse(kind) {
        Some(OutboxKind::PushOffer) => {
            let offer = db::offer_for_notify(pool, ref_id).await?;
            notify::build_offer_event(&offer, event)
        }
        Some(OutboxKind::PushTimesheet) => {
            let timesheet = db::timesheet_for_notify(pool, ref_id).await?;
            notify::build_timesheet_event(&timesheet, event)
        }
        Some(OutboxKind::PushPayslip) => {
            let payslip = db::payslip_for_notify(pool, ref_id).await?;
            notify::build_payslip_event(&payslip, event)
        }
        None => return Err(anyhow!("unknown outbox kind {kind}")),
    };
    service.deliver(&payload).await
}
