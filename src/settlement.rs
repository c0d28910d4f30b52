//! Payslip settlement: converts a batch of approved, unpaid entries into an
//! immutable payslip, a payment instruction file, and paid entry state, all
//! in one transaction. It also closes the loop when the employer confirms the
//! instructions cleared.

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, instrument, warn};

use crate::bank::{platform_bank_details, require_bank_details};
use crate::config::Config;
use crate::db::{self, NewPayslip, Pool};
use crate::documents;
use crate::error::{EngineError, EngineResult};
use crate::instructions::build_instruction_file;
use crate::model::{OfferStatus, OutboxKind, TimesheetStatus};
use crate::money::round2;
use crate::suspension;

/// Monetary breakdown of one settlement, each step rounded to the cent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakdown {
    pub gross_amount: Decimal,
    pub commission_amount: Decimal,
    pub net_before_tax: Decimal,
    pub tax_withheld: Decimal,
    pub net_payment: Decimal,
    pub super_amount: Decimal,
}

/// Compute the settlement breakdown in its fixed order. Superannuation is
/// tracked against gross but never deducted or remitted by this engine.
pub fn compute_breakdown(rate_amount: Decimal, total_hours: Decimal) -> Breakdown {
    let gross_amount = round2(rate_amount * total_hours);
    let commission_amount = round2(gross_amount * Decimal::new(1, 2)); // 1% platform fee
    let net_before_tax = round2(gross_amount - commission_amount);
    let tax_withheld = round2(net_before_tax * Decimal::new(15, 2)); // 15% withholding
    let net_payment = round2(net_before_tax - tax_withheld);
    let super_amount = round2(gross_amount * Decimal::new(11, 2)); // 11% superannuation guarantee

    Breakdown {
        gross_amount,
        commission_amount,
        net_before_tax,
        tax_withheld,
        net_payment,
        super_amount,
    }
}

/// Settle every approved, unpaid entry on the offer's timesheet into one
/// payslip. At most one settlement can claim a given entry: the claim is an
/// atomic conditional update, so a concurrent call observes no eligible rows
/// and fails cleanly.
#[instrument(skip_all)]
pub async fn settle(pool: &Pool, cfg: &Config, offer_id: i64, actor: i64) -> EngineResult<i64> {
    let Some(ctx) = db::fetch_offer_context(pool, offer_id).await? else {
        return Err(EngineError::NotFound(format!("offer {offer_id} not found")));
    };
    if actor != ctx.employer_party_id {
        return Err(EngineError::Permission(
            "Only the employer may settle approved hours.".into(),
        ));
    }
    if ctx.status != OfferStatus::Accepted {
        return Err(EngineError::Conflict(
            "No accepted offer found for this application.".into(),
        ));
    }

    // Party profiles are fetched up front; everything inside the transaction
    // below is local computation and row writes.
    let employer_party = db::fetch_party(pool, ctx.employer_party_id).await?;
    let worker_party = db::fetch_party(pool, ctx.worker_id).await?;
    let now = Utc::now();

    let mut tx = pool.begin().await?;
    let timesheet = match db::fetch_timesheet_by_offer_tx(&mut tx, offer_id).await? {
        Some(t) if t.status == TimesheetStatus::Approved => t,
        _ => {
            return Err(EngineError::Conflict(
                "Only approved timesheets can be paid.".into(),
            ))
        }
    };

    let claimed = db::claim_unpaid_locked_entries_tx(&mut tx, timesheet.id).await?;
    if claimed.is_empty() {
        return Err(EngineError::Conflict(
            "No approved unpaid hours available.".into(),
        ));
    }

    let total_hours: Decimal = claimed.iter().map(|e| e.hours_worked).sum();
    if total_hours <= Decimal::ZERO {
        return Err(EngineError::Validation(
            "Invalid hour total for payment.".into(),
        ));
    }
    if ctx.rate_amount <= Decimal::ZERO {
        return Err(EngineError::Validation(
            "Invalid pay rate for payment.".into(),
        ));
    }

    let breakdown = compute_breakdown(ctx.rate_amount, total_hours);

    let employer_bank = require_bank_details(&employer_party, "Employer")?;
    let worker_bank = require_bank_details(&worker_party, "Worker")?;
    let platform_bank = platform_bank_details(&cfg.platform)?;

    let Some(pay_period_start) = claimed.iter().map(|e| e.entry_date).min() else {
        return Err(EngineError::Conflict(
            "No approved unpaid hours available.".into(),
        ));
    };
    let Some(pay_period_end) = claimed.iter().map(|e| e.entry_date).max() else {
        return Err(EngineError::Conflict(
            "No approved unpaid hours available.".into(),
        ));
    };

    let payslip_id = db::insert_payslip_tx(
        &mut tx,
        &NewPayslip {
            timesheet_id: timesheet.id,
            offer_id,
            employer_id: ctx.employer_id,
            worker_id: ctx.worker_id,
            hour_count: total_hours,
            rate_amount: ctx.rate_amount,
            rate_currency: ctx.rate_currency.clone(),
            gross_amount: breakdown.gross_amount,
            commission_amount: breakdown.commission_amount,
            net_before_tax: breakdown.net_before_tax,
            tax_withheld: breakdown.tax_withheld,
            net_payment: breakdown.net_payment,
            super_amount: breakdown.super_amount,
            pay_period_start,
            pay_period_end,
            employer_name: employer_party.display_name.clone(),
            employer_address: employer_party.address.clone(),
            employer_tax_id: employer_party.tax_id.clone(),
            worker_name: worker_party.display_name.clone(),
            worker_address: worker_party.address.clone(),
            worker_tax_id: worker_party.tax_id.clone(),
        },
    )
    .await?;

    let file = build_instruction_file(
        payslip_id,
        &employer_party.display_name,
        &ctx.rate_currency,
        breakdown.commission_amount,
        breakdown.net_payment,
        breakdown.tax_withheld,
        &employer_bank,
        &worker_bank,
        &platform_bank,
        now,
    )?;
    let metadata_json = serde_json::to_string(&file.metadata)
        .map_err(|e| EngineError::Decode(format!("instruction metadata: {e}")))?;
    db::attach_instruction_metadata_tx(&mut tx, payslip_id, &metadata_json, now).await?;
    db::enqueue_outbox_tx(&mut tx, OutboxKind::PushPayslip, payslip_id, "created", now).await?;
    tx.commit().await?;

    info!(
        offer_id,
        payslip_id,
        hours = %total_hours,
        net = %breakdown.net_payment,
        "settlement recorded"
    );

    // Artifacts are derived entirely from the committed payslip, so a failure
    // here is logged rather than unwinding the settlement.
    if let Err(err) =
        store_artifacts(pool, cfg, payslip_id, ctx.employer_party_id, &file.content).await
    {
        warn!(?err, payslip_id, "failed to persist settlement artifacts");
    }

    Ok(payslip_id)
}

async fn store_artifacts(
    pool: &Pool,
    cfg: &Config,
    payslip_id: i64,
    employer_party_id: i64,
    instruction_content: &str,
) -> EngineResult<()> {
    let payslip = db::fetch_payslip(pool, payslip_id).await?;
    let snapshot = serde_json::to_vec_pretty(&payslip)
        .map_err(|e| EngineError::Decode(format!("payslip snapshot: {e}")))?;
    let day = payslip.created_at.date_naive();

    documents::store_document(
        pool,
        &cfg.app.data_dir,
        payslip.worker_id,
        documents::CATEGORY_PAYSLIP_SNAPSHOT,
        &format!("Payslip {day}"),
        &format!("payslip-{payslip_id}.json"),
        "application/json",
        &snapshot,
        Some(payslip_id),
    )
    .await?;

    documents::store_document(
        pool,
        &cfg.app.data_dir,
        employer_party_id,
        documents::CATEGORY_PAYMENT_INSTRUCTIONS,
        &format!("Payment instructions {day}"),
        &format!("payslip-{payslip_id}.aba"),
        "text/plain",
        instruction_content.as_bytes(),
        Some(payslip_id),
    )
    .await?;
    Ok(())
}

/// Employer confirms the generated instructions cleared the bank: payslip and
/// entries advance to their paid terminal states and the application's
/// last-paid time is stamped. Re-confirming fails; there is nothing left to
/// confirm.
#[instrument(skip_all)]
pub async fn confirm_instructions(pool: &Pool, offer_id: i64, actor: i64) -> EngineResult<i64> {
    let Some(ctx) = db::fetch_offer_context(pool, offer_id).await? else {
        return Err(EngineError::NotFound(format!("offer {offer_id} not found")));
    };
    if actor != ctx.employer_party_id {
        return Err(EngineError::Permission(
            "Only the employer may confirm payment instructions.".into(),
        ));
    }

    let now = Utc::now();
    let mut tx = pool.begin().await?;
    let Some(payslip) = db::latest_payslip_for_offer_tx(&mut tx, offer_id).await? else {
        return Err(EngineError::NotFound("No payslip available.".into()));
    };
    if !payslip.instructions_status.is_outstanding() {
        return Err(EngineError::Conflict(
            "No instructions awaiting confirmation.".into(),
        ));
    }

    db::mark_payslip_completed_tx(&mut tx, payslip.id).await?;
    db::stamp_application_last_paid_tx(&mut tx, payslip.application_id, now).await?;
    let advanced = db::advance_entries_paid_tx(&mut tx, payslip.timesheet_id).await?;
    db::enqueue_outbox_tx(
        &mut tx,
        OutboxKind::PushPayslip,
        payslip.id,
        "instructions_confirmed",
        now,
    )
    .await?;
    tx.commit().await?;

    info!(
        offer_id,
        payslip_id = payslip.id,
        advanced,
        "payment instructions confirmed"
    );

    // With the payment confirmed, lift the suspension if nothing overdue
    // remains against this employer.
    let unsuspended = suspension::unsuspend_employer_if_settled(pool, payslip.employer_id).await?;
    if unsuspended {
        info!(employer_id = payslip.employer_id, "employer unsuspended");
    }

    Ok(payslip.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn twenty_hours_at_twenty_dollars() {
        let b = compute_breakdown(dec("20.00"), dec("20"));
        assert_eq!(b.gross_amount, dec("400.00"));
        assert_eq!(b.commission_amount, dec("4.00"));
        assert_eq!(b.net_before_tax, dec("396.00"));
        assert_eq!(b.tax_withheld, dec("59.40"));
        assert_eq!(b.net_payment, dec("336.60"));
        assert_eq!(b.super_amount, dec("44.00"));
    }

    #[test]
    fn legs_always_recompose_to_gross() {
        for (rate, hours) in [
            ("20.00", "20"),
            ("24.35", "7.25"),
            ("31.17", "38.5"),
            ("19.99", "0.5"),
            ("45.00", "160"),
        ] {
            let b = compute_breakdown(dec(rate), dec(hours));
            assert_eq!(
                b.commission_amount + b.net_before_tax,
                b.gross_amount,
                "rate {rate} hours {hours}"
            );
            assert_eq!(
                b.tax_withheld + b.net_payment,
                b.net_before_tax,
                "rate {rate} hours {hours}"
            );
            assert_eq!(
                b.commission_amount + b.tax_withheld + b.net_payment,
                b.gross_amount,
                "rate {rate} hours {hours}"
            );
        }
    }

    #[test]
    fn gross_is_rate_times_hours_to_the_cent() {
        let b = compute_breakdown(dec("24.35"), dec("7.25"));
        // 24.35 * 7.25 = 176.5375 -> 176.54 under half-even
        assert_eq!(b.gross_amount, dec("176.54"));
    }

    #[test]
    fn tiny_settlements_can_round_tax_to_zero() {
        // 0.05 gross -> commission 0.00, tax 0.01; go smaller for a zero leg.
        let b = compute_breakdown(dec("0.01"), dec("1"));
        assert_eq!(b.gross_amount, dec("0.01"));
        assert_eq!(b.commission_amount, dec("0.00"));
        assert_eq!(b.tax_withheld, dec("0.00"));
        assert_eq!(b.net_payment, dec("0.01"));
    }
}
