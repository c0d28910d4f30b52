//! Engagement state machine.
//!
//! An offer belongs to exactly one application and mirrors its status onto it
//! through a fixed table. The employer drafts and may cancel; the worker may
//! only accept or decline while the offer is pending. Offers are never
//! deleted.

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, instrument};

use crate::db::{self, Pool};
use crate::error::{EngineError, EngineResult};
use crate::model::{OfferPatch, OfferStatus, OfferTerms, OutboxKind};
use crate::suspension;

fn validate_terms(terms: &OfferTerms) -> EngineResult<()> {
    if terms.rate_amount <= Decimal::ZERO {
        return Err(EngineError::Validation(
            "Rate amount must be greater than zero.".into(),
        ));
    }
    if terms.rate_currency.trim().is_empty() {
        return Err(EngineError::Validation("Rate currency is required.".into()));
    }
    if let Some(end_date) = terms.end_date {
        if end_date < terms.start_date {
            return Err(EngineError::Validation(
                "End date cannot precede the start date.".into(),
            ));
        }
    }
    Ok(())
}

/// Create a pending offer for an application and move the application to
/// `offer_sent`. Fails if the application already has an offer, or its job
/// already carries an active one elsewhere.
#[instrument(skip_all)]
pub async fn create_offer(
    pool: &Pool,
    application_id: i64,
    actor: i64,
    terms: &OfferTerms,
) -> EngineResult<i64> {
    let Some(application) = db::fetch_application_context(pool, application_id).await? else {
        return Err(EngineError::NotFound(format!(
            "application {application_id} not found"
        )));
    };
    if actor != application.employer_party_id {
        return Err(EngineError::Permission(
            "Only the job owner may create offers.".into(),
        ));
    }
    suspension::ensure_employer_not_suspended(application.employer_suspended)?;
    validate_terms(terms)?;

    let mut tx = pool.begin().await?;
    if db::offer_exists_for_application_tx(&mut tx, application_id).await? {
        return Err(EngineError::Conflict(
            "An offer already exists for this application.".into(),
        ));
    }
    if db::job_has_active_offer_tx(&mut tx, application.job_id, application_id).await? {
        return Err(EngineError::Conflict(
            "Another active offer already exists for this job.".into(),
        ));
    }
    let offer_id = db::insert_offer_tx(
        &mut tx,
        application_id,
        application.job_id,
        application.employer_id,
        application.worker_id,
        terms,
    )
    .await?;
    db::sync_application_status_tx(
        &mut tx,
        application_id,
        OfferStatus::Pending.application_status(),
    )
    .await?;
    db::enqueue_outbox_tx(&mut tx, OutboxKind::PushOffer, offer_id, "created", Utc::now()).await?;
    tx.commit().await?;

    info!(offer_id, application_id, "offer created");
    Ok(offer_id)
}

/// Apply an actor-scoped patch to an offer and mirror the resulting status
/// onto the application. The first transition to `accepted` instantiates the
/// timesheet.
#[instrument(skip_all)]
pub async fn update_offer(
    pool: &Pool,
    offer_id: i64,
    actor: i64,
    patch: &OfferPatch,
) -> EngineResult<OfferStatus> {
    let Some(ctx) = db::fetch_offer_context(pool, offer_id).await? else {
        return Err(EngineError::NotFound(format!("offer {offer_id} not found")));
    };

    let is_employer = actor == ctx.employer_party_id;
    let is_worker = actor == ctx.worker_id;
    if !is_employer && !is_worker {
        return Err(EngineError::Permission(
            "Not authorized to update this offer.".into(),
        ));
    }
    if patch.is_empty() {
        return Err(EngineError::Validation("No valid fields provided.".into()));
    }

    if is_employer {
        suspension::ensure_employer_not_suspended(ctx.employer_suspended)?;
        if let Some(status) = patch.status {
            if status != OfferStatus::Cancelled {
                return Err(EngineError::Validation(
                    "Employers can only cancel offers after sending.".into(),
                ));
            }
        }
    } else {
        if patch.has_contract_fields()
            || !matches!(
                patch.status,
                Some(OfferStatus::Accepted) | Some(OfferStatus::Declined)
            )
        {
            return Err(EngineError::Validation(
                "Workers can only accept or decline offers.".into(),
            ));
        }
    }

    let mut tx = pool.begin().await?;
    // State guards run against the row re-read inside the transaction, so a
    // concurrent transition cannot slip between check and write.
    let mut offer = db::fetch_offer_row_tx(&mut tx, offer_id).await?;

    if is_employer {
        if patch.has_contract_fields() && offer.status != OfferStatus::Pending {
            return Err(EngineError::Conflict(
                "Contract terms can only be changed while the offer is pending.".into(),
            ));
        }
        if patch.status == Some(OfferStatus::Cancelled) && offer.status == OfferStatus::Cancelled {
            return Err(EngineError::Conflict("Offer is already cancelled.".into()));
        }
    } else if offer.status != OfferStatus::Pending {
        return Err(EngineError::Conflict(
            "Only pending offers can be accepted or declined.".into(),
        ));
    }

    if let Some(start_date) = patch.start_date {
        offer.start_date = start_date;
    }
    if let Some(end_date) = patch.end_date {
        offer.end_date = Some(end_date);
    }
    if let Some(rate_type) = patch.rate_type {
        offer.rate_type = rate_type;
    }
    if let Some(rate_amount) = patch.rate_amount {
        if rate_amount <= Decimal::ZERO {
            return Err(EngineError::Validation(
                "Rate amount must be greater than zero.".into(),
            ));
        }
        offer.rate_amount = rate_amount;
    }
    if let Some(rate_currency) = &patch.rate_currency {
        offer.rate_currency = rate_currency.clone();
    }
    if let Some(accommodation_details) = &patch.accommodation_details {
        offer.accommodation_details = accommodation_details.clone();
    }
    if let Some(notes) = &patch.notes {
        offer.notes = notes.clone();
    }

    let mut event = "updated";
    if let Some(status) = patch.status {
        if status != offer.status {
            event = status.as_str();
        }
        offer.status = status;
    }

    db::update_offer_row_tx(&mut tx, &offer).await?;
    if offer.status == OfferStatus::Accepted {
        db::ensure_timesheet_tx(&mut tx, offer_id).await?;
    }
    db::sync_application_status_tx(&mut tx, ctx.application_id, offer.status.application_status())
        .await?;
    db::enqueue_outbox_tx(&mut tx, OutboxKind::PushOffer, offer_id, event, Utc::now()).await?;
    tx.commit().await?;

    info!(offer_id, status = offer.status.as_str(), "offer updated");
    Ok(offer.status)
}
