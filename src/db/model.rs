//! Database entity and view models used by repositories.
//!
//! Keep these structs focused on the data returned by queries. Business logic
//! should live in higher layers.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::model::{
    ApplicationStatus, EntryPaymentStatus, InstructionsStatus, OfferStatus, PayslipStatus,
    RateType, TimesheetStatus,
};

/// Identity and bank profile for one party. The engine only ever reads these;
/// the profile store that owns them lives outside the core.
#[derive(Debug, Clone)]
pub struct Party {
    pub id: i64,
    pub display_name: String,
    pub address: String,
    pub tax_id: String,
    pub bank_name: String,
    pub bank_bsb: String,
    pub bank_account: String,
}

/// Application slice with the owning employer resolved, used when creating an
/// offer (the only operation that starts from an application, not an offer).
#[derive(Debug, Clone)]
pub struct ApplicationContext {
    pub id: i64,
    pub job_id: i64,
    pub employer_id: i64,
    pub employer_party_id: i64,
    pub employer_suspended: bool,
    pub worker_id: i64,
    pub status: ApplicationStatus,
}

/// Offer slice with the surrounding actors resolved, used by every operation
/// that has to authorize a caller against the engagement.
#[derive(Debug, Clone)]
pub struct OfferContext {
    pub offer_id: i64,
    pub application_id: i64,
    pub job_id: i64,
    pub employer_id: i64,
    pub employer_party_id: i64,
    pub employer_suspended: bool,
    pub worker_id: i64,
    pub status: OfferStatus,
    pub rate_amount: Decimal,
    pub rate_currency: String,
    pub application_status: ApplicationStatus,
}

/// Full offer row, fetched when applying a patch.
#[derive(Debug, Clone)]
pub struct OfferRow {
    pub id: i64,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub rate_type: RateType,
    pub rate_amount: Decimal,
    pub rate_currency: String,
    pub accommodation_details: String,
    pub notes: String,
    pub status: OfferStatus,
}

#[derive(Debug, Clone)]
pub struct TimesheetRow {
    pub id: i64,
    pub offer_id: i64,
    pub status: TimesheetStatus,
    pub worker_notes: String,
    pub employer_notes: String,
    pub submitted_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct EntryRow {
    pub id: i64,
    pub entry_date: NaiveDate,
    pub hours_worked: Decimal,
    pub notes: String,
    pub is_locked: bool,
    pub is_paid: bool,
    pub payment_status: EntryPaymentStatus,
}

/// Entry claimed for settlement by the conditional update in
/// [`super::repo::claim_unpaid_locked_entries`].
#[derive(Debug, Clone)]
pub struct ClaimedEntry {
    pub id: i64,
    pub entry_date: NaiveDate,
    pub hours_worked: Decimal,
}

/// Field set for a new payslip row; everything else defaults at insert.
#[derive(Debug, Clone)]
pub struct NewPayslip {
    pub timesheet_id: i64,
    pub offer_id: i64,
    pub employer_id: i64,
    pub worker_id: i64,
    pub hour_count: Decimal,
    pub rate_amount: Decimal,
    pub rate_currency: String,
    pub gross_amount: Decimal,
    pub commission_amount: Decimal,
    pub net_before_tax: Decimal,
    pub tax_withheld: Decimal,
    pub net_payment: Decimal,
    pub super_amount: Decimal,
    pub pay_period_start: NaiveDate,
    pub pay_period_end: NaiveDate,
    pub employer_name: String,
    pub employer_address: String,
    pub employer_tax_id: String,
    pub worker_name: String,
    pub worker_address: String,
    pub worker_tax_id: String,
}

/// Immutable settlement record. Serialized as-is for the payslip snapshot
/// document, so field names are part of the artifact.
#[derive(Debug, Clone, Serialize)]
pub struct PayslipRow {
    pub id: i64,
    pub timesheet_id: i64,
    pub offer_id: i64,
    pub employer_id: i64,
    pub worker_id: i64,
    pub hour_count: Decimal,
    pub rate_amount: Decimal,
    pub rate_currency: String,
    pub gross_amount: Decimal,
    pub commission_amount: Decimal,
    pub net_before_tax: Decimal,
    pub tax_withheld: Decimal,
    pub net_payment: Decimal,
    pub super_amount: Decimal,
    pub pay_period_start: NaiveDate,
    pub pay_period_end: NaiveDate,
    pub employer_name: String,
    pub employer_address: String,
    pub employer_tax_id: String,
    pub worker_name: String,
    pub worker_address: String,
    pub worker_tax_id: String,
    pub instructions_status: InstructionsStatus,
    pub status: PayslipStatus,
    pub created_at: DateTime<Utc>,
}

/// Status slice of the most recent payslip for an offer.
#[derive(Debug, Clone)]
pub struct PayslipSummary {
    pub id: i64,
    pub timesheet_id: i64,
    pub application_id: i64,
    pub employer_id: i64,
    pub instructions_status: InstructionsStatus,
    pub status: PayslipStatus,
}

/// Candidate row returned by the overdue scan.
#[derive(Debug, Clone)]
pub struct OverduePayslip {
    pub id: i64,
    pub employer_id: i64,
    pub employer_suspended: bool,
    pub pay_period_end: NaiveDate,
}

/// Offer slice used when pushing an offer event to the webhook.
#[derive(Debug, Clone)]
pub struct OfferForNotify {
    pub offer_id: i64,
    pub application_id: i64,
    pub job_id: i64,
    pub status: OfferStatus,
    pub rate_type: RateType,
    pub rate_amount: Decimal,
    pub rate_currency: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub accommodation_details: String,
}

/// Timesheet slice used when pushing a timesheet event.
#[derive(Debug, Clone)]
pub struct TimesheetForNotify {
    pub timesheet_id: i64,
    pub offer_id: i64,
    pub application_id: i64,
    pub status: TimesheetStatus,
    pub entry_count: i64,
    pub total_hours: Decimal,
}

/// Payslip slice used when pushing a payslip event.
#[derive(Debug, Clone)]
pub struct PayslipForNotify {
    pub payslip_id: i64,
    pub offer_id: i64,
    pub application_id: i64,
    pub status: PayslipStatus,
    pub instructions_status: InstructionsStatus,
    pub hour_count: Decimal,
    pub rate_amount: Decimal,
    pub rate_currency: String,
    pub gross_amount: Decimal,
    pub commission_amount: Decimal,
    pub tax_withheld: Decimal,
    pub net_payment: Decimal,
    pub super_amount: Decimal,
    pub pay_period_start: NaiveDate,
    pub pay_period_end: NaiveDate,
}
