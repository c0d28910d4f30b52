use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OfferStatus {
    Pending,
    Accepted,
    Declined,
    Cancelled,
}

impl OfferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferStatus::Pending => "pending",
            OfferStatus::Accepted => "accepted",
            OfferStatus::Declined => "declined",
            OfferStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OfferStatus::Pending),
            "accepted" => Some(OfferStatus::Accepted),
            "declined" => Some(OfferStatus::Declined),
            "cancelled" => Some(OfferStatus::Cancelled),
            _ => None,
        }
    }

    /// Application status mirrored by each offer status. This mapping is the
    /// only way an application moves between offer-driven states.
    pub fn application_status(&self) -> ApplicationStatus {
        match self {
            OfferStatus::Pending => ApplicationStatus::OfferSent,
            OfferStatus::Accepted => ApplicationStatus::OfferAccepted,
            OfferStatus::Declined => ApplicationStatus::OfferDeclined,
            OfferStatus::Cancelled => ApplicationStatus::Cancelled,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ApplicationStatus {
    Submitted,
    Review,
    Interview,
    OfferSent,
    OfferAccepted,
    OfferDeclined,
    Hired,
    Rejected,
    Cancelled,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Submitted => "submitted",
            ApplicationStatus::Review => "review",
            ApplicationStatus::Interview => "interview",
            ApplicationStatus::OfferSent => "offer_sent",
            ApplicationStatus::OfferAccepted => "offer_accepted",
            ApplicationStatus::OfferDeclined => "offer_declined",
            ApplicationStatus::Hired => "hired",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "submitted" => Some(ApplicationStatus::Submitted),
            "review" => Some(ApplicationStatus::Review),
            "interview" => Some(ApplicationStatus::Interview),
            "offer_sent" => Some(ApplicationStatus::OfferSent),
            "offer_accepted" => Some(ApplicationStatus::OfferAccepted),
            "offer_declined" => Some(ApplicationStatus::OfferDeclined),
            "hired" => Some(ApplicationStatus::Hired),
            "rejected" => Some(ApplicationStatus::Rejected),
            "cancelled" => Some(ApplicationStatus::Cancelled),
            _ => None,
        }
    }

    /// Terminal hiring outcomes; the offer map never overwrites these.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ApplicationStatus::Hired | ApplicationStatus::Rejected)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RateType {
    Hourly,
    Daily,
}

impl RateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateType::Hourly => "hourly",
            RateType::Daily => "daily",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "hourly" => Some(RateType::Hourly),
            "daily" => Some(RateType::Daily),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TimesheetStatus {
    Draft,
    Submitted,
    Approved,
}

impl TimesheetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimesheetStatus::Draft => "draft",
            TimesheetStatus::Submitted => "submitted",
            TimesheetStatus::Approved => "approved",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(TimesheetStatus::Draft),
            "submitted" => Some(TimesheetStatus::Submitted),
            "approved" => Some(TimesheetStatus::Approved),
            _ => None,
        }
    }
}

/// Per-entry payment progress; advances strictly forward.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EntryPaymentStatus {
    Pending,
    InstructionsGenerated,
    AwaitingBankImport,
    Paid,
}

impl EntryPaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryPaymentStatus::Pending => "pending",
            EntryPaymentStatus::InstructionsGenerated => "instructions_generated",
            EntryPaymentStatus::AwaitingBankImport => "awaiting_bank_import",
            EntryPaymentStatus::Paid => "paid",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(EntryPaymentStatus::Pending),
            "instructions_generated" => Some(EntryPaymentStatus::InstructionsGenerated),
            "awaiting_bank_import" => Some(EntryPaymentStatus::AwaitingBankImport),
            "paid" => Some(EntryPaymentStatus::Paid),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum InstructionsStatus {
    Pending,
    InstructionsGenerated,
    AwaitingBankImport,
    Completed,
}

impl InstructionsStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstructionsStatus::Pending => "pending",
            InstructionsStatus::InstructionsGenerated => "instructions_generated",
            InstructionsStatus::AwaitingBankImport => "awaiting_bank_import",
            InstructionsStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(InstructionsStatus::Pending),
            "instructions_generated" => Some(InstructionsStatus::InstructionsGenerated),
            "awaiting_bank_import" => Some(InstructionsStatus::AwaitingBankImport),
            "completed" => Some(InstructionsStatus::Completed),
            _ => None,
        }
    }

    /// Instructions that are out with the bank but not yet confirmed.
    pub fn is_outstanding(&self) -> bool {
        matches!(
            self,
            InstructionsStatus::InstructionsGenerated | InstructionsStatus::AwaitingBankImport
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PayslipStatus {
    Processing,
    Completed,
    Failed,
    Overdue,
}

impl PayslipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayslipStatus::Processing => "processing",
            PayslipStatus::Completed => "completed",
            PayslipStatus::Failed => "failed",
            PayslipStatus::Overdue => "overdue",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "processing" => Some(PayslipStatus::Processing),
            "completed" => Some(PayslipStatus::Completed),
            "failed" => Some(PayslipStatus::Failed),
            "overdue" => Some(PayslipStatus::Overdue),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OutboxKind {
    PushOffer,
    PushTimesheet,
    PushPayslip,
}

impl OutboxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxKind::PushOffer => "push_offer",
            OutboxKind::PushTimesheet => "push_timesheet",
            OutboxKind::PushPayslip => "push_payslip",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "push_offer" => Some(OutboxKind::PushOffer),
            "push_timesheet" => Some(OutboxKind::PushTimesheet),
            "push_payslip" => Some(OutboxKind::PushPayslip),
            _ => None,
        }
    }
}

/// Contract terms supplied by the employer when sending an offer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferTerms {
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub rate_type: RateType,
    pub rate_amount: Decimal,
    pub rate_currency: String,
    #[serde(default)]
    pub accommodation_details: String,
    #[serde(default)]
    pub notes: String,
}

/// Partial update to an offer; `None` fields are untouched.
#[derive(Debug, Clone, Default)]
pub struct OfferPatch {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub rate_type: Option<RateType>,
    pub rate_amount: Option<Decimal>,
    pub rate_currency: Option<String>,
    pub accommodation_details: Option<String>,
    pub notes: Option<String>,
    pub status: Option<OfferStatus>,
}

impl OfferPatch {
    pub fn has_contract_fields(&self) -> bool {
        self.start_date.is_some()
            || self.end_date.is_some()
            || self.rate_type.is_some()
            || self.rate_amount.is_some()
            || self.rate_currency.is_some()
            || self.accommodation_details.is_some()
            || self.notes.is_some()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_contract_fields() && self.status.is_none()
    }
}

/// One calendar day of logged hours, as sent by the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryInput {
    pub entry_date: NaiveDate,
    pub hours_worked: Decimal,
    #[serde(default)]
    pub notes: String,
}
