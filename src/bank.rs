//! Bank detail normalization shared by settlement and the instruction builder.
//!
//! A `BankDetails` can only be built through [`BankDetails::normalized`], so a
//! value of this type always carries a 6-digit BSB and a 1-9 digit account
//! number. Errors name the party they belong to ("Employer", "Worker", ...)
//! so callers can surface them verbatim.

use crate::config::Platform;
use crate::db::Party;
use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankDetails {
    pub account_name: String,
    pub bank_name: String,
    bsb_digits: String,
    account_number: String,
}

impl BankDetails {
    /// Validate and normalize raw bank fields into a usable detail set.
    pub fn normalized(
        account_name: &str,
        bank_name: &str,
        bsb: &str,
        account_number: &str,
        label: &str,
    ) -> EngineResult<Self> {
        Ok(Self {
            account_name: account_name.to_string(),
            bank_name: bank_name.to_string(),
            bsb_digits: normalize_bsb(bsb, label)?,
            account_number: normalize_account(account_number, label)?,
        })
    }

    pub fn bsb_digits(&self) -> &str {
        &self.bsb_digits
    }

    /// BSB in the `NNN-NNN` form used on records and in audit metadata.
    pub fn bsb_display(&self) -> String {
        format!("{}-{}", &self.bsb_digits[..3], &self.bsb_digits[3..])
    }

    pub fn account_number(&self) -> &str {
        &self.account_number
    }
}

fn clean_digits(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_digit()).collect()
}

fn normalize_bsb(raw: &str, label: &str) -> EngineResult<String> {
    let digits = clean_digits(raw);
    if digits.len() != 6 {
        return Err(EngineError::Validation(format!(
            "{label} needs a valid 6-digit BSB."
        )));
    }
    Ok(digits)
}

fn normalize_account(raw: &str, label: &str) -> EngineResult<String> {
    let digits = clean_digits(raw);
    if digits.is_empty() || digits.len() > 9 {
        return Err(EngineError::Validation(format!(
            "{label} needs a bank account number between 1 and 9 digits."
        )));
    }
    Ok(digits)
}

/// Check a party has complete bank details, then normalize them. Reported
/// missing fields are collected so one round trip surfaces everything.
pub fn require_bank_details(party: &Party, label: &str) -> EngineResult<BankDetails> {
    let bank_name = party.bank_name.trim();
    let bank_bsb = party.bank_bsb.trim();
    let bank_account = party.bank_account.trim();

    let mut missing = Vec::new();
    if bank_name.is_empty() {
        missing.push("bank name");
    }
    if bank_bsb.is_empty() {
        missing.push("BSB");
    }
    if bank_account.is_empty() {
        missing.push("account number");
    }
    if !missing.is_empty() {
        return Err(EngineError::Validation(format!(
            "{label} missing bank details: {}",
            missing.join(", ")
        )));
    }

    BankDetails::normalized(&party.display_name, bank_name, bank_bsb, bank_account, label)
}

/// The platform clearing account receiving the commission leg.
pub fn platform_bank_details(platform: &Platform) -> EngineResult<BankDetails> {
    BankDetails::normalized(
        &platform.name,
        &platform.name,
        &platform.bank_bsb,
        &platform.bank_account,
        "Platform",
    )
}
