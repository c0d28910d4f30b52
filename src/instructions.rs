//! Fixed-width payment instruction file, modeled on the direct-entry batch
//! format banks ingest: one 120-character descriptive record, one detail
//! record per non-zero payout leg, one file total record.
//!
//! The builder is a pure function over the payslip amounts and the three bank
//! accounts involved; the processing time is an input, so the same inputs
//! always produce a byte-identical file.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::bank::BankDetails;
use crate::error::{EngineError, EngineResult};
use crate::money::{display_2dp, to_cents};

pub const RECORD_WIDTH: usize = 120;

const REEL_SEQUENCE: &str = "01";
const TRANSACTION_CODE: &str = "50";

const DESC_COMMISSION: &str = "OZZIEWORK COMM";
const DESC_NET_PAYMENT: &str = "NET PAYMENT";
const DESC_WITHHELD_TAX: &str = "WH TAX";

/// Type `0` header carrying the paying (employer) account and batch context.
#[derive(Debug, Clone)]
pub struct DescriptiveRecord {
    pub company_name: String,
    pub lodgement_reference: String,
    pub trace_bsb_display: String,
    pub trace_account: String,
    pub processing_date: NaiveDate,
    pub currency: String,
}

impl DescriptiveRecord {
    pub fn encode(&self) -> String {
        let mut line = String::with_capacity(RECORD_WIDTH);
        line.push('0');
        line.push(' ');
        line.push_str(REEL_SEQUENCE);
        line.push_str(&left_justified(&self.company_name, 20));
        line.push_str(&left_justified(&self.lodgement_reference, 12));
        line.push_str(&self.trace_bsb_display);
        line.push_str(&left_justified(&self.trace_account, 9));
        line.push_str(&self.processing_date.format("%d%m%y").to_string());
        line.push_str(&" ".repeat(24));
        line.push_str(&left_justified(&self.currency, 3));
        line.push_str(&" ".repeat(9));
        pad_record(line)
    }
}

/// Type `1` record: one credit to one recipient account.
#[derive(Debug, Clone)]
pub struct DetailRecord {
    pub recipient_bsb_display: String,
    pub recipient_account: String,
    pub amount_cents: i64,
    pub recipient_name: String,
    pub description: String,
    pub trace_bsb_display: String,
    pub trace_account: String,
    pub company_name: String,
}

impl DetailRecord {
    pub fn encode(&self) -> String {
        let mut line = String::with_capacity(RECORD_WIDTH);
        line.push('1');
        line.push_str(&self.recipient_bsb_display);
        line.push_str(&left_justified(&self.recipient_account, 9));
        line.push(' ');
        line.push_str(TRANSACTION_CODE);
        line.push_str(&format!("{:010}", self.amount_cents));
        line.push_str(&left_justified(&self.recipient_name, 32));
        line.push_str(&left_justified(&self.description, 18));
        line.push_str(&self.trace_bsb_display);
        line.push_str(&left_justified(&self.trace_account, 9));
        line.push_str(&left_justified(&self.company_name, 16));
        pad_record(line)
    }
}

/// Type `7` trailer: total of emitted amounts and detail record count.
#[derive(Debug, Clone)]
pub struct FileTotalRecord {
    pub total_cents: i64,
    pub detail_count: usize,
}

impl FileTotalRecord {
    pub fn encode(&self) -> String {
        let mut line = String::with_capacity(RECORD_WIDTH);
        line.push('7');
        line.push_str(&" ".repeat(7));
        line.push_str(&format!("{:010}", self.total_cents));
        line.push_str(&format!("{:06}", self.detail_count));
        line.push_str(&" ".repeat(40));
        line.push_str("000000");
        pad_record(line)
    }
}

/// Audit entry mirroring one emitted detail record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstructionRecordMeta {
    pub account_name: String,
    pub bsb: String,
    pub account_number: String,
    pub amount: String,
    pub description: String,
}

/// Metadata persisted alongside the payslip for audit display. The file
/// itself stays the authoritative artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstructionMetadata {
    pub records: Vec<InstructionRecordMeta>,
    pub total_amount: String,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct InstructionFile {
    pub content: String,
    pub metadata: InstructionMetadata,
}

fn left_justified(value: &str, width: usize) -> String {
    let truncated: String = value.chars().take(width).collect();
    format!("{truncated:<width$}")
}

fn pad_record(mut line: String) -> String {
    let len = line.chars().count();
    if len < RECORD_WIDTH {
        line.push_str(&" ".repeat(RECORD_WIDTH - len));
    }
    line
}

/// Render the three-way payout split for one payslip. Legs are emitted in a
/// fixed order (platform commission, worker net payment, withheld tax back
/// to the employer) and zero-amount legs are omitted entirely.
#[allow(clippy::too_many_arguments)]
pub fn build_instruction_file(
    payslip_id: i64,
    payer_name: &str,
    currency: &str,
    commission_amount: Decimal,
    net_payment: Decimal,
    tax_withheld: Decimal,
    employer_bank: &BankDetails,
    worker_bank: &BankDetails,
    platform_bank: &BankDetails,
    processing_at: DateTime<Utc>,
) -> EngineResult<InstructionFile> {
    let lodgement_reference: String = format!("PAYS{payslip_id}").chars().take(18).collect();
    let company_name: String = payer_name.chars().take(20).collect();
    let trace_bsb_display = employer_bank.bsb_display();
    let trace_account = employer_bank.account_number().to_string();

    let header = DescriptiveRecord {
        company_name: company_name.clone(),
        lodgement_reference,
        trace_bsb_display: trace_bsb_display.clone(),
        trace_account: trace_account.clone(),
        processing_date: processing_at.date_naive(),
        currency: currency.to_string(),
    };

    let legs = [
        (platform_bank, commission_amount, DESC_COMMISSION),
        (worker_bank, net_payment, DESC_NET_PAYMENT),
        (employer_bank, tax_withheld, DESC_WITHHELD_TAX),
    ];

    let mut lines = vec![header.encode()];
    let mut records = Vec::new();
    let mut total_cents: i64 = 0;
    for (recipient, amount, description) in legs {
        if amount <= Decimal::ZERO {
            continue;
        }
        let amount_cents = to_cents(amount).ok_or_else(|| {
            EngineError::Validation(format!("{description} amount is out of range."))
        })?;
        if amount_cents == 0 {
            // Rounds to less than one cent; nothing to credit.
            continue;
        }
        let record = DetailRecord {
            recipient_bsb_display: recipient.bsb_display(),
            recipient_account: recipient.account_number().to_string(),
            amount_cents,
            recipient_name: recipient.account_name.clone(),
            description: description.to_string(),
            trace_bsb_display: trace_bsb_display.clone(),
            trace_account: trace_account.clone(),
            company_name: company_name.clone(),
        };
        lines.push(record.encode());
        records.push(InstructionRecordMeta {
            account_name: recipient.account_name.clone(),
            bsb: recipient.bsb_display(),
            account_number: recipient.account_number().to_string(),
            amount: display_2dp(amount),
            description: description.to_string(),
        });
        total_cents += amount_cents;
    }

    lines.push(
        FileTotalRecord {
            total_cents,
            detail_count: records.len(),
        }
        .encode(),
    );

    let content = lines.join("\n") + "\n";
    Ok(InstructionFile {
        content,
        metadata: InstructionMetadata {
            records,
            total_amount: display_2dp(commission_amount + net_payment + tax_withheld),
            generated_at: processing_at,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn employer_bank() -> BankDetails {
        BankDetails::normalized("Mango Farms Pty Ltd", "NAB", "083-001", "11223344", "Employer")
            .unwrap()
    }

    fn worker_bank() -> BankDetails {
        BankDetails::normalized("Sam Picker", "CBA", "062-000", "12345678", "Worker").unwrap()
    }

    fn platform_bank() -> BankDetails {
        BankDetails::normalized("OzzieWork", "OzzieWork", "083-100", "999888777", "Platform")
            .unwrap()
    }

    fn processing_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 2, 30, 0).unwrap()
    }

    fn build_sample(tax: &str) -> InstructionFile {
        build_instruction_file(
            42,
            "Mango Farms Pty Ltd",
            "AUD",
            dec("1.00"),
            dec("89.50"),
            dec(tax),
            &employer_bank(),
            &worker_bank(),
            &platform_bank(),
            processing_at(),
        )
        .unwrap()
    }

    #[test]
    fn every_record_is_120_chars_and_file_ends_with_newline() {
        let file = build_sample("15.00");
        assert!(file.content.ends_with('\n'));
        let lines: Vec<&str> = file.content.trim_end_matches('\n').split('\n').collect();
        assert_eq!(lines.len(), 5);
        for line in &lines {
            assert_eq!(line.chars().count(), RECORD_WIDTH, "line: {line:?}");
        }
    }

    #[test]
    fn header_layout_is_exact() {
        let file = build_sample("15.00");
        let header = file.content.lines().next().unwrap();
        let expected = concat!(
            "0",
            " ",
            "01",
            "Mango Farms Pty Ltd ", // 20
            "PAYS42      ",         // 12
            "083-001",
            "11223344 ", // 9
            "150324",
            "                        ", // 24
            "AUD",
            "         ", // 9
        );
        assert_eq!(&header[..expected.len()], expected);
        assert!(header[expected.len()..].chars().all(|c| c == ' '));
    }

    #[test]
    fn commission_detail_record_is_exact() {
        let file = build_sample("15.00");
        let lines: Vec<&str> = file.content.lines().collect();
        let expected = concat!(
            "1",
            "083-100",
            "999888777",
            " ",
            "50",
            "0000000100",
            "OzzieWork                       ", // 32
            "OZZIEWORK COMM    ",               // 18
            "083-001",
            "11223344 ",        // 9
            "Mango Farms Pty ", // 16
            "        ",         // pad to 120
        );
        assert_eq!(lines[1], expected);
    }

    #[test]
    fn legs_come_in_fixed_order_with_footer_totals() {
        let file = build_sample("15.00");
        let lines: Vec<&str> = file.content.lines().collect();
        assert!(lines[1].contains("0000000100"));
        assert!(lines[1].contains("OZZIEWORK COMM"));
        assert!(lines[2].contains("0000008950"));
        assert!(lines[2].contains("NET PAYMENT"));
        assert!(lines[2].contains("Sam Picker"));
        assert!(lines[3].contains("0000001500"));
        assert!(lines[3].contains("WH TAX"));

        let footer = lines[4];
        let expected = concat!(
            "7",
            "       ", // 7
            "0000010550",
            "000003",
        );
        assert_eq!(&footer[..expected.len()], expected);
        assert!(footer.contains("000000"));
    }

    #[test]
    fn zero_tax_leg_is_omitted() {
        let file = build_sample("0.00");
        let lines: Vec<&str> = file.content.lines().collect();
        assert_eq!(lines.len(), 4); // header + 2 details + footer
        assert!(!file.content.contains("WH TAX"));
        let footer = lines[3];
        assert!(footer.starts_with("7       0000009050000002"));
        assert_eq!(file.metadata.records.len(), 2);
    }

    #[test]
    fn metadata_mirrors_emitted_records() {
        let file = build_sample("15.00");
        assert_eq!(file.metadata.records.len(), 3);
        assert_eq!(file.metadata.total_amount, "105.50");
        let net = &file.metadata.records[1];
        assert_eq!(net.account_name, "Sam Picker");
        assert_eq!(net.bsb, "062-000");
        assert_eq!(net.account_number, "12345678");
        assert_eq!(net.amount, "89.50");
        assert_eq!(net.description, "NET PAYMENT");
    }

    #[test]
    fn same_inputs_produce_identical_bytes() {
        let a = build_sample("15.00");
        let b = build_sample("15.00");
        assert_eq!(a.content, b.content);
    }

    #[test]
    fn long_names_are_truncated_not_overflowed() {
        let long_bank = BankDetails::normalized(
            "A Very Long Employer Company Name That Exceeds Thirty-Two Characters",
            "NAB",
            "083001",
            "1",
            "Employer",
        )
        .unwrap();
        let file = build_instruction_file(
            7,
            "A Very Long Employer Company Name",
            "AUD",
            dec("1.00"),
            dec("2.00"),
            dec("3.00"),
            &long_bank,
            &worker_bank(),
            &platform_bank(),
            processing_at(),
        )
        .unwrap();
        for line in file.content.lines() {
            assert_eq!(line.chars().count(), RECORD_WIDTH);
        }
    }
}
