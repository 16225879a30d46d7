//! Producers of raw transactions from statement files.

pub mod ofx;
pub mod pdf;

use chrono::NaiveDate;
use rust_decimal::Decimal;

/// A transaction as found in a source document, before it becomes a ledger row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTransaction {
    pub date: NaiveDate,
    pub description: String,
    pub amount: Decimal,
    pub document_number: String,
    pub memo: String,
    /// Source vocabulary label (OFX `TRNTYPE`), `None` when the source has no such notion
    pub transaction_type: Option<String>,
    /// `None` means the transaction cannot be recognized across imports
    pub identity_key: Option<String>,
}

/// Account a statement belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRef {
    pub bank_id: String,
    pub account_id: String,
    pub account_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub account: AccountRef,
    pub transactions: Vec<RawTransaction>,
}

/// Identity of transactions that carry no stable id of their own (PDF lines, manual entries).
pub fn synthesized_key(date: NaiveDate, document_number: &str, description: &str) -> String {
    format!(
        "{}-{document_number}-{description}",
        date.format(crate::ledger::DATE_FORMAT)
    )
}
