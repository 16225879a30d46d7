use std::collections::HashSet;

use crate::extract::synthesized_key;
use crate::ledger::LedgerRow;

/// Prefixes of the placeholder FITIDs older ledgers stored for PDF and manual rows
const LEGACY_PLACEHOLDER_PREFIXES: [&str; 2] = ["PDF-", "MANUAL-"];

/// Identity keys of the transactions already present in a ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupIndex {
    keys: HashSet<String>,
}

impl DedupIndex {
    pub fn from_rows(rows: &[LedgerRow]) -> Self {
        let mut index = Self::default();
        for row in rows {
            if row.identity_key.is_empty() {
                continue;
            }
            let is_placeholder = LEGACY_PLACEHOLDER_PREFIXES
                .iter()
                .any(|prefix| row.identity_key.starts_with(prefix));
            if is_placeholder {
                index.insert(synthesized_key(row.date, &row.document_number, &row.memo));
            }
            index.insert(row.identity_key.clone());
        }
        index
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// Returns `false` if the key was already known.
    pub fn insert(&mut self, key: String) -> bool {
        self.keys.insert(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod test {
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;

    use super::*;
    use crate::ledger::EntryKind;

    fn row(identity_key: &str, document_number: &str, memo: &str) -> LedgerRow {
        LedgerRow {
            date: NaiveDate::from_ymd_opt(2024, 1, 2).expect("valid date"),
            kind: EntryKind::Credit,
            description: memo.to_owned(),
            amount: Decimal::ONE,
            running_balance: Decimal::ONE,
            bank_id: "CEF".to_owned(),
            account_id: "N/A".to_owned(),
            processed_at: None,
            execution_id: 1,
            transaction_type: "CREDIT".to_owned(),
            document_number: document_number.to_owned(),
            memo: memo.to_owned(),
            identity_key: identity_key.to_owned(),
        }
    }

    #[test]
    fn should_index_stored_identity_keys() {
        let index = DedupIndex::from_rows(&[
            row("FIT-1", "", ""),
            row("02/01/2024-000123-PIX RECEBIDO", "000123", "PIX RECEBIDO"),
            row("", "", "no identity"),
        ]);
        assert_eq!(2, index.len());
        assert!(index.contains("FIT-1"));
        assert!(index.contains("02/01/2024-000123-PIX RECEBIDO"));
    }

    #[test]
    fn should_recover_synthesized_keys_behind_legacy_placeholders() {
        let index = DedupIndex::from_rows(&[row("PDF-3-1726000000", "000123", "PIX RECEBIDO")]);
        assert!(index.contains("02/01/2024-000123-PIX RECEBIDO"));
    }

    #[test]
    fn should_report_whether_a_key_was_new() {
        let mut index = DedupIndex::default();
        assert!(index.is_empty());
        assert!(index.insert("k".to_owned()));
        assert!(!index.insert("k".to_owned()));
        assert!(index.contains("k"));
    }
}
