use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::ledger::LedgerRow;

pub const TOTAL_LABEL: &str = "TOTAL GERAL";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BankSummaryRow {
    #[serde(rename = "Banco")]
    pub bank_id: String,
    #[serde(rename = "Conta")]
    pub account_id: String,
    #[serde(rename = "Saldo Final", with = "rust_decimal::serde::str")]
    pub balance: Decimal,
}

/// Latest balance of every account, in the order accounts first appear in the ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub accounts: Vec<BankSummaryRow>,
    pub total: Decimal,
}

impl Summary {
    /// Account rows followed by the `TOTAL GERAL` row.
    pub fn rows(&self) -> impl Iterator<Item = BankSummaryRow> + '_ {
        self.accounts.iter().cloned().chain(std::iter::once(BankSummaryRow {
            bank_id: TOTAL_LABEL.to_owned(),
            account_id: String::new(),
            balance: self.total,
        }))
    }
}

/// Rebuilds the summary from scratch; the last row seen for an account wins.
pub fn summarize(rows: &[LedgerRow]) -> Summary {
    let mut positions: HashMap<(&str, &str), usize> = HashMap::new();
    let mut accounts: Vec<BankSummaryRow> = Vec::new();
    for row in rows {
        let key = (row.bank_id.as_str(), row.account_id.as_str());
        match positions.get(&key) {
            Some(&position) => accounts[position].balance = row.running_balance,
            None => {
                positions.insert(key, accounts.len());
                accounts.push(BankSummaryRow {
                    bank_id: row.bank_id.clone(),
                    account_id: row.account_id.clone(),
                    balance: row.running_balance,
                });
            }
        }
    }
    let total = accounts
        .iter()
        .fold(Decimal::ZERO, |total, account| total.saturating_add(account.balance));
    Summary { accounts, total }
}
