//! Ledger rows and the builder turning raw transactions into them.

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dedup::DedupIndex;
use crate::extract::RawTransaction;

pub const DATE_FORMAT: &str = "%d/%m/%Y";
pub const TIMESTAMP_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    #[serde(rename = "Entrada")]
    Credit,
    #[serde(rename = "Saída", alias = "Saida")]
    Debit,
}

impl EntryKind {
    pub fn of(amount: Decimal) -> Self {
        if amount.is_sign_negative() && !amount.is_zero() {
            Self::Debit
        } else {
            Self::Credit
        }
    }

    /// `TRNTYPE` vocabulary for sources that have none of their own
    pub fn transaction_type(self) -> &'static str {
        match self {
            Self::Credit => "CREDIT",
            Self::Debit => "DEBIT",
        }
    }
}

/// One recorded transaction, serialized as a row of the ledger sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRow {
    #[serde(rename = "Data", with = "crate::store::date_format")]
    pub date: NaiveDate,
    #[serde(rename = "Tipo (Entrada/Saída)", alias = "Tipo")]
    pub kind: EntryKind,
    #[serde(rename = "Descrição", alias = "Descricao")]
    pub description: String,
    #[serde(rename = "Valor (R$)", alias = "Valor", with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    #[serde(
        rename = "Saldo acumulado (R$)",
        alias = "Saldo acumulado",
        with = "rust_decimal::serde::str"
    )]
    pub running_balance: Decimal,
    #[serde(rename = "Banco ID")]
    pub bank_id: String,
    #[serde(rename = "Conta", default = "not_available")]
    pub account_id: String,
    #[serde(
        rename = "Processado em",
        with = "crate::store::optional_timestamp_format",
        default
    )]
    pub processed_at: Option<NaiveDateTime>,
    #[serde(
        rename = "Execução",
        alias = "Execucao",
        deserialize_with = "crate::store::lenient_execution"
    )]
    pub execution_id: u32,
    #[serde(rename = "TRNTYPE")]
    pub transaction_type: String,
    #[serde(rename = "Nr. Documento", default)]
    pub document_number: String,
    #[serde(rename = "MEMO", default)]
    pub memo: String,
    #[serde(rename = "FITID", default)]
    pub identity_key: String,
}

fn not_available() -> String {
    "N/A".to_owned()
}

/// In-memory copy of the ledger sheet, in append order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    rows: Vec<LedgerRow>,
}

impl Ledger {
    pub fn new(rows: Vec<LedgerRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[LedgerRow] {
        &self.rows
    }

    pub(crate) fn rows_mut(&mut self) -> &mut Vec<LedgerRow> {
        &mut self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Sum of every recorded amount, which is where the next running balance starts from.
    pub fn total(&self) -> Decimal {
        self.rows
            .iter()
            .fold(Decimal::ZERO, |total, row| total.saturating_add(row.amount))
    }

    /// Stamps every row with the cumulative sum of the amounts up to and including it.
    pub fn restamp_running_balances(&mut self) {
        let mut balance = Decimal::ZERO;
        for row in &mut self.rows {
            balance = balance.saturating_add(row.amount);
            row.running_balance = balance;
        }
    }
}

/// Account and timestamp shared by every row of one source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowContext {
    pub bank_id: String,
    pub account_id: String,
    pub processed_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Accepted,
    Skipped,
}

/// Counters of one source document within a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub accepted: usize,
    pub skipped: usize,
    pub credits: Decimal,
    pub debits: Decimal,
}

impl Tally {
    fn record(&mut self, amount: Decimal) {
        self.accepted += 1;
        if EntryKind::of(amount) == EntryKind::Credit {
            self.credits = self.credits.saturating_add(amount);
        } else {
            self.debits = self.debits.saturating_add(amount);
        }
    }
}

/// Appends the rows of one execution to a ledger.
///
/// The dedup index is filled from the ledger when the batch starts and grows with every
/// accepted row, so repeated transactions are caught within the batch as well as against
/// earlier ones.
pub struct Batch<'a> {
    ledger: &'a mut Ledger,
    index: DedupIndex,
    execution_id: u32,
    balance: Decimal,
}

impl<'a> Batch<'a> {
    pub fn new(ledger: &'a mut Ledger, execution_id: u32) -> Self {
        let index = DedupIndex::from_rows(ledger.rows());
        let balance = ledger.total();
        Self {
            ledger,
            index,
            execution_id,
            balance,
        }
    }

    pub fn execution_id(&self) -> u32 {
        self.execution_id
    }

    /// Running balance after the last accepted row.
    pub fn balance(&self) -> Decimal {
        self.balance
    }

    pub fn offer(
        &mut self,
        transaction: RawTransaction,
        context: &RowContext,
        tally: &mut Tally,
    ) -> Offer {
        if let Some(key) = &transaction.identity_key {
            if self.index.contains(key) {
                debug!("Skipping already recorded transaction {key}");
                tally.skipped += 1;
                return Offer::Skipped;
            }
        }

        let kind = EntryKind::of(transaction.amount);
        self.balance = self.balance.saturating_add(transaction.amount);
        let identity_key = transaction.identity_key.unwrap_or_default();
        if !identity_key.is_empty() {
            self.index.insert(identity_key.clone());
        }
        tally.record(transaction.amount);

        self.ledger.rows_mut().push(LedgerRow {
            date: transaction.date,
            kind,
            description: transaction.description,
            amount: transaction.amount,
            running_balance: self.balance,
            bank_id: context.bank_id.clone(),
            account_id: context.account_id.clone(),
            processed_at: Some(context.processed_at),
            execution_id: self.execution_id,
            transaction_type: transaction
                .transaction_type
                .unwrap_or_else(|| kind.transaction_type().to_owned()),
            document_number: transaction.document_number,
            memo: transaction.memo,
            identity_key,
        });
        Offer::Accepted
    }
}
