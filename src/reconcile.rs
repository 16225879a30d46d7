//! The operations run against a ledger workbook: importing statements, recording a manual
//! entry and undoing an execution.
//!
//! Each operation loads the whole workbook, works on it in memory and saves it once at the
//! end, so a failed operation leaves the files on disk untouched.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::amount::is_within_limit;
use crate::error::{Error, Result};
use crate::execution::{last_execution_id, next_execution_id};
use crate::extract::pdf::{self, PageContent, PDF_ACCOUNT_ID, PDF_BANK_ID};
use crate::extract::{self, synthesized_key, AccountRef, RawTransaction, Statement};
use crate::ledger::{Batch, EntryKind, RowContext, Tally};
use crate::ofx::OfxDocument;
use crate::rollup::{summarize, Summary};
use crate::store::{LedgerStore, LogEntry, StoreConfig, Workbook, MANUAL_SOURCE, STATUS_OK};

const MANUAL_BANK_ID: &str = "MANUAL";
const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceKind {
    Ofx,
    Pdf,
}

impl SourceKind {
    fn of(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "ofx" | "qfx" => Some(Self::Ofx),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }
}

/// A transaction typed in by hand, amount and direction being given separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualEntry {
    pub date: NaiveDate,
    pub direction: EntryKind,
    pub description: String,
    /// Magnitude, signed according to `direction` when recorded
    pub amount: Decimal,
    pub bank_id: Option<String>,
    pub document_number: String,
    pub memo: String,
}

impl ManualEntry {
    fn into_transaction(self) -> Result<RawTransaction> {
        if self.amount <= Decimal::ZERO {
            return Err(Error::InvalidEntry(format!(
                "the amount must be positive, got {}",
                self.amount
            )));
        }
        if !is_within_limit(self.amount) {
            return Err(Error::InvalidEntry(format!(
                "the amount {} is out of range",
                self.amount
            )));
        }
        let amount = match self.direction {
            EntryKind::Credit => self.amount,
            EntryKind::Debit => -self.amount,
        };
        let identity_key = synthesized_key(self.date, &self.document_number, &self.description);
        Ok(RawTransaction {
            date: self.date,
            description: self.description,
            amount,
            document_number: self.document_number,
            memo: self.memo,
            transaction_type: None,
            identity_key: Some(identity_key),
        })
    }
}

/// Outcome of an import or a manual entry: one log entry per source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult {
    pub execution_id: u32,
    pub entries: Vec<LogEntry>,
    pub final_balance: Decimal,
}

impl BatchResult {
    pub fn accepted(&self) -> usize {
        self.entries.iter().map(|entry| entry.accepted).sum()
    }

    pub fn skipped(&self) -> usize {
        self.entries.iter().map(|entry| entry.skipped).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UndoResult {
    pub execution_id: u32,
    pub rows_removed: usize,
}

/// A source document that was read, or the reason it could not be.
pub struct SourceDocument {
    pub name: String,
    pub statement: Result<Statement>,
}

pub struct Reconciler {
    store: LedgerStore,
}

impl Reconciler {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            store: LedgerStore::open(config),
        }
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    /// Imports OFX and PDF files as a single execution.
    ///
    /// Files are read one after another. An OFX file without transactions, or any file whose
    /// content cannot be read, is logged with its error and skipped. The operation fails, and
    /// nothing is written, if no file yielded a single transaction.
    pub fn import_batch(&self, files: &[PathBuf]) -> Result<BatchResult> {
        let kinds = files
            .iter()
            .map(|path| {
                SourceKind::of(path)
                    .map(|kind| (path, kind))
                    .ok_or_else(|| Error::UnsupportedSource(path.clone()))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut documents = Vec::with_capacity(kinds.len());
        for (path, kind) in kinds {
            if !path.is_file() {
                return Err(Error::io(
                    path,
                    std::io::Error::from(std::io::ErrorKind::NotFound),
                ));
            }
            documents.push((path, kind));
        }

        self.import_documents(documents.into_iter().map(|(path, kind)| SourceDocument {
            name: file_name(path),
            statement: read_statement(path, kind),
        }))
    }

    /// Imports already opened documents as a single execution, in iteration order.
    pub fn import_documents(
        &self,
        documents: impl IntoIterator<Item = SourceDocument>,
    ) -> Result<BatchResult> {
        let mut workbook = self.store.load()?;
        let execution_id = next_execution_id(&workbook.ledger);
        let processed_at = now();
        info!("Starting execution {execution_id}");

        let mut entries = Vec::new();
        let mut extracted_any = false;
        let mut batch = Batch::new(&mut workbook.ledger, execution_id);
        for document in documents {
            let statement = match document.statement {
                Ok(statement) => statement,
                Err(
                    err @ (Error::NoTransactionsFound(_) | Error::OfxParse(_) | Error::Pdf { .. }),
                ) => {
                    warn!("{}: {err}", document.name);
                    entries.push(LogEntry {
                        processed_at,
                        source: document.name,
                        bank_id: NOT_AVAILABLE.to_owned(),
                        account_id: NOT_AVAILABLE.to_owned(),
                        execution_id,
                        accepted: 0,
                        skipped: 0,
                        credits: Decimal::ZERO,
                        debits: Decimal::ZERO,
                        final_balance: batch.balance(),
                        status: err.to_string(),
                    });
                    continue;
                }
                Err(err) => return Err(err),
            };

            extracted_any |= !statement.transactions.is_empty();
            let account_type = statement.account.account_type;
            let context = RowContext {
                bank_id: statement.account.bank_id,
                account_id: statement.account.account_id,
                processed_at,
            };
            let mut tally = Tally::default();
            for transaction in statement.transactions {
                if transaction.identity_key.is_none() {
                    warn!(
                        "{}: transaction of {} on {} has no FITID and cannot be deduplicated",
                        document.name, transaction.amount, transaction.date
                    );
                }
                batch.offer(transaction, &context, &mut tally);
            }
            info!(
                "{}: account {}/{} ({account_type}), {} added, {} already recorded",
                document.name, context.bank_id, context.account_id, tally.accepted, tally.skipped
            );
            entries.push(log_entry(
                processed_at,
                document.name,
                &context,
                execution_id,
                tally,
                batch.balance(),
            ));
        }
        let final_balance = batch.balance();

        if !extracted_any {
            return Err(Error::NothingToImport);
        }
        self.commit(workbook, entries, execution_id, final_balance)
    }

    /// Records one manual entry as its own execution.
    pub fn record_manual(&self, entry: ManualEntry) -> Result<BatchResult> {
        let bank_id = entry
            .bank_id
            .clone()
            .filter(|bank_id| !bank_id.trim().is_empty())
            .unwrap_or_else(|| MANUAL_BANK_ID.to_owned());
        let transaction = entry.into_transaction()?;

        let mut workbook = self.store.load()?;
        let execution_id = next_execution_id(&workbook.ledger);
        let context = RowContext {
            bank_id,
            account_id: NOT_AVAILABLE.to_owned(),
            processed_at: now(),
        };
        let mut tally = Tally::default();
        let mut batch = Batch::new(&mut workbook.ledger, execution_id);
        batch.offer(transaction, &context, &mut tally);
        let final_balance = batch.balance();
        info!(
            "Manual entry in execution {execution_id}: {} added, {} already recorded",
            tally.accepted, tally.skipped
        );

        let entry = log_entry(
            context.processed_at,
            MANUAL_SOURCE.to_owned(),
            &context,
            execution_id,
            tally,
            final_balance,
        );
        self.commit(workbook, vec![entry], execution_id, final_balance)
    }

    /// Removes every row of an execution.
    ///
    /// An unknown execution is not an error: it is reported with zero rows removed and the
    /// workbook is left untouched.
    pub fn undo(&self, execution_id: u32) -> Result<UndoResult> {
        let mut workbook = self.store.load()?;
        match crate::execution::undo(&mut workbook.ledger, execution_id) {
            Ok(rows_removed) => {
                workbook.ledger.restamp_running_balances();
                let summary = summarize(workbook.ledger.rows());
                self.store.save(&workbook, &summary)?;
                info!("Execution {execution_id} undone, {rows_removed} rows removed");
                Ok(UndoResult {
                    execution_id,
                    rows_removed,
                })
            }
            Err(err @ Error::ExecutionNotFound(_)) => {
                warn!("{err}");
                Ok(UndoResult {
                    execution_id,
                    rows_removed: 0,
                })
            }
            Err(err) => Err(err),
        }
    }

    /// Undoes the most recent execution, if there is one.
    pub fn undo_last(&self) -> Result<Option<UndoResult>> {
        let workbook = self.store.load()?;
        match last_execution_id(&workbook.ledger) {
            Some(execution_id) => self.undo(execution_id).map(Some),
            None => {
                warn!("The ledger has no execution to undo");
                Ok(None)
            }
        }
    }

    pub fn summary(&self) -> Result<Summary> {
        let workbook = self.store.load()?;
        Ok(summarize(workbook.ledger.rows()))
    }

    fn commit(
        &self,
        mut workbook: Workbook,
        entries: Vec<LogEntry>,
        execution_id: u32,
        final_balance: Decimal,
    ) -> Result<BatchResult> {
        workbook.log.extend(entries.iter().cloned());
        let summary = summarize(workbook.ledger.rows());
        self.store.save(&workbook, &summary)?;
        info!("Execution {execution_id} saved to {:?}", self.store.dir());
        Ok(BatchResult {
            execution_id,
            entries,
            final_balance,
        })
    }
}

fn log_entry(
    processed_at: NaiveDateTime,
    source: String,
    context: &RowContext,
    execution_id: u32,
    tally: Tally,
    final_balance: Decimal,
) -> LogEntry {
    LogEntry {
        processed_at,
        source,
        bank_id: context.bank_id.clone(),
        account_id: context.account_id.clone(),
        execution_id,
        accepted: tally.accepted,
        skipped: tally.skipped,
        credits: tally.credits,
        debits: tally.debits,
        final_balance,
        status: STATUS_OK.to_owned(),
    }
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn read_statement(path: &Path, kind: SourceKind) -> Result<Statement> {
    match kind {
        SourceKind::Ofx => {
            let bytes = fs::read(path).map_err(|err| Error::io(path, err))?;
            let document = OfxDocument::parse(&String::from_utf8_lossy(&bytes))?;
            extract::ofx::extract(&document, &file_name(path))
        }
        SourceKind::Pdf => Ok(pdf_statement(&pdf::read_pages(path)?)),
    }
}

/// Statement of a PDF extract, which never identifies its account.
pub fn pdf_statement(pages: &[PageContent]) -> Statement {
    Statement {
        account: AccountRef {
            bank_id: PDF_BANK_ID.to_owned(),
            account_id: PDF_ACCOUNT_ID.to_owned(),
            account_type: NOT_AVAILABLE.to_owned(),
        },
        transactions: pdf::extract(pages)
            .into_iter()
            .map(RawTransaction::from)
            .collect(),
    }
}
