use std::path::Path;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::{Captures, Regex};
use rust_decimal::Decimal;
use tracing::debug;

use super::{synthesized_key, RawTransaction};
use crate::amount::parse_amount;
use crate::error::{Error, Result};
use crate::ledger::DATE_FORMAT;

/// Bank and account assigned to PDF imports, whose extracts do not identify the account
pub const PDF_BANK_ID: &str = "CEF";
pub const PDF_ACCOUNT_ID: &str = "N/A";

const DATE_FIELD: &str = "date";
const DOCUMENT_FIELD: &str = "document";
const DESCRIPTION_FIELD: &str = "description";
const AMOUNT_FIELD: &str = "amount";
const BALANCE_FIELD: &str = "balance";

const TABLE_COLUMNS: usize = 5;

/// Content of one PDF page, as produced by whatever extracted it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageContent {
    /// Table grid detected on the page, first row being the header
    pub table: Option<Vec<Vec<String>>>,
    pub text: Option<String>,
}

impl PageContent {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            table: None,
            text: Some(text.into()),
        }
    }
}

/// One statement line: `Data | Nr. Documento | Histórico | Valor | Saldo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementLine {
    pub date: NaiveDate,
    pub document_number: String,
    pub description: String,
    pub amount: Decimal,
    pub balance: Decimal,
}

impl From<StatementLine> for RawTransaction {
    fn from(line: StatementLine) -> Self {
        let identity_key = synthesized_key(line.date, &line.document_number, &line.description);
        Self {
            date: line.date,
            memo: line.description.clone(),
            description: line.description,
            amount: line.amount,
            document_number: line.document_number,
            transaction_type: None,
            identity_key: Some(identity_key),
        }
    }
}

/// Reads the text of every page of a PDF statement.
///
/// The text extractor does not detect table grids, so every page goes through the line-based
/// fallback of [`extract`].
pub fn read_pages(path: &Path) -> Result<Vec<PageContent>> {
    let bytes = std::fs::read(path).map_err(|err| Error::io(path, err))?;
    let pages =
        pdf_extract::extract_text_from_mem_by_pages(&bytes).map_err(|err| Error::Pdf {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
    Ok(pages.into_iter().map(PageContent::from_text).collect())
}

/// Extracts the statement lines of every page.
///
/// A page with a table grid is read cell by cell, anything else line by line. Rows and lines
/// that do not look like a statement line (headers, footers, page breaks) are dropped.
pub fn extract(pages: &[PageContent]) -> Vec<StatementLine> {
    let mut lines = Vec::new();
    for (index, page) in pages.iter().enumerate() {
        match (&page.table, &page.text) {
            (Some(table), _) if !table.is_empty() => {
                lines.extend(table.iter().skip(1).filter_map(|row| parse_table_row(row)));
            }
            (_, Some(text)) => lines.extend(text.lines().statement_lines()),
            _ => debug!("Page {} has neither a table nor text", index + 1),
        }
    }
    lines
}

fn parse_table_row(row: &[String]) -> Option<StatementLine> {
    let [date, document_number, description, amount, balance] = row.get(..TABLE_COLUMNS)? else {
        return None;
    };
    let Ok(date) = NaiveDate::parse_from_str(date.trim(), DATE_FORMAT) else {
        debug!("Dropping table row without a date: {row:?}");
        return None;
    };
    Some(StatementLine {
        date,
        document_number: document_number.trim().to_owned(),
        description: description.trim().to_owned(),
        amount: parse_amount(amount),
        balance: parse_amount(balance),
    })
}

fn try_parse_line(line: &str) -> Option<StatementLine> {
    static LINE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(&format!(
            r"(?x)
            ^
            (?P<{DATE_FIELD}>\d{{2}}/\d{{2}}/\d{{4}})
            \s+
            (?P<{DOCUMENT_FIELD}>\S+)?
            \s+
            (?P<{DESCRIPTION_FIELD}>.*?)
            \s+
            (?P<{AMOUNT_FIELD}>[\d.,]+\x20[CD])
            \s+
            (?P<{BALANCE_FIELD}>[\d.,]+\x20[CD])
            "
        ))
        .expect("regex")
    });

    let groups = LINE_REGEX.captures(line)?;
    let date = parse_date(&groups)?;
    Some(StatementLine {
        date,
        document_number: groups
            .name(DOCUMENT_FIELD)
            .map(|document| document.as_str().to_owned())
            .unwrap_or_default(),
        description: groups[DESCRIPTION_FIELD].trim().to_owned(),
        amount: parse_amount(&groups[AMOUNT_FIELD]),
        balance: parse_amount(&groups[BALANCE_FIELD]),
    })
}

fn parse_date(groups: &Captures<'_>) -> Option<NaiveDate> {
    let raw = &groups[DATE_FIELD];
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .inspect_err(|err| debug!("Dropping line with invalid date '{raw}': {err}"))
        .ok()
}

/// Iterator which keeps the statement lines of a page of text and silently drops the rest
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct StatementLineParser<I> {
    iter: I,
}

impl<'a, I: Iterator<Item = &'a str>> Iterator for StatementLineParser<I> {
    type Item = StatementLine;

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.by_ref().find_map(try_parse_line)
    }
}

pub trait IteratorExt {
    fn statement_lines(self) -> StatementLineParser<Self>
    where
        Self: Sized;
}

impl<'a, I: Iterator<Item = &'a str>> IteratorExt for I {
    fn statement_lines(self) -> StatementLineParser<I> {
        StatementLineParser { iter: self }
    }
}
