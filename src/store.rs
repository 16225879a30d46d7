//! The ledger workbook: a directory holding one CSV file per sheet.
//!
//! * `extrato.csv`: the ledger rows
//! * `log.csv`: one line per imported file or manual entry
//! * `bancos.csv`: latest balance per account, rebuilt on every save
//!
//! The whole workbook is loaded at the start of an operation and written back in full at the
//! end. Every sheet is first written next to its destination and only renamed into place once
//! all of them were written successfully.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use csv::WriterBuilder;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::ledger::{Ledger, LedgerRow};
use crate::rollup::Summary;

const LEDGER_FILE: &str = "extrato.csv";
const LOG_FILE: &str = "log.csv";
const SUMMARY_FILE: &str = "bancos.csv";
const TEMPORARY_EXTENSION: &str = "tmp";

const LEDGER_HEADER: [&str; 13] = [
    "Data",
    "Tipo (Entrada/Saída)",
    "Descrição",
    "Valor (R$)",
    "Saldo acumulado (R$)",
    "Banco ID",
    "Conta",
    "Processado em",
    "Execução",
    "TRNTYPE",
    "Nr. Documento",
    "MEMO",
    "FITID",
];

const LOG_HEADER: [&str; 11] = [
    "Data Processamento",
    "Arquivo",
    "Banco",
    "Conta",
    "Execução",
    "Adicionados",
    "Ignorados",
    "Entradas (R$)",
    "Saídas (R$)",
    "Saldo Final (R$)",
    "Status",
];

const SUMMARY_HEADER: [&str; 3] = ["Banco", "Conta", "Saldo Final"];

pub const MANUAL_SOURCE: &str = "MANUAL";
pub const STATUS_OK: &str = "OK";

/// Where the workbook lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub dir: PathBuf,
}

/// Audit record of one imported file or manual entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(rename = "Data Processamento", with = "timestamp_format")]
    pub processed_at: NaiveDateTime,
    #[serde(rename = "Arquivo")]
    pub source: String,
    #[serde(rename = "Banco")]
    pub bank_id: String,
    #[serde(rename = "Conta")]
    pub account_id: String,
    #[serde(rename = "Execução", deserialize_with = "lenient_execution")]
    pub execution_id: u32,
    #[serde(rename = "Adicionados")]
    pub accepted: usize,
    #[serde(rename = "Ignorados")]
    pub skipped: usize,
    #[serde(rename = "Entradas (R$)", with = "rust_decimal::serde::str")]
    pub credits: Decimal,
    #[serde(rename = "Saídas (R$)", with = "rust_decimal::serde::str")]
    pub debits: Decimal,
    #[serde(rename = "Saldo Final (R$)", with = "rust_decimal::serde::str")]
    pub final_balance: Decimal,
    #[serde(rename = "Status")]
    pub status: String,
}

/// In-memory copy of every sheet that carries state of its own.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Workbook {
    pub ledger: Ledger,
    pub log: Vec<LogEntry>,
}

#[derive(Debug, Clone)]
pub struct LedgerStore {
    dir: PathBuf,
}

impl LedgerStore {
    pub fn open(config: &StoreConfig) -> Self {
        Self {
            dir: config.dir.clone(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.dir.join(LEDGER_FILE)
    }

    pub fn summary_path(&self) -> PathBuf {
        self.dir.join(SUMMARY_FILE)
    }

    pub fn log_path(&self) -> PathBuf {
        self.dir.join(LOG_FILE)
    }

    pub fn exists(&self) -> bool {
        self.ledger_path().is_file()
    }

    /// Loads the workbook, which is empty when nothing was saved yet.
    pub fn load(&self) -> Result<Workbook> {
        let ledger = Ledger::new(read_sheet(&self.ledger_path())?);
        let log = read_sheet(&self.log_path())?;
        debug!(
            "Loaded {} ledger rows and {} log entries from {:?}",
            ledger.rows().len(),
            log.len(),
            self.dir
        );
        Ok(Workbook { ledger, log })
    }

    /// Writes every sheet, the summary being derived from the ledger by the caller.
    pub fn save(&self, workbook: &Workbook, summary: &Summary) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|err| Error::io(&self.dir, err))?;

        // Renamed in this order, the ledger last: it stays the previous one if anything fails
        let sheets = [
            (self.log_path(), write_sheet(&LOG_HEADER, &workbook.log)?),
            (
                self.summary_path(),
                write_sheet(&SUMMARY_HEADER, &summary.rows().collect::<Vec<_>>())?,
            ),
            (
                self.ledger_path(),
                write_sheet(&LEDGER_HEADER, workbook.ledger.rows())?,
            ),
        ];

        let mut staged = Vec::with_capacity(sheets.len());
        for (path, content) in sheets {
            let temporary = path.with_extension(TEMPORARY_EXTENSION);
            if let Err(err) = fs::write(&temporary, content) {
                discard(&staged);
                return Err(Error::io(&temporary, err));
            }
            staged.push((temporary, path));
        }
        for (position, (temporary, path)) in staged.iter().enumerate() {
            if let Err(err) = fs::rename(temporary, path) {
                discard(&staged[position..]);
                return Err(Error::io(path, err));
            }
        }
        debug!("Saved workbook to {:?}", self.dir);
        Ok(())
    }
}

/// Removes sheets that were written but will not be renamed into place.
fn discard(staged: &[(PathBuf, PathBuf)]) {
    for (temporary, _) in staged {
        if let Err(err) = fs::remove_file(temporary) {
            warn!("Could not remove {temporary:?}: {err}");
        }
    }
}

fn read_sheet<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Vec<T>> {
    if !path.is_file() {
        return Ok(Vec::new());
    }
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)?;
    let mut records = Vec::new();
    for record in reader.deserialize() {
        records.push(record?);
    }
    Ok(records)
}

fn write_sheet<T: Serialize>(header: &[&str], records: &[T]) -> Result<Vec<u8>> {
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(header)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer
        .into_inner()
        .map_err(|err| Error::Csv(err.into_error().into()))
}

pub(crate) mod date_format {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::ledger::DATE_FORMAT;

    const ISO_DATE_FORMAT: &str = "%Y-%m-%d";

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&date.format(DATE_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let raw = raw.trim();
        NaiveDate::parse_from_str(raw, DATE_FORMAT)
            .or_else(|_| NaiveDate::parse_from_str(raw, ISO_DATE_FORMAT))
            .map_err(|err| serde::de::Error::custom(format!("invalid date '{raw}': {err}")))
    }
}

pub(crate) mod timestamp_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::ledger::TIMESTAMP_FORMAT;

    pub fn serialize<S: Serializer>(
        timestamp: &NaiveDateTime,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&timestamp.format(TIMESTAMP_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT).map_err(|err| {
            serde::de::Error::custom(format!("invalid timestamp '{raw}': {err}"))
        })
    }
}

/// Older ledgers used this column for the account, so anything unreadable becomes `None`.
pub(crate) mod optional_timestamp_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::ledger::TIMESTAMP_FORMAT;

    pub fn serialize<S: Serializer>(
        timestamp: &Option<NaiveDateTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match timestamp {
            Some(timestamp) => serializer.collect_str(&timestamp.format(TIMESTAMP_FORMAT)),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<NaiveDateTime>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT).ok())
    }
}

/// Execution numbers of older ledgers may be labels (`PDF-IMPORT`); those load as 0.
pub(crate) fn lenient_execution<'de, D: serde::Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<u32, D::Error> {
    use rust_decimal::prelude::ToPrimitive;

    let raw = String::deserialize(deserializer)?;
    Ok(raw
        .trim()
        .parse::<Decimal>()
        .ok()
        .filter(|value| value.fract().is_zero())
        .and_then(|value| value.to_u32())
        .unwrap_or(0))
}

#[cfg(test)]
mod test {
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    use helpers::*;

    use super::*;
    use crate::ledger::EntryKind;
    use crate::rollup::summarize;

    #[test]
    fn should_load_an_empty_workbook_when_nothing_was_saved() {
        let dir = tempfile::tempdir().expect("temporary directory");
        let store = store_in(dir.path());
        assert!(!store.exists());
        assert_eq!(Workbook::default(), store.load().expect("workbook"));
    }

    #[test]
    fn should_save_and_load_the_workbook() {
        let dir = tempfile::tempdir().expect("temporary directory");
        let store = store_in(&dir.path().join("nested"));
        let workbook = Workbook {
            ledger: Ledger::new(vec![row()]),
            log: vec![log_entry()],
        };
        store
            .save(&workbook, &summarize(workbook.ledger.rows()))
            .expect("save");

        assert!(store.exists());
        assert_eq!(workbook, store.load().expect("workbook"));

        let summary = fs::read_to_string(store.summary_path()).expect("summary");
        assert_eq!(
            "Banco,Conta,Saldo Final\nCEF,N/A,-1234.56\nTOTAL GERAL,,-1234.56\n",
            summary
        );
        let ledger = fs::read_to_string(store.ledger_path()).expect("ledger");
        assert_eq!(
            Some("02/01/2024,Saída,PAG BOLETO,-1234.56,-1234.56,CEF,N/A,03/01/2024 10:11:12,4,DEBIT,000123,PAG BOLETO,02/01/2024-000123-PAG BOLETO"),
            ledger.lines().nth(1)
        );
    }

    #[test]
    fn should_write_the_header_of_an_empty_ledger() {
        let dir = tempfile::tempdir().expect("temporary directory");
        let store = store_in(dir.path());
        store
            .save(&Workbook::default(), &Summary::default())
            .expect("save");
        let ledger = fs::read_to_string(store.ledger_path()).expect("ledger");
        assert_eq!(format!("{}\n", LEDGER_HEADER.join(",")), ledger);
        assert!(store.load().expect("workbook").ledger.is_empty());
    }

    #[test]
    fn should_keep_the_old_ledger_and_no_temporary_file_when_a_rename_fails() {
        let dir = tempfile::tempdir().expect("temporary directory");
        let store = store_in(dir.path());
        fs::create_dir(store.ledger_path()).expect("ledger path taken by a directory");
        fs::write(store.ledger_path().join("keep"), "").expect("directory content");

        let workbook = Workbook {
            ledger: Ledger::new(vec![row()]),
            log: vec![log_entry()],
        };
        let result = store.save(&workbook, &summarize(workbook.ledger.rows()));
        assert!(matches!(result, Err(Error::Io { path, .. }) if path == store.ledger_path()));
        assert!(store.ledger_path().join("keep").is_file());
        assert_eq!(Vec::<String>::new(), temporary_files(dir.path()));
    }

    #[test]
    fn should_leave_no_temporary_file_when_a_sheet_cannot_be_written() {
        let dir = tempfile::tempdir().expect("temporary directory");
        let store = store_in(dir.path());
        fs::create_dir(dir.path().join("bancos.tmp")).expect("summary staging path taken");

        let result = store.save(&Workbook::default(), &Summary::default());
        assert!(matches!(result, Err(Error::Io { .. })));
        assert!(!dir.path().join("log.tmp").exists());
        assert!(!store.log_path().exists());
        assert!(!store.exists());
    }

    #[test]
    fn should_accept_older_ledger_layouts() {
        let dir = tempfile::tempdir().expect("temporary directory");
        let store = store_in(dir.path());
        fs::write(
            store.ledger_path(),
            "Data,Tipo (Entrada/Saída),Descrição,Valor (R$),Saldo acumulado (R$),Banco ID,Processado em,Execução,TRNTYPE,MEMO\n\
             02/01/2024,Entrada,PIX,10.5,10.5,CEF,01/02/2024 08:00:00,PDF-IMPORT,CREDIT,123\n\
             2024-01-03,Saída,TARIFA,-0.5,10,CEF,not a date,2,DEBIT,\n",
        )
        .expect("legacy ledger");

        let rows = store.load().expect("workbook").ledger.rows().to_vec();
        assert_eq!(2, rows.len());
        assert_eq!("N/A", rows[0].account_id);
        assert_eq!(0, rows[0].execution_id);
        assert_eq!(
            NaiveDate::from_ymd_opt(2024, 2, 1).and_then(|d| d.and_hms_opt(8, 0, 0)),
            rows[0].processed_at
        );
        assert_eq!("", rows[0].identity_key);
        assert_eq!(EntryKind::Debit, rows[1].kind);
        assert_eq!(NaiveDate::from_ymd_opt(2024, 1, 3), Some(rows[1].date));
        assert_eq!(None, rows[1].processed_at);
        assert_eq!(2, rows[1].execution_id);
        assert_eq!(dec!(10), rows[1].running_balance);
    }

    mod helpers {
        use chrono::NaiveDate;
        use rust_decimal_macros::dec;

        use super::super::*;
        use crate::ledger::EntryKind;

        pub(super) fn temporary_files(dir: &Path) -> Vec<String> {
            fs::read_dir(dir)
                .expect("directory listing")
                .map(|entry| entry.expect("directory entry").path())
                .filter(|path| {
                    path.extension()
                        .is_some_and(|extension| extension == TEMPORARY_EXTENSION)
                })
                .map(|path| path.display().to_string())
                .collect()
        }

        pub(super) fn store_in(dir: &Path) -> LedgerStore {
            LedgerStore::open(&StoreConfig {
                dir: dir.to_path_buf(),
            })
        }

        fn timestamp() -> NaiveDateTime {
            NaiveDate::from_ymd_opt(2024, 1, 3)
                .and_then(|date| date.and_hms_opt(10, 11, 12))
                .expect("valid timestamp")
        }

        pub(super) fn row() -> LedgerRow {
            LedgerRow {
                date: NaiveDate::from_ymd_opt(2024, 1, 2).expect("valid date"),
                kind: EntryKind::Debit,
                description: "PAG BOLETO".to_owned(),
                amount: dec!(-1234.56),
                running_balance: dec!(-1234.56),
                bank_id: "CEF".to_owned(),
                account_id: "N/A".to_owned(),
                processed_at: Some(timestamp()),
                execution_id: 4,
                transaction_type: "DEBIT".to_owned(),
                document_number: "000123".to_owned(),
                memo: "PAG BOLETO".to_owned(),
                identity_key: "02/01/2024-000123-PAG BOLETO".to_owned(),
            }
        }

        pub(super) fn log_entry() -> LogEntry {
            LogEntry {
                processed_at: timestamp(),
                source: "extrato.pdf".to_owned(),
                bank_id: "CEF".to_owned(),
                account_id: "N/A".to_owned(),
                execution_id: 4,
                accepted: 1,
                skipped: 0,
                credits: Decimal::ZERO,
                debits: dec!(-1234.56),
                final_balance: dec!(-1234.56),
                status: STATUS_OK.to_owned(),
            }
        }
    }
}
