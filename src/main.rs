#![warn(clippy::unwrap_used)]

use std::path::PathBuf;

use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::Context;
use color_eyre::Result;
use extrato::ledger::{EntryKind, DATE_FORMAT};
use extrato::rollup::Summary;
use extrato::{logging, BatchResult, ManualEntry, Reconciler, StoreConfig};
use rust_decimal::Decimal;

/// Imports OFX and PDF bank statements into a deduplicated CSV ledger
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// Directory holding the ledger, its log and the per-account summary
    #[arg(long, env = "EXTRATO_STORE", default_value = "extrato", global = true)]
    store: PathBuf,
    /// File every operation is logged to
    #[arg(
        long,
        env = "EXTRATO_LOG_FILE",
        default_value = "processamento_ofx.log",
        global = true
    )]
    log_file: PathBuf,
    /// Logs every skipped transaction
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Imports OFX and PDF statements as a single execution
    Import {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Records a transaction typed in by hand
    Manual {
        /// Transaction date (dd/mm/yyyy), today if omitted
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,
        #[arg(long, value_enum)]
        direction: Direction,
        #[arg(long)]
        description: String,
        /// Amount without sign, `1234.56` or `1.234,56`
        #[arg(long, value_parser = parse_magnitude)]
        amount: Decimal,
        /// Bank identifier, `MANUAL` if omitted
        #[arg(long)]
        bank: Option<String>,
        #[arg(long, default_value = "")]
        document: String,
        #[arg(long, default_value = "")]
        memo: String,
    },
    /// Removes every row of an execution
    Undo {
        #[arg(
            required_unless_present = "last",
            value_parser = clap::value_parser!(u32).range(1..)
        )]
        execution: Option<u32>,
        /// Undoes the most recent execution
        #[arg(long, conflicts_with = "execution")]
        last: bool,
    },
    /// Prints the latest balance of every account
    Summary,
    /// Merges the CSV sales reports of a directory into one file ordered by sale date
    MergeSales { dir: PathBuf, output: PathBuf },
    /// Converts a PDF statement into an OFX file
    ExportOfx { pdf: PathBuf, output: PathBuf },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Direction {
    #[value(alias = "credit")]
    Entrada,
    #[value(alias = "saída", alias = "debit")]
    Saida,
}

impl From<Direction> for EntryKind {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Entrada => Self::Credit,
            Direction::Saida => Self::Debit,
        }
    }
}

fn parse_date(raw: &str) -> std::result::Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|err| format!("expected a dd/mm/yyyy date: {err}"))
}

fn parse_magnitude(raw: &str) -> std::result::Result<Decimal, String> {
    let normalized = if raw.contains(',') {
        raw.replace('.', "").replace(',', ".")
    } else {
        raw.to_owned()
    };
    normalized
        .trim()
        .parse::<Decimal>()
        .map_err(|err| format!("invalid amount '{raw}': {err}"))
}

fn print_batch(result: &BatchResult) {
    println!("Execution {}", result.execution_id);
    for entry in &result.entries {
        println!(
            "  {} ({} / {}): {} added, {} skipped, {}",
            entry.source, entry.bank_id, entry.account_id, entry.accepted, entry.skipped, entry.status
        );
    }
    println!(
        "Added: {}, skipped: {}, final balance: {:.2}",
        result.accepted(),
        result.skipped(),
        result.final_balance
    );
}

fn print_summary(summary: &Summary) {
    for account in summary.rows() {
        println!(
            "{:<16} {:<20} {:>16.2}",
            account.bank_id, account.account_id, account.balance
        );
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let Args {
        store,
        log_file,
        verbose,
        command,
    } = Args::parse();
    logging::init(&log_file, if verbose { "debug" } else { "info" })?;

    let reconciler = Reconciler::new(&StoreConfig { dir: store });
    let store_dir = reconciler.store().dir().to_path_buf();
    match command {
        Command::Import { files } => {
            let result = reconciler
                .import_batch(&files)
                .with_context(|| format!("Could not import {files:?} into {store_dir:?}"))?;
            print_batch(&result);
        }
        Command::Manual {
            date,
            direction,
            description,
            amount,
            bank,
            document,
            memo,
        } => {
            let entry = ManualEntry {
                date: date.unwrap_or_else(|| Local::now().date_naive()),
                direction: direction.into(),
                description,
                amount,
                bank_id: bank,
                document_number: document,
                memo,
            };
            let result = reconciler
                .record_manual(entry)
                .with_context(|| format!("Could not record the entry into {store_dir:?}"))?;
            print_batch(&result);
        }
        Command::Undo { execution, .. } => {
            let result = match execution {
                Some(execution) => reconciler.undo(execution).map(Some),
                None => reconciler.undo_last(),
            };
            match result.context("Could not undo the execution")? {
                Some(undone) if undone.rows_removed > 0 => println!(
                    "Execution {} undone ({} rows removed)",
                    undone.execution_id, undone.rows_removed
                ),
                Some(undone) => println!("No rows found for execution {}", undone.execution_id),
                None => println!("The ledger has no execution to undo"),
            }
        }
        Command::Summary => {
            let summary = reconciler
                .summary()
                .with_context(|| format!("Could not read the ledger in {store_dir:?}"))?;
            print_summary(&summary);
        }
        Command::MergeSales { dir, output } => {
            let rows = extrato::sales::merge_sales(&dir, &output)
                .with_context(|| format!("Could not merge the sales reports of {dir:?}"))?;
            println!("{rows} sales rows written to {output:?}");
        }
        Command::ExportOfx { pdf, output } => {
            let transactions = extrato::export::export_ofx(&pdf, &output)
                .with_context(|| format!("Could not convert {pdf:?} to OFX"))?;
            println!("{transactions} transactions written to {output:?}");
        }
    }
    Ok(())
}
