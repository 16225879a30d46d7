//! Consolidation of CSV sales reports into a single file ordered by sale date.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, TimeDelta};
use csv::StringRecord;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::info;

use crate::error::{Error, Result};
use crate::ledger::DATE_FORMAT;

pub const SALE_DATE_COLUMN: &str = "Data de Venda";

/// Reports store the sale date as a number of days since this date
const SERIAL_EPOCH: (i32, u32, u32) = (1900, 1, 1);

/// Merges every `.csv` file of `dir` into `output` and returns the number of rows written.
///
/// All reports must share the same header. Rows keep their file order for equal dates.
pub fn merge_sales(dir: &Path, output: &Path) -> Result<usize> {
    let reports = list_reports(dir, output)?;
    let Some(first) = reports.first() else {
        return Err(Error::SalesFormat {
            path: dir.to_path_buf(),
            message: "no CSV report found".to_owned(),
        });
    };
    info!("Merging {} sales reports from {dir:?}", reports.len());

    let header = csv::Reader::from_path(first)?.headers()?.clone();
    let date_column = header
        .iter()
        .position(|name| name.trim() == SALE_DATE_COLUMN)
        .ok_or_else(|| Error::SalesFormat {
            path: first.clone(),
            message: format!("no '{SALE_DATE_COLUMN}' column"),
        })?;

    let mut rows: Vec<(NaiveDate, StringRecord)> = Vec::new();
    for report in &reports {
        let mut reader = csv::Reader::from_path(report)?;
        if reader.headers()? != &header {
            return Err(Error::SalesFormat {
                path: report.clone(),
                message: "header differs from the other reports".to_owned(),
            });
        }
        for record in reader.records() {
            let record = record?;
            let raw = record.get(date_column).unwrap_or_default();
            let date = parse_sale_date(raw).ok_or_else(|| Error::SalesFormat {
                path: report.clone(),
                message: format!("invalid sale date '{raw}'"),
            })?;
            let record: StringRecord = record
                .iter()
                .enumerate()
                .map(|(index, cell)| {
                    if index == date_column {
                        date.format(DATE_FORMAT).to_string()
                    } else {
                        cell.to_owned()
                    }
                })
                .collect();
            rows.push((date, record));
        }
    }
    rows.sort_by_key(|(date, _)| *date);

    let mut writer = csv::Writer::from_path(output)?;
    writer.write_record(&header)?;
    for (_, record) in &rows {
        writer.write_record(record)?;
    }
    writer.flush().map_err(|err| Error::io(output, err))?;
    info!("Wrote {} sales rows to {output:?}", rows.len());
    Ok(rows.len())
}

fn list_reports(dir: &Path, output: &Path) -> Result<Vec<PathBuf>> {
    let mut reports = Vec::new();
    for entry in fs::read_dir(dir).map_err(|err| Error::io(dir, err))? {
        let path = entry.map_err(|err| Error::io(dir, err))?.path();
        let is_csv = path
            .extension()
            .is_some_and(|extension| extension.eq_ignore_ascii_case("csv"));
        if is_csv && path.is_file() && path != output {
            reports.push(path);
        }
    }
    reports.sort();
    Ok(reports)
}

/// A day count since 1900-01-01, or an already formatted date.
fn parse_sale_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(serial) = raw.parse::<Decimal>() {
        let (year, month, day) = SERIAL_EPOCH;
        let days = TimeDelta::try_days(serial.trunc().to_i64()?)?;
        return NaiveDate::from_ymd_opt(year, month, day)?.checked_add_signed(days);
    }
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .ok()
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    fn date(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(year, month, day)
    }

    #[test]
    fn should_convert_day_serials() {
        assert_eq!(date(1900, 1, 1), parse_sale_date("0"));
        assert_eq!(date(2023, 3, 17), parse_sale_date("45000"));
        assert_eq!(date(2023, 3, 17), parse_sale_date(" 45000.75 "));
    }

    #[test]
    fn should_accept_formatted_dates() {
        assert_eq!(date(2024, 1, 31), parse_sale_date("31/01/2024"));
        assert_eq!(date(2024, 1, 31), parse_sale_date("2024-01-31"));
        assert_eq!(None, parse_sale_date("yesterday"));
    }

    #[test]
    fn should_merge_reports_ordered_by_sale_date() {
        let dir = tempfile::tempdir().expect("temporary directory");
        let bases = dir.path().join("bases");
        fs::create_dir(&bases).expect("bases");
        fs::write(
            bases.join("loja1.csv"),
            "Produto,Data de Venda,Valor\nCaneta,45002,3.50\nLapis,45000,1.20\n",
        )
        .expect("report");
        fs::write(
            bases.join("loja2.csv"),
            "Produto,Data de Venda,Valor\nCaderno,45001,12.00\nBorracha,45000,0.80\n",
        )
        .expect("report");
        fs::write(bases.join("leia-me.txt"), "not a report").expect("notes");

        let output = dir.path().join("Vendas.csv");
        assert_eq!(4, merge_sales(&bases, &output).expect("merge"));
        assert_eq!(
            "Produto,Data de Venda,Valor\n\
             Lapis,17/03/2023,1.20\n\
             Borracha,17/03/2023,0.80\n\
             Caderno,18/03/2023,12.00\n\
             Caneta,19/03/2023,3.50\n",
            fs::read_to_string(output).expect("output")
        );
    }

    #[test]
    fn should_reject_reports_with_different_headers() {
        let dir = tempfile::tempdir().expect("temporary directory");
        fs::write(dir.path().join("a.csv"), "Produto,Data de Venda\nX,1\n").expect("report");
        fs::write(dir.path().join("b.csv"), "Data de Venda,Produto\n1,Y\n").expect("report");
        let result = merge_sales(dir.path(), &dir.path().join("out.csv"));
        assert!(matches!(result, Err(Error::SalesFormat { .. })));
    }

    #[test]
    fn should_fail_without_reports() {
        let dir = tempfile::tempdir().expect("temporary directory");
        let result = merge_sales(dir.path(), &dir.path().join("out.csv"));
        assert!(matches!(result, Err(Error::SalesFormat { .. })));
    }
}
