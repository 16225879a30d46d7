//! Conversion of PDF statements into OFX 1.02 (SGML) files, for tools that only read OFX.

use std::fs;
use std::path::Path;

use chrono::{Local, NaiveDateTime};
use tracing::info;

use crate::error::{Error, Result};
use crate::extract::pdf::{self, PageContent, StatementLine, PDF_ACCOUNT_ID, PDF_BANK_ID};
use crate::extract::synthesized_key;
use crate::ledger::EntryKind;
use crate::reconcile::file_name;

const HEADER: &str = "OFXHEADER:100\n\
    DATA:OFXSGML\n\
    VERSION:102\n\
    SECURITY:NONE\n\
    ENCODING:USASCII\n\
    CHARSET:1252\n\
    COMPRESSION:NONE\n\
    OLDFILEUID:NONE\n\
    NEWFILEUID:NONE\n";

const SERVER_TIME_FORMAT: &str = "%Y%m%d%H%M%S";
const POSTED_DATE_FORMAT: &str = "%Y%m%d";

/// Converts the PDF statement `pdf` into an OFX file and returns the number of transactions
/// written.
pub fn export_ofx(pdf: &Path, output: &Path) -> Result<usize> {
    let pages = pdf::read_pages(pdf)?;
    write_ofx(&pages, output, &file_name(pdf), Local::now().naive_local())
}

/// Writes the statement lines of `pages` to `output`, `source` naming the pages in errors.
pub fn write_ofx(
    pages: &[PageContent],
    output: &Path,
    source: &str,
    generated_at: NaiveDateTime,
) -> Result<usize> {
    let lines = pdf::extract(pages);
    if lines.is_empty() {
        return Err(Error::NoTransactionsFound(source.to_owned()));
    }
    fs::write(output, render(&lines, generated_at)).map_err(|err| Error::io(output, err))?;
    info!("{source}: {} transactions written to {output:?}", lines.len());
    Ok(lines.len())
}

/// Lays the lines out as a checking account statement.
///
/// The `FITID` of every transaction is the identity key an import of the PDF itself would
/// give it, so importing both never records a line twice.
pub fn render(lines: &[StatementLine], generated_at: NaiveDateTime) -> String {
    let transactions: String = lines.iter().map(render_transaction).collect();
    format!(
        "{HEADER}\n\
         <OFX>\n\
         <SIGNONMSGSRSV1>\n\
         <SONRS>\n\
         <STATUS><CODE>0</CODE><SEVERITY>INFO</SEVERITY></STATUS>\n\
         <DTSERVER>{server_time}</DTSERVER>\n\
         <LANGUAGE>POR</LANGUAGE>\n\
         </SONRS>\n\
         </SIGNONMSGSRSV1>\n\
         <BANKMSGSRSV1>\n\
         <STMTTRNRS>\n\
         <TRNUID>1</TRNUID>\n\
         <STATUS><CODE>0</CODE><SEVERITY>INFO</SEVERITY></STATUS>\n\
         <STMTRS>\n\
         <CURDEF>BRL</CURDEF>\n\
         <BANKACCTFROM>\n\
         <BANKID>{PDF_BANK_ID}</BANKID>\n\
         <ACCTID>{PDF_ACCOUNT_ID}</ACCTID>\n\
         <ACCTTYPE>CHECKING</ACCTTYPE>\n\
         </BANKACCTFROM>\n\
         <BANKTRANLIST>\n\
         {transactions}\
         </BANKTRANLIST>\n\
         </STMTRS>\n\
         </STMTTRNRS>\n\
         </BANKMSGSRSV1>\n\
         </OFX>\n",
        server_time = generated_at.format(SERVER_TIME_FORMAT),
    )
}

fn render_transaction(line: &StatementLine) -> String {
    let identity_key = synthesized_key(line.date, &line.document_number, &line.description);
    format!(
        "<STMTTRN>\n\
         <TRNTYPE>{}</TRNTYPE>\n\
         <DTPOSTED>{}</DTPOSTED>\n\
         <TRNAMT>{:.2}</TRNAMT>\n\
         <FITID>{}</FITID>\n\
         <NAME>{}</NAME>\n\
         </STMTTRN>\n",
        EntryKind::of(line.amount).transaction_type(),
        line.date.format(POSTED_DATE_FORMAT),
        line.amount,
        escape(&identity_key),
        escape(&line.description),
    )
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
