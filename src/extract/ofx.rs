use chrono::NaiveDate;
use tracing::{debug, warn};

use super::{AccountRef, RawTransaction, Statement};
use crate::amount::parse_plain_amount;
use crate::error::{Error, Result};
use crate::ofx::{OfxDocument, OfxElement};

/// An optional OFX field together with the value used when an institution leaves it out.
struct Field {
    tag: &'static str,
    default: &'static str,
}

impl Field {
    const fn new(tag: &'static str, default: &'static str) -> Self {
        Self { tag, default }
    }

    fn read(&self, element: Option<&OfxElement>) -> String {
        element
            .and_then(|element| element.text_of(self.tag))
            .unwrap_or(self.default)
            .to_owned()
    }
}

const BANK_ID: Field = Field::new("BANKID", "N/A");
const ACCOUNT_ID: Field = Field::new("ACCTID", "N/A");
const ACCOUNT_TYPE: Field = Field::new("ACCTTYPE", "N/A");
const NAME: Field = Field::new("NAME", "Sem descrição");
const TRANSACTION_TYPE: Field = Field::new("TRNTYPE", "N/A");
const MEMO: Field = Field::new("MEMO", "");
const AMOUNT: Field = Field::new("TRNAMT", "");

const BANK_STATEMENT: &[&str] = &["BANKMSGSRSV1", "STMTTRNRS", "STMTRS"];
const CREDIT_CARD_STATEMENT: &[&str] = &["CREDITCARDMSGSRSV1", "CCSTMTTRNRS", "CCSTMTRS"];

/// Locates the transaction list of a banking statement, falling back on a credit card one.
///
/// `source` only names the document in errors.
pub fn extract(document: &OfxDocument, source: &str) -> Result<Statement> {
    let candidates = [
        (BANK_STATEMENT, "BANKACCTFROM"),
        (CREDIT_CARD_STATEMENT, "CCACCTFROM"),
    ];
    for (path, account_tag) in candidates {
        let Some(statement) = document.root.path(path) else {
            continue;
        };
        let entries: Vec<&OfxElement> = statement
            .child("BANKTRANLIST")
            .map(|list| list.children_named("STMTTRN").collect())
            .unwrap_or_default();
        if entries.is_empty() {
            continue;
        }

        let account = statement.child(account_tag);
        let account = AccountRef {
            bank_id: BANK_ID.read(account),
            account_id: ACCOUNT_ID.read(account),
            account_type: ACCOUNT_TYPE.read(account),
        };
        let transactions = entries
            .into_iter()
            .filter_map(|entry| read_transaction(entry, source))
            .collect();
        return Ok(Statement {
            account,
            transactions,
        });
    }
    Err(Error::NoTransactionsFound(source.to_owned()))
}

fn read_transaction(entry: &OfxElement, source: &str) -> Option<RawTransaction> {
    let identity_key = entry.text_of("FITID").map(str::to_owned);
    let Some(date) = entry.text_of("DTPOSTED").and_then(parse_ofx_date) else {
        warn!(
            "{source}: skipping transaction {} without a usable posting date",
            identity_key.as_deref().unwrap_or("(no FITID)")
        );
        return None;
    };
    let amount = parse_plain_amount(&AMOUNT.read(Some(entry)));
    debug!("{source}: read transaction {identity_key:?} of {amount} on {date}");

    Some(RawTransaction {
        date,
        description: NAME.read(Some(entry)),
        amount,
        document_number: String::new(),
        memo: MEMO.read(Some(entry)),
        transaction_type: Some(TRANSACTION_TYPE.read(Some(entry))),
        identity_key,
    })
}

/// OFX dates are `YYYYMMDD`, optionally followed by a time and a timezone (`[-3:BRT]`).
fn parse_ofx_date(raw: &str) -> Option<NaiveDate> {
    let digits = raw.get(..8)?;
    NaiveDate::parse_from_str(digits, "%Y%m%d").ok()
}
