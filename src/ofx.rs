//! Minimal OFX reader.
//!
//! Both OFX 1.x (SGML, where leaf elements are usually not closed) and OFX 2.x (XML) are
//! turned into the same element tree. Only structure is recovered: no schema validation, no
//! type conversion. Anything before the `<OFX>` element (SGML header, XML prolog) is ignored.
//!
//! An element is an aggregate when its tag names one (`STMTRS`, `BANKTRANLIST`...). Any
//! other element is a leaf and ends at the next opening tag, whether it holds a value or not.

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OfxElement {
    pub tag: String,
    pub text: Option<String>,
    pub children: Vec<OfxElement>,
}

impl OfxElement {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_uppercase(),
            ..Self::default()
        }
    }

    /// First direct child with the given tag.
    pub fn child(&self, tag: &str) -> Option<&OfxElement> {
        self.children
            .iter()
            .find(|child| child.tag.eq_ignore_ascii_case(tag))
    }

    /// All direct children with the given tag, in document order.
    pub fn children_named<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a OfxElement> {
        self.children
            .iter()
            .filter(move |child| child.tag.eq_ignore_ascii_case(tag))
    }

    /// Follows a path of tags, taking the first match at each level.
    pub fn path(&self, tags: &[&str]) -> Option<&OfxElement> {
        tags.iter()
            .try_fold(self, |element, tag| element.child(tag))
    }

    /// Text of a direct child, if present and not blank.
    pub fn text_of(&self, tag: &str) -> Option<&str> {
        self.child(tag)
            .and_then(|child| child.text.as_deref())
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfxDocument {
    pub root: OfxElement,
}

enum Token<'a> {
    Open(&'a str),
    Close(&'a str),
    Text(&'a str),
}

impl OfxDocument {
    pub fn parse(content: &str) -> Result<Self> {
        let start = find_ofx_start(content)
            .ok_or_else(|| Error::OfxParse("no <OFX> element found".to_owned()))?;

        // The bottom of the stack is a synthetic container collecting top-level elements
        let mut stack = vec![OfxElement::default()];
        for token in tokens(&content[start..]) {
            match token {
                Token::Open(tag) => {
                    close_open_leaf(&mut stack);
                    stack.push(OfxElement::new(tag));
                }
                Token::Text(text) => {
                    if let Some(current) = stack.last_mut() {
                        let text = decode_entities(text.trim());
                        match current.text.as_mut() {
                            Some(existing) => existing.push_str(&text),
                            None => current.text = Some(text),
                        }
                    }
                }
                Token::Close(tag) => {
                    let is_open = stack[1..]
                        .iter()
                        .any(|element| element.tag.eq_ignore_ascii_case(tag));
                    if !is_open {
                        // Stray closing tag, SGML allows closing leaves that were already closed
                        continue;
                    }
                    while stack.len() > 1 {
                        let Some(element) = stack.pop() else { break };
                        let done = element.tag.eq_ignore_ascii_case(tag);
                        attach(&mut stack, element);
                        if done {
                            break;
                        }
                    }
                }
            }
        }
        while stack.len() > 1 {
            if let Some(element) = stack.pop() {
                attach(&mut stack, element);
            }
        }

        let root = stack
            .pop()
            .and_then(|container| container.children.into_iter().find(|e| e.tag == "OFX"))
            .ok_or_else(|| Error::OfxParse("empty <OFX> element".to_owned()))?;
        Ok(Self { root })
    }
}

fn find_ofx_start(content: &str) -> Option<usize> {
    content.to_ascii_uppercase().find("<OFX>")
}

/// Aggregates named by their suffix: `BANKMSGSRSV1`, `STMTTRNRS`, `STMTRS`, `CCACCTFROM`,
/// `BANKTRANLIST`, `LEDGERBAL`...
const AGGREGATE_SUFFIXES: [&str; 9] = [
    "MSGSRSV1", "MSGSRQV1", "TRNRS", "RS", "RQ", "ACCTFROM", "ACCTTO", "TRANLIST", "BAL",
];
const AGGREGATES: [&str; 8] = [
    "OFX",
    "STMTTRN",
    "STATUS",
    "FI",
    "CURRENCY",
    "ORIGCURRENCY",
    "PAYEE",
    "BALLIST",
];

fn is_aggregate(tag: &str) -> bool {
    AGGREGATES.contains(&tag) || AGGREGATE_SUFFIXES.iter().any(|suffix| tag.ends_with(suffix))
}

/// A leaf still open when a new element starts was left unclosed, as SGML allows.
fn close_open_leaf(stack: &mut Vec<OfxElement>) {
    let open_leaf = stack.len() > 1
        && stack
            .last()
            .is_some_and(|element| !is_aggregate(&element.tag));
    if open_leaf {
        if let Some(element) = stack.pop() {
            attach(stack, element);
        }
    }
}

fn attach(stack: &mut [OfxElement], element: OfxElement) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
    }
}

fn tokens(content: &str) -> impl Iterator<Item = Token<'_>> {
    let mut rest = content;
    std::iter::from_fn(move || loop {
        if rest.is_empty() {
            return None;
        }
        if let Some(after) = rest.strip_prefix('<') {
            let end = after.find('>').unwrap_or(after.len());
            let tag = after[..end].trim();
            rest = after.get(end + 1..).unwrap_or("");
            if tag.starts_with('?') || tag.starts_with('!') || tag.is_empty() {
                continue;
            }
            if let Some(name) = tag.strip_prefix('/') {
                return Some(Token::Close(name.trim()));
            }
            // Self-closing XML elements carry no data
            if tag.ends_with('/') {
                continue;
            }
            return Some(Token::Open(tag));
        }
        let end = rest.find('<').unwrap_or(rest.len());
        let text = &rest[..end];
        rest = &rest[end..];
        if !text.trim().is_empty() {
            return Some(Token::Text(text));
        }
    })
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    const SGML: &str = "OFXHEADER:100\r\nDATA:OFXSGML\r\nVERSION:102\r\n\r\n\
        <OFX>\r\n\
        <BANKMSGSRSV1><STMTTRNRS><STMTRS>\r\n\
        <BANKACCTFROM><BANKID>0104<ACCTID>12345-6<ACCTTYPE>CHECKING</BANKACCTFROM>\r\n\
        <BANKTRANLIST>\r\n\
        <STMTTRN><TRNTYPE>DEBIT<DTPOSTED>20240105<TRNAMT>-50.00<FITID>A1<MEMO>Padaria &amp; Cia</STMTTRN>\r\n\
        <STMTTRN><TRNTYPE>CREDIT<DTPOSTED>20240106<TRNAMT>100.00<FITID>A2</STMTTRN>\r\n\
        </BANKTRANLIST>\r\n\
        </STMTRS></STMTTRNRS></BANKMSGSRSV1>\r\n\
        </OFX>\r\n";

    const XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<?OFX OFXHEADER="200" VERSION="220"?>
<OFX>
  <CREDITCARDMSGSRSV1>
    <CCSTMTTRNRS>
      <CCSTMTRS>
        <CCACCTFROM><ACCTID>4111</ACCTID></CCACCTFROM>
        <BANKTRANLIST>
          <STMTTRN>
            <TRNTYPE>DEBIT</TRNTYPE>
            <DTPOSTED>20240201120000[-3:BRT]</DTPOSTED>
            <TRNAMT>-9.90</TRNAMT>
            <FITID>X1</FITID>
            <NAME>Streaming</NAME>
            <MEMO/>
          </STMTTRN>
        </BANKTRANLIST>
      </CCSTMTRS>
    </CCSTMTTRNRS>
  </CREDITCARDMSGSRSV1>
</OFX>"#;

    #[test]
    fn should_read_sgml_with_unclosed_leaves() {
        let document = OfxDocument::parse(SGML).expect("document");
        let account = document
            .root
            .path(&["BANKMSGSRSV1", "STMTTRNRS", "STMTRS", "BANKACCTFROM"])
            .expect("account");
        assert_eq!(Some("0104"), account.text_of("BANKID"));
        assert_eq!(Some("12345-6"), account.text_of("ACCTID"));
        assert_eq!(Some("CHECKING"), account.text_of("ACCTTYPE"));

        let list = document
            .root
            .path(&["BANKMSGSRSV1", "STMTTRNRS", "STMTRS", "BANKTRANLIST"])
            .expect("transaction list");
        let transactions: Vec<_> = list.children_named("STMTTRN").collect();
        assert_eq!(2, transactions.len());
        assert_eq!(Some("-50.00"), transactions[0].text_of("TRNAMT"));
        assert_eq!(Some("Padaria & Cia"), transactions[0].text_of("MEMO"));
        assert_eq!(Some("A2"), transactions[1].text_of("FITID"));
        assert_eq!(None, transactions[1].text_of("MEMO"));
    }

    #[test]
    fn should_read_xml() {
        let document = OfxDocument::parse(XML).expect("document");
        let statement = document
            .root
            .path(&["creditcardmsgsrsv1", "ccstmttrnrs", "ccstmtrs"])
            .expect("statement");
        assert_eq!(
            Some("4111"),
            statement.child("CCACCTFROM").and_then(|a| a.text_of("ACCTID"))
        );
        let transaction = statement
            .path(&["BANKTRANLIST", "STMTTRN"])
            .expect("transaction");
        assert_eq!(Some("Streaming"), transaction.text_of("NAME"));
        assert_eq!(Some("20240201120000[-3:BRT]"), transaction.text_of("DTPOSTED"));
    }

    #[test]
    fn should_close_sgml_leaves_without_a_value() {
        let document = OfxDocument::parse(
            "<OFX><BANKMSGSRSV1><STMTTRNRS><STMTRS><BANKTRANLIST>\
             <STMTTRN><TRNTYPE>DEBIT<DTPOSTED>20240105<TRNAMT>-5.00<MEMO><FITID>Z1<NAME>CAFE\
             </STMTTRN></BANKTRANLIST></STMTRS></STMTTRNRS></BANKMSGSRSV1></OFX>",
        )
        .expect("document");
        let transaction = document
            .root
            .path(&["BANKMSGSRSV1", "STMTTRNRS", "STMTRS", "BANKTRANLIST", "STMTTRN"])
            .expect("transaction");
        assert_eq!(
            vec!["TRNTYPE", "DTPOSTED", "TRNAMT", "MEMO", "FITID", "NAME"],
            transaction
                .children
                .iter()
                .map(|child| child.tag.as_str())
                .collect::<Vec<_>>()
        );
        assert_eq!(None, transaction.text_of("MEMO"));
        assert_eq!(Some("Z1"), transaction.text_of("FITID"));
        assert_eq!(Some("CAFE"), transaction.text_of("NAME"));
    }

    #[test]
    fn should_tell_aggregates_from_leaves() {
        for tag in ["BANKMSGSRSV1", "STMTTRNRS", "CCSTMTRS", "BANKACCTFROM", "LEDGERBAL"] {
            assert!(is_aggregate(tag), "{tag}");
        }
        for tag in ["TRNTYPE", "DTPOSTED", "TRNAMT", "FITID", "MEMO", "ACCTID", "CURDEF"] {
            assert!(!is_aggregate(tag), "{tag}");
        }
    }

    #[test]
    fn should_fail_without_an_ofx_element() {
        assert!(OfxDocument::parse("OFXHEADER:100\n\nnothing here").is_err());
    }
}
