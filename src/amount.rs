//! Lenient parsing of the amounts found in bank statements.
//!
//! Both parsers return zero instead of failing: a single malformed cell must not abort the
//! import of a whole file. A zero coming out of a non-empty string means "could not parse",
//! which is why it is logged.

use std::str::FromStr;

use rust_decimal::Decimal;
use tracing::warn;

const CREDIT_MARKER: char = 'C';
const DEBIT_MARKER: char = 'D';

/// Magnitudes from here on are taken for extraction noise, and keep ledger sums far from
/// `Decimal::MAX`
const AMOUNT_LIMIT: i64 = 1_000_000_000_000_000;

/// Parses a localized, signed-magnitude amount such as `"1.234,56 C"` or `"345,67 D"`.
///
/// `.` is the thousands separator and `,` the decimal separator. A trailing `D` negates the
/// value, a trailing `C` (or no marker at all) keeps it positive.
pub fn parse_amount(raw: &str) -> Decimal {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Decimal::ZERO;
    }

    let (number, is_debit) = match trimmed.chars().last().map(|c| c.to_ascii_uppercase()) {
        Some(DEBIT_MARKER) => (&trimmed[..trimmed.len() - 1], true),
        Some(CREDIT_MARKER) => (&trimmed[..trimmed.len() - 1], false),
        _ => (trimmed, false),
    };
    let normalized = number.trim().replace('.', "").replace(',', ".");

    match Decimal::from_str(&normalized) {
        Ok(value) if is_debit => bounded(raw, -value),
        Ok(value) => bounded(raw, value),
        Err(err) => {
            warn!("Could not parse amount '{raw}' ({err}), using 0");
            Decimal::ZERO
        }
    }
}

/// Parses an OFX `TRNAMT`-style amount (`-123.45`).
///
/// Some institutions emit a `,` as decimal separator, which is accepted as well.
pub fn parse_plain_amount(raw: &str) -> Decimal {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Decimal::ZERO;
    }
    let normalized = if trimmed.contains('.') {
        trimmed.to_owned()
    } else {
        trimmed.replace(',', ".")
    };
    match Decimal::from_str(normalized.trim_start_matches('+')) {
        Ok(value) => bounded(raw, value),
        Err(err) => {
            warn!("Could not parse amount '{raw}' ({err}), using 0");
            Decimal::ZERO
        }
    }
}

/// Whether an amount is small enough to be recorded.
pub fn is_within_limit(amount: Decimal) -> bool {
    amount.abs() < Decimal::from(AMOUNT_LIMIT)
}

fn bounded(raw: &str, value: Decimal) -> Decimal {
    if is_within_limit(value) {
        value
    } else {
        warn!("Amount '{raw}' is out of range, using 0");
        Decimal::ZERO
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn should_parse_credits_and_debits() {
        assert_eq!(dec!(1234.56), parse_amount("1.234,56 C"));
        assert_eq!(dec!(-345.67), parse_amount("345,67 D"));
        assert_eq!(dec!(-1000000.00), parse_amount("1.000.000,00 D"));
    }

    #[test]
    fn should_accept_surrounding_whitespace_and_lowercase_markers() {
        assert_eq!(dec!(12.30), parse_amount("  12,30 c "));
        assert_eq!(dec!(-12.30), parse_amount("12,30d"));
    }

    #[test]
    fn should_treat_unmarked_amounts_as_credits() {
        assert_eq!(dec!(99.90), parse_amount("99,90"));
    }

    #[test]
    fn should_return_zero_for_empty_input() {
        assert_eq!(Decimal::ZERO, parse_amount(""));
        assert_eq!(Decimal::ZERO, parse_amount("   "));
    }

    #[test]
    fn should_return_zero_for_malformed_input() {
        assert_eq!(Decimal::ZERO, parse_amount("abc D"));
        assert_eq!(Decimal::ZERO, parse_amount("C"));
        assert_eq!(Decimal::ZERO, parse_amount("1,2,3 C"));
    }

    #[test]
    fn should_return_zero_for_out_of_range_amounts() {
        assert_eq!(Decimal::ZERO, parse_amount("99.999.999.999.999.999.999.999.999.999,00 D"));
        assert_eq!(Decimal::ZERO, parse_amount("1.000.000.000.000.000,00 C"));
        assert_eq!(dec!(999999999999999.99), parse_amount("999.999.999.999.999,99 C"));
        assert_eq!(Decimal::ZERO, parse_plain_amount("79228162514264337593543950335"));
    }

    #[test]
    fn should_parse_ofx_amounts() {
        assert_eq!(dec!(-123.45), parse_plain_amount("-123.45"));
        assert_eq!(dec!(10), parse_plain_amount("+10"));
        assert_eq!(dec!(-7.5), parse_plain_amount("-7,5"));
        assert_eq!(Decimal::ZERO, parse_plain_amount(""));
        assert_eq!(Decimal::ZERO, parse_plain_amount("n/a"));
    }
}
