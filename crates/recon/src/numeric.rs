//! Lenient parsing of numbers, percentages and dates as they appear in
//! extracted statement cells (`200'000`, `1.234,56`, `(1,517.82)`, `4.25%`,
//! `15.03.2027`). Failures return `None`; callers leave the field empty.

use chrono::{Datelike, NaiveDate};

use crate::knowledge::{is_currency_code, CURRENCY_SYMBOLS};

const DATE_FORMATS: [&str; 10] = [
    "%d.%m.%Y", "%d/%m/%Y", "%Y-%m-%d", "%d-%m-%Y", "%Y/%m/%d", "%d.%m.%y", "%d/%m/%y",
    "%d %b %Y", "%d %B %Y", "%b %d, %Y",
];

/// Parse a plain number. Thousands separators, apostrophes, spaces and
/// parenthesised negatives are accepted; anything else is rejected.
pub fn parse_number(raw: &str) -> Option<f64> {
    let mut s = raw.trim();
    if s.is_empty() {
        return None;
    }

    let mut negative = false;
    if s.starts_with('(') && s.ends_with(')') && s.len() > 2 {
        negative = true;
        s = &s[1..s.len() - 1];
    }
    let s = s.trim();
    let s = if let Some(rest) = s.strip_prefix('-') {
        negative = !negative;
        rest
    } else if let Some(rest) = s.strip_suffix('-') {
        negative = !negative;
        rest
    } else {
        s.strip_prefix('+').unwrap_or(s)
    };

    let mut cleaned = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '0'..='9' | '.' | ',' => cleaned.push(c),
            '\'' | '\u{2019}' | '\u{02BC}' | ' ' | '\u{00A0}' | '\u{202F}' => {}
            _ => return None,
        }
    }
    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let normalized = normalize_separators(&cleaned)?;
    let value: f64 = normalized.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(if negative { -value } else { value })
}

/// Decide which of `,` / `.` is the decimal separator and return a string
/// Rust can parse.
fn normalize_separators(s: &str) -> Option<String> {
    let commas = s.matches(',').count();
    let dots = s.matches('.').count();

    let (thousands, decimal) = match (commas, dots) {
        (0, 0) => return Some(s.to_string()),
        (0, 1) => (None, Some('.')),
        (0, _) => (Some('.'), None),
        (1, 0) => {
            let (int_part, frac) = s.split_once(',')?;
            if frac.len() == 3 && int_part != "0" && !int_part.is_empty() {
                (Some(','), None)
            } else {
                (None, Some(','))
            }
        }
        (_, 0) => (Some(','), None),
        _ => {
            let last_comma = s.rfind(',')?;
            let last_dot = s.rfind('.')?;
            if last_comma > last_dot {
                (Some('.'), Some(','))
            } else {
                (Some(','), Some('.'))
            }
        }
    };

    if let Some(dec) = decimal {
        if s.matches(dec).count() > 1 {
            return None;
        }
    }

    Some(
        s.chars()
            .filter(|c| Some(*c) != thousands)
            .map(|c| if Some(c) == decimal { '.' } else { c })
            .collect(),
    )
}

/// Parse `4.25%` / `4,25 %`. The percent sign is required.
pub fn parse_percent(raw: &str) -> Option<f64> {
    let s = raw.trim();
    let body = s.strip_suffix('%')?;
    parse_number(body)
}

/// Split a currency marker off an amount: `USD 1,000`, `1'000 CHF`, `$1,234.56`.
/// Returns the marker (ISO code or symbol) and the parsed number.
pub fn parse_currency_amount(raw: &str) -> Option<(String, f64)> {
    let s = raw.trim();

    for symbol in CURRENCY_SYMBOLS {
        if let Some(rest) = s.strip_prefix(symbol) {
            return parse_number(rest).map(|n| (symbol.to_string(), n));
        }
        if let Some(rest) = s.strip_suffix(symbol) {
            return parse_number(rest).map(|n| (symbol.to_string(), n));
        }
        // -$1,234.56
        if let Some(rest) = s.strip_prefix('-').and_then(|r| r.trim_start().strip_prefix(symbol)) {
            return parse_number(rest).map(|n| (symbol.to_string(), -n));
        }
    }

    if let Some((head, tail)) = s.split_once(char::is_whitespace) {
        let head_upper = head.to_ascii_uppercase();
        if is_currency_code(&head_upper) {
            return parse_number(tail).map(|n| (head_upper, n));
        }
    }
    if let Some((head, tail)) = s.rsplit_once(char::is_whitespace) {
        let tail_upper = tail.to_ascii_uppercase();
        if is_currency_code(&tail_upper) {
            return parse_number(head).map(|n| (tail_upper, n));
        }
    }
    None
}

/// Parse any numeric cell: plain, currency-marked, or percent.
pub fn parse_amount(raw: &str) -> Option<f64> {
    parse_number(raw)
        .or_else(|| parse_currency_amount(raw).map(|(_, n)| n))
        .or_else(|| parse_percent(raw))
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.len() < 6 || s.len() > 20 {
        return None;
    }
    // `%Y` happily reads "27" as year 27, so out-of-range years fall through
    // to the two-digit formats.
    DATE_FORMATS.iter().find_map(|fmt| {
        NaiveDate::parse_from_str(s, fmt)
            .ok()
            .filter(|d| (1900..=2200).contains(&d.year()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swiss_apostrophes() {
        assert_eq!(parse_number("200'000"), Some(200_000.0));
        assert_eq!(parse_number("1'234'567.89"), Some(1_234_567.89));
        assert_eq!(parse_number("198\u{2019}745"), Some(198_745.0));
    }

    #[test]
    fn thousands_and_decimals() {
        assert_eq!(parse_number("99.37"), Some(99.37));
        assert_eq!(parse_number("1,234.56"), Some(1234.56));
        assert_eq!(parse_number("1.234,56"), Some(1234.56));
        assert_eq!(parse_number("200,000"), Some(200_000.0));
        assert_eq!(parse_number("1.234.567"), Some(1_234_567.0));
        assert_eq!(parse_number("99,37"), Some(99.37));
        assert_eq!(parse_number("0,125"), Some(0.125));
        assert_eq!(parse_number("1 234 567"), Some(1_234_567.0));
    }

    #[test]
    fn negatives() {
        assert_eq!(parse_number("-1,517.82"), Some(-1517.82));
        assert_eq!(parse_number("(1,517.82)"), Some(-1517.82));
        assert_eq!(parse_number("250-"), Some(-250.0));
    }

    #[test]
    fn rejects_text() {
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("n/a"), None);
        assert_eq!(parse_number("-"), None);
        assert_eq!(parse_number("XS2530507273"), None);
        assert_eq!(parse_number("1.2.3,4,5"), None);
    }

    #[test]
    fn percent_requires_sign() {
        assert_eq!(parse_percent("4.25%"), Some(4.25));
        assert_eq!(parse_percent("12,5 %"), Some(12.5));
        assert_eq!(parse_percent("4.25"), None);
    }

    #[test]
    fn currency_amounts() {
        assert_eq!(parse_currency_amount("USD 1,000"), Some(("USD".into(), 1000.0)));
        assert_eq!(parse_currency_amount("1'000 chf"), Some(("CHF".into(), 1000.0)));
        assert_eq!(parse_currency_amount("$1,234.56"), Some(("$".into(), 1234.56)));
        assert_eq!(parse_currency_amount("-$20.00"), Some(("$".into(), -20.0)));
        assert_eq!(parse_currency_amount("ABC 1,000"), None);
        assert_eq!(parse_currency_amount("1000"), None);
    }

    #[test]
    fn dates() {
        let d = NaiveDate::from_ymd_opt(2027, 3, 15).unwrap();
        assert_eq!(parse_date("15.03.2027"), Some(d));
        assert_eq!(parse_date("15/03/2027"), Some(d));
        assert_eq!(parse_date("2027-03-15"), Some(d));
        assert_eq!(parse_date("15 Mar 2027"), Some(d));
        assert_eq!(parse_date("15.03.27"), Some(d));
        assert_eq!(parse_date("99.37"), None);
        assert_eq!(parse_date("EXAMPLE"), None);
    }
}
