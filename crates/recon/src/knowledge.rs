//! Pattern knowledge base: header vocabulary, cell content shapes, and the
//! keyword sets behind document / security type classification.
//!
//! Everything here is immutable and shared across threads without locking.

use std::sync::LazyLock;

use folioscan_core::identifier::looks_like_isin;
use regex::Regex;
use serde::Serialize;

use crate::model::{DocumentType, Field, SecurityType};
use crate::numeric::{parse_currency_amount, parse_date, parse_number, parse_percent};

// ---------------------------------------------------------------------------
// Header patterns
// ---------------------------------------------------------------------------

/// Lower-cased header substrings in priority order: when several patterns
/// match one header, the earliest entry wins.
pub const HEADER_PATTERNS: &[(&str, Field)] = &[
    ("isin", Field::Identifier),
    ("security id", Field::Identifier),
    ("security no", Field::Identifier),
    ("identifier", Field::Identifier),
    ("cusip", Field::Identifier),
    ("sedol", Field::Identifier),
    ("acquisition", Field::AcquisitionPrice),
    ("purchase price", Field::AcquisitionPrice),
    ("cost price", Field::AcquisitionPrice),
    ("average price", Field::AcquisitionPrice),
    ("avg. price", Field::AcquisitionPrice),
    ("avg price", Field::AcquisitionPrice),
    ("entry price", Field::AcquisitionPrice),
    ("coupon", Field::Coupon),
    ("interest rate", Field::Coupon),
    ("maturity", Field::Maturity),
    ("expiry", Field::Maturity),
    ("due date", Field::Maturity),
    ("redemption", Field::Maturity),
    ("price", Field::Price),
    ("weight", Field::Weight),
    ("% of", Field::Weight),
    ("allocation", Field::Weight),
    ("in %", Field::Weight),
    ("currency", Field::Currency),
    ("ccy", Field::Currency),
    ("curr.", Field::Currency),
    ("devise", Field::Currency),
    ("währung", Field::Currency),
    ("nominal", Field::Nominal),
    ("quantity", Field::Nominal),
    ("qty", Field::Nominal),
    ("face value", Field::Nominal),
    ("par value", Field::Nominal),
    ("no. of", Field::Nominal),
    ("units", Field::Nominal),
    ("market value", Field::ActualValue),
    ("countervalue", Field::ActualValue),
    ("counter value", Field::ActualValue),
    ("valuation", Field::ActualValue),
    ("value", Field::ActualValue),
    ("amount", Field::ActualValue),
    ("quote", Field::Price),
    ("kurs", Field::Price),
    ("description", Field::Description),
    ("security", Field::Description),
    ("instrument", Field::Description),
    ("designation", Field::Description),
    ("name", Field::Description),
    ("position", Field::Description),
    ("holding", Field::Description),
    ("asset", Field::Description),
    ("%", Field::Weight),
];

/// Best header pattern for a header cell: the field and its priority rank
/// (lower is stronger).
pub fn match_header(header: &str) -> Option<(Field, usize)> {
    let lower = header.trim().to_lowercase();
    if lower.is_empty() {
        return None;
    }
    HEADER_PATTERNS
        .iter()
        .enumerate()
        .find(|(_, (pattern, _))| lower.contains(pattern))
        .map(|(rank, (_, field))| (*field, rank))
}

// ---------------------------------------------------------------------------
// Currencies
// ---------------------------------------------------------------------------

pub const CURRENCY_CODES: &[&str] = &[
    "AUD", "BRL", "CAD", "CHF", "CNY", "CZK", "DKK", "EUR", "GBP", "HKD", "HUF", "ILS", "INR",
    "JPY", "KRW", "MXN", "NOK", "NZD", "PLN", "RUB", "SEK", "SGD", "THB", "TRY", "USD", "ZAR",
];

/// Longest first, so `US$` is not read as `$`.
pub const CURRENCY_SYMBOLS: &[&str] = &["US$", "$", "€", "£", "¥"];

pub fn is_currency_code(s: &str) -> bool {
    CURRENCY_CODES.binary_search(&s).is_ok()
}

/// ISO code for a currency symbol, if unambiguous.
pub fn currency_for_symbol(symbol: &str) -> Option<&'static str> {
    match symbol {
        "US$" | "$" => Some("USD"),
        "€" => Some("EUR"),
        "£" => Some("GBP"),
        "¥" => Some("JPY"),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Content shapes
// ---------------------------------------------------------------------------

/// Shape of a single cell's content. Declaration order is the tie-break
/// priority when votes are even.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentShape {
    Identifier,
    CurrencyCode,
    Percent,
    Date,
    CurrencyAmount,
    Number,
    Text,
}

impl ContentShape {
    /// Field suggested by a column of this shape when its header says nothing.
    /// Plain numbers are too ambiguous to map on shape alone.
    pub fn implied_field(&self) -> Option<Field> {
        match self {
            Self::Identifier => Some(Field::Identifier),
            Self::CurrencyCode => Some(Field::Currency),
            Self::Percent => Some(Field::Weight),
            Self::Date => Some(Field::Maturity),
            Self::CurrencyAmount => Some(Field::ActualValue),
            Self::Text => Some(Field::Description),
            Self::Number => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Percent | Self::CurrencyAmount | Self::Number)
    }
}

/// Classify one cell. `None` for blank cells.
pub fn classify_cell(raw: &str) -> Option<ContentShape> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    let upper = s.to_uppercase();
    if is_identifier_token(&upper) {
        return Some(ContentShape::Identifier);
    }
    if is_currency_code(&upper) {
        return Some(ContentShape::CurrencyCode);
    }
    if parse_percent(s).is_some() {
        return Some(ContentShape::Percent);
    }
    if parse_date(s).is_some() {
        return Some(ContentShape::Date);
    }
    if parse_currency_amount(s).is_some() {
        return Some(ContentShape::CurrencyAmount);
    }
    if parse_number(s).is_some() {
        return Some(ContentShape::Number);
    }
    Some(ContentShape::Text)
}

/// ISIN-shaped token with at least three digits; rules out 12-letter words
/// that happen to end in a digit.
pub fn is_identifier_token(upper: &str) -> bool {
    looks_like_isin(upper) && upper.bytes().filter(u8::is_ascii_digit).count() >= 3
}

// ---------------------------------------------------------------------------
// Text patterns
// ---------------------------------------------------------------------------

/// `ISIN: XS2530507273`, `ISIN XS2530507273`, `ISIN-Nr. XS2530507273`.
pub static ISIN_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bISIN(?:[\s-]*(?:No|Nr|Code)\.?)?\s*[:.\-]?\s*([A-Z]{2}[A-Z0-9]{9}[0-9])\b")
        .expect("valid isin marker regex")
});

/// Bare identifier-shaped token anywhere in text.
pub static ISIN_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Z]{2}[A-Z0-9]{9}[0-9])\b").expect("valid isin token regex")
});

/// Coupon: a small percentage, `4.25%`, `3 1/8` is not handled.
pub static COUPON_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[\s(])(\d{1,2}(?:[.,]\d{1,4})?)\s*%").expect("valid coupon regex")
});

/// Date-like tokens: `15.03.2027`, `15/03/27`, `2027-03-15`.
pub static DATE_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2}[./\-]\d{1,2}[./\-]\d{2,4}|\d{4}-\d{2}-\d{2})\b")
        .expect("valid date token regex")
});

/// Coupons above this are treated as weights or yields, not coupons.
pub const MAX_COUPON_RATE: f64 = 25.0;

/// First words of totals / subtotal lines.
pub const SUMMARY_KEYWORDS: &[&str] = &[
    "total",
    "subtotal",
    "sub-total",
    "grand total",
    "sum",
    "summe",
    "gesamt",
    "carried forward",
    "brought forward",
];

pub fn is_summary_text(text: &str) -> bool {
    let lower = text.trim().to_lowercase();
    SUMMARY_KEYWORDS.iter().any(|kw| {
        lower
            .strip_prefix(kw)
            .is_some_and(|rest| rest.chars().next().map_or(true, |c| !c.is_alphanumeric()))
    })
}

// ---------------------------------------------------------------------------
// Type keywords
// ---------------------------------------------------------------------------

pub const SECURITY_TYPE_KEYWORDS: &[(SecurityType, &[&str])] = &[
    (
        SecurityType::Bond,
        &[
            "bond", "bonds", "notes", "note", "obligation", "anleihe", "debenture",
            "treasury note", "treasury bond", "frn", "floating rate", "senior", "emtn",
            "medium term", "subordinated",
        ],
    ),
    (
        SecurityType::Equity,
        &[
            "shares", "share", "equity", "equities", "stock", "aktie", "aktien",
            "ordinary", "common stock", "registered shares", "bearer shares", "adr",
        ],
    ),
    (
        SecurityType::Fund,
        &[
            "fund", "funds", "etf", "sicav", "ucits", "fonds", "unit trust",
            "investment trust",
        ],
    ),
    (
        SecurityType::StructuredProduct,
        &[
            "structured", "certificate", "zertifikat", "autocallable", "barrier",
            "reverse convertible", "tracker", "capital protected", "express",
        ],
    ),
    (
        SecurityType::MoneyMarket,
        &[
            "money market", "call money", "time deposit", "fiduciary", "commercial paper",
            "treasury bill", "t-bill",
        ],
    ),
    (
        SecurityType::Derivative,
        &["option", "options", "future", "futures", "forward", "swap", "warrant", "warrants"],
    ),
    (
        SecurityType::Cash,
        &["cash", "current account", "account balance", "liquidity", "sight deposit"],
    ),
];

pub const DOCUMENT_TYPE_KEYWORDS: &[(DocumentType, &[&str])] = &[
    (
        DocumentType::PortfolioStatement,
        &[
            "portfolio", "valuation", "holdings", "asset allocation", "positions",
            "statement of assets", "vermögensaufstellung", "depot", "custody",
        ],
    ),
    (
        DocumentType::AccountStatement,
        &[
            "account statement", "opening balance", "closing balance", "transactions",
            "booking", "debit", "credit",
        ],
    ),
    (
        DocumentType::TradeConfirmation,
        &[
            "trade confirmation", "contract note", "settlement date", "trade date",
            "execution", "bought", "sold",
        ],
    ),
    (
        DocumentType::FundFactsheet,
        &[
            "factsheet", "fact sheet", "fund manager", "inception", "ongoing charges",
            "benchmark", "top holdings",
        ],
    ),
];

/// Occurrences of `keyword` in `lower_text` on word boundaries.
pub fn count_word_hits(lower_text: &str, keyword: &str) -> usize {
    lower_text
        .match_indices(keyword)
        .filter(|(start, _)| {
            let before = lower_text[..*start].chars().next_back();
            let after = lower_text[start + keyword.len()..].chars().next();
            before.map_or(true, |c| !c.is_alphanumeric()) && after.map_or(true, |c| !c.is_alphanumeric())
        })
        .count()
}

/// Total keyword hits of a keyword set against already lower-cased text.
pub fn keyword_score(lower_text: &str, keywords: &[&str]) -> usize {
    keywords.iter().map(|kw| count_word_hits(lower_text, kw)).sum()
}
