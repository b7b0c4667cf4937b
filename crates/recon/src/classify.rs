//! Keyword classification of documents and securities.
//!
//! Deterministic: each candidate type is scored by keyword hits, the highest
//! score wins, and ties go to the type listed first.

use crate::knowledge::{keyword_score, DOCUMENT_TYPE_KEYWORDS, SECURITY_TYPE_KEYWORDS};
use crate::model::{DocumentType, ExtractionInput, SecurityRecord, SecurityType};

/// Security type from the record description. Falls back to `Bond` when the
/// record carries a coupon or maturity but no keyword matched.
pub fn classify_security(record: &SecurityRecord) -> SecurityType {
    let by_keyword = record
        .description
        .as_deref()
        .and_then(|d| best_match(&d.to_lowercase(), SECURITY_TYPE_KEYWORDS));
    match by_keyword {
        Some(kind) => kind,
        None if record.coupon_rate.is_some() || record.maturity_date.is_some() => SecurityType::Bond,
        None => SecurityType::Unknown,
    }
}

/// Security type behind an asset-class label such as `"Bonds"` or
/// `"Equities & equity funds"`.
pub fn security_type_for_label(label: &str) -> SecurityType {
    best_match(&label.to_lowercase(), SECURITY_TYPE_KEYWORDS).unwrap_or(SecurityType::Unknown)
}

/// Document type from free text plus every header and cell in the input.
pub fn classify_document(input: &ExtractionInput) -> DocumentType {
    let mut text = input.document_text.clone().unwrap_or_default();
    for table in &input.tables {
        for header in &table.headers {
            text.push(' ');
            text.push_str(header);
        }
        for row in &table.rows {
            text.push(' ');
            text.push_str(&row.text());
        }
    }
    best_match(&text.to_lowercase(), DOCUMENT_TYPE_KEYWORDS).unwrap_or(DocumentType::Unknown)
}

fn best_match<T: Copy>(lower_text: &str, sets: &[(T, &[&str])]) -> Option<T> {
    let mut best: Option<(T, usize)> = None;
    for (kind, keywords) in sets {
        let score = keyword_score(lower_text, keywords);
        if score > best.map_or(0, |(_, s)| s) {
            best = Some((*kind, score));
        }
    }
    best.map(|(kind, _)| kind)
}
