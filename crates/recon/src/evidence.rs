use std::collections::BTreeMap;

use crate::confidence::INCOMPLETE_RECORD_CAP;
use crate::model::{ExtractionSummary, RecordCheck, SecurityRecord};

/// Compute summary statistics from finished records and their checks.
pub fn compute_summary(records: &[SecurityRecord], checks: &[RecordCheck]) -> ExtractionSummary {
    let mut type_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut multi_source = 0;
    let mut low_confidence = 0;
    let mut confidence_sum = 0.0;

    for r in records {
        *type_counts.entry(r.security_type.to_string()).or_insert(0) += 1;
        if r.source_refs.len() > 1 {
            multi_source += 1;
        }
        if r.record_confidence <= INCOMPLETE_RECORD_CAP {
            low_confidence += 1;
        }
        confidence_sum += r.record_confidence;
    }

    let mut valid = 0;
    let mut invalid = 0;
    let mut missing = 0;
    let mut matches = 0;
    let mut mismatches = 0;

    for c in checks {
        match c.identifier_valid {
            Some(true) => valid += 1,
            Some(false) => invalid += 1,
            None => missing += 1,
        }
        match c.arithmetic_match {
            Some(true) => matches += 1,
            Some(false) => mismatches += 1,
            None => {}
        }
    }

    ExtractionSummary {
        total_records: records.len(),
        valid_identifiers: valid,
        invalid_identifiers: invalid,
        missing_identifiers: missing,
        arithmetic_matches: matches,
        arithmetic_mismatches: mismatches,
        multi_source_records: multi_source,
        low_confidence_records: low_confidence,
        mean_confidence: if records.is_empty() {
            0.0
        } else {
            confidence_sum / records.len() as f64
        },
        security_type_counts: type_counts,
    }
}
