use std::collections::BTreeMap;

use crate::config::EngineConfig;
use crate::merge::FieldSupport;
use crate::model::{Field, RecordCheck, SecurityRecord};

/// Records with fewer populated canonical fields are capped at
/// [`INCOMPLETE_RECORD_CAP`].
pub const MIN_CANONICAL_FIELDS: usize = 4;
pub const INCOMPLETE_RECORD_CAP: f64 = 0.5;

/// Weight of a field in the record score.
fn field_weight(field: Field) -> f64 {
    match field {
        Field::Identifier | Field::ActualValue => 3.0,
        Field::Nominal | Field::Price => 2.0,
        _ => 1.0,
    }
}

/// Validations that failed for `field`.
fn failed_validations(field: Field, check: &RecordCheck) -> usize {
    let failed = match field {
        Field::Identifier => check.identifier_valid == Some(false),
        Field::Nominal | Field::Price | Field::ActualValue => check.arithmetic_match == Some(false),
        _ => false,
    };
    usize::from(failed)
}

/// Fill `field_confidence` and `record_confidence` on a finished record.
pub fn score_record(
    record: &mut SecurityRecord,
    support: &BTreeMap<Field, FieldSupport>,
    check: &RecordCheck,
    config: &EngineConfig,
) {
    let mut field_confidence = BTreeMap::new();
    for field in Field::ALL {
        if !record.is_set(field) {
            continue;
        }
        let disagreeing = support.get(&field).map_or(0, FieldSupport::disagreeing);
        let score = 1.0
            - config.disagreement_penalty * disagreeing as f64
            - config.validation_penalty * failed_validations(field, check) as f64;
        field_confidence.insert(field, score.clamp(0.0, 1.0));
    }

    let (weighted, total_weight) = field_confidence
        .iter()
        .fold((0.0, 0.0), |(sum, weight), (field, score)| {
            let w = field_weight(*field);
            (sum + score * w, weight + w)
        });
    let mut record_confidence = if total_weight > 0.0 {
        weighted / total_weight
    } else {
        0.0
    };
    if record.populated_canonical() < MIN_CANONICAL_FIELDS {
        record_confidence = record_confidence.min(INCOMPLETE_RECORD_CAP);
    }

    record.field_confidence = field_confidence;
    record.record_confidence = record_confidence;
}
