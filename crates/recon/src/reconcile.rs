use std::collections::{BTreeMap, BTreeSet};

use folioscan_core::validate_isin;

use crate::classify::security_type_for_label;
use crate::config::EngineConfig;
use crate::error::{Issue, IssueKind};
use crate::model::{
    AllocationCheck, PortfolioSummary, ReconciliationResult, RecordCheck, SecurityRecord, SecurityType,
};

/// Slack for float noise at the tolerance boundary.
const BOUNDARY_EPSILON: f64 = 1e-9;

/// Check every record and the portfolio as a whole. Advisory only: records
/// are never dropped, failures come back as flags and issues.
pub fn reconcile(
    records: &[SecurityRecord],
    summary: Option<&PortfolioSummary>,
    config: &EngineConfig,
) -> (ReconciliationResult, Vec<Issue>) {
    let tolerance = config.arithmetic_tolerance;
    let mut issues = Vec::new();

    let checks: Vec<RecordCheck> = records
        .iter()
        .enumerate()
        .map(|(idx, record)| check_record(idx, record, tolerance))
        .collect();

    for (record, check) in records.iter().zip(&checks) {
        let located = |issue: Issue| match record.source_refs.first() {
            Some(src) => issue.at(&src.table_id, src.row_range.start),
            None => issue,
        };
        if let (Some(id), Some(false)) = (record.identifier.as_deref(), check.identifier_valid) {
            let reason = check
                .identifier_check
                .map(|c| c.reason.to_string())
                .unwrap_or_default();
            issues.push(located(Issue::new(
                IssueKind::ValidationFailure,
                format!("identifier {id} failed check: {reason}"),
            )));
        }
        if let (Some(false), Some(expected)) = (check.arithmetic_match, check.expected_value) {
            issues.push(located(Issue::new(
                IssueKind::ValidationFailure,
                format!(
                    "nominal x price / 100 = {expected:.2} does not match value {:.2}",
                    record.actual_value.unwrap_or_default()
                ),
            )));
        }
    }

    // ---- Portfolio total ----
    let computed_total = records
        .iter()
        .filter_map(|r| r.actual_value)
        .fold(0.0, |acc, v| acc + v);
    let declared_total = summary.and_then(|s| s.total_value);
    let (delta, delta_percent, total_within_tolerance) = match declared_total {
        Some(declared) => {
            let delta = declared - computed_total;
            let pct = relative_percent(delta, computed_total, declared);
            let ok = pct.abs() / 100.0 <= tolerance + BOUNDARY_EPSILON;
            if !ok {
                issues.push(Issue::new(
                    IssueKind::ReconciliationMismatch,
                    format!(
                        "declared total {declared:.2} differs from computed {computed_total:.2} by {delta:.2} ({pct:.2}%)"
                    ),
                ));
            }
            (Some(delta), Some(pct), Some(ok))
        }
        None => (None, None, None),
    };

    // ---- Weights ----
    let weights: Vec<f64> = records.iter().filter_map(|r| r.weight_percent).collect();
    let weight_sum = (!weights.is_empty()).then(|| weights.iter().sum::<f64>());
    let weight_within_tolerance = weight_sum.map(|sum| {
        (sum - 100.0).abs() <= config.weight_tolerance * 100.0 + BOUNDARY_EPSILON
    });
    if let (Some(sum), Some(false)) = (weight_sum, weight_within_tolerance) {
        issues.push(Issue::new(
            IssueKind::ReconciliationMismatch,
            format!("weights sum to {sum:.2}%, expected 100%"),
        ));
    }

    // ---- Currencies ----
    let currencies: Vec<String> = records
        .iter()
        .filter_map(|r| r.currency.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if currencies.len() > 1 && declared_total.is_some() {
        log::warn!(
            "portfolio total compared across {} currencies: {}",
            currencies.len(),
            currencies.join(", ")
        );
    }

    let allocation = summary
        .map(|s| check_allocation(records, s, computed_total))
        .unwrap_or_default();

    let passed = total_within_tolerance.unwrap_or(true) && weight_within_tolerance.unwrap_or(true);

    let result = ReconciliationResult {
        records: checks,
        computed_total,
        declared_total,
        delta,
        delta_percent,
        total_within_tolerance,
        weight_sum,
        weight_within_tolerance,
        allocation,
        currencies,
        tolerance,
        passed,
    };
    (result, issues)
}

pub fn check_record(record_index: usize, record: &SecurityRecord, tolerance: f64) -> RecordCheck {
    let identifier_check = record.identifier.as_deref().map(validate_isin);
    let expected_value = match (record.nominal_value, record.price) {
        (Some(nominal), Some(price)) => Some(nominal * price / 100.0),
        _ => None,
    };
    let arithmetic_match = match (expected_value, record.actual_value) {
        (Some(expected), Some(actual)) => Some(values_agree(expected, actual, tolerance)),
        _ => None,
    };
    RecordCheck {
        record_index,
        identifier_check,
        identifier_valid: identifier_check.map(|c| c.valid),
        expected_value,
        arithmetic_match,
    }
}

/// `|expected - actual| / |actual| <= tolerance`. A zero value only agrees
/// with a zero expectation.
pub fn values_agree(expected: f64, actual: f64, tolerance: f64) -> bool {
    if actual == 0.0 {
        return expected == 0.0;
    }
    (expected - actual).abs() / actual.abs() <= tolerance + BOUNDARY_EPSILON
}

/// `delta` as a percentage of the computed total; falls back to the declared
/// total when nothing was computed.
fn relative_percent(delta: f64, computed: f64, declared: f64) -> f64 {
    if computed != 0.0 {
        delta / computed.abs() * 100.0
    } else if declared != 0.0 {
        delta / declared.abs() * 100.0
    } else {
        0.0
    }
}

fn check_allocation(
    records: &[SecurityRecord],
    summary: &PortfolioSummary,
    computed_total: f64,
) -> Vec<AllocationCheck> {
    let mut by_type: BTreeMap<SecurityType, f64> = BTreeMap::new();
    for record in records {
        if let Some(value) = record.actual_value {
            *by_type.entry(record.security_type).or_insert(0.0) += value;
        }
    }

    summary
        .asset_class_breakdown
        .iter()
        .map(|(label, declared)| {
            let security_type = security_type_for_label(label);
            let value = by_type.get(&security_type).copied().unwrap_or(0.0);
            let computed_percent = if computed_total != 0.0 {
                value / computed_total * 100.0
            } else {
                0.0
            };
            AllocationCheck {
                asset_class: label.clone(),
                security_type,
                declared_percent: *declared,
                computed_percent,
            }
        })
        .collect()
}
