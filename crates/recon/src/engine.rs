use std::collections::BTreeMap;

use folioscan_core::RawTable;
use rayon::prelude::*;

use crate::assemble::{assemble_pass, Fragment, MappedTable, PassOutput};
use crate::classify::{classify_document, classify_security};
use crate::confidence::score_record;
use crate::config::EngineConfig;
use crate::error::{Issue, IssueKind, ReconError};
use crate::evidence::compute_summary;
use crate::grid::{analyze, RowLayout};
use crate::mapper::{map_columns, ColumnMapping};
use crate::merge::merge_fragments;
use crate::model::{ExtractionInput, ExtractionMeta, ExtractionResult, ExtractionStats, SecurityRecord};
use crate::reconcile::reconcile;

/// Run extraction and reconciliation over one document's tables.
pub fn run(config: &EngineConfig, input: &ExtractionInput) -> Result<ExtractionResult, ReconError> {
    let mut stats = ExtractionStats::default();
    run_with_stats(config, input, &mut stats)
}

/// Like [`run`], adding this run's counters to `stats`.
pub fn run_with_stats(
    config: &EngineConfig,
    input: &ExtractionInput,
    stats: &mut ExtractionStats,
) -> Result<ExtractionResult, ReconError> {
    config.validate()?;

    // Page order, caller order within a page (stable sort).
    let mut ordered: Vec<&RawTable> = input.tables.iter().collect();
    ordered.sort_by_key(|t| t.page);

    let analyzed = map_maybe_parallel(&ordered, config.parallel, |table| {
        let grid = analyze(table);
        let mapping = map_columns(&grid);
        (grid, mapping)
    });

    let mut issues = Vec::new();
    let mut mapped = Vec::with_capacity(ordered.len());
    let mut remaining = config.max_rows;
    for (table, (grid, mapping)) in ordered.iter().copied().zip(analyzed) {
        let row_limit = grid.rows.len().min(remaining);
        remaining -= row_limit;
        if let Some(first_dropped) = grid.rows.get(row_limit) {
            let dropped = grid.rows.len() - row_limit;
            log::warn!(
                "row limit {} reached in table {}: {dropped} row(s) not scanned",
                config.max_rows,
                table.id
            );
            issues.push(
                Issue::new(
                    IssueKind::MalformedInput,
                    format!("row limit {} reached, {dropped} row(s) not scanned", config.max_rows),
                )
                .at(&table.id, first_dropped.index),
            );
        }
        stats.wrapped_rows += grid.count_layout(RowLayout::Wrapped);
        stats.realigned_rows += grid.count_layout(RowLayout::Realigned);
        mapped.push(MappedTable {
            table,
            grid,
            mapping,
            row_limit,
        });
    }

    // ---- Extraction passes ----
    let mut by_method: BTreeMap<&str, Vec<MappedTable<'_>>> = BTreeMap::new();
    for m in mapped {
        let table = m.table;
        by_method.entry(table.method.as_str()).or_default().push(m);
    }
    for tables in by_method.values_mut() {
        inherit_mappings(tables);
    }
    let passes: Vec<(&str, Vec<MappedTable<'_>>)> = by_method.into_iter().collect();
    log::debug!("{} table(s) in {} extraction pass(es)", ordered.len(), passes.len());

    let outputs: Vec<PassOutput> = map_maybe_parallel(&passes, config.parallel, |(method, tables)| {
        assemble_pass(tables, method, config.max_lookahead)
    });

    let mut fragments: Vec<Fragment> = Vec::new();
    for output in outputs {
        stats.rows_scanned += output.rows_scanned;
        stats.rows_skipped += output.rows_skipped;
        fragments.extend(output.fragments);
        issues.extend(output.issues);
    }

    // ---- Merge + classify ----
    let merged = merge_fragments(&fragments);
    log::debug!("{} fragment(s) merged into {} record(s)", fragments.len(), merged.len());

    let mut records: Vec<SecurityRecord> = Vec::with_capacity(merged.len());
    let mut supports = Vec::with_capacity(merged.len());
    for m in merged {
        let mut record = m.record;
        record.security_type = classify_security(&record);
        records.push(record);
        supports.push(m.support);
    }

    // ---- Reconcile + score ----
    let (reconciliation, recon_issues) = reconcile(&records, input.summary.as_ref(), config);
    issues.extend(recon_issues);

    for ((record, support), check) in records.iter_mut().zip(&supports).zip(&reconciliation.records) {
        score_record(record, support, check, config);
    }

    let summary = compute_summary(&records, &reconciliation.records);

    stats.runs += 1;
    stats.tables += input.tables.len();
    stats.fragments += fragments.len();
    stats.records += records.len();
    stats.issues += issues.len();

    Ok(ExtractionResult {
        meta: ExtractionMeta {
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            document_type: classify_document(input),
            tables: input.tables.len(),
            extraction_passes: passes.iter().map(|(method, _)| method.to_string()).collect(),
        },
        records,
        reconciliation,
        summary,
        issues,
    })
}

/// Headerless tables continue the preceding table of the same pass when
/// the column counts agree.
fn inherit_mappings(tables: &mut [MappedTable<'_>]) {
    for i in 1..tables.len() {
        let (before, after) = tables.split_at_mut(i);
        let prev = &before[i - 1];
        let current = &mut after[0];
        if !current.grid.header_reliable
            && current.grid.column_count == prev.grid.column_count
            && !prev.mapping.is_empty()
        {
            log::debug!(
                "table {} inherits column mapping from {}",
                current.table.id,
                prev.table.id
            );
            current.mapping = ColumnMapping {
                inherited: true,
                ..prev.mapping.clone()
            };
        }
    }
}

fn map_maybe_parallel<T, R, F>(items: &[T], parallel: bool, f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync + Send,
{
    if parallel {
        items.par_iter().map(f).collect()
    } else {
        items.iter().map(f).collect()
    }
}
