//! Security record assembly: a row-driven state machine that turns mapped
//! tables into record fragments.
//!
//! One extraction pass is scanned table by table in (page, caller) order.
//! An open record is carried across table boundaries, so a holding split
//! over a page break still ends up as one fragment.

use folioscan_core::identifier::{looks_like_isin, normalize_identifier, validate_isin};
use folioscan_core::RawTable;
use serde::Serialize;

use crate::error::{Issue, IssueKind};
use crate::grid::{AnalyzedRow, GridAnalysis, RowLayout};
use crate::knowledge::{
    currency_for_symbol, is_currency_code, is_summary_text, COUPON_RE, DATE_TOKEN_RE,
    ISIN_MARKER_RE, ISIN_TOKEN_RE, MAX_COUPON_RATE,
};
use crate::mapper::ColumnMapping;
use crate::model::{Field, FieldValue, RowRange, SecurityRecord, SourceRef};
use crate::numeric::{parse_amount, parse_currency_amount, parse_date, parse_number, parse_percent};

/// A table ready for assembly.
#[derive(Debug, Clone)]
pub struct MappedTable<'a> {
    pub table: &'a RawTable,
    pub grid: GridAnalysis,
    pub mapping: ColumnMapping,
    /// Analyzed rows of this table that fit in the run's row budget.
    pub row_limit: usize,
}

/// A record as seen by one extraction pass, before cross-pass merging.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fragment {
    pub record: SecurityRecord,
    pub method: String,
    /// Best accuracy hint among the tables the fragment was read from.
    pub accuracy: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassOutput {
    pub fragments: Vec<Fragment>,
    pub issues: Vec<Issue>,
    pub rows_scanned: usize,
    pub rows_skipped: usize,
}

#[derive(Debug)]
enum State {
    Idle,
    InRecord(OpenRecord),
}

#[derive(Debug)]
struct OpenRecord {
    record: SecurityRecord,
    accuracy: Option<f64>,
    /// Consecutive detail rows that added nothing.
    quiet_rows: usize,
}

impl OpenRecord {
    fn touch(&mut self, table: &RawTable, row: usize) {
        match self.record.source_refs.last_mut() {
            Some(last) if last.table_id == table.id => {
                last.row_range.end = last.row_range.end.max(row);
            }
            _ => self.record.source_refs.push(SourceRef {
                page: table.page,
                table_id: table.id.clone(),
                row_range: RowRange { start: row, end: row },
            }),
        }
        if let Some(hint) = table.accuracy_hint() {
            self.accuracy = Some(self.accuracy.map_or(hint, |a| a.max(hint)));
        }
    }
}

/// What a trigger row announces.
enum Trigger {
    /// Identifier column holds an ISIN-shaped value.
    Identifier,
    /// Currency code next to a numeric nominal.
    CurrencyNominal,
    /// An `ISIN: ...` marker in the row text.
    EmbeddedIdentifier,
}

// ---------------------------------------------------------------------------
// Public entry point
// ---------------------------------------------------------------------------

/// Assemble one extraction pass. `tables` must already be in (page, caller)
/// order.
pub fn assemble_pass(tables: &[MappedTable<'_>], method: &str, max_lookahead: usize) -> PassOutput {
    let mut out = PassOutput::default();
    let mut state = State::Idle;

    for mapped in tables {
        let table = mapped.table;
        for row in mapped.grid.rows.iter().take(mapped.row_limit) {
            out.rows_scanned += 1;
            state = step(state, mapped, row, method, max_lookahead, &mut out);
        }
        log::debug!(
            "assembled table {} (page {}): {} fragments so far",
            table.id,
            table.page,
            out.fragments.len()
        );
    }

    if let State::InRecord(open) = state {
        close(open, method, &mut out);
    }
    out
}

fn step(
    state: State,
    mapped: &MappedTable<'_>,
    row: &AnalyzedRow,
    method: &str,
    max_lookahead: usize,
    out: &mut PassOutput,
) -> State {
    let table = mapped.table;

    if row.layout == RowLayout::Blank {
        return state;
    }

    if is_summary_row(row) && !carries_new_security(row, &mapped.mapping) {
        if let State::InRecord(open) = state {
            close(open, method, out);
        }
        return State::Idle;
    }

    if row.layout == RowLayout::Wrapped {
        return match state {
            State::InRecord(mut open) => {
                let found = scan_text(&mut open.record, &row.text());
                settle(open, found, table, row.index, method, max_lookahead, out)
            }
            State::Idle => {
                skip(table, row, out);
                State::Idle
            }
        };
    }

    let open_has_nominal = match &state {
        State::InRecord(open) => open.record.nominal_value.is_some(),
        State::Idle => false,
    };
    let open_identifier = match &state {
        State::InRecord(open) => open.record.identifier.clone(),
        State::Idle => None,
    };

    match detect_trigger(row, &mapped.mapping, state_is_idle(&state), open_has_nominal, open_identifier.as_deref()) {
        Some(trigger) => {
            if let State::InRecord(open) = state {
                close(open, method, out);
            }
            let mut open = OpenRecord {
                record: SecurityRecord::default(),
                accuracy: None,
                quiet_rows: 0,
            };
            open.touch(table, row.index);
            fill_from_row(&mut open.record, row, &mapped.mapping, &trigger);
            State::InRecord(open)
        }
        None => match state {
            State::InRecord(mut open) => {
                let found = continue_record(&mut open.record, row, &mapped.mapping);
                settle(open, found, table, row.index, method, max_lookahead, out)
            }
            State::Idle => {
                skip(table, row, out);
                State::Idle
            }
        },
    }
}

fn state_is_idle(state: &State) -> bool {
    matches!(state, State::Idle)
}

/// Book-keeping after a detail row: attach it when it added something,
/// close the record when too many rows in a row added nothing.
fn settle(
    mut open: OpenRecord,
    found: bool,
    table: &RawTable,
    row: usize,
    method: &str,
    max_lookahead: usize,
    out: &mut PassOutput,
) -> State {
    if found {
        open.quiet_rows = 0;
        open.touch(table, row);
        return State::InRecord(open);
    }
    open.quiet_rows += 1;
    if open.quiet_rows > max_lookahead {
        log::debug!("closing record after {} quiet rows", open.quiet_rows);
        close(open, method, out);
        return State::Idle;
    }
    State::InRecord(open)
}

fn close(open: OpenRecord, method: &str, out: &mut PassOutput) {
    out.fragments.push(Fragment {
        record: open.record,
        method: method.to_string(),
        accuracy: open.accuracy,
    });
}

fn skip(table: &RawTable, row: &AnalyzedRow, out: &mut PassOutput) {
    out.rows_skipped += 1;
    out.issues.push(
        Issue::new(
            IssueKind::MalformedInput,
            format!("row does not start or continue a security: {:?}", row.text()),
        )
        .at(&table.id, row.index),
    );
}

// ---------------------------------------------------------------------------
// Row classification
// ---------------------------------------------------------------------------

fn is_summary_row(row: &AnalyzedRow) -> bool {
    row.cells
        .iter()
        .map(|c| c.trim())
        .find(|c| !c.is_empty())
        .is_some_and(is_summary_text)
}

/// Whether the row holds what any trigger needs, whatever the state. A
/// holding named "TOTAL CAPITAL ..." is still a holding.
fn carries_new_security(row: &AnalyzedRow, mapping: &ColumnMapping) -> bool {
    let identifier_cell = mapped_cell(row, mapping, Field::Identifier)
        .is_some_and(|id| looks_like_isin(&normalize_identifier(id)));
    let currency_nominal = mapped_cell(row, mapping, Field::Currency)
        .and_then(parse_currency)
        .is_some()
        && mapped_cell(row, mapping, Field::Nominal)
            .and_then(parse_number)
            .is_some();
    identifier_cell || currency_nominal || embedded_identifier(row).is_some()
}

fn detect_trigger(
    row: &AnalyzedRow,
    mapping: &ColumnMapping,
    idle: bool,
    open_has_nominal: bool,
    open_identifier: Option<&str>,
) -> Option<Trigger> {
    if let Some(id) = mapped_cell(row, mapping, Field::Identifier) {
        if looks_like_isin(&normalize_identifier(id)) {
            return Some(Trigger::Identifier);
        }
    }

    if idle || open_has_nominal {
        let currency = mapped_cell(row, mapping, Field::Currency).and_then(parse_currency);
        let nominal = mapped_cell(row, mapping, Field::Nominal).and_then(parse_number);
        if currency.is_some() && nominal.is_some() {
            return Some(Trigger::CurrencyNominal);
        }
    }

    if mapping.has(Field::Identifier) {
        return None;
    }
    let embedded = embedded_identifier(row)?;
    match open_identifier {
        Some(current) if current == embedded.0 => None,
        None if !idle => None,
        _ => Some(Trigger::EmbeddedIdentifier),
    }
}

fn mapped_cell<'r>(row: &'r AnalyzedRow, mapping: &ColumnMapping, field: Field) -> Option<&'r str> {
    mapping.column_for(field).and_then(|col| row.cell(col))
}

// ---------------------------------------------------------------------------
// Field extraction
// ---------------------------------------------------------------------------

fn fill_from_row(record: &mut SecurityRecord, row: &AnalyzedRow, mapping: &ColumnMapping, trigger: &Trigger) {
    for (&col, &field) in &mapping.columns {
        if field == Field::Description {
            continue;
        }
        if let Some(value) = row.cell(col).and_then(|cell| parse_field(field, cell)) {
            record.set(field, value);
        }
    }

    let mut description = description_text(row, mapping);

    if record.identifier.is_none() {
        if let Some((id, marker)) = embedded_identifier(row) {
            record.identifier = Some(id);
            description = description.map(|d| strip_marker(&d, &marker));
        }
    }
    if let Some(description) = description.filter(|d| !d.is_empty()) {
        record.description = Some(description);
    }

    if record.currency.is_none() {
        record.currency = currency_from_amounts(row, mapping);
    }

    if matches!(trigger, Trigger::EmbeddedIdentifier) && record.description.is_none() {
        // No description column: keep the row's free text instead.
        let text = strip_marker(&row.text(), &embedded_identifier(row).map(|e| e.1).unwrap_or_default());
        if !text.is_empty() {
            record.description = Some(text);
        }
    }

    let free = free_text(row, mapping);
    scan_text(record, &free);
}

/// Apply a detail row to the open record. Returns whether anything new was
/// learnt.
fn continue_record(record: &mut SecurityRecord, row: &AnalyzedRow, mapping: &ColumnMapping) -> bool {
    let mut found = false;

    for (&col, &field) in &mapping.columns {
        if field == Field::Description {
            continue;
        }
        if let Some(value) = row.cell(col).and_then(|cell| parse_field(field, cell)) {
            found |= record.backfill(field, value);
        }
    }

    if let Some(mut extra) = description_text(row, mapping) {
        if record.identifier.is_none() {
            if let Some((id, marker)) = embedded_identifier(row) {
                record.identifier = Some(id);
                extra = strip_marker(&extra, &marker);
                found = true;
            }
        }
        if !extra.is_empty() {
            record.description = Some(match record.description.take() {
                Some(existing) => format!("{existing} {extra}"),
                None => extra,
            });
            found = true;
        }
    }

    found |= scan_text(record, &free_text(row, mapping));
    found
}

/// Pull coupon, maturity and an embedded identifier out of free text.
/// Returns whether any field was filled.
fn scan_text(record: &mut SecurityRecord, text: &str) -> bool {
    let mut found = false;

    if record.identifier.is_none() {
        if let Some(caps) = ISIN_MARKER_RE.captures(text) {
            record.identifier = Some(caps[1].to_ascii_uppercase());
            found = true;
        }
    }

    if record.coupon_rate.is_none() {
        let coupon = COUPON_RE
            .captures_iter(text)
            .filter_map(|caps| parse_number(&caps[1]))
            .find(|rate| (0.0..=MAX_COUPON_RATE).contains(rate));
        if let Some(rate) = coupon {
            record.coupon_rate = Some(rate);
            found = true;
        }
    }

    if record.maturity_date.is_none() {
        if let Some(date) = DATE_TOKEN_RE
            .captures_iter(text)
            .find_map(|caps| parse_date(&caps[1]))
        {
            record.maturity_date = Some(date);
            found = true;
        }
    }

    found
}

fn parse_field(field: Field, cell: &str) -> Option<FieldValue> {
    match field {
        Field::Identifier => {
            let id = normalize_identifier(cell);
            looks_like_isin(&id).then_some(FieldValue::Text(id))
        }
        Field::Description => Some(FieldValue::Text(cell.to_string())),
        Field::Currency => parse_currency(cell).map(FieldValue::Text),
        Field::Maturity => parse_date(cell).map(FieldValue::Date),
        Field::Weight => parse_percent(cell)
            .or_else(|| parse_number(cell))
            .map(FieldValue::number),
        Field::Coupon => parse_percent(cell)
            .or_else(|| parse_number(cell))
            .filter(|rate| (0.0..=MAX_COUPON_RATE).contains(rate))
            .map(FieldValue::number),
        Field::Nominal | Field::Price | Field::AcquisitionPrice | Field::ActualValue => {
            parse_amount(cell).map(FieldValue::number)
        }
    }
}

/// ISO code from a code or a currency symbol.
fn parse_currency(cell: &str) -> Option<String> {
    let upper = cell.trim().to_uppercase();
    if is_currency_code(&upper) {
        return Some(upper);
    }
    currency_for_symbol(&upper).map(str::to_string)
}

/// Currency marker carried by a value or price cell (`$1,234`, `1'000 CHF`).
fn currency_from_amounts(row: &AnalyzedRow, mapping: &ColumnMapping) -> Option<String> {
    [Field::ActualValue, Field::Price, Field::Nominal]
        .into_iter()
        .filter_map(|field| mapped_cell(row, mapping, field))
        .filter_map(parse_currency_amount)
        .find_map(|(marker, _)| parse_currency(&marker))
}

fn description_text(row: &AnalyzedRow, mapping: &ColumnMapping) -> Option<String> {
    let mut cols: Vec<usize> = mapping.overflow.clone();
    cols.extend(mapping.column_for(Field::Description));
    cols.sort_unstable();
    let parts: Vec<&str> = cols
        .into_iter()
        .filter_map(|col| row.cell(col))
        .collect();
    (!parts.is_empty()).then(|| parts.join(" "))
}

/// Text of description, overflow and unmapped cells.
fn free_text(row: &AnalyzedRow, mapping: &ColumnMapping) -> String {
    row.cells
        .iter()
        .enumerate()
        .filter(|(col, _)| {
            matches!(mapping.field_for(*col), None | Some(Field::Description))
        })
        .map(|(_, c)| c.trim())
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// `ISIN: XS...` marker first; otherwise a bare token with a valid check
/// digit. Returns the identifier and the matched text.
fn embedded_identifier(row: &AnalyzedRow) -> Option<(String, String)> {
    row.cells.iter().find_map(|cell| {
        if let Some(caps) = ISIN_MARKER_RE.captures(cell) {
            return Some((caps[1].to_ascii_uppercase(), caps[0].to_string()));
        }
        ISIN_TOKEN_RE
            .captures_iter(cell)
            .map(|caps| caps[1].to_string())
            .find(|token| validate_isin(token).valid)
            .map(|token| (token.clone(), token))
    })
}

fn strip_marker(text: &str, marker: &str) -> String {
    let stripped = if marker.is_empty() {
        text.to_string()
    } else {
        text.replace(marker, " ")
    };
    stripped
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(|c: char| c == ',' || c == ';' || c == '-' || c.is_whitespace())
        .to_string()
}
