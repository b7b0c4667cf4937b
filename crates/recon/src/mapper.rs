//! Column concept mapping: decide which column of a table carries which
//! semantic field.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::grid::GridAnalysis;
use crate::knowledge::{match_header, ContentShape};
use crate::model::Field;
use crate::numeric::parse_number;

/// Upper bound for a column to be read as a percent-of-par price.
const MAX_PLAUSIBLE_PRICE: f64 = 1000.0;

/// Column index → field. At most one column per field; extra description
/// columns are kept in `overflow`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ColumnMapping {
    pub columns: BTreeMap<usize, Field>,
    pub overflow: Vec<usize>,
    /// Copied from the preceding table of the same pass.
    pub inherited: bool,
}

impl ColumnMapping {
    pub fn column_for(&self, field: Field) -> Option<usize> {
        self.columns
            .iter()
            .find(|(_, f)| **f == field)
            .map(|(col, _)| *col)
    }

    pub fn field_for(&self, column: usize) -> Option<Field> {
        self.columns.get(&column).copied()
    }

    pub fn has(&self, field: Field) -> bool {
        self.column_for(field).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    fn is_taken(&self, column: usize) -> bool {
        self.columns.contains_key(&column) || self.overflow.contains(&column)
    }

    fn assign(&mut self, column: usize, field: Field) {
        self.columns.retain(|_, f| *f != field);
        self.overflow.retain(|c| *c != column);
        self.columns.insert(column, field);
    }

    fn add_overflow(&mut self, column: usize) {
        if !self.overflow.contains(&column) {
            self.overflow.push(column);
            self.overflow.sort_unstable();
        }
    }
}

// ---------------------------------------------------------------------------
// Public entry point
// ---------------------------------------------------------------------------

pub fn map_columns(grid: &GridAnalysis) -> ColumnMapping {
    let mut mapping = ColumnMapping::default();

    if grid.header_reliable {
        map_headers(grid, &mut mapping);
    }
    claim_identifier_column(grid, &mut mapping);
    map_shapes(grid, &mut mapping);
    if !grid.header_reliable {
        map_positional_numbers(grid, &mut mapping);
    }

    mapping
}

/// Pass 1: header text. Per field the strongest pattern wins, then the
/// leftmost column.
fn map_headers(grid: &GridAnalysis, mapping: &mut ColumnMapping) {
    let mut best: BTreeMap<Field, (usize, usize)> = BTreeMap::new();
    let mut losers: Vec<(usize, Field)> = Vec::new();

    for col in 0..grid.column_count {
        let Some((field, rank)) = grid.header.get(col).and_then(|h| match_header(h)) else {
            continue;
        };
        match best.get(&field) {
            Some(&(best_rank, best_col)) if (best_rank, best_col) <= (rank, col) => {
                losers.push((col, field));
            }
            Some(&(_, best_col)) => {
                losers.push((best_col, field));
                best.insert(field, (rank, col));
            }
            None => {
                best.insert(field, (rank, col));
            }
        }
    }

    for (field, (_, col)) in best {
        mapping.assign(col, field);
    }
    for (col, field) in losers {
        if field == Field::Description {
            mapping.add_overflow(col);
        }
    }
}

/// Identifier-shaped content outranks whatever the header says.
fn claim_identifier_column(grid: &GridAnalysis, mapping: &mut ColumnMapping) {
    let Some(col) = grid
        .columns
        .iter()
        .position(|p| p.shape == Some(ContentShape::Identifier))
    else {
        return;
    };
    let displaced = mapping.field_for(col);
    mapping.assign(col, Field::Identifier);
    if displaced == Some(Field::Description) && !mapping.overflow.is_empty() {
        let next = mapping.overflow.remove(0);
        mapping.assign(next, Field::Description);
    }
}

/// Pass 2: unmapped columns take their shape-implied field when it is free.
/// Candidates are visited by shape priority, then column index.
fn map_shapes(grid: &GridAnalysis, mapping: &mut ColumnMapping) {
    let mut candidates: Vec<(ContentShape, usize)> = grid
        .columns
        .iter()
        .enumerate()
        .filter(|(col, _)| !mapping.is_taken(*col))
        .filter_map(|(col, p)| p.shape.map(|s| (s, col)))
        .collect();
    candidates.sort_unstable();

    for (shape, col) in candidates {
        let Some(field) = shape.implied_field() else {
            continue;
        };
        if !mapping.has(field) {
            mapping.assign(col, field);
        } else if field == Field::Description && adjacent_to_description(mapping, col) {
            mapping.add_overflow(col);
        }
    }
}

fn adjacent_to_description(mapping: &ColumnMapping, col: usize) -> bool {
    let mut description_cols: Vec<usize> = mapping.overflow.clone();
    description_cols.extend(mapping.column_for(Field::Description));
    description_cols
        .iter()
        .any(|c| c.abs_diff(col) == 1)
}

/// Pass 3, headerless tables only: read bare number columns by position.
/// Nominal sits right of the currency, price is a small decimal, value is
/// the rightmost remaining number.
fn map_positional_numbers(grid: &GridAnalysis, mapping: &mut ColumnMapping) {
    let number_cols = |mapping: &ColumnMapping| -> Vec<usize> {
        (0..grid.column_count)
            .filter(|col| !mapping.is_taken(*col))
            .filter(|col| grid.columns[*col].shape == Some(ContentShape::Number))
            .collect()
    };

    if !mapping.has(Field::Nominal) {
        if let Some(currency_col) = mapping.column_for(Field::Currency) {
            if number_cols(mapping).contains(&(currency_col + 1)) {
                mapping.assign(currency_col + 1, Field::Nominal);
            }
        }
    }

    if !mapping.has(Field::Price) {
        if let Some(col) = number_cols(mapping)
            .into_iter()
            .find(|col| looks_like_price_column(grid, *col))
        {
            mapping.assign(col, Field::Price);
        }
    }

    if !mapping.has(Field::ActualValue) {
        if let Some(col) = number_cols(mapping).into_iter().next_back() {
            mapping.assign(col, Field::ActualValue);
        }
    }
}

fn looks_like_price_column(grid: &GridAnalysis, col: usize) -> bool {
    let values: Vec<(f64, bool)> = grid
        .rows
        .iter()
        .filter(|r| r.is_aligned())
        .filter_map(|r| r.cell(col))
        .filter_map(|c| parse_number(c).map(|v| (v, c.contains(['.', ',']))))
        .collect();
    !values.is_empty()
        && values
            .iter()
            .all(|(v, _)| *v > 0.0 && *v <= MAX_PLAUSIBLE_PRICE)
        && values.iter().any(|(_, has_decimals)| *has_decimals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::analyze;
    use folioscan_core::RawTable;

    #[test]
    fn header_mapping() {
        let table = RawTable::new("t", 1, "lattice")
            .with_headers(["Currency", "Nominal", "Description", "Price", "Value"])
            .with_row(["USD", "200'000", "EXAMPLE BANK NOTES ISIN: XS2530507273", "99.37", "198745"]);
        let mapping = map_columns(&analyze(&table));
        assert_eq!(mapping.field_for(0), Some(Field::Currency));
        assert_eq!(mapping.field_for(1), Some(Field::Nominal));
        assert_eq!(mapping.field_for(2), Some(Field::Description));
        assert_eq!(mapping.field_for(3), Some(Field::Price));
        assert_eq!(mapping.field_for(4), Some(Field::ActualValue));
        assert!(mapping.overflow.is_empty());
    }

    #[test]
    fn stronger_pattern_wins_conflict() {
        // "Market value" is a stronger pattern than the "value" in "Value date".
        let table = RawTable::new("t", 1, "lattice")
            .with_headers(["Value date", "Security", "Market value"])
            .with_row(["15.03.2024", "ROCHE", "1'000"]);
        let mapping = map_columns(&analyze(&table));
        assert_eq!(mapping.field_for(2), Some(Field::ActualValue));
        // The losing "Value date" column is re-read from its content.
        assert_eq!(mapping.field_for(0), Some(Field::Maturity));
    }

    #[test]
    fn equal_rank_prefers_leftmost() {
        let table = RawTable::new("t", 1, "lattice")
            .with_headers(["Price", "Price", "Security"])
            .with_row(["99.5", "100.1", "X"]);
        let mapping = map_columns(&analyze(&table));
        assert_eq!(mapping.column_for(Field::Price), Some(0));
        assert_eq!(mapping.field_for(1), None);
    }

    #[test]
    fn identifier_shape_overrides_text_header() {
        let table = RawTable::new("t", 1, "lattice")
            .with_headers(["Security", "Name", "Market value"])
            .with_row(["XS2530507273", "EXAMPLE NOTES", "198'745"])
            .with_row(["CH0012032042", "ROCHE", "1'000"]);
        let mapping = map_columns(&analyze(&table));
        assert_eq!(mapping.field_for(0), Some(Field::Identifier));
        // Description moves to the runner-up description column.
        assert_eq!(mapping.field_for(1), Some(Field::Description));
    }

    #[test]
    fn headerless_shapes_and_positions() {
        let table = RawTable::new("t", 2, "stream")
            .with_row(["USD", "200'000", "EXAMPLE BANK NOTES", "99.37", "198'745"])
            .with_row(["CHF", "1'000", "ROCHE HOLDING", "251.20", "251'200"]);
        let mapping = map_columns(&analyze(&table));
        assert_eq!(mapping.field_for(0), Some(Field::Currency));
        assert_eq!(mapping.field_for(1), Some(Field::Nominal));
        assert_eq!(mapping.field_for(2), Some(Field::Description));
        assert_eq!(mapping.field_for(3), Some(Field::Price));
        assert_eq!(mapping.field_for(4), Some(Field::ActualValue));
    }

    #[test]
    fn adjacent_text_columns_overflow_into_description() {
        let table = RawTable::new("t", 2, "stream")
            .with_row(["XS2530507273", "EXAMPLE BANK", "SENIOR NOTES", "198'745"]);
        let mapping = map_columns(&analyze(&table));
        assert_eq!(mapping.field_for(1), Some(Field::Description));
        assert_eq!(mapping.overflow, vec![2]);
    }

    #[test]
    fn at_most_one_column_per_field() {
        let table = RawTable::new("t", 1, "lattice")
            .with_headers(["Currency", "Ccy", "Value", "Amount"])
            .with_row(["USD", "USD", "1", "2"]);
        let mapping = map_columns(&analyze(&table));
        let fields: std::collections::BTreeSet<Field> = mapping.columns.values().copied().collect();
        assert_eq!(fields.len(), mapping.columns.len());
        assert_eq!(mapping.column_for(Field::Currency), Some(0));
        assert_eq!(mapping.column_for(Field::ActualValue), Some(2));
    }
}
