//! Grid analysis — column count, header reliability and per-column content
//! shape for a single raw table.

use std::collections::BTreeMap;

use folioscan_core::{RawRow, RawTable};
use serde::Serialize;

use crate::knowledge::{classify_cell, match_header, ContentShape};

/// Rows at the top of a headerless table searched for an embedded header.
const HEADER_SCAN_ROWS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderSource {
    /// `RawTable::headers` as supplied by the extractor.
    Supplied,
    /// A leading data row that reads like a header.
    Promoted,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowLayout {
    /// Cell count within one of the column count.
    Conforming,
    /// Deviating row re-slotted into columns by bounding box.
    Realigned,
    /// Deviating row without usable positions: a wrapped / continuation line.
    Wrapped,
    Blank,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyzedRow {
    /// Index into `RawTable::rows`.
    pub index: usize,
    pub layout: RowLayout,
    /// Cells in column order (realigned rows are already re-slotted).
    pub cells: Vec<String>,
}

impl AnalyzedRow {
    pub fn cell(&self, column: usize) -> Option<&str> {
        self.cells
            .get(column)
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
    }

    pub fn is_aligned(&self) -> bool {
        matches!(self.layout, RowLayout::Conforming | RowLayout::Realigned)
    }

    pub fn text(&self) -> String {
        self.cells
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnProfile {
    /// Dominant shape; `None` if the column never holds a value.
    pub shape: Option<ContentShape>,
    /// Votes for the dominant shape.
    pub votes: usize,
    /// Non-empty cells seen.
    pub filled: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridAnalysis {
    pub column_count: usize,
    pub header: Vec<String>,
    pub header_source: HeaderSource,
    /// Header is non-degenerate and defines the column count.
    pub header_reliable: bool,
    pub columns: Vec<ColumnProfile>,
    pub rows: Vec<AnalyzedRow>,
}

impl GridAnalysis {
    pub fn count_layout(&self, layout: RowLayout) -> usize {
        self.rows.iter().filter(|r| r.layout == layout).count()
    }
}

// ---------------------------------------------------------------------------
// Public entry point
// ---------------------------------------------------------------------------

pub fn analyze(table: &RawTable) -> GridAnalysis {
    let (header, header_source, data_start) = resolve_header(table);
    let header_reliable = is_non_degenerate(&header);
    let data = &table.rows[data_start.min(table.rows.len())..];

    let column_count = if header_reliable {
        header.len()
    } else {
        modal_cell_count(data)
    };

    let centers = column_centers(data, column_count);

    let rows: Vec<AnalyzedRow> = data
        .iter()
        .enumerate()
        .map(|(offset, row)| {
            let index = data_start + offset;
            if row.is_blank() {
                return AnalyzedRow {
                    index,
                    layout: RowLayout::Blank,
                    cells: row.cells.clone(),
                };
            }
            if row.cells.len().abs_diff(column_count) <= 1 {
                return AnalyzedRow {
                    index,
                    layout: RowLayout::Conforming,
                    cells: row.cells.clone(),
                };
            }
            match centers.as_deref().filter(|_| row.fully_boxed()) {
                Some(centers) => AnalyzedRow {
                    index,
                    layout: RowLayout::Realigned,
                    cells: realign(row, centers),
                },
                None => AnalyzedRow {
                    index,
                    layout: RowLayout::Wrapped,
                    cells: row.cells.clone(),
                },
            }
        })
        .collect();

    let columns = (0..column_count)
        .map(|col| profile_column(&rows, col))
        .collect();

    GridAnalysis {
        column_count,
        header,
        header_source,
        header_reliable,
        columns,
        rows,
    }
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// Effective header, where it came from, and the first data row index.
fn resolve_header(table: &RawTable) -> (Vec<String>, HeaderSource, usize) {
    if !table.headers.is_empty() {
        // Some extractors repeat the header as the first row.
        let repeated = table
            .rows
            .first()
            .is_some_and(|first| same_cells(&first.cells, &table.headers));
        let start = usize::from(repeated);
        return (table.headers.clone(), HeaderSource::Supplied, start);
    }

    for (idx, row) in table.rows.iter().take(HEADER_SCAN_ROWS).enumerate() {
        if reads_like_header(row) {
            return (row.cells.clone(), HeaderSource::Promoted, idx + 1);
        }
    }

    (Vec::new(), HeaderSource::None, 0)
}

fn same_cells(a: &[String], b: &[String]) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip(b)
            .all(|(x, y)| x.trim().eq_ignore_ascii_case(y.trim()))
}

fn reads_like_header(row: &RawRow) -> bool {
    let mut pattern_hits = 0;
    for cell in &row.cells {
        match classify_cell(cell) {
            Some(shape) if shape.is_numeric() || shape == ContentShape::Identifier => return false,
            _ => {}
        }
        if match_header(cell).is_some() {
            pattern_hits += 1;
        }
    }
    pattern_hits >= 2
}

/// Distinct non-empty cells across more than half of the columns.
pub fn is_non_degenerate(header: &[String]) -> bool {
    if header.is_empty() {
        return false;
    }
    let mut distinct: Vec<String> = header
        .iter()
        .map(|h| h.trim().to_lowercase())
        .filter(|h| !h.is_empty())
        .collect();
    distinct.sort_unstable();
    distinct.dedup();
    distinct.len() * 2 > header.len()
}

// ---------------------------------------------------------------------------
// Column count + positions
// ---------------------------------------------------------------------------

/// Most common cell count among non-blank rows; ties go to the wider layout.
fn modal_cell_count(rows: &[RawRow]) -> usize {
    let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
    for row in rows.iter().filter(|r| !r.is_blank()) {
        *counts.entry(row.cells.len()).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)))
        .map(|(len, _)| len)
        .unwrap_or(0)
}

/// Mean x-centre per column, learnt from fully boxed rows with exactly
/// `column_count` cells. `None` unless every column has at least one sample.
fn column_centers(rows: &[RawRow], column_count: usize) -> Option<Vec<f64>> {
    if column_count == 0 {
        return None;
    }
    let mut sums = vec![(0.0_f64, 0_usize); column_count];
    for row in rows
        .iter()
        .filter(|r| r.cells.len() == column_count && r.fully_boxed())
    {
        for (col, bbox) in row.boxes.iter().enumerate() {
            if let Some(bbox) = bbox {
                sums[col].0 += bbox.center_x();
                sums[col].1 += 1;
            }
        }
    }
    sums.into_iter()
        .map(|(sum, n)| (n > 0).then(|| sum / n as f64))
        .collect()
}

fn realign(row: &RawRow, centers: &[f64]) -> Vec<String> {
    let mut cells = vec![String::new(); centers.len()];
    for (cell, bbox) in row.cells.iter().zip(&row.boxes) {
        let text = cell.trim();
        let Some(bbox) = bbox else { continue };
        if text.is_empty() {
            continue;
        }
        let x = bbox.center_x();
        let col = centers
            .iter()
            .enumerate()
            .min_by(|a, b| (a.1 - x).abs().total_cmp(&(b.1 - x).abs()))
            .map(|(i, _)| i)
            .unwrap_or(0);
        if !cells[col].is_empty() {
            cells[col].push(' ');
        }
        cells[col].push_str(text);
    }
    cells
}

// ---------------------------------------------------------------------------
// Shape vote
// ---------------------------------------------------------------------------

fn profile_column(rows: &[AnalyzedRow], col: usize) -> ColumnProfile {
    let mut votes: BTreeMap<ContentShape, usize> = BTreeMap::new();
    let mut filled = 0;
    for row in rows.iter().filter(|r| r.is_aligned()) {
        if let Some(shape) = row.cell(col).and_then(classify_cell) {
            filled += 1;
            *votes.entry(shape).or_insert(0) += 1;
        }
    }
    // Plurality; on a tie the higher-priority (smaller) shape wins.
    let winner = votes
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)));
    ColumnProfile {
        shape: winner.map(|(s, _)| s),
        votes: winner.map_or(0, |(_, n)| n),
        filled,
    }
}
