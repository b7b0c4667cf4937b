use std::fmt;

use serde::Serialize;

/// Fatal errors. Only invalid configuration stops a run; everything that goes
/// wrong inside a document is reported as an [`Issue`] instead.
#[derive(Debug)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config value out of range.
    ConfigValidation(String),
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
        }
    }
}

impl std::error::Error for ReconError {}

// ---------------------------------------------------------------------------
// Non-fatal diagnostics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// Row or column shape could not be used; the row was skipped.
    MalformedInput,
    /// Checksum or arithmetic mismatch on a record.
    ValidationFailure,
    /// Portfolio sum or weight sum outside tolerance.
    ReconciliationMismatch,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedInput => write!(f, "malformed_input"),
            Self::ValidationFailure => write!(f, "validation_failure"),
            Self::ReconciliationMismatch => write!(f, "reconciliation_mismatch"),
        }
    }
}

/// A recorded, non-fatal problem.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Issue {
    pub kind: IssueKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row: Option<usize>,
    pub message: String,
}

impl Issue {
    pub fn new(kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            table_id: None,
            row: None,
            message: message.into(),
        }
    }

    pub fn at(mut self, table_id: &str, row: usize) -> Self {
        self.table_id = Some(table_id.to_string());
        self.row = Some(row);
        self
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.table_id, self.row) {
            (Some(table), Some(row)) => {
                write!(f, "{} (table '{table}', row {row}): {}", self.kind, self.message)
            }
            _ => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}
