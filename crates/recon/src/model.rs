use std::collections::BTreeMap;

use chrono::NaiveDate;
use folioscan_core::{IdentifierCheck, RawTable};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::error::Issue;

// ---------------------------------------------------------------------------
// Semantic fields
// ---------------------------------------------------------------------------

/// Semantic meaning of a table column / record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Identifier,
    Description,
    Nominal,
    Price,
    AcquisitionPrice,
    ActualValue,
    Currency,
    Weight,
    Maturity,
    Coupon,
}

impl Field {
    pub const ALL: [Field; 10] = [
        Field::Identifier,
        Field::Description,
        Field::Nominal,
        Field::Price,
        Field::AcquisitionPrice,
        Field::ActualValue,
        Field::Currency,
        Field::Weight,
        Field::Maturity,
        Field::Coupon,
    ];

    /// Fields counted by the completeness gate.
    pub const CANONICAL: [Field; 8] = [
        Field::Identifier,
        Field::Description,
        Field::Nominal,
        Field::Price,
        Field::ActualValue,
        Field::Currency,
        Field::Maturity,
        Field::Coupon,
    ];
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Identifier => "identifier",
            Self::Description => "description",
            Self::Nominal => "nominal",
            Self::Price => "price",
            Self::AcquisitionPrice => "acquisition_price",
            Self::ActualValue => "actual_value",
            Self::Currency => "currency",
            Self::Weight => "weight",
            Self::Maturity => "maturity",
            Self::Coupon => "coupon",
        };
        write!(f, "{name}")
    }
}

/// A single field value, totally ordered so that votes can be counted and
/// ties broken without depending on input order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FieldValue {
    Text(String),
    Number(OrderedFloat<f64>),
    Date(NaiveDate),
}

impl FieldValue {
    pub fn number(value: f64) -> Self {
        Self::Number(OrderedFloat(value))
    }
}

// ---------------------------------------------------------------------------
// Classification tags
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityType {
    Bond,
    Equity,
    Fund,
    StructuredProduct,
    MoneyMarket,
    Derivative,
    Cash,
    Unknown,
}

impl std::fmt::Display for SecurityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Bond => "bond",
            Self::Equity => "equity",
            Self::Fund => "fund",
            Self::StructuredProduct => "structured_product",
            Self::MoneyMarket => "money_market",
            Self::Derivative => "derivative",
            Self::Cash => "cash",
            Self::Unknown => "unknown",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    PortfolioStatement,
    AccountStatement,
    TradeConfirmation,
    FundFactsheet,
    Unknown,
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::PortfolioStatement => "portfolio_statement",
            Self::AccountStatement => "account_statement",
            Self::TradeConfirmation => "trade_confirmation",
            Self::FundFactsheet => "fund_factsheet",
            Self::Unknown => "unknown",
        };
        write!(f, "{name}")
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Inclusive row span within one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RowRange {
    pub start: usize,
    pub end: usize,
}

/// Where (part of) a record came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SourceRef {
    pub page: u32,
    pub table_id: String,
    pub row_range: RowRange,
}

/// Canonical security holding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecurityRecord {
    pub identifier: Option<String>,
    pub description: Option<String>,
    pub nominal_value: Option<f64>,
    pub price: Option<f64>,
    pub acquisition_price: Option<f64>,
    pub actual_value: Option<f64>,
    pub currency: Option<String>,
    pub weight_percent: Option<f64>,
    pub maturity_date: Option<NaiveDate>,
    pub coupon_rate: Option<f64>,
    pub security_type: SecurityType,
    pub source_refs: Vec<SourceRef>,
    pub field_confidence: BTreeMap<Field, f64>,
    pub record_confidence: f64,
}

impl Default for SecurityRecord {
    fn default() -> Self {
        Self {
            identifier: None,
            description: None,
            nominal_value: None,
            price: None,
            acquisition_price: None,
            actual_value: None,
            currency: None,
            weight_percent: None,
            maturity_date: None,
            coupon_rate: None,
            security_type: SecurityType::Unknown,
            source_refs: Vec::new(),
            field_confidence: BTreeMap::new(),
            record_confidence: 0.0,
        }
    }
}

impl SecurityRecord {
    pub fn get(&self, field: Field) -> Option<FieldValue> {
        let text = |v: &Option<String>| v.clone().map(FieldValue::Text);
        let num = |v: Option<f64>| v.map(FieldValue::number);
        match field {
            Field::Identifier => text(&self.identifier),
            Field::Description => text(&self.description),
            Field::Nominal => num(self.nominal_value),
            Field::Price => num(self.price),
            Field::AcquisitionPrice => num(self.acquisition_price),
            Field::ActualValue => num(self.actual_value),
            Field::Currency => text(&self.currency),
            Field::Weight => num(self.weight_percent),
            Field::Maturity => self.maturity_date.map(FieldValue::Date),
            Field::Coupon => num(self.coupon_rate),
        }
    }

    /// Store a value. A value of the wrong kind for the field is ignored.
    pub fn set(&mut self, field: Field, value: FieldValue) {
        match (field, value) {
            (Field::Identifier, FieldValue::Text(s)) => self.identifier = Some(s),
            (Field::Description, FieldValue::Text(s)) => self.description = Some(s),
            (Field::Currency, FieldValue::Text(s)) => self.currency = Some(s),
            (Field::Maturity, FieldValue::Date(d)) => self.maturity_date = Some(d),
            (Field::Nominal, FieldValue::Number(n)) => self.nominal_value = Some(n.0),
            (Field::Price, FieldValue::Number(n)) => self.price = Some(n.0),
            (Field::AcquisitionPrice, FieldValue::Number(n)) => self.acquisition_price = Some(n.0),
            (Field::ActualValue, FieldValue::Number(n)) => self.actual_value = Some(n.0),
            (Field::Weight, FieldValue::Number(n)) => self.weight_percent = Some(n.0),
            (Field::Coupon, FieldValue::Number(n)) => self.coupon_rate = Some(n.0),
            _ => {}
        }
    }

    pub fn is_set(&self, field: Field) -> bool {
        self.get(field).is_some()
    }

    /// Set only when currently empty. Returns whether the value was stored.
    pub fn backfill(&mut self, field: Field, value: FieldValue) -> bool {
        if self.is_set(field) {
            return false;
        }
        self.set(field, value);
        self.is_set(field)
    }

    pub fn populated_canonical(&self) -> usize {
        Field::CANONICAL.iter().filter(|f| self.is_set(**f)).count()
    }
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Declared portfolio facts, parsed upstream from free text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub total_value: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    /// Asset class label → percent of portfolio.
    #[serde(default)]
    pub asset_class_breakdown: BTreeMap<String, f64>,
}

/// Everything one processing run consumes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtractionInput {
    pub tables: Vec<RawTable>,
    #[serde(default)]
    pub summary: Option<PortfolioSummary>,
    /// Free text of the document, used only for document-type classification.
    #[serde(default)]
    pub document_text: Option<String>,
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordCheck {
    pub record_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier_check: Option<IdentifierCheck>,
    /// `None` when the record has no identifier.
    pub identifier_valid: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_value: Option<f64>,
    /// `None` when nominal, price or value is missing.
    pub arithmetic_match: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllocationCheck {
    pub asset_class: String,
    pub security_type: SecurityType,
    pub declared_percent: f64,
    pub computed_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationResult {
    pub records: Vec<RecordCheck>,
    pub computed_total: f64,
    pub declared_total: Option<f64>,
    /// `declared_total − computed_total`.
    pub delta: Option<f64>,
    pub delta_percent: Option<f64>,
    pub total_within_tolerance: Option<bool>,
    pub weight_sum: Option<f64>,
    pub weight_within_tolerance: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub allocation: Vec<AllocationCheck>,
    pub currencies: Vec<String>,
    pub tolerance: f64,
    pub passed: bool,
}

// ---------------------------------------------------------------------------
// Summary + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractionSummary {
    pub total_records: usize,
    pub valid_identifiers: usize,
    pub invalid_identifiers: usize,
    pub missing_identifiers: usize,
    pub arithmetic_matches: usize,
    pub arithmetic_mismatches: usize,
    pub multi_source_records: usize,
    pub low_confidence_records: usize,
    pub mean_confidence: f64,
    pub security_type_counts: BTreeMap<String, usize>,
}

/// Counters a caller may carry across runs. The engine itself keeps no state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionStats {
    pub runs: usize,
    pub tables: usize,
    pub rows_scanned: usize,
    pub rows_skipped: usize,
    pub wrapped_rows: usize,
    pub realigned_rows: usize,
    pub fragments: usize,
    pub records: usize,
    pub issues: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionMeta {
    pub engine_version: String,
    pub document_type: DocumentType,
    pub tables: usize,
    pub extraction_passes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionResult {
    pub meta: ExtractionMeta,
    pub records: Vec<SecurityRecord>,
    pub reconciliation: ReconciliationResult,
    pub summary: ExtractionSummary,
    pub issues: Vec<Issue>,
}

impl ExtractionResult {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
