//! `folioscan-recon` — portfolio table extraction and reconciliation engine.
//!
//! Pure engine crate: receives raw tables already pulled out of a statement,
//! returns canonical security records, reconciliation checks and confidence
//! scores. No CLI or IO dependencies.

pub mod assemble;
pub mod classify;
pub mod confidence;
pub mod config;
pub mod engine;
pub mod error;
pub mod evidence;
pub mod grid;
pub mod knowledge;
pub mod mapper;
pub mod merge;
pub mod model;
pub mod numeric;
pub mod reconcile;

pub use config::EngineConfig;
pub use engine::{run, run_with_stats};
pub use error::{Issue, IssueKind, ReconError};
pub use model::{
    DocumentType, ExtractionInput, ExtractionResult, ExtractionStats, PortfolioSummary, SecurityRecord,
    SecurityType,
};
