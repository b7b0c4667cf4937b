//! `folioscan-core` — leaf types shared by the extraction engine.
//!
//! Raw tables as handed over by external table/OCR extractors, and the
//! security identifier checksum.

pub mod identifier;
pub mod table;

pub use identifier::{validate_isin, CheckReason, IdentifierCheck};
pub use table::{BoundingBox, RawRow, RawTable};
