use serde::{Deserialize, Serialize};

/// Page-space rectangle of a cell as reported by the extractor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl BoundingBox {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn center_x(&self) -> f64 {
        (self.x0 + self.x1) / 2.0
    }
}

/// One extracted row. `boxes` is either empty or parallel to `cells`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawRowRepr")]
pub struct RawRow {
    pub cells: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub boxes: Vec<Option<BoundingBox>>,
}

/// Extractors emit rows either as bare string arrays or as objects with boxes.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawRowRepr {
    Cells(Vec<String>),
    Full {
        cells: Vec<String>,
        #[serde(default)]
        boxes: Vec<Option<BoundingBox>>,
    },
}

impl From<RawRowRepr> for RawRow {
    fn from(repr: RawRowRepr) -> Self {
        match repr {
            RawRowRepr::Cells(cells) => Self {
                cells,
                boxes: Vec::new(),
            },
            RawRowRepr::Full { cells, boxes } => Self { cells, boxes },
        }
    }
}

impl RawRow {
    pub fn new<I, S>(cells: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cells: cells.into_iter().map(Into::into).collect(),
            boxes: Vec::new(),
        }
    }

    pub fn with_boxes(mut self, boxes: Vec<Option<BoundingBox>>) -> Self {
        self.boxes = boxes;
        self
    }

    /// Every cell carries a bounding box.
    pub fn fully_boxed(&self) -> bool {
        !self.cells.is_empty()
            && self.boxes.len() == self.cells.len()
            && self.boxes.iter().all(Option::is_some)
    }

    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|c| c.trim().is_empty())
    }

    /// All non-empty cells joined with single spaces.
    pub fn text(&self) -> String {
        self.cells
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A table as produced by one external extraction pass over one page region.
///
/// Read-only input to a processing run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTable {
    /// Caller-assigned id, unique within a run.
    pub id: String,
    /// 1-based source page.
    pub page: u32,
    /// Extraction-method tag (`lattice`, `stream`, `ocr`, …). Tables sharing
    /// a tag form one extraction pass.
    pub method: String,
    #[serde(default)]
    pub headers: Vec<String>,
    #[serde(default)]
    pub rows: Vec<RawRow>,
    /// Optional accuracy hint from the extractor; higher is better.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
}

impl RawTable {
    pub fn new(id: impl Into<String>, page: u32, method: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            page,
            method: method.into(),
            headers: Vec::new(),
            rows: Vec::new(),
            accuracy: None,
        }
    }

    pub fn with_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.headers = headers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_row<I, S>(mut self, cells: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rows.push(RawRow::new(cells));
        self
    }

    pub fn with_raw_row(mut self, row: RawRow) -> Self {
        self.rows.push(row);
        self
    }

    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = Some(accuracy);
        self
    }

    /// The accuracy hint, ignoring non-finite values.
    pub fn accuracy_hint(&self) -> Option<f64> {
        self.accuracy.filter(|a| a.is_finite())
    }
}
