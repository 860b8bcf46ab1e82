//! Typed documents built from parsed rows.

use serde::Serialize;
use serde_json::{Map, Number, Value};

/// Reserved document key holding the run metadata.
pub const METADATA_FIELD: &str = "submission_metadata";

/// Largest integer an f64 holds exactly (2^53 - 1).
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Key-value pairs attached to every record of a run.
pub type Metadata = Map<String, Value>;

/// One document: header name to typed value, plus [`METADATA_FIELD`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn metadata(&self) -> Option<&Value> {
        self.0.get(METADATA_FIELD)
    }

    /// Number of keys, the metadata key included.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

/// Build a record by walking `headers` in order and taking the cell at the
/// same position.
///
/// Cells missing from a short row, and blank cells, become `null`. Cells
/// that read as a number become numbers and everything else is kept as
/// trimmed text. Extra trailing cells are ignored. A header named
/// [`METADATA_FIELD`] replaces the metadata with its own value.
pub fn build_record(cells: &[String], headers: &[String], metadata: &Metadata) -> Record {
    let mut fields = Map::new();
    fields.insert(METADATA_FIELD.to_string(), Value::Object(metadata.clone()));
    for (i, header) in headers.iter().enumerate() {
        let value = coerce_cell(cells.get(i).map(String::as_str));
        fields.insert(header.clone(), value);
    }
    Record(fields)
}

/// Typed value for one cell.
pub fn coerce_cell(cell: Option<&str>) -> Value {
    let Some(text) = cell.map(str::trim).filter(|t| !t.is_empty()) else {
        return Value::Null;
    };
    match parse_number(text) {
        Some(n) => Value::Number(n),
        None => Value::String(text.to_string()),
    }
}

/// Decimal, signed, fractional or exponent forms (`"007"`, `"-3.14"`,
/// `"1e3"`, `".5"`). Integral values are stored as integers so they
/// serialize without a fraction. Non-finite results (`"inf"`, `"1e999"`)
/// stay text since JSON cannot carry them.
///
/// Radix literals and spelled-out infinities (`"0x1F"`, `"0b1"`,
/// `"Infinity"`) are deliberately left as text.
pub fn parse_number(text: &str) -> Option<Number> {
    let text = text.trim();
    if !text.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }
    let value: f64 = text.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    if value.fract() == 0.0 && value.abs() <= MAX_SAFE_INTEGER {
        Some(Number::from(value as i64))
    } else {
        Number::from_f64(value)
    }
}
