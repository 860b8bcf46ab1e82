//! Run configuration and the guards that check it before any I/O.

use crate::record::Metadata;
use crate::report::{Diagnostic, Report};
use serde::Deserialize;
use std::path::PathBuf;

pub const DEFAULT_URL: &str = "http://localhost:9200";
pub const DEFAULT_DELIMITER: &str = ",";
pub const DEFAULT_BATCH_SIZE: f64 = 1000.0;

/// Batch sizes above this risk memory pressure and bulk timeouts downstream.
pub const LARGE_BATCH_SIZE: f64 = 10_000.0;

#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    pub file: PathBuf,
    pub index: String,
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: f64,
    /// Charset label of the input, e.g. "utf-8" or "windows-1252".
    #[serde(default)]
    pub encoding: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

fn default_url() -> String {
    DEFAULT_URL.to_string()
}

fn default_delimiter() -> String {
    DEFAULT_DELIMITER.to_string()
}

fn default_batch_size() -> f64 {
    DEFAULT_BATCH_SIZE
}

impl IngestConfig {
    pub fn new(file: impl Into<PathBuf>, index: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            index: index.into(),
            url: default_url(),
            delimiter: default_delimiter(),
            batch_size: DEFAULT_BATCH_SIZE,
            encoding: None,
            metadata: Metadata::new(),
        }
    }

    /// Run every guard, reporting each failure. True when all pass.
    pub fn validate(&self, report: &mut Report) -> bool {
        let batch = validate_batch_size(self.batch_size, report);
        let delimiter = validate_delimiter(&self.delimiter, report);
        let encoding = match &self.encoding {
            Some(label) => validate_encoding(label, report),
            None => true,
        };
        batch && delimiter && encoding
    }

    /// Delimiter as the byte the row parser splits on.
    pub fn delimiter_byte(&self) -> Option<u8> {
        single_byte(&self.delimiter)
    }

    /// Records per downstream batch; meaningful once validated.
    pub fn batch_len(&self) -> usize {
        self.batch_size as usize
    }

    pub fn charset(&self) -> &'static encoding_rs::Encoding {
        self.encoding
            .as_deref()
            .and_then(|l| encoding_rs::Encoding::for_label(l.as_bytes()))
            .unwrap_or(encoding_rs::UTF_8)
    }
}

/// Fails unless `batch_size` is a finite number of at least one. Sizes
/// above [`LARGE_BATCH_SIZE`] pass with a warning.
pub fn validate_batch_size(batch_size: f64, report: &mut Report) -> bool {
    if !batch_size.is_finite() || batch_size < 1.0 {
        report.push(
            Diagnostic::error("Invalid batch size")
                .with_details([format!("Batch size: {batch_size}")])
                .with_hints(["Batch size must be a positive number"]),
        );
        return false;
    }

    if batch_size > LARGE_BATCH_SIZE {
        report.push(
            Diagnostic::warning("Large batch size detected")
                .with_details([
                    format!("Batch size: {batch_size}"),
                    "Large batch sizes may cause memory issues or timeouts".to_string(),
                ])
                .with_hints(["Recommended batch size is between 500 and 5000"]),
        );
    }
    true
}

/// Fails unless `delimiter` is exactly one single-byte character.
pub fn validate_delimiter(delimiter: &str, report: &mut Report) -> bool {
    if delimiter.chars().count() != 1 {
        report.push(
            Diagnostic::error("Invalid delimiter")
                .with_details([format!("Delimiter: {delimiter:?}")])
                .with_hints(["Delimiter must be a single character"]),
        );
        return false;
    }
    if single_byte(delimiter).is_none() {
        report.push(
            Diagnostic::error("Unsupported delimiter")
                .with_details([format!("Delimiter: {delimiter:?}")])
                .with_hints(["Delimiter must be an ASCII character"]),
        );
        return false;
    }
    true
}

pub fn validate_encoding(label: &str, report: &mut Report) -> bool {
    if encoding_rs::Encoding::for_label(label.as_bytes()).is_none() {
        report.push(
            Diagnostic::error("Unknown character encoding")
                .with_details([format!("Encoding: {label}")])
                .with_hints(["Use a WHATWG encoding label such as utf-8 or windows-1252"]),
        );
        return false;
    }
    true
}

fn single_byte(delimiter: &str) -> Option<u8> {
    match delimiter.as_bytes() {
        [b] if b.is_ascii() => Some(*b),
        _ => None,
    }
}
