//! Streaming CSV ingestion into a search index, with pre-flight checks.
//!
//! - Pre-flight: configuration guards, file check, header structure,
//!   cluster connection, index existence, headers against the index mapping,
//!   data line count.
//! - Streaming: one line at a time (gzip/zstd and non-UTF-8 charsets
//!   decoded on the fly), each parsed row turned into a typed [`Record`].
//!
//! Data shape:
//! - `Record`: header name to `null`, number or trimmed string, plus
//!   [`METADATA_FIELD`] holding the run metadata.
//! - Diagnostics: every check appends to a [`Report`] instead of printing.
#![cfg_attr(docsrs, feature(doc_cfg))]
//
mod codec;
mod config;
mod headers;
mod io;
mod mapping;
mod parse;
mod pipeline;
mod record;
mod report;
mod search;

pub use crate::codec::{LineCodec, MAX_LINE_LENGTH};
pub use crate::config::{
    validate_batch_size, validate_delimiter, validate_encoding, IngestConfig, DEFAULT_BATCH_SIZE,
    DEFAULT_DELIMITER, DEFAULT_URL, LARGE_BATCH_SIZE,
};
pub use crate::headers::{validate_structure, HeaderSet};
pub use crate::io::{
    build_csv_reader, check_file, count_data_lines, lines_from_path, reader_from_path, CsvMeta,
    CsvReader, LineStream,
};
pub use crate::mapping::{compare_headers, validate_mapping, IndexSchema, MappingCheck};
pub use crate::parse::{parse_line, ParseError, ParsedLine, RawLine};
pub use crate::pipeline::{preflight, IngestPlan, IngestSummary, Ingestion, RecordSink};
pub use crate::record::{build_record, coerce_cell, parse_number, Metadata, Record, METADATA_FIELD};
pub use crate::report::{Diagnostic, Report, Severity};
pub use crate::search::{
    check_connection, check_index, fetch_mapping, ConnectError, ElasticsearchClient,
    SearchBackend,
};

use thiserror::Error;

/// Error type returned by this crate when not using `anyhow`.
///
/// A line that fails to parse is not an error: it is skipped and reported.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("File '{0}' does not exist")]
    FileNotFound(String),
    #[error("File '{0}' is not readable")]
    FileNotReadable(String),
    #[error("File '{0}' is empty")]
    EmptyFile(String),
    #[error("File '{0}' has no data rows")]
    NoDataRows(String),
    #[error("Invalid configuration")]
    InvalidConfig,
    #[error("Invalid CSV headers in '{0}'")]
    InvalidHeaders(String),
    #[error("CSV headers do not match the mapping of index '{index}'")]
    SchemaMismatch { index: String, check: MappingCheck },
    #[error("Index '{index}' does not exist")]
    IndexNotFound {
        index: String,
        available: Vec<String>,
    },
    #[error(transparent)]
    Connect(#[from] ConnectError),
    #[error(transparent)]
    Sink(anyhow::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type IngestResult<T> = std::result::Result<T, IngestError>;
