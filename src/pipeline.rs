//! Pre-flight validation and the ordered record stream.

use crate::config::IngestConfig;
use crate::headers::{validate_structure, HeaderSet};
use crate::io::{check_file, count_data_lines, lines_from_path, LineStream};
use crate::mapping::{validate_mapping, IndexSchema};
use crate::parse::{parse_line, ParsedLine, RawLine};
use crate::record::{build_record, Metadata, Record};
use crate::report::{Diagnostic, Report};
use crate::search::{check_connection, check_index, fetch_mapping, SearchBackend};
use crate::{IngestError, IngestResult};
use async_trait::async_trait;
use crc32fast::Hasher as Crc32;
use futures::StreamExt;
use serde::Serialize;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Records between progress log lines.
const PROGRESS_EVERY: u64 = 10_000;

/// Receives records in file order, grouped by the configured batch size.
#[async_trait]
pub trait RecordSink: Send {
    async fn send_batch(&mut self, batch: Vec<Record>) -> anyhow::Result<()>;
}

/// Everything pre-flight established; read-only for the rest of the run.
#[derive(Debug, Clone)]
pub struct IngestPlan {
    path: PathBuf,
    charset: &'static encoding_rs::Encoding,
    delimiter: u8,
    batch_len: usize,
    headers: Arc<HeaderSet>,
    metadata: Arc<Metadata>,
    schema: IndexSchema,
    total_records: u64,
}

impl IngestPlan {
    pub fn headers(&self) -> &HeaderSet {
        &self.headers
    }

    pub fn schema(&self) -> &IndexSchema {
        &self.schema
    }

    /// Data lines counted in the file, used for progress.
    pub fn total_records(&self) -> u64 {
        self.total_records
    }

    pub fn batch_len(&self) -> usize {
        self.batch_len
    }
}

/// Outcome of a finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub total_records: u64,
    pub records: u64,
    pub skipped_lines: u64,
    /// CRC32 over each record's JSON in order; equal across identical runs.
    pub checksum: u32,
}

/// Run every check that must pass before a single record is produced.
///
/// Order: configuration, file, header structure, cluster connection, index,
/// header/mapping match, then the data line count. The first failure ends
/// pre-flight; its diagnostics are in `report`.
pub async fn preflight<B>(
    config: &IngestConfig,
    backend: &B,
    report: &mut Report,
) -> IngestResult<IngestPlan>
where
    B: SearchBackend + ?Sized,
{
    if !config.validate(report) {
        return Err(IngestError::InvalidConfig);
    }
    let delimiter = config.delimiter_byte().ok_or(IngestError::InvalidConfig)?;
    let charset = config.charset();
    let path = config.file.as_path();
    let shown = path.display().to_string();

    check_file(path, report).await?;

    let raw_headers = read_header(path, charset, delimiter, report).await?;
    if !validate_structure(&raw_headers, report) {
        return Err(IngestError::InvalidHeaders(shown));
    }
    let headers = HeaderSet::new(&raw_headers);

    check_connection(backend, report).await?;
    check_index(backend, &config.index, report).await?;
    let schema = fetch_mapping(backend, &config.index, report).await?;

    let check = validate_mapping(&schema, &headers, report);
    if !check.is_match() {
        return Err(IngestError::SchemaMismatch {
            index: config.index.clone(),
            check,
        });
    }

    let counted = count_data_lines(path, charset).await?;
    if counted < 1 {
        report.push(Diagnostic::error(format!("File '{shown}' has no data rows")));
        return Err(IngestError::NoDataRows(shown));
    }
    info!(records = counted, path = %shown, "found data records");

    Ok(IngestPlan {
        path: path.to_path_buf(),
        charset,
        delimiter,
        batch_len: config.batch_len(),
        headers: Arc::new(headers),
        metadata: Arc::new(config.metadata.clone()),
        schema,
        total_records: counted as u64,
    })
}

/// Raw cells of line 1, before trimming is validated.
async fn read_header(
    path: &std::path::Path,
    charset: &'static encoding_rs::Encoding,
    delimiter: u8,
    report: &mut Report,
) -> IngestResult<Vec<String>> {
    let mut lines = lines_from_path(path, charset).await?;
    let Some(first) = lines.next().await else {
        return Ok(Vec::new());
    };
    let raw = RawLine::header(first?.freeze());
    match parse_line(&raw, delimiter) {
        ParsedLine::Rows(rows) => Ok(rows.into_iter().next().unwrap_or_default()),
        ParsedLine::Skipped(diagnostic) => {
            report.push(Diagnostic::error(diagnostic.message).with_details(diagnostic.details));
            Err(IngestError::InvalidHeaders(path.display().to_string()))
        }
    }
}

/// Pull-based record stream over the data lines of a planned run.
///
/// Records come out in file order. A line that fails to parse is reported
/// and skipped. Dropping the value closes the file.
pub struct Ingestion {
    lines: LineStream,
    line_number: u64,
    pending: VecDeque<Record>,
    headers: Arc<HeaderSet>,
    metadata: Arc<Metadata>,
    delimiter: u8,
    batch_len: usize,
    total_records: u64,
    records: u64,
    skipped_lines: u64,
    crc: Crc32,
}

impl Ingestion {
    /// Open the planned file and position after the header line.
    pub async fn start(plan: &IngestPlan) -> IngestResult<Self> {
        let mut lines = lines_from_path(&plan.path, plan.charset).await?;
        if let Some(header) = lines.next().await {
            header?;
        }
        Ok(Self {
            lines,
            line_number: 1,
            pending: VecDeque::new(),
            headers: Arc::clone(&plan.headers),
            metadata: Arc::clone(&plan.metadata),
            delimiter: plan.delimiter,
            batch_len: plan.batch_len.max(1),
            total_records: plan.total_records,
            records: 0,
            skipped_lines: 0,
            crc: Crc32::new(),
        })
    }

    /// Next record, or `None` at end of file.
    pub async fn next_record(&mut self, report: &mut Report) -> IngestResult<Option<Record>> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                self.account(&record)?;
                return Ok(Some(record));
            }

            let Some(line) = self.lines.next().await else {
                return Ok(None);
            };
            self.line_number += 1;
            let raw = RawLine::data(self.line_number, line?.freeze());
            match parse_line(&raw, self.delimiter) {
                ParsedLine::Rows(rows) => self.pending.extend(
                    rows.iter()
                        .map(|cells| build_record(cells, &self.headers, &self.metadata)),
                ),
                ParsedLine::Skipped(diagnostic) => {
                    self.skipped_lines += 1;
                    report.push(diagnostic);
                }
            }
        }
    }

    /// Drain the file into `sink` in batches of the planned size.
    pub async fn run<S>(mut self, sink: &mut S, report: &mut Report) -> IngestResult<IngestSummary>
    where
        S: RecordSink + ?Sized,
    {
        let mut batch = Vec::with_capacity(self.batch_len);
        while let Some(record) = self.next_record(report).await? {
            batch.push(record);
            if batch.len() >= self.batch_len {
                let full = std::mem::replace(&mut batch, Vec::with_capacity(self.batch_len));
                sink.send_batch(full).await.map_err(IngestError::Sink)?;
            }
        }
        if !batch.is_empty() {
            sink.send_batch(batch).await.map_err(IngestError::Sink)?;
        }

        let summary = self.summary();
        info!(
            records = summary.records,
            skipped = summary.skipped_lines,
            checksum = %format!("0x{:08x}", summary.checksum),
            "ingestion finished"
        );
        Ok(summary)
    }

    pub fn summary(&self) -> IngestSummary {
        IngestSummary {
            total_records: self.total_records,
            records: self.records,
            skipped_lines: self.skipped_lines,
            checksum: self.crc.clone().finalize(),
        }
    }

    fn account(&mut self, record: &Record) -> IngestResult<()> {
        // records are separated by 0x1e (record separator)
        if self.records > 0 {
            self.crc.update(&[0x1e]);
        }
        self.crc.update(&serde_json::to_vec(record)?);
        self.records += 1;

        if self.records % PROGRESS_EVERY == 0 {
            let percent = if self.total_records > 0 {
                self.records as f64 * 100.0 / self.total_records as f64
            } else {
                0.0
            };
            info!(
                records = self.records,
                total = self.total_records,
                percent = %format!("{percent:.1}"),
                "progress"
            );
        }
        Ok(())
    }
}
