use anyhow::{anyhow, Context};
use async_trait::async_trait;
use clap::{Arg, ArgAction, Command};
use csv_index_ingest::{
    preflight, ElasticsearchClient, IngestConfig, Ingestion, Metadata, Record, RecordSink, Report,
    DEFAULT_DELIMITER, DEFAULT_URL,
};
use serde_json::Value;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Writes each batch as newline-delimited JSON, standing in for bulk writes.
struct NdjsonSink<W> {
    out: W,
    batches: u64,
}

#[async_trait]
impl<W: Write + Send> RecordSink for NdjsonSink<W> {
    async fn send_batch(&mut self, batch: Vec<Record>) -> anyhow::Result<()> {
        for record in &batch {
            serde_json::to_writer(&mut self.out, record)?;
            writeln!(self.out)?;
        }
        self.out.flush()?;
        self.batches += 1;
        debug!(batch = self.batches, size = batch.len(), "batch written");
        Ok(())
    }
}

/// `key=value`; values that read as JSON keep their type.
fn parse_meta(pair: &str) -> anyhow::Result<(String, Value)> {
    let (key, value) = pair
        .split_once('=')
        .ok_or_else(|| anyhow!("metadata '{pair}' must look like key=value"))?;
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.trim().to_string(), value))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let matches = Command::new("ingest")
        .about("Validate a CSV file against an index and stream its rows as typed documents")
        .arg(
            Arg::new("file")
                .short('f')
                .long("file")
                .value_parser(clap::value_parser!(PathBuf))
                .required(true),
        )
        .arg(Arg::new("index").short('i').long("index").required(true))
        .arg(Arg::new("url").short('u').long("url").default_value(DEFAULT_URL))
        .arg(
            Arg::new("delimiter")
                .short('d')
                .long("delimiter")
                .default_value(DEFAULT_DELIMITER),
        )
        .arg(
            Arg::new("batch-size")
                .short('b')
                .long("batch-size")
                .value_parser(clap::value_parser!(f64))
                .default_value("1000"),
        )
        .arg(
            Arg::new("encoding")
                .long("encoding")
                .help("Input charset label, e.g. windows-1252"),
        )
        .arg(
            Arg::new("meta")
                .long("meta")
                .help("key=value attached to every document")
                .action(ArgAction::Append),
        )
        .get_matches();

    let file = matches
        .get_one::<PathBuf>("file")
        .ok_or_else(|| anyhow!("--file is required"))?;
    let index = matches
        .get_one::<String>("index")
        .ok_or_else(|| anyhow!("--index is required"))?;

    let mut config = IngestConfig::new(file, index);
    if let Some(url) = matches.get_one::<String>("url") {
        config.url = url.clone();
    }
    if let Some(delimiter) = matches.get_one::<String>("delimiter") {
        config.delimiter = delimiter.clone();
    }
    if let Some(batch_size) = matches.get_one::<f64>("batch-size") {
        config.batch_size = *batch_size;
    }
    config.encoding = matches.get_one::<String>("encoding").cloned();
    config.metadata = matches
        .get_many::<String>("meta")
        .into_iter()
        .flatten()
        .map(|pair| parse_meta(pair))
        .collect::<anyhow::Result<Metadata>>()?;

    let start = Instant::now();
    let backend = ElasticsearchClient::new(&config.url)?;
    let mut report = Report::new();

    let plan = preflight(&config, &backend, &mut report)
        .await
        .with_context(|| format!("pre-flight failed for '{}'", file.display()))?;

    let mut sink = NdjsonSink {
        out: BufWriter::new(io::stdout()),
        batches: 0,
    };
    let summary = Ingestion::start(&plan)
        .await?
        .run(&mut sink, &mut report)
        .await?;

    let elapsed = start.elapsed().as_secs_f64();
    info!(
        source = %file.display(),
        index = %config.index,
        records = summary.records,
        skipped = summary.skipped_lines,
        warnings = report.warnings().count(),
        checksum = %format!("0x{:08x}", summary.checksum),
        elapsed = %format!("{elapsed:.1}s"),
        "done"
    );
    Ok(())
}
