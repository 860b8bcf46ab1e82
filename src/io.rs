use crate::codec::{LineCodec, Transcoder};
use crate::report::Report;
use crate::{IngestError, IngestResult};
use async_compression::tokio::bufread::{GzipDecoder, ZstdDecoder};
use futures::StreamExt;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncRead, BufReader};
use tokio_util::codec::FramedRead;
use tokio_util::io::StreamReader;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct CsvMeta {
    /// e.g. "application/gzip" or "text/csv"
    pub content_type: String,
    /// e.g. "gzip", "zstd", or empty
    pub content_encoding: String,
    /// just the key/filename (used for extension fallback)
    pub name_hint: String,
    /// Which character encoding to expect (defaults to UTF-8)
    pub charset: &'static encoding_rs::Encoding,
}

impl Default for CsvMeta {
    fn default() -> Self {
        Self {
            content_type: String::new(),
            content_encoding: String::new(),
            name_hint: String::new(),
            charset: encoding_rs::UTF_8,
        }
    }
}

/// Boxed UTF-8 byte source produced by [`build_csv_reader`].
pub type CsvReader = Box<dyn AsyncRead + Unpin + Send>;

/// Line frames over a decoded source. Dropping it closes the file.
pub type LineStream = FramedRead<CsvReader, LineCodec>;

/// From a generic AsyncRead, wrap with optional decompression and UTF-8 transcoding.
/// Returns an AsyncRead yielding UTF-8 bytes plus the normalized meta we used.
pub fn build_csv_reader<R>(raw: R, meta: CsvMeta) -> (CsvReader, CsvMeta)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    // 1) decompression choice: encoding -> type -> extension
    let normalized_meta = meta.clone();
    let ce = meta.content_encoding.to_ascii_lowercase();
    let ct = meta.content_type.to_ascii_lowercase();

    let is_gzip = ce.split(',').any(|s| s.trim() == "gzip")
        || matches!(ct.as_str(), "application/gzip" | "application/x-gzip")
        || meta.name_hint.ends_with(".gz");

    let is_zstd = ce.split(',').any(|s| s.trim() == "zstd")
        || ct == "application/zstd"
        || meta.name_hint.ends_with(".zst");

    // Use a larger buffer for fewer syscalls (1 MiB)
    let buf = BufReader::with_capacity(1 << 20, raw);
    let decompressed: CsvReader = if is_gzip {
        Box::new(GzipDecoder::new(buf))
    } else if is_zstd {
        Box::new(ZstdDecoder::new(buf))
    } else {
        Box::new(buf)
    };

    // 2) transcoding to UTF-8 only when charset != UTF-8 to avoid extra copies
    let stream_reader: CsvReader = if meta.charset == encoding_rs::UTF_8 {
        decompressed
    } else {
        let transcoder = Transcoder::new(meta.charset);
        let framed = FramedRead::new(decompressed, transcoder);
        Box::new(StreamReader::new(framed))
    };

    (stream_reader, normalized_meta)
}

/// Build a reader from a local file path (lightweight meta from extension).
pub async fn reader_from_path(
    path: &Path,
    charset: &'static encoding_rs::Encoding,
) -> IngestResult<(CsvReader, CsvMeta)> {
    let file = File::open(path).await?;
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();

    let mut meta = CsvMeta {
        name_hint: name,
        charset,
        ..Default::default()
    };

    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    match ext {
        "gz" => {
            meta.content_type = "application/gzip".into();
            meta.content_encoding = "gzip".into();
        }
        "zst" => {
            meta.content_type = "application/zstd".into();
            meta.content_encoding = "zstd".into();
        }
        _ => {
            meta.content_type = "text/csv".into();
        }
    }

    Ok(build_csv_reader(file, meta))
}

/// Open `path` and frame its decoded contents into lines.
pub async fn lines_from_path(
    path: &Path,
    charset: &'static encoding_rs::Encoding,
) -> IngestResult<LineStream> {
    let (reader, _meta) = reader_from_path(path, charset).await?;
    Ok(FramedRead::new(reader, LineCodec::new()))
}

/// Number of data lines in `path`: every line minus the header.
///
/// Streams the file once. `\n` and `\r\n` both end a line and a trailing
/// terminator does not start another one. An empty file yields `-1`, so
/// anything below `1` means "no data rows".
pub async fn count_data_lines(
    path: &Path,
    charset: &'static encoding_rs::Encoding,
) -> IngestResult<i64> {
    debug!(path = %path.display(), "counting records to upload");
    let mut lines = lines_from_path(path, charset).await?;
    let mut total: i64 = 0;
    while let Some(line) = lines.next().await {
        line?;
        total += 1;
    }
    let records = total - 1;
    debug!(path = %path.display(), records, "counted data records");
    Ok(records)
}

/// Check that `path` exists, can be opened for reading and is not empty.
pub async fn check_file(path: &Path, report: &mut Report) -> IngestResult<()> {
    let shown = path.display().to_string();
    let metadata = match tokio::fs::metadata(path).await {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(IngestError::FileNotFound(shown));
        }
        Err(e) => return Err(e.into()),
    };

    if let Err(e) = File::open(path).await {
        debug!(error = %e, path = %shown, "file open failed");
        return Err(IngestError::FileNotReadable(shown));
    }

    if metadata.len() == 0 {
        return Err(IngestError::EmptyFile(shown));
    }

    report.info(format!("File '{shown}' is valid and readable"));
    Ok(())
}
