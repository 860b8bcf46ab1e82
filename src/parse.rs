//! Single-line CSV parsing.

use crate::report::Diagnostic;
use bytes::Bytes;
use csv::{ReaderBuilder, Terminator, Trim};
use std::borrow::Cow;
use thiserror::Error;
use tracing::{debug, trace};

/// Longest prefix of a rejected line echoed back in diagnostics.
const LINE_PREVIEW: usize = 100;

/// One line of the source file, without its terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    /// 1-based position in the file.
    pub number: u64,
    pub text: Bytes,
    pub is_header: bool,
}

impl RawLine {
    pub fn header(text: impl Into<Bytes>) -> Self {
        Self {
            number: 1,
            text: text.into(),
            is_header: true,
        }
    }

    pub fn data(number: u64, text: impl Into<Bytes>) -> Self {
        Self {
            number,
            text: text.into(),
            is_header: false,
        }
    }

    fn preview(&self) -> String {
        let text = String::from_utf8_lossy(&self.text);
        match text.char_indices().nth(LINE_PREVIEW) {
            Some((cut, _)) => format!("{}...", &text[..cut]),
            None => text.into_owned(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("unterminated quoted field")]
    UnterminatedQuote,
    #[error(transparent)]
    Csv(#[from] csv::Error),
}

/// Outcome of parsing one line. `Skipped` carries the warning to report;
/// the line contributes no records.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedLine {
    Rows(Vec<Vec<String>>),
    Skipped(Diagnostic),
}

impl ParsedLine {
    pub fn is_skipped(&self) -> bool {
        matches!(self, ParsedLine::Skipped(_))
    }

    /// Parsed rows, empty when the line was skipped.
    pub fn into_rows(self) -> Vec<Vec<String>> {
        match self {
            ParsedLine::Rows(rows) => rows,
            ParsedLine::Skipped(_) => Vec::new(),
        }
    }
}

/// Parse `line` into rows of trimmed cells.
///
/// Rows may be ragged; blank lines and lines holding nothing but
/// delimiters and whitespace produce no rows. A header line yields at most
/// one row. Malformed input never errors: it comes back as
/// [`ParsedLine::Skipped`].
pub fn parse_line(line: &RawLine, delimiter: u8) -> ParsedLine {
    trace!(
        line = line.number,
        header = line.is_header,
        delimiter = %(delimiter as char),
        "parsing row"
    );
    match parse_rows(&line.text, delimiter, line.is_header) {
        Ok(rows) => ParsedLine::Rows(rows),
        Err(e) => {
            let preview = line.preview();
            debug!(line = line.number, error = %e, content = %preview, "failed to parse line");
            ParsedLine::Skipped(
                Diagnostic::warning(format!(
                    "Skipping line {}: error parsing CSV line: {e}",
                    line.number
                ))
                .with_details([format!("Line content: {preview}")]),
            )
        }
    }
}

fn parse_rows(text: &[u8], delimiter: u8, header: bool) -> Result<Vec<Vec<String>>, ParseError> {
    // a quoted field cannot continue past the end of a single line
    if text.iter().filter(|b| **b == b'"').count() % 2 == 1 {
        return Err(ParseError::UnterminatedQuote);
    }

    let text = unpad_quoted_fields(text, delimiter);
    // framing already split on `\n`; a lone `\r` is cell content
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .delimiter(delimiter)
        .terminator(Terminator::Any(b'\n'))
        .flexible(true)
        .trim(Trim::All)
        .from_reader(&*text);

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        rows.push(record.iter().map(str::to_owned).collect());
        if header {
            break;
        }
    }
    Ok(rows)
}

/// Drop spaces and tabs at the start of each field.
///
/// The reader only treats `"` as a quote when it opens the field, so
/// `1, "Smith, John"` would otherwise split inside the quotes. Cells are
/// trimmed afterwards anyway.
fn unpad_quoted_fields(text: &[u8], delimiter: u8) -> Cow<'_, [u8]> {
    if !text.contains(&b'"') {
        return Cow::Borrowed(text);
    }

    let mut out = Vec::with_capacity(text.len());
    let mut field_start = true;
    let mut quoted = false;
    let mut in_quotes = false;
    for &b in text {
        if field_start {
            if b != delimiter && (b == b' ' || b == b'\t') {
                continue;
            }
            field_start = false;
            quoted = b == b'"';
            in_quotes = quoted;
            out.push(b);
            if b == delimiter {
                field_start = true;
            }
            continue;
        }
        if quoted && b == b'"' {
            // `""` inside quotes toggles out and straight back in
            in_quotes = !in_quotes;
        } else if !in_quotes && b == delimiter {
            field_start = true;
            quoted = false;
        }
        out.push(b);
    }
    Cow::Owned(out)
}
