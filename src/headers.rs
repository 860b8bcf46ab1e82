//! Header row checks that need nothing but the header itself.

use crate::record::METADATA_FIELD;
use crate::report::{Diagnostic, Report};
use std::collections::{HashMap, HashSet};
use std::ops::Deref;

/// Placeholder names exports produce when a column was never named.
/// Compared case-insensitively.
const GENERIC_HEADERS: [&str; 7] = ["0", "1", "2", "col1", "col2", "column1", "column2"];

const HEADER_HINTS_EMPTY: [&str; 3] = [
    "Remove empty columns from the CSV file",
    "Ensure each column has a meaningful name",
    "Check your CSV export settings",
];

const HEADER_HINTS_DUPLICATE: [&str; 3] = [
    "Remove duplicate columns from the CSV file",
    "Ensure each column has a unique name",
    "Check your CSV export settings",
];

/// Trimmed column names of the header row, in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderSet(Vec<String>);

impl HeaderSet {
    pub fn new<I, S>(raw: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(raw.into_iter().map(|h| h.as_ref().trim().to_string()).collect())
    }
}

impl Deref for HeaderSet {
    type Target = [String];

    fn deref(&self) -> &[String] {
        &self.0
    }
}

/// Check the raw header row for blank and duplicate names.
///
/// Checks run in order and stop at the first failure: no usable headers,
/// blank headers, duplicates. Only a passing row is screened for generic
/// placeholder names and for the reserved metadata name, both reported as
/// warnings.
pub fn validate_structure<S: AsRef<str>>(raw: &[S], report: &mut Report) -> bool {
    let cleaned: Vec<&str> = raw
        .iter()
        .map(|h| h.as_ref().trim())
        .filter(|h| !h.is_empty())
        .collect();

    if cleaned.is_empty() {
        report.push(Diagnostic::error("No valid headers found in CSV file"));
        return false;
    }

    if cleaned.len() != raw.len() {
        let columns = raw
            .iter()
            .enumerate()
            .filter(|(_, h)| h.as_ref().trim().is_empty())
            .map(|(i, _)| format!("Column {}: Empty header", i + 1));
        report.push(
            Diagnostic::error("Empty or whitespace-only headers detected")
                .with_details(columns)
                .with_hints(HEADER_HINTS_EMPTY),
        );
        return false;
    }

    let duplicates = duplicate_headers(&cleaned);
    if !duplicates.is_empty() {
        let details = duplicates
            .iter()
            .map(|(h, n)| format!("Duplicate header: \"{h}\" appears {n} times"));
        report.push(
            Diagnostic::error("Duplicate headers found in CSV file")
                .with_details(details)
                .with_hints(HEADER_HINTS_DUPLICATE),
        );
        return false;
    }

    let generic: Vec<String> = cleaned
        .iter()
        .filter(|h| GENERIC_HEADERS.contains(&h.to_lowercase().as_str()))
        .map(|h| format!("Generic header: \"{h}\""))
        .collect();
    if !generic.is_empty() {
        report.push(
            Diagnostic::warning("Generic headers detected")
                .with_details(generic)
                .with_hints(["Consider using more descriptive column names"]),
        );
    }

    if cleaned.contains(&METADATA_FIELD) {
        report.push(
            Diagnostic::warning(format!(
                "Header \"{METADATA_FIELD}\" shares its name with the metadata field"
            ))
            .with_details([format!(
                "Column values replace the run metadata under \"{METADATA_FIELD}\""
            )])
            .with_hints(["Rename the column to keep the run metadata on each document"]),
        );
    }

    report.info("CSV header structure is valid");
    true
}

/// Headers seen more than once with their counts, in first-seen order.
fn duplicate_headers<'a>(cleaned: &[&'a str]) -> Vec<(&'a str, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for h in cleaned {
        *counts.entry(*h).or_default() += 1;
    }
    let mut seen = HashSet::new();
    cleaned
        .iter()
        .filter(|h| counts[*h] > 1 && seen.insert(**h))
        .map(|h| (*h, counts[h]))
        .collect()
}
