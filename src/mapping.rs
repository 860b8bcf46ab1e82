//! Header set versus the destination index mapping.

use crate::record::METADATA_FIELD;
use crate::report::{Diagnostic, Report};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;

/// Field names declared in an index mapping, snapshotted once per run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexSchema {
    fields: BTreeSet<String>,
}

impl IndexSchema {
    /// Field names under `<index>.mappings.properties` of a
    /// `GET /<index>/_mapping` response. No properties means no fields.
    ///
    /// An alias answers under the concrete index name, so a response with
    /// a single entry is read whatever its key.
    pub fn from_mapping_response(index: &str, body: &Value) -> Self {
        let entry = body.get(index).or_else(|| match body.as_object() {
            Some(indices) if indices.len() == 1 => indices.values().next(),
            _ => None,
        });
        entry
            .and_then(|i| i.pointer("/mappings/properties"))
            .and_then(Value::as_object)
            .map(|props| props.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains(field)
    }

    /// Field names in sorted order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for IndexSchema {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Differences between CSV headers and mapping fields. The metadata field
/// is ignored on both sides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MappingCheck {
    /// In the CSV, not in the mapping. File order.
    pub extra_headers: Vec<String>,
    /// In the mapping, not in the CSV. Sorted.
    pub missing_fields: Vec<String>,
}

impl MappingCheck {
    pub fn is_match(&self) -> bool {
        self.extra_headers.is_empty() && self.missing_fields.is_empty()
    }
}

/// Compare headers against `schema` without reporting anything.
pub fn compare_headers<S: AsRef<str>>(schema: &IndexSchema, headers: &[S]) -> MappingCheck {
    let cleaned = clean(headers);

    let extra_headers = cleaned
        .iter()
        .filter(|h| **h != METADATA_FIELD && !schema.contains(h))
        .map(|h| h.to_string())
        .collect();

    let missing_fields = schema
        .fields()
        .filter(|f| *f != METADATA_FIELD && !cleaned.contains(f))
        .map(str::to_string)
        .collect();

    MappingCheck {
        extra_headers,
        missing_fields,
    }
}

/// Compare headers against `schema` and report a mismatch.
///
/// The error lists every CSV header marked `✓` (known to the mapping) or
/// `✗`, then the missing fields, then the unexpected headers.
pub fn validate_mapping<S: AsRef<str>>(
    schema: &IndexSchema,
    headers: &[S],
    report: &mut Report,
) -> MappingCheck {
    let check = compare_headers(schema, headers);
    if check.is_match() {
        report.info("All headers validated against the index mapping");
        return check;
    }

    let marked = clean(headers).into_iter().map(|h| {
        let mark = if schema.contains(h) { '✓' } else { '✗' };
        format!("{mark} {h}")
    });
    let missing = check
        .missing_fields
        .iter()
        .map(|f| format!("Missing required header: {f}"));
    let extra = check
        .extra_headers
        .iter()
        .map(|h| format!("Unexpected header: {h}"));

    report.push(
        Diagnostic::error("Header/Field mismatch detected")
            .with_details(marked.chain(missing).chain(extra))
            .with_hints([
                "Align the CSV headers with the fields of the index mapping",
                "Check that the correct index was selected",
            ]),
    );
    check
}

fn clean<S: AsRef<str>>(headers: &[S]) -> Vec<&str> {
    headers
        .iter()
        .map(|h| h.as_ref().trim())
        .filter(|h| !h.is_empty())
        .collect()
}
