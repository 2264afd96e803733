//! Delimited file loading
//!
//! The source file is read line by line. The first line is a header and is
//! skipped; columns map positionally onto the field descriptors. Quoted
//! values may contain the delimiter and doubled quotes, but not line breaks.

use crate::error::SessionError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use indexmap::IndexMap;
use miner_graph::{FieldValue, RecordStore};
use miner_protocol::{FieldDescriptor, FieldType};
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info, warn};

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// Outcome of a file load
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Records appended to the store
    pub loaded: usize,
    /// Lines skipped as malformed
    pub skipped: usize,
}

/// Line that could not be split into columns
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unterminated quoted value")]
pub struct UnterminatedQuote;

/// Resolve a delimiter setting to one character
#[must_use]
pub fn delimiter_char(delimiter: &str) -> char {
    match delimiter {
        "\\t" | "\t" | "tab" => '\t',
        other => other.chars().next().unwrap_or(','),
    }
}

/// Split one line into trimmed column values
///
/// # Errors
/// Returns `UnterminatedQuote` when a quoted value is not closed.
pub fn split_line(line: &str, delimiter: char) -> Result<Vec<String>, UnterminatedQuote> {
    let mut values = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars().peekable();
    let mut in_quotes = false;

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                current.push(c);
            }
        } else if c == '"' && current.trim().is_empty() {
            current.clear();
            in_quotes = true;
        } else if c == delimiter {
            values.push(current.trim().to_string());
            current.clear();
        } else {
            current.push(c);
        }
    }
    if in_quotes {
        return Err(UnterminatedQuote);
    }
    values.push(current.trim().to_string());
    Ok(values)
}

/// Type a raw column value; empty and unparseable values are null
#[must_use]
pub fn parse_value(raw: &str, field_type: FieldType) -> Option<FieldValue> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match field_type {
        FieldType::Number => raw.parse::<f64>().ok().filter(|n| n.is_finite()).map(FieldValue::Number),
        FieldType::Datetime => parse_datetime(raw).map(FieldValue::Datetime),
        FieldType::Category => {
            let path: Vec<String> = raw
                .split(|c: char| c == '/' || c == '\\')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect();
            (!path.is_empty()).then_some(FieldValue::Category(path))
        }
        FieldType::Text | FieldType::Class => Some(FieldValue::Text(raw.to_string())),
    }
}

/// Type a JSON value supplied by a client
///
/// # Errors
/// - `SessionError::Validation` for values that do not fit the field type
pub fn parse_json_value(
    value: &Value,
    field: &FieldDescriptor,
) -> Result<Option<FieldValue>, SessionError> {
    let invalid = || {
        SessionError::Validation(format!(
            "value {value} does not fit field '{}' of type {:?}",
            field.name, field.field_type
        ))
    };
    match value {
        Value::Null => Ok(None),
        Value::Number(n) if field.field_type == FieldType::Number => {
            n.as_f64().map(|v| Some(FieldValue::Number(v))).ok_or_else(invalid)
        }
        Value::String(s) => match parse_value(s, field.field_type) {
            Some(v) => Ok(Some(v)),
            None if s.trim().is_empty() => Ok(None),
            None => Err(invalid()),
        },
        Value::Array(items) if field.field_type == FieldType::Category => {
            let path: Option<Vec<String>> =
                items.iter().map(|i| i.as_str().map(str::to_string)).collect();
            path.map(|p| Some(FieldValue::Category(p))).ok_or_else(invalid)
        }
        _ => Err(invalid()),
    }
}

fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Type one split line into a record of the included fields
#[must_use]
pub fn build_record(
    columns: &[String],
    fields: &[FieldDescriptor],
) -> IndexMap<String, Option<FieldValue>> {
    fields
        .iter()
        .enumerate()
        .filter(|(_, f)| f.included)
        .map(|(i, f)| {
            let value = columns
                .get(i)
                .and_then(|raw| parse_value(raw, f.field_type));
            (f.name.clone(), value)
        })
        .collect()
}

/// Stream a delimited file into the store
///
/// `fields` lists every column in file order, included or not.
///
/// # Errors
/// - `SessionError::Io` if the file cannot be opened or read
pub fn load_file(
    path: &Path,
    delimiter: char,
    fields: &[FieldDescriptor],
    store: &mut RecordStore,
) -> Result<LoadReport, SessionError> {
    let reader = BufReader::new(File::open(path)?);
    let mut report = LoadReport::default();

    for (line_no, line) in reader.lines().enumerate().skip(1) {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match split_line(&line, delimiter) {
            Ok(columns) => {
                if columns.len() != fields.len() {
                    debug!(
                        line = line_no + 1,
                        expected = fields.len(),
                        actual = columns.len(),
                        "column count mismatch"
                    );
                }
                store.add_document(build_record(&columns, fields));
                report.loaded += 1;
            }
            Err(err) => {
                warn!(line = line_no + 1, %err, "skipping malformed line");
                report.skipped += 1;
            }
        }
    }

    info!(
        path = %path.display(),
        loaded = report.loaded,
        skipped = report.skipped,
        "dataset file loaded"
    );
    Ok(report)
}
