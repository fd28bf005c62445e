//! JSON Lines files with atomic upsert.
//!
//! An index file is a sequence of LF-terminated JSON objects. Upserts read
//! the whole file, replace-or-append by key, and rewrite through the atomic
//! writer, so readers see either the old index or the new one.

use std::fs;
use std::path::Path;

use serde_json::Value;
use tracing::warn;

use crate::corpus::atomic;
use crate::error::{Error, Result};

/// Options recognized by [`upsert`].
#[derive(Debug, Clone, Default)]
pub struct UpsertOptions {
    /// Re-sort records by this field, descending, before writing.
    pub sort_by_field: Option<String>,
    /// Keep at most this many records after sorting.
    pub max_records: Option<usize>,
}

/// Read all records from a JSONL file. A missing file is an empty index.
///
/// Unparseable lines are dropped with a warning rather than poisoning the
/// whole index.
pub fn read_all(path: &Path) -> Result<Vec<Value>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut records = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(value) => records.push(value),
            Err(e) => {
                warn!(
                    path = %path.display(),
                    line = lineno + 1,
                    "skipping unparseable index line: {}", e
                );
            }
        }
    }
    Ok(records)
}

/// Replace-or-append `record` by `key_field`, then rewrite atomically.
pub fn upsert(path: &Path, record: Value, key_field: &str, options: &UpsertOptions) -> Result<()> {
    let key = record
        .get(key_field)
        .and_then(Value::as_str)
        .ok_or_else(|| {
            Error::Parse(format!(
                "index record is missing string key field '{}'",
                key_field
            ))
        })?
        .to_string();

    let mut records = read_all(path)?;
    let existing = records
        .iter()
        .position(|r| r.get(key_field).and_then(Value::as_str) == Some(key.as_str()));

    match existing {
        Some(idx) => records[idx] = record,
        None => records.push(record),
    }

    if let Some(field) = &options.sort_by_field {
        records.sort_by(|a, b| compare_field(b, a, field));
    }
    if let Some(cap) = options.max_records {
        records.truncate(cap);
    }

    write_all(path, &records)
}

/// Rewrite the whole file from `records` atomically.
pub fn write_all(path: &Path, records: &[Value]) -> Result<()> {
    let mut out = String::new();
    for record in records {
        out.push_str(&serde_json::to_string(record)?);
        out.push('\n');
    }
    atomic::atomic_write_file(path, out.as_bytes())
}

/// Order two records by a field. Strings compare lexicographically (RFC 3339
/// dates sort correctly this way); numbers numerically; missing fields last.
fn compare_field(a: &Value, b: &Value, field: &str) -> std::cmp::Ordering {
    use std::cmp::Ordering;

    match (a.get(field), b.get(field)) {
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        _ => Ordering::Equal,
    }
}
