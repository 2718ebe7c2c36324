//! Response decoding and record normalization.
//!
//! Bodies decode from JSON (a bare object is promoted to a one-element list)
//! or CSV rows in bulk mode. Every mapping key is normalized to a stable
//! lower-snake-case form, recursively through nested structures, so the
//! downstream schema layer compares like with like regardless of the
//! upstream's casing whims.

use super::{FetchedPage, FetcherError, FetcherResult, PayloadShape, Record};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;
use uuid::Uuid;

/// Field name under which a synthesized surrogate key is injected.
pub const SURROGATE_KEY_FIELD: &str = "surrogate_key";

/// Normalize one key to lower snake case.
///
/// Acronym runs collapse to one segment: `FooBarID` becomes `foo_bar_id`,
/// `SomeXYZValue` becomes `some_xyz_value`. Spaces, dashes and dots act as
/// separators.
pub fn normalize_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    let mut out = String::with_capacity(key.len() + 4);
    let mut prev_separator = true;

    for (i, &c) in chars.iter().enumerate() {
        if c == ' ' || c == '-' || c == '.' || c == '_' {
            if !prev_separator {
                out.push('_');
                prev_separator = true;
            }
            continue;
        }

        if c.is_uppercase() {
            let prev_lower = i > 0 && (chars[i - 1].is_lowercase() || chars[i - 1].is_numeric());
            let acronym_end = i > 0
                && chars[i - 1].is_uppercase()
                && chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if (prev_lower || acronym_end) && !prev_separator {
                out.push('_');
            }
            for lower in c.to_lowercase() {
                out.push(lower);
            }
        } else {
            out.push(c);
        }
        prev_separator = false;
    }

    // Trailing separator from input like "Foo_" collapses away
    while out.ends_with('_') {
        out.pop();
    }
    out
}

/// Normalize every mapping key in a value, recursively.
pub fn normalize_value(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(normalize_record(map)),
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_value).collect()),
        other => other,
    }
}

/// Normalize the keys of one record, recursing into nested structures.
pub fn normalize_record(map: Record) -> Record {
    map.into_iter()
        .map(|(key, value)| (normalize_key(&key), normalize_value(value)))
        .collect()
}

/// Decode a JSON body into records.
///
/// An array yields its object elements (non-object elements are dropped with
/// a debug log); a bare object is promoted to a one-element list; any other
/// shape carries no records and is left to the caller to act on.
pub fn decode_json(body: &str) -> FetcherResult<FetchedPage> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| FetcherError::Parse(format!("invalid JSON body: {e}")))?;

    match value {
        Value::Array(items) => {
            let total = items.len();
            let records: Vec<Record> = items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Object(map) => Some(normalize_record(map)),
                    _ => None,
                })
                .collect();
            if records.len() < total {
                debug!(
                    dropped = total - records.len(),
                    "Dropped non-object elements from JSON array response"
                );
            }
            Ok(FetchedPage {
                records,
                shape: PayloadShape::List,
            })
        }
        Value::Object(map) => Ok(FetchedPage {
            records: vec![normalize_record(map)],
            shape: PayloadShape::Object,
        }),
        _ => Ok(FetchedPage {
            records: Vec::new(),
            shape: PayloadShape::Other,
        }),
    }
}

/// Decode CSV rows (bulk mode) into records, one per row, all values as
/// strings under normalized header keys.
pub fn decode_csv(body: &str) -> FetcherResult<FetchedPage> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(body.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| FetcherError::Parse(format!("invalid CSV header: {e}")))?
        .iter()
        .map(normalize_key)
        .collect();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| FetcherError::Parse(format!("invalid CSV row: {e}")))?;
        let mut record = Record::new();
        for (header, field) in headers.iter().zip(row.iter()) {
            record.insert(header.clone(), Value::String(field.to_string()));
        }
        records.push(record);
    }

    Ok(FetchedPage {
        records,
        shape: PayloadShape::Rows,
    })
}

/// Synthesize a deterministic surrogate key for a record without a natural
/// unique identifier: a UUID5 over the ordered concatenation of the record's
/// own field values.
pub fn surrogate_key(record: &Record) -> String {
    let mut joined = String::new();
    for value in record.values() {
        match value {
            Value::Null => {}
            Value::String(s) => joined.push_str(s),
            other => joined.push_str(&other.to_string()),
        }
    }
    Uuid::new_v5(&Uuid::NAMESPACE_OID, joined.as_bytes()).to_string()
}

/// Apply declarative field renames, preserving field order.
pub fn apply_renames(record: Record, renames: &BTreeMap<String, String>) -> Record {
    if renames.is_empty() {
        return record;
    }
    record
        .into_iter()
        .map(|(key, value)| match renames.get(&key) {
            Some(renamed) => (renamed.clone(), value),
            None => (key, value),
        })
        .collect()
}
