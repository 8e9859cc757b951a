// src/tables.rs
//! Reference-table loader shared by the postal index and the zone files.
//! Tables are TOML (`[[<key>]]` rows) or JSON (bare array, or an object with
//! a `<key>` array). Rows come back untyped so one bad row can be skipped
//! without losing the rest.

use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Load rows from an explicit path. Format is picked by extension, with a
/// fallback to the other format when the hint is wrong.
pub fn load_rows_from(path: &Path, key: &str) -> Result<Vec<Value>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading table from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_rows(&content, ext.as_str(), key)
        .with_context(|| format!("parsing table {}", path.display()))
}

fn parse_rows(s: &str, hint_ext: &str, key: &str) -> Result<Vec<Value>> {
    let try_toml = hint_ext == "toml";
    if try_toml {
        if let Ok(v) = parse_toml(s, key) {
            return Ok(v);
        }
    }
    if let Ok(v) = parse_json(s, key) {
        return Ok(v);
    }
    if !try_toml {
        if let Ok(v) = parse_toml(s, key) {
            return Ok(v);
        }
    }
    Err(anyhow!("unsupported table format (expected `{key}` rows)"))
}

fn parse_toml(s: &str, key: &str) -> Result<Vec<Value>> {
    let doc: toml::Table = toml::from_str(s)?;
    let rows = doc
        .get(key)
        .and_then(|v| v.as_array())
        .ok_or_else(|| anyhow!("missing `{key}` array"))?;
    rows.iter()
        .map(|r| serde_json::to_value(r).map_err(Into::into))
        .collect()
}

fn parse_json(s: &str, key: &str) -> Result<Vec<Value>> {
    match serde_json::from_str::<Value>(s)? {
        Value::Array(rows) => Ok(rows),
        Value::Object(mut obj) => match obj.remove(key) {
            Some(Value::Array(rows)) => Ok(rows),
            _ => Err(anyhow!("missing `{key}` array")),
        },
        _ => Err(anyhow!("table must be an array or object")),
    }
}

/// Deserialize every row into `T`; rows that do not fit are logged and skipped.
pub fn typed_rows<T: DeserializeOwned>(rows: Vec<Value>, table: &str) -> Vec<T> {
    let mut out = Vec::with_capacity(rows.len());
    for (idx, row) in rows.into_iter().enumerate() {
        match serde_json::from_value::<T>(row) {
            Ok(v) => out.push(v),
            Err(e) => tracing::warn!(table, row = idx, error = %e, "skipping malformed row"),
        }
    }
    out
}

/// Numbers in hand-maintained tables show up both as numbers and strings.
pub fn lenient_f64<'de, D>(d: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    match Value::deserialize(d)? {
        Value::Number(n) => n.as_f64().ok_or_else(|| D::Error::custom("not a float")),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| D::Error::custom(format!("not a number: {s:?}"))),
        other => Err(D::Error::custom(format!("expected number, got {other}"))),
    }
}

pub fn lenient_opt_f64<'de, D>(d: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    match Value::deserialize(d)? {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(n.as_f64()),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("not a number: {s:?}"))),
        other => Err(D::Error::custom(format!("expected number, got {other}"))),
    }
}

/// Postal codes are keys, never numbers: `10110` and `"10110"` are the same code.
pub fn lenient_string<'de, D>(d: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    match Value::deserialize(d)? {
        Value::String(s) => Ok(s.trim().to_string()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(D::Error::custom(format!("expected string, got {other}"))),
    }
}
