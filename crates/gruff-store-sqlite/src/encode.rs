//! Encoding helpers between JSON document bodies and SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings with fixed microsecond
//! precision, so lexical order equals chronological order. UUIDs are stored
//! as hyphenated lowercase strings.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Value as SqlValue;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339_opts(SecondsFormat::Micros, true) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

/// Re-encode a body timestamp in column form.
fn normalise_dt(field: &'static str, value: &Value) -> Result<String> {
  let s = value.as_str().ok_or(Error::InvalidField {
    field,
    reason: "expected an RFC 3339 string".into(),
  })?;
  Ok(encode_dt(decode_dt(s)?))
}

// ─── Columns ─────────────────────────────────────────────────────────────────

/// The denormalised columns of one `documents` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Columns {
  pub key:      Uuid,
  pub id:       Option<String>,
  pub from_ref: Option<String>,
  pub to_ref:   Option<String>,
  pub start:    String,
  pub end_at:   Option<String>,
}

impl Columns {
  pub fn from_body(body: &Map<String, Value>) -> Result<Self> {
    let key = body
      .get("key")
      .and_then(Value::as_str)
      .ok_or(Error::MissingField("key"))?;
    let key = Uuid::parse_str(key)?;

    let text = |field: &'static str| -> Result<Option<String>> {
      match body.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(Error::InvalidField { field, reason: "expected a string".into() }),
      }
    };

    let start = normalise_dt("start", body.get("start").ok_or(Error::MissingField("start"))?)?;
    let end_at = match body.get("end") {
      None | Some(Value::Null) => None,
      Some(v) => Some(normalise_dt("end", v)?),
    };

    Ok(Self {
      key,
      id: text("id")?,
      from_ref: text("_from")?,
      to_ref: text("_to")?,
      start,
      end_at,
    })
  }
}

/// Parse a stored body back into a JSON object.
pub fn decode_body(body: &str) -> Result<Map<String, Value>> {
  match serde_json::from_str(body)? {
    Value::Object(map) => Ok(map),
    _ => Err(Error::NotAnObject),
  }
}

// ─── Bound parameters ────────────────────────────────────────────────────────

/// A JSON scalar as a SQLite parameter, matching what `json_extract`
/// returns for the same value.
pub fn bind_value(value: &Value) -> SqlValue {
  match value {
    Value::Null => SqlValue::Null,
    Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
    Value::Number(n) => match n.as_i64() {
      Some(i) => SqlValue::Integer(i),
      None => SqlValue::Real(n.as_f64().unwrap_or_default()),
    },
    Value::String(s) => SqlValue::Text(s.clone()),
    other => SqlValue::Text(other.to_string()),
  }
}
