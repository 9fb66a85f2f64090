//! Decoding helpers for Extended JSON documents.
//!
//! Dumps of the document store wrap non-JSON types in single-key objects
//! (`{"$oid": ..}`, `{"$date": ..}`, `{"$numberLong": ..}`, `{"$binary": ..}`).
//! Older exports and hand-written fixtures use the plain JSON form instead, so
//! every helper accepts both. Use them through `deserialize_with`; every helper
//! maps `null` to the zero value of its type.

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, TimeZone, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Unwrap a single-key `{"$tag": inner}` wrapper.
fn unwrap_tag<'a>(value: &'a Value, tag: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) if map.len() <= 2 => map.get(tag),
        _ => None,
    }
}

/// Parse an identifier: a string, an `{"$oid": ..}` wrapper, or a number.
pub fn parse_id(value: &Value) -> Result<String, String> {
    match value {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => match unwrap_tag(other, "$oid") {
            Some(Value::String(s)) => Ok(s.clone()),
            _ => Err(format!("expected identifier, got {}", other)),
        },
    }
}

/// Parse a 64-bit integer: a number, a numeric string, or `{"$numberLong": ..}`.
pub fn parse_int64(value: &Value) -> Result<i64, String> {
    match value {
        Value::Null => Ok(0),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| format!("integer out of range: {}", n)),
        Value::String(s) => s
            .parse()
            .map_err(|e| format!("invalid integer {:?}: {}", s, e)),
        Value::Bool(b) => Ok(i64::from(*b)),
        other => match unwrap_tag(other, "$numberLong").or_else(|| unwrap_tag(other, "$numberInt"))
        {
            Some(inner) => parse_int64(inner),
            None => Err(format!("expected integer, got {}", other)),
        },
    }
}

/// Parse a double: a number or `{"$numberDouble": ..}`.
pub fn parse_double(value: &Value) -> Result<f64, String> {
    match value {
        Value::Null => Ok(0.0),
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| format!("invalid double: {}", n)),
        Value::String(s) => s
            .parse()
            .map_err(|e| format!("invalid double {:?}: {}", s, e)),
        other => match unwrap_tag(other, "$numberDouble") {
            Some(inner) => parse_double(inner),
            None => parse_int64(other).map(|i| i as f64),
        },
    }
}

/// Parse an instant: RFC 3339 text, epoch milliseconds, or `{"$date": ..}`.
///
/// `null` yields `None`.
pub fn parse_datetime(value: &Value) -> Result<Option<DateTime<Utc>>, String> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) if s.is_empty() => Ok(None),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| format!("invalid timestamp {:?}: {}", s, e)),
        Value::Number(_) => {
            let millis = parse_int64(value)?;
            Utc.timestamp_millis_opt(millis)
                .single()
                .map(Some)
                .ok_or_else(|| format!("timestamp out of range: {}", millis))
        }
        other => match unwrap_tag(other, "$date") {
            Some(inner @ Value::Object(_)) => {
                let millis = parse_int64(inner)?;
                parse_datetime(&Value::from(millis))
            }
            Some(inner) => parse_datetime(inner),
            None => Err(format!("expected timestamp, got {}", other)),
        },
    }
}

/// Parse binary data: `{"$binary": {"base64": ..}}`, the legacy
/// `{"$binary": "..", "$type": ".."}` form, or a bare base64 string.
pub fn parse_binary(value: &Value) -> Result<Vec<u8>, String> {
    let encoded = match value {
        Value::Null => return Ok(Vec::new()),
        Value::String(s) => s.as_str(),
        other => match unwrap_tag(other, "$binary") {
            Some(Value::String(s)) => s.as_str(),
            Some(Value::Object(inner)) => match inner.get("base64") {
                Some(Value::String(s)) => s.as_str(),
                _ => return Err(format!("binary without base64 payload: {}", other)),
            },
            _ => return Err(format!("expected binary, got {}", other)),
        },
    };
    general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| format!("invalid base64: {}", e))
}

pub fn id<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    parse_id(&Value::deserialize(d)?).map_err(D::Error::custom)
}

pub fn id_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    match Value::deserialize(d)? {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .iter()
            .map(|v| parse_id(v).map_err(D::Error::custom))
            .collect(),
        other => Err(D::Error::custom(format!(
            "expected identifier list, got {}",
            other
        ))),
    }
}

pub fn int64<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    parse_int64(&Value::deserialize(d)?).map_err(D::Error::custom)
}

pub fn double<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    parse_double(&Value::deserialize(d)?).map_err(D::Error::custom)
}

pub fn datetime<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
    parse_datetime(&Value::deserialize(d)?).map_err(D::Error::custom)
}

pub fn binary<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
    parse_binary(&Value::deserialize(d)?).map_err(D::Error::custom)
}

/// Deserialize a string, treating `null` as empty.
pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?.unwrap_or_default())
}

/// Deserialize a string list, treating `null` as empty.
pub fn string_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    Ok(Option::<Vec<String>>::deserialize(d)?.unwrap_or_default())
}

/// Deserialize any `Default` value, treating `null` as the default.
pub fn or_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}
