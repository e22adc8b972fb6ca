use crate::error::{FlatJsonError, Result};
use serde::{Deserialize, Serialize};
use serde_json::ser::Formatter;
use serde_json::{Number, Value};
use std::fmt;
use std::io;
use std::str::FromStr;

/// Declared type of a sub-column or of a projected path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalType {
    Boolean,
    BigInt,
    Double,
    Varchar,
    Json,
}

impl LogicalType {
    pub fn as_str(self) -> &'static str {
        match self {
            LogicalType::Boolean => "BOOLEAN",
            LogicalType::BigInt => "BIGINT",
            LogicalType::Double => "DOUBLE",
            LogicalType::Varchar => "VARCHAR",
            LogicalType::Json => "JSON",
        }
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogicalType {
    type Err = FlatJsonError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BOOLEAN" | "BOOL" => Ok(LogicalType::Boolean),
            "BIGINT" | "INT" | "INTEGER" => Ok(LogicalType::BigInt),
            "DOUBLE" | "FLOAT" => Ok(LogicalType::Double),
            "VARCHAR" | "STRING" => Ok(LogicalType::Varchar),
            "JSON" => Ok(LogicalType::Json),
            other => Err(FlatJsonError::invalid_argument(format!(
                "unknown type: {}",
                other
            ))),
        }
    }
}

/// A single cell of a typed sub-column or of a projected row
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Null,
    Boolean(bool),
    BigInt(i64),
    Double(f64),
    Varchar(String),
    Json(Value),
}

impl Datum {
    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    pub fn logical_type(&self) -> Option<LogicalType> {
        match self {
            Datum::Null => None,
            Datum::Boolean(_) => Some(LogicalType::Boolean),
            Datum::BigInt(_) => Some(LogicalType::BigInt),
            Datum::Double(_) => Some(LogicalType::Double),
            Datum::Varchar(_) => Some(LogicalType::Varchar),
            Datum::Json(_) => Some(LogicalType::Json),
        }
    }

    /// Convert a JSON value into a cell of the given type.
    ///
    /// Numbers, strings and JSON convert freely between each other. Objects
    /// and arrays only convert to JSON and VARCHAR (their JSON text); any
    /// other target yields NULL.
    pub fn from_json(value: &Value, target: LogicalType) -> Datum {
        let datum = match target {
            LogicalType::Json => Datum::Json(value.clone()),
            LogicalType::Boolean => json_to_bool(value).map_or(Datum::Null, Datum::Boolean),
            LogicalType::BigInt => json_to_i64(value).map_or(Datum::Null, Datum::BigInt),
            LogicalType::Double => json_to_f64(value).map_or(Datum::Null, Datum::Double),
            LogicalType::Varchar => json_to_string(value).map_or(Datum::Null, Datum::Varchar),
        };
        if datum.is_null() && !value.is_null() {
            tracing::trace!(target_type = %target, "cast degraded to null");
        }
        datum
    }

    /// Cast this cell to another type, degrading to NULL when not representable
    pub fn cast(&self, target: LogicalType) -> Datum {
        match (self, target) {
            (Datum::Null, _) => Datum::Null,
            (Datum::Boolean(_), LogicalType::Boolean)
            | (Datum::BigInt(_), LogicalType::BigInt)
            | (Datum::Double(_), LogicalType::Double)
            | (Datum::Varchar(_), LogicalType::Varchar)
            | (Datum::Json(_), LogicalType::Json) => self.clone(),
            _ => match self.to_json() {
                Some(value) => Datum::from_json(&value, target),
                None => Datum::Null,
            },
        }
    }

    /// The JSON value this cell stands for; `None` for SQL NULL
    pub fn to_json(&self) -> Option<Value> {
        match self {
            Datum::Null => None,
            Datum::Boolean(b) => Some(Value::Bool(*b)),
            Datum::BigInt(n) => Some(Value::from(*n)),
            Datum::Double(d) => Some(Number::from_f64(*d).map_or(Value::Null, Value::Number)),
            Datum::Varchar(s) => Some(Value::String(s.clone())),
            Datum::Json(v) => Some(v.clone()),
        }
    }

    pub fn into_json(self) -> Option<Value> {
        match self {
            Datum::Varchar(s) => Some(Value::String(s)),
            Datum::Json(v) => Some(v),
            other => other.to_json(),
        }
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Null => f.write_str("NULL"),
            Datum::Boolean(b) => write!(f, "{}", b),
            Datum::BigInt(n) => write!(f, "{}", n),
            Datum::Double(d) => write!(f, "{}", d),
            Datum::Varchar(s) => write!(f, "'{}'", s),
            Datum::Json(v) => f.write_str(&json_debug_string(v)),
        }
    }
}

fn json_to_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn json_to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Bool(b) => Some(i64::from(*b)),
        Value::Number(n) => number_to_i64(n),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(f64_to_i64))
        }
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn number_to_i64(n: &Number) -> Option<i64> {
    if let Some(i) = n.as_i64() {
        return Some(i);
    }
    if n.is_u64() {
        return None;
    }
    n.as_f64().and_then(f64_to_i64)
}

fn f64_to_i64(f: f64) -> Option<i64> {
    if f.is_finite() && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        Some(f.trunc() as i64)
    } else {
        None
    }
}

fn json_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn json_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(_) | Value::Object(_) => Some(json_debug_string(value)),
    }
}

/// Compact JSON with a space after `:` and `,`
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

/// Render a JSON value the way debug output prints it, e.g. `{"a": 1, "b": [1, 2]}`
pub fn json_debug_string(value: &Value) -> String {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, SpacedFormatter);
    if serde::Serialize::serialize(value, &mut ser).is_err() {
        return value.to_string();
    }
    String::from_utf8(buf).unwrap_or_else(|_| value.to_string())
}
