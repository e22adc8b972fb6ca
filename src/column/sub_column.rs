use crate::types::{Datum, LogicalType};
use serde_json::Value;

/// Values of one typed sub-column; `None` entries are NULL
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Boolean(Vec<Option<bool>>),
    BigInt(Vec<Option<i64>>),
    Double(Vec<Option<f64>>),
    Varchar(Vec<Option<String>>),
    Json(Vec<Option<Value>>),
}

impl ColumnData {
    pub fn new(logical_type: LogicalType) -> Self {
        ColumnData::with_capacity(logical_type, 0)
    }

    pub fn with_capacity(logical_type: LogicalType, capacity: usize) -> Self {
        match logical_type {
            LogicalType::Boolean => ColumnData::Boolean(Vec::with_capacity(capacity)),
            LogicalType::BigInt => ColumnData::BigInt(Vec::with_capacity(capacity)),
            LogicalType::Double => ColumnData::Double(Vec::with_capacity(capacity)),
            LogicalType::Varchar => ColumnData::Varchar(Vec::with_capacity(capacity)),
            LogicalType::Json => ColumnData::Json(Vec::with_capacity(capacity)),
        }
    }

    pub fn logical_type(&self) -> LogicalType {
        match self {
            ColumnData::Boolean(_) => LogicalType::Boolean,
            ColumnData::BigInt(_) => LogicalType::BigInt,
            ColumnData::Double(_) => LogicalType::Double,
            ColumnData::Varchar(_) => LogicalType::Varchar,
            ColumnData::Json(_) => LogicalType::Json,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnData::Boolean(v) => v.len(),
            ColumnData::BigInt(v) => v.len(),
            ColumnData::Double(v) => v.len(),
            ColumnData::Varchar(v) => v.len(),
            ColumnData::Json(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_null(&self, idx: usize) -> bool {
        match self {
            ColumnData::Boolean(v) => v[idx].is_none(),
            ColumnData::BigInt(v) => v[idx].is_none(),
            ColumnData::Double(v) => v[idx].is_none(),
            ColumnData::Varchar(v) => v[idx].is_none(),
            ColumnData::Json(v) => v[idx].is_none(),
        }
    }

    pub fn null_count(&self) -> usize {
        (0..self.len()).filter(|&i| self.is_null(i)).count()
    }

    /// Append a cell, casting it first if its type differs
    pub fn push(&mut self, datum: Datum) {
        match (self, datum) {
            (ColumnData::Boolean(v), Datum::Boolean(b)) => v.push(Some(b)),
            (ColumnData::BigInt(v), Datum::BigInt(n)) => v.push(Some(n)),
            (ColumnData::Double(v), Datum::Double(d)) => v.push(Some(d)),
            (ColumnData::Varchar(v), Datum::Varchar(s)) => v.push(Some(s)),
            (ColumnData::Json(v), Datum::Json(j)) => v.push(Some(j)),
            (this, Datum::Null) => this.push_null(),
            (this, other) => {
                let cast = other.cast(this.logical_type());
                if cast.is_null() {
                    this.push_null();
                } else {
                    this.push(cast);
                }
            }
        }
    }

    pub fn push_null(&mut self) {
        match self {
            ColumnData::Boolean(v) => v.push(None),
            ColumnData::BigInt(v) => v.push(None),
            ColumnData::Double(v) => v.push(None),
            ColumnData::Varchar(v) => v.push(None),
            ColumnData::Json(v) => v.push(None),
        }
    }

    pub fn get(&self, idx: usize) -> Datum {
        match self {
            ColumnData::Boolean(v) => v[idx].map_or(Datum::Null, Datum::Boolean),
            ColumnData::BigInt(v) => v[idx].map_or(Datum::Null, Datum::BigInt),
            ColumnData::Double(v) => v[idx].map_or(Datum::Null, Datum::Double),
            ColumnData::Varchar(v) => v[idx].clone().map_or(Datum::Null, Datum::Varchar),
            ColumnData::Json(v) => v[idx].clone().map_or(Datum::Null, Datum::Json),
        }
    }

    /// Boolean value at `idx`, `None` if NULL or not a boolean column
    pub fn get_bool(&self, idx: usize) -> Option<bool> {
        match self {
            ColumnData::Boolean(v) => v[idx],
            _ => None,
        }
    }

    /// Copy of rows `[start, start + len)`
    pub fn slice(&self, start: usize, len: usize) -> ColumnData {
        let end = start + len;
        match self {
            ColumnData::Boolean(v) => ColumnData::Boolean(v[start..end].to_vec()),
            ColumnData::BigInt(v) => ColumnData::BigInt(v[start..end].to_vec()),
            ColumnData::Double(v) => ColumnData::Double(v[start..end].to_vec()),
            ColumnData::Varchar(v) => ColumnData::Varchar(v[start..end].to_vec()),
            ColumnData::Json(v) => ColumnData::Json(v[start..end].to_vec()),
        }
    }

    /// Append rows of another sub-column of the same type
    pub fn extend_from(&mut self, other: ColumnData) {
        match (self, other) {
            (ColumnData::Boolean(a), ColumnData::Boolean(b)) => a.extend(b),
            (ColumnData::BigInt(a), ColumnData::BigInt(b)) => a.extend(b),
            (ColumnData::Double(a), ColumnData::Double(b)) => a.extend(b),
            (ColumnData::Varchar(a), ColumnData::Varchar(b)) => a.extend(b),
            (ColumnData::Json(a), ColumnData::Json(b)) => a.extend(b),
            (this, other) => {
                for i in 0..other.len() {
                    this.push(other.get(i));
                }
            }
        }
    }
}
