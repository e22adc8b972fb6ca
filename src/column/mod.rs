//! In-memory column representations.
//!
//! [`JsonColumn`] is the batch handed to the writer and produced by the
//! reader; [`ColumnData`] holds one typed sub-column.

pub mod sub_column;

pub use sub_column::ColumnData;

use crate::error::{FlatJsonError, Result};
use serde_json::Value;

/// A batch of JSON documents. `None` rows are SQL NULL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JsonColumn {
    rows: Vec<Option<Value>>,
    nullable: bool,
}

impl JsonColumn {
    /// Empty non-nullable column
    pub fn new() -> Self {
        JsonColumn::default()
    }

    /// Empty nullable column
    pub fn nullable() -> Self {
        JsonColumn {
            rows: Vec::new(),
            nullable: true,
        }
    }

    pub fn from_values(values: Vec<Value>) -> Self {
        JsonColumn {
            rows: values.into_iter().map(Some).collect(),
            nullable: false,
        }
    }

    /// Nullable column from rows that may be SQL NULL
    pub fn from_rows(rows: Vec<Option<Value>>) -> Self {
        JsonColumn {
            rows,
            nullable: true,
        }
    }

    /// Parse JSON texts; the literal `NULL` makes a SQL NULL row and the
    /// column nullable.
    pub fn parse<S: AsRef<str>>(texts: &[S]) -> Result<Self> {
        let mut column = JsonColumn::new();
        for (i, text) in texts.iter().enumerate() {
            let text = text.as_ref().trim();
            if text == "NULL" {
                column.nullable = true;
                column.rows.push(None);
                continue;
            }
            let value: Value = serde_json::from_str(text).map_err(|e| {
                FlatJsonError::invalid_argument(format!("row {}: invalid json: {}", i, e))
            })?;
            column.rows.push(Some(value));
        }
        Ok(column)
    }

    pub fn append(&mut self, value: Value) {
        self.rows.push(Some(value));
    }

    pub fn append_null(&mut self) -> Result<()> {
        if !self.nullable {
            return Err(FlatJsonError::invalid_argument(
                "cannot append null to a non-nullable column",
            ));
        }
        self.rows.push(None);
        Ok(())
    }

    /// Append another batch; a nullable batch makes this column nullable
    pub fn extend(&mut self, other: &JsonColumn) {
        self.nullable |= other.nullable;
        self.rows.extend(other.rows.iter().cloned());
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn null_count(&self) -> usize {
        self.rows.iter().filter(|r| r.is_none()).count()
    }

    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.rows.get(idx).and_then(Option::as_ref)
    }

    pub fn rows(&self) -> &[Option<Value>] {
        &self.rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_with_nulls() {
        let column = JsonColumn::parse(&[r#"{"a": 1}"#, "NULL", "[1, 2]"]).unwrap();
        assert!(column.is_nullable());
        assert_eq!(column.len(), 3);
        assert_eq!(column.null_count(), 1);
        assert_eq!(column.get(0), Some(&json!({"a": 1})));
        assert_eq!(column.get(1), None);
    }

    #[test]
    fn test_parse_rejects_bad_json() {
        let err = JsonColumn::parse(&["{"]).unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_append_null_requires_nullable() {
        let mut column = JsonColumn::new();
        assert!(column.append_null().is_err());
        let mut column = JsonColumn::nullable();
        column.append_null().unwrap();
        column.append(json!(1));
        assert_eq!(column.len(), 2);
    }

    #[test]
    fn test_extend_promotes_nullable() {
        let mut column = JsonColumn::from_values(vec![json!(1)]);
        column.extend(&JsonColumn::from_rows(vec![None]));
        assert!(column.is_nullable());
        assert_eq!(column.len(), 2);
    }
}
