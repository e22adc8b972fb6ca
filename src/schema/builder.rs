//! Streaming statistics accumulator for flat JSON inference.
//!
//! Documents are fed one at a time. For every field path the builder keeps
//! the number of rows it occurred in and the set of value kinds seen there,
//! with children kept in first-discovery order. Selection happens afterwards
//! in [`crate::schema::inference`].

use crate::schema::flat_schema::is_flattenable_key;
use crate::types::LogicalType;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Kind of a JSON value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JsonKind {
    Null,
    Boolean,
    Integer,
    /// Integer too large for BIGINT
    Unsigned,
    Float,
    String,
    Array,
    Object,
}

impl JsonKind {
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => JsonKind::Null,
            Value::Bool(_) => JsonKind::Boolean,
            Value::Number(n) => {
                if n.is_i64() {
                    JsonKind::Integer
                } else if n.is_u64() {
                    JsonKind::Unsigned
                } else {
                    JsonKind::Float
                }
            }
            Value::String(_) => JsonKind::String,
            Value::Array(_) => JsonKind::Array,
            Value::Object(_) => JsonKind::Object,
        }
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// Set of kinds observed at one path
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KindSet(u8);

impl KindSet {
    pub fn insert(&mut self, kind: JsonKind) {
        self.0 |= kind.bit();
    }

    pub fn contains(&self, kind: JsonKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// True when exactly `kind` was seen
    pub fn is_only(&self, kind: JsonKind) -> bool {
        self.0 == kind.bit()
    }

    /// Only objects were seen, ignoring explicit JSON nulls
    pub fn is_object(&self) -> bool {
        self.0 & !JsonKind::Null.bit() == JsonKind::Object.bit()
    }

    /// Objects mixed with scalars or arrays
    pub fn is_heterogeneous(&self) -> bool {
        self.contains(JsonKind::Object) && !self.is_object()
    }

    /// The narrowest type that stores every observed value without loss
    pub fn natural_type(&self) -> LogicalType {
        if self.is_only(JsonKind::Integer) {
            LogicalType::BigInt
        } else if self.is_only(JsonKind::Float) {
            LogicalType::Double
        } else if self.is_only(JsonKind::String) {
            LogicalType::Varchar
        } else if self.is_only(JsonKind::Boolean) {
            LogicalType::Boolean
        } else {
            LogicalType::Json
        }
    }
}

/// Statistics for one field path
#[derive(Debug, Default)]
pub struct PathStats {
    occurrences: usize,
    kinds: KindSet,
    children: Vec<(String, PathStats)>,
    index: HashMap<String, usize>,
}

impl PathStats {
    fn add_value(&mut self, value: &Value) {
        self.occurrences += 1;
        self.kinds.insert(JsonKind::from_value(value));
        if let Value::Object(obj) = value {
            self.add_fields(obj);
        }
    }

    fn add_fields(&mut self, obj: &Map<String, Value>) {
        for (key, value) in obj.iter() {
            if !is_flattenable_key(key) {
                continue;
            }
            self.child_mut(key).add_value(value);
        }
    }

    fn child_mut(&mut self, key: &str) -> &mut PathStats {
        let idx = match self.index.get(key) {
            Some(&idx) => idx,
            None => {
                self.children.push((key.to_string(), PathStats::default()));
                let idx = self.children.len() - 1;
                self.index.insert(key.to_string(), idx);
                idx
            }
        };
        &mut self.children[idx].1
    }

    /// Number of rows this path was present in
    pub fn occurrences(&self) -> usize {
        self.occurrences
    }

    pub fn kinds(&self) -> KindSet {
        self.kinds
    }

    /// Children in first-discovery order
    pub fn children(&self) -> impl Iterator<Item = (&str, &PathStats)> {
        self.children.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn child(&self, key: &str) -> Option<&PathStats> {
        self.index.get(key).map(|&idx| &self.children[idx].1)
    }
}

/// Accumulates per-path statistics over a batch of documents
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    total_rows: usize,
    null_rows: usize,
    root: PathStats,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        SchemaBuilder::default()
    }

    /// Add one row; `None` is a SQL NULL document
    pub fn add_document(&mut self, doc: Option<&Value>) {
        self.total_rows += 1;
        match doc {
            None => self.null_rows += 1,
            // Bare scalars and arrays count as rows but add no paths
            Some(Value::Object(obj)) => self.root.add_fields(obj),
            Some(_) => {}
        }
    }

    pub fn total_rows(&self) -> usize {
        self.total_rows
    }

    pub fn null_rows(&self) -> usize {
        self.null_rows
    }

    pub fn non_null_rows(&self) -> usize {
        self.total_rows - self.null_rows
    }

    /// Top-level fields
    pub fn root(&self) -> &PathStats {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_occurrence_counts() {
        let mut builder = SchemaBuilder::new();
        builder.add_document(Some(&json!({"a": 1, "b": 2})));
        builder.add_document(Some(&json!({"a": 2})));
        builder.add_document(None);

        assert_eq!(builder.total_rows(), 3);
        assert_eq!(builder.null_rows(), 1);
        assert_eq!(builder.root().child("a").unwrap().occurrences(), 2);
        assert_eq!(builder.root().child("b").unwrap().occurrences(), 1);
    }

    #[test]
    fn test_first_discovery_order() {
        let mut builder = SchemaBuilder::new();
        builder.add_document(Some(&json!({"z": 1, "a": {"y": 1}})));
        builder.add_document(Some(&json!({"m": 1, "a": {"x": 1, "y": 2}})));

        let keys: Vec<&str> = builder.root().children().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
        let nested: Vec<&str> = builder.root().child("a").unwrap().children().map(|(k, _)| k).collect();
        assert_eq!(nested, vec!["y", "x"]);
    }

    #[test]
    fn test_scalar_documents_add_no_paths() {
        let mut builder = SchemaBuilder::new();
        builder.add_document(Some(&json!("")));
        builder.add_document(Some(&json!([1, 2])));
        assert_eq!(builder.non_null_rows(), 2);
        assert_eq!(builder.root().children().count(), 0);
    }

    #[test]
    fn test_natural_types() {
        let mut kinds = KindSet::default();
        kinds.insert(JsonKind::Integer);
        assert_eq!(kinds.natural_type(), LogicalType::BigInt);
        kinds.insert(JsonKind::Float);
        assert_eq!(kinds.natural_type(), LogicalType::Json);

        let mut strings = KindSet::default();
        strings.insert(JsonKind::String);
        assert_eq!(strings.natural_type(), LogicalType::Varchar);

        let mut nullable = KindSet::default();
        nullable.insert(JsonKind::Boolean);
        nullable.insert(JsonKind::Null);
        assert_eq!(nullable.natural_type(), LogicalType::Json);
    }

    #[test]
    fn test_heterogeneous_kinds() {
        let mut kinds = KindSet::default();
        kinds.insert(JsonKind::Object);
        kinds.insert(JsonKind::Null);
        assert!(kinds.is_object());
        assert!(!kinds.is_heterogeneous());

        kinds.insert(JsonKind::Array);
        assert!(!kinds.is_object());
        assert!(kinds.is_heterogeneous());
    }

    #[test]
    fn test_dotted_keys_skipped() {
        let mut builder = SchemaBuilder::new();
        builder.add_document(Some(&json!({"a.b": 1, "": 2, "c": 3})));
        let keys: Vec<&str> = builder.root().children().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["c"]);
    }
}
