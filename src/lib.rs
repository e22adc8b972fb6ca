//! # flatjson - Flat JSON columnar storage
//!
//! Stores a column of JSON documents as a set of typed sub-columns: paths that
//! occur in most rows get their own column, everything else stays in a
//! per-row `remain` document.
//!
//! ## Modules
//!
//! - **schema**: infer which paths to flatten (`SchemaInferrer`)
//! - **flat**: write flattened columns and read them back, whole or projected
//! - **storage**: pages, metadata footer and the file abstraction underneath
//! - **access_path**: path trees used both to force and to project paths
//!
//! ## Quick Start
//!
//! ```rust
//! use flatjson::{AccessPath, ColumnReader, FlatJsonWriter, JsonColumn, WriterOptions};
//! use flatjson::storage::{FileSystem, MemoryFileSystem};
//! use serde_json::json;
//! use std::path::Path;
//!
//! # fn main() -> flatjson::Result<()> {
//! let fs = MemoryFileSystem::new();
//! let path = Path::new("events.data");
//!
//! let mut writer = FlatJsonWriter::new(WriterOptions::flat(), fs.new_writable_file(path)?)?;
//! writer.append(&JsonColumn::from_values(vec![
//!     json!({"id": 1, "kind": "click", "extra": {"x": 3}}),
//!     json!({"id": 2, "kind": "view"}),
//! ]))?;
//! let meta = writer.finish()?;
//! assert_eq!(meta.child_names(), vec!["id", "kind", "remain"]);
//!
//! let file = fs.new_random_access_file(path)?;
//! let reader = ColumnReader::open(file.as_ref())?;
//! let projection = AccessPath::from_specs(&["kind", "extra.x:bigint"])?;
//! let mut iter = reader.new_iterator(Some(&projection));
//! iter.init(file)?;
//! iter.seek_to_first()?;
//! let batch = iter.next_batch(16)?;
//! assert_eq!(batch.debug_item(0), "{kind: 'click', extra.x: 3}");
//! # Ok(())
//! # }
//! ```

use serde_json::Value;
use std::io::BufRead;

pub mod access_path;
pub mod column;
pub mod config;
pub mod error;
pub mod flat;
pub mod schema;
pub mod storage;
pub mod types;

// Re-export commonly used types for convenience
pub use access_path::AccessPath;
pub use column::{ColumnData, JsonColumn};
pub use config::{Compression, FlatJsonConfig, WriterOptions};
pub use error::{FlatJsonError, Result};
pub use flat::{ColumnReader, FlatJsonIterator, FlatJsonWriter, IteratorState, ReadBatch};
pub use schema::{FlatSchema, SchemaInferrer};
pub use types::{Datum, LogicalType};

/// Read newline-delimited JSON into a column.
///
/// Blank lines are skipped. A line holding `null` becomes a SQL NULL row,
/// which makes the column nullable.
pub fn read_ndjson<R: BufRead>(reader: R) -> Result<JsonColumn> {
    let mut rows = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let mut bytes = line.into_bytes();
        let value: Value = simd_json::serde::from_slice(&mut bytes).map_err(|e| {
            FlatJsonError::invalid_argument(format!("line {}: invalid JSON: {}", lineno + 1, e))
        })?;
        rows.push((!value.is_null()).then_some(value));
    }

    if rows.iter().any(Option::is_none) {
        Ok(JsonColumn::from_rows(rows))
    } else {
        Ok(JsonColumn::from_values(rows.into_iter().flatten().collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_read_ndjson() {
        let input = "{\"a\": 1}\n\n null \n{\"a\": [2, 3]}\n";
        let column = read_ndjson(input.as_bytes()).unwrap();
        assert_eq!(column.len(), 3);
        assert!(column.is_nullable());
        assert_eq!(column.null_count(), 1);
        assert_eq!(column.get(2), Some(&json!({"a": [2, 3]})));
    }

    #[test]
    fn test_read_ndjson_reports_line() {
        let err = read_ndjson("{\"a\": 1}\n{oops\n".as_bytes()).unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(err.to_string().contains("line 2"));
    }
}
