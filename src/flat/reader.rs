use crate::access_path::AccessPath;
use crate::column::ColumnData;
use crate::error::{FlatJsonError, Result};
use crate::flat::plan::{FieldSource, ProjectedField, ReadPlan, SubColumnRef};
use crate::flat::remain::{deep_merge, insert_path, lookup_path, reconstruct};
use crate::schema::flat_schema::FlatSchema;
use crate::storage::column_store::{merge_ranges, ByteRange, ReaderStatistics, SubColumnReader};
use crate::storage::fs::RandomAccessFile;
use crate::storage::meta::ColumnMeta;
use crate::types::{json_debug_string, Datum};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, warn};

/// Lifecycle of a [`FlatJsonIterator`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IteratorState {
    Uninitialized,
    /// Bound to a file, not yet positioned
    Initialized,
    Positioned,
    Exhausted,
}

/// Rows of a projected read, keyed by dotted path
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedBatch {
    fields: Vec<String>,
    rows: Vec<Option<Vec<Datum>>>,
}

impl ProjectedBatch {
    pub fn field_names(&self) -> &[String] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cells of a row, `None` when the document is SQL NULL
    pub fn row(&self, idx: usize) -> Option<&[Datum]> {
        self.rows.get(idx).and_then(|r| r.as_deref())
    }

    pub fn value(&self, idx: usize, path: &str) -> Option<&Datum> {
        let pos = self.fields.iter().position(|f| f == path)?;
        self.row(idx).map(|cells| &cells[pos])
    }

    /// Row as `{a: 1, b.b2.b3: 'abc'}`, or `NULL`
    pub fn debug_row(&self, idx: usize) -> String {
        let Some(cells) = self.row(idx) else {
            return "NULL".to_string();
        };
        let mut out = String::from("{");
        for (i, (field, cell)) in self.fields.iter().zip(cells).enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let _ = write!(out, "{}: {}", field, cell);
        }
        out.push('}');
        out
    }
}

/// Output of one `next_batch` call
#[derive(Debug, Clone, PartialEq)]
pub enum ReadBatch {
    /// Whole documents; `None` is SQL NULL
    Documents(Vec<Option<Value>>),
    Projected(ProjectedBatch),
}

impl ReadBatch {
    pub fn len(&self) -> usize {
        match self {
            ReadBatch::Documents(rows) => rows.len(),
            ReadBatch::Projected(batch) => batch.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_projected(&self) -> bool {
        matches!(self, ReadBatch::Projected(_))
    }

    pub fn documents(&self) -> Option<&[Option<Value>]> {
        match self {
            ReadBatch::Documents(rows) => Some(rows),
            ReadBatch::Projected(_) => None,
        }
    }

    pub fn projected(&self) -> Option<&ProjectedBatch> {
        match self {
            ReadBatch::Projected(batch) => Some(batch),
            ReadBatch::Documents(_) => None,
        }
    }

    pub fn debug_item(&self, idx: usize) -> String {
        match self {
            ReadBatch::Documents(rows) => match rows.get(idx) {
                Some(Some(doc)) => json_debug_string(doc),
                _ => "NULL".to_string(),
            },
            ReadBatch::Projected(batch) => batch.debug_row(idx),
        }
    }
}

/// Entry point for reading a persisted JSON column
#[derive(Debug, Clone)]
pub struct ColumnReader {
    meta: Arc<ColumnMeta>,
    schema: FlatSchema,
}

impl ColumnReader {
    /// Load and validate the metadata footer of a column file
    pub fn open(file: &dyn RandomAccessFile) -> Result<Self> {
        ColumnReader::new(ColumnMeta::load(file)?)
    }

    pub fn new(meta: ColumnMeta) -> Result<Self> {
        let schema = meta
            .validate()
            .and_then(|_| FlatSchema::from_meta(&meta))
            .map_err(|e| {
                warn!(column_id = meta.column_id, error = %e, "rejecting json column metadata");
                e
            })?;
        Ok(ColumnReader {
            meta: Arc::new(meta),
            schema,
        })
    }

    pub fn meta(&self) -> &ColumnMeta {
        &self.meta
    }

    pub fn schema(&self) -> &FlatSchema {
        &self.schema
    }

    pub fn num_rows(&self) -> u64 {
        self.meta.num_rows
    }

    /// A new iterator; with a projection it produces the flat projection view
    pub fn new_iterator(&self, projection: Option<&AccessPath>) -> FlatJsonIterator {
        let plan = ReadPlan::new(&self.meta, &self.schema, projection);
        let readers = plan
            .sub_columns(&self.meta, &self.schema)
            .into_iter()
            .filter_map(|r| {
                let sub = match r {
                    SubColumnRef::Body => self.meta.body.clone(),
                    SubColumnRef::Child(idx) => self.meta.children.get(idx).cloned(),
                    SubColumnRef::NullMap => self.meta.null_map.clone(),
                }?;
                Some((r, SubColumnReader::new(sub, self.meta.compression)))
            })
            .collect::<Vec<_>>();

        let names: Vec<&str> = readers.iter().map(|(_, r)| r.name()).collect();
        debug!(column_id = self.meta.column_id, sub_columns = ?names, "planned json column read");

        FlatJsonIterator {
            meta: Arc::clone(&self.meta),
            schema: self.schema.clone(),
            plan,
            readers,
            file: None,
            state: IteratorState::Uninitialized,
            cursor: 0,
            stats: ReaderStatistics::default(),
        }
    }
}

/// Sequential reader over one JSON column.
///
/// Must be bound to a file with [`init`](Self::init) and positioned with a
/// seek before [`next_batch`](Self::next_batch).
pub struct FlatJsonIterator {
    meta: Arc<ColumnMeta>,
    schema: FlatSchema,
    plan: ReadPlan,
    readers: Vec<(SubColumnRef, SubColumnReader)>,
    file: Option<Arc<dyn RandomAccessFile>>,
    state: IteratorState,
    cursor: u64,
    stats: ReaderStatistics,
}

impl FlatJsonIterator {
    pub fn init(&mut self, file: Arc<dyn RandomAccessFile>) -> Result<()> {
        if self.state != IteratorState::Uninitialized {
            return Err(FlatJsonError::invalid_argument("iterator already initialized"));
        }
        self.file = Some(file);
        self.state = IteratorState::Initialized;
        Ok(())
    }

    pub fn state(&self) -> IteratorState {
        self.state
    }

    pub fn stats(&self) -> &ReaderStatistics {
        &self.stats
    }

    pub fn current_ordinal(&self) -> u64 {
        self.cursor
    }

    pub fn plan(&self) -> &ReadPlan {
        &self.plan
    }

    /// Names of the sub-columns this iterator decodes
    pub fn sub_column_names(&self) -> Vec<&str> {
        self.readers.iter().map(|(_, r)| r.name()).collect()
    }

    pub fn seek_to_first(&mut self) -> Result<()> {
        self.seek_to_ordinal(0)
    }

    pub fn seek_to_ordinal(&mut self, ordinal: u64) -> Result<()> {
        if self.state == IteratorState::Uninitialized {
            return Err(FlatJsonError::invalid_argument("seek on uninitialized iterator"));
        }
        if ordinal > self.meta.num_rows {
            return Err(FlatJsonError::invalid_argument(format!(
                "seek to {} beyond {} rows",
                ordinal, self.meta.num_rows
            )));
        }
        self.cursor = ordinal;
        self.state = if ordinal == self.meta.num_rows {
            IteratorState::Exhausted
        } else {
            IteratorState::Positioned
        };
        Ok(())
    }

    /// Read up to `max_rows` rows from the cursor
    pub fn next_batch(&mut self, max_rows: usize) -> Result<ReadBatch> {
        match self.state {
            IteratorState::Uninitialized | IteratorState::Initialized => {
                return Err(FlatJsonError::invalid_argument("next_batch before seek"));
            }
            IteratorState::Exhausted => return Ok(self.empty_batch()),
            IteratorState::Positioned => {}
        }

        let rows = (max_rows as u64).min(self.meta.num_rows - self.cursor);
        match self.read_rows(self.cursor, rows) {
            Ok(batch) => {
                self.cursor += rows;
                self.stats.rows_read += rows;
                if self.cursor == self.meta.num_rows {
                    self.state = IteratorState::Exhausted;
                }
                Ok(batch)
            }
            Err(e) => {
                warn!(column_id = self.meta.column_id, ordinal = self.cursor, error = %e, "json column read failed");
                self.state = IteratorState::Exhausted;
                Err(e)
            }
        }
    }

    /// Byte ranges the rows `[first_row, first_row + num_rows)` would read
    pub fn read_plan(&self, first_row: u64, num_rows: u64) -> Result<Vec<ByteRange>> {
        if first_row.checked_add(num_rows).map_or(true, |end| end > self.meta.num_rows) {
            return Err(FlatJsonError::invalid_argument(format!(
                "range {}+{} beyond {} rows",
                first_row, num_rows, self.meta.num_rows
            )));
        }
        let ranges = self
            .readers
            .iter()
            .flat_map(|(_, r)| r.io_ranges(first_row, num_rows))
            .collect();
        Ok(merge_ranges(ranges))
    }

    fn empty_batch(&self) -> ReadBatch {
        match &self.plan {
            ReadPlan::Project { fields, .. } => ReadBatch::Projected(ProjectedBatch {
                fields: fields.iter().map(|f| f.path.clone()).collect(),
                rows: Vec::new(),
            }),
            ReadPlan::Passthrough | ReadPlan::Reconstruct => ReadBatch::Documents(Vec::new()),
        }
    }

    fn read_rows(&mut self, first_row: u64, num_rows: u64) -> Result<ReadBatch> {
        let file = self
            .file
            .clone()
            .ok_or_else(|| FlatJsonError::invalid_argument("iterator has no file"))?;

        let mut columns = HashMap::with_capacity(self.readers.len());
        for (r, reader) in self.readers.iter_mut() {
            let data = reader.read(file.as_ref(), first_row, num_rows, &mut self.stats)?;
            columns.insert(*r, data);
        }
        let decoded = Decoded {
            columns,
            schema: &self.schema,
        };

        let n = num_rows as usize;
        let batch = match &self.plan {
            ReadPlan::Passthrough => ReadBatch::Documents((0..n).map(|i| decoded.body(i)).collect()),
            ReadPlan::Reconstruct => ReadBatch::Documents(
                (0..n)
                    .map(|i| (!decoded.is_null_row(i)).then(|| decoded.reconstruct(i)))
                    .collect(),
            ),
            ReadPlan::Project { fields, .. } => ReadBatch::Projected(ProjectedBatch {
                fields: fields.iter().map(|f| f.path.clone()).collect(),
                rows: (0..n)
                    .map(|i| {
                        (!decoded.is_null_row(i))
                            .then(|| fields.iter().map(|f| decoded.project(f, i)).collect())
                    })
                    .collect(),
            }),
        };
        Ok(batch)
    }
}

/// Sub-columns decoded for one batch
struct Decoded<'a> {
    columns: HashMap<SubColumnRef, ColumnData>,
    schema: &'a FlatSchema,
}

impl Decoded<'_> {
    fn cell(&self, r: SubColumnRef, row: usize) -> Datum {
        self.columns.get(&r).map_or(Datum::Null, |c| c.get(row))
    }

    fn body(&self, row: usize) -> Option<Value> {
        self.cell(SubColumnRef::Body, row).into_json()
    }

    fn is_null_row(&self, row: usize) -> bool {
        if !self.schema.is_flat {
            return self.cell(SubColumnRef::Body, row).is_null();
        }
        let marker = if self.schema.has_nulls {
            SubColumnRef::Child(0)
        } else {
            SubColumnRef::NullMap
        };
        self.columns
            .get(&marker)
            .and_then(|c| c.get_bool(row))
            .unwrap_or(false)
    }

    fn remain(&self, row: usize) -> Option<Value> {
        let idx = self.schema.remain_child_index()?;
        self.cell(SubColumnRef::Child(idx), row).into_json()
    }

    fn reconstruct(&self, row: usize) -> Value {
        let leaves = self.schema.paths.iter().enumerate().filter_map(|(i, path)| {
            let idx = self.schema.path_child_index(i);
            self.cell(SubColumnRef::Child(idx), row)
                .into_json()
                .map(|v| (path.segments().to_vec(), v))
        });
        reconstruct(leaves, self.remain(row))
    }

    fn project(&self, field: &ProjectedField, row: usize) -> Datum {
        let raw = match &field.source {
            FieldSource::Document => self
                .body(row)
                .and_then(|doc| lookup_path(&doc, &field.segments).cloned())
                .map_or(Datum::Null, Datum::Json),
            FieldSource::Child(idx) => self.cell(SubColumnRef::Child(*idx), row),
            FieldSource::Extract { child, rest } => self
                .cell(SubColumnRef::Child(*child), row)
                .into_json()
                .and_then(|v| lookup_path(&v, rest).cloned())
                .map_or(Datum::Null, Datum::Json),
            FieldSource::Merge { children } => self.merge(&field.segments, children, row),
            FieldSource::Remain => self
                .remain(row)
                .and_then(|r| lookup_path(&r, &field.segments).cloned())
                .map_or(Datum::Null, Datum::Json),
        };
        match field.target_type {
            Some(target) => raw.cast(target),
            None => raw,
        }
    }

    fn merge(&self, segments: &[String], children: &[(usize, Vec<String>)], row: usize) -> Datum {
        let mut obj = Map::new();
        let mut found = false;
        for (idx, relative) in children {
            if let Some(value) = self.cell(SubColumnRef::Child(*idx), row).into_json() {
                found |= insert_path(&mut obj, relative, value);
            }
        }
        match self.remain(row).and_then(|r| lookup_path(&r, segments).cloned()) {
            Some(Value::Object(rest)) => {
                deep_merge(&mut obj, rest);
                found = true;
            }
            Some(other) if !found => return Datum::Json(other),
            _ => {}
        }
        if found {
            Datum::Json(Value::Object(obj))
        } else {
            Datum::Null
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::JsonColumn;
    use crate::config::{FlatJsonConfig, WriterOptions};
    use crate::flat::writer::FlatJsonWriter;
    use crate::storage::fs::{FileSystem, MemoryFileSystem};
    use serde_json::json;
    use std::path::Path;

    fn write(column: JsonColumn, options: WriterOptions) -> (ColumnReader, Arc<dyn RandomAccessFile>) {
        let fs = MemoryFileSystem::new();
        let path = Path::new("reader.data");
        let mut writer = FlatJsonWriter::new(options, fs.new_writable_file(path).unwrap()).unwrap();
        writer.append(&column).unwrap();
        writer.finish().unwrap();
        let file = fs.new_random_access_file(path).unwrap();
        (ColumnReader::open(file.as_ref()).unwrap(), file)
    }

    fn rows() -> JsonColumn {
        JsonColumn::from_values((1..=5).map(|i| json!({"a": i, "b": 20 + i})).collect())
    }

    fn flat_options() -> WriterOptions {
        WriterOptions::flat().with_config(FlatJsonConfig::new(0.9, 0.3).unwrap())
    }

    #[test]
    fn test_state_machine() {
        let (reader, file) = write(rows(), flat_options());
        let mut iter = reader.new_iterator(None);
        assert_eq!(iter.state(), IteratorState::Uninitialized);
        assert!(iter.seek_to_first().is_err());

        iter.init(Arc::clone(&file)).unwrap();
        assert!(iter.init(Arc::clone(&file)).is_err());
        assert!(iter.next_batch(10).is_err());

        iter.seek_to_first().unwrap();
        assert_eq!(iter.state(), IteratorState::Positioned);
        assert_eq!(iter.next_batch(3).unwrap().len(), 3);
        assert_eq!(iter.state(), IteratorState::Positioned);
        assert_eq!(iter.next_batch(3).unwrap().len(), 2);
        assert_eq!(iter.state(), IteratorState::Exhausted);
        assert!(iter.next_batch(3).unwrap().is_empty());

        iter.seek_to_ordinal(4).unwrap();
        assert_eq!(iter.next_batch(10).unwrap().debug_item(0), r#"{"a": 5, "b": 25}"#);
        assert!(iter.seek_to_ordinal(6).unwrap_err().is_invalid_argument());
        iter.seek_to_ordinal(5).unwrap();
        assert_eq!(iter.state(), IteratorState::Exhausted);
    }

    #[test]
    fn test_read_plan_merges_ranges() {
        let (reader, file) = write(rows(), flat_options());
        let mut iter = reader.new_iterator(None);
        iter.init(file).unwrap();
        let ranges = iter.read_plan(0, 5).unwrap();
        assert_eq!(ranges.len(), 1);
        assert_eq!(iter.stats().bytes_read, 0);
        assert!(iter.read_plan(3, 3).is_err());
    }

    #[test]
    fn test_projection_reads_only_requested_children() {
        let (reader, file) = write(rows(), flat_options());
        let path = AccessPath::from_specs(&["b"]).unwrap();
        let mut iter = reader.new_iterator(Some(&path));
        assert_eq!(iter.sub_column_names(), vec!["b"]);

        iter.init(file).unwrap();
        iter.seek_to_first().unwrap();
        let batch = iter.next_batch(5).unwrap();
        assert_eq!(batch.debug_item(1), "{b: 22}");
        assert_eq!(iter.stats().pages_read, 1);
    }

    #[test]
    fn test_corrupt_metadata_rejected() {
        let (reader, _) = write(rows(), flat_options());
        let mut meta = reader.meta().clone();
        meta.children.swap(0, 1);
        meta.children[0].name = "remain".to_string();
        assert!(ColumnReader::new(meta).unwrap_err().is_corruption());
    }

    #[test]
    fn test_corrupt_page_terminates_iterator() {
        let (reader, file) = write(rows(), flat_options());
        let mut damaged = file.read_at(0, file.size().unwrap() as usize).unwrap();
        damaged[2] ^= 0x5a;
        let damaged: Arc<dyn RandomAccessFile> =
            Arc::new(crate::storage::fs::MemoryRandomAccessFile::new(damaged));

        let mut iter = reader.new_iterator(None);
        iter.init(damaged).unwrap();
        iter.seek_to_first().unwrap();
        assert!(iter.next_batch(5).unwrap_err().is_corruption());
        assert_eq!(iter.state(), IteratorState::Exhausted);
    }
}
