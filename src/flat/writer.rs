use crate::column::{ColumnData, JsonColumn};
use crate::config::WriterOptions;
use crate::error::{FlatJsonError, Result};
use crate::flat::remain::{lookup_path, RemainSplitter};
use crate::schema::flat_schema::{FlatSchema, NULLS_NAME, REMAIN_NAME};
use crate::schema::SchemaInferrer;
use crate::storage::column_store::write_sub_column;
use crate::storage::fs::WritableFile;
use crate::storage::meta::{ColumnMeta, JsonMeta};
use crate::types::{Datum, LogicalType};
use serde_json::{Map, Value};
use tracing::info;

const BODY_NAME: &str = "json";
const NULL_MAP_NAME: &str = "null_map";

/// A flat schema applied to a batch: one typed buffer per child, row aligned
#[derive(Debug, Clone, PartialEq)]
pub struct FlattenedColumns {
    pub nulls: Option<ColumnData>,
    pub paths: Vec<ColumnData>,
    pub remain: Option<ColumnData>,
}

impl FlattenedColumns {
    /// Children in persisted order, with their names
    pub fn into_children(self, schema: &FlatSchema) -> Vec<(String, ColumnData)> {
        let mut children = Vec::with_capacity(self.paths.len() + 2);
        if let Some(nulls) = self.nulls {
            children.push((NULLS_NAME.to_string(), nulls));
        }
        children.extend(
            schema
                .paths
                .iter()
                .map(|p| p.path().to_string())
                .zip(self.paths),
        );
        if let Some(remain) = self.remain {
            children.push((REMAIN_NAME.to_string(), remain));
        }
        children
    }
}

/// Split every row of `column` into the sub-columns `schema` describes
pub fn flatten(schema: &FlatSchema, column: &JsonColumn) -> FlattenedColumns {
    let rows = column.len();
    let mut nulls = schema
        .has_nulls
        .then(|| ColumnData::with_capacity(LogicalType::Boolean, rows));
    let mut paths: Vec<ColumnData> = schema
        .paths
        .iter()
        .map(|p| ColumnData::with_capacity(p.logical_type(), rows))
        .collect();
    let mut remain = schema
        .has_remain
        .then(|| ColumnData::with_capacity(LogicalType::Json, rows));
    let splitter = RemainSplitter::new(&schema.paths);

    for row in column.rows() {
        if let Some(nulls) = nulls.as_mut() {
            nulls.push(Datum::Boolean(row.is_none()));
        }
        match row {
            None => {
                for data in paths.iter_mut() {
                    data.push_null();
                }
                if let Some(remain) = remain.as_mut() {
                    remain.push(Datum::Json(Value::Object(Map::new())));
                }
            }
            Some(doc) => {
                for (path, data) in schema.paths.iter().zip(paths.iter_mut()) {
                    match lookup_path(doc, path.segments()) {
                        Some(value) => data.push(Datum::from_json(value, path.logical_type())),
                        None => data.push_null(),
                    }
                }
                if let Some(remain) = remain.as_mut() {
                    remain.push(Datum::Json(splitter.split(doc)));
                }
            }
        }
    }

    FlattenedColumns {
        nulls,
        paths,
        remain,
    }
}

/// Writes one JSON column, flattening it when asked to.
///
/// Rows are buffered by [`append`](Self::append); the schema is inferred and
/// everything is persisted by [`finish`](Self::finish).
pub struct FlatJsonWriter {
    options: WriterOptions,
    file: Box<dyn WritableFile>,
    column: JsonColumn,
}

impl FlatJsonWriter {
    pub fn new(options: WriterOptions, file: Box<dyn WritableFile>) -> Result<Self> {
        options.validate()?;
        Ok(FlatJsonWriter {
            options,
            file,
            column: JsonColumn::new(),
        })
    }

    pub fn append(&mut self, batch: &JsonColumn) -> Result<()> {
        if (self.column.len() + batch.len()) as u64 > u64::from(u32::MAX) {
            return Err(FlatJsonError::invalid_argument("json column exceeds u32::MAX rows"));
        }
        self.column.extend(batch);
        Ok(())
    }

    pub fn num_rows(&self) -> usize {
        self.column.len()
    }

    /// The schema this writer would persist for the rows appended so far
    pub fn infer_schema(&self) -> Result<FlatSchema> {
        if !self.options.need_flat {
            return Ok(FlatSchema::unflattened());
        }
        let config = self.options.effective_config()?;
        let mut inferrer = SchemaInferrer::new(config);
        if let Some(path) = &self.options.access_path {
            inferrer = inferrer.with_access_path(path);
        }
        Ok(inferrer.infer(&self.column))
    }

    /// Infer the schema, write all pages and the metadata footer, and close
    /// the file. A failure leaves no usable column.
    pub fn finish(mut self) -> Result<ColumnMeta> {
        let schema = self.infer_schema()?;
        let compression = self.options.compression;
        let page_rows = self.options.page_rows;
        let file = self.file.as_mut();

        let mut children = Vec::new();
        let mut body = None;
        let mut null_map = None;

        if schema.is_flat {
            let flattened = flatten(&schema, &self.column);
            for (name, data) in flattened.into_children(&schema) {
                children.push(write_sub_column(file, &name, &data, page_rows, compression)?);
            }
            if self.column.is_nullable() && !schema.has_nulls {
                let bitmap = ColumnData::Boolean(
                    self.column.rows().iter().map(|r| Some(r.is_none())).collect(),
                );
                null_map = Some(write_sub_column(file, NULL_MAP_NAME, &bitmap, page_rows, compression)?);
            }
        } else {
            let data = ColumnData::Json(self.column.rows().to_vec());
            body = Some(write_sub_column(file, BODY_NAME, &data, page_rows, compression)?);
        }

        let meta = ColumnMeta {
            column_id: self.options.column_id,
            is_nullable: self.column.is_nullable(),
            num_rows: self.column.len() as u64,
            compression,
            json: JsonMeta {
                is_flat: schema.is_flat,
                has_remain: schema.has_remain,
            },
            children,
            body,
            null_map,
        };
        meta.write_footer(file)?;
        let bytes = file.size();
        file.close()?;

        info!(
            column_id = meta.column_id,
            rows = meta.num_rows,
            is_flat = meta.json.is_flat,
            children = ?meta.child_names(),
            bytes,
            "finished json column"
        );
        Ok(meta)
    }
}
