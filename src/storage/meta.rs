//! Persisted column metadata.
//!
//! The metadata is written as a JSON footer after all pages:
//! `[meta json][u32 length][magic]`.

use crate::config::Compression;
use crate::error::{FlatJsonError, Result};
use crate::schema::flat_schema::{NULLS_NAME, REMAIN_NAME};
use crate::storage::fs::{RandomAccessFile, WritableFile};
use crate::storage::page::Encoding;
use crate::types::LogicalType;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const FOOTER_MAGIC: &[u8; 4] = b"FJC1";
const FOOTER_TAIL_LEN: u64 = 8;

/// Location of one page in the file (ordinal index entry)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagePointer {
    pub first_row: u64,
    pub num_rows: u64,
    pub offset: u64,
    pub size: u64,
}

/// One persisted typed sub-column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubColumnMeta {
    /// Dotted field path, `remain`, `nulls`, or an internal name
    pub name: String,
    #[serde(rename = "type")]
    pub logical_type: LogicalType,
    pub encoding: Encoding,
    pub num_rows: u64,
    pub pages: Vec<PagePointer>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonMeta {
    pub is_flat: bool,
    pub has_remain: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub column_id: u32,
    pub is_nullable: bool,
    pub num_rows: u64,
    pub compression: Compression,
    pub json: JsonMeta,
    /// `[nulls?] paths... [remain?]`, empty when not flat
    pub children: Vec<SubColumnMeta>,
    /// Whole documents, only when not flat
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<SubColumnMeta>,
    /// Document null bitmap of a flat nullable column without a nulls child
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub null_map: Option<SubColumnMeta>,
}

impl ColumnMeta {
    pub fn has_nulls(&self) -> bool {
        self.children
            .first()
            .map_or(false, |c| c.name == NULLS_NAME)
    }

    pub fn child_names(&self) -> Vec<&str> {
        self.children.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn child(&self, name: &str) -> Option<&SubColumnMeta> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Check the layout a reader relies on
    pub fn validate(&self) -> Result<()> {
        if self.json.is_flat {
            self.validate_flat()?;
        } else {
            if !self.children.is_empty() || self.json.has_remain {
                return Err(FlatJsonError::corruption(
                    "unflattened json column carries flat children",
                ));
            }
            let body = self
                .body
                .as_ref()
                .ok_or_else(|| FlatJsonError::corruption("json column without body"))?;
            if body.logical_type != LogicalType::Json {
                return Err(FlatJsonError::corruption("json column body is not JSON"));
            }
        }

        if let Some(null_map) = &self.null_map {
            if !self.is_nullable || self.has_nulls() || null_map.logical_type != LogicalType::Boolean {
                return Err(FlatJsonError::corruption("unexpected null map"));
            }
        }

        for sub in self.sub_columns() {
            self.validate_pages(sub)?;
        }
        Ok(())
    }

    fn validate_flat(&self) -> Result<()> {
        if self.body.is_some() {
            return Err(FlatJsonError::corruption("flat json column carries a body"));
        }
        let mut names = HashSet::new();
        let last = self.children.len().saturating_sub(1);
        let mut paths = 0;
        for (i, child) in self.children.iter().enumerate() {
            if !names.insert(child.name.as_str()) {
                return Err(FlatJsonError::corruption(format!(
                    "duplicate flat json child {}",
                    child.name
                )));
            }
            match child.name.as_str() {
                NULLS_NAME => {
                    if i != 0 || child.logical_type != LogicalType::Boolean {
                        return Err(FlatJsonError::corruption("nulls child must be first and BOOLEAN"));
                    }
                }
                REMAIN_NAME => {
                    if i != last || !self.json.has_remain || child.logical_type != LogicalType::Json {
                        return Err(FlatJsonError::corruption("remain child must be last and JSON"));
                    }
                }
                _ => paths += 1,
            }
        }
        if paths == 0 {
            return Err(FlatJsonError::corruption("flat json column without paths"));
        }
        if self.json.has_remain && !names.contains(REMAIN_NAME) {
            return Err(FlatJsonError::corruption("flat json column is missing remain"));
        }
        Ok(())
    }

    fn validate_pages(&self, sub: &SubColumnMeta) -> Result<()> {
        if sub.num_rows != self.num_rows {
            return Err(FlatJsonError::corruption(format!(
                "sub-column {} has {} rows, column has {}",
                sub.name, sub.num_rows, self.num_rows
            )));
        }
        let mut next_row = 0;
        for page in &sub.pages {
            if page.first_row != next_row || page.num_rows == 0 {
                return Err(FlatJsonError::corruption(format!(
                    "ordinal index of {} is not contiguous",
                    sub.name
                )));
            }
            next_row += page.num_rows;
        }
        if next_row != sub.num_rows {
            return Err(FlatJsonError::corruption(format!(
                "pages of {} cover {} of {} rows",
                sub.name, next_row, sub.num_rows
            )));
        }
        Ok(())
    }

    /// Every persisted sub-column
    pub fn sub_columns(&self) -> impl Iterator<Item = &SubColumnMeta> {
        self.children
            .iter()
            .chain(self.body.iter())
            .chain(self.null_map.iter())
    }

    pub fn write_footer(&self, file: &mut dyn WritableFile) -> Result<()> {
        let bytes = serde_json::to_vec(self)
            .map_err(|e| FlatJsonError::invalid_argument(format!("unserializable meta: {}", e)))?;
        let len = u32::try_from(bytes.len())
            .map_err(|_| FlatJsonError::invalid_argument("column meta too large"))?;
        file.append(&bytes)?;
        file.append(&len.to_le_bytes())?;
        file.append(FOOTER_MAGIC)
    }

    pub fn load(file: &dyn RandomAccessFile) -> Result<ColumnMeta> {
        let size = file.size()?;
        if size < FOOTER_TAIL_LEN {
            return Err(FlatJsonError::corruption(format!("file too small for footer: {} bytes", size)));
        }
        let tail = file.read_at(size - FOOTER_TAIL_LEN, FOOTER_TAIL_LEN as usize)?;
        if &tail[4..] != FOOTER_MAGIC {
            return Err(FlatJsonError::corruption("bad footer magic"));
        }
        let len = u32::from_le_bytes([tail[0], tail[1], tail[2], tail[3]]) as u64;
        if len + FOOTER_TAIL_LEN > size {
            return Err(FlatJsonError::corruption(format!("footer length {} exceeds file", len)));
        }
        let bytes = file.read_at(size - FOOTER_TAIL_LEN - len, len as usize)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| FlatJsonError::corruption(format!("undecodable column meta: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::fs::MemoryRandomAccessFile;

    fn sub(name: &str, ty: LogicalType, rows: u64) -> SubColumnMeta {
        SubColumnMeta {
            name: name.to_string(),
            logical_type: ty,
            encoding: Encoding::Plain,
            num_rows: rows,
            pages: vec![PagePointer {
                first_row: 0,
                num_rows: rows,
                offset: 0,
                size: 10,
            }],
        }
    }

    fn flat_meta(children: Vec<SubColumnMeta>, has_remain: bool) -> ColumnMeta {
        ColumnMeta {
            column_id: 0,
            is_nullable: false,
            num_rows: 5,
            compression: Compression::Lz4,
            json: JsonMeta {
                is_flat: true,
                has_remain,
            },
            children,
            body: None,
            null_map: None,
        }
    }

    #[test]
    fn test_valid_layout() {
        let meta = flat_meta(
            vec![
                sub("nulls", LogicalType::Boolean, 5),
                sub("a", LogicalType::BigInt, 5),
                sub("remain", LogicalType::Json, 5),
            ],
            true,
        );
        meta.validate().unwrap();
        assert!(meta.has_nulls());
        assert_eq!(meta.child_names(), vec!["nulls", "a", "remain"]);
    }

    #[test]
    fn test_misplaced_markers() {
        let meta = flat_meta(
            vec![sub("a", LogicalType::BigInt, 5), sub("nulls", LogicalType::Boolean, 5)],
            false,
        );
        assert!(meta.validate().unwrap_err().is_corruption());

        let meta = flat_meta(
            vec![sub("remain", LogicalType::Json, 5), sub("a", LogicalType::BigInt, 5)],
            true,
        );
        assert!(meta.validate().unwrap_err().is_corruption());

        let meta = flat_meta(vec![sub("a", LogicalType::BigInt, 5)], true);
        assert!(meta.validate().unwrap_err().is_corruption());
    }

    #[test]
    fn test_row_count_mismatch() {
        let meta = flat_meta(vec![sub("a", LogicalType::BigInt, 4)], false);
        assert!(meta.validate().unwrap_err().is_corruption());
    }

    #[test]
    fn test_footer_roundtrip() {
        let meta = flat_meta(vec![sub("a", LogicalType::BigInt, 5)], false);
        let mut buf = Vec::new();
        {
            let mut sink = VecFile(&mut buf);
            meta.write_footer(&mut sink).unwrap();
        }
        let mut file_bytes = vec![0u8; 10];
        file_bytes.extend(buf);
        let file = MemoryRandomAccessFile::new(file_bytes);
        assert_eq!(ColumnMeta::load(&file).unwrap(), meta);
    }

    #[test]
    fn test_bad_footer() {
        let file = MemoryRandomAccessFile::new(b"garbage!!".to_vec());
        assert!(ColumnMeta::load(&file).unwrap_err().is_corruption());
    }

    struct VecFile<'a>(&'a mut Vec<u8>);

    impl WritableFile for VecFile<'_> {
        fn append(&mut self, data: &[u8]) -> Result<()> {
            self.0.extend_from_slice(data);
            Ok(())
        }

        fn size(&self) -> u64 {
            self.0.len() as u64
        }

        fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }
}
