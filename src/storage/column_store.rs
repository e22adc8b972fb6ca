//! Typed sub-column persistence: cutting sub-columns into pages on write,
//! and locating and decoding pages by row ordinal on read.

use crate::column::ColumnData;
use crate::config::Compression;
use crate::error::{FlatJsonError, Result};
use crate::storage::fs::{RandomAccessFile, WritableFile};
use crate::storage::meta::{PagePointer, SubColumnMeta};
use crate::storage::page::{decode_page, encode_page, speculate_encoding};
use tracing::debug;

/// A contiguous byte range of the column file
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ByteRange {
    pub offset: u64,
    pub len: u64,
}

impl ByteRange {
    pub fn end(&self) -> u64 {
        self.offset + self.len
    }
}

/// Sort ranges and merge the ones that touch or overlap
pub fn merge_ranges(mut ranges: Vec<ByteRange>) -> Vec<ByteRange> {
    ranges.sort();
    let mut merged: Vec<ByteRange> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match merged.last_mut() {
            Some(last) if range.offset <= last.end() => {
                last.len = last.len.max(range.end() - last.offset);
            }
            _ => merged.push(range),
        }
    }
    merged
}

/// I/O counters of one reader
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStatistics {
    pub bytes_read: u64,
    pub pages_read: u64,
    pub rows_read: u64,
}

/// Persist one sub-column as pages of at most `page_rows` rows
pub fn write_sub_column(
    file: &mut dyn WritableFile,
    name: &str,
    data: &ColumnData,
    page_rows: usize,
    compression: Compression,
) -> Result<SubColumnMeta> {
    let encoding = speculate_encoding(data);
    let mut pages = Vec::new();
    let mut start = 0;
    while start < data.len() {
        let rows = page_rows.min(data.len() - start);
        let bytes = encode_page(&data.slice(start, rows), encoding, compression)?;
        let offset = file.size();
        file.append(&bytes)?;
        pages.push(PagePointer {
            first_row: start as u64,
            num_rows: rows as u64,
            offset,
            size: bytes.len() as u64,
        });
        start += rows;
    }

    debug!(
        sub_column = name,
        logical_type = %data.logical_type(),
        encoding = ?encoding,
        pages = pages.len(),
        rows = data.len(),
        "wrote sub-column"
    );

    Ok(SubColumnMeta {
        name: name.to_string(),
        logical_type: data.logical_type(),
        encoding,
        num_rows: data.len() as u64,
        pages,
    })
}

/// Reads row ranges of one persisted sub-column, caching the last page
#[derive(Debug)]
pub struct SubColumnReader {
    meta: SubColumnMeta,
    compression: Compression,
    cached: Option<(usize, ColumnData)>,
}

impl SubColumnReader {
    pub fn new(meta: SubColumnMeta, compression: Compression) -> Self {
        SubColumnReader {
            meta,
            compression,
            cached: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    /// Index range of the pages overlapping `[first_row, first_row + num_rows)`
    fn page_span(&self, first_row: u64, num_rows: u64) -> std::ops::Range<usize> {
        let end_row = first_row + num_rows;
        let pages = &self.meta.pages;
        let start = pages.partition_point(|p| p.first_row + p.num_rows <= first_row);
        let end = pages.partition_point(|p| p.first_row < end_row);
        start..end.max(start)
    }

    pub fn io_ranges(&self, first_row: u64, num_rows: u64) -> Vec<ByteRange> {
        self.meta.pages[self.page_span(first_row, num_rows)]
            .iter()
            .map(|p| ByteRange {
                offset: p.offset,
                len: p.size,
            })
            .collect()
    }

    pub fn read(
        &mut self,
        file: &dyn RandomAccessFile,
        first_row: u64,
        num_rows: u64,
        stats: &mut ReaderStatistics,
    ) -> Result<ColumnData> {
        let mut out = ColumnData::with_capacity(self.meta.logical_type, num_rows as usize);
        if num_rows == 0 {
            return Ok(out);
        }
        let end_row = first_row + num_rows;
        if end_row > self.meta.num_rows {
            return Err(FlatJsonError::invalid_argument(format!(
                "rows {}..{} beyond {} rows of {}",
                first_row, end_row, self.meta.num_rows, self.meta.name
            )));
        }

        for idx in self.page_span(first_row, num_rows) {
            let page = self.meta.pages[idx];
            self.load_page(file, idx, stats)?;
            let Some((_, data)) = &self.cached else {
                continue;
            };
            let start = first_row.max(page.first_row) - page.first_row;
            let end = end_row.min(page.first_row + page.num_rows) - page.first_row;
            out.extend_from(data.slice(start as usize, (end - start) as usize));
        }
        Ok(out)
    }

    fn load_page(&mut self, file: &dyn RandomAccessFile, idx: usize, stats: &mut ReaderStatistics) -> Result<()> {
        if matches!(&self.cached, Some((cached, _)) if *cached == idx) {
            return Ok(());
        }
        let page = self.meta.pages[idx];
        let bytes = file.read_at(page.offset, page.size as usize)?;
        stats.bytes_read += page.size;
        stats.pages_read += 1;

        let data = decode_page(&bytes, self.meta.logical_type, self.compression)?;
        if data.len() as u64 != page.num_rows {
            return Err(FlatJsonError::corruption(format!(
                "page {} of {} holds {} rows, index says {}",
                idx,
                self.meta.name,
                data.len(),
                page.num_rows
            )));
        }
        self.cached = Some((idx, data));
        Ok(())
    }
}
