//! Generic column storage: file system, page codec, ordinal index and
//! persisted metadata. Nothing here knows about flattening.

pub mod column_store;
pub mod fs;
pub mod meta;
pub mod page;

pub use column_store::{merge_ranges, write_sub_column, ByteRange, ReaderStatistics, SubColumnReader};
pub use fs::{FileSystem, LocalFileSystem, MemoryFileSystem, MemoryRandomAccessFile, RandomAccessFile, WritableFile};
pub use meta::{ColumnMeta, JsonMeta, PagePointer, SubColumnMeta};
pub use page::{speculate_encoding, Encoding};
