//! File system abstraction used by the column store.

use crate::error::{FlatJsonError, Result};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Append-only output file
pub trait WritableFile: Send {
    fn append(&mut self, data: &[u8]) -> Result<()>;

    /// Bytes written so far
    fn size(&self) -> u64;

    /// Flush and publish the file. Nothing may be appended afterwards.
    fn close(&mut self) -> Result<()>;
}

/// Positional reads over an immutable file
pub trait RandomAccessFile: Send + Sync {
    fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>>;

    fn size(&self) -> Result<u64>;
}

pub trait FileSystem: Send + Sync {
    fn create_dir(&self, path: &Path) -> Result<()>;

    fn new_writable_file(&self, path: &Path) -> Result<Box<dyn WritableFile>>;

    fn new_random_access_file(&self, path: &Path) -> Result<Arc<dyn RandomAccessFile>>;

    fn exists(&self, path: &Path) -> bool;
}

fn out_of_range(offset: u64, len: usize, size: u64) -> FlatJsonError {
    FlatJsonError::Io(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("read of {} bytes at {} past end of file ({} bytes)", len, offset, size),
    ))
}

/// Files kept in memory. Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryFileSystem {
    files: Arc<RwLock<HashMap<PathBuf, Arc<Vec<u8>>>>>,
    dirs: Arc<RwLock<HashSet<PathBuf>>>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        MemoryFileSystem::default()
    }
}

impl FileSystem for MemoryFileSystem {
    fn create_dir(&self, path: &Path) -> Result<()> {
        self.dirs.write().insert(path.to_path_buf());
        Ok(())
    }

    fn new_writable_file(&self, path: &Path) -> Result<Box<dyn WritableFile>> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !self.dirs.read().contains(parent) {
                return Err(FlatJsonError::NotFound(parent.display().to_string()));
            }
        }
        Ok(Box::new(MemoryWritableFile {
            path: path.to_path_buf(),
            buf: Vec::new(),
            files: Arc::clone(&self.files),
            closed: false,
        }))
    }

    fn new_random_access_file(&self, path: &Path) -> Result<Arc<dyn RandomAccessFile>> {
        let data = self
            .files
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| FlatJsonError::NotFound(path.display().to_string()))?;
        Ok(Arc::new(MemoryRandomAccessFile { data }))
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.read().contains_key(path) || self.dirs.read().contains(path)
    }
}

struct MemoryWritableFile {
    path: PathBuf,
    buf: Vec<u8>,
    files: Arc<RwLock<HashMap<PathBuf, Arc<Vec<u8>>>>>,
    closed: bool,
}

impl WritableFile for MemoryWritableFile {
    fn append(&mut self, data: &[u8]) -> Result<()> {
        if self.closed {
            return Err(FlatJsonError::invalid_argument(format!(
                "append to closed file {}",
                self.path.display()
            )));
        }
        self.buf.extend_from_slice(data);
        Ok(())
    }

    fn size(&self) -> u64 {
        self.buf.len() as u64
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            let data = std::mem::take(&mut self.buf);
            self.files.write().insert(self.path.clone(), Arc::new(data));
        }
        Ok(())
    }
}

/// Read handle over an in-memory file
#[derive(Debug, Clone)]
pub struct MemoryRandomAccessFile {
    data: Arc<Vec<u8>>,
}

impl MemoryRandomAccessFile {
    pub fn new(data: Vec<u8>) -> Self {
        MemoryRandomAccessFile {
            data: Arc::new(data),
        }
    }
}

impl RandomAccessFile for MemoryRandomAccessFile {
    fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let size = self.data.len() as u64;
        let end = offset
            .checked_add(len as u64)
            .filter(|&end| end <= size)
            .ok_or_else(|| out_of_range(offset, len, size))?;
        Ok(self.data[offset as usize..end as usize].to_vec())
    }

    fn size(&self) -> Result<u64> {
        Ok(self.data.len() as u64)
    }
}

/// The local disk
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl FileSystem for LocalFileSystem {
    fn create_dir(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path)?;
        Ok(())
    }

    fn new_writable_file(&self, path: &Path) -> Result<Box<dyn WritableFile>> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => FlatJsonError::NotFound(path.display().to_string()),
                _ => FlatJsonError::Io(e),
            })?;
        Ok(Box::new(LocalWritableFile {
            writer: Some(BufWriter::new(file)),
            size: 0,
        }))
    }

    fn new_random_access_file(&self, path: &Path) -> Result<Arc<dyn RandomAccessFile>> {
        let file = File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => FlatJsonError::NotFound(path.display().to_string()),
            _ => FlatJsonError::Io(e),
        })?;
        let size = file.metadata()?.len();
        Ok(Arc::new(LocalRandomAccessFile {
            file: Mutex::new(file),
            size,
        }))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

struct LocalWritableFile {
    writer: Option<BufWriter<File>>,
    size: u64,
}

impl WritableFile for LocalWritableFile {
    fn append(&mut self, data: &[u8]) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| FlatJsonError::invalid_argument("append to closed file"))?;
        writer.write_all(data)?;
        self.size += data.len() as u64;
        Ok(())
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn close(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            let file = writer.into_inner().map_err(|e| FlatJsonError::Io(e.into_error()))?;
            file.sync_all()?;
        }
        Ok(())
    }
}

struct LocalRandomAccessFile {
    file: Mutex<File>,
    size: u64,
}

impl RandomAccessFile for LocalRandomAccessFile {
    fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        if offset.checked_add(len as u64).map_or(true, |end| end > self.size) {
            return Err(out_of_range(offset, len, self.size));
        }
        let mut buf = vec![0u8; len];
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn size(&self) -> Result<u64> {
        Ok(self.size)
    }
}
