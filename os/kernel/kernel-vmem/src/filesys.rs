//! # Executable File Access
//!
//! The memory manager only ever needs to open a file by name and read bytes
//! at an offset; the fault handler reopens the program by its stored name
//! every time it loads a page from the image.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::sync::Arc;

/// An open file supporting positional reads.
pub trait OpenFile {
    /// Read up to `buf.len()` bytes starting at `offset`.
    ///
    /// Returns the number of bytes read, which is short at end of file.
    fn read_at(&mut self, buf: &mut [u8], offset: usize) -> usize;

    /// File length in bytes.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Opens files by name.
pub trait FileSystem {
    type File: OpenFile;

    /// Open `name`, or `None` if it does not exist.
    fn open(&self, name: &str) -> Option<Self::File>;
}

/// In-memory file system holding immutable files.
#[derive(Debug, Clone, Default)]
pub struct MemFileSystem {
    files: BTreeMap<String, Arc<[u8]>>,
}

impl MemFileSystem {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace `name`.
    pub fn insert(&mut self, name: impl Into<String>, contents: impl Into<Arc<[u8]>>) {
        self.files.insert(name.into(), contents.into());
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.files.remove(name).is_some()
    }
}

impl FileSystem for MemFileSystem {
    type File = MemFile;

    fn open(&self, name: &str) -> Option<MemFile> {
        self.files.get(name).map(|data| MemFile {
            data: Arc::clone(data),
        })
    }
}

/// Open handle to a [`MemFileSystem`] file.
#[derive(Debug, Clone)]
pub struct MemFile {
    data: Arc<[u8]>,
}

impl MemFile {
    #[must_use]
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        Self { data: data.into() }
    }
}

impl OpenFile for MemFile {
    fn read_at(&mut self, buf: &mut [u8], offset: usize) -> usize {
        let Some(available) = self.data.get(offset..) else {
            return 0;
        };
        let n = buf.len().min(available.len());
        buf[..n].copy_from_slice(&available[..n]);
        n
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}
