use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;

use crate::primitives::io::{FileIo, StdFileIo};
use crate::types::{page::MIN_PAGE_SIZE, IndexError, PageId, Result};

/// Fetches raw page bytes by page id.
///
/// Implementations must be safe to call from several threads at once; the
/// pages of an index never change after it is written.
pub trait PageSource: Send + Sync + 'static {
    /// Returns the bytes of page `id`.
    fn read_page(&self, id: PageId) -> Result<Bytes>;

    /// Number of pages available, when the source knows it.
    fn page_count(&self) -> Option<u64> {
        None
    }
}

/// Pages held in memory.
#[derive(Clone, Debug, Default)]
pub struct MemPageSource {
    pages: Arc<Vec<Bytes>>,
}

impl MemPageSource {
    /// Wraps an already encoded list of pages, page 0 first.
    pub fn new(pages: Vec<Bytes>) -> Self {
        Self {
            pages: Arc::new(pages),
        }
    }

    /// The stored pages.
    pub fn pages(&self) -> &[Bytes] {
        &self.pages
    }
}

impl PageSource for MemPageSource {
    fn read_page(&self, id: PageId) -> Result<Bytes> {
        usize::try_from(id.0)
            .ok()
            .and_then(|idx| self.pages.get(idx))
            .cloned()
            .ok_or(IndexError::PageOutOfRange(id))
    }

    fn page_count(&self) -> Option<u64> {
        Some(self.pages.len() as u64)
    }
}

/// Pages stored back to back in fixed-size slots of a single file.
#[derive(Clone)]
pub struct FilePageSource {
    io: Arc<dyn FileIo>,
    page_size: u32,
    page_count: u64,
}

impl FilePageSource {
    /// Opens `path`, which must hold a whole number of `page_size` slots.
    pub fn open(path: impl AsRef<Path>, page_size: u32) -> Result<Self> {
        let io: Arc<dyn FileIo> = Arc::new(StdFileIo::open_read(path)?);
        Self::with_io(io, page_size)
    }

    /// Uses an existing file handle.
    pub fn with_io(io: Arc<dyn FileIo>, page_size: u32) -> Result<Self> {
        if page_size < MIN_PAGE_SIZE {
            return Err(IndexError::Invalid("page size below minimum"));
        }
        let len = io.len()?;
        if len % page_size as u64 != 0 {
            return Err(IndexError::Corruption(
                "index file length is not a multiple of the page size",
            ));
        }
        Ok(Self {
            io,
            page_size,
            page_count: len / page_size as u64,
        })
    }

    /// Slot size in bytes.
    pub fn page_size(&self) -> u32 {
        self.page_size
    }
}

impl PageSource for FilePageSource {
    fn read_page(&self, id: PageId) -> Result<Bytes> {
        if id.0 >= self.page_count {
            return Err(IndexError::PageOutOfRange(id));
        }
        let mut buf = vec![0u8; self.page_size as usize];
        self.io.read_at(id.0 * self.page_size as u64, &mut buf)?;
        Ok(Bytes::from(buf))
    }

    fn page_count(&self) -> Option<u64> {
        Some(self.page_count)
    }
}
