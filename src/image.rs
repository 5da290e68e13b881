//! Image access - seek + bounded reads against rescued image files
//!
//! Images are static files written by the rescue tool. They are only ever
//! opened for reading, and a read that comes back short is treated as a
//! truncated or corrupt image rather than something to retry.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::{RescueError, Result};

/// CD-ROM sector size; block numbers in logs and catalogs count these
pub const BLOCK_SIZE: usize = 2048;

/// Default chunk buffer size, in blocks (2 MiB)
pub const DEFAULT_BUFFER_BLOCKS: usize = 1024;

/// A named, seekable byte source holding one rescued image
pub struct ImageSource<R> {
    label: String,
    inner: R,
}

impl ImageSource<File> {
    /// Open an image file read-only
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| RescueError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "Opened image");
        Ok(Self::new(path.display().to_string(), file))
    }
}

impl<R: Read + Seek> ImageSource<R> {
    pub fn new(label: impl Into<String>, inner: R) -> Self {
        Self {
            label: label.into(),
            inner,
        }
    }

    /// Name used in error messages
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Fill `buf` with the bytes starting at `address`.
    ///
    /// Fails with [`RescueError::ShortRead`] if the image ends before `buf`
    /// is full.
    pub fn read_at(&mut self, address: u64, buf: &mut [u8]) -> Result<()> {
        self.inner
            .seek(SeekFrom::Start(address))
            .map_err(|source| RescueError::Seek {
                image: self.label.clone(),
                address,
                source,
            })?;

        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(RescueError::Io(e)),
            }
        }

        if filled != buf.len() {
            return Err(RescueError::ShortRead {
                image: self.label.clone(),
                address,
                wanted: buf.len(),
                got: filled,
            });
        }
        Ok(())
    }
}

/// The pair of chunk buffers shared by compare, extract and scan.
///
/// Allocated once per run; every operation borrows what it needs.
pub struct Buffers {
    pub primary: Vec<u8>,
    pub secondary: Vec<u8>,
}

impl Buffers {
    /// Allocate two buffers of `blocks` blocks each (at least one block)
    pub fn new(blocks: usize) -> Self {
        let size = blocks.max(1) * BLOCK_SIZE;
        Self {
            primary: vec![0u8; size],
            secondary: vec![0u8; size],
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.primary.len()
    }
}

impl Default for Buffers {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_BLOCKS)
    }
}
