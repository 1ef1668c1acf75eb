//! Storage backends for [`crate::file::File`].
//!
//! [`Memory`] owns a caller-supplied buffer, [`Physical`] maps a file from disk with `memmap2`.

use std::{fs, path::Path};

use memmap2::Mmap;

use crate::{Error::OutOfBounds, Result};

/// Read access to the raw bytes of an image, independent of where they live.
pub trait Backend: Send + Sync {
    /// Borrow `len` bytes starting at `offset`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the range is not fully inside the data.
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let data = self.data();
        match offset.checked_add(len) {
            Some(end) if end <= data.len() => Ok(&data[offset..end]),
            _ => Err(OutOfBounds),
        }
    }

    /// The complete data
    fn data(&self) -> &[u8];

    /// Total length in bytes
    fn len(&self) -> usize {
        self.data().len()
    }
}

/// An image held in an owned buffer.
#[derive(Debug)]
pub struct Memory {
    data: Vec<u8>,
}

impl Memory {
    /// Take ownership of `data`
    pub fn new(data: Vec<u8>) -> Memory {
        Memory { data }
    }
}

impl Backend for Memory {
    fn data(&self) -> &[u8] {
        self.data.as_slice()
    }
}

/// An image memory-mapped from disk.
#[derive(Debug)]
pub struct Physical {
    data: Mmap,
}

impl Physical {
    /// Map the file at `path` read-only
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file can not be opened or mapped.
    pub fn new(path: impl AsRef<Path>) -> Result<Physical> {
        let file = fs::File::open(path)?;

        // The mapping is read-only and lives as long as this backend.
        let data = unsafe { Mmap::map(&file) }?;

        Ok(Physical { data })
    }
}

impl Backend for Physical {
    fn data(&self) -> &[u8] {
        self.data.as_ref()
    }
}
