//! Owned byte buffer and disk access for PE documents.
//!
//! Everything else in this crate is derived from the single contiguous byte buffer holding
//! the file-on-disk image. Unlike a read-only analysis tool, an editor must own its bytes:
//! every structural edit mutates this buffer in place, and every derived structure
//! (wrappers, the address translator) stores offsets into it rather than references.
//!
//! # Key Components
//!
//! - [`crate::file::FileBuffer`] - The owned, growable content buffer with bounds-checked
//!   slicing and range mutation
//! - [`crate::file::io`] - Endian-aware field read/write helpers
//!
//! Disk I/O is deliberately minimal: read the whole file into the buffer, write the whole
//! buffer back out. Loading goes through a memory map that is copied into the owned buffer,
//! so even large inputs are read in one pass without intermediate reallocation.
//!
//! # Examples
//!
//! ```rust,no_run
//! use peforge::file::FileBuffer;
//! use std::path::Path;
//!
//! let buffer = FileBuffer::from_file(Path::new("app.exe"))?;
//! assert_eq!(buffer.data_slice(0, 2)?, b"MZ");
//! # Ok::<(), peforge::Error>(())
//! ```

pub mod io;

use std::{fs::OpenOptions, path::Path};

use memmap2::Mmap;

use crate::{Error::Empty, Result};

/// The owned content buffer of a PE document.
///
/// Holds the complete file image as a single contiguous `Vec<u8>`. All offsets handed out
/// by wrappers and the address translator index into this buffer, and all of them are
/// bounds-checked on access. The buffer's length *is* the document's current content size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBuffer {
    data: Vec<u8>,
}

impl FileBuffer {
    /// Loads the entire file at `path` into an owned buffer.
    ///
    /// The file is memory-mapped and copied in one pass. The mapping is dropped as soon
    /// as the copy completes, so the document never depends on the file staying in place.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or mapped, or if it is empty.
    pub fn from_file(path: &Path) -> Result<FileBuffer> {
        let file = OpenOptions::new().read(true).open(path)?;

        // Safety: the mapping lives only for the duration of the copy below.
        let mmap = unsafe { Mmap::map(&file)? };
        if mmap.is_empty() {
            return Err(Empty);
        }

        Ok(FileBuffer {
            data: mmap.to_vec(),
        })
    }

    /// Wraps an in-memory image in a buffer.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Empty`] if `data` holds no bytes.
    pub fn from_mem(data: Vec<u8>) -> Result<FileBuffer> {
        if data.is_empty() {
            return Err(Empty);
        }

        Ok(FileBuffer { data })
    }

    /// Writes the complete buffer to `path`, replacing any existing file.
    ///
    /// # Errors
    ///
    /// Surfaces I/O failures (disk full, permissions) to the caller; never retried.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        std::fs::write(path, &self.data)?;
        Ok(())
    }

    /// Returns the current content size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the buffer holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the complete content as a slice.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns a bounds-checked slice of the content.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] if `offset + len` exceeds the buffer.
    pub fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let Some(end) = offset.checked_add(len) else {
            return Err(out_of_bounds_error!());
        };
        if end > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        Ok(&self.data[offset..end])
    }

    /// Returns a bounds-checked mutable slice of the content.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] if `offset + len` exceeds the buffer.
    pub fn data_slice_mut(&mut self, offset: usize, len: usize) -> Result<&mut [u8]> {
        let Some(end) = offset.checked_add(len) else {
            return Err(out_of_bounds_error!());
        };
        if end > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        Ok(&mut self.data[offset..end])
    }

    /// Returns the backing vector for whole-buffer operations (resize + patch replay).
    pub(crate) fn data_mut(&mut self) -> &mut Vec<u8> {
        &mut self.data
    }

    /// Grows or shrinks the buffer to `new_size`, zero-filling any added tail.
    pub fn resize(&mut self, new_size: usize) {
        self.data.resize(new_size, 0);
    }

    /// Appends raw bytes at the end of the buffer.
    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_mem_rejects_empty() {
        assert!(matches!(FileBuffer::from_mem(Vec::new()), Err(Empty)));
    }

    #[test]
    fn slice_bounds() {
        let buffer = FileBuffer::from_mem(vec![1, 2, 3, 4]).unwrap();
        assert_eq!(buffer.data_slice(1, 2).unwrap(), &[2, 3]);
        assert!(buffer.data_slice(3, 2).is_err());
        assert!(buffer.data_slice(usize::MAX, 2).is_err());
    }

    #[test]
    fn resize_zero_fills() {
        let mut buffer = FileBuffer::from_mem(vec![0xFF; 4]).unwrap();
        buffer.resize(8);
        assert_eq!(buffer.data_slice(4, 4).unwrap(), &[0, 0, 0, 0]);
        buffer.resize(2);
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn disk_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roundtrip.bin");

        let buffer = FileBuffer::from_mem(vec![0x4D, 0x5A, 0x90, 0x00]).unwrap();
        buffer.save_to(&path).unwrap();

        let loaded = FileBuffer::from_file(&path).unwrap();
        assert_eq!(loaded.data(), buffer.data());
    }
}
