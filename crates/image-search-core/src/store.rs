//! Memory-mapped vector storage
//!
//! Provides zero-copy access to rows of an `.fbin` matrix through the OS page
//! cache. Large datasets are never fully resident.
//!
//! # Safety
//!
//! Rows are reinterpreted with `bytemuck::try_cast_slice`, which checks f32
//! alignment instead of assuming it.

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;
use thiserror::Error;

use crate::format::{FormatError, MatrixHeader, HEADER_SIZE};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Index out of bounds: {index} >= {count}")]
    IndexOutOfBounds { index: usize, count: usize },

    #[error("Alignment error: byte slice not aligned to f32 (4 bytes)")]
    AlignmentError,
}

/// Read-only, memory-mapped embedding matrix
pub struct VectorStore {
    mmap: Mmap,
    /// Number of rows
    pub count: usize,
    /// Columns per row
    pub dim: usize,
}

impl VectorStore {
    /// Map an `.fbin` file.
    ///
    /// # Safety
    ///
    /// The file must not be truncated or rewritten while mapped; doing so can
    /// raise SIGBUS on access. Dataset files are treated as immutable.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };

        let header = MatrixHeader::from_bytes(&mmap)?;

        let expected = header.file_size();
        if mmap.len() < expected {
            return Err(FormatError::Truncated {
                expected,
                actual: mmap.len(),
            }
            .into());
        }

        Ok(Self {
            mmap,
            count: header.rows as usize,
            dim: header.cols as usize,
        })
    }

    /// Row `index` as a slice into the mapping.
    ///
    /// # Panics
    ///
    /// Panics if the index is out of bounds. Use `try_get` otherwise.
    #[inline]
    pub fn get(&self, index: usize) -> &[f32] {
        match self.try_get(index) {
            Ok(row) => row,
            Err(e) => panic!("vector access failed: {}", e),
        }
    }

    pub fn try_get(&self, index: usize) -> Result<&[f32], StoreError> {
        if index >= self.count {
            return Err(StoreError::IndexOutOfBounds {
                index,
                count: self.count,
            });
        }

        let row_bytes = self.dim * std::mem::size_of::<f32>();
        let start = HEADER_SIZE + index * row_bytes;
        let bytes = &self.mmap[start..start + row_bytes];

        bytemuck::try_cast_slice(bytes).map_err(|_| StoreError::AlignmentError)
    }

    /// Size of the mapped file in bytes
    pub fn memory_bytes(&self) -> usize {
        self.mmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn iter(&self) -> VectorIter<'_> {
        VectorIter {
            store: self,
            index: 0,
        }
    }
}

/// Iterator over rows in the store
pub struct VectorIter<'a> {
    store: &'a VectorStore,
    index: usize,
}

impl<'a> Iterator for VectorIter<'a> {
    type Item = &'a [f32];

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.store.count {
            return None;
        }
        let row = self.store.get(self.index);
        self.index += 1;
        Some(row)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.store.count - self.index;
        (remaining, Some(remaining))
    }
}

impl<'a> ExactSizeIterator for VectorIter<'a> {}
