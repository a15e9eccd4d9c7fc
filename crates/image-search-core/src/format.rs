//! .fbin Matrix File Format
//!
//! # File Structure
//!
//! ```text
//! Offset   Size    Type        Description
//! ─────────────────────────────────────────────
//! 0x00     4       u32 LE      N: Number of rows (vectors)
//! 0x04     4       u32 LE      D: Columns (dimensions)
//! 0x08     N*D*4   [f32]       Row-major vector data (Little Endian)
//! ```
//!
//! This is the layout used by the big-ann-benchmarks tooling, so matrices
//! exported by common embedding pipelines open without conversion.
//!
//! # Example
//!
//! ```ignore
//! let mut writer = MatrixWriter::new("images.fbin", 256)?;
//! writer.write_vector(&vec![0.1f32; 256])?;
//! writer.finish()?;
//! ```

use std::fs::File;
use std::io::{self, BufWriter, Seek, Write};
use std::path::Path;

use thiserror::Error;

/// Header size in bytes: 4 (rows) + 4 (columns)
pub const HEADER_SIZE: usize = 8;

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("Matrix declares {rows} rows with zero columns")]
    ZeroColumns { rows: u32 },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("File truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Parsed .fbin header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatrixHeader {
    pub rows: u32,
    pub cols: u32,
}

impl MatrixHeader {
    /// Parse header from the first 8 bytes of a file
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FormatError> {
        if bytes.len() < HEADER_SIZE {
            return Err(FormatError::Truncated {
                expected: HEADER_SIZE,
                actual: bytes.len(),
            });
        }

        let rows = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let cols = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);

        if rows > 0 && cols == 0 {
            return Err(FormatError::ZeroColumns { rows });
        }

        Ok(Self { rows, cols })
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.rows.to_le_bytes());
        buf[4..8].copy_from_slice(&self.cols.to_le_bytes());
        buf
    }

    /// Byte offset of row `index`
    #[inline(always)]
    pub fn offset(&self, index: usize) -> usize {
        HEADER_SIZE + index * self.cols as usize * std::mem::size_of::<f32>()
    }

    /// Total file size implied by the header
    pub fn file_size(&self) -> usize {
        self.offset(self.rows as usize)
    }
}

/// Streaming writer for .fbin files
pub struct MatrixWriter {
    writer: BufWriter<File>,
    cols: usize,
    rows: u32,
}

impl MatrixWriter {
    pub fn new<P: AsRef<Path>>(path: P, cols: usize) -> Result<Self, FormatError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        // row count is patched in finish()
        let header = MatrixHeader {
            rows: 0,
            cols: cols as u32,
        };
        writer.write_all(&header.to_bytes())?;

        Ok(Self {
            writer,
            cols,
            rows: 0,
        })
    }

    pub fn write_vector(&mut self, vector: &[f32]) -> Result<(), FormatError> {
        if vector.len() != self.cols {
            return Err(FormatError::DimensionMismatch {
                expected: self.cols,
                actual: vector.len(),
            });
        }

        for &val in vector {
            self.writer.write_all(&val.to_le_bytes())?;
        }

        self.rows += 1;
        Ok(())
    }

    /// Finalize the file and return the number of rows written
    pub fn finish(mut self) -> Result<u32, FormatError> {
        self.writer.flush()?;

        let file = self.writer.get_mut();
        file.seek(io::SeekFrom::Start(0))?;
        file.write_all(&self.rows.to_le_bytes())?;
        file.sync_all()?;

        Ok(self.rows)
    }
}
