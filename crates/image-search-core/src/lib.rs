//! Image Search Core – embedding matrices, the cosine ANN index and the
//! ASCII vector codec
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              ImageIndex (usearch, images.usearch)           │
//! │                 keys = matrix row numbers                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │             VectorStore (mmap zero-copy .fbin)              │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod ascii;
pub mod format;
pub mod index;
pub mod store;

pub use ascii::{ascii_to_vector, vector_to_ascii, AsciiError};
pub use format::{FormatError, MatrixHeader, MatrixWriter};
pub use index::{BuildOptions, ImageIndex, IndexError};
pub use store::{StoreError, VectorStore};
