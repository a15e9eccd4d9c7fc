//! Cosine ANN index over matrix rows, persisted as `images.usearch`.
//!
//! Keys are row numbers of the `.fbin` matrix the index was built from, so a
//! hit maps straight back to a row (and to line `key` of the URI list).
//!
//! Serving opens the file with [`ImageIndex::view`], which memory-maps it
//! instead of copying the graph into RAM.

use std::path::{Path, PathBuf};

use thiserror::Error;
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("usearch {op} failed: {message}")]
    Usearch { op: &'static str, message: String },

    #[error("Index path is not valid UTF-8: {0:?}")]
    Path(PathBuf),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl IndexError {
    fn usearch(op: &'static str, err: impl std::fmt::Display) -> Self {
        IndexError::Usearch {
            op,
            message: err.to_string(),
        }
    }
}

fn path_str(path: &Path) -> Result<&str, IndexError> {
    path.to_str().ok_or_else(|| IndexError::Path(path.to_path_buf()))
}

/// Graph parameters used when building an index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildOptions {
    /// M: neighbors per node
    pub connectivity: usize,
    /// ef_construction
    pub expansion_add: usize,
    /// ef used by searches on the built index
    pub expansion_search: usize,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            connectivity: 16,
            expansion_add: 128,
            expansion_search: 64,
        }
    }
}

pub struct ImageIndex {
    inner: Index,
}

impl ImageIndex {
    fn with_options(dimensions: usize, build: BuildOptions) -> Result<Self, IndexError> {
        let options = IndexOptions {
            dimensions,
            metric: MetricKind::Cos,
            quantization: ScalarKind::F32,
            connectivity: build.connectivity,
            expansion_add: build.expansion_add,
            expansion_search: build.expansion_search,
            ..Default::default()
        };
        let inner = Index::new(&options).map_err(|e| IndexError::usearch("create", e))?;
        Ok(Self { inner })
    }

    /// Memory-map a saved index. Dimensions and graph shape come from the file.
    pub fn view(path: &Path, dimensions: usize, expansion_search: usize) -> Result<Self, IndexError> {
        let index = Self::with_options(
            dimensions,
            BuildOptions {
                expansion_search,
                ..BuildOptions::default()
            },
        )?;
        index
            .inner
            .view(path_str(path)?)
            .map_err(|e| IndexError::usearch("view", e))?;
        index.inner.change_expansion_search(expansion_search.max(1));

        tracing::debug!(
            "Viewing index {:?}: {} vectors, {} dimensions, M {}",
            path,
            index.len(),
            index.dimensions(),
            index.inner.connectivity()
        );
        Ok(index)
    }

    /// Build an index over `rows`, keyed by position.
    ///
    /// `progress` is called with the number of rows added so far.
    pub fn build<'a, I>(
        dimensions: usize,
        rows: I,
        build: BuildOptions,
        mut progress: impl FnMut(usize),
    ) -> Result<Self, IndexError>
    where
        I: ExactSizeIterator<Item = &'a [f32]>,
    {
        let index = Self::with_options(dimensions, build)?;
        index
            .inner
            .reserve(rows.len())
            .map_err(|e| IndexError::usearch("reserve", e))?;

        for (key, row) in rows.enumerate() {
            if row.len() != dimensions {
                return Err(IndexError::DimensionMismatch {
                    expected: dimensions,
                    actual: row.len(),
                });
            }
            index
                .inner
                .add(key as u64, row)
                .map_err(|e| IndexError::usearch("add", e))?;
            progress(key + 1);
        }
        Ok(index)
    }

    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        self.inner
            .save(path_str(path)?)
            .map_err(|e| IndexError::usearch("save", e))
    }

    /// Number of indexed vectors
    pub fn len(&self) -> usize {
        self.inner.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    pub fn connectivity(&self) -> usize {
        self.inner.connectivity()
    }

    pub fn memory_usage(&self) -> usize {
        self.inner.memory_usage()
    }

    /// Up to `k` `(key, distance)` pairs, closest first. Cosine distance is
    /// `1 - similarity`.
    ///
    /// `k` is capped at the index size before anything is allocated.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(u64, f32)>, IndexError> {
        if query.len() != self.dimensions() {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions(),
                actual: query.len(),
            });
        }
        let k = k.min(self.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        let matches = self
            .inner
            .search(query, k)
            .map_err(|e| IndexError::usearch("search", e))?;
        Ok(matches.keys.into_iter().zip(matches.distances).collect())
    }
}
