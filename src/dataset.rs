//! Named datasets: embedding matrix, ANN index and URI list.
//!
//! A dataset directory holds three files:
//!
//! ```text
//! images.fbin     N x D f32 matrix, row i is the embedding of image i
//! images.usearch  cosine usearch index, key i is row i
//! images.txt      N URIs, one per line, line i belongs to key i
//! ```
//!
//! Datasets are opened once at startup and never mutated afterwards.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use image_search_core::{ImageIndex, MatrixWriter, VectorStore};

pub use image_search_core::BuildOptions;

use crate::config::DEFAULT_EF_SEARCH;
use crate::error::{Error, Result};

pub const MATRIX_FILE: &str = "images.fbin";
pub const INDEX_FILE: &str = "images.usearch";
pub const URIS_FILE: &str = "images.txt";

pub struct Dataset {
    index: ImageIndex,
    uris: Vec<String>,
    vectors: VectorStore,
}

impl Dataset {
    /// Number of indexed images
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn dimensions(&self) -> usize {
        self.index.dimensions()
    }

    pub fn uris(&self) -> &[String] {
        &self.uris
    }

    pub fn uri(&self, label: usize) -> Option<&str> {
        self.uris.get(label).map(String::as_str)
    }

    pub fn vectors(&self) -> &VectorStore {
        &self.vectors
    }

    pub fn index(&self) -> &ImageIndex {
        &self.index
    }

    /// Top-`k` labels closest to `vector`, closest first.
    ///
    /// `k` is capped at the dataset size; a short answer from the index is
    /// returned as is.
    pub fn search(&self, vector: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        if vector.len() != self.dimensions() {
            return Err(Error::DimensionMismatch {
                expected: self.dimensions(),
                actual: vector.len(),
            });
        }
        let k = k.min(self.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        let hits = self.index.search(vector, k)?;
        if hits.len() < k {
            tracing::debug!("Index returned {} of {} requested hits", hits.len(), k);
        }
        Ok(hits
            .into_iter()
            .map(|(key, distance)| (key as usize, distance))
            .collect())
    }
}

/// Open the dataset stored in `dir` with the default search expansion.
pub fn open_dataset(dir: &Path) -> Result<Dataset> {
    open_dataset_with(dir, DEFAULT_EF_SEARCH)
}

/// Open the dataset stored in `dir`, searching with `ef_search`.
pub fn open_dataset_with(dir: &Path, ef_search: usize) -> Result<Dataset> {
    let matrix_path = dir.join(MATRIX_FILE);
    let index_path = dir.join(INDEX_FILE);
    let uris_path = dir.join(URIS_FILE);
    for path in [&matrix_path, &index_path, &uris_path] {
        if !path.exists() {
            return Err(Error::NotFound(path.clone()));
        }
    }

    let vectors = VectorStore::open(&matrix_path)?;
    let index = ImageIndex::view(&index_path, vectors.dim, ef_search)?;
    if index.dimensions() != vectors.dim {
        return Err(Error::DimensionMismatch {
            expected: vectors.dim,
            actual: index.dimensions(),
        });
    }

    let uris = read_uris(&uris_path)?;
    if uris.len() != vectors.count || index.len() != vectors.count {
        return Err(Error::LengthMismatch {
            dataset: dir.to_path_buf(),
            uris: uris.len(),
            rows: vectors.count,
            indexed: index.len(),
        });
    }

    Ok(Dataset { index, uris, vectors })
}

fn read_uris(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path)?;
    Ok(text
        .lines()
        .map(|line| line.trim_end_matches('\r').to_string())
        .collect())
}

/// Write `vectors` as an `.fbin` matrix. Returns the row count.
pub fn write_matrix(path: &Path, vectors: &[Vec<f32>]) -> Result<usize> {
    let dim = match vectors.first() {
        Some(first) if !first.is_empty() => first.len(),
        _ => return Err(Error::InvalidParams("no vectors to write".into())),
    };

    let mut writer = MatrixWriter::new(path, dim)?;
    for vector in vectors {
        writer.write_vector(vector)?;
    }
    Ok(writer.finish()? as usize)
}

pub fn write_uris(path: &Path, uris: &[String]) -> Result<()> {
    if let Some(bad) = uris.iter().find(|uri| uri.contains('\n')) {
        return Err(Error::InvalidParams(format!("URI contains a newline: {:?}", bad)));
    }
    let mut text = uris.join("\n");
    text.push('\n');
    fs::write(path, text)?;
    Ok(())
}

/// Index every row of `matrix_path` and save the result to `index_path`.
/// Returns the number of indexed rows.
pub fn build_index(matrix_path: &Path, index_path: &Path, build: BuildOptions) -> Result<usize> {
    let vectors = VectorStore::open(matrix_path)?;

    tracing::info!(
        "Building cosine index over {} vectors (dim {}, M {}, ef_construction {})",
        vectors.count,
        vectors.dim,
        build.connectivity,
        build.expansion_add
    );
    let total = vectors.count;
    let progress_interval = (total / 100).max(1);
    let index = ImageIndex::build(vectors.dim, vectors.iter(), build, |done| {
        if done % progress_interval == 0 {
            let pct = (done as f64 / total as f64) * 100.0;
            tracing::info!("Building index: {:.0}% ({}/{})", pct, done, total);
        }
    })?;

    tracing::info!("Saving index to {:?}", index_path);
    index.save(index_path)?;
    Ok(index.len())
}

/// Write all three dataset files into `dir`.
pub fn create_dataset(dir: &Path, vectors: &[Vec<f32>], uris: &[String], build: BuildOptions) -> Result<()> {
    if vectors.len() != uris.len() {
        return Err(Error::LengthMismatch {
            dataset: dir.to_path_buf(),
            uris: uris.len(),
            rows: vectors.len(),
            indexed: 0,
        });
    }

    fs::create_dir_all(dir)?;
    write_matrix(&dir.join(MATRIX_FILE), vectors)?;
    write_uris(&dir.join(URIS_FILE), uris)?;
    build_index(&dir.join(MATRIX_FILE), &dir.join(INDEX_FILE), build)?;
    Ok(())
}

/// Immutable `name -> Dataset` map built once at startup.
#[derive(Default)]
pub struct DatasetRegistry {
    datasets: BTreeMap<String, Dataset>,
}

impl DatasetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open every `(name, dir)` pair; the first failure aborts.
    pub fn open<I>(dirs: I, ef_search: usize) -> Result<Self>
    where
        I: IntoIterator<Item = (String, PathBuf)>,
    {
        let mut registry = Self::new();
        for (name, dir) in dirs {
            tracing::info!("Opening dataset {:?} from {:?}", name, dir);
            let dataset = open_dataset_with(&dir, ef_search)?;
            tracing::info!(
                "Dataset {:?}: {} images, {} dimensions",
                name,
                dataset.len(),
                dataset.dimensions()
            );
            registry.insert(name, dataset);
        }
        Ok(registry)
    }

    pub fn insert(&mut self, name: impl Into<String>, dataset: Dataset) {
        self.datasets.insert(name.into(), dataset);
    }

    pub fn get(&self, name: &str) -> Result<&Dataset> {
        self.datasets
            .get(name)
            .ok_or_else(|| Error::UnknownDataset(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.datasets.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Dataset)> {
        self.datasets.iter().map(|(name, dataset)| (name.as_str(), dataset))
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}
