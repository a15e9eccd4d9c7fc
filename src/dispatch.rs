//! Top-K search over a named dataset, returning URIs.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::dataset::DatasetRegistry;
use crate::error::Result;

/// Summary of one served dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub name: String,
    pub size: usize,
    pub dimensions: usize,
}

#[derive(Clone)]
pub struct SearchDispatcher {
    registry: Arc<DatasetRegistry>,
}

impl SearchDispatcher {
    pub fn new(registry: Arc<DatasetRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &DatasetRegistry {
        &self.registry
    }

    /// URIs of the `count` images closest to `embedding`, nearest first.
    ///
    /// Labels without a URI are skipped, so the result can be shorter than
    /// `count`; it is never padded.
    pub fn search(&self, dataset: &str, embedding: &[f32], count: usize) -> Result<Vec<String>> {
        let dataset_ref = self.registry.get(dataset)?;
        let hits = dataset_ref.search(embedding, count)?;

        let mut uris = Vec::with_capacity(hits.len());
        for (label, _) in hits {
            match dataset_ref.uri(label) {
                Some(uri) => uris.push(uri.to_string()),
                None => tracing::debug!("Dropping unmapped label {} in {:?}", label, dataset),
            }
        }
        Ok(uris)
    }

    pub fn size(&self, dataset: &str) -> Result<usize> {
        Ok(self.registry.get(dataset)?.len())
    }

    pub fn dimensions(&self, dataset: &str) -> Result<usize> {
        Ok(self.registry.get(dataset)?.dimensions())
    }

    pub fn datasets(&self) -> Vec<DatasetInfo> {
        self.registry
            .iter()
            .map(|(name, dataset)| DatasetInfo {
                name: name.to_string(),
                size: dataset.len(),
                dimensions: dataset.dimensions(),
            })
            .collect()
    }
}
