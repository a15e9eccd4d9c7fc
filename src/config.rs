//! Server configuration assembled from the command line and environment.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Datasets served when none are named explicitly
pub const DEFAULT_DATASETS: &[&str] = &["unsplash25k", "cc3m"];

/// Beam width used for queries when not overridden
pub const DEFAULT_EF_SEARCH: usize = 64;

/// A dataset to open: `name` (resolved under the data root) or `name=path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetSpec {
    pub name: String,
    pub path: Option<PathBuf>,
}

impl DatasetSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
        }
    }

    /// Directory holding the dataset files
    pub fn resolve(&self, data_root: &Path) -> PathBuf {
        match &self.path {
            Some(path) => path.clone(),
            None => data_root.join(&self.name),
        }
    }
}

impl FromStr for DatasetSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, path) = match s.split_once('=') {
            Some((name, path)) => (name.trim(), Some(path.trim())),
            None => (s.trim(), None),
        };

        if name.is_empty() {
            return Err(format!("dataset name missing in {:?}", s));
        }
        match path {
            Some("") => Err(format!("dataset path missing in {:?}", s)),
            Some(path) => Ok(Self {
                name: name.to_string(),
                path: Some(PathBuf::from(path)),
            }),
            None => Ok(Self::new(name)),
        }
    }
}

/// Everything `serve` needs to start.
#[derive(Debug, Clone)]
pub struct ServeConfig {
    pub addr: SocketAddr,
    pub data_root: PathBuf,
    pub datasets: Vec<DatasetSpec>,
    /// Model directory; `None` uses the model manager default
    pub model_dir: Option<PathBuf>,
    /// Refuse to start without a working embedding model
    pub require_model: bool,
    pub ef_search: usize,
}

impl ServeConfig {
    pub fn new(addr: SocketAddr, data_root: impl Into<PathBuf>) -> Self {
        Self {
            addr,
            data_root: data_root.into(),
            datasets: DEFAULT_DATASETS.iter().map(|name| DatasetSpec::new(*name)).collect(),
            model_dir: None,
            require_model: false,
            ef_search: DEFAULT_EF_SEARCH,
        }
    }

    /// `(name, directory)` for every configured dataset
    pub fn dataset_dirs(&self) -> Vec<(String, PathBuf)> {
        self.datasets
            .iter()
            .map(|spec| (spec.name.clone(), spec.resolve(&self.data_root)))
            .collect()
    }

    /// Reject duplicate names and a zero beam width.
    pub fn validate(&self) -> Result<(), String> {
        if self.datasets.is_empty() {
            return Err("at least one dataset is required".into());
        }
        if self.ef_search == 0 {
            return Err("ef_search must be > 0".into());
        }
        for (i, spec) in self.datasets.iter().enumerate() {
            if self.datasets[..i].iter().any(|other| other.name == spec.name) {
                return Err(format!("dataset {:?} listed twice", spec.name));
            }
        }
        Ok(())
    }
}
