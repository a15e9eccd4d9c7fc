//! Model artifact staging and verification.
//!
//! A model directory holds the two encoder towers, the tokenizer and a
//! manifest with their sha256 digests. Loading is offline-only and checks
//! every digest; `setup_models` is the only path that touches the network.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// HuggingFace repository the artifacts are fetched from by default
pub const DEFAULT_REPOSITORY: &str = "unum-cloud/uform3-image-text-multilingual-base";

const TEXT_ENCODER_FILE: &str = "text_encoder.onnx";
const IMAGE_ENCODER_FILE: &str = "image_encoder.onnx";
const TOKENIZER_FILE: &str = "tokenizer.json";
const MANIFEST_FILE: &str = "model-manifest.json";

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Checksum mismatch for {path:?}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
    #[error("Required model file missing: {0}")]
    ModelMissing(PathBuf),
    #[error("Model manifest missing: {0}")]
    ManifestMissing(PathBuf),
    #[error("Model manifest invalid at {path:?}: {reason}")]
    ManifestInvalid { path: PathBuf, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ModelManifest {
    version: u32,
    repository: String,
    text_encoder_sha256: String,
    image_encoder_sha256: String,
    tokenizer_sha256: String,
}

/// Verified artifact locations
#[derive(Debug, Clone)]
pub struct ModelPaths {
    pub text_encoder: PathBuf,
    pub image_encoder: PathBuf,
    pub tokenizer: PathBuf,
}

pub struct ModelManager {
    root: PathBuf,
    repository: String,
}

impl ModelManager {
    pub fn from_dir(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            repository: DEFAULT_REPOSITORY.to_string(),
        }
    }

    /// `IMAGE_SEARCH_MODEL_DIR` if set, otherwise the user cache directory.
    pub fn new() -> Self {
        if let Ok(dir) = std::env::var("IMAGE_SEARCH_MODEL_DIR") {
            return Self::from_dir(dir);
        }

        match ProjectDirs::from("com", "image-search", "image-search") {
            Some(dirs) => Self::from_dir(dirs.cache_dir().join("models")),
            None => Self::from_dir(".image-search/models"),
        }
    }

    pub fn with_repository(mut self, repository: impl Into<String>) -> Self {
        self.repository = repository.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn artifact(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    fn url(&self, file: &str) -> String {
        format!("https://huggingface.co/{}/resolve/main/{}", self.repository, file)
    }

    fn load_manifest(&self) -> Result<ModelManifest, ModelError> {
        let path = self.manifest_path();
        if !path.exists() {
            return Err(ModelError::ManifestMissing(path));
        }
        let bytes = fs::read(&path)?;
        serde_json::from_slice(&bytes).map_err(|e| ModelError::ManifestInvalid {
            path,
            reason: e.to_string(),
        })
    }

    fn write_manifest(&self, manifest: &ModelManifest) -> Result<(), ModelError> {
        let path = self.manifest_path();
        let payload =
            serde_json::to_vec_pretty(manifest).map_err(|e| ModelError::ManifestInvalid {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        write_atomic(&path, &payload)
    }

    fn ensure_verified(&self, name: &str, expected: &str) -> Result<PathBuf, ModelError> {
        let path = self.artifact(name);
        if !path.exists() {
            return Err(ModelError::ModelMissing(path));
        }
        let actual = compute_sha256(&path)?;
        if actual != expected {
            return Err(ModelError::ChecksumMismatch {
                path,
                expected: expected.to_string(),
                actual,
            });
        }
        Ok(path)
    }

    /// Resolve all artifacts without network access, verifying checksums.
    pub fn resolve_offline(&self) -> Result<ModelPaths, ModelError> {
        let manifest = self.load_manifest()?;
        Ok(ModelPaths {
            text_encoder: self.ensure_verified(TEXT_ENCODER_FILE, &manifest.text_encoder_sha256)?,
            image_encoder: self.ensure_verified(IMAGE_ENCODER_FILE, &manifest.image_encoder_sha256)?,
            tokenizer: self.ensure_verified(TOKENIZER_FILE, &manifest.tokenizer_sha256)?,
        })
    }

    /// Download missing artifacts and pin their digests (trust on first use).
    pub fn setup_models(&self) -> Result<ModelPaths, ModelError> {
        fs::create_dir_all(&self.root)?;

        for file in [TEXT_ENCODER_FILE, IMAGE_ENCODER_FILE, TOKENIZER_FILE] {
            let dest = self.artifact(file);
            if !dest.exists() {
                let url = self.url(file);
                tracing::info!("Downloading model artifact {} -> {:?}", url, dest);
                download_file(&url, &dest)?;
            }
        }

        let manifest = ModelManifest {
            version: 1,
            repository: self.repository.clone(),
            text_encoder_sha256: compute_sha256(&self.artifact(TEXT_ENCODER_FILE))?,
            image_encoder_sha256: compute_sha256(&self.artifact(IMAGE_ENCODER_FILE))?,
            tokenizer_sha256: compute_sha256(&self.artifact(TOKENIZER_FILE))?,
        };
        self.write_manifest(&manifest)?;

        self.resolve_offline()
    }
}

impl Default for ModelManager {
    fn default() -> Self {
        Self::new()
    }
}

fn download_file(url: &str, dest: &Path) -> Result<(), ModelError> {
    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(300))
        .build()?;

    let tmp_path = dest.with_extension("tmp");
    let mut response = client.get(url).send()?.error_for_status()?;
    let mut file = File::create(&tmp_path)?;
    response.copy_to(&mut file)?;
    file.sync_all()?;
    fs::rename(&tmp_path, dest)?;
    sync_parent_dir(dest)?;
    Ok(())
}

fn write_atomic(path: &Path, payload: &[u8]) -> Result<(), ModelError> {
    let tmp_path = path.with_extension("tmp");
    let mut file = File::create(&tmp_path)?;
    file.write_all(payload)?;
    file.sync_all()?;
    fs::rename(&tmp_path, path)?;
    sync_parent_dir(path)?;
    Ok(())
}

fn compute_sha256(path: &Path) -> Result<String, ModelError> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

fn sync_parent_dir(path: &Path) -> Result<(), ModelError> {
    #[cfg(unix)]
    {
        if let Some(parent) = path.parent() {
            File::open(parent)?.sync_all()?;
        }
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}
