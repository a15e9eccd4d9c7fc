//! ONNX inference for the text and image towers.

use std::path::Path;

use image::DynamicImage;
use ort::inputs;
use ort::session::{builder::SessionBuilder, Session};
use ort::value::Value;
use parking_lot::Mutex;
use thiserror::Error;
use tokenizers::Tokenizer;

use crate::models::{ModelManager, ModelPaths};
use crate::preprocess::{fit_to_context, image_to_tensor, EncoderConfig, ImageTensor, TextTensor};

/// Optional per-model overrides read from the model directory
pub const ENCODER_CONFIG_FILE: &str = "encoder-config.json";

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("ORT error: {0}")]
    Ort(#[from] ort::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Model error: {0}")]
    Model(#[from] crate::models::ModelError),
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),
    #[error("Encoder config error: {0}")]
    Config(#[from] serde_json::Error),
    #[error("Session has no output {index} (found {available})")]
    MissingOutput { index: usize, available: usize },
    #[error("Inference panicked")]
    Panicked,
}

/// Projects text and images into one shared embedding space.
///
/// Calls are blocking; async callers should run them on a blocking pool.
pub trait MultimodalEncoder: Send + Sync {
    fn preprocess_text(&self, text: &str) -> Result<TextTensor, InferenceError>;

    fn encode_text(&self, tensor: TextTensor) -> Result<Vec<f32>, InferenceError>;

    fn preprocess_image(&self, image: &DynamicImage) -> Result<ImageTensor, InferenceError>;

    fn encode_image(&self, tensor: ImageTensor) -> Result<Vec<f32>, InferenceError>;

    fn embed_text(&self, text: &str) -> Result<Vec<f32>, InferenceError> {
        let tensor = self.preprocess_text(text)?;
        self.encode_text(tensor)
    }

    fn embed_image(&self, image: &DynamicImage) -> Result<Vec<f32>, InferenceError> {
        let tensor = self.preprocess_image(image)?;
        self.encode_image(tensor)
    }
}

/// Encoder backed by two ONNX Runtime sessions and a HuggingFace tokenizer.
pub struct OnnxEncoder {
    text_session: Mutex<Session>,
    image_session: Mutex<Session>,
    tokenizer: Tokenizer,
    config: EncoderConfig,
}

impl OnnxEncoder {
    /// Load from pre-staged local artifacts. Never touches the network;
    /// run `ModelManager::setup_models` first.
    pub fn new(model_dir: &Path) -> Result<Self, InferenceError> {
        let manager = ModelManager::from_dir(model_dir);
        let paths = manager.resolve_offline()?;

        let config_path = model_dir.join(ENCODER_CONFIG_FILE);
        let config = if config_path.exists() {
            serde_json::from_slice(&std::fs::read(&config_path)?)?
        } else {
            EncoderConfig::default()
        };

        Self::from_paths(&paths, config)
    }

    pub fn from_paths(paths: &ModelPaths, config: EncoderConfig) -> Result<Self, InferenceError> {
        let _ = ort::init().with_name("image-search").commit();

        // One intra-op thread per session; parallelism comes from the blocking pool.
        let text_session = SessionBuilder::new()?
            .with_intra_threads(1)?
            .commit_from_file(&paths.text_encoder)?;
        let image_session = SessionBuilder::new()?
            .with_intra_threads(1)?
            .commit_from_file(&paths.image_encoder)?;

        let tokenizer = Tokenizer::from_file(&paths.tokenizer)
            .map_err(|e| InferenceError::Tokenizer(e.to_string()))?;

        tracing::info!(
            "Loaded encoder towers (context {}, image {}px)",
            config.context_length,
            config.image_size
        );

        Ok(Self {
            text_session: Mutex::new(text_session),
            image_session: Mutex::new(image_session),
            tokenizer,
            config,
        })
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }
}

impl MultimodalEncoder for OnnxEncoder {
    fn preprocess_text(&self, text: &str) -> Result<TextTensor, InferenceError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| InferenceError::Tokenizer(e.to_string()))?;

        Ok(fit_to_context(
            encoding.get_ids(),
            self.config.context_length,
            self.config.pad_token_id,
        ))
    }

    fn encode_text(&self, tensor: TextTensor) -> Result<Vec<f32>, InferenceError> {
        let shape = tensor.shape().to_vec();
        let input_ids = Value::from_array((shape.clone(), tensor.input_ids))?;
        let attention_mask = Value::from_array((shape, tensor.attention_mask))?;
        let output_index = self.config.output_index;

        guarded(|| {
            let mut session = self.text_session.lock();
            let outputs = session.run(inputs![input_ids, attention_mask])?;
            if output_index >= outputs.len() {
                return Err(InferenceError::MissingOutput {
                    index: output_index,
                    available: outputs.len(),
                });
            }
            let tensor = outputs[output_index].try_extract_tensor::<f32>()?;
            Ok(tensor.1.to_vec())
        })
    }

    fn preprocess_image(&self, image: &DynamicImage) -> Result<ImageTensor, InferenceError> {
        Ok(image_to_tensor(image, &self.config))
    }

    fn encode_image(&self, tensor: ImageTensor) -> Result<Vec<f32>, InferenceError> {
        let pixels = Value::from_array((tensor.shape().to_vec(), tensor.to_vec()))?;
        let output_index = self.config.output_index;

        guarded(|| {
            let mut session = self.image_session.lock();
            let outputs = session.run(inputs![pixels])?;
            if output_index >= outputs.len() {
                return Err(InferenceError::MissingOutput {
                    index: output_index,
                    available: outputs.len(),
                });
            }
            let tensor = outputs[output_index].try_extract_tensor::<f32>()?;
            Ok(tensor.1.to_vec())
        })
    }
}

/// Run one session call, turning runtime panics into errors and
/// normalizing the resulting embedding.
fn guarded<F>(call: F) -> Result<Vec<f32>, InferenceError>
where
    F: FnOnce() -> Result<Vec<f32>, InferenceError>,
{
    // A malformed model can panic inside the runtime; keep the worker alive.
    let embedding = std::panic::catch_unwind(std::panic::AssertUnwindSafe(call))
        .map_err(|_| InferenceError::Panicked)??;
    Ok(normalize(&embedding))
}

/// Scale to unit length; near-zero vectors are returned unchanged.
pub fn normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-6 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}
