//! Image Search Neural – multi-modal (text + image) embedding on ONNX Runtime
//!
//! # Architecture
//!
//! ```text
//!  text ──▶ Tokenizer ──▶ fit to context ──┐
//!                                          ├──▶ ORT session ──▶ L2 normalize ──▶ Vec<f32>
//!  image ─▶ resize/crop ─▶ mean/std NCHW ──┘
//! ```
//!
//! Both towers project into one shared space, so a text query can be compared
//! with image embeddings directly. Artifacts are staged by [`ModelManager`]
//! and pinned by a checksum manifest.

pub mod inference;
pub mod models;
pub mod preprocess;

pub use inference::{InferenceError, MultimodalEncoder, OnnxEncoder};
pub use models::{ModelError, ModelManager, ModelPaths};
pub use preprocess::{EncoderConfig, ImageTensor, TextTensor};
