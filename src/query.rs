//! Query shapes and their conversion into embeddings.

use std::sync::Arc;

use image_search_core::ascii_to_vector;
use image_search_neural::MultimodalEncoder;

use crate::error::{Error, Result};

/// A search query before encoding
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// Compact ASCII vector, one byte per component
    Ascii(String),
    /// Raw float embedding
    Vector(Vec<f32>),
    /// Free text in any language the model understands
    Text(String),
    /// Encoded image file (PNG, JPEG, ...)
    Image(Vec<u8>),
}

impl Query {
    /// Resolve into one embedding. Text and image queries need a model.
    pub fn encode(self, encoder: Option<&Arc<dyn MultimodalEncoder>>) -> Result<Vec<f32>> {
        match self {
            Query::Ascii(text) => Ok(ascii_to_vector(&text)?),
            Query::Vector(vector) => {
                if vector.is_empty() {
                    return Err(Error::MalformedVector("empty vector".into()));
                }
                if let Some(position) = vector.iter().position(|v| !v.is_finite()) {
                    return Err(Error::MalformedVector(format!(
                        "component {} is not a finite number",
                        position
                    )));
                }
                Ok(vector)
            }
            Query::Text(text) => {
                let encoder = encoder.ok_or(Error::EncoderUnavailable)?;
                Ok(encoder.embed_text(&text)?)
            }
            Query::Image(bytes) => {
                let encoder = encoder.ok_or(Error::EncoderUnavailable)?;
                let image = image::load_from_memory(&bytes)
                    .map_err(|e| Error::MalformedImage(e.to_string()))?;
                Ok(encoder.embed_image(&image)?)
            }
        }
    }
}
