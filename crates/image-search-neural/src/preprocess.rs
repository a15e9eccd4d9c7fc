//! Tensor preparation for the text and image towers.

use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::Array4;
use serde::{Deserialize, Serialize};

/// Shape and normalization constants of the exported encoders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Token sequence length expected by the text tower
    pub context_length: usize,
    /// Token id used for padding
    pub pad_token_id: u32,
    /// Square input side of the image tower
    pub image_size: u32,
    pub image_mean: [f32; 3],
    pub image_std: [f32; 3],
    /// Position of the session output holding the pooled embedding
    pub output_index: usize,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            context_length: 77,
            pad_token_id: 0,
            image_size: 224,
            image_mean: [0.48145466, 0.4578275, 0.40821073],
            image_std: [0.26862954, 0.26130258, 0.27577711],
            output_index: 0,
        }
    }
}

/// Token ids and attention mask, both `[1, context_length]`
#[derive(Debug, Clone, PartialEq)]
pub struct TextTensor {
    pub input_ids: Vec<i64>,
    pub attention_mask: Vec<i64>,
}

impl TextTensor {
    pub fn shape(&self) -> [usize; 2] {
        [1, self.input_ids.len()]
    }
}

/// Normalized pixels in NCHW layout, `[1, 3, size, size]`
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor(pub Array4<f32>);

impl ImageTensor {
    pub fn shape(&self) -> [usize; 4] {
        let (n, c, h, w) = self.0.dim();
        [n, c, h, w]
    }

    /// Row-major copy of the pixel data
    pub fn to_vec(&self) -> Vec<f32> {
        self.0.iter().copied().collect()
    }
}

/// Truncate or pad token ids to exactly `context` positions.
pub fn fit_to_context(ids: &[u32], context: usize, pad_id: u32) -> TextTensor {
    let used = ids.len().min(context);
    let mut input_ids = Vec::with_capacity(context);
    let mut attention_mask = Vec::with_capacity(context);

    input_ids.extend(ids[..used].iter().map(|&id| id as i64));
    attention_mask.extend(std::iter::repeat(1).take(used));
    input_ids.extend(std::iter::repeat(pad_id as i64).take(context - used));
    attention_mask.extend(std::iter::repeat(0).take(context - used));

    TextTensor {
        input_ids,
        attention_mask,
    }
}

/// Resize to cover the square input, center crop, and normalize per channel.
pub fn image_to_tensor(image: &DynamicImage, config: &EncoderConfig) -> ImageTensor {
    let size = config.image_size;
    let rgb = image
        .resize_to_fill(size, size, FilterType::CatmullRom)
        .to_rgb8();

    let mut tensor = Array4::<f32>::zeros((1, 3, size as usize, size as usize));
    for (x, y, pixel) in rgb.enumerate_pixels() {
        for c in 0..3 {
            let value = pixel.0[c] as f32 / 255.0;
            tensor[[0, c, y as usize, x as usize]] = (value - config.image_mean[c]) / config.image_std[c];
        }
    }
    ImageTensor(tensor)
}
