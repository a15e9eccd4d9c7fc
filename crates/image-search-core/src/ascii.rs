//! Compact ASCII transport encoding for small integer vectors.
//!
//! Quantized embeddings with components in `[0, 100]` travel inside JSON
//! strings as one printable byte per component: `v + 23`. The result spans
//! bytes 23..=123; byte 60 (`<`) is swapped for 124 (`|`) so the payload is
//! safe to drop into HTML as well. The decoder still reads a literal `<` as 37.
//!
//! ```text
//! 0   -> 0x17      37 -> '|'      100 -> '{'
//! ```

use thiserror::Error;

/// Largest component value the encoding can carry.
pub const MAX_COMPONENT: u8 = 100;

const OFFSET: u8 = 23;
const SWAPPED_FROM: u8 = b'<';
const SWAPPED_TO: u8 = b'|';

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AsciiError {
    #[error("empty vector")]
    Empty,

    #[error("byte {byte:#04x} at position {position} is outside the vector alphabet")]
    InvalidByte { position: usize, byte: u8 },

    #[error("component {value} at position {position} cannot be encoded (expected an integer in 0..=100)")]
    Unencodable { position: usize, value: f32 },
}

/// Decode an ASCII vector into floats.
pub fn ascii_to_vector(text: &str) -> Result<Vec<f32>, AsciiError> {
    if text.is_empty() {
        return Err(AsciiError::Empty);
    }

    text.bytes()
        .enumerate()
        .map(|(position, byte)| {
            let shifted = if byte == SWAPPED_TO { SWAPPED_FROM } else { byte };
            match shifted.checked_sub(OFFSET) {
                Some(value) if value <= MAX_COMPONENT => Ok(value as f32),
                _ => Err(AsciiError::InvalidByte { position, byte }),
            }
        })
        .collect()
}

/// Encode a vector whose components round to integers in `[0, 100]`.
pub fn vector_to_ascii(vector: &[f32]) -> Result<String, AsciiError> {
    if vector.is_empty() {
        return Err(AsciiError::Empty);
    }

    let mut out = String::with_capacity(vector.len());
    for (position, &value) in vector.iter().enumerate() {
        let rounded = value.round();
        if !rounded.is_finite() || rounded < 0.0 || rounded > MAX_COMPONENT as f32 {
            return Err(AsciiError::Unencodable { position, value });
        }
        let byte = rounded as u8 + OFFSET;
        out.push(if byte == SWAPPED_FROM { SWAPPED_TO } else { byte } as char);
    }
    Ok(out)
}
