//! Service error kinds and their JSON-RPC error codes.

use std::path::PathBuf;

use image_search_core::{AsciiError, FormatError, IndexError, StoreError};
use thiserror::Error;

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

pub const UNKNOWN_DATASET: i64 = -32000;
pub const DIMENSION_MISMATCH: i64 = -32001;
pub const MALFORMED_VECTOR: i64 = -32002;
pub const MALFORMED_IMAGE: i64 = -32003;
pub const ENCODING_FAILED: i64 = -32004;
pub const ENCODER_UNAVAILABLE: i64 = -32005;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unknown dataset: {0}")]
    UnknownDataset(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Malformed vector: {0}")]
    MalformedVector(String),

    #[error("Malformed image: {0}")]
    MalformedImage(String),

    #[error("Required file not found: {0}")]
    NotFound(PathBuf),

    #[error("Dataset {dataset:?} is inconsistent: {uris} URIs, {rows} matrix rows, {indexed} indexed")]
    LengthMismatch {
        dataset: PathBuf,
        uris: usize,
        rows: usize,
        indexed: usize,
    },

    #[error("Encoding failed: {0}")]
    Encoding(String),

    #[error("No embedding model loaded; only vector queries are served")]
    EncoderUnavailable,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Index error: {0}")]
    Index(IndexError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// JSON-RPC error code reported to callers
    pub fn code(&self) -> i64 {
        match self {
            Error::UnknownDataset(_) => UNKNOWN_DATASET,
            Error::DimensionMismatch { .. } => DIMENSION_MISMATCH,
            Error::MalformedVector(_) => MALFORMED_VECTOR,
            Error::MalformedImage(_) => MALFORMED_IMAGE,
            Error::Encoding(_) => ENCODING_FAILED,
            Error::EncoderUnavailable => ENCODER_UNAVAILABLE,
            Error::InvalidParams(_) => INVALID_PARAMS,
            Error::NotFound(_)
            | Error::LengthMismatch { .. }
            | Error::Store(_)
            | Error::Index(_)
            | Error::Io(_)
            | Error::Internal(_) => INTERNAL_ERROR,
        }
    }
}

impl From<AsciiError> for Error {
    fn from(err: AsciiError) -> Self {
        Error::MalformedVector(err.to_string())
    }
}

impl From<IndexError> for Error {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::DimensionMismatch { expected, actual } => Error::DimensionMismatch { expected, actual },
            other => Error::Index(other),
        }
    }
}

impl From<FormatError> for Error {
    fn from(err: FormatError) -> Self {
        Error::Store(StoreError::Format(err))
    }
}

impl From<image_search_neural::InferenceError> for Error {
    fn from(err: image_search_neural::InferenceError) -> Self {
        Error::Encoding(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
