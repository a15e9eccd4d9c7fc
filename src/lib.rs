//! Image Search: multi-modal semantic search over named image datasets
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   JSON-RPC 2.0 over HTTP (axum)             │
//! │  find_with_vector · find_vector · find_with_text · ...      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │      Query ──encode──▶ embedding (ASCII / floats / model)   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  SearchDispatcher: dataset ─▶ ANN top-K ─▶ labels ─▶ URIs   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Datasets and the embedding model are loaded once at startup and shared
//! read-only between requests.

pub mod config;
pub mod dataset;
pub mod dispatch;
pub mod error;
pub mod query;
pub mod server;

pub use config::{DatasetSpec, ServeConfig};
pub use dataset::{open_dataset, Dataset, DatasetRegistry};
pub use dispatch::{DatasetInfo, SearchDispatcher};
pub use error::{Error, Result};
pub use query::Query;
pub use server::{create_router, serve, AppState};
