//! JSON-RPC 2.0 service over HTTP.
//!
//! # Endpoints
//!
//! - `POST /` - JSON-RPC call or batch
//! - `GET /health` - Encoder availability and served datasets
//!
//! # Methods
//!
//! | method             | params                          | result  |
//! |--------------------|---------------------------------|---------|
//! | `find_with_vector` | `dataset`, `query` (ASCII), `count` | `[uri]` |
//! | `find_vector`      | `dataset`, `vector`, `count`    | `[uri]` |
//! | `find_with_text`   | `dataset`, `query`, `count`     | `[uri]` |
//! | `find_with_image`  | `dataset`, `query` (base64), `count` | `[uri]` |
//! | `size`             | `dataset`                       | `int`   |
//! | `dimensions`       | `dataset`                       | `int`   |
//!
//! Params are accepted by name or by position; `count` defaults to 10.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use image_search_neural::MultimodalEncoder;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::dispatch::{DatasetInfo, SearchDispatcher};
use crate::error::{self, Error};
use crate::query::Query;

/// Largest accepted request body; image queries travel inline as base64.
const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Shared application state, built once in `main`.
pub struct AppState {
    pub dispatcher: SearchDispatcher,
    pub encoder: Option<Arc<dyn MultimodalEncoder>>,
}

impl AppState {
    pub fn new(dispatcher: SearchDispatcher, encoder: Option<Arc<dyn MultimodalEncoder>>) -> Self {
        Self { dispatcher, encoder }
    }
}

/// JSON-RPC request object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
    #[serde(default)]
    pub id: Value,
}

impl RpcRequest {
    pub fn new(method: impl Into<String>, params: Value, id: u64) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params,
            id: Value::from(id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<Error> for RpcError {
    fn from(err: Error) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

/// JSON-RPC response object; exactly one of `result` and `error` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    pub id: Value,
}

impl RpcResponse {
    fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    fn failure(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    /// Whether text and image queries can be served
    pub encoder: bool,
    pub datasets: Vec<DatasetInfo>,
}

#[derive(Deserialize)]
struct FindParams {
    dataset: String,
    query: String,
    #[serde(default = "default_count")]
    count: usize,
}

#[derive(Deserialize)]
struct FindVectorParams {
    dataset: String,
    vector: Vec<f32>,
    #[serde(default = "default_count")]
    count: usize,
}

#[derive(Deserialize)]
struct DatasetParams {
    dataset: String,
}

fn default_count() -> usize {
    10
}

const FIND_PARAMS: &[&str] = &["dataset", "query", "count"];
const FIND_VECTOR_PARAMS: &[&str] = &["dataset", "vector", "count"];
const DATASET_PARAMS: &[&str] = &["dataset"];

/// Accept params as an object or as a positional array in `names` order.
fn parse_params<T: DeserializeOwned>(params: Value, names: &[&str]) -> Result<T, Error> {
    let object = match params {
        Value::Object(map) => Value::Object(map),
        Value::Null => Value::Object(Map::new()),
        Value::Array(items) => {
            if items.len() > names.len() {
                return Err(Error::InvalidParams(format!(
                    "expected at most {} positional params, got {}",
                    names.len(),
                    items.len()
                )));
            }
            let map = names
                .iter()
                .zip(items)
                .filter(|(_, value)| !value.is_null())
                .map(|(name, value)| (name.to_string(), value))
                .collect();
            Value::Object(map)
        }
        other => {
            return Err(Error::InvalidParams(format!(
                "params must be an object or an array, got {}",
                other
            )))
        }
    };
    serde_json::from_value(object).map_err(|e| Error::InvalidParams(e.to_string()))
}

fn decode_image(payload: &str) -> Result<Vec<u8>, Error> {
    // Tolerate data URLs as produced by browsers.
    let data = match payload.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => payload,
    };
    base64::engine::general_purpose::STANDARD
        .decode(data.trim())
        .map_err(|e| Error::MalformedImage(format!("invalid base64: {}", e)))
}

fn find(state: &AppState, dataset: &str, query: Query, count: usize) -> Result<Value, Error> {
    let embedding = query.encode(state.encoder.as_ref())?;
    let uris = state.dispatcher.search(dataset, &embedding, count)?;
    Ok(json!(uris))
}

/// Execute one call. Runs on the blocking pool.
fn call(state: &AppState, method: &str, params: Value) -> Result<Value, RpcError> {
    let result = match method {
        "find_with_vector" => {
            let p: FindParams = parse_params(params, FIND_PARAMS)?;
            find(state, &p.dataset, Query::Ascii(p.query), p.count)
        }
        "find_vector" => {
            let p: FindVectorParams = parse_params(params, FIND_VECTOR_PARAMS)?;
            find(state, &p.dataset, Query::Vector(p.vector), p.count)
        }
        "find_with_text" => {
            let p: FindParams = parse_params(params, FIND_PARAMS)?;
            find(state, &p.dataset, Query::Text(p.query), p.count)
        }
        "find_with_image" => {
            let p: FindParams = parse_params(params, FIND_PARAMS)?;
            let bytes = decode_image(&p.query)?;
            find(state, &p.dataset, Query::Image(bytes), p.count)
        }
        "size" => {
            let p: DatasetParams = parse_params(params, DATASET_PARAMS)?;
            state.dispatcher.size(&p.dataset).map(Value::from)
        }
        "dimensions" => {
            let p: DatasetParams = parse_params(params, DATASET_PARAMS)?;
            state.dispatcher.dimensions(&p.dataset).map(Value::from)
        }
        _ => {
            return Err(RpcError::new(
                error::METHOD_NOT_FOUND,
                format!("Method not found: {}", method),
            ))
        }
    };
    result.map_err(RpcError::from)
}

async fn handle_one(state: Arc<AppState>, value: Value) -> RpcResponse {
    let request: RpcRequest = match serde_json::from_value(value) {
        Ok(request) => request,
        Err(e) => {
            return RpcResponse::failure(
                Value::Null,
                RpcError::new(error::INVALID_REQUEST, format!("Invalid request: {}", e)),
            )
        }
    };
    if request.jsonrpc != "2.0" {
        return RpcResponse::failure(
            request.id,
            RpcError::new(error::INVALID_REQUEST, "jsonrpc must be \"2.0\""),
        );
    }

    let RpcRequest { method, params, id, .. } = request;
    tracing::debug!("rpc call {} (id {})", method, id);

    let name = method.clone();
    let outcome = tokio::task::spawn_blocking(move || call(&state, &method, params)).await;
    match outcome {
        Ok(Ok(result)) => RpcResponse::success(id, result),
        Ok(Err(err)) => {
            if err.code == error::INTERNAL_ERROR {
                tracing::warn!("rpc call {} failed: {}", name, err.message);
            } else {
                tracing::debug!("rpc call {} rejected: {}", name, err.message);
            }
            RpcResponse::failure(id, err)
        }
        Err(join_error) => {
            tracing::error!("rpc call {} aborted: {}", name, join_error);
            RpcResponse::failure(id, RpcError::new(error::INTERNAL_ERROR, "Internal error"))
        }
    }
}

/// POST / - JSON-RPC entry point
async fn rpc(State(state): State<Arc<AppState>>, body: Bytes) -> impl IntoResponse {
    let value: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            let response = RpcResponse::failure(
                Value::Null,
                RpcError::new(error::PARSE_ERROR, format!("Parse error: {}", e)),
            );
            return (StatusCode::OK, Json(json!(response)));
        }
    };

    match value {
        Value::Array(calls) if calls.is_empty() => {
            let response = RpcResponse::failure(
                Value::Null,
                RpcError::new(error::INVALID_REQUEST, "Empty batch"),
            );
            (StatusCode::OK, Json(json!(response)))
        }
        Value::Array(calls) => {
            let mut responses = Vec::with_capacity(calls.len());
            for value in calls {
                responses.push(handle_one(state.clone(), value).await);
            }
            (StatusCode::OK, Json(json!(responses)))
        }
        value => {
            let response = handle_one(state, value).await;
            (StatusCode::OK, Json(json!(response)))
        }
    }
}

/// GET /health - Encoder availability and dataset summary
async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "ok".to_string(),
        encoder: state.encoder.is_some(),
        datasets: state.dispatcher.datasets(),
    };
    (StatusCode::OK, Json(response))
}

/// Create the axum router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", post(rpc))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the server and run until Ctrl-C.
pub async fn serve(state: Arc<AppState>, addr: std::net::SocketAddr) -> std::io::Result<()> {
    let router = create_router(state);

    tracing::info!("Starting image search server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
