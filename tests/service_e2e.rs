use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use image_search::dataset::{create_dataset, open_dataset, BuildOptions, DatasetRegistry};
use image_search::error;
use image_search::server::{create_router, AppState};
use image_search::SearchDispatcher;
use image_search_core::vector_to_ascii;
use image_search_neural::preprocess::fit_to_context;
use image_search_neural::{ImageTensor, InferenceError, MultimodalEncoder, TextTensor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};
use std::io::Cursor;
use std::sync::Arc;
use tempfile::{tempdir, TempDir};
use tower::ServiceExt; // for oneshot

const DIM: usize = 16;
const COUNT: usize = 64;

/// Text `"image N"` and images `N` pixels wide both embed to stored vector N.
struct LookupEncoder {
    vectors: Vec<Vec<f32>>,
}

impl MultimodalEncoder for LookupEncoder {
    fn preprocess_text(&self, text: &str) -> Result<TextTensor, InferenceError> {
        let label: u32 = text
            .trim_start_matches("image ")
            .parse()
            .map_err(|_| InferenceError::Tokenizer(format!("unknown text {:?}", text)))?;
        Ok(fit_to_context(&[label], 4, 0))
    }

    fn encode_text(&self, tensor: TextTensor) -> Result<Vec<f32>, InferenceError> {
        Ok(self.vectors[tensor.input_ids[0] as usize].clone())
    }

    fn preprocess_image(&self, image: &DynamicImage) -> Result<ImageTensor, InferenceError> {
        Ok(ImageTensor(ndarray::Array4::zeros((1, 3, 1, image.width() as usize))))
    }

    fn encode_image(&self, tensor: ImageTensor) -> Result<Vec<f32>, InferenceError> {
        Ok(self.vectors[tensor.shape()[3]].clone())
    }
}

/// Model whose runtime always fails
struct BrokenEncoder;

impl MultimodalEncoder for BrokenEncoder {
    fn preprocess_text(&self, _text: &str) -> Result<TextTensor, InferenceError> {
        Ok(fit_to_context(&[1], 4, 0))
    }

    fn encode_text(&self, _tensor: TextTensor) -> Result<Vec<f32>, InferenceError> {
        Err(InferenceError::Panicked)
    }

    fn preprocess_image(&self, _image: &DynamicImage) -> Result<ImageTensor, InferenceError> {
        Ok(ImageTensor(ndarray::Array4::zeros((1, 3, 1, 1))))
    }

    fn encode_image(&self, _tensor: ImageTensor) -> Result<Vec<f32>, InferenceError> {
        Err(InferenceError::Panicked)
    }
}

struct Fixture {
    router: Router,
    vectors: Vec<Vec<f32>>,
    _dir: TempDir,
}

/// Integer components in 1..=100 so every vector has an ASCII form.
fn integer_vectors() -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(2024);
    (0..COUNT)
        .map(|_| (0..DIM).map(|_| rng.gen_range(1..=100) as f32).collect())
        .collect()
}

fn uri(label: usize) -> String {
    format!("https://images.test/photo-{label}.jpg")
}

fn fixture(encoder: Option<Arc<dyn MultimodalEncoder>>) -> Fixture {
    let vectors = integer_vectors();
    let uris: Vec<String> = (0..COUNT).map(uri).collect();

    let dir = tempdir().unwrap();
    let photos = dir.path().join("photos");
    create_dataset(&photos, &vectors, &uris, BuildOptions::default()).unwrap();

    let mut registry = DatasetRegistry::new();
    registry.insert("photos", open_dataset(&photos).unwrap());
    let dispatcher = SearchDispatcher::new(Arc::new(registry));

    let state = Arc::new(AppState::new(dispatcher, encoder));
    Fixture {
        router: create_router(state),
        vectors,
        _dir: dir,
    }
}

fn with_lookup_encoder() -> Fixture {
    let encoder: Arc<dyn MultimodalEncoder> = Arc::new(LookupEncoder {
        vectors: integer_vectors(),
    });
    fixture(Some(encoder))
}

async fn post(router: &Router, body: String) -> Value {
    let request = Request::builder()
        .method("POST")
        .uri("/")
        .header("Content-Type", "application/json")
        .body(Body::from(body))
        .unwrap();

    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn call(router: &Router, method: &str, params: Value) -> Value {
    let body = json!({ "jsonrpc": "2.0", "method": method, "params": params, "id": 7 });
    let response = post(router, body.to_string()).await;
    assert_eq!(response["id"], 7);
    response
}

fn result_uris(response: &Value) -> Vec<String> {
    serde_json::from_value(response["result"].clone()).unwrap()
}

fn error_code(response: &Value) -> i64 {
    assert!(response.get("result").is_none(), "unexpected result: {response}");
    response["error"]["code"].as_i64().unwrap()
}

fn png_bytes(width: u32) -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, 2, Rgb([200, 100, 50])));
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, ImageFormat::Png).unwrap();
    bytes.into_inner()
}

fn encode_base64(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

#[tokio::test]
async fn test_size_and_dimensions() {
    let fixture = fixture(None);

    let size = call(&fixture.router, "size", json!({ "dataset": "photos" })).await;
    assert_eq!(size["result"], COUNT);

    let dimensions = call(&fixture.router, "dimensions", json!(["photos"])).await;
    assert_eq!(dimensions["result"], DIM);
}

#[tokio::test]
async fn test_find_with_ascii_vector() {
    let fixture = fixture(None);
    let query = vector_to_ascii(&fixture.vectors[5]).unwrap();

    let response = call(
        &fixture.router,
        "find_with_vector",
        json!({ "dataset": "photos", "query": query, "count": 3 }),
    )
    .await;

    let uris = result_uris(&response);
    assert_eq!(uris.len(), 3);
    assert_eq!(uris[0], uri(5));
}

#[tokio::test]
async fn test_find_vector_with_positional_params() {
    let fixture = fixture(None);

    let response = call(&fixture.router, "find_vector", json!(["photos", fixture.vectors[9], 4])).await;
    let uris = result_uris(&response);
    assert_eq!(uris.len(), 4);
    assert_eq!(uris[0], uri(9));
}

#[tokio::test]
async fn test_count_defaults_and_caps() {
    let fixture = fixture(None);

    let default = call(
        &fixture.router,
        "find_vector",
        json!({ "dataset": "photos", "vector": fixture.vectors[0] }),
    )
    .await;
    assert_eq!(result_uris(&default).len(), 10);

    let oversized = call(
        &fixture.router,
        "find_vector",
        json!({ "dataset": "photos", "vector": fixture.vectors[0], "count": 1000 }),
    )
    .await;
    assert_eq!(result_uris(&oversized).len(), COUNT);

    let zero = call(
        &fixture.router,
        "find_vector",
        json!({ "dataset": "photos", "vector": fixture.vectors[0], "count": 0 }),
    )
    .await;
    assert!(result_uris(&zero).is_empty());
}

#[tokio::test]
async fn test_memory_scale_counts_return_whole_dataset() {
    let fixture = fixture(None);

    for count in [1u64 << 40, u64::MAX] {
        let response = call(
            &fixture.router,
            "find_vector",
            json!({ "dataset": "photos", "vector": fixture.vectors[0], "count": count }),
        )
        .await;
        assert_eq!(result_uris(&response).len(), COUNT, "count = {count}");
    }

    // the server keeps answering afterwards
    let size = call(&fixture.router, "size", json!({ "dataset": "photos" })).await;
    assert_eq!(size["result"], COUNT);
}

#[tokio::test]
async fn test_find_with_text() {
    let fixture = with_lookup_encoder();

    let response = call(
        &fixture.router,
        "find_with_text",
        json!({ "dataset": "photos", "query": "image 12", "count": 5 }),
    )
    .await;
    let uris = result_uris(&response);
    assert_eq!(uris.len(), 5);
    assert_eq!(uris[0], uri(12));
}

#[tokio::test]
async fn test_find_with_image() {
    let fixture = with_lookup_encoder();

    let response = call(
        &fixture.router,
        "find_with_image",
        json!({ "dataset": "photos", "query": encode_base64(&png_bytes(21)), "count": 2 }),
    )
    .await;
    let uris = result_uris(&response);
    assert_eq!(uris.len(), 2);
    assert_eq!(uris[0], uri(21));
}

#[tokio::test]
async fn test_vector_only_mode_rejects_text_and_images() {
    let fixture = fixture(None);

    let text = call(&fixture.router, "find_with_text", json!(["photos", "image 1"])).await;
    assert_eq!(error_code(&text), error::ENCODER_UNAVAILABLE);

    let image = call(&fixture.router, "find_with_image", json!(["photos", encode_base64(&png_bytes(3))])).await;
    assert_eq!(error_code(&image), error::ENCODER_UNAVAILABLE);
}

#[tokio::test]
async fn test_model_failures_are_encoding_errors() {
    let encoder: Arc<dyn MultimodalEncoder> = Arc::new(BrokenEncoder);
    let fixture = fixture(Some(encoder));

    let text = call(&fixture.router, "find_with_text", json!(["photos", "anything"])).await;
    assert_eq!(error_code(&text), error::ENCODING_FAILED);

    let image = call(&fixture.router, "find_with_image", json!(["photos", encode_base64(&png_bytes(3))])).await;
    assert_eq!(error_code(&image), error::ENCODING_FAILED);
}

#[tokio::test]
async fn test_call_errors() {
    let fixture = with_lookup_encoder();
    let router = &fixture.router;

    let unknown = call(router, "size", json!({ "dataset": "cc12m" })).await;
    assert_eq!(error_code(&unknown), error::UNKNOWN_DATASET);

    let short = call(router, "find_vector", json!(["photos", [1.0, 2.0]])).await;
    assert_eq!(error_code(&short), error::DIMENSION_MISMATCH);

    let bad_ascii = call(router, "find_with_vector", json!(["photos", "\u{1}\u{2}"])).await;
    assert_eq!(error_code(&bad_ascii), error::MALFORMED_VECTOR);

    let not_base64 = call(router, "find_with_image", json!(["photos", "%%%"])).await;
    assert_eq!(error_code(&not_base64), error::MALFORMED_IMAGE);

    let not_an_image = call(router, "find_with_image", json!(["photos", encode_base64(b"plain text")])).await;
    assert_eq!(error_code(&not_an_image), error::MALFORMED_IMAGE);

    let missing = call(router, "find_with_text", json!({ "query": "image 1" })).await;
    assert_eq!(error_code(&missing), error::INVALID_PARAMS);

    let unknown_method = call(router, "find_with_audio", json!([])).await;
    assert_eq!(error_code(&unknown_method), error::METHOD_NOT_FOUND);
}

#[tokio::test]
async fn test_protocol_errors() {
    let fixture = fixture(None);

    let garbage = post(&fixture.router, "{not json".to_string()).await;
    assert_eq!(error_code(&garbage), error::PARSE_ERROR);
    assert_eq!(garbage["id"], Value::Null);

    let wrong_version = post(
        &fixture.router,
        json!({ "jsonrpc": "1.0", "method": "size", "params": ["photos"], "id": 1 }).to_string(),
    )
    .await;
    assert_eq!(error_code(&wrong_version), error::INVALID_REQUEST);

    let no_method = post(&fixture.router, json!({ "jsonrpc": "2.0", "id": 2 }).to_string()).await;
    assert_eq!(error_code(&no_method), error::INVALID_REQUEST);

    let empty_batch = post(&fixture.router, "[]".to_string()).await;
    assert_eq!(error_code(&empty_batch), error::INVALID_REQUEST);
}

#[tokio::test]
async fn test_batch_preserves_order() {
    let fixture = fixture(None);
    let batch = json!([
        { "jsonrpc": "2.0", "method": "size", "params": ["photos"], "id": "a" },
        { "jsonrpc": "2.0", "method": "size", "params": ["missing"], "id": "b" },
        { "jsonrpc": "2.0", "method": "dimensions", "params": ["photos"], "id": "c" },
    ]);

    let response = post(&fixture.router, batch.to_string()).await;
    let responses = response.as_array().unwrap();
    assert_eq!(responses.len(), 3);
    assert_eq!(responses[0]["id"], "a");
    assert_eq!(responses[0]["result"], COUNT);
    assert_eq!(error_code(&responses[1]), error::UNKNOWN_DATASET);
    assert_eq!(responses[2]["result"], DIM);
}

#[tokio::test]
async fn test_health_endpoint() {
    let fixture = with_lookup_encoder();

    let request = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = fixture.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let health: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["encoder"], true);
    assert_eq!(health["datasets"][0]["name"], "photos");
    assert_eq!(health["datasets"][0]["size"], COUNT);
    assert_eq!(health["datasets"][0]["dimensions"], DIM);
}
