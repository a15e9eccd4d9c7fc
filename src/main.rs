//! Image Search CLI
//!
//! Multi-modal semantic image search over named datasets.
//!
//! # Usage
//!
//! ```bash
//! # Serve the default datasets found under ./data
//! image-search serve --data-root data --port 8545
//!
//! # Turn a JSON list of embeddings into an indexed dataset
//! image-search ingest --input vectors.json --uris uris.txt --output data/unsplash25k
//! image-search stats --file data/unsplash25k
//!
//! # Query a running server
//! image-search query --dataset unsplash25k --text "a dog on a beach"
//!
//! # Download encoder models for text and image queries
//! image-search setup-models
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use base64::Engine;
use clap::{ArgGroup, Parser, Subcommand};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use image_search::config::{DatasetSpec, ServeConfig, DEFAULT_EF_SEARCH};
use image_search::dataset::{self, BuildOptions, DatasetRegistry, INDEX_FILE, MATRIX_FILE, URIS_FILE};
use image_search::open_dataset;
use image_search::server::{serve, AppState, RpcRequest, RpcResponse};
use image_search::SearchDispatcher;
use image_search_core::{vector_to_ascii, VectorStore};
use image_search_neural::models::DEFAULT_REPOSITORY;
use image_search_neural::{ModelManager, MultimodalEncoder, OnnxEncoder};

#[derive(Parser)]
#[command(name = "image-search")]
#[command(about = "Multi-modal semantic image search")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the JSON-RPC server
    Serve {
        /// Host to bind to
        #[arg(long, env = "IMAGE_SEARCH_HOST", default_value = "0.0.0.0")]
        host: String,

        /// Server port
        #[arg(short, long, env = "IMAGE_SEARCH_PORT", default_value = "8545")]
        port: u16,

        /// Directory holding one sub-directory per dataset
        #[arg(long, env = "IMAGE_SEARCH_DATA_ROOT", default_value = "data")]
        data_root: PathBuf,

        /// Datasets to serve, as `name` or `name=path` (default: unsplash25k,cc3m)
        #[arg(short, long = "dataset", env = "IMAGE_SEARCH_DATASETS", value_delimiter = ',')]
        datasets: Vec<DatasetSpec>,

        /// Model directory (defaults to the user cache directory)
        #[arg(long, env = "IMAGE_SEARCH_MODEL_DIR")]
        model_dir: Option<PathBuf>,

        /// Fail instead of serving vector queries only when the model is missing
        #[arg(long)]
        require_model: bool,

        /// Search beam width
        #[arg(long, default_value_t = DEFAULT_EF_SEARCH)]
        ef_search: usize,
    },

    /// Write images.fbin, images.txt and images.usearch from a JSON list of vectors
    ///
    /// Input format: JSON array of arrays [[0.1, ...], [0.2, ...]]
    Ingest {
        /// Input JSON file
        #[arg(short, long)]
        input: PathBuf,

        /// Text file with one URI per vector
        #[arg(short, long)]
        uris: PathBuf,

        /// Output dataset directory
        #[arg(short, long)]
        output: PathBuf,

        /// Index connectivity (M)
        #[arg(short, long, default_value = "16")]
        connectivity: usize,

        /// Index expansion while adding vectors (ef_construction)
        #[arg(short, long, default_value = "128")]
        expansion_add: usize,
    },

    /// Display statistics about an .fbin matrix or a dataset directory
    Stats {
        /// Path to an .fbin file or a dataset directory
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Query a running server
    #[command(group(ArgGroup::new("input").required(true).args(["text", "ascii", "vector", "image"])))]
    Query {
        /// Server URL
        #[arg(long, default_value = "http://localhost:8545")]
        server: String,

        /// Dataset to search
        #[arg(short, long)]
        dataset: String,

        /// Number of results
        #[arg(short, long, default_value = "10")]
        count: usize,

        /// Free-text query
        #[arg(long)]
        text: Option<String>,

        /// ASCII-encoded vector
        #[arg(long)]
        ascii: Option<String>,

        /// Raw vector (comma separated floats)
        #[arg(long)]
        vector: Option<String>,

        /// Image file
        #[arg(long)]
        image: Option<PathBuf>,
    },

    /// Print the ASCII encoding of a comma separated vector
    EncodeVector {
        /// Components in 0..=100, e.g. `12,0,100`
        vector: String,
    },

    /// Download and verify encoder models ahead of serving
    SetupModels {
        /// Model directory (defaults to the user cache directory)
        #[arg(long, env = "IMAGE_SEARCH_MODEL_DIR")]
        model_dir: Option<PathBuf>,

        /// HuggingFace repository to fetch from
        #[arg(long, default_value = DEFAULT_REPOSITORY)]
        repository: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            host,
            port,
            data_root,
            datasets,
            model_dir,
            require_model,
            ef_search,
        } => {
            let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
            let mut config = ServeConfig::new(addr, data_root);
            if !datasets.is_empty() {
                config.datasets = datasets;
            }
            config.model_dir = model_dir;
            config.require_model = require_model;
            config.ef_search = ef_search;
            config.validate().map_err(anyhow::Error::msg)?;

            run_server(config).await?;
        }

        Commands::Ingest {
            input,
            uris,
            output,
            connectivity,
            expansion_add,
        } => {
            tracing::info!("Reading vectors from {:?}", input);
            let file = std::fs::File::open(&input)?;
            let reader = std::io::BufReader::new(file);
            let vectors: Vec<Vec<f32>> = serde_json::from_reader(reader)?;

            if vectors.is_empty() {
                anyhow::bail!("No vectors found in input");
            }

            let dim = vectors[0].len();
            if let Some((i, v)) = vectors.iter().enumerate().find(|(_, v)| v.len() != dim) {
                anyhow::bail!("Vector {} has dimension {}, expected {}", i, v.len(), dim);
            }
            tracing::info!("Found {} vectors of dimension {}", vectors.len(), dim);

            let text = std::fs::read_to_string(&uris)
                .with_context(|| format!("reading {:?}", uris))?;
            let uris: Vec<String> = text.lines().map(str::to_string).collect();
            if uris.len() != vectors.len() {
                anyhow::bail!("{} URIs for {} vectors", uris.len(), vectors.len());
            }

            let build = BuildOptions {
                connectivity,
                expansion_add,
                ..BuildOptions::default()
            };
            dataset::create_dataset(&output, &vectors, &uris, build)?;
            tracing::info!(
                "Wrote {}, {} and {} to {:?}",
                MATRIX_FILE,
                URIS_FILE,
                INDEX_FILE,
                output
            );
        }

        Commands::Stats { file } => {
            if file.is_dir() {
                let dataset = open_dataset(&file)?;
                println!("Dataset: {:?}", file);
                println!("  Images: {}", dataset.len());
                println!("  Dimensions: {}", dataset.dimensions());
                println!("  Connectivity (M): {}", dataset.index().connectivity());
                println!(
                    "  Index Memory: {:.2} MB",
                    dataset.index().memory_usage() as f64 / (1024.0 * 1024.0)
                );
                return Ok(());
            }

            let extension = file.extension().and_then(|e| e.to_str());

            match extension {
                Some("fbin") => {
                    let store = VectorStore::open(&file)?;
                    println!("Matrix File: {:?}", file);
                    println!("  Vectors: {}", store.count);
                    println!("  Dimensions: {}", store.dim);
                    println!(
                        "  File Size: {:.2} MB",
                        store.memory_bytes() as f64 / (1024.0 * 1024.0)
                    );
                }
                _ => {
                    anyhow::bail!("Unknown file type. Expected .fbin or a dataset directory");
                }
            }
        }

        Commands::Query {
            server,
            dataset,
            count,
            text,
            ascii,
            vector,
            image,
        } => {
            let (method, params) = if let Some(text) = text {
                ("find_with_text", json!({ "dataset": dataset, "query": text, "count": count }))
            } else if let Some(ascii) = ascii {
                ("find_with_vector", json!({ "dataset": dataset, "query": ascii, "count": count }))
            } else if let Some(vector) = vector {
                let vector = parse_vector(&vector).map_err(anyhow::Error::msg)?;
                ("find_vector", json!({ "dataset": dataset, "vector": vector, "count": count }))
            } else if let Some(path) = image {
                let bytes = std::fs::read(&path).with_context(|| format!("reading {:?}", path))?;
                let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
                ("find_with_image", json!({ "dataset": dataset, "query": encoded, "count": count }))
            } else {
                anyhow::bail!("one of --text, --ascii, --vector or --image is required");
            };

            let client = reqwest::Client::new();
            let response: RpcResponse = client
                .post(server.trim_end_matches('/'))
                .json(&RpcRequest::new(method, params, 1))
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;

            if let Some(error) = response.error {
                anyhow::bail!("Error {}: {}", error.code, error.message);
            }
            let uris: Vec<String> = serde_json::from_value(response.result.unwrap_or(Value::Null))?;
            println!("Results:");
            for (rank, uri) in uris.iter().enumerate() {
                println!("  {:>3}. {}", rank + 1, uri);
            }
        }

        Commands::EncodeVector { vector } => {
            let vector = parse_vector(&vector).map_err(anyhow::Error::msg)?;
            println!("{}", vector_to_ascii(&vector)?);
        }

        Commands::SetupModels {
            model_dir,
            repository,
        } => {
            let manager = model_manager(model_dir).with_repository(repository);
            tracing::info!("Setting up models in {:?}", manager.root());
            manager.setup_models()?;
            println!("Models downloaded and verified in {:?}", manager.root());
        }
    }

    Ok(())
}

async fn run_server(config: ServeConfig) -> anyhow::Result<()> {
    let registry = DatasetRegistry::open(config.dataset_dirs(), config.ef_search)?;

    // Startup stays online for vector queries even if models are missing.
    let manager = model_manager(config.model_dir.clone());
    let encoder: Option<Arc<dyn MultimodalEncoder>> = match OnnxEncoder::new(manager.root()) {
        Ok(encoder) => {
            tracing::info!("Encoder loaded from {:?}", manager.root());
            Some(Arc::new(encoder))
        }
        Err(e) if config.require_model => {
            return Err(anyhow::Error::new(e).context("loading encoder models"));
        }
        Err(e) => {
            tracing::warn!(
                "Encoder unavailable: {}. Server will answer vector queries only.",
                e
            );
            None
        }
    };

    let dispatcher = SearchDispatcher::new(Arc::new(registry));
    let state = Arc::new(AppState::new(dispatcher, encoder));
    serve(state, config.addr).await?;
    Ok(())
}

fn model_manager(model_dir: Option<PathBuf>) -> ModelManager {
    match model_dir {
        Some(dir) => ModelManager::from_dir(dir),
        None => ModelManager::new(),
    }
}

fn parse_vector(s: &str) -> Result<Vec<f32>, String> {
    s.split(',')
        .map(|v| v.trim().parse::<f32>().map_err(|e| e.to_string()))
        .collect()
}
