use std::sync::Arc;

use image_search::dataset::{create_dataset, BuildOptions, DatasetRegistry};
use image_search::{Error, SearchDispatcher};
use image_search_core::{ascii_to_vector, vector_to_ascii};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::tempdir;

fn random_vectors(rng: &mut StdRng, count: usize, dim: usize) -> Vec<Vec<f32>> {
    (0..count)
        .map(|_| (0..dim).map(|_| rng.gen::<f32>() - 0.5).collect())
        .collect()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm = |v: &[f32]| v.iter().map(|x| x * x).sum::<f32>().sqrt();
    dot / (norm(a) * norm(b))
}

fn uris(prefix: &str, count: usize) -> Vec<String> {
    (0..count).map(|i| format!("https://{prefix}.test/{i:06}.jpg")).collect()
}

/// Registry with datasets named after the served defaults.
fn registry_with(datasets: &[(&str, usize, usize)], build: BuildOptions) -> (SearchDispatcher, tempfile::TempDir) {
    let mut rng = StdRng::seed_from_u64(99);
    let root = tempdir().unwrap();

    let mut dirs = Vec::new();
    for &(name, count, dim) in datasets {
        let dir = root.path().join(name);
        create_dataset(&dir, &random_vectors(&mut rng, count, dim), &uris(name, count), build).unwrap();
        dirs.push((name.to_string(), dir));
    }

    let registry = DatasetRegistry::open(dirs, 64).unwrap();
    (SearchDispatcher::new(Arc::new(registry)), root)
}

#[test]
fn test_size_matches_uris_and_rows() {
    let (dispatcher, _root) = registry_with(&[("small", 17, 4), ("medium", 300, 12)], BuildOptions::default());

    for (name, dataset) in dispatcher.registry().iter() {
        assert_eq!(dispatcher.size(name).unwrap(), dataset.uris().len());
        assert_eq!(dispatcher.size(name).unwrap(), dataset.vectors().count);
    }
}

#[test]
fn test_result_count_is_min_of_k_and_size() {
    let (dispatcher, _root) = registry_with(&[("photos", 150, 8)], BuildOptions::default());
    let mut rng = StdRng::seed_from_u64(5);

    for k in [1, 7, 10, 64, 149, 150, 151, 500] {
        let query: Vec<f32> = (0..8).map(|_| rng.gen::<f32>() - 0.5).collect();
        let uris = dispatcher.search("photos", &query, k).unwrap();
        assert_eq!(uris.len(), k.min(150), "k = {k}");
    }
}

#[test]
fn test_memory_scale_counts_are_capped() {
    let (dispatcher, _root) = registry_with(&[("photos", 200, 6)], BuildOptions::default());

    for k in [1usize << 32, 1 << 40, usize::MAX] {
        let uris = dispatcher.search("photos", &[0.2, -0.1, 0.4, 0.0, 0.3, -0.3], k).unwrap();
        assert_eq!(uris.len(), 200, "k = {k}");
    }
}

#[test]
fn test_results_ordered_by_similarity() {
    let mut rng = StdRng::seed_from_u64(31);
    let vectors = random_vectors(&mut rng, 250, 10);
    let names = uris("ordered", 250);
    let dir = tempdir().unwrap();
    create_dataset(dir.path(), &vectors, &names, BuildOptions::default()).unwrap();

    let registry = DatasetRegistry::open(vec![("ordered".to_string(), dir.path().to_path_buf())], 64).unwrap();
    let dispatcher = SearchDispatcher::new(Arc::new(registry));

    for _ in 0..20 {
        let query: Vec<f32> = (0..10).map(|_| rng.gen::<f32>() - 0.5).collect();
        let uris = dispatcher.search("ordered", &query, 25).unwrap();
        let similarities: Vec<f32> = uris
            .iter()
            .map(|uri| {
                let label = names.iter().position(|n| n == uri).unwrap();
                cosine_similarity(&query, &vectors[label])
            })
            .collect();
        assert!(
            similarities.windows(2).all(|w| w[0] >= w[1] - 1e-5),
            "not ordered: {similarities:?}"
        );
    }
}

#[test]
fn test_unknown_dataset_always_fails() {
    let (dispatcher, _root) = registry_with(&[("photos", 10, 4)], BuildOptions::default());
    let mut rng = StdRng::seed_from_u64(8);

    for _ in 0..10 {
        let name: String = (0..6).map(|_| rng.gen_range(b'a'..=b'z') as char).collect();
        let result = dispatcher.search(&name, &[0.0; 4], rng.gen_range(0..20));
        assert!(matches!(result, Err(Error::UnknownDataset(n)) if n == name));
    }
}

#[test]
fn test_ascii_roundtrip_within_tolerance() {
    let mut rng = StdRng::seed_from_u64(17);
    for _ in 0..50 {
        let len = rng.gen_range(1..300);
        let vector: Vec<f32> = (0..len).map(|_| rng.gen_range(0.0..=100.0f32)).collect();
        let decoded = ascii_to_vector(&vector_to_ascii(&vector).unwrap()).unwrap();
        assert_eq!(decoded.len(), vector.len());
        for (a, b) in vector.iter().zip(&decoded) {
            assert!((a - b).abs() <= 0.5 + 1e-4, "{a} decoded as {b}");
        }
    }
}

#[test]
fn test_unsplash25k_zero_vector_query() {
    let build = BuildOptions {
        connectivity: 8,
        expansion_add: 32,
        ..BuildOptions::default()
    };
    let (dispatcher, _root) = registry_with(&[("unsplash25k", 25_000, 8)], build);

    assert_eq!(dispatcher.size("unsplash25k").unwrap(), 25_000);

    let zero = ascii_to_vector(&vector_to_ascii(&[0.0; 8]).unwrap()).unwrap();
    let results = dispatcher.search("unsplash25k", &zero, 10).unwrap();
    assert_eq!(results.len(), 10);

    let all = uris("unsplash25k", 25_000);
    for uri in &results {
        assert!(!uri.is_empty());
        assert!(all.contains(uri));
    }
}

#[test]
fn test_cc3m_dimensions_match_matrix() {
    let (dispatcher, _root) = registry_with(&[("cc3m", 40, 256)], BuildOptions::default());

    let dataset = dispatcher.registry().get("cc3m").unwrap();
    assert_eq!(dispatcher.dimensions("cc3m").unwrap(), dataset.vectors().dim);
    assert_eq!(dispatcher.dimensions("cc3m").unwrap(), 256);
}
