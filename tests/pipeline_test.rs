use std::fs;

use env_logger::{Builder, Env};
use phenoscope::{pipeline, LoadError, PipelineConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Map, Value};
use tempfile::tempdir;

// Initialize test logger
fn init() {
    let _ = Builder::from_env(Env::default().default_filter_or("warn")).try_init();
}

/// Three syndromes, four subjects each, five images per subject.
fn synthetic_document() -> Value {
    let mut rng = StdRng::seed_from_u64(42);
    let mut syndromes = Map::new();
    for (s, syndrome) in ["100180", "300000034", "700018215"].iter().enumerate() {
        let mut subjects = Map::new();
        for subject in 0..4 {
            let mut images = Map::new();
            for image in 0..5 {
                let embedding: Vec<f64> = (0..6)
                    .map(|d| (if d % 3 == s { 4.0 } else { 0.0 }) + rng.gen_range(-0.3..0.3))
                    .collect();
                images.insert(format!("img_{}_{}", subject, image), json!(embedding));
            }
            subjects.insert(format!("subject_{}_{}", s, subject), Value::Object(images));
        }
        syndromes.insert(syndrome.to_string(), Value::Object(subjects));
    }
    Value::Object(syndromes)
}

#[test]
fn test_full_run_without_display() -> Result<(), Box<dyn std::error::Error>> {
    init();
    let dir = tempdir()?;
    let input = dir.path().join("embeddings.json");
    fs::write(&input, serde_json::to_vec(&synthetic_document())?)?;

    let config = PipelineConfig {
        input,
        k_max: 5,
        tsne_max_iter: 500,
        display: false,
        ..PipelineConfig::default()
    };
    let report = pipeline::run(&config)?;

    assert_eq!(report.n_samples, 60);
    assert_eq!(report.n_features, 6);
    assert_eq!(report.n_classes, 3);
    assert_eq!(report.projection.coordinates.dim(), (60, 2));
    assert_eq!(report.projection.classes, vec!["100180", "300000034", "700018215"]);
    assert_eq!(report.evaluations.len(), 5);
    assert!((1..=5).contains(&report.best_k));
    assert_eq!(report.roc.k, report.best_k);
    assert!(report.roc.euclidean.auc > 0.9);
    Ok(())
}

#[test]
fn test_missing_input_aborts() {
    init();
    let config = PipelineConfig {
        input: "/no/such/file.p".into(),
        display: false,
        ..PipelineConfig::default()
    };
    let error = pipeline::run(&config).unwrap_err();
    assert!(error
        .chain()
        .any(|cause| matches!(cause.downcast_ref::<LoadError>(), Some(LoadError::NotFound(_)))));
}

#[test]
fn test_invalid_configuration_aborts() -> Result<(), Box<dyn std::error::Error>> {
    init();
    let dir = tempdir()?;
    let input = dir.path().join("embeddings.json");
    fs::write(&input, serde_json::to_vec(&synthetic_document())?)?;

    let config = PipelineConfig {
        input,
        folds: 1,
        display: false,
        ..PipelineConfig::default()
    };
    assert!(pipeline::run(&config).is_err());
    Ok(())
}
