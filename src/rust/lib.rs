//! K-nearest-neighbor evaluation and t-SNE visualization of syndrome image embeddings.
//!
//! Input is a nested `syndrome → subject → image → embedding` mapping, stored as a Python
//! pickle or as JSON. It is flattened into an (N, D) feature matrix with one syndrome label
//! per row, then evaluated with Euclidean and cosine KNN.
//!
//! # Basic Usage
//!
//! ```rust
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use phenoscope::{evaluate_knn, flatten, select_best_k};
//! use serde_json::json;
//!
//! let raw = json!({
//!     "syndrome_a": {
//!         "s1": { "i1": [1.0, 0.0], "i2": [0.9, 0.1] },
//!         "s2": { "i3": [1.1, 0.0], "i4": [1.0, -0.1] }
//!     },
//!     "syndrome_b": {
//!         "s3": { "i5": [0.0, 1.0], "i6": [0.1, 0.9] },
//!         "s4": { "i7": [0.0, 1.1], "i8": [-0.1, 1.0] }
//!     }
//! });
//!
//! let dataset = flatten(&raw)?;
//! assert_eq!(dataset.features.dim(), (8, 2));
//!
//! let results = evaluate_knn(&dataset, 1..=3, 2)?;
//! println!("Best k: {:?}", select_best_k(&results));
//! # Ok(())
//! # }
//! ```
//!
//! # Standalone classifier
//!
//! ```rust
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use ndarray::{array, Array1};
//! use phenoscope::{KnnClassifier, Metric};
//! use std::sync::Arc;
//! use std::thread;
//!
//! let features = array![[1.0, 0.0], [0.9, 0.2], [0.0, 1.0], [0.2, 0.9]];
//! let labels: Array1<String> = ["a", "a", "b", "b"].iter().map(|s| s.to_string()).collect();
//!
//! let classifier = Arc::new(
//!     KnnClassifier::builder()
//!         .with_neighbors(1)?
//!         .with_metric(Metric::Cosine)
//!         .with_training_data(features.view(), labels.view())?
//!         .build()?,
//! );
//!
//! let mut handles = vec![];
//! for _ in 0..3 {
//!     let classifier = Arc::clone(&classifier);
//!     handles.push(thread::spawn(move || {
//!         classifier.predict(array![3.0, 0.5].view()).unwrap();
//!     }));
//! }
//!
//! for handle in handles {
//!     handle.join().unwrap();
//! }
//! # Ok(())
//! # }
//! ```

pub mod classifier;
pub mod config;
pub mod data;
pub mod evaluation;
pub mod logging;
pub mod pipeline;
pub mod visualization;

pub use classifier::{ClassifierError, ClassifierInfo, KnnClassifier, KnnClassifierBuilder, LabelEncoder, Metric};
pub use config::{AppConfig, ConfigError, PipelineConfig};
pub use data::{flatten, load_data, load_data_with_format, DataFormat, EmbeddingDataset, LoadError};
pub use evaluation::{
    evaluate_knn, evaluate_roc, select_best_k, EvaluationError, KnnEvaluation, MeanRoc, RocOptions, RocReport,
};
pub use logging::{LogFormat, LogHandle, LoggingConfig};
pub use pipeline::{run, PipelineReport};
pub use visualization::{project_tsne, Projection, ProjectionError, TsneOptions};
