mod builder;
mod distance;
mod error;
mod labels;
mod model;
mod utils;

pub use builder::KnnClassifierBuilder;
pub use distance::{CosineDist, Metric};
pub use error::ClassifierError;
pub use labels::LabelEncoder;
pub use model::KnnClassifier;

/// Information about the current state and configuration of a classifier
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierInfo {
    /// Number of classes seen during training
    pub num_classes: usize,
    /// Labels of the classes, in probability-column order
    pub class_labels: Vec<String>,
    /// Number of neighbors that vote on each prediction
    pub n_neighbors: usize,
    /// Distance used to rank neighbors
    pub metric: Metric,
    /// Number of stored training samples
    pub n_training_samples: usize,
    /// Size of the embedding vectors
    pub embedding_size: usize,
}
