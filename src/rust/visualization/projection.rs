use linfa::traits::Transformer;
use linfa::ParamGuard;
use linfa_tsne::{TSneError, TSneParams};
use log::{info, warn};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::classifier::{ClassifierError, LabelEncoder};
use crate::data::EmbeddingDataset;

/// Smallest number of samples the projection accepts.
const MIN_SAMPLES: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    #[error("t-SNE needs at least 4 samples, got {0}")]
    TooFewSamples(usize),
    #[error("invalid t-SNE parameter: {0}")]
    InvalidParameter(String),
    #[error("t-SNE failed: {0}")]
    Tsne(#[from] TSneError),
    #[error(transparent)]
    Labels(#[from] ClassifierError),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TsneOptions {
    pub perplexity: f64,
    pub approx_threshold: f64,
    pub max_iter: usize,
    pub seed: u64,
}

impl Default for TsneOptions {
    fn default() -> Self {
        Self {
            perplexity: 30.0,
            approx_threshold: 0.5,
            max_iter: 1000,
            seed: 42,
        }
    }
}

/// Two-dimensional embedding of a dataset with numerically encoded labels.
#[derive(Debug, Clone)]
pub struct Projection {
    /// Shape (N, 2), row `i` belongs to sample `i`.
    pub coordinates: Array2<f64>,
    /// Class code of each sample, indexing `classes`.
    pub codes: Vec<usize>,
    /// Sorted class labels.
    pub classes: Vec<String>,
}

impl Projection {
    pub fn n_samples(&self) -> usize {
        self.coordinates.nrows()
    }

    /// Points of one class, in sample order.
    pub fn points_of(&self, code: usize) -> Vec<(f64, f64)> {
        self.coordinates
            .rows()
            .into_iter()
            .zip(&self.codes)
            .filter(|(_, &c)| c == code)
            .map(|(row, _)| (row[0], row[1]))
            .collect()
    }
}

/// Perplexity actually used for `n_samples` points.
///
/// Barnes-Hut t-SNE needs `n_samples - 1 >= 3 * perplexity`.
pub fn effective_perplexity(requested: f64, n_samples: usize) -> f64 {
    let limit = n_samples.saturating_sub(1) as f64 / 3.0;
    requested.min(limit)
}

/// Seeded two-dimensional Barnes-Hut t-SNE of the dataset features.
pub fn project_tsne(dataset: &EmbeddingDataset, options: &TsneOptions) -> Result<Projection, ProjectionError> {
    let n_samples = dataset.n_samples();
    if n_samples < MIN_SAMPLES {
        return Err(ProjectionError::TooFewSamples(n_samples));
    }
    if !(options.perplexity > 0.0) {
        return Err(ProjectionError::InvalidParameter(format!(
            "perplexity must be positive, got {}",
            options.perplexity
        )));
    }

    let perplexity = effective_perplexity(options.perplexity, n_samples);
    if perplexity < options.perplexity {
        warn!(
            "Perplexity {} is too large for {} samples, using {:.3}",
            options.perplexity, n_samples, perplexity
        );
    }

    let encoder = LabelEncoder::fit(dataset.labels.iter());
    let codes = encoder.transform(dataset.labels.iter())?;

    info!(
        "Running t-SNE on {} samples of {} features (perplexity {:.2}, {} iterations)",
        n_samples,
        dataset.n_features(),
        perplexity,
        options.max_iter
    );
    let coordinates = TSneParams::embedding_size_with_rng(2, StdRng::seed_from_u64(options.seed))
        .perplexity(perplexity)
        .approx_threshold(options.approx_threshold)
        .max_iter(options.max_iter)
        .check()?
        .transform(dataset.features.clone())?;

    Ok(Projection {
        coordinates,
        codes,
        classes: encoder.classes().to_vec(),
    })
}
