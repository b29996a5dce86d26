use std::fmt;

use linfa::Float;
use linfa_nn::distance::{Distance, L2Dist};
use linfa_nn::{LinearSearch, NearestNeighbour, NearestNeighbourIndex};
use ndarray::{Array2, ArrayView, Dimension};
use serde::Deserialize;

use super::error::ClassifierError;

/// Distance used to rank neighbors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Straight-line (L2) distance
    #[default]
    Euclidean,
    /// `1 - cos(a, b)`; insensitive to vector magnitude
    Cosine,
}

impl Metric {
    /// Both metrics, in the order results are reported.
    pub const ALL: [Metric; 2] = [Metric::Euclidean, Metric::Cosine];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Euclidean => "euclidean",
            Self::Cosine => "cosine",
        }
    }

    /// Capitalized name for chart legends.
    pub fn title(&self) -> &'static str {
        match self {
            Self::Euclidean => "Euclidean",
            Self::Cosine => "Cosine",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Cosine distance for `linfa-nn` indices.
///
/// A zero vector has no direction; its distance to anything is 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CosineDist;

impl<F: Float> Distance<F> for CosineDist {
    fn distance<D: Dimension>(&self, a: ArrayView<F, D>, b: ArrayView<F, D>) -> F {
        let (dot, norm_a, norm_b) = a.iter().zip(b.iter()).fold(
            (F::zero(), F::zero(), F::zero()),
            |(dot, norm_a, norm_b), (&x, &y)| (dot + x * y, norm_a + x * x, norm_b + y * y),
        );
        if norm_a <= F::zero() || norm_b <= F::zero() {
            return F::one();
        }
        let similarity = dot / (norm_a.sqrt() * norm_b.sqrt());
        (F::one() - similarity).max(F::zero())
    }
}

pub(crate) type NeighborIndex<'a> = Box<dyn NearestNeighbourIndex<f64> + Send + Sync + 'a>;

/// Builds a brute-force neighbor index over `batch` for the given metric.
pub(crate) fn build_index(metric: Metric, batch: &Array2<f64>) -> Result<NeighborIndex<'_>, ClassifierError> {
    let index = match metric {
        Metric::Euclidean => LinearSearch::new().from_batch(batch, L2Dist),
        Metric::Cosine => LinearSearch::new().from_batch(batch, CosineDist),
    };
    index.map_err(|e| ClassifierError::IndexError(format!("Failed to build {} index: {}", metric, e)))
}
