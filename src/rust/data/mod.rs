use std::collections::BTreeMap;

use ndarray::{Array1, Array2, Axis};

mod error;
mod loader;
mod nested;
mod numpy;
mod pickle;

pub use error::LoadError;
pub use loader::{flatten, load_data, load_data_with_format, DataFormat};
pub use nested::NestedValue;

/// Flattened sample set: one row of `features` per image, labelled with its syndrome.
///
/// Row `i` of `features` and entry `i` of `labels` come from the same
/// (syndrome, subject, image) triple.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingDataset {
    /// Embeddings, shape (N, D)
    pub features: Array2<f64>,
    /// Syndrome identifiers, shape (N,)
    pub labels: Array1<String>,
}

impl EmbeddingDataset {
    /// Pairs features with labels. Callers are responsible for matching row counts.
    pub fn new(features: Array2<f64>, labels: Array1<String>) -> Self {
        debug_assert_eq!(features.nrows(), labels.len());
        Self { features, labels }
    }

    pub fn n_samples(&self) -> usize {
        self.features.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    /// Sorted unique labels.
    pub fn classes(&self) -> Vec<String> {
        let mut classes: Vec<String> = self.labels.iter().cloned().collect();
        classes.sort();
        classes.dedup();
        classes
    }

    pub fn n_classes(&self) -> usize {
        self.classes().len()
    }

    /// Number of samples per label.
    pub fn class_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for label in self.labels.iter() {
            *counts.entry(label.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// New dataset holding the given rows, in the given order.
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            features: self.features.select(Axis(0), indices),
            labels: self.labels.select(Axis(0), indices),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn sample() -> EmbeddingDataset {
        EmbeddingDataset::new(
            array![[0.0, 1.0], [2.0, 3.0], [4.0, 5.0]],
            Array1::from(vec!["b".to_string(), "a".to_string(), "b".to_string()]),
        )
    }

    #[test]
    fn test_classes_are_sorted_and_unique() {
        let dataset = sample();
        assert_eq!(dataset.classes(), vec!["a", "b"]);
        assert_eq!(dataset.n_classes(), 2);
        assert_eq!(dataset.class_counts()["b"], 2);
    }

    #[test]
    fn test_select_rows() {
        let subset = sample().select(&[2, 1]);
        assert_eq!(subset.features, array![[4.0, 5.0], [2.0, 3.0]]);
        assert_eq!(subset.labels.to_vec(), vec!["b", "a"]);
    }
}
