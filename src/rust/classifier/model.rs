use std::collections::HashMap;

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};

use super::distance::{build_index, Metric};
use super::error::ClassifierError;
use super::labels::LabelEncoder;
use super::utils::{argmax, vote_fractions};
use super::ClassifierInfo;

/// A K-nearest-neighbors classifier over embedding vectors.
///
/// Class probabilities are the fraction of the `k` nearest training samples that carry
/// each label. Probability columns follow [`KnnClassifier::classes`], i.e. the sorted set
/// of labels seen during training.
///
/// # Thread Safety
///
/// The classifier owns its training data and holds no interior mutability, so it is
/// `Send + Sync` and can be shared across threads behind an `Arc`.
#[derive(Debug, Clone)]
pub struct KnnClassifier {
    features: Array2<f64>,
    targets: Vec<usize>,
    encoder: LabelEncoder,
    n_neighbors: usize,
    metric: Metric,
}

// Compile-time verification of thread-safety
const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn verify_thread_safety() {
        assert_send_sync::<KnnClassifier>();
    }
};

impl KnnClassifier {
    pub(crate) fn new(
        features: Array2<f64>,
        targets: Vec<usize>,
        encoder: LabelEncoder,
        n_neighbors: usize,
        metric: Metric,
    ) -> Self {
        Self {
            features,
            targets,
            encoder,
            n_neighbors,
            metric,
        }
    }

    /// Creates a new KnnClassifierBuilder for fluent construction
    pub fn builder() -> super::builder::KnnClassifierBuilder {
        super::builder::KnnClassifierBuilder::new()
    }

    /// Returns information about the classifier's current state
    pub fn info(&self) -> ClassifierInfo {
        ClassifierInfo {
            num_classes: self.encoder.len(),
            class_labels: self.encoder.classes().to_vec(),
            n_neighbors: self.n_neighbors,
            metric: self.metric,
            n_training_samples: self.features.nrows(),
            embedding_size: self.features.ncols(),
        }
    }

    /// Labels seen during training, in probability-column order.
    pub fn classes(&self) -> &[String] {
        self.encoder.classes()
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn n_neighbors(&self) -> usize {
        self.n_neighbors
    }

    /// Class probabilities for each row of `records`, shape (rows, classes).
    ///
    /// # Errors
    /// * `ValidationError` if the records have a different number of features
    /// * `IndexError` / `PredictionError` if the neighbor search fails
    pub fn predict_proba(&self, records: ArrayView2<f64>) -> Result<Array2<f64>, ClassifierError> {
        if records.ncols() != self.features.ncols() {
            return Err(ClassifierError::ValidationError(format!(
                "Expected {} features per sample, found {}",
                self.features.ncols(),
                records.ncols()
            )));
        }

        let index = build_index(self.metric, &self.features)?;
        let mut probabilities = Array2::zeros((records.nrows(), self.encoder.len()));

        for (row, sample) in records.rows().into_iter().enumerate() {
            let neighbors = index
                .k_nearest(sample, self.n_neighbors)
                .map_err(|e| ClassifierError::PredictionError(format!("Neighbor search failed: {}", e)))?;
            let votes = vote_fractions(
                neighbors.into_iter().map(|(_, i)| self.targets[i]),
                self.encoder.len(),
            );
            probabilities.row_mut(row).assign(&votes);
        }

        Ok(probabilities)
    }

    /// Predicted label for each row of `records`.
    ///
    /// Ties between classes go to the first class in sorted label order.
    pub fn predict_batch(&self, records: ArrayView2<f64>) -> Result<Vec<String>, ClassifierError> {
        let probabilities = self.predict_proba(records)?;
        probabilities
            .rows()
            .into_iter()
            .map(|row| self.best_label(row))
            .collect()
    }

    /// Predicts the class of a single embedding and returns per-class scores.
    ///
    /// # Arguments
    /// * `sample` - The embedding to classify
    ///
    /// # Returns
    /// A tuple containing:
    /// * The predicted class label (String)
    /// * A HashMap of class labels to their vote fraction (0.0 to 1.0)
    pub fn predict(&self, sample: ArrayView1<f64>) -> Result<(String, HashMap<String, f64>), ClassifierError> {
        let probabilities = self.predict_proba(sample.insert_axis(Axis(0)))?;
        let row = probabilities.row(0);

        let scores = self
            .encoder
            .classes()
            .iter()
            .cloned()
            .zip(row.iter().copied())
            .collect();
        let best_class = self.best_label(row)?;

        Ok((best_class, scores))
    }

    fn best_label(&self, probabilities: ArrayView1<f64>) -> Result<String, ClassifierError> {
        argmax(probabilities)
            .and_then(|i| self.encoder.label(i))
            .map(str::to_string)
            .ok_or_else(|| ClassifierError::PredictionError("No class received a vote".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array1};
    use std::sync::Arc;
    use std::thread;

    fn labels(values: &[&str]) -> Array1<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn setup_test_classifier(k: usize, metric: Metric) -> KnnClassifier {
        let features = array![
            [0.0, 1.0],
            [0.1, 1.1],
            [0.2, 0.9],
            [5.0, 0.0],
            [5.2, 0.1],
            [4.9, -0.1]
        ];
        KnnClassifier::builder()
            .with_neighbors(k)
            .unwrap()
            .with_metric(metric)
            .with_training_data(features.view(), labels(&["up", "up", "up", "right", "right", "right"]).view())
            .unwrap()
            .build()
            .expect("Failed to create classifier")
    }

    #[test]
    fn test_class_info() {
        let classifier = setup_test_classifier(3, Metric::Cosine);
        let info = classifier.info();
        assert_eq!(info.num_classes, 2);
        assert_eq!(info.class_labels, vec!["right", "up"]);
        assert_eq!(info.n_training_samples, 6);
        assert_eq!(info.embedding_size, 2);
        assert_eq!(info.metric, Metric::Cosine);
    }

    #[test]
    fn test_one_neighbor_reproduces_training_labels() {
        let classifier = setup_test_classifier(1, Metric::Euclidean);
        let features = array![[0.0, 1.0], [5.2, 0.1]];
        let predicted = classifier.predict_batch(features.view()).unwrap();
        assert_eq!(predicted, vec!["up", "right"]);
    }

    #[test]
    fn test_probabilities_are_vote_fractions() {
        let classifier = setup_test_classifier(3, Metric::Euclidean);
        let proba = classifier.predict_proba(array![[0.05, 1.0], [5.0, 0.05]].view()).unwrap();

        assert_eq!(proba.dim(), (2, 2));
        // columns: ["right", "up"]
        assert_abs_diff_eq!(proba[[0, 1]], 1.0);
        assert_abs_diff_eq!(proba[[1, 0]], 1.0);
        for row in proba.rows() {
            assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_cosine_metric_uses_direction() {
        let classifier = setup_test_classifier(3, Metric::Cosine);
        // Far away in L2, but pointing "up"
        let (label, scores) = classifier.predict(array![0.5, 40.0].view()).unwrap();
        assert_eq!(label, "up");
        assert_abs_diff_eq!(scores["up"], 1.0);
        assert_abs_diff_eq!(scores["right"], 0.0);
    }

    #[test]
    fn test_feature_count_mismatch() {
        let classifier = setup_test_classifier(1, Metric::Euclidean);
        let result = classifier.predict_proba(array![[1.0, 2.0, 3.0]].view());
        assert!(matches!(result, Err(ClassifierError::ValidationError(_))));
    }

    #[test]
    fn test_thread_safety() {
        let classifier = Arc::new(setup_test_classifier(3, Metric::Euclidean));
        let mut handles = vec![];

        for _ in 0..3 {
            let classifier = Arc::clone(&classifier);
            handles.push(thread::spawn(move || {
                let result = classifier.predict(array![0.0, 1.0].view());
                assert!(result.is_ok());
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }
    }
}
