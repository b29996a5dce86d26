use log::debug;
use ndarray::{Array2, ArrayView1, ArrayView2};

use super::distance::Metric;
use super::error::ClassifierError;
use super::labels::LabelEncoder;
use super::model::KnnClassifier;

/// Number of neighbors used when none is given.
const DEFAULT_NEIGHBORS: usize = 5;

/// A builder for constructing a KnnClassifier with a fluent interface.
#[derive(Debug, Clone, Default)]
pub struct KnnClassifierBuilder {
    n_neighbors: Option<usize>,
    metric: Metric,
    features: Option<Array2<f64>>,
    labels: Option<Vec<String>>,
}

impl KnnClassifierBuilder {
    /// Creates a new empty builder: Euclidean metric, no training data
    ///
    /// # Example
    /// ```
    /// use phenoscope::KnnClassifierBuilder;
    ///
    /// let builder = KnnClassifierBuilder::new();
    /// ```
    pub fn new() -> Self {
        Self {
            n_neighbors: None,
            metric: Metric::default(),
            features: None,
            labels: None,
        }
    }

    /// Sets the number of neighbors that vote on each prediction
    ///
    /// # Arguments
    /// * `n_neighbors` - Number of neighbors, at least 1
    ///
    /// # Returns
    /// * `Result<Self, ClassifierError>` - The builder, or a `ValidationError` if `n_neighbors` is 0
    pub fn with_neighbors(mut self, n_neighbors: usize) -> Result<Self, ClassifierError> {
        if n_neighbors == 0 {
            return Err(ClassifierError::ValidationError(
                "Number of neighbors must be at least 1".into(),
            ));
        }
        self.n_neighbors = Some(n_neighbors);
        Ok(self)
    }

    /// Sets the distance metric used to rank neighbors
    ///
    /// # Example
    /// ```
    /// use phenoscope::{KnnClassifierBuilder, Metric};
    ///
    /// let builder = KnnClassifierBuilder::new().with_metric(Metric::Cosine);
    /// ```
    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    /// Stores the training samples and their labels
    ///
    /// # Arguments
    /// * `features` - Training embeddings, one row per sample
    /// * `labels` - Label of each row
    ///
    /// # Returns
    /// * `Result<Self, ClassifierError>` - The builder instance if successful, or an error if:
    ///   - Training data was already set
    ///   - There are no samples or no feature columns
    ///   - The number of labels differs from the number of rows
    ///   - A label is empty
    pub fn with_training_data(
        mut self,
        features: ArrayView2<f64>,
        labels: ArrayView1<String>,
    ) -> Result<Self, ClassifierError> {
        if self.features.is_some() {
            return Err(ClassifierError::BuildError("Training data already set".to_string()));
        }
        Self::validate_training_data(features, labels)?;

        self.features = Some(features.to_owned());
        self.labels = Some(labels.to_vec());
        Ok(self)
    }

    fn validate_training_data(
        features: ArrayView2<f64>,
        labels: ArrayView1<String>,
    ) -> Result<(), ClassifierError> {
        if features.nrows() == 0 {
            return Err(ClassifierError::ValidationError("Training data cannot be empty".into()));
        }
        if features.ncols() == 0 {
            return Err(ClassifierError::ValidationError(
                "Training samples must have at least one feature".into(),
            ));
        }
        if features.nrows() != labels.len() {
            return Err(ClassifierError::ValidationError(format!(
                "Found {} samples but {} labels",
                features.nrows(),
                labels.len()
            )));
        }
        if let Some(pos) = labels.iter().position(|label| label.is_empty()) {
            return Err(ClassifierError::ValidationError(format!(
                "Label {} cannot be empty",
                pos + 1
            )));
        }
        Ok(())
    }

    /// Builds and returns the final KnnClassifier instance
    ///
    /// # Returns
    /// * `Result<KnnClassifier, ClassifierError>` - The classifier if successful, or an error if:
    ///   - No training data was set
    ///   - The number of neighbors exceeds the number of training samples
    ///
    /// # Example
    /// ```
    /// # fn main() -> Result<(), phenoscope::ClassifierError> {
    /// use ndarray::{array, Array1};
    /// use phenoscope::{KnnClassifier, Metric};
    ///
    /// let features = array![[0.0, 0.0], [0.1, 0.0], [5.0, 5.0], [5.1, 5.0]];
    /// let labels = Array1::from(vec!["a".to_string(), "a".into(), "b".into(), "b".into()]);
    ///
    /// let classifier = KnnClassifier::builder()
    ///     .with_neighbors(1)?
    ///     .with_metric(Metric::Euclidean)
    ///     .with_training_data(features.view(), labels.view())?
    ///     .build()?;
    ///
    /// let (label, _scores) = classifier.predict(array![4.9, 5.2].view())?;
    /// assert_eq!(label, "b");
    /// # Ok(())
    /// # }
    /// ```
    pub fn build(self) -> Result<KnnClassifier, ClassifierError> {
        let features = self
            .features
            .ok_or_else(|| ClassifierError::BuildError("Training data must be set".to_string()))?;
        let labels = self
            .labels
            .ok_or_else(|| ClassifierError::BuildError("Training labels must be set".to_string()))?;
        let n_neighbors = self.n_neighbors.unwrap_or(DEFAULT_NEIGHBORS);

        if n_neighbors > features.nrows() {
            return Err(ClassifierError::ValidationError(format!(
                "Expected n_neighbors <= n_samples, but n_samples = {}, n_neighbors = {}",
                features.nrows(),
                n_neighbors
            )));
        }

        let encoder = LabelEncoder::fit(&labels);
        let targets = encoder.transform(&labels)?;
        debug!(
            "Fitted {} KNN (k={}) on {} samples, {} classes",
            self.metric,
            n_neighbors,
            features.nrows(),
            encoder.len()
        );

        Ok(KnnClassifier::new(features, targets, encoder, n_neighbors, self.metric))
    }
}
