/// Represents the different types of errors that can occur in the KNN classifier.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    /// Error occurred during the build phase
    #[error("Build error: {0}")]
    BuildError(String),
    /// Error occurred while building or querying the neighbor index
    #[error("Index error: {0}")]
    IndexError(String),
    /// Error occurred while making predictions
    #[error("Prediction error: {0}")]
    PredictionError(String),
    /// Error occurred due to invalid input parameters
    #[error("Validation error: {0}")]
    ValidationError(String),
}
