use crate::classifier::ClassifierError;

#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("cannot split {n_samples} samples: {reason}")]
    Split { n_samples: usize, reason: String },
    /// Raised when no class produced a ROC curve with both positives and negatives.
    #[error("ROC curve is undefined: {0}")]
    UndefinedRoc(String),
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
}
