//! Cross-validated accuracy and ROC diagnostics for KNN classifiers.

mod cross_validation;
mod error;
mod roc;
mod split;

pub use cross_validation::{cross_val_accuracy, evaluate_knn, select_best_k, KnnEvaluation};
pub use error::EvaluationError;
pub use roc::{
    align_probabilities, auc, evaluate_roc, interp, mean_roc, roc_curve, MeanRoc, RocCurve, RocOptions,
    RocReport,
};
pub use split::{train_test_split, Fold, StratifiedKFold};
