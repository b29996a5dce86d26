use std::ops::RangeInclusive;

use log::{debug, info};
use ndarray::Axis;

use super::error::EvaluationError;
use super::split::StratifiedKFold;
use crate::classifier::{KnnClassifier, Metric};
use crate::data::EmbeddingDataset;

/// Mean cross-validated accuracy of one `k` under both metrics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KnnEvaluation {
    pub k: usize,
    pub accuracy_euclidean: f64,
    pub accuracy_cosine: f64,
}

impl KnnEvaluation {
    pub fn accuracy(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Euclidean => self.accuracy_euclidean,
            Metric::Cosine => self.accuracy_cosine,
        }
    }
}

/// Mean accuracy of a `k`-neighbor classifier over stratified folds.
///
/// Each fold trains on its train rows and scores the fraction of test rows whose
/// predicted label matches. The result is the unweighted mean of the fold scores.
pub fn cross_val_accuracy(
    dataset: &EmbeddingDataset,
    k: usize,
    metric: Metric,
    folds: &StratifiedKFold,
) -> Result<f64, EvaluationError> {
    let labels = dataset.labels.to_vec();
    let splits = folds.split(&labels)?;
    fold_accuracy(dataset, k, metric, &splits)
}

fn fold_accuracy(
    dataset: &EmbeddingDataset,
    k: usize,
    metric: Metric,
    splits: &[(Vec<usize>, Vec<usize>)],
) -> Result<f64, EvaluationError> {
    let mut total = 0.0;
    for (fold, (train, test)) in splits.iter().enumerate() {
        let train_x = dataset.features.select(Axis(0), train);
        let train_y = dataset.labels.select(Axis(0), train);
        let classifier = KnnClassifier::builder()
            .with_neighbors(k)?
            .with_metric(metric)
            .with_training_data(train_x.view(), train_y.view())?
            .build()?;

        let test_x = dataset.features.select(Axis(0), test);
        let predicted = classifier.predict_batch(test_x.view())?;
        let correct = predicted
            .iter()
            .zip(test.iter())
            .filter(|(label, &row)| **label == dataset.labels[row])
            .count();
        let score = correct as f64 / test.len() as f64;
        debug!("k={} {} fold {}: accuracy {:.4}", k, metric, fold, score);
        total += score;
    }
    Ok(total / splits.len() as f64)
}

/// Cross-validates every `k` in `k_values` with both Euclidean and cosine distance.
///
/// The same folds are reused for every `k` and both metrics.
///
/// # Errors
/// * `InvalidParameter` if the range is empty or starts at 0
/// * `Split` if the dataset cannot be split into `n_folds` stratified folds
/// * `Classifier` if a training fold has fewer samples than `k`
pub fn evaluate_knn(
    dataset: &EmbeddingDataset,
    k_values: RangeInclusive<usize>,
    n_folds: usize,
) -> Result<Vec<KnnEvaluation>, EvaluationError> {
    if k_values.is_empty() || *k_values.start() == 0 {
        return Err(EvaluationError::InvalidParameter(format!(
            "k range {}..={} must be non-empty and start at 1 or more",
            k_values.start(),
            k_values.end()
        )));
    }

    let folds = StratifiedKFold::new(n_folds)?;
    let labels = dataset.labels.to_vec();
    let splits = folds.split(&labels)?;
    info!(
        "Evaluating k={}..={} with {}-fold cross-validation on {} samples",
        k_values.start(),
        k_values.end(),
        n_folds,
        dataset.n_samples()
    );

    k_values
        .map(|k| {
            let evaluation = KnnEvaluation {
                k,
                accuracy_euclidean: fold_accuracy(dataset, k, Metric::Euclidean, &splits)?,
                accuracy_cosine: fold_accuracy(dataset, k, Metric::Cosine, &splits)?,
            };
            debug!(
                "k={}: euclidean {:.4}, cosine {:.4}",
                k, evaluation.accuracy_euclidean, evaluation.accuracy_cosine
            );
            Ok(evaluation)
        })
        .collect()
}

/// The `k` with the highest Euclidean accuracy. Ties keep the earliest record.
pub fn select_best_k(results: &[KnnEvaluation]) -> Option<usize> {
    results
        .iter()
        .filter(|r| !r.accuracy_euclidean.is_nan())
        .fold(None::<&KnnEvaluation>, |best, r| match best {
            Some(b) if b.accuracy_euclidean >= r.accuracy_euclidean => Some(b),
            _ => Some(r),
        })
        .map(|r| r.k)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array1};

    fn record(k: usize, euclidean: f64) -> KnnEvaluation {
        KnnEvaluation {
            k,
            accuracy_euclidean: euclidean,
            accuracy_cosine: 0.0,
        }
    }

    fn two_clusters() -> EmbeddingDataset {
        let features = array![
            [1.0, 0.0],
            [1.1, 0.1],
            [0.9, -0.1],
            [1.2, 0.0],
            [0.0, 1.0],
            [0.1, 1.1],
            [-0.1, 0.9],
            [0.0, 1.2]
        ];
        let labels: Array1<String> = ["a", "a", "a", "a", "b", "b", "b", "b"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        EmbeddingDataset::new(features, labels)
    }

    #[test]
    fn test_best_k_first_maximum() {
        let results = [record(1, 0.5), record(2, 0.9), record(3, 0.9)];
        assert_eq!(select_best_k(&results), Some(2));
    }

    #[test]
    fn test_best_k_ignores_nan_and_empty() {
        assert_eq!(select_best_k(&[]), None);
        let results = [record(1, f64::NAN), record(2, 0.3)];
        assert_eq!(select_best_k(&results), Some(2));
    }

    #[test]
    fn test_separable_clusters_are_perfect() {
        let dataset = two_clusters();
        let results = evaluate_knn(&dataset, 1..=3, 2).unwrap();

        assert_eq!(results.iter().map(|r| r.k).collect::<Vec<_>>(), vec![1, 2, 3]);
        for r in &results {
            assert_abs_diff_eq!(r.accuracy_euclidean, 1.0);
            assert_abs_diff_eq!(r.accuracy_cosine, 1.0);
        }
    }

    #[test]
    fn test_cross_val_accuracy_matches_evaluation() {
        let dataset = two_clusters();
        let folds = StratifiedKFold::new(4).unwrap();
        let accuracy = cross_val_accuracy(&dataset, 1, Metric::Euclidean, &folds).unwrap();
        assert_abs_diff_eq!(accuracy, 1.0);
    }

    #[test]
    fn test_invalid_k_range() {
        let dataset = two_clusters();
        assert!(matches!(
            evaluate_knn(&dataset, 0..=3, 2),
            Err(EvaluationError::InvalidParameter(_))
        ));
        #[allow(clippy::reversed_empty_ranges)]
        let empty = 3..=1;
        assert!(matches!(
            evaluate_knn(&dataset, empty, 2),
            Err(EvaluationError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_k_larger_than_training_fold() {
        let dataset = two_clusters();
        // 2 folds leave 4 training rows
        let result = evaluate_knn(&dataset, 5..=5, 2);
        assert!(matches!(result, Err(EvaluationError::Classifier(_))));
    }
}
