use log::{info, warn};
use ndarray::{Array2, ArrayView2, Axis};

use super::error::EvaluationError;
use super::split::train_test_split;
use crate::classifier::{KnnClassifier, LabelEncoder, Metric};
use crate::data::EmbeddingDataset;

/// Points of a receiver operating characteristic curve, from (0, 0) to (1, 1).
///
/// `thresholds[0]` is `+inf`; every later threshold is a distinct score, descending.
#[derive(Debug, Clone, PartialEq)]
pub struct RocCurve {
    pub fpr: Vec<f64>,
    pub tpr: Vec<f64>,
    pub thresholds: Vec<f64>,
}

/// ROC curve of binary `truth` ranked by `scores`.
///
/// Scores are visited in descending order; tied scores form a single point.
///
/// # Errors
/// * `InvalidParameter` if the inputs are empty or their lengths differ
/// * `UndefinedRoc` if `truth` has no positives or no negatives
pub fn roc_curve(scores: &[f64], truth: &[bool]) -> Result<RocCurve, EvaluationError> {
    if scores.is_empty() || scores.len() != truth.len() {
        return Err(EvaluationError::InvalidParameter(format!(
            "ROC needs equally sized, non-empty inputs, got {} scores and {} labels",
            scores.len(),
            truth.len()
        )));
    }
    let positives = truth.iter().filter(|&&t| t).count();
    let negatives = truth.len() - positives;
    if positives == 0 || negatives == 0 {
        return Err(EvaluationError::UndefinedRoc(format!(
            "{} positive and {} negative samples",
            positives, negatives
        )));
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut fpr = vec![0.0];
    let mut tpr = vec![0.0];
    let mut thresholds = vec![f64::INFINITY];
    let (mut tp, mut fp) = (0usize, 0usize);
    for (position, &i) in order.iter().enumerate() {
        if truth[i] {
            tp += 1;
        } else {
            fp += 1;
        }
        let last_of_tie = order
            .get(position + 1)
            .map_or(true, |&next| scores[next] != scores[i]);
        if last_of_tie {
            fpr.push(fp as f64 / negatives as f64);
            tpr.push(tp as f64 / positives as f64);
            thresholds.push(scores[i]);
        }
    }

    Ok(RocCurve { fpr, tpr, thresholds })
}

/// One-dimensional linear interpolation of `(xp, fp)` at `x`.
///
/// `xp` must be non-decreasing. Values outside `xp` are clamped to the end points; where
/// `xp` repeats, the last of the repeated points is used.
pub fn interp(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    let n = xp.len().min(fp.len());
    if n == 0 {
        return f64::NAN;
    }
    if x < xp[0] {
        return fp[0];
    }
    if x > xp[n - 1] {
        return fp[n - 1];
    }

    // largest j with xp[j] <= x
    let j = xp[..n].partition_point(|&v| v <= x) - 1;
    if xp[j] == x {
        return fp[j];
    }
    if j + 1 >= n {
        return fp[n - 1];
    }
    let slope = (fp[j + 1] - fp[j]) / (xp[j + 1] - xp[j]);
    fp[j] + slope * (x - xp[j])
}

/// Area under `(x, y)` by the trapezoidal rule.
pub fn auc(x: &[f64], y: &[f64]) -> f64 {
    x.windows(2)
        .zip(y.windows(2))
        .map(|(xs, ys)| (xs[1] - xs[0]) * (ys[0] + ys[1]) / 2.0)
        .sum()
}

/// `n` evenly spaced values from 0 to 1 inclusive.
pub(crate) fn linspace(n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![0.0],
        _ => (0..n).map(|i| i as f64 / (n - 1) as f64).collect(),
    }
}

/// Re-orders probability columns from `trained_classes` to `all_classes`.
///
/// Columns of classes that were never seen during training are left at zero.
pub fn align_probabilities<S: AsRef<str>>(
    probabilities: ArrayView2<f64>,
    trained_classes: &[S],
    all_classes: &[S],
) -> Array2<f64> {
    let mut aligned = Array2::zeros((probabilities.nrows(), all_classes.len()));
    for (column, class) in trained_classes.iter().enumerate() {
        let target = all_classes
            .iter()
            .position(|candidate| candidate.as_ref() == class.as_ref());
        if let Some(target) = target.filter(|_| column < probabilities.ncols()) {
            aligned.column_mut(target).assign(&probabilities.column(column));
        }
    }
    aligned
}

/// Per-class ROC curves averaged on a fixed false-positive-rate grid.
#[derive(Debug, Clone, PartialEq)]
pub struct MeanRoc {
    pub metric: Metric,
    pub fpr: Vec<f64>,
    pub tpr: Vec<f64>,
    pub auc: f64,
    /// Classes whose curve was defined on the test split and entered the mean.
    pub classes_used: Vec<String>,
}

/// Averages the per-class ROC curves of `scores` against one-hot `truth`.
///
/// Classes with only positives or only negatives in `truth` are skipped with a warning.
pub fn mean_roc(
    metric: Metric,
    scores: ArrayView2<f64>,
    truth: ArrayView2<f64>,
    classes: &[String],
    n_points: usize,
) -> Result<MeanRoc, EvaluationError> {
    if n_points < 2 {
        return Err(EvaluationError::InvalidParameter(format!(
            "ROC grid needs at least 2 points, got {}",
            n_points
        )));
    }
    if scores.dim() != truth.dim() || scores.ncols() != classes.len() {
        return Err(EvaluationError::InvalidParameter(format!(
            "scores {:?}, truth {:?} and {} classes do not line up",
            scores.dim(),
            truth.dim(),
            classes.len()
        )));
    }

    let grid = linspace(n_points);
    let mut total = vec![0.0; n_points];
    let mut classes_used = Vec::new();

    for (column, class) in classes.iter().enumerate() {
        let class_scores: Vec<f64> = scores.column(column).to_vec();
        let class_truth: Vec<bool> = truth.column(column).iter().map(|&v| v > 0.5).collect();
        match roc_curve(&class_scores, &class_truth) {
            Ok(curve) => {
                for (sum, &x) in total.iter_mut().zip(&grid) {
                    *sum += interp(x, &curve.fpr, &curve.tpr);
                }
                classes_used.push(class.clone());
            }
            Err(EvaluationError::UndefinedRoc(reason)) => {
                warn!("Skipping ROC for class {} ({}): {}", class, metric, reason);
            }
            Err(e) => return Err(e),
        }
    }

    if classes_used.is_empty() {
        return Err(EvaluationError::UndefinedRoc(format!(
            "no class has both positive and negative test samples for {} distance",
            metric
        )));
    }

    let tpr: Vec<f64> = total.iter().map(|sum| sum / classes_used.len() as f64).collect();
    let area = auc(&grid, &tpr);
    Ok(MeanRoc {
        metric,
        fpr: grid,
        tpr,
        auc: area,
        classes_used,
    })
}

/// Parameters of the held-out ROC evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RocOptions {
    pub test_size: f64,
    pub seed: u64,
    pub n_points: usize,
}

impl Default for RocOptions {
    fn default() -> Self {
        Self {
            test_size: 0.2,
            seed: 42,
            n_points: 100,
        }
    }
}

/// Mean ROC curves of both metrics for one `k`.
#[derive(Debug, Clone, PartialEq)]
pub struct RocReport {
    pub k: usize,
    /// Score columns, one per class in the whole dataset, in sorted order.
    pub classes: Vec<String>,
    pub euclidean: MeanRoc,
    pub cosine: MeanRoc,
}

impl RocReport {
    pub fn curves(&self) -> [&MeanRoc; 2] {
        [&self.euclidean, &self.cosine]
    }
}

/// Splits the dataset once, fits Euclidean and cosine KNN with `k` neighbors on the
/// training side, and averages the per-class ROC curves on the test side.
///
/// # Errors
/// * `InvalidParameter` / `Split` if the split options are unusable for this dataset
/// * `Classifier` if `k` exceeds the number of training samples
/// * `UndefinedRoc` if no class has both positive and negative test samples
pub fn evaluate_roc(
    dataset: &EmbeddingDataset,
    k: usize,
    options: &RocOptions,
) -> Result<RocReport, EvaluationError> {
    let encoder = LabelEncoder::fit(dataset.labels.iter());
    let (train, test) = train_test_split(dataset.n_samples(), options.test_size, options.seed)?;
    info!(
        "ROC evaluation with k={}: {} training and {} test samples",
        k,
        train.len(),
        test.len()
    );

    let train_x = dataset.features.select(Axis(0), &train);
    let train_y = dataset.labels.select(Axis(0), &train);
    let test_x = dataset.features.select(Axis(0), &test);
    let test_truth = encoder.binarize(test.iter().map(|&row| &dataset.labels[row]))?;

    let roc_for = |metric: Metric| -> Result<MeanRoc, EvaluationError> {
        let classifier = KnnClassifier::builder()
            .with_neighbors(k)?
            .with_metric(metric)
            .with_training_data(train_x.view(), train_y.view())?
            .build()?;
        let probabilities = classifier.predict_proba(test_x.view())?;
        let scores = align_probabilities(probabilities.view(), classifier.classes(), encoder.classes());
        let mean = mean_roc(metric, scores.view(), test_truth.view(), encoder.classes(), options.n_points)?;
        info!("{} AUC = {:.4} over {} classes", metric, mean.auc, mean.classes_used.len());
        Ok(mean)
    };

    Ok(RocReport {
        k,
        classes: encoder.classes().to_vec(),
        euclidean: roc_for(Metric::Euclidean)?,
        cosine: roc_for(Metric::Cosine)?,
    })
}
