use std::collections::HashMap;

use log::warn;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::error::EvaluationError;

/// Train and test row indices for one fold.
pub type Fold = (Vec<usize>, Vec<usize>);

/// K-fold splitter that keeps class proportions roughly equal in every fold.
///
/// Samples are not shuffled. Classes are numbered by first appearance, the sorted
/// class codes are dealt round-robin to the folds, and each class then fills its
/// folds in row order. Fold `i` is the test set of split `i`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StratifiedKFold {
    n_splits: usize,
}

impl StratifiedKFold {
    pub fn new(n_splits: usize) -> Result<Self, EvaluationError> {
        if n_splits < 2 {
            return Err(EvaluationError::InvalidParameter(format!(
                "number of folds must be at least 2, got {}",
                n_splits
            )));
        }
        Ok(Self { n_splits })
    }

    pub fn n_splits(&self) -> usize {
        self.n_splits
    }

    /// Computes the `(train, test)` indices of every fold for `labels`.
    pub fn split<S: AsRef<str>>(&self, labels: &[S]) -> Result<Vec<Fold>, EvaluationError> {
        let n_samples = labels.len();
        if self.n_splits > n_samples {
            return Err(EvaluationError::Split {
                n_samples,
                reason: format!("number of folds ({}) exceeds the number of samples", self.n_splits),
            });
        }

        // Class codes in order of first appearance
        let mut codes: HashMap<&str, usize> = HashMap::new();
        let encoded: Vec<usize> = labels
            .iter()
            .map(|label| {
                let next = codes.len();
                *codes.entry(label.as_ref()).or_insert(next)
            })
            .collect();
        let n_classes = codes.len();

        let mut class_counts = vec![0usize; n_classes];
        for &code in &encoded {
            class_counts[code] += 1;
        }
        if class_counts.iter().all(|&count| count < self.n_splits) {
            return Err(EvaluationError::Split {
                n_samples,
                reason: format!(
                    "number of folds ({}) exceeds the number of members in every class",
                    self.n_splits
                ),
            });
        }
        if let Some(&smallest) = class_counts.iter().min() {
            if smallest < self.n_splits {
                warn!(
                    "The least populated class has only {} members, which is less than {} folds",
                    smallest, self.n_splits
                );
            }
        }

        let mut sorted = encoded.clone();
        sorted.sort_unstable();
        let mut allocation = vec![vec![0usize; n_classes]; self.n_splits];
        for (position, &code) in sorted.iter().enumerate() {
            allocation[position % self.n_splits][code] += 1;
        }

        let mut test_fold = vec![0usize; n_samples];
        for code in 0..n_classes {
            let folds_for_class = (0..self.n_splits)
                .flat_map(|fold| std::iter::repeat(fold).take(allocation[fold][code]));
            let members = encoded
                .iter()
                .enumerate()
                .filter(|(_, &c)| c == code)
                .map(|(row, _)| row);
            for (row, fold) in members.zip(folds_for_class) {
                test_fold[row] = fold;
            }
        }

        Ok((0..self.n_splits)
            .map(|fold| {
                let (test, train): (Vec<usize>, Vec<usize>) =
                    (0..n_samples).partition(|&row| test_fold[row] == fold);
                (train, test)
            })
            .collect())
    }
}

/// Random train/test split of `n_samples` rows.
///
/// The test side holds `ceil(test_size * n_samples)` rows; the permutation is drawn from
/// a generator seeded with `seed`, so the split is reproducible.
pub fn train_test_split(n_samples: usize, test_size: f64, seed: u64) -> Result<Fold, EvaluationError> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(EvaluationError::InvalidParameter(format!(
            "test_size must be in (0, 1), got {}",
            test_size
        )));
    }

    let n_test = (test_size * n_samples as f64).ceil() as usize;
    let n_train = n_samples.saturating_sub(n_test);
    if n_train == 0 || n_test == 0 {
        return Err(EvaluationError::Split {
            n_samples,
            reason: format!(
                "test_size {} leaves {} training and {} test samples",
                test_size, n_train, n_test
            ),
        });
    }

    let mut permutation: Vec<usize> = (0..n_samples).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    permutation.shuffle(&mut rng);

    let train = permutation[n_test..].to_vec();
    let test = permutation[..n_test].to_vec();
    Ok((train, test))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stratified_allocation() {
        let labels = ["a", "a", "a", "b", "b", "b"];
        let folds = StratifiedKFold::new(3).unwrap().split(&labels).unwrap();

        assert_eq!(folds.len(), 3);
        assert_eq!(folds[0], (vec![1, 2, 4, 5], vec![0, 3]));
        assert_eq!(folds[1], (vec![0, 2, 3, 5], vec![1, 4]));
        assert_eq!(folds[2], (vec![0, 1, 3, 4], vec![2, 5]));
    }

    #[test]
    fn test_stratified_uneven_classes() {
        // 5 of "x" and 2 of "y" across 2 folds: x is split 3/2, y 1/1
        let labels = ["x", "y", "x", "x", "y", "x", "x"];
        let folds = StratifiedKFold::new(2).unwrap().split(&labels).unwrap();

        let test_sizes: Vec<usize> = folds.iter().map(|(_, test)| test.len()).collect();
        assert_eq!(test_sizes.iter().sum::<usize>(), labels.len());
        for (_, test) in &folds {
            assert!(test.iter().any(|&row| labels[row] == "y"));
        }
        for (train, test) in &folds {
            assert_eq!(train.len() + test.len(), labels.len());
            assert!(train.iter().all(|row| !test.contains(row)));
        }
    }

    #[test]
    fn test_stratified_errors() {
        assert!(StratifiedKFold::new(1).is_err());

        let labels = ["a", "b", "c"];
        let result = StratifiedKFold::new(4).unwrap().split(&labels);
        assert!(matches!(result, Err(EvaluationError::Split { .. })));

        let labels = ["a", "a", "b", "b"];
        let result = StratifiedKFold::new(3).unwrap().split(&labels);
        assert!(matches!(result, Err(EvaluationError::Split { .. })));
    }

    #[test]
    fn test_train_test_split_sizes() {
        let (train, test) = train_test_split(10, 0.2, 42).unwrap();
        assert_eq!(test.len(), 2);
        assert_eq!(train.len(), 8);

        let (train, test) = train_test_split(11, 0.2, 42).unwrap();
        assert_eq!(test.len(), 3);
        assert_eq!(train.len(), 8);

        let mut all: Vec<usize> = train.iter().chain(test.iter()).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..11).collect::<Vec<_>>());
    }

    #[test]
    fn test_train_test_split_is_reproducible() {
        assert_eq!(train_test_split(50, 0.2, 42).unwrap(), train_test_split(50, 0.2, 42).unwrap());
    }

    #[test]
    fn test_train_test_split_rejects_degenerate_input() {
        assert!(train_test_split(10, 0.0, 42).is_err());
        assert!(train_test_split(10, 1.0, 42).is_err());
        assert!(train_test_split(1, 0.2, 42).is_err());
    }
}
