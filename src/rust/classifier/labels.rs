use ndarray::Array2;

use super::error::ClassifierError;

/// Maps string labels to dense indices in sorted label order.
///
/// The same ordering is used everywhere a class index appears: probability columns,
/// one-hot encodings and the numeric codes plotted in the projection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    /// Learns the sorted set of distinct labels.
    ///
    /// # Example
    /// ```
    /// use phenoscope::LabelEncoder;
    ///
    /// let encoder = LabelEncoder::fit(["b", "a", "b"]);
    /// assert_eq!(encoder.classes(), ["a", "b"]);
    /// assert_eq!(encoder.transform(["b", "a"]).unwrap(), vec![1, 0]);
    /// ```
    pub fn fit<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut classes: Vec<String> = labels.into_iter().map(|l| l.as_ref().to_string()).collect();
        classes.sort();
        classes.dedup();
        Self { classes }
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.classes
            .binary_search_by(|class| class.as_str().cmp(label))
            .ok()
    }

    pub fn label(&self, index: usize) -> Option<&str> {
        self.classes.get(index).map(String::as_str)
    }

    /// Encodes labels as class indices. Unknown labels are a validation error.
    pub fn transform<I, S>(&self, labels: I) -> Result<Vec<usize>, ClassifierError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        labels
            .into_iter()
            .map(|label| {
                let label = label.as_ref();
                self.index_of(label)
                    .ok_or_else(|| ClassifierError::ValidationError(format!("Unknown label '{}'", label)))
            })
            .collect()
    }

    /// One-hot encodes labels; shape (N, number of classes).
    pub fn binarize<I, S>(&self, labels: I) -> Result<Array2<f64>, ClassifierError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let indices = self.transform(labels)?;
        let mut encoded = Array2::zeros((indices.len(), self.classes.len()));
        for (row, &class) in indices.iter().enumerate() {
            encoded[[row, class]] = 1.0;
        }
        Ok(encoded)
    }
}
