use ndarray::{Array1, ArrayView1};

/// Fraction of neighbors voting for each class.
pub(crate) fn vote_fractions<I>(neighbor_classes: I, n_classes: usize) -> Array1<f64>
where
    I: IntoIterator<Item = usize>,
{
    let mut votes = Array1::zeros(n_classes);
    let mut total = 0usize;
    for class in neighbor_classes {
        votes[class] += 1.0;
        total += 1;
    }
    if total > 0 {
        votes /= total as f64;
    }
    votes
}

/// Index of the first maximum; ties resolve to the lowest index.
pub(crate) fn argmax(values: ArrayView1<f64>) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &value) in values.iter().enumerate() {
        match best {
            Some((_, current)) if value <= current => {}
            _ if value.is_nan() => {}
            _ => best = Some((i, value)),
        }
    }
    best.map(|(i, _)| i)
}
