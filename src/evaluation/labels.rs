//! Converting class probabilities to labels

use ndarray::Array2;

/// Most probable class per sample
///
/// With a `threshold`, samples whose winning probability falls below it are
/// assigned class 0 (noise).
pub fn labels_from_probabilities(probabilities: &Array2<f32>, threshold: Option<f32>) -> Vec<usize> {
    probabilities
        .rows()
        .into_iter()
        .map(|row| {
            let (label, best) = row
                .iter()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |(best_idx, best), (idx, &p)| {
                    if p > best {
                        (idx, p)
                    } else {
                        (best_idx, best)
                    }
                });
            match threshold {
                Some(threshold) if best < threshold => 0,
                _ => label,
            }
        })
        .collect()
}
