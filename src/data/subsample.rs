//! Selecting a fraction of the training data.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Seeded generator, or one seeded from OS entropy
pub fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Random contiguous range `[first, last)` covering `fraction` of `data_len` samples
///
/// The range holds at least `min_nb_samples` samples (as far as the data
/// allows) so that the generator built from it yields at least one batch.
pub fn sub_range(
    data_len: usize,
    fraction: f64,
    min_nb_samples: usize,
    seed: Option<u64>,
) -> (usize, usize) {
    let sub_len = ((fraction * data_len as f64) as usize)
        .max(min_nb_samples)
        .min(data_len);
    if sub_len >= data_len {
        return (0, data_len);
    }

    let mut rng = seeded_rng(seed);
    let first = rng.gen_range(0..=data_len - sub_len);
    (first, first + sub_len)
}

/// Convert a duration in seconds into a fraction of the data, capped at 1
pub fn seconds_to_fraction(seconds: f64, data_len: usize, samplerate_hz: f64) -> f64 {
    let total_seconds = data_len as f64 / samplerate_hz;
    (seconds / total_seconds).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sub_range_bounds() {
        for seed in 0..50 {
            let (first, last) = sub_range(10_000, 0.1, 0, Some(seed));
            assert_eq!(last - first, 1000);
            assert!(last <= 10_000);
        }
    }

    #[test]
    fn test_sub_range_respects_minimum() {
        let (first, last) = sub_range(10_000, 0.01, 2_500, Some(3));
        assert_eq!(last - first, 2_500);
    }

    #[test]
    fn test_sub_range_covers_all_when_too_short() {
        assert_eq!(sub_range(100, 0.5, 1_000, Some(0)), (0, 100));
        assert_eq!(sub_range(100, 1.0, 0, None), (0, 100));
    }

    #[test]
    fn test_sub_range_is_reproducible() {
        assert_eq!(
            sub_range(50_000, 0.2, 0, Some(42)),
            sub_range(50_000, 0.2, 0, Some(42))
        );
    }

    #[test]
    fn test_seconds_to_fraction() {
        // 100 s of data at 1 kHz
        assert!((seconds_to_fraction(25.0, 100_000, 1000.0) - 0.25).abs() < 1e-12);
        assert_eq!(seconds_to_fraction(500.0, 100_000, 1000.0), 1.0);
    }
}
