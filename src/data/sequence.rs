//! Windowing batch generator
//!
//! Cuts a recording into (possibly overlapping) windows of `nb_hist` samples
//! and groups them into batches.
//!
//! ```text
//!  first_sample                                       last_sample
//!  |<-- nb_hist -->|
//!  |   stride  |<-- nb_hist -->|
//!  |           |   stride  |<-- nb_hist -->|
//! ```
//!
//! In sequence labelling mode the targets span the whole window and the
//! `data_padding` samples at both edges get a sample weight of zero. In
//! classification mode the target is the single sample at `y_offset`.

use std::fmt;

use ndarray::{s, Array2, Array3, ArrayView2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use super::subsample::seeded_rng;
use crate::config::Windowing;
use crate::error::{Result, TcnError};

/// Options for [`AudioSequence`]
#[derive(Debug, Clone)]
pub struct SequenceConfig {
    pub batch_size: usize,
    pub nb_hist: usize,
    pub windowing: Windowing,
    /// Shuffle windows every epoch
    pub shuffle: bool,
    /// Keep only this fraction of the batches
    pub shuffle_subset: Option<f64>,
    pub first_sample: usize,
    /// Exclusive end; the end of the data when unset
    pub last_sample: Option<usize>,
    /// Iterate the data this many times per epoch
    pub nb_repeats: usize,
    pub seed: Option<u64>,
}

impl SequenceConfig {
    /// Sequential, unshuffled iteration over all data
    pub fn sequential(batch_size: usize, nb_hist: usize, windowing: Windowing) -> Self {
        Self {
            batch_size,
            nb_hist,
            windowing,
            shuffle: false,
            shuffle_subset: None,
            first_sample: 0,
            last_sample: None,
            nb_repeats: 1,
            seed: None,
        }
    }
}

/// One batch of windows
#[derive(Debug, Clone)]
pub struct SequenceBatch {
    /// [batch, nb_hist, channels]
    pub x: Array3<f32>,
    /// [batch, nb_hist or 1, classes]
    pub y: Array3<f32>,
    /// [batch, nb_hist or 1]
    pub weights: Array2<f32>,
}

impl SequenceBatch {
    pub fn len(&self) -> usize {
        self.x.dim().0
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Batch generator over one recording
pub struct AudioSequence<'a> {
    x: ArrayView2<'a, f32>,
    y: ArrayView2<'a, f32>,
    config: SequenceConfig,
    /// Start sample of every window, in iteration order
    windows: Vec<usize>,
    rng: StdRng,
}

impl<'a> AudioSequence<'a> {
    pub fn new(
        x: ArrayView2<'a, f32>,
        y: ArrayView2<'a, f32>,
        config: SequenceConfig,
    ) -> Result<Self> {
        if x.nrows() != y.nrows() {
            return Err(TcnError::ShapeMismatch {
                context: "sequence".to_string(),
                detail: format!("x has {} samples but y has {}", x.nrows(), y.nrows()),
            });
        }
        if config.batch_size == 0 || config.nb_hist == 0 || config.windowing.stride == 0 {
            return Err(TcnError::InvalidParameter {
                name: "sequence",
                reason: "batch_size, nb_hist and stride must be > 0".to_string(),
            });
        }

        let last = config.last_sample.unwrap_or(x.nrows()).min(x.nrows());
        // the classification target must also lie inside the data
        let span = config.nb_hist.max(config.windowing.y_offset + 1);
        let windows: Vec<usize> = (config.first_sample..)
            .step_by(config.windowing.stride)
            .take_while(|start| start + span <= last)
            .collect();

        let mut sequence = Self {
            x,
            y,
            rng: seeded_rng(config.seed),
            config,
            windows,
        };

        if sequence.config.shuffle {
            sequence.windows.shuffle(&mut sequence.rng);
        }
        if let Some(fraction) = sequence.config.shuffle_subset {
            sequence.keep_random_subset(fraction);
        }
        Ok(sequence)
    }

    fn keep_random_subset(&mut self, fraction: f64) {
        let batches = self.batches_per_pass();
        let keep = ((batches as f64 * fraction) as usize).clamp(1, batches.max(1));
        self.windows.shuffle(&mut self.rng);
        self.windows.truncate(keep * self.config.batch_size);
    }

    fn batches_per_pass(&self) -> usize {
        self.windows.len() / self.config.batch_size
    }

    /// Number of full batches per epoch
    pub fn len(&self) -> usize {
        self.batches_per_pass() * self.config.nb_repeats
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start samples of all windows in iteration order
    pub fn windows(&self) -> &[usize] {
        &self.windows
    }

    pub fn config(&self) -> &SequenceConfig {
        &self.config
    }

    /// Timesteps of the targets per window
    pub fn target_len(&self) -> usize {
        if self.config.windowing.return_sequences {
            self.config.nb_hist
        } else {
            1
        }
    }

    /// Batch `index`; indices wrap around for repeated passes
    pub fn batch(&self, index: usize) -> Option<SequenceBatch> {
        let batches = self.batches_per_pass();
        if batches == 0 || index >= self.len() {
            return None;
        }
        let start = (index % batches) * self.config.batch_size;
        let starts = &self.windows[start..start + self.config.batch_size];
        Some(self.collect_windows(starts))
    }

    /// Assemble arbitrary windows into one batch
    pub fn collect_windows(&self, starts: &[usize]) -> SequenceBatch {
        let nb_hist = self.config.nb_hist;
        let target_len = self.target_len();
        let windowing = &self.config.windowing;

        let mut x = Array3::zeros((starts.len(), nb_hist, self.x.ncols()));
        let mut y = Array3::zeros((starts.len(), target_len, self.y.ncols()));
        let mut weights = Array2::ones((starts.len(), target_len));

        for (idx, &window_start) in starts.iter().enumerate() {
            x.slice_mut(s![idx, .., ..])
                .assign(&self.x.slice(s![window_start..window_start + nb_hist, ..]));

            if windowing.return_sequences {
                y.slice_mut(s![idx, .., ..])
                    .assign(&self.y.slice(s![window_start..window_start + nb_hist, ..]));
            } else {
                let target = window_start + windowing.y_offset;
                y.slice_mut(s![idx, 0, ..]).assign(&self.y.row(target));
            }
        }

        let pad = windowing.data_padding.min(target_len / 2);
        if windowing.temporal_weights && pad > 0 {
            weights.slice_mut(s![.., ..pad]).fill(0.0);
            weights.slice_mut(s![.., target_len - pad..]).fill(0.0);
        }

        SequenceBatch { x, y, weights }
    }

    /// Reshuffle window order between epochs
    pub fn on_epoch_end(&mut self) {
        if self.config.shuffle {
            self.windows.shuffle(&mut self.rng);
        }
    }
}

impl fmt::Display for AudioSequence<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AudioSequence with {} batches of {} windows ({} samples, stride {}, {} channels, {} classes, shuffle={})",
            self.len(),
            self.config.batch_size,
            self.config.nb_hist,
            self.config.windowing.stride,
            self.x.ncols(),
            self.y.ncols(),
            self.config.shuffle
        )
    }
}
