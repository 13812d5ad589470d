//! Data loading and windowing
//!
//! - `dataset` - train/val/test container and the npy loader
//! - `sequence` - windowing batch generator
//! - `subsample` - fraction-of-data selection
//! - `hash` - dataset versioning

mod dataset;
mod hash;
mod sequence;
mod subsample;

pub use dataset::{
    class_weights_balanced, labels_from_targets, load, Dataset, DatasetAttrs, Split,
};
pub use hash::hash_data;
pub use sequence::{AudioSequence, SequenceBatch, SequenceConfig};
pub use subsample::{seconds_to_fraction, seeded_rng, sub_range};
