//! Run configuration
//!
//! - `TrainParams` - hyperparameters accepted by the training driver
//! - `Windowing` - stride/padding derived from them
//! - `ParamsRecord` - everything persisted in the params file of a run

mod params;

use serde::{Deserialize, Serialize};

use crate::data::DatasetAttrs;

pub use params::{save_name, TrainParams, Windowing, TIMESTAMP_FORMAT};

/// Parameters of a run as written to `SAVE_NAME_params.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamsRecord {
    #[serde(flatten)]
    pub params: TrainParams,
    #[serde(flatten)]
    pub windowing: Windowing,
    #[serde(flatten)]
    pub attrs: DatasetAttrs,
    pub effective_learning_rate: f64,
    pub nb_freq: usize,
    pub nb_channels: usize,
    pub nb_classes: usize,
    pub first_sample_train: usize,
    pub last_sample_train: Option<usize>,
    pub first_sample_val: usize,
    pub last_sample_val: Option<usize>,
    /// Fraction of windows drawn per epoch with batch-level subsampling
    pub shuffle_subset: Option<f64>,
    pub data_hash: Option<String>,
    pub class_weights: Option<Vec<f32>>,
}
