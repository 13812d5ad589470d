//! # TCN event segmentation
//!
//! Temporal Convolutional Networks for labelling events in multi-channel
//! time-series recordings (audio, sensor data), built on `burn`.
//!
//! ## Modules
//!
//! - `config`: training parameters, windowing and the persisted params record
//! - `data`: npy dataset loading, windowing batch generator, subsampling, data hashing
//! - `model`: TCN blocks, STFT and TCN frontends, the model registry
//! - `training`: loss, fit loop, callbacks, experiment tracking
//! - `evaluation`: stitched test predictions, confusion matrix, classification report
//! - `pipeline`: the end-to-end training run
//! - `utils`: logging, file and tensor helpers
//!
//! ## Example
//!
//! ```no_run
//! use burn::backend::Autodiff;
//! use burn_ndarray::NdArray;
//! use tcn_segmenter::{train, TrainParams};
//!
//! fn main() -> anyhow::Result<()> {
//!     let params = TrainParams {
//!         data_dir: "dat/song.npy".into(),
//!         save_dir: "res".into(),
//!         nb_epoch: 10,
//!         ..Default::default()
//!     };
//!     let outcome = train::<Autodiff<NdArray<f32>>>(&params, Vec::new(), &Default::default())?;
//!     println!("Saved to {}", outcome.save_name.display());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod evaluation;
pub mod model;
pub mod pipeline;
pub mod training;
pub mod utils;

pub use config::{ParamsRecord, TrainParams, Windowing};
pub use data::{AudioSequence, Dataset, DatasetAttrs, SequenceConfig};
pub use error::{Result, TcnError};
pub use evaluation::{ClassificationReport, ConfusionMatrix, ResultsBundle};
pub use model::{ModelKind, NetworkConfig, TcnNetwork};
pub use pipeline::{train, TrainOutcome};
pub use training::{Callback, EpochLogs, History, ProgressReporter, ProgressUpdate};
pub use utils::setup_logging;
