//! Training parameters and the windowing values derived from them.

use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TcnError};
use crate::model::{Activation, Padding};

/// Timestamp format used in output file names
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// All hyperparameters accepted by the training driver
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainParams {
    /// Directory with the dataset (npy layout)
    pub data_dir: PathBuf,
    /// Select the training data by suffix (`x{suffix}.npy`)
    pub x_suffix: String,
    /// Select the training target by suffix (`y{suffix}.npy`)
    pub y_suffix: String,
    /// Directory for all training outputs
    pub save_dir: PathBuf,
    /// Prepended to the timestamp in output file names
    pub save_prefix: Option<String>,

    /// Registered architecture name
    pub model_name: String,
    /// Filters per convolution layer
    pub nb_filters: usize,
    /// Duration of the kernels in samples
    pub kernel_size: usize,
    /// Number of TCN stacks
    pub nb_conv: usize,
    /// Dilation rates of the residual blocks within a stack
    pub dilations: Vec<usize>,
    /// Per-stack flag for separable convolutions; missing entries are false
    pub use_separable: Vec<bool>,
    pub activation: Activation,
    pub padding: Padding,
    pub use_skip_connections: bool,
    pub dropout_rate: f64,
    /// Samples processed at once by the network (chunk size)
    pub nb_hist: usize,
    /// Discard predictions at chunk edges
    pub ignore_boundaries: bool,
    /// Downsampling rate exponent; adds a frontend when > 0
    pub nb_pre_conv: usize,
    /// Kernel length of the STFT frontend
    pub pre_nb_dft: usize,
    /// Recorded only; the TCN frontend shares `kernel_size`
    pub pre_kernel_size: usize,
    /// Recorded only; the TCN frontend shares `nb_filters`
    pub pre_nb_filters: usize,
    /// Recorded only; the TCN frontend depth follows `nb_pre_conv`
    pub pre_nb_conv: usize,
    /// Units of the bidirectional LSTM after the TCN; 0 disables it
    pub nb_lstm_units: usize,
    /// Restore outputs to the input sample rate after a frontend
    pub upsample: bool,
    /// Sequence labelling (true) or classification of the window center (false)
    pub with_y_hist: bool,

    /// 0 silent, 1 progress bar, 2 one line per epoch
    pub verbose: u8,
    pub batch_size: usize,
    /// Maximal number of epochs
    pub nb_epoch: usize,
    /// Falls back to the model default when unset
    pub learning_rate: Option<f64>,
    pub reduce_lr: bool,
    pub reduce_lr_patience: usize,
    /// Fraction of train/val data to use; values > 1 are seconds of training data
    pub fraction_data: Option<f64>,
    pub seed: Option<u64>,
    /// Subsample random batches instead of a contiguous chunk
    pub batch_level_subsampling: bool,
    /// Weight the loss by inverse class frequencies
    pub balance: bool,
    /// Record a hash of the dataset in the params file
    pub version_data: bool,

    /// Write per-epoch metrics to `SAVE_NAME_metrics.csv`
    pub metrics_log: bool,
    /// Endpoint of the experiment tracking service
    pub tracking_url: Option<String>,
    /// Never persisted
    #[serde(skip_serializing)]
    pub tracking_token: Option<String>,
    pub tracking_project: Option<String>,
    /// Log at info level
    pub log_messages: bool,
}

impl Default for TrainParams {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::new(),
            x_suffix: String::new(),
            y_suffix: String::new(),
            save_dir: PathBuf::from("./"),
            save_prefix: None,
            model_name: "tcn".to_string(),
            nb_filters: 16,
            kernel_size: 16,
            nb_conv: 3,
            dilations: vec![1, 2, 4, 8, 16],
            use_separable: Vec::new(),
            activation: Activation::NormRelu,
            padding: Padding::Same,
            use_skip_connections: true,
            dropout_rate: 0.0,
            nb_hist: 1024,
            ignore_boundaries: true,
            nb_pre_conv: 0,
            pre_nb_dft: 64,
            pre_kernel_size: 3,
            pre_nb_filters: 16,
            pre_nb_conv: 2,
            nb_lstm_units: 0,
            upsample: true,
            with_y_hist: true,
            verbose: 2,
            batch_size: 32,
            nb_epoch: 400,
            learning_rate: None,
            reduce_lr: false,
            reduce_lr_patience: 5,
            fraction_data: None,
            seed: None,
            batch_level_subsampling: false,
            balance: false,
            version_data: true,
            metrics_log: false,
            tracking_url: None,
            tracking_token: None,
            tracking_project: None,
            log_messages: false,
        }
    }
}

/// How recordings are cut into windows for training and evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Windowing {
    /// Hop between consecutive windows
    pub stride: usize,
    /// Samples at each window edge excluded from the loss and from stitched predictions
    pub data_padding: usize,
    /// Position of the target within the window for classification
    pub y_offset: usize,
    /// Network emits one prediction per timestep
    pub return_sequences: bool,
    /// Loss is weighted per timestep
    pub temporal_weights: bool,
    /// Output samples per input sample after upsampling
    pub output_stride: usize,
}

impl TrainParams {
    /// Load parameters from a JSON file; missing fields take their defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Ok(serde_json::from_reader(file)?)
    }

    /// Derive the windowing scheme, rejecting non-positive strides
    pub fn windowing(&self) -> Result<Windowing> {
        let windowing = if self.with_y_hist {
            let data_padding = if self.ignore_boundaries {
                self.kernel_size * self.nb_conv
            } else {
                0
            };
            let stride = self.nb_hist as i64 - 2 * data_padding as i64;
            if stride <= 0 {
                return Err(TcnError::InvalidStride { stride });
            }
            Windowing {
                stride: stride as usize,
                data_padding,
                y_offset: 0,
                return_sequences: true,
                temporal_weights: true,
                output_stride: 1,
            }
        } else {
            Windowing {
                stride: 1,
                data_padding: 0,
                y_offset: (self.nb_hist as f64 / 2.0).round_ties_even() as usize,
                return_sequences: false,
                temporal_weights: false,
                output_stride: 1,
            }
        };
        Ok(windowing)
    }

    /// Check parameter ranges and the derived windowing
    pub fn validate(&self) -> Result<Windowing> {
        fn positive(name: &'static str, value: usize) -> Result<()> {
            if value == 0 {
                return Err(TcnError::InvalidParameter {
                    name,
                    reason: "must be > 0".to_string(),
                });
            }
            Ok(())
        }

        positive("nb_hist", self.nb_hist)?;
        positive("batch_size", self.batch_size)?;
        positive("nb_filters", self.nb_filters)?;
        positive("kernel_size", self.kernel_size)?;
        positive("nb_conv", self.nb_conv)?;

        if self.dilations.is_empty() || self.dilations.contains(&0) {
            return Err(TcnError::InvalidParameter {
                name: "dilations",
                reason: "needs at least one dilation and all must be > 0".to_string(),
            });
        }
        if !(0.0..1.0).contains(&self.dropout_rate) {
            return Err(TcnError::InvalidParameter {
                name: "dropout_rate",
                reason: format!("{} is outside [0, 1)", self.dropout_rate),
            });
        }
        if let Some(fraction) = self.fraction_data {
            if fraction <= 0.0 {
                return Err(TcnError::InvalidParameter {
                    name: "fraction_data",
                    reason: format!("{fraction} must be > 0"),
                });
            }
        }
        if self.nb_pre_conv > 0 && self.model_name != "tcn_tcn" {
            positive("pre_nb_dft", self.pre_nb_dft)?;
        }

        self.windowing()
    }

    /// Output path stem for this run
    pub fn save_name<Tz: TimeZone>(&self, started: &DateTime<Tz>) -> PathBuf
    where
        Tz::Offset: std::fmt::Display,
    {
        save_name(&self.save_dir, self.save_prefix.as_deref(), started)
    }
}

/// `SAVE_DIR/PREFIX_TIMESTAMP`, or `SAVE_DIR/TIMESTAMP` without a prefix
pub fn save_name<Tz: TimeZone>(
    save_dir: &Path,
    save_prefix: Option<&str>,
    started: &DateTime<Tz>,
) -> PathBuf
where
    Tz::Offset: std::fmt::Display,
{
    let stamp = started.format(TIMESTAMP_FORMAT).to_string();
    let file_stem = match save_prefix {
        Some(prefix) if !prefix.is_empty() => format!("{prefix}_{stamp}"),
        _ => stamp,
    };
    save_dir.join(file_stem)
}
