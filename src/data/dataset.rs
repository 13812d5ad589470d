//! Dataset container and the npy directory loader.
//!
//! Layout of a dataset directory:
//! ```text
//! DATA_DIR/attrs.json
//! DATA_DIR/train/x.npy   [samples, channels]
//! DATA_DIR/train/y.npy   [samples, classes]
//! DATA_DIR/val/...
//! DATA_DIR/test/...      (optional)
//! ```

use std::fs::File;
use std::path::{Path, PathBuf};

use ndarray::{Array2, Axis};
use ndarray_npy::read_npy;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, TcnError};

/// Metadata stored alongside the arrays
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetAttrs {
    #[serde(rename = "samplerate_x_Hz", alias = "samplerate_x_hz")]
    pub samplerate_x_hz: f64,
    #[serde(rename = "samplerate_y_Hz", alias = "samplerate_y_hz")]
    pub samplerate_y_hz: f64,
    /// Index 0 is the noise/background class
    pub class_names: Vec<String>,
    /// `segment` or `event` per class
    #[serde(default)]
    pub class_types: Vec<String>,
}

/// Inputs and targets of one split
#[derive(Debug, Clone)]
pub struct Split {
    /// [samples, channels]
    pub x: Array2<f32>,
    /// [samples, classes], one-hot or class probabilities
    pub y: Array2<f32>,
}

impl Split {
    /// Pair inputs with targets, checking that they cover the same samples
    pub fn new(x: Array2<f32>, y: Array2<f32>) -> Result<Self> {
        if x.nrows() != y.nrows() {
            return Err(TcnError::ShapeMismatch {
                context: "split".to_string(),
                detail: format!("x has {} samples but y has {}", x.nrows(), y.nrows()),
            });
        }
        Ok(Self { x, y })
    }

    /// Split without samples
    pub fn empty(nb_channels: usize, nb_classes: usize) -> Self {
        Self {
            x: Array2::zeros((0, nb_channels)),
            y: Array2::zeros((0, nb_classes)),
        }
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.x.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.x.nrows() == 0
    }

    /// Number of input channels
    pub fn nb_channels(&self) -> usize {
        self.x.ncols()
    }

    /// Duration in seconds at the given sample rate
    pub fn duration_seconds(&self, samplerate_hz: f64) -> f64 {
        self.len() as f64 / samplerate_hz
    }
}

/// Train/val/test splits plus metadata
#[derive(Debug, Clone)]
pub struct Dataset {
    pub train: Split,
    pub val: Split,
    pub test: Split,
    pub attrs: DatasetAttrs,
}

impl Dataset {
    /// Number of classes according to the metadata
    pub fn nb_classes(&self) -> usize {
        self.attrs.class_names.len()
    }

    /// Check that all splits agree with each other and with the class list
    pub fn validate(&self) -> Result<()> {
        let nb_channels = self.train.nb_channels();
        let nb_classes = self.nb_classes();
        if nb_classes == 0 {
            return Err(TcnError::InvalidParameter {
                name: "class_names",
                reason: "dataset attributes list no classes".to_string(),
            });
        }

        for (name, split) in [("train", &self.train), ("val", &self.val), ("test", &self.test)] {
            if split.is_empty() && name == "test" {
                continue;
            }
            if split.nb_channels() != nb_channels {
                return Err(TcnError::ShapeMismatch {
                    context: format!("{name} split"),
                    detail: format!(
                        "{} channels but train has {}",
                        split.nb_channels(),
                        nb_channels
                    ),
                });
            }
            if split.y.ncols() != nb_classes {
                return Err(TcnError::ShapeMismatch {
                    context: format!("{name} split"),
                    detail: format!(
                        "y has {} columns but there are {} class names",
                        split.y.ncols(),
                        nb_classes
                    ),
                });
            }
        }
        Ok(())
    }
}

fn split_file(dir: &Path, split: &str, stem: &str, suffix: &str) -> PathBuf {
    dir.join(split).join(format!("{stem}{suffix}.npy"))
}

fn read_array(path: &Path) -> Result<Array2<f32>> {
    if !path.exists() {
        return Err(TcnError::MissingFile(path.to_path_buf()));
    }
    read_npy(path).map_err(|source| TcnError::ReadNpy {
        path: path.to_path_buf(),
        source,
    })
}

fn load_split(dir: &Path, split: &str, x_suffix: &str, y_suffix: &str) -> Result<Split> {
    let x = read_array(&split_file(dir, split, "x", x_suffix))?;
    let y = read_array(&split_file(dir, split, "y", y_suffix))?;
    debug!("Loaded {} split: x {:?}, y {:?}", split, x.dim(), y.dim());
    Split::new(x, y)
}

/// Load a dataset from an npy directory
///
/// The test split is optional; without it the returned test split is empty.
pub fn load<P: AsRef<Path>>(data_dir: P, x_suffix: &str, y_suffix: &str) -> Result<Dataset> {
    let dir = data_dir.as_ref();

    let attrs_path = dir.join("attrs.json");
    if !attrs_path.exists() {
        return Err(TcnError::MissingFile(attrs_path));
    }
    let attrs: DatasetAttrs = serde_json::from_reader(File::open(&attrs_path)?)?;

    let train = load_split(dir, "train", x_suffix, y_suffix)?;
    let val = load_split(dir, "val", x_suffix, y_suffix)?;
    let test = if split_file(dir, "test", "x", x_suffix).exists() {
        load_split(dir, "test", x_suffix, y_suffix)?
    } else {
        warn!("No test split in {}", dir.display());
        Split::empty(train.nb_channels(), attrs.class_names.len())
    };

    let dataset = Dataset {
        train,
        val,
        test,
        attrs,
    };
    dataset.validate()?;
    Ok(dataset)
}

/// Class index with the highest target value for every sample
pub fn labels_from_targets(y: &Array2<f32>) -> Vec<usize> {
    y.axis_iter(Axis(0))
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |best, (idx, &value)| {
                    if value > best.1 {
                        (idx, value)
                    } else {
                        best
                    }
                })
                .0
        })
        .collect()
}

/// Weights inversely proportional to class frequencies
///
/// Computed as `n_samples / (n_classes * count)` over the argmax labels of `y`.
/// Classes absent from `y` get weight 1.
pub fn class_weights_balanced(y: &Array2<f32>) -> Vec<f32> {
    let nb_classes = y.ncols();
    let labels = labels_from_targets(y);
    let mut counts = vec![0usize; nb_classes];
    for label in &labels {
        counts[*label] += 1;
    }

    let present = counts.iter().filter(|&&c| c > 0).count();
    let total = labels.len() as f32;
    counts
        .iter()
        .map(|&count| {
            if count > 0 {
                total / (present as f32 * count as f32)
            } else {
                1.0
            }
        })
        .collect()
}
