//! Hooks run at the end of every epoch
//!
//! - `EarlyStopping` - stop when the monitored loss stops improving
//! - `ReduceLrOnPlateau` - shrink the learning rate on a plateau
//! - `ModelCheckpoint` - keep the weights of the best epoch on disk
//! - `ProgressReporter` - forward progress to another thread, which can stop training
//! - `MetricsLog` - append per-epoch metrics to a CSV file

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use anyhow::{Context, Result};
use burn::{
    module::Module,
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
    tensor::backend::Backend,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::evaluation::ClassificationReport;

/// Recorder used for checkpoints
pub type CheckpointRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;

/// Metrics of one finished epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochLogs {
    /// Zero-based
    pub epoch: usize,
    pub loss: f64,
    pub val_loss: Option<f64>,
    pub learning_rate: f64,
}

impl EpochLogs {
    /// Validation loss when available, training loss otherwise
    pub fn monitored(&self) -> f64 {
        self.val_loss.unwrap_or(self.loss)
    }
}

/// Knobs callbacks may turn between epochs
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingControl {
    pub stop: bool,
    pub learning_rate: f64,
}

/// Observer of the fit loop
pub trait Callback {
    fn name(&self) -> &'static str;

    fn on_epoch_end(&mut self, logs: &EpochLogs, control: &mut TrainingControl);

    fn on_train_end(&mut self, _history: &[EpochLogs]) {}

    fn on_test_end(&mut self, _report: &ClassificationReport) {}
}

/// Stop training once the monitored loss has not improved for `patience` epochs
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    min_delta: f64,
    best: f64,
    wait: usize,
    stopped_epoch: Option<usize>,
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            min_delta: 0.0,
            best: f64::INFINITY,
            wait: 0,
            stopped_epoch: None,
        }
    }

    pub fn stopped_epoch(&self) -> Option<usize> {
        self.stopped_epoch
    }
}

impl Callback for EarlyStopping {
    fn name(&self) -> &'static str {
        "early_stopping"
    }

    fn on_epoch_end(&mut self, logs: &EpochLogs, control: &mut TrainingControl) {
        let current = logs.monitored();
        if current < self.best - self.min_delta {
            self.best = current;
            self.wait = 0;
            return;
        }

        self.wait += 1;
        if self.wait >= self.patience {
            self.stopped_epoch = Some(logs.epoch);
            control.stop = true;
            info!("Epoch {}: early stopping", logs.epoch + 1);
        }
    }
}

/// Multiply the learning rate by `factor` after `patience` epochs without improvement
#[derive(Debug, Clone)]
pub struct ReduceLrOnPlateau {
    patience: usize,
    factor: f64,
    min_delta: f64,
    min_lr: f64,
    best: f64,
    wait: usize,
}

impl ReduceLrOnPlateau {
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            factor: 0.1,
            min_delta: 1e-4,
            min_lr: 0.0,
            best: f64::INFINITY,
            wait: 0,
        }
    }

    pub fn with_factor(mut self, factor: f64) -> Self {
        self.factor = factor;
        self
    }

    pub fn with_min_lr(mut self, min_lr: f64) -> Self {
        self.min_lr = min_lr;
        self
    }
}

impl Callback for ReduceLrOnPlateau {
    fn name(&self) -> &'static str {
        "reduce_lr_on_plateau"
    }

    fn on_epoch_end(&mut self, logs: &EpochLogs, control: &mut TrainingControl) {
        let current = logs.monitored();
        if current < self.best - self.min_delta {
            self.best = current;
            self.wait = 0;
            return;
        }

        self.wait += 1;
        if self.wait >= self.patience && control.learning_rate > self.min_lr {
            let reduced = (control.learning_rate * self.factor).max(self.min_lr);
            info!(
                "Epoch {}: reducing learning rate to {:.3e}",
                logs.epoch + 1,
                reduced
            );
            control.learning_rate = reduced;
            self.wait = 0;
        }
    }
}

/// Save the model whenever the monitored loss improves
#[derive(Debug, Clone)]
pub struct ModelCheckpoint {
    path: PathBuf,
    best: f64,
    saved: bool,
}

impl ModelCheckpoint {
    /// `path` without extension; the recorder appends `.mpk`
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            best: f64::INFINITY,
            saved: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A checkpoint has been written during this run
    pub fn has_checkpoint(&self) -> bool {
        self.saved
    }

    pub fn best(&self) -> f64 {
        self.best
    }

    /// Returns whether the model was saved
    pub fn on_epoch_end<B: Backend, M: Module<B>>(
        &mut self,
        logs: &EpochLogs,
        model: &M,
    ) -> Result<bool> {
        let current = logs.monitored();
        if current >= self.best {
            return Ok(false);
        }

        info!(
            "Epoch {}: loss improved from {:.5} to {:.5}, saving model to {}",
            logs.epoch + 1,
            self.best,
            current,
            self.path.display()
        );
        model
            .clone()
            .save_file(&self.path, &CheckpointRecorder::new())
            .with_context(|| format!("Failed to save checkpoint {}", self.path.display()))?;
        self.best = current;
        self.saved = true;
        Ok(true)
    }

    /// Load the best weights into `model`
    pub fn restore<B: Backend, M: Module<B>>(&self, model: M, device: &B::Device) -> Result<M> {
        model
            .load_file(&self.path, &CheckpointRecorder::new(), device)
            .with_context(|| format!("Failed to load checkpoint {}", self.path.display()))
    }
}

/// Progress message sent to an observer
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    /// One-based
    pub epoch: usize,
    pub nb_epoch: usize,
    pub loss: f64,
    pub val_loss: Option<f64>,
}

/// Report progress over a channel; setting `stop` ends training after the current epoch
pub struct ProgressReporter {
    nb_epoch: usize,
    sender: Sender<ProgressUpdate>,
    stop: Arc<AtomicBool>,
}

impl ProgressReporter {
    pub fn new(nb_epoch: usize, sender: Sender<ProgressUpdate>, stop: Arc<AtomicBool>) -> Self {
        Self {
            nb_epoch,
            sender,
            stop,
        }
    }
}

impl Callback for ProgressReporter {
    fn name(&self) -> &'static str {
        "progress"
    }

    fn on_epoch_end(&mut self, logs: &EpochLogs, control: &mut TrainingControl) {
        let update = ProgressUpdate {
            epoch: logs.epoch + 1,
            nb_epoch: self.nb_epoch,
            loss: logs.loss,
            val_loss: logs.val_loss,
        };
        if self.sender.send(update).is_err() {
            warn!("Progress receiver is gone");
        }
        if self.stop.load(Ordering::SeqCst) {
            info!("Stop requested, ending training");
            control.stop = true;
        }
    }
}

/// Write one CSV row per epoch
pub struct MetricsLog {
    path: PathBuf,
    writer: Option<csv::Writer<std::fs::File>>,
}

impl MetricsLog {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut writer = csv::Writer::from_path(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        writer.write_record(["epoch", "loss", "val_loss", "learning_rate"])?;
        writer.flush()?;
        Ok(Self {
            path,
            writer: Some(writer),
        })
    }

    fn append(&mut self, logs: &EpochLogs) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.write_record([
                (logs.epoch + 1).to_string(),
                logs.loss.to_string(),
                logs.val_loss.map(|v| v.to_string()).unwrap_or_default(),
                logs.learning_rate.to_string(),
            ])?;
            writer.flush()?;
        }
        Ok(())
    }
}

impl Callback for MetricsLog {
    fn name(&self) -> &'static str {
        "metrics_log"
    }

    fn on_epoch_end(&mut self, logs: &EpochLogs, _control: &mut TrainingControl) {
        if let Err(e) = self.append(logs) {
            warn!(
                "Writing metrics to {} failed, disabling the log: {e:#}",
                self.path.display()
            );
            self.writer = None;
        }
    }
}
