//! Fit loop for the segmentation network
//!
//! Adam with gradient norm clipping, one pass over at most
//! `max_steps_per_epoch` training batches per epoch, validation loss on the
//! inner (non-autodiff) backend, then checkpointing and callbacks.

use anyhow::{bail, Result};
use burn::{
    module::AutodiffModule,
    grad_clipping::GradientClippingConfig,
    optim::{AdamConfig, GradientsParams, Optimizer},
    tensor::{backend::AutodiffBackend, backend::Backend, ElementConversion, Tensor},
};
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::{s, Array2, Array3};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::callbacks::{Callback, EpochLogs, ModelCheckpoint, TrainingControl};
use super::loss::weighted_categorical_crossentropy;
use crate::data::{AudioSequence, SequenceBatch};
use crate::model::TcnNetwork;
use crate::utils::{array2_to_tensor, array3_to_tensor, vec_to_tensor};

/// Upper bound on training batches per epoch
pub const MAX_STEPS_PER_EPOCH: usize = 1000;

/// Options of [`fit`]
#[derive(Debug, Clone)]
pub struct FitConfig {
    pub nb_epoch: usize,
    pub learning_rate: f64,
    pub max_steps_per_epoch: usize,
    /// 0 silent, 1 progress bar, 2 one line per epoch
    pub verbose: u8,
    pub class_weights: Option<Vec<f32>>,
    /// Gradient norm clipping threshold
    pub clip_norm: f32,
}

impl FitConfig {
    pub fn new(nb_epoch: usize, learning_rate: f64) -> Self {
        Self {
            nb_epoch,
            learning_rate,
            max_steps_per_epoch: MAX_STEPS_PER_EPOCH,
            verbose: 2,
            class_weights: None,
            clip_norm: 1.0,
        }
    }
}

/// Per-epoch metrics of a finished fit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    pub epochs: Vec<EpochLogs>,
    pub stopped_early: bool,
}

impl History {
    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    /// Epoch with the lowest monitored loss
    pub fn best(&self) -> Option<&EpochLogs> {
        self.epochs
            .iter()
            .min_by(|a, b| a.monitored().total_cmp(&b.monitored()))
    }

    pub fn losses(&self) -> Vec<f64> {
        self.epochs.iter().map(|e| e.loss).collect()
    }

    pub fn val_losses(&self) -> Vec<Option<f64>> {
        self.epochs.iter().map(|e| e.val_loss).collect()
    }
}

/// Keep every `stride`-th target step so targets line up with a downsampled output
pub fn align_targets(batch: &SequenceBatch, stride: usize) -> (Array3<f32>, Array2<f32>) {
    if stride <= 1 {
        return (batch.y.clone(), batch.weights.clone());
    }
    let step = stride as isize;
    (
        batch.y.slice(s![.., ..;step, ..]).to_owned(),
        batch.weights.slice(s![.., ..;step]).to_owned(),
    )
}

fn batch_loss<B: Backend>(
    model: &TcnNetwork<B>,
    batch: &SequenceBatch,
    output_stride: usize,
    class_weights: Option<&[f32]>,
    device: &B::Device,
) -> Tensor<B, 1> {
    let (y, weights) = align_targets(batch, output_stride);
    let probabilities = model.forward(array3_to_tensor(&batch.x, device));
    weighted_categorical_crossentropy(
        probabilities,
        array3_to_tensor(&y, device),
        array2_to_tensor(&weights, device),
        class_weights.map(|w| vec_to_tensor(w, device)),
    )
}

/// Mean loss over all batches of `sequence` without gradient tracking
pub fn evaluate_loss<B: Backend>(
    model: &TcnNetwork<B>,
    sequence: &AudioSequence,
    class_weights: Option<&[f32]>,
    device: &B::Device,
) -> Option<f64> {
    let output_stride = sequence.config().windowing.output_stride;
    let mut total = 0.0;
    let mut count = 0;
    for index in 0..sequence.len() {
        if let Some(batch) = sequence.batch(index) {
            let loss = batch_loss(model, &batch, output_stride, class_weights, device);
            total += loss.into_scalar().elem::<f64>();
            count += 1;
        }
    }
    (count > 0).then(|| total / count as f64)
}

fn progress_bar(steps: usize, epoch: usize, nb_epoch: usize) -> ProgressBar {
    let pb = ProgressBar::new(steps as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{prefix} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_prefix(format!("Epoch {}/{}", epoch + 1, nb_epoch));
    pb
}

/// Train `model` on `train`, monitoring `val`
///
/// Returns the model after the last epoch. When a checkpoint is given the
/// best weights are on disk and can be restored with
/// [`ModelCheckpoint::restore`].
pub fn fit<B: AutodiffBackend>(
    mut model: TcnNetwork<B>,
    train: &mut AudioSequence,
    val: Option<&AudioSequence>,
    config: &FitConfig,
    callbacks: &mut [Box<dyn Callback>],
    mut checkpoint: Option<&mut ModelCheckpoint>,
    device: &B::Device,
) -> Result<(TcnNetwork<B>, History)> {
    let steps = train.len().min(config.max_steps_per_epoch);
    if steps == 0 {
        bail!("Training data yields no batches: {}", train);
    }
    info!(
        "Training for {} epochs, {} steps per epoch, learning rate {:.2e}",
        config.nb_epoch, steps, config.learning_rate
    );

    let mut optimizer = AdamConfig::new()
        .with_grad_clipping(Some(GradientClippingConfig::Norm(config.clip_norm)))
        .init();
    let class_weights = config.class_weights.as_deref();
    let output_stride = train.config().windowing.output_stride;
    let mut control = TrainingControl {
        stop: false,
        learning_rate: config.learning_rate,
    };
    let mut history = History::default();

    for epoch in 0..config.nb_epoch {
        let pb = (config.verbose == 1).then(|| progress_bar(steps, epoch, config.nb_epoch));

        let mut loss_sum = 0.0;
        for step in 0..steps {
            let Some(batch) = train.batch(step) else {
                break;
            };
            let loss = batch_loss(&model, &batch, output_stride, class_weights, device);
            let grads = GradientsParams::from_grads(loss.backward(), &model);
            loss_sum += loss.into_scalar().elem::<f64>();
            model = optimizer.step(control.learning_rate, model, grads);

            if let Some(pb) = &pb {
                pb.set_message(format!("loss={:.4}", loss_sum / (step + 1) as f64));
                pb.inc(1);
            }
            debug!("Epoch {} step {}: loss={:.5}", epoch + 1, step + 1, loss_sum / (step + 1) as f64);
        }
        train.on_epoch_end();

        // class weights only shape the training loss
        let val_loss = match val {
            Some(val) => evaluate_loss(&model.valid(), val, None, device),
            None => None,
        };
        let logs = EpochLogs {
            epoch,
            loss: loss_sum / steps as f64,
            val_loss,
            learning_rate: control.learning_rate,
        };

        if let Some(pb) = pb {
            pb.finish_with_message(match logs.val_loss {
                Some(v) => format!("loss={:.4} val_loss={:.4}", logs.loss, v),
                None => format!("loss={:.4}", logs.loss),
            });
        } else if config.verbose >= 2 {
            match logs.val_loss {
                Some(v) => info!(
                    "Epoch {}/{}: loss={:.5}, val_loss={:.5}",
                    epoch + 1,
                    config.nb_epoch,
                    logs.loss,
                    v
                ),
                None => info!("Epoch {}/{}: loss={:.5}", epoch + 1, config.nb_epoch, logs.loss),
            }
        }

        if let Some(checkpoint) = checkpoint.as_deref_mut() {
            checkpoint.on_epoch_end::<B, _>(&logs, &model)?;
        }
        for callback in callbacks.iter_mut() {
            callback.on_epoch_end(&logs, &mut control);
        }
        history.epochs.push(logs);

        if control.stop {
            history.stopped_early = true;
            break;
        }
    }

    for callback in callbacks.iter_mut() {
        callback.on_train_end(&history.epochs);
    }
    if let Some(best) = history.best() {
        info!(
            "Training finished after {} epochs, best epoch {} with loss {:.5}",
            history.len(),
            best.epoch + 1,
            best.monitored()
        );
    }

    Ok((model, history))
}
