//! End-to-end training run
//!
//! ```text
//! params -> windowing -> dataset -> generators -> network
//!        -> SAVE_NAME_params.json -> fit (checkpoint SAVE_NAME_model.mpk)
//!        -> best weights -> test predictions -> SAVE_NAME_results.json
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use burn::{module::AutodiffModule, tensor::backend::AutodiffBackend};
use chrono::Local;
use tracing::{error, info, warn};

use crate::config::{ParamsRecord, TrainParams};
use crate::data::{
    class_weights_balanced, hash_data, labels_from_targets, load, seconds_to_fraction, sub_range,
    AudioSequence, SequenceConfig,
};
use crate::evaluation::{
    evaluate_probabilities, evaluate_segments, labels_from_probabilities, ResultsBundle,
};
use crate::model::{NetworkConfig, TcnNetwork};
use crate::training::{
    fit, Callback, EarlyStopping, FitConfig, History, MetricsLog, ModelCheckpoint,
    ReduceLrOnPlateau, RemoteTracker,
};
use crate::utils::{ensure_dir, save_json, with_suffix};

/// Epochs without `val_loss` improvement before training stops
pub const EARLY_STOPPING_PATIENCE: usize = 20;

/// What a finished run produced
pub struct TrainOutcome<B: AutodiffBackend> {
    /// Output path stem shared by all files of the run
    pub save_name: PathBuf,
    pub params: ParamsRecord,
    pub network: NetworkConfig,
    pub history: History,
    /// Best checkpoint when one was written, the final weights otherwise
    pub model: TcnNetwork<B>,
    /// Absent when the test split is shorter than `nb_hist`
    pub results: Option<ResultsBundle>,
}

/// Train a network as described by `params` and evaluate it on the test split
///
/// Progress is reported through `tracing`; install a subscriber first, e.g.
/// with [`setup_logging`](crate::utils::setup_logging), to see it.
///
/// `extra_callbacks` run after the built-in ones, e.g. a
/// [`ProgressReporter`](crate::training::ProgressReporter) driven by a UI thread.
pub fn train<B: AutodiffBackend>(
    params: &TrainParams,
    mut extra_callbacks: Vec<Box<dyn Callback>>,
    device: &B::Device,
) -> Result<TrainOutcome<B>> {
    let mut windowing = params.validate()?;

    info!("Loading data from {}", params.data_dir.display());
    let dataset = load(&params.data_dir, &params.x_suffix, &params.y_suffix)
        .with_context(|| format!("Failed to load dataset from {}", params.data_dir.display()))?;

    let data_hash = if params.version_data {
        let hash = hash_data(&params.data_dir)?;
        info!("Version of the data: SHA-256 of {} is {}", params.data_dir.display(), hash);
        Some(hash)
    } else {
        None
    };

    let fraction_data = params.fraction_data.map(|fraction| {
        if fraction > 1.0 {
            let converted = seconds_to_fraction(
                fraction,
                dataset.train.len(),
                dataset.attrs.samplerate_x_hz,
            );
            info!("{fraction} seconds corresponds to {converted:.4} of the training data");
            converted
        } else {
            info!("Using {fraction:.4} of the training and validation data");
            fraction
        }
    });

    let ((first_sample_train, last_sample_train), (first_sample_val, last_sample_val)) =
        match fraction_data {
            Some(fraction) if !params.batch_level_subsampling => {
                // at least one full batch
                let min_nb_samples = params.nb_hist * (params.batch_size + 2);
                let (first_train, last_train) =
                    sub_range(dataset.train.len(), fraction, min_nb_samples, params.seed);
                let (first_val, last_val) =
                    sub_range(dataset.val.len(), fraction, min_nb_samples, params.seed);
                ((first_train, Some(last_train)), (first_val, Some(last_val)))
            }
            _ => ((0, None), (0, None)),
        };
    let shuffle_subset = fraction_data.filter(|_| params.batch_level_subsampling);

    let nb_freq = dataset.train.nb_channels();
    let nb_classes = dataset.nb_classes();

    let class_weights = params.balance.then(|| {
        let weights = class_weights_balanced(&dataset.train.y);
        info!("Balancing classes: {:?}", weights);
        weights
    });

    let network = NetworkConfig::from_params(params, &windowing, nb_freq, nb_classes)?;
    if windowing.return_sequences {
        windowing.output_stride = params.nb_hist / network.output_len();
    }
    let learning_rate = params
        .learning_rate
        .unwrap_or_else(|| network.kind.default_learning_rate());

    let mut train_gen = AudioSequence::new(
        dataset.train.x.view(),
        dataset.train.y.view(),
        SequenceConfig {
            batch_size: params.batch_size,
            nb_hist: params.nb_hist,
            windowing,
            shuffle: true,
            shuffle_subset,
            first_sample: first_sample_train,
            last_sample: last_sample_train,
            nb_repeats: 1,
            seed: params.seed,
        },
    )?;
    let val_gen = AudioSequence::new(
        dataset.val.x.view(),
        dataset.val.y.view(),
        SequenceConfig {
            batch_size: params.batch_size,
            nb_hist: params.nb_hist,
            windowing,
            shuffle: false,
            shuffle_subset,
            first_sample: first_sample_val,
            last_sample: last_sample_val,
            nb_repeats: 1,
            seed: params.seed,
        },
    )?;
    info!("Training data: {}", train_gen);
    info!("Validation data: {}", val_gen);

    if let Some(seed) = params.seed {
        B::seed(seed);
    }
    info!("Building network {}", network.kind);
    let model = network.init::<B>(device);

    ensure_dir(&params.save_dir)?;
    let save_name = params.save_name(&Local::now());
    info!("Will save to {}", save_name.display());

    let record = ParamsRecord {
        params: params.clone(),
        windowing,
        attrs: dataset.attrs.clone(),
        effective_learning_rate: learning_rate,
        nb_freq,
        nb_channels: nb_freq,
        nb_classes,
        first_sample_train,
        last_sample_train,
        first_sample_val,
        last_sample_val,
        shuffle_subset,
        data_hash,
        class_weights: class_weights.clone(),
    };
    save_json(&record, with_suffix(&save_name, "_params.json"))?;

    let mut checkpoint = ModelCheckpoint::new(with_suffix(&save_name, "_model"));
    let mut callbacks: Vec<Box<dyn Callback>> =
        vec![Box::new(EarlyStopping::new(EARLY_STOPPING_PATIENCE))];
    if params.reduce_lr {
        callbacks.push(Box::new(ReduceLrOnPlateau::new(params.reduce_lr_patience)));
    }
    if params.metrics_log {
        match MetricsLog::create(with_suffix(&save_name, "_metrics.csv")) {
            Ok(log) => callbacks.push(Box::new(log)),
            Err(e) => warn!("Metrics log disabled: {e:#}"),
        }
    }
    if let Some(url) = &params.tracking_url {
        let run_name = save_name
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match serde_json::to_value(&record)
            .map_err(anyhow::Error::from)
            .and_then(|value| {
                RemoteTracker::connect(
                    url,
                    params.tracking_token.as_deref(),
                    params.tracking_project.as_deref(),
                    &run_name,
                    &value,
                )
            }) {
            Ok(tracker) => callbacks.push(Box::new(tracker)),
            Err(e) => error!("Experiment tracking failed, continuing without it: {e:#}"),
        }
    }
    callbacks.append(&mut extra_callbacks);

    info!("Start training");
    let fit_config = FitConfig {
        verbose: params.verbose,
        class_weights: class_weights.clone(),
        ..FitConfig::new(params.nb_epoch, learning_rate)
    };
    let (model, history) = fit(
        model,
        &mut train_gen,
        Some(&val_gen),
        &fit_config,
        &mut callbacks,
        Some(&mut checkpoint),
        device,
    )?;

    let model = if checkpoint.has_checkpoint() {
        info!("Re-loading best model from {}", checkpoint.path().display());
        checkpoint.restore::<B, _>(model, device)?
    } else {
        model
    };

    if dataset.test.len() < params.nb_hist {
        info!("No test data - skipping final evaluation step");
        return Ok(TrainOutcome {
            save_name,
            params: record,
            network,
            history,
            model,
            results: None,
        });
    }

    info!("Predicting");
    let prediction = evaluate_probabilities(
        &model.valid(),
        dataset.test.x.view(),
        dataset.test.y.view(),
        params.nb_hist,
        windowing,
        params.batch_size,
        device,
    )?;
    let labels_test = labels_from_targets(&prediction.y_true);
    let labels_pred = labels_from_probabilities(&prediction.y_pred, None);

    info!("Evaluating");
    let (confusion_matrix, report) =
        evaluate_segments(&labels_test, &labels_pred, &dataset.attrs.class_names)?;
    info!("Confusion matrix:\n{}", confusion_matrix);
    info!("Classification report:\n{}", report);
    for callback in callbacks.iter_mut() {
        callback.on_test_end(&report);
    }

    let results = ResultsBundle {
        history: history.clone(),
        confusion_matrix,
        report,
        params: record.clone(),
        x_test: prediction.x,
        y_test: prediction.y_true,
        y_pred: prediction.y_pred,
        labels_test,
        labels_pred,
    };
    let results_path = results.save(&save_name)?;
    info!("Saved results to {}", results_path.display());
    info!("DONE");

    Ok(TrainOutcome {
        save_name,
        params: record,
        network,
        history,
        model,
        results: Some(results),
    })
}
