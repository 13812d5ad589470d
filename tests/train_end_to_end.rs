use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::{mpsc, Arc};

use burn::backend::Autodiff;
use burn_ndarray::NdArray;
use ndarray::{Array1, Array2};
use ndarray_npy::{read_npy, write_npy};
use tempfile::TempDir;

use tcn_segmenter::data::sub_range;
use tcn_segmenter::utils::with_suffix;
use tcn_segmenter::{train, Callback, ProgressReporter, TcnError, TrainParams};

type Backend = Autodiff<NdArray<f32>>;

/// Square wave input; class 1 while the signal is high
fn write_split(dir: &Path, split: &str, samples: usize) {
    std::fs::create_dir_all(dir.join(split)).unwrap();
    let high = |i: usize| (i / 20) % 2 == 1;
    let x = Array2::<f32>::from_shape_fn((samples, 1), |(i, _)| if high(i) { 1.0 } else { 0.0 });
    let y = Array2::<f32>::from_shape_fn((samples, 2), |(i, c)| (high(i) as usize == c) as u8 as f32);
    write_npy(dir.join(split).join("x.npy"), &x).unwrap();
    write_npy(dir.join(split).join("y.npy"), &y).unwrap();
}

fn write_dataset(dir: &Path, with_test: bool) {
    write_dataset_at(dir, with_test, 1000.0);
}

fn write_dataset_at(dir: &Path, with_test: bool, samplerate_hz: f64) {
    std::fs::create_dir_all(dir).unwrap();
    let attrs = serde_json::json!({
        "samplerate_x_Hz": samplerate_hz,
        "samplerate_y_Hz": samplerate_hz,
        "class_names": ["noise", "pulse"],
        "class_types": ["segment", "segment"],
    });
    std::fs::write(dir.join("attrs.json"), attrs.to_string()).unwrap();
    write_split(dir, "train", 400);
    write_split(dir, "val", 200);
    if with_test {
        write_split(dir, "test", 150);
    }
}

fn small_params(tmp: &TempDir) -> TrainParams {
    TrainParams {
        data_dir: tmp.path().join("data"),
        save_dir: tmp.path().join("res"),
        save_prefix: Some("pulse".to_string()),
        nb_hist: 32,
        kernel_size: 2,
        nb_conv: 1,
        nb_filters: 4,
        dilations: vec![1, 2],
        batch_size: 2,
        nb_epoch: 2,
        verbose: 0,
        seed: Some(42),
        ..Default::default()
    }
}

#[test]
fn test_train_writes_all_outputs() {
    let tmp = TempDir::new().unwrap();
    write_dataset(&tmp.path().join("data"), true);
    let params = TrainParams {
        metrics_log: true,
        balance: true,
        // unreachable tracking server must not abort training
        tracking_url: Some("http://127.0.0.1:9".to_string()),
        tracking_token: Some("secret-token".to_string()),
        ..small_params(&tmp)
    };

    let outcome = train::<Backend>(&params, Vec::new(), &Default::default()).unwrap();
    let save_name = &outcome.save_name;

    assert!(save_name
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("pulse_"));
    assert_eq!(outcome.history.len(), 2);
    assert_eq!(outcome.params.windowing.stride, 28);
    assert!(outcome.params.data_hash.is_some());
    assert_eq!(outcome.params.class_weights.as_ref().map(Vec::len), Some(2));

    let params_json = std::fs::read_to_string(with_suffix(save_name, "_params.json")).unwrap();
    let params_value: serde_json::Value = serde_json::from_str(&params_json).unwrap();
    assert_eq!(params_value["nb_hist"], 32);
    assert_eq!(params_value["data_padding"], 2);
    assert_eq!(params_value["class_names"][1], "pulse");
    assert!(!params_json.contains("secret-token"));

    assert!(with_suffix(save_name, "_model.mpk").exists());
    assert!(with_suffix(save_name, "_metrics.csv").exists());
    assert!(with_suffix(save_name, "_results.json").exists());

    let results = outcome.results.expect("test split is long enough");
    assert_eq!(results.y_pred.nrows(), results.y_test.nrows());
    assert_eq!(results.labels_pred.len(), results.labels_test.len());
    assert_eq!(results.report.classes.len(), 2);

    let labels_pred: Array1<i64> =
        read_npy(with_suffix(save_name, "_results").join("labels_pred.npy")).unwrap();
    assert_eq!(labels_pred.len(), results.labels_pred.len());
}

#[test]
fn test_missing_test_split_skips_evaluation() {
    let tmp = TempDir::new().unwrap();
    write_dataset(&tmp.path().join("data"), false);
    let params = TrainParams {
        nb_epoch: 1,
        version_data: false,
        ..small_params(&tmp)
    };

    let outcome = train::<Backend>(&params, Vec::new(), &Default::default()).unwrap();
    assert!(outcome.results.is_none());
    assert!(outcome.params.data_hash.is_none());
    assert!(with_suffix(&outcome.save_name, "_params.json").exists());
    assert!(!with_suffix(&outcome.save_name, "_results.json").exists());
}

#[test]
fn test_fraction_data_trains_on_contiguous_subrange() {
    let tmp = TempDir::new().unwrap();
    write_dataset(&tmp.path().join("data"), false);
    let params = TrainParams {
        nb_epoch: 1,
        fraction_data: Some(0.5),
        ..small_params(&tmp)
    };

    let outcome = train::<Backend>(&params, Vec::new(), &Default::default()).unwrap();
    let record = &outcome.params;

    // at least nb_hist * (batch_size + 2) = 128 samples
    let (first, last) = sub_range(400, 0.5, 128, Some(42));
    assert_eq!(last - first, 200);
    assert_eq!(record.first_sample_train, first);
    assert_eq!(record.last_sample_train, Some(last));

    let (first, last) = sub_range(200, 0.5, 128, Some(42));
    assert_eq!(last - first, 128);
    assert_eq!(record.first_sample_val, first);
    assert_eq!(record.last_sample_val, Some(last));
    assert!(record.shuffle_subset.is_none());

    let params_json =
        std::fs::read_to_string(with_suffix(&outcome.save_name, "_params.json")).unwrap();
    let params_value: serde_json::Value = serde_json::from_str(&params_json).unwrap();
    assert_eq!(params_value["first_sample_val"], first);
    assert_eq!(params_value["last_sample_val"], last);
}

#[test]
fn test_seconds_with_batch_level_subsampling() {
    let tmp = TempDir::new().unwrap();
    // 400 training samples at 100 Hz are 4 seconds
    write_dataset_at(&tmp.path().join("data"), false, 100.0);
    let params = TrainParams {
        nb_epoch: 1,
        fraction_data: Some(2.0),
        batch_level_subsampling: true,
        ..small_params(&tmp)
    };

    let outcome = train::<Backend>(&params, Vec::new(), &Default::default()).unwrap();
    let record = &outcome.params;

    assert_eq!(record.first_sample_train, 0);
    assert_eq!(record.last_sample_train, None);
    assert_eq!(record.first_sample_val, 0);
    assert_eq!(record.last_sample_val, None);
    let subset = record.shuffle_subset.expect("subset fraction is recorded");
    assert!((subset - 0.5).abs() < 1e-9);
    assert_eq!(outcome.history.len(), 1);
}

#[test]
fn test_stop_flag_ends_training() {
    let tmp = TempDir::new().unwrap();
    write_dataset(&tmp.path().join("data"), false);
    let params = TrainParams {
        nb_epoch: 5,
        ..small_params(&tmp)
    };

    let (tx, rx) = mpsc::channel();
    let stop = Arc::new(AtomicBool::new(true));
    let callbacks: Vec<Box<dyn Callback>> =
        vec![Box::new(ProgressReporter::new(params.nb_epoch, tx, stop))];

    let outcome = train::<Backend>(&params, callbacks, &Default::default()).unwrap();
    assert_eq!(outcome.history.len(), 1);
    assert!(outcome.history.stopped_early);
    assert_eq!(rx.try_recv().unwrap().epoch, 1);
}

#[test]
fn test_invalid_stride_is_rejected_before_loading() {
    let tmp = TempDir::new().unwrap();
    let params = TrainParams {
        nb_hist: 64,
        kernel_size: 16,
        nb_conv: 3,
        ..small_params(&tmp)
    };

    let err = train::<Backend>(&params, Vec::new(), &Default::default())
        .err()
        .expect("stride must be rejected");
    assert!(matches!(
        err.downcast_ref::<TcnError>(),
        Some(TcnError::InvalidStride { stride: -32 })
    ));
}
