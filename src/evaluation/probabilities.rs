//! Predicting a whole recording and stitching the windows together

use burn::tensor::backend::Backend;
use ndarray::{s, Array2, Array3, ArrayView2, Axis};

use crate::config::Windowing;
use crate::data::{AudioSequence, SequenceConfig};
use crate::error::{Result, TcnError};
use crate::model::TcnNetwork;
use crate::utils::{array3_to_tensor, tensor3_to_array};

/// Aligned inputs, targets and predictions of a recording
#[derive(Debug, Clone)]
pub struct StitchedPrediction {
    /// [samples, channels]
    pub x: Array2<f32>,
    /// [samples, classes]
    pub y_true: Array2<f32>,
    /// [samples, classes]
    pub y_pred: Array2<f32>,
}

/// Repeat every timestep `factor` times
fn repeat_steps(probabilities: Array3<f32>, factor: usize) -> Array3<f32> {
    if factor <= 1 {
        return probabilities;
    }
    let (batch, steps, classes) = probabilities.dim();
    Array3::from_shape_fn((batch, steps * factor, classes), |(b, t, c)| {
        probabilities[[b, t / factor, c]]
    })
}

/// Class probabilities for every sample of `x` covered by a window
///
/// Windows are cut sequentially with the training stride. In sequence mode
/// the `data_padding` edges of each window are dropped and the remaining
/// centres tile the recording; in classification mode every window yields
/// the prediction for the sample at `y_offset`. `x` and `y` are cropped to
/// the samples that received a prediction.
pub fn evaluate_probabilities<'a, B: Backend>(
    model: &TcnNetwork<B>,
    x: ArrayView2<'a, f32>,
    y: ArrayView2<'a, f32>,
    nb_hist: usize,
    windowing: Windowing,
    batch_size: usize,
    device: &B::Device,
) -> Result<StitchedPrediction> {
    let sequence = AudioSequence::new(
        x,
        y,
        SequenceConfig::sequential(batch_size, nb_hist, windowing),
    )?;
    if sequence.windows().is_empty() {
        return Err(TcnError::ShapeMismatch {
            context: "evaluation".to_string(),
            detail: format!("{} samples are fewer than nb_hist={}", x.nrows(), nb_hist),
        });
    }

    let (keep, offset) = if windowing.return_sequences {
        let pad = windowing.data_padding;
        (pad..nb_hist - pad, pad)
    } else {
        (0..1, windowing.y_offset)
    };

    let mut pieces = Vec::new();
    for starts in sequence.windows().chunks(batch_size) {
        let batch = sequence.collect_windows(starts);
        let output = tensor3_to_array(model.forward(array3_to_tensor(&batch.x, device)))?;
        let steps = output.dim().1;
        let output = if windowing.return_sequences && steps < nb_hist {
            repeat_steps(output, nb_hist / steps)
        } else {
            output
        };
        for window in output.outer_iter() {
            pieces.push(window.slice(s![keep.clone(), ..]).to_owned());
        }
    }

    let views: Vec<_> = pieces.iter().map(|p| p.view()).collect();
    let y_pred = ndarray::concatenate(Axis(0), &views).map_err(|e| TcnError::ShapeMismatch {
        context: "evaluation".to_string(),
        detail: e.to_string(),
    })?;

    let range = offset..offset + y_pred.nrows();
    Ok(StitchedPrediction {
        x: x.slice(s![range.clone(), ..]).to_owned(),
        y_true: y.slice(s![range, ..]).to_owned(),
        y_pred,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Activation, ModelKind, NetworkConfig, Padding};
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn network(return_sequences: bool, nb_pre_conv: usize, upsample: bool) -> NetworkConfig {
        NetworkConfig {
            kind: ModelKind::TcnTcn,
            nb_freq: 1,
            nb_classes: 3,
            nb_hist: 16,
            nb_filters: 4,
            kernel_size: 2,
            nb_conv: 1,
            dilations: vec![1, 2],
            activation: Activation::Relu,
            use_skip_connections: true,
            return_sequences,
            dropout_rate: 0.0,
            padding: Padding::Same,
            use_separable: vec![],
            nb_pre_conv,
            pre_nb_dft: 16,
            nb_lstm_units: 0,
            upsample,
        }
    }

    fn recording(samples: usize) -> (Array2<f32>, Array2<f32>) {
        let x = Array2::from_shape_fn((samples, 1), |(i, _)| i as f32 / samples as f32);
        let y = Array2::from_shape_fn((samples, 3), |(i, c)| (i % 3 == c) as u8 as f32);
        (x, y)
    }

    fn sequence_windowing(pad: usize) -> Windowing {
        Windowing {
            stride: 16 - 2 * pad,
            data_padding: pad,
            y_offset: 0,
            return_sequences: true,
            temporal_weights: true,
            output_stride: 1,
        }
    }

    #[test]
    fn test_stitching_drops_padding() {
        let device = Default::default();
        let model = network(true, 0, true).init::<TestBackend>(&device);
        let (x, y) = recording(100);

        // stride 12: windows at 0, 12, ..., 84 -> 8 windows x 12 kept samples
        let out = evaluate_probabilities(&model, x.view(), y.view(), 16, sequence_windowing(2), 3, &device)
            .unwrap();
        assert_eq!(out.y_pred.dim(), (96, 3));
        assert_eq!(out.y_true.nrows(), 96);
        assert_eq!(out.x[[0, 0]], x[[2, 0]]);
        assert_eq!(out.y_true.row(0), y.row(2));
    }

    #[test]
    fn test_downsampled_output_is_repeated() {
        let device = Default::default();
        let model = network(true, 2, false).init::<TestBackend>(&device);
        let (x, y) = recording(64);
        let out = evaluate_probabilities(&model, x.view(), y.view(), 16, sequence_windowing(0), 2, &device)
            .unwrap();
        assert_eq!(out.y_pred.dim(), (64, 3));
        // steps 0..4 come from the same downsampled output step
        assert_eq!(out.y_pred.row(0), out.y_pred.row(3));
    }

    #[test]
    fn test_classification_mode() {
        let device = Default::default();
        let model = network(false, 0, true).init::<TestBackend>(&device);
        let (x, y) = recording(40);
        let windowing = Windowing {
            stride: 1,
            data_padding: 0,
            y_offset: 8,
            return_sequences: false,
            temporal_weights: false,
            output_stride: 1,
        };
        let out = evaluate_probabilities(&model, x.view(), y.view(), 16, windowing, 4, &device).unwrap();
        // windows 0..=24
        assert_eq!(out.y_pred.nrows(), 25);
        assert_eq!(out.y_true.row(0), y.row(8));
    }

    #[test]
    fn test_short_recording_is_rejected() {
        let device = Default::default();
        let model = network(true, 0, true).init::<TestBackend>(&device);
        let (x, y) = recording(10);
        assert!(
            evaluate_probabilities(&model, x.view(), y.view(), 16, sequence_windowing(2), 2, &device)
                .is_err()
        );
    }
}
