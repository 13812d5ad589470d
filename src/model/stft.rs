//! Trainable spectrogram frontend
//!
//! A short-time Fourier transform expressed as two strided convolutions whose
//! kernels start out as Hann-windowed cosine/sine DFT bases and are updated
//! during training. Output is a decibel-scaled magnitude spectrogram.

use std::f64::consts::PI;

use burn::{
    module::{Module, Param},
    nn::{
        conv::{Conv1d, Conv1dConfig},
        PaddingConfig1d,
    },
    tensor::{backend::Backend, Tensor, TensorData},
};

use super::layers::pad_time;

const AMIN: f64 = 1e-10;
const DYNAMIC_RANGE_DB: f64 = 80.0;

/// Spectrogram frontend configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrogramConfig {
    /// Kernel length in samples
    pub n_dft: usize,
    /// Hop between frames in samples
    pub n_hop: usize,
    /// Exponent applied to the magnitude
    pub power: f64,
}

impl SpectrogramConfig {
    pub fn new(n_dft: usize, n_hop: usize) -> Self {
        Self {
            n_dft,
            n_hop,
            power: 1.0,
        }
    }

    /// Number of frequency bins per input channel
    pub fn nb_freq_bins(&self) -> usize {
        self.n_dft / 2 + 1
    }

    /// Frames produced for `nb_samples` inputs
    pub fn output_len(&self, nb_samples: usize) -> usize {
        nb_samples.div_ceil(self.n_hop)
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Spectrogram<B> {
        let (real, imag) = dft_kernels(self.n_dft);
        let bins = self.nb_freq_bins();

        let conv = |kernels: Vec<f32>| {
            let mut conv = Conv1dConfig::new(1, bins, self.n_dft)
                .with_stride(self.n_hop)
                .with_bias(false)
                .with_padding(PaddingConfig1d::Valid)
                .init(device);
            let weight = Tensor::<B, 3>::from_data(
                TensorData::new(kernels, [bins, 1, self.n_dft]),
                device,
            );
            conv.weight = Param::from_tensor(weight);
            conv
        };

        Spectrogram {
            real: conv(real),
            imag: conv(imag),
            n_dft: self.n_dft,
            n_hop: self.n_hop,
            power: self.power,
        }
    }
}

/// Hann-windowed DFT kernels, `[bins * n_dft]` each for real and imaginary parts
fn dft_kernels(n_dft: usize) -> (Vec<f32>, Vec<f32>) {
    let bins = n_dft / 2 + 1;
    let window: Vec<f64> = (0..n_dft)
        .map(|n| 0.5 - 0.5 * (2.0 * PI * n as f64 / n_dft as f64).cos())
        .collect();

    let mut real = Vec::with_capacity(bins * n_dft);
    let mut imag = Vec::with_capacity(bins * n_dft);
    for k in 0..bins {
        for (n, w) in window.iter().enumerate() {
            let phase = 2.0 * PI * (k * n) as f64 / n_dft as f64;
            real.push((phase.cos() * w) as f32);
            imag.push((-phase.sin() * w) as f32);
        }
    }
    (real, imag)
}

/// Trainable STFT layer
#[derive(Module, Debug)]
pub struct Spectrogram<B: Backend> {
    real: Conv1d<B>,
    imag: Conv1d<B>,
    n_dft: usize,
    n_hop: usize,
    power: f64,
}

impl<B: Backend> Spectrogram<B> {
    /// `[batch, channels, time]` -> `[batch, channels * bins, ceil(time / n_hop)]`
    pub fn forward(&self, input: Tensor<B, 3>) -> Tensor<B, 3> {
        let [batch, channels, time] = input.dims();

        // every input channel is transformed independently
        let x = input.reshape([batch * channels, 1, time]);

        let frames = time.div_ceil(self.n_hop);
        let pad_total = ((frames - 1) * self.n_hop + self.n_dft).saturating_sub(time);
        let x = pad_time(x, pad_total / 2, pad_total - pad_total / 2);

        let real = self.real.forward(x.clone());
        let imag = self.imag.forward(x);
        let power_spec = real.clone() * real + imag.clone() * imag;
        let magnitude = if (self.power - 2.0).abs() < f64::EPSILON {
            power_spec
        } else {
            power_spec.clamp_min(AMIN).powf_scalar(self.power / 2.0)
        };

        let [_, bins, frames] = magnitude.dims();
        amplitude_to_decibel(magnitude.reshape([batch, channels * bins, frames]))
    }
}

/// `10 * log10(x)` relative to the per-example maximum, clipped to the dynamic range
pub fn amplitude_to_decibel<B: Backend>(x: Tensor<B, 3>) -> Tensor<B, 3> {
    let [batch, features, frames] = x.dims();
    let log_spec = x.clamp_min(AMIN).log().mul_scalar(10.0 / std::f64::consts::LN_10);
    let max_per_example = log_spec
        .clone()
        .reshape([batch, features * frames])
        .max_dim(1)
        .reshape([batch, 1, 1]);
    (log_spec - max_per_example).clamp_min(-DYNAMIC_RANGE_DB)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_bins_and_frames() {
        let config = SpectrogramConfig::new(64, 4);
        assert_eq!(config.nb_freq_bins(), 33);
        assert_eq!(config.output_len(1024), 256);
        assert_eq!(config.output_len(1025), 257);
    }

    #[test]
    fn test_forward_shape() {
        let device = Default::default();
        let stft = SpectrogramConfig::new(16, 4).init::<TestBackend>(&device);
        let x = Tensor::<TestBackend, 3>::random(
            [2, 3, 64],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &device,
        );
        assert_eq!(stft.forward(x).dims(), [2, 3 * 9, 16]);
    }

    #[test]
    fn test_decibels_are_relative_to_peak() {
        let device = Default::default();
        let stft = SpectrogramConfig::new(16, 2).init::<TestBackend>(&device);
        let x = Tensor::<TestBackend, 3>::random(
            [1, 1, 32],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &device,
        );
        let values: Vec<f32> = stft.forward(x).into_data().to_vec().unwrap();
        let max = values.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let min = values.iter().cloned().fold(f32::INFINITY, f32::min);

        assert!(max.abs() < 1e-4);
        assert!(min >= -80.0 - 1e-3);
    }

    #[test]
    fn test_dc_kernel_is_window() {
        let (real, imag) = dft_kernels(8);
        // bin 0 is the Hann window itself, with no imaginary part
        assert!(real[0].abs() < 1e-6);
        assert!((real[4] - 1.0).abs() < 1e-6);
        assert!(imag[..8].iter().all(|v| v.abs() < 1e-6));
    }
}
