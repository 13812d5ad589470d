//! Building blocks shared by the TCN layers
//!
//! All tensors inside the network use the convolution layout
//! `[batch, channels, time]`.

use std::fmt;
use std::str::FromStr;

use burn::{
    module::Module,
    nn::{
        conv::{Conv1d, Conv1dConfig},
        PaddingConfig1d,
    },
    tensor::{
        activation::{relu, sigmoid, tanh},
        backend::Backend,
        Tensor,
    },
};
use serde::{Deserialize, Serialize};

use crate::error::TcnError;

/// Activation applied after every dilated convolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    /// ReLU followed by max-abs normalization across channels
    #[value(name = "norm_relu")]
    NormRelu,
    /// Gated `tanh(x) * sigmoid(x)`
    #[value(name = "wavenet")]
    Wavenet,
    #[value(name = "relu")]
    Relu,
}

impl Activation {
    pub fn apply<B: Backend>(self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        match self {
            Activation::NormRelu => channel_normalization(relu(x)),
            Activation::Wavenet => tanh(x.clone()) * sigmoid(x),
            Activation::Relu => relu(x),
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Activation::NormRelu => "norm_relu",
            Activation::Wavenet => "wavenet",
            Activation::Relu => "relu",
        };
        write!(f, "{name}")
    }
}

impl FromStr for Activation {
    type Err = TcnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "norm_relu" => Ok(Activation::NormRelu),
            "wavenet" => Ok(Activation::Wavenet),
            "relu" => Ok(Activation::Relu),
            other => Err(TcnError::UnknownActivation(other.to_string())),
        }
    }
}

/// Temporal padding of the dilated convolutions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Padding {
    /// Output at `t` sees a centered neighbourhood of `t`
    #[value(name = "same")]
    Same,
    /// Output at `t` only sees inputs at times `<= t`
    #[value(name = "causal")]
    Causal,
}

impl Padding {
    /// Zeros added (left, right) to keep the sequence length
    pub fn amounts(self, kernel_size: usize, dilation: usize) -> (usize, usize) {
        let total = dilation * (kernel_size - 1);
        match self {
            Padding::Same => (total / 2, total - total / 2),
            Padding::Causal => (total, 0),
        }
    }
}

impl FromStr for Padding {
    type Err = TcnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "same" => Ok(Padding::Same),
            "causal" => Ok(Padding::Causal),
            other => Err(TcnError::UnknownPadding(other.to_string())),
        }
    }
}

/// Divide by the per-timestep maximum absolute value across channels
pub fn channel_normalization<B: Backend>(x: Tensor<B, 3>) -> Tensor<B, 3> {
    // reduce on the last axis; burn-ndarray's max backward only scatters there
    let max_values = x
        .clone()
        .abs()
        .swap_dims(1, 2)
        .max_dim(2)
        .swap_dims(1, 2)
        .add_scalar(1e-5);
    x / max_values
}

/// Zero-pad the time axis of a `[batch, channels, time]` tensor
pub fn pad_time<B: Backend>(x: Tensor<B, 3>, left: usize, right: usize) -> Tensor<B, 3> {
    if left == 0 && right == 0 {
        return x;
    }
    let [batch, channels, _] = x.dims();
    let device = x.device();

    let mut parts = Vec::with_capacity(3);
    if left > 0 {
        parts.push(Tensor::zeros([batch, channels, left], &device));
    }
    parts.push(x);
    if right > 0 {
        parts.push(Tensor::zeros([batch, channels, right], &device));
    }
    Tensor::cat(parts, 2)
}

/// Repeat every timestep of a `[batch, time, features]` tensor `factor` times
pub fn upsample_time<B: Backend>(x: Tensor<B, 3>, factor: usize) -> Tensor<B, 3> {
    if factor <= 1 {
        return x;
    }
    let [batch, time, features] = x.dims();
    x.unsqueeze_dim::<4>(2)
        .repeat_dim(2, factor)
        .reshape([batch, time * factor, features])
}

/// Dilated convolution that preserves the sequence length
///
/// With `separable` the convolution is split into a depthwise dilated
/// convolution followed by a pointwise 1x1 convolution.
#[derive(Module, Debug)]
pub struct DilatedConv1d<B: Backend> {
    depthwise: Option<Conv1d<B>>,
    conv: Conv1d<B>,
    pad_left: usize,
    pad_right: usize,
}

impl<B: Backend> DilatedConv1d<B> {
    pub fn new(
        device: &B::Device,
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        dilation: usize,
        padding: Padding,
        separable: bool,
    ) -> Self {
        let (pad_left, pad_right) = padding.amounts(kernel_size, dilation);

        let (depthwise, conv) = if separable {
            let depthwise = Conv1dConfig::new(in_channels, in_channels, kernel_size)
                .with_dilation(dilation)
                .with_groups(in_channels)
                .with_bias(false)
                .with_padding(PaddingConfig1d::Valid)
                .init(device);
            let pointwise = Conv1dConfig::new(in_channels, out_channels, 1).init(device);
            (Some(depthwise), pointwise)
        } else {
            let conv = Conv1dConfig::new(in_channels, out_channels, kernel_size)
                .with_dilation(dilation)
                .with_padding(PaddingConfig1d::Valid)
                .init(device);
            (None, conv)
        };

        Self {
            depthwise,
            conv,
            pad_left,
            pad_right,
        }
    }

    pub fn is_separable(&self) -> bool {
        self.depthwise.is_some()
    }

    /// `[batch, in_channels, time]` -> `[batch, out_channels, time]`
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let x = pad_time(x, self.pad_left, self.pad_right);
        match &self.depthwise {
            Some(depthwise) => self.conv.forward(depthwise.forward(x)),
            None => self.conv.forward(x),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::TensorData;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_padding_amounts() {
        assert_eq!(Padding::Same.amounts(3, 1), (1, 1));
        assert_eq!(Padding::Same.amounts(4, 2), (3, 3));
        assert_eq!(Padding::Same.amounts(2, 1), (0, 1));
        assert_eq!(Padding::Causal.amounts(3, 4), (8, 0));
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("norm_relu".parse::<Activation>().unwrap(), Activation::NormRelu);
        assert_eq!("causal".parse::<Padding>().unwrap(), Padding::Causal);
        assert!("gelu".parse::<Activation>().is_err());
    }

    #[test]
    fn test_dilated_conv_keeps_length() {
        let device = Default::default();
        for padding in [Padding::Same, Padding::Causal] {
            for separable in [false, true] {
                let conv = DilatedConv1d::<TestBackend>::new(&device, 4, 6, 3, 4, padding, separable);
                let x = Tensor::<TestBackend, 3>::ones([2, 4, 40], &device);
                assert_eq!(conv.forward(x).dims(), [2, 6, 40]);
                assert_eq!(conv.is_separable(), separable);
            }
        }
    }

    #[test]
    fn test_causal_conv_ignores_future() {
        let device = Default::default();
        let conv = DilatedConv1d::<TestBackend>::new(&device, 1, 1, 3, 2, Padding::Causal, false);

        let mut impulse = vec![0.0f32; 20];
        impulse[10] = 1.0;
        let x = Tensor::<TestBackend, 3>::from_data(TensorData::new(impulse, [1, 1, 20]), &device);
        let base = conv.forward(Tensor::zeros([1, 1, 20], &device));
        let out = conv.forward(x);

        let diff: Vec<f32> = (out - base).into_data().to_vec().unwrap();
        for value in &diff[..10] {
            assert!(value.abs() < 1e-6);
        }
    }

    #[test]
    fn test_channel_normalization_bounds() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 3>::from_data(
            TensorData::new(vec![1.0f32, -4.0, 2.0, 8.0], [1, 2, 2]),
            &device,
        );
        let values: Vec<f32> = channel_normalization(x).into_data().to_vec().unwrap();
        for value in values {
            assert!(value.abs() <= 1.0 + 1e-4);
        }
    }

    #[test]
    fn test_channel_normalization_backward() {
        type AutodiffBackend = burn::backend::Autodiff<TestBackend>;
        let device = Default::default();
        // [batch, channels, time]: per-timestep maxima are 2 and 8
        let x = Tensor::<AutodiffBackend, 3>::from_data(
            TensorData::new(vec![1.0f32, -4.0, 2.0, 8.0], [1, 2, 2]),
            &device,
        )
        .require_grad();
        let y = channel_normalization(x.clone());

        let values: Vec<f32> = y.clone().into_data().to_vec().unwrap();
        let expected = [0.5, -0.5, 1.0, 1.0];
        for (value, expected) in values.iter().zip(expected) {
            assert!((value - expected).abs() < 1e-4, "{values:?}");
        }

        let grads = y.sum().backward();
        let grad = x.grad(&grads).expect("gradient for the input");
        assert_eq!(grad.dims(), [1, 2, 2]);
    }

    #[test]
    fn test_upsample_repeats_timesteps() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 3>::from_data(
            TensorData::new(vec![1.0f32, 2.0, 3.0, 4.0], [1, 2, 2]),
            &device,
        );
        let up = upsample_time(x, 3);
        assert_eq!(up.dims(), [1, 6, 2]);
        let values: Vec<f32> = up.into_data().to_vec().unwrap();
        assert_eq!(values, vec![1.0, 2.0, 1.0, 2.0, 1.0, 2.0, 3.0, 4.0, 3.0, 4.0, 3.0, 4.0]);
    }

    #[test]
    fn test_pad_time() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 3>::ones([2, 3, 5], &device);
        assert_eq!(pad_time(x, 2, 1).dims(), [2, 3, 8]);
    }
}
