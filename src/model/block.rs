//! TCN residual block
//!
//! Structure:
//! ```text
//! Input
//!   |
//!   +---> DilatedConv --> Activation --> Dropout --> DilatedConv --> Activation --> Dropout --> Conv1x1 --+--> skip
//!   |                                                                                                    |
//!   +-----------------------------------(residual connection)------------------------------------------ (+)
//!   |
//!   v
//! Output
//! ```

use burn::{
    module::{Ignored, Module},
    nn::{
        conv::{Conv1d, Conv1dConfig},
        Dropout, DropoutConfig,
    },
    tensor::{backend::Backend, Tensor},
};

use super::layers::{Activation, DilatedConv1d, Padding};

/// Residual block with two dilated convolutions
#[derive(Module, Debug)]
pub struct ResidualBlock<B: Backend> {
    conv1: DilatedConv1d<B>,
    conv2: DilatedConv1d<B>,
    /// 1x1 convolution producing the skip output
    project: Conv1d<B>,
    dropout: Dropout,
    activation: Ignored<Activation>,
    dilation: usize,
}

impl<B: Backend> ResidualBlock<B> {
    /// Create a block operating on `nb_filters` channels
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        device: &B::Device,
        nb_filters: usize,
        kernel_size: usize,
        dilation: usize,
        activation: Activation,
        padding: Padding,
        dropout_rate: f64,
        separable: bool,
    ) -> Self {
        let conv = || {
            DilatedConv1d::new(
                device,
                nb_filters,
                nb_filters,
                kernel_size,
                dilation,
                padding,
                separable,
            )
        };

        Self {
            conv1: conv(),
            conv2: conv(),
            project: Conv1dConfig::new(nb_filters, nb_filters, 1).init(device),
            dropout: DropoutConfig::new(dropout_rate).init(),
            activation: Ignored(activation),
            dilation,
        }
    }

    /// Returns `(residual_output, skip_output)`, both `[batch, nb_filters, time]`
    pub fn forward(&self, input: Tensor<B, 3>) -> (Tensor<B, 3>, Tensor<B, 3>) {
        let activation = *self.activation;

        let mut x = input.clone();
        for conv in [&self.conv1, &self.conv2] {
            x = conv.forward(x);
            x = activation.apply(x);
            x = self.dropout.forward(x);
        }

        let skip = self.project.forward(x);
        (input + skip.clone(), skip)
    }

    /// Timesteps seen by one output of this block
    pub fn receptive_field(&self, kernel_size: usize) -> usize {
        2 * (kernel_size - 1) * self.dilation + 1
    }

    pub fn dilation(&self) -> usize {
        self.dilation
    }
}
