//! Stack of residual blocks with skip connections

use burn::{
    module::Module,
    nn::conv::{Conv1d, Conv1dConfig},
    tensor::{activation::relu, backend::Backend, Tensor},
};
use serde::{Deserialize, Serialize};

use super::block::ResidualBlock;
use super::layers::{Activation, Padding};

/// TCN layer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TcnConfig {
    pub input_channels: usize,
    pub nb_filters: usize,
    pub kernel_size: usize,
    /// Each stack runs through all dilations once
    pub nb_stacks: usize,
    pub dilations: Vec<usize>,
    pub activation: Activation,
    pub padding: Padding,
    pub use_skip_connections: bool,
    pub dropout_rate: f64,
    /// Keep all timesteps; otherwise only the last one
    pub return_sequences: bool,
    /// Per-stack separable flag; missing entries are false
    pub use_separable: Vec<bool>,
}

impl TcnConfig {
    /// Timesteps seen by one output of the whole stack
    pub fn receptive_field(&self) -> usize {
        let dilation_sum: usize = self.dilations.iter().sum();
        1 + 2 * (self.kernel_size - 1) * dilation_sum * self.nb_stacks
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Tcn<B> {
        let input_projection =
            Conv1dConfig::new(self.input_channels, self.nb_filters, 1).init(device);

        let mut blocks = Vec::with_capacity(self.nb_stacks * self.dilations.len());
        for stack in 0..self.nb_stacks {
            let separable = self.use_separable.get(stack).copied().unwrap_or(false);
            for &dilation in &self.dilations {
                blocks.push(ResidualBlock::new(
                    device,
                    self.nb_filters,
                    self.kernel_size,
                    dilation,
                    self.activation,
                    self.padding,
                    self.dropout_rate,
                    separable,
                ));
            }
        }

        Tcn {
            input_projection,
            blocks,
            use_skip_connections: self.use_skip_connections,
            return_sequences: self.return_sequences,
        }
    }
}

/// Temporal Convolutional Network layer
#[derive(Module, Debug)]
pub struct Tcn<B: Backend> {
    input_projection: Conv1d<B>,
    blocks: Vec<ResidualBlock<B>>,
    use_skip_connections: bool,
    return_sequences: bool,
}

impl<B: Backend> Tcn<B> {
    /// `[batch, input_channels, time]` -> `[batch, nb_filters, time]`,
    /// or `[batch, nb_filters, 1]` without `return_sequences`
    pub fn forward(&self, input: Tensor<B, 3>) -> Tensor<B, 3> {
        let mut x = self.input_projection.forward(input);
        let mut skip_sum: Option<Tensor<B, 3>> = None;

        for block in &self.blocks {
            let (residual, skip) = block.forward(x);
            x = residual;
            if self.use_skip_connections {
                skip_sum = Some(match skip_sum {
                    Some(sum) => sum + skip,
                    None => skip,
                });
            }
        }

        let x = relu(skip_sum.unwrap_or(x));
        if self.return_sequences {
            x
        } else {
            let time = x.dims()[2];
            x.narrow(2, time - 1, 1)
        }
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }
}
