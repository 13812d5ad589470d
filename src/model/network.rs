//! Full segmentation network

use burn::{
    module::Module,
    nn::{
        pool::{MaxPool1d, MaxPool1dConfig},
        BiLstm, BiLstmConfig, Linear, LinearConfig,
    },
    tensor::{activation::softmax, backend::Backend, Tensor},
};
use serde::{Deserialize, Serialize};

use super::layers::{upsample_time, Activation, Padding};
use super::registry::ModelKind;
use super::stft::{Spectrogram, SpectrogramConfig};
use super::tcn::{Tcn, TcnConfig};
use crate::config::{TrainParams, Windowing};
use crate::error::{Result, TcnError};

/// Architecture of a [`TcnNetwork`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub kind: ModelKind,
    /// Input channels
    pub nb_freq: usize,
    pub nb_classes: usize,
    /// Input timesteps
    pub nb_hist: usize,
    pub nb_filters: usize,
    pub kernel_size: usize,
    pub nb_conv: usize,
    pub dilations: Vec<usize>,
    pub activation: Activation,
    pub use_skip_connections: bool,
    pub return_sequences: bool,
    pub dropout_rate: f64,
    pub padding: Padding,
    pub use_separable: Vec<bool>,
    /// Frontend downsamples by `2^nb_pre_conv`; 0 disables the frontend
    pub nb_pre_conv: usize,
    pub pre_nb_dft: usize,
    pub nb_lstm_units: usize,
    pub upsample: bool,
}

impl NetworkConfig {
    /// Architecture for a training run
    pub fn from_params(
        params: &TrainParams,
        windowing: &Windowing,
        nb_freq: usize,
        nb_classes: usize,
    ) -> Result<Self> {
        let config = Self {
            kind: ModelKind::from_name(&params.model_name)?,
            nb_freq,
            nb_classes,
            nb_hist: params.nb_hist,
            nb_filters: params.nb_filters,
            kernel_size: params.kernel_size,
            nb_conv: params.nb_conv,
            dilations: params.dilations.clone(),
            activation: params.activation,
            use_skip_connections: params.use_skip_connections,
            return_sequences: windowing.return_sequences,
            dropout_rate: params.dropout_rate,
            padding: params.padding,
            use_separable: params.use_separable.clone(),
            nb_pre_conv: params.nb_pre_conv,
            pre_nb_dft: params.pre_nb_dft,
            nb_lstm_units: params.nb_lstm_units,
            upsample: params.upsample,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.nb_freq == 0 || self.nb_classes == 0 {
            return Err(TcnError::InvalidParameter {
                name: "nb_freq/nb_classes",
                reason: "network needs at least one input channel and one class".to_string(),
            });
        }
        let factor = self.downsample_factor();
        if self.has_frontend() && self.nb_hist % factor != 0 {
            return Err(TcnError::InvalidParameter {
                name: "nb_hist",
                reason: format!(
                    "{} must be a multiple of the frontend downsampling factor {}",
                    self.nb_hist, factor
                ),
            });
        }
        Ok(())
    }

    pub fn has_frontend(&self) -> bool {
        self.nb_pre_conv > 0
    }

    /// Only the STFT architecture carries the recurrent layer
    pub fn has_lstm(&self) -> bool {
        self.nb_lstm_units > 0 && self.kind == ModelKind::TcnStft
    }

    /// Factor by which the frontend shortens the sequence
    pub fn downsample_factor(&self) -> usize {
        1 << self.nb_pre_conv
    }

    /// Timesteps entering the main TCN
    pub fn frontend_len(&self) -> usize {
        if !self.has_frontend() {
            return self.nb_hist;
        }
        match self.kind {
            ModelKind::TcnStft => self.stft_config().output_len(self.nb_hist),
            ModelKind::TcnTcn => self.nb_hist / self.downsample_factor(),
        }
    }

    fn upsample_factor(&self) -> usize {
        if self.has_frontend() && self.upsample && self.return_sequences {
            self.downsample_factor()
        } else {
            1
        }
    }

    /// Timesteps of the network output
    pub fn output_len(&self) -> usize {
        if self.return_sequences {
            self.frontend_len() * self.upsample_factor()
        } else {
            1
        }
    }

    fn stft_config(&self) -> SpectrogramConfig {
        SpectrogramConfig::new(self.pre_nb_dft, self.downsample_factor())
    }

    fn tcn_config(&self, input_channels: usize) -> TcnConfig {
        TcnConfig {
            input_channels,
            nb_filters: self.nb_filters,
            kernel_size: self.kernel_size,
            nb_stacks: self.nb_conv,
            dilations: self.dilations.clone(),
            activation: self.activation,
            padding: self.padding,
            use_skip_connections: self.use_skip_connections,
            dropout_rate: self.dropout_rate,
            return_sequences: self.return_sequences,
            use_separable: self.use_separable.clone(),
        }
    }

    /// Build the network with freshly initialised weights
    pub fn init<B: Backend>(&self, device: &B::Device) -> TcnNetwork<B> {
        let mut stft = None;
        let mut frontend = None;
        let mut pool = None;
        let mut tcn_input = self.nb_freq;

        if self.has_frontend() {
            match self.kind {
                ModelKind::TcnStft => {
                    let config = self.stft_config();
                    tcn_input = self.nb_freq * config.nb_freq_bins();
                    stft = Some(config.init(device));
                }
                ModelKind::TcnTcn => {
                    let config = TcnConfig {
                        nb_stacks: self.nb_pre_conv,
                        return_sequences: true,
                        ..self.tcn_config(self.nb_freq)
                    };
                    tcn_input = self.nb_filters;
                    frontend = Some(config.init(device));
                    let factor = self.downsample_factor();
                    pool = Some(MaxPool1dConfig::new(factor).with_stride(factor).init());
                }
            }
        }

        let tcn = self.tcn_config(tcn_input).init(device);

        let (lstm, head_input) = if self.has_lstm() {
            let lstm = BiLstmConfig::new(self.nb_filters, self.nb_lstm_units, true).init(device);
            (Some(lstm), 2 * self.nb_lstm_units)
        } else {
            (None, self.nb_filters)
        };

        TcnNetwork {
            stft,
            frontend,
            pool,
            tcn,
            lstm,
            head: LinearConfig::new(head_input, self.nb_classes).init(device),
            upsample_factor: self.upsample_factor(),
        }
    }
}

/// TCN segmentation network
///
/// ```text
/// [batch, nb_hist, nb_freq]
///   -> optional frontend (STFT or TCN + max-pool), downsampling by 2^nb_pre_conv
///   -> TCN
///   -> optional bidirectional LSTM
///   -> dense + softmax
///   -> optional upsampling back to the input rate
/// [batch, output_len, nb_classes]
/// ```
#[derive(Module, Debug)]
pub struct TcnNetwork<B: Backend> {
    stft: Option<Spectrogram<B>>,
    frontend: Option<Tcn<B>>,
    pool: Option<MaxPool1d>,
    tcn: Tcn<B>,
    lstm: Option<BiLstm<B>>,
    head: Linear<B>,
    upsample_factor: usize,
}

impl<B: Backend> TcnNetwork<B> {
    /// Class probabilities for every output timestep
    pub fn forward(&self, input: Tensor<B, 3>) -> Tensor<B, 3> {
        let mut x = input.swap_dims(1, 2);

        if let Some(stft) = &self.stft {
            x = stft.forward(x);
        }
        if let (Some(frontend), Some(pool)) = (&self.frontend, &self.pool) {
            x = pool.forward(frontend.forward(x));
        }

        let mut x = self.tcn.forward(x).swap_dims(1, 2);
        if let Some(lstm) = &self.lstm {
            x = lstm.forward(x, None).0;
        }

        let probabilities = softmax(self.head.forward(x), 2);
        upsample_time(probabilities, self.upsample_factor)
    }
}
