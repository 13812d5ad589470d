//! Network architectures
//!
//! - `layers` - dilated convolutions, activations, padding helpers
//! - `block` - TCN residual block
//! - `tcn` - stack of residual blocks with skip connections
//! - `stft` - trainable spectrogram frontend
//! - `network` - full segmentation network
//! - `registry` - architectures selectable by name

mod block;
mod layers;
mod network;
mod registry;
mod stft;
mod tcn;

pub use block::ResidualBlock;
pub use layers::{channel_normalization, pad_time, upsample_time, Activation, DilatedConv1d, Padding};
pub use network::{NetworkConfig, TcnNetwork};
pub use registry::{model_names, ModelKind, DEFAULT_LEARNING_RATE};
pub use stft::{amplitude_to_decibel, Spectrogram, SpectrogramConfig};
pub use tcn::{Tcn, TcnConfig};
