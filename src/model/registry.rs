//! Architectures selectable by name

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TcnError};

/// Learning rate used when none is given
pub const DEFAULT_LEARNING_RATE: f64 = 0.0005;

/// Registered architectures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// TCN with an optional trainable STFT downsampling frontend
    TcnStft,
    /// TCN with an optional TCN + max-pooling downsampling frontend
    TcnTcn,
}

/// Name -> architecture; `tcn` is a synonym of `tcn_stft`
const REGISTRY: &[(&str, ModelKind)] = &[
    ("tcn", ModelKind::TcnStft),
    ("tcn_stft", ModelKind::TcnStft),
    ("tcn_tcn", ModelKind::TcnTcn),
];

impl ModelKind {
    /// Look up an architecture by its registered name
    pub fn from_name(name: &str) -> Result<Self> {
        REGISTRY
            .iter()
            .find(|(registered, _)| *registered == name)
            .map(|(_, kind)| *kind)
            .ok_or_else(|| TcnError::UnknownModel {
                name: name.to_string(),
                available: model_names().join(", "),
            })
    }

    pub fn name(self) -> &'static str {
        match self {
            ModelKind::TcnStft => "tcn_stft",
            ModelKind::TcnTcn => "tcn_tcn",
        }
    }

    pub fn default_learning_rate(self) -> f64 {
        DEFAULT_LEARNING_RATE
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// All registered names
pub fn model_names() -> Vec<&'static str> {
    REGISTRY.iter().map(|(name, _)| *name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert_eq!(ModelKind::from_name("tcn").unwrap(), ModelKind::TcnStft);
        assert_eq!(ModelKind::from_name("tcn_stft").unwrap(), ModelKind::TcnStft);
        assert_eq!(ModelKind::from_name("tcn_tcn").unwrap(), ModelKind::TcnTcn);
    }

    #[test]
    fn test_unknown_name_lists_models() {
        let err = ModelKind::from_name("resnet").unwrap_err().to_string();
        assert!(err.contains("resnet"));
        assert!(err.contains("tcn_stft"));
        assert!(err.contains("tcn_tcn"));
    }
}
