//! Error types emitted while deriving, emitting or executing an attention
//! operator.

use thiserror::Error;

use super::config::{MaskMode, TensorRole};

pub type Result<T> = std::result::Result<T, AttentionError>;

/// Attention-specific error category.
#[derive(Debug, Error)]
pub enum AttentionError {
    /// A fold factor is zero or does not evenly divide the dimension it folds.
    #[error("invalid folding of {field}: {message}")]
    InvalidFolding {
        field: &'static str,
        message: String,
    },

    /// A configuration field holds a value the operator cannot work with.
    #[error("invalid configuration for {field}: {message}")]
    InvalidConfig {
        field: &'static str,
        message: String,
    },

    /// A role was requested that does not participate under the mask mode.
    #[error("invalid role index: {role} is not active under mask mode '{mask_mode}'")]
    InvalidRole { role: TensorRole, mask_mode: MaskMode },

    /// A tensor handed to execution does not match the configured shape.
    #[error("invalid shape: {context}")]
    InvalidShape { context: String },

    #[error("execution mode '{mode}' is not implemented yet")]
    NotImplemented { mode: &'static str },

    /// The external precompiled simulation failed or produced no result.
    #[error("precompiled simulation failed: {0}")]
    Simulation(String),

    #[error("tensor '{0}' is missing from the execution context")]
    MissingTensor(String),

    #[error("accumulator bound {bound} of the {matmul} multiplication is not representable")]
    AccumulatorRange { matmul: &'static str, bound: f64 },

    #[error("failed to parse operator descriptor: {0}")]
    ConfigFormat(String),

    #[error("invalid operator descriptor: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error(transparent)]
    Datatype(#[from] datatype::Error),

    #[error("tensor backend error: {0}")]
    Backend(#[from] candle_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AttentionError {
    pub(crate) fn invalid_config(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            message: message.into(),
        }
    }
}

impl From<toml::de::Error> for AttentionError {
    fn from(value: toml::de::Error) -> Self {
        AttentionError::ConfigFormat(value.to_string())
    }
}

impl From<serde_json::Error> for AttentionError {
    fn from(value: serde_json::Error) -> Self {
        AttentionError::ConfigFormat(value.to_string())
    }
}
