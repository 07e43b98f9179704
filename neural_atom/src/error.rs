//! Error types for neural_atom.

use thiserror::Error;

/// Errors that can occur while building, rendering or training a grid.
#[derive(Error, Debug)]
pub enum NeuralAtomError {
    /// Invalid configuration.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the configuration error.
        message: String,
    },

    /// The representation cannot be trained by this controller.
    #[error("precondition violated: {message}")]
    PreconditionViolation {
        /// What was expected.
        message: String,
    },

    /// An optimizer was asked to manage no parameters.
    #[error("stage {stage} has no trainable parameters")]
    EmptyParameterSet {
        /// 1-based stage index.
        stage: usize,
    },

    /// Tensor shape mismatch.
    #[error("tensor shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        /// Expected shape.
        expected: Vec<usize>,
        /// Actual shape.
        got: Vec<usize>,
    },

    /// Invalid or corrupted data.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Tensor data could not be read back to the host.
    #[error("tensor data error: {0}")]
    TensorData(String),

    /// The background image producer stopped.
    #[error("image batch source closed")]
    DataSourceClosed,

    /// Error from the math core.
    #[error(transparent)]
    Core(#[from] atom_core::AtomCoreError),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Image encode/decode error.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// JSON (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl NeuralAtomError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}

/// Result type for neural_atom operations.
pub type Result<T> = std::result::Result<T, NeuralAtomError>;

/// Read a tensor back to the host as `f32` values.
pub(crate) fn tensor_to_vec<B: burn::tensor::backend::Backend, const D: usize>(
    tensor: burn::tensor::Tensor<B, D>,
) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| NeuralAtomError::TensorData(format!("{:?}", e)))
}
