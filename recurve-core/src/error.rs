use thiserror::Error;

/// Custom error type for the Recurve engine.
#[derive(Error, Debug, PartialEq, Clone)] // PartialEq/Clone for easier testing
pub enum RecurveError {
    #[error("Shape mismatch: expected {expected:?}, got {actual:?} during operation {operation}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
        operation: String,
    },

    #[error("Dimension mismatch: expected rank {expected}, got {actual} during operation {operation}")]
    DimensionMismatch {
        expected: usize,
        actual: usize,
        operation: String,
    },

    #[error("Tensor creation error: data length {data_len} does not match shape {shape:?}")]
    TensorCreation { data_len: usize, shape: Vec<usize> },

    #[error("Index out of bounds: index {index} for size {size}")]
    IndexOutOfBounds { index: usize, size: usize },

    #[error("Backward invoked without a matching forward: {operation}")]
    UninitializedState { operation: String },

    #[error("Sequence length mismatch: {inputs} inputs paired with {targets} targets")]
    SequenceLengthMismatch { inputs: usize, targets: usize },

    #[error("Window overflow: model unrolls at most {capacity} steps")]
    WindowOverflow { capacity: usize },

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("I/O error on {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Serialization error on {path}: {reason}")]
    Serialization { path: String, reason: String },

    #[error("Internal error: {0}")]
    InternalError(String),
}
