use thiserror::Error;

pub type Result<T> = std::result::Result<T, TensorError>;

/// Tensor engine errors
///
/// Every variant is a contract violation raised at the call that would break
/// the tensor invariants. Nothing is truncated, padded or substituted.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TensorError {
    #[error("Shape error: {0}")]
    Shape(String),

    #[error("Dimension mismatch: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Operation not supported: {0}")]
    NotSupported(String),

    #[error("Index {index:?} out of range for dimensions {dimensions:?}")]
    IndexOutOfRange {
        index: Vec<usize>,
        dimensions: Vec<usize>,
    },

    #[error("Negative dimension {0} in shape")]
    NegativeDimension(i64),

    #[error("Degenerate range: min {min} >= max {max}")]
    DegenerateRange { min: f32, max: f32 },

    #[error("Invalid image tensor: {0}")]
    InvalidImage(String),

    #[error("Invalid audio tensor: {0}")]
    InvalidAudio(String),

    #[error("Invalid tile configuration: {0}")]
    InvalidTileConfiguration(String),
}

impl TensorError {
    pub(crate) fn mismatch(expected: &[usize], actual: &[usize]) -> Self {
        Self::DimensionMismatch {
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }
}
