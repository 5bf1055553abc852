use tensorstack_tensor::TensorError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, OnnxError>;

#[derive(Error, Debug)]
pub enum OnnxError {
    #[error("Failed to load model: {0}")]
    ModelLoadFailed(String),

    #[error("Failed to create session: {0}")]
    SessionCreationFailed(String),

    #[error("Inference failed: {0}")]
    InferenceFailed(String),

    /// Execution was aborted through the cancellation token.
    #[error("Inference cancelled")]
    Cancelled,

    #[error("Model output not found: {0}")]
    MissingOutput(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Model not loaded")]
    ModelNotLoaded,

    #[error("Tensor error: {0}")]
    Tensor(#[from] TensorError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl OnnxError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<common::Cancelled> for OnnxError {
    fn from(_: common::Cancelled) -> Self {
        Self::Cancelled
    }
}
