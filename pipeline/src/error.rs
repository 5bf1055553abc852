/// Pipeline errors
///
/// Cancellation is its own outcome so callers can tell a stopped run from a
/// failed one; backend failures keep the backend error as their source.
use common::SettingsError;
use tensorstack_onnx_loader::OnnxError;
use tensorstack_scheduler::SchedulerError;
use tensorstack_tensor::TensorError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Generation cancelled")]
    Cancelled,

    #[error("Backend failure: {0}")]
    Backend(#[source] OnnxError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Tensor error: {0}")]
    Tensor(#[from] TensorError),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Model not loaded: {0}")]
    ModelNotLoaded(String),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Worker task failed: {0}")]
    Worker(String),
}

impl PipelineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<OnnxError> for PipelineError {
    fn from(e: OnnxError) -> Self {
        match e {
            OnnxError::Cancelled => Self::Cancelled,
            other => Self::Backend(other),
        }
    }
}

impl From<common::Cancelled> for PipelineError {
    fn from(_: common::Cancelled) -> Self {
        Self::Cancelled
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

pub(crate) fn invalid(message: impl Into<String>) -> PipelineError {
    PipelineError::InvalidConfiguration(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_cancellation_is_distinct() {
        assert!(PipelineError::from(OnnxError::Cancelled).is_cancelled());
        assert!(PipelineError::from(common::Cancelled).is_cancelled());

        let failure = PipelineError::from(OnnxError::InferenceFailed("out of memory".to_string()));
        assert!(!failure.is_cancelled());
        match failure {
            PipelineError::Backend(OnnxError::InferenceFailed(message)) => assert_eq!(message, "out of memory"),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
