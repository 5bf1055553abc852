/// Scheduler errors
///
/// Configuration problems surface from `create`/`initialize`; the remaining
/// variants are misuse of the step loop.
use tensorstack_tensor::TensorError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchedulerError {
    #[error("Invalid scheduler configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Scheduler not initialized")]
    NotInitialized,

    #[error("Timestep mismatch: expected {expected}, got {actual}")]
    TimestepMismatch { expected: f32, actual: f32 },

    #[error("Scheduler already completed all {steps} steps")]
    Completed { steps: usize },

    #[error("Tensor error: {0}")]
    Tensor(#[from] TensorError),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

pub(crate) fn invalid(message: impl Into<String>) -> SchedulerError {
    SchedulerError::InvalidConfiguration(message.into())
}
