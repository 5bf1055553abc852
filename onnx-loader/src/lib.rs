//! Model execution for TensorStack pipelines
//!
//! - [`InferenceBackend`]: the trait pipelines call, one implementation per model
//! - [`OnnxSession`]: ONNX Runtime backend with lazy load, unload and
//!   cancellation of in-flight runs
//! - [`providers`]: execution provider selection with CPU fallback

pub mod backend;
pub mod error;
pub mod providers;
pub mod session;

pub use backend::{InferenceBackend, InferenceRequest, ModelOutputs, OutputSpec, TensorValue};
pub use error::{OnnxError, Result};
pub use providers::{dispatch_for, ExecutionProviderKind};
pub use session::{OnnxSession, SessionOptions};

/// Re-export of `ort` for callers that need the raw session API.
pub use ort;
