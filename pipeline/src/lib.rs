//! TensorStack pipelines
//!
//! Orchestration over the tensor engine, the schedulers and the model
//! backends:
//! - [`DiffusionPipeline`]: text-to-image and image-to-image, with
//!   classifier-free guidance, prompt caching and tiled, frame-by-frame decode
//! - [`UpscalePipeline`]: tiled single-model super resolution
//! - [`PipelineWorker`]: runs either on a blocking worker task with progress
//!   streaming and cancellation
//!
//! In [`common::MemoryMode::Minimum`] every model is unloaded as soon as its
//! stage finishes.

pub mod base;
pub mod config;
pub mod diffusion;
pub mod error;
pub mod guidance;
pub mod progress;
pub mod stage;
pub mod types;
pub mod upscale;
pub mod worker;

pub use base::Pipeline;
pub use config::{GenerateOptions, ModelIoNames, PipelineConfig};
pub use diffusion::{
    DiffusionModels, DiffusionPipeline, GenerateOutput, GenerateRequest, PromptEmbeddings, PromptTokens,
};
pub use error::{PipelineError, Result};
pub use guidance::{apply_guidance, is_guidance_enabled};
pub use progress::{NoProgress, Progress, ProgressSink, ProgressStage};
pub use stage::ModelStage;
pub use types::PipelineType;
pub use upscale::{UpscalePipeline, UpscaleRequest};
pub use worker::{GenerationHandle, PipelineWorker};
