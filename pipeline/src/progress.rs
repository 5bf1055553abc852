//! Progress reporting.

use std::time::Duration;
use tensorstack_tensor::Tensor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStage {
    TextEncoding,
    ImageEncoding,
    Denoising,
    Decoding,
    Upscaling,
}

#[derive(Debug, Clone)]
pub struct Progress {
    pub stage: ProgressStage,
    /// Steps (or frames) finished within `stage`.
    pub step: usize,
    pub total: usize,
    pub elapsed: Duration,
    /// Predicted clean latent after a denoising step, once the scheduler has
    /// reached its full order.
    pub preview: Option<Tensor<f32>>,
}

impl Progress {
    pub fn new(stage: ProgressStage, step: usize, total: usize, elapsed: Duration) -> Self {
        Self {
            stage,
            step,
            total,
            elapsed,
            preview: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.step >= self.total
    }
}

/// Receives progress from a running pipeline.
pub trait ProgressSink: Send {
    fn report(&mut self, progress: Progress);
}

impl<F: FnMut(Progress) + Send> ProgressSink for F {
    fn report(&mut self, progress: Progress) {
        self(progress)
    }
}

/// Discards progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&mut self, _: Progress) {}
}
