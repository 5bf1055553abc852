//! Scoped model stages.
//!
//! A [`ModelStage`] borrows one backend for the duration of a pipeline stage
//! (text encoding, denoising, decoding). In [`MemoryMode::Minimum`] the
//! backend is unloaded when the stage is dropped, on every exit path.

use crate::error::Result;
use common::{CancellationToken, MemoryMode};
use tensorstack_onnx_loader::{InferenceBackend, InferenceRequest, ModelOutputs};

pub struct ModelStage<'a> {
    backend: &'a mut dyn InferenceBackend,
    memory_mode: MemoryMode,
    runs: usize,
}

impl<'a> ModelStage<'a> {
    pub fn enter(backend: &'a mut dyn InferenceBackend, memory_mode: MemoryMode) -> Self {
        log::debug!("Entering {} stage", backend.name());
        Self {
            backend,
            memory_mode,
            runs: 0,
        }
    }

    pub fn name(&self) -> &str {
        self.backend.name()
    }

    pub fn runs(&self) -> usize {
        self.runs
    }

    /// One backend call, bracketed by cancellation checks.
    pub fn run(&mut self, request: InferenceRequest, token: &CancellationToken) -> Result<ModelOutputs> {
        common::ensure_active(token)?;
        let outputs = self.backend.run(request, token)?;
        self.runs += 1;
        common::ensure_active(token)?;
        Ok(outputs)
    }
}

impl Drop for ModelStage<'_> {
    fn drop(&mut self) {
        if self.memory_mode.unload_after_stage() && self.backend.is_loaded() {
            log::info!("Unloading {} after {} runs", self.backend.name(), self.runs);
            self.backend.unload();
        }
    }
}
