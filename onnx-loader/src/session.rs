//! ONNX Runtime session with lazy loading and cancellable runs.

use crate::backend::{InferenceBackend, InferenceRequest, ModelOutputs, TensorValue};
use crate::error::{OnnxError, Result};
use crate::providers::{dispatch_for, ExecutionProviderKind};
use common::CancellationToken;
use futures::future::{select, Either};
use ort::session::{builder::GraphOptimizationLevel, RunOptions, Session, SessionInputValue};
use ort::value::{DynValue, Tensor as OrtTensor};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use tensorstack_tensor::shape::to_dimensions;
use tensorstack_tensor::Tensor;

/// Session configuration. Defaults match a desktop GPU-less setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    pub provider: ExecutionProviderKind,
    pub device_id: i32,
    /// Graph optimization level, 0 (disabled) to 3 (all).
    pub optimization_level: u8,
    pub intra_threads: usize,
    pub inter_threads: usize,
    pub parallel_execution: bool,
    pub memory_pattern: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            provider: ExecutionProviderKind::Cpu,
            device_id: 0,
            optimization_level: 3,
            intra_threads: 4,
            inter_threads: 2,
            parallel_execution: true,
            memory_pattern: true,
        }
    }
}

impl SessionOptions {
    fn graph_optimization_level(&self) -> GraphOptimizationLevel {
        match self.optimization_level {
            0 => GraphOptimizationLevel::Disable,
            1 => GraphOptimizationLevel::Level1,
            2 => GraphOptimizationLevel::Level2,
            _ => GraphOptimizationLevel::Level3,
        }
    }
}

/// One model file behind an ONNX Runtime session.
///
/// The session is created on the first [`InferenceBackend::run`] (or an
/// explicit `load`) and dropped again by `unload`, so a pipeline can keep
/// only the stage it is running resident.
pub struct OnnxSession {
    name: String,
    model_path: PathBuf,
    options: SessionOptions,
    session: Option<Session>,
}

impl OnnxSession {
    pub fn new(name: impl Into<String>, model_path: impl AsRef<Path>, options: SessionOptions) -> Self {
        Self {
            name: name.into(),
            model_path: model_path.as_ref().to_path_buf(),
            options,
            session: None,
        }
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Direct access to the underlying `ort::Session`, if loaded.
    pub fn session_mut(&mut self) -> Option<&mut Session> {
        self.session.as_mut()
    }

    fn create_session(&self) -> Result<Session> {
        let metadata = match std::fs::metadata(&self.model_path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(OnnxError::ModelLoadFailed(format!(
                    "Model file not found: {:?}",
                    self.model_path
                )));
            }
            Err(e) => return Err(e.into()),
        };
        if !metadata.is_file() {
            return Err(OnnxError::ModelLoadFailed(format!(
                "Model path is not a file: {:?}",
                self.model_path
            )));
        }

        let providers = dispatch_for(self.options.provider, self.options.device_id);
        log::info!(
            "Loading {} model from {:?} with {} execution providers",
            self.name,
            self.model_path,
            providers.len()
        );

        let session = Session::builder()
            .map_err(|e| OnnxError::SessionCreationFailed(e.to_string()))?
            .with_execution_providers(&providers)
            .map_err(|e| OnnxError::SessionCreationFailed(format!("Failed to set execution providers: {}", e)))?
            .with_optimization_level(self.options.graph_optimization_level())
            .map_err(|e| OnnxError::SessionCreationFailed(format!("Failed to set optimization level: {}", e)))?
            .with_intra_threads(self.options.intra_threads)
            .map_err(|e| OnnxError::SessionCreationFailed(format!("Failed to set intra threads: {}", e)))?
            .with_inter_threads(self.options.inter_threads)
            .map_err(|e| OnnxError::SessionCreationFailed(format!("Failed to set inter threads: {}", e)))?
            .with_parallel_execution(self.options.parallel_execution)
            .map_err(|e| OnnxError::SessionCreationFailed(format!("Failed to set parallel execution: {}", e)))?
            .with_memory_pattern(self.options.memory_pattern)
            .map_err(|e| OnnxError::SessionCreationFailed(format!("Failed to set memory pattern: {}", e)))?
            .commit_from_file(&self.model_path)
            .map_err(|e| OnnxError::ModelLoadFailed(e.to_string()))?;

        log::debug!(
            "{} session ready: optimization {}, threads {}/{}",
            self.name,
            self.options.optimization_level,
            self.options.intra_threads,
            self.options.inter_threads
        );
        Ok(session)
    }
}

impl InferenceBackend for OnnxSession {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_loaded(&self) -> bool {
        self.session.is_some()
    }

    fn load(&mut self) -> Result<()> {
        if self.session.is_none() {
            self.session = Some(self.create_session()?);
        }
        Ok(())
    }

    fn unload(&mut self) {
        if self.session.take().is_some() {
            log::info!("Unloaded {} model", self.name);
        }
    }

    fn run(&mut self, request: InferenceRequest, token: &CancellationToken) -> Result<ModelOutputs> {
        common::ensure_active(token)?;
        request.validate()?;
        self.load()?;
        let session = self.session.as_mut().ok_or(OnnxError::ModelNotLoaded)?;

        let inputs = request
            .inputs
            .iter()
            .map(|(name, value)| Ok((Cow::Owned(name.clone()), SessionInputValue::from(to_ort_value(value)?))))
            .collect::<Result<Vec<(Cow<'_, str>, SessionInputValue<'_>)>>>()?;

        let run_options =
            RunOptions::new().map_err(|e| OnnxError::InferenceFailed(format!("Failed to create run options: {}", e)))?;
        let (done_tx, done_rx) = futures::channel::oneshot::channel::<()>();

        let outputs = std::thread::scope(|scope| {
            let run_options = &run_options;
            scope.spawn(move || {
                let cancelled = std::pin::pin!(token.cancelled());
                if let Either::Left(_) = futures::executor::block_on(select(cancelled, done_rx)) {
                    log::debug!("Terminating in-flight inference");
                    if let Err(e) = run_options.terminate() {
                        log::warn!("Failed to terminate inference: {}", e);
                    }
                }
            });

            let result = session.run_with_options(inputs, run_options);
            drop(done_tx);

            let outputs = match result {
                Ok(outputs) => outputs,
                Err(_) if token.is_cancelled() => return Err(OnnxError::Cancelled),
                Err(e) => return Err(OnnxError::InferenceFailed(e.to_string())),
            };

            let mut collected = ModelOutputs::new();
            for spec in &request.outputs {
                let value = outputs
                    .get(spec.name.as_str())
                    .ok_or_else(|| OnnxError::MissingOutput(spec.name.clone()))?;
                collected.insert(spec.name.clone(), from_ort_value(&spec.name, value)?);
            }
            Ok(collected)
        })?;

        common::ensure_active(token)?;
        outputs.validate(&request.outputs)?;
        Ok(outputs)
    }
}

fn to_ort_value(value: &TensorValue) -> Result<DynValue> {
    let converted = match value {
        TensorValue::Float(t) => tensor_to_ort(t),
        TensorValue::Int64(t) => tensor_to_ort(t),
        TensorValue::Int32(t) => tensor_to_ort(t),
        TensorValue::Bool(t) => tensor_to_ort(t),
    };
    converted.map_err(|e| OnnxError::InvalidInput(format!("Failed to create input value: {}", e)))
}

fn tensor_to_ort<T>(tensor: &Tensor<T>) -> ort::Result<DynValue>
where
    T: ort::tensor::PrimitiveTensorElementType + tensorstack_tensor::TensorElement + std::fmt::Debug,
{
    let value = OrtTensor::from_array((tensor.dimensions_i64(), tensor.as_slice().to_vec()))?;
    Ok(value.into_dyn())
}

fn from_ort_value(name: &str, value: &DynValue) -> Result<TensorValue> {
    if let Ok((shape, data)) = value.try_extract_tensor::<f32>() {
        return Ok(Tensor::from_vec(data.to_vec(), to_dimensions(shape)?)?.into());
    }
    if let Ok((shape, data)) = value.try_extract_tensor::<i64>() {
        return Ok(Tensor::from_vec(data.to_vec(), to_dimensions(shape)?)?.into());
    }
    Err(OnnxError::InferenceFailed(format!(
        "output '{}' has an unsupported element type",
        name
    )))
}
