//! The seam between pipelines and whatever executes the models.
//!
//! A pipeline never talks to ONNX Runtime directly: it builds an
//! [`InferenceRequest`] of named tensors and hands it to an
//! [`InferenceBackend`]. [`crate::OnnxSession`] is the production backend;
//! tests plug in deterministic stubs.

use crate::error::{OnnxError, Result};
use common::CancellationToken;
use tensorstack_tensor::Tensor;

/// A named model input or output.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorValue {
    Float(Tensor<f32>),
    Int64(Tensor<i64>),
    Int32(Tensor<i32>),
    Bool(Tensor<bool>),
}

impl TensorValue {
    pub fn dimensions(&self) -> &[usize] {
        match self {
            Self::Float(t) => t.dimensions(),
            Self::Int64(t) => t.dimensions(),
            Self::Int32(t) => t.dimensions(),
            Self::Bool(t) => t.dimensions(),
        }
    }

    pub fn element_type(&self) -> &'static str {
        match self {
            Self::Float(_) => "float32",
            Self::Int64(_) => "int64",
            Self::Int32(_) => "int32",
            Self::Bool(_) => "bool",
        }
    }

    pub fn as_float(&self) -> Option<&Tensor<f32>> {
        match self {
            Self::Float(t) => Some(t),
            _ => None,
        }
    }

    pub fn into_float(self) -> Result<Tensor<f32>> {
        match self {
            Self::Float(t) => Ok(t),
            other => Err(OnnxError::InvalidInput(format!(
                "expected float32 tensor, found {}",
                other.element_type()
            ))),
        }
    }
}

impl From<Tensor<f32>> for TensorValue {
    fn from(t: Tensor<f32>) -> Self {
        Self::Float(t)
    }
}

impl From<Tensor<i64>> for TensorValue {
    fn from(t: Tensor<i64>) -> Self {
        Self::Int64(t)
    }
}

impl From<Tensor<i32>> for TensorValue {
    fn from(t: Tensor<i32>) -> Self {
        Self::Int32(t)
    }
}

impl From<Tensor<bool>> for TensorValue {
    fn from(t: Tensor<bool>) -> Self {
        Self::Bool(t)
    }
}

/// An output the caller wants back, optionally with the shape it expects.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSpec {
    pub name: String,
    pub dimensions: Option<Vec<usize>>,
}

impl OutputSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dimensions: None,
        }
    }

    pub fn with_dimensions(name: impl Into<String>, dimensions: Vec<usize>) -> Self {
        Self {
            name: name.into(),
            dimensions: Some(dimensions),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InferenceRequest {
    pub inputs: Vec<(String, TensorValue)>,
    pub outputs: Vec<OutputSpec>,
}

impl InferenceRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input(mut self, name: impl Into<String>, value: impl Into<TensorValue>) -> Self {
        self.inputs.push((name.into(), value.into()));
        self
    }

    pub fn with_output(mut self, output: OutputSpec) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn input(&self, name: &str) -> Option<&TensorValue> {
        self.inputs.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn validate(&self) -> Result<()> {
        if self.outputs.is_empty() {
            return Err(OnnxError::InvalidInput("request names no outputs".to_string()));
        }
        for (i, (name, _)) in self.inputs.iter().enumerate() {
            if self.inputs[..i].iter().any(|(n, _)| n == name) {
                return Err(OnnxError::InvalidInput(format!("duplicate input '{}'", name)));
            }
        }
        Ok(())
    }
}

/// Outputs in the order they were requested.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelOutputs {
    outputs: Vec<(String, TensorValue)>,
}

impl ModelOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<TensorValue>) {
        self.outputs.push((name.into(), value.into()));
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&TensorValue> {
        self.outputs.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn take(&mut self, name: &str) -> Result<TensorValue> {
        let index = self
            .outputs
            .iter()
            .position(|(n, _)| n == name)
            .ok_or_else(|| OnnxError::MissingOutput(name.to_string()))?;
        Ok(self.outputs.remove(index).1)
    }

    pub fn take_float(&mut self, name: &str) -> Result<Tensor<f32>> {
        self.take(name)?.into_float()
    }

    /// Checks that every requested output is present with the expected shape.
    pub fn validate(&self, specs: &[OutputSpec]) -> Result<()> {
        for spec in specs {
            let value = self
                .get(&spec.name)
                .ok_or_else(|| OnnxError::MissingOutput(spec.name.clone()))?;
            if let Some(expected) = &spec.dimensions {
                if value.dimensions() != expected.as_slice() {
                    return Err(OnnxError::InferenceFailed(format!(
                        "output '{}' has shape {:?}, expected {:?}",
                        spec.name,
                        value.dimensions(),
                        expected
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Executes one model. Implementations load lazily on the first `run`.
pub trait InferenceBackend: Send {
    fn name(&self) -> &str;

    fn is_loaded(&self) -> bool;

    fn load(&mut self) -> Result<()>;

    /// Releases the model; the next `run` loads it again.
    fn unload(&mut self);

    /// Runs the model once. A cancelled `token` aborts with
    /// [`OnnxError::Cancelled`], including while execution is in flight.
    fn run(&mut self, request: InferenceRequest, token: &CancellationToken) -> Result<ModelOutputs>;
}

impl<B: InferenceBackend + ?Sized> InferenceBackend for Box<B> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn is_loaded(&self) -> bool {
        (**self).is_loaded()
    }

    fn load(&mut self) -> Result<()> {
        (**self).load()
    }

    fn unload(&mut self) {
        (**self).unload()
    }

    fn run(&mut self, request: InferenceRequest, token: &CancellationToken) -> Result<ModelOutputs> {
        (**self).run(request, token)
    }
}
