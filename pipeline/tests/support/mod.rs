//! Deterministic in-process backends for pipeline tests.

#![allow(dead_code)]

use common::CancellationToken;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tensorstack_onnx_loader::{
    InferenceBackend, InferenceRequest, ModelOutputs, OnnxError, Result, TensorValue,
};
use tensorstack_pipeline::{DiffusionModels, GenerateOptions, PromptTokens};
use tensorstack_scheduler::SchedulerType;
use tensorstack_tensor::Tensor;

pub fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Debug, Clone, Copy)]
pub enum StubKind {
    /// `[1, L]` token ids to `[1, L, 8]` embeddings of `id * 0.01`.
    TextEncoder,
    /// Returns `sample * 0.1`.
    Denoiser,
    /// Nearest-neighbour upsample of channel 0 to three channels, `factor`x.
    Decoder { factor: usize },
    /// Samples every `factor`-th pixel of channel 0 into `channels` channels.
    Encoder { factor: usize, channels: usize },
    /// Nearest-neighbour upsample of every channel, `factor`x.
    Upscaler { factor: usize },
}

/// Shared counters, readable after the stub is boxed into a pipeline.
#[derive(Debug, Clone, Default)]
pub struct StubStats {
    pub calls: Arc<AtomicUsize>,
    pub loads: Arc<AtomicUsize>,
    pub unloads: Arc<AtomicUsize>,
    pub loaded: Arc<AtomicBool>,
    pub max_batch: Arc<AtomicUsize>,
}

impl StubStats {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn unloads(&self) -> usize {
        self.unloads.load(Ordering::SeqCst)
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    pub fn max_batch(&self) -> usize {
        self.max_batch.load(Ordering::SeqCst)
    }
}

pub struct StubBackend {
    name: String,
    kind: StubKind,
    stats: StubStats,
    cancel_on_call: Option<(usize, CancellationToken)>,
    delay: Duration,
}

impl StubBackend {
    pub fn new(name: &str, kind: StubKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            stats: StubStats::default(),
            cancel_on_call: None,
            delay: Duration::ZERO,
        }
    }

    pub fn stats(&self) -> StubStats {
        self.stats.clone()
    }

    /// Fires `token` while serving the `call`-th request (1-based).
    pub fn cancel_on_call(mut self, call: usize, token: CancellationToken) -> Self {
        self.cancel_on_call = Some((call, token));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn compute(&self, input: &TensorValue) -> Result<Tensor<f32>> {
        match (self.kind, input) {
            (StubKind::TextEncoder, TensorValue::Int64(ids)) => {
                let length = ids.dimensions()[1];
                let mut values = Vec::with_capacity(length * 8);
                for &id in ids.as_slice() {
                    values.extend(std::iter::repeat(id as f32 * 0.01).take(8));
                }
                Ok(Tensor::from_vec(values, vec![1, length, 8])?)
            }
            (StubKind::Denoiser, TensorValue::Float(sample)) => Ok(sample.mul_scalar(0.1)),
            (StubKind::Decoder { factor }, TensorValue::Float(latent)) => Ok(upsample(latent, factor, Some(3))),
            (StubKind::Upscaler { factor }, TensorValue::Float(image)) => Ok(upsample(image, factor, None)),
            (StubKind::Encoder { factor, channels }, TensorValue::Float(image)) => {
                let dims = image.dimensions();
                let (height, width) = (dims[2] / factor, dims[3] / factor);
                let mut out = Tensor::zeros(vec![dims[0], channels, height, width]);
                for b in 0..dims[0] {
                    for c in 0..channels {
                        for y in 0..height {
                            for x in 0..width {
                                let v = image.get(&[b, 0, y * factor, x * factor])?;
                                out.set(&[b, c, y, x], v)?;
                            }
                        }
                    }
                }
                Ok(out)
            }
            (kind, value) => Err(OnnxError::InvalidInput(format!(
                "{:?} stub cannot take {} input",
                kind,
                value.element_type()
            ))),
        }
    }
}

/// Nearest-neighbour upsample; `channels` replicates channel 0.
pub fn upsample(input: &Tensor<f32>, factor: usize, channels: Option<usize>) -> Tensor<f32> {
    let dims = input.dimensions();
    let (batch, in_channels, height, width) = (dims[0], dims[1], dims[2], dims[3]);
    let out_channels = channels.unwrap_or(in_channels);
    let mut values = Vec::with_capacity(batch * out_channels * height * width * factor * factor);
    let source = input.as_slice();
    for b in 0..batch {
        for c in 0..out_channels {
            let source_channel = if channels.is_some() { 0 } else { c };
            for y in 0..height * factor {
                for x in 0..width * factor {
                    let index = ((b * in_channels + source_channel) * height + y / factor) * width + x / factor;
                    values.push(source[index]);
                }
            }
        }
    }
    Tensor::from_vec(values, vec![batch, out_channels, height * factor, width * factor]).unwrap()
}

impl InferenceBackend for StubBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_loaded(&self) -> bool {
        self.stats.is_loaded()
    }

    fn load(&mut self) -> Result<()> {
        if !self.stats.loaded.swap(true, Ordering::SeqCst) {
            self.stats.loads.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn unload(&mut self) {
        if self.stats.loaded.swap(false, Ordering::SeqCst) {
            self.stats.unloads.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn run(&mut self, request: InferenceRequest, token: &CancellationToken) -> Result<ModelOutputs> {
        if token.is_cancelled() {
            return Err(OnnxError::Cancelled);
        }
        self.load()?;
        let call = self.stats.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        let (_, input) = request
            .inputs
            .first()
            .ok_or_else(|| OnnxError::InvalidInput("no inputs".to_string()))?;
        self.stats.max_batch.fetch_max(input.dimensions()[0], Ordering::SeqCst);
        let output = self.compute(input)?;

        if let Some((at, cancel)) = &self.cancel_on_call {
            if *at == call {
                cancel.cancel();
            }
        }

        let spec = request
            .outputs
            .first()
            .ok_or_else(|| OnnxError::InvalidInput("no outputs".to_string()))?;
        let mut outputs = ModelOutputs::new();
        outputs.insert(spec.name.clone(), output);
        Ok(outputs)
    }
}

pub struct StubModels {
    pub models: DiffusionModels,
    pub text_encoder: StubStats,
    pub denoiser: StubStats,
    pub decoder: StubStats,
    pub encoder: StubStats,
}

pub fn stub_models(latent_channels: usize) -> StubModels {
    stub_models_with(StubBackend::new("denoiser", StubKind::Denoiser), latent_channels)
}

pub fn stub_models_with(denoiser: StubBackend, latent_channels: usize) -> StubModels {
    let text_encoder = StubBackend::new("text_encoder", StubKind::TextEncoder);
    let decoder = StubBackend::new("vae_decoder", StubKind::Decoder { factor: 8 });
    let encoder = StubBackend::new(
        "vae_encoder",
        StubKind::Encoder {
            factor: 8,
            channels: latent_channels,
        },
    );
    StubModels {
        text_encoder: text_encoder.stats(),
        denoiser: denoiser.stats(),
        decoder: decoder.stats(),
        encoder: encoder.stats(),
        models: DiffusionModels {
            text_encoder: Box::new(text_encoder),
            denoiser: Box::new(denoiser),
            vae_decoder: Box::new(decoder),
            vae_encoder: Some(Box::new(encoder)),
        },
    }
}

pub fn tokens(ids: &[i64]) -> Tensor<i64> {
    Tensor::from_vec(ids.to_vec(), vec![1, ids.len()]).unwrap()
}

pub fn prompt() -> PromptTokens {
    PromptTokens::new(tokens(&[49406, 320, 1929, 49407])).with_negative(tokens(&[49406, 49407, 0, 0]))
}

/// Small, unguided text-to-image options.
pub fn small_options(scheduler: SchedulerType, steps: usize) -> GenerateOptions {
    GenerateOptions {
        steps,
        guidance_scale: 1.0,
        width: 64,
        height: 64,
        scheduler_type: Some(scheduler),
        ..Default::default()
    }
}
