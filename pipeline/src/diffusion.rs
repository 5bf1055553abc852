//! Text-to-image and image-to-image diffusion.
//!
//! One request runs: prompt encoding (cached across requests), initial latent
//! preparation, the scheduler loop with optional classifier-free guidance,
//! and VAE decoding frame by frame, tiled when the image is large.

use crate::base::Pipeline;
use crate::config::{GenerateOptions, ModelIoNames, PipelineConfig};
use crate::error::{invalid, PipelineError, Result};
use crate::guidance::{apply_guidance, is_guidance_enabled};
use crate::progress::{Progress, ProgressSink, ProgressStage};
use crate::stage::ModelStage;
use crate::types::PipelineType;
use common::{CancellationToken, ProcessType};
use std::time::{Duration, Instant};
use tensorstack_onnx_loader::{InferenceBackend, InferenceRequest, OutputSpec};
use tensorstack_scheduler::{DiffusionScheduler, Scheduler, SchedulerType};
use tensorstack_tensor::{random_normal, run_tiled, seeded_rng, ImageTensor, Tensor, VideoTensor};

/// The backends a diffusion pipeline drives.
pub struct DiffusionModels {
    pub text_encoder: Box<dyn InferenceBackend>,
    pub denoiser: Box<dyn InferenceBackend>,
    pub vae_decoder: Box<dyn InferenceBackend>,
    /// Only needed for image-to-image.
    pub vae_encoder: Option<Box<dyn InferenceBackend>>,
}

impl DiffusionModels {
    fn all_mut(&mut self) -> Vec<&mut dyn InferenceBackend> {
        let mut models: Vec<&mut dyn InferenceBackend> = vec![
            &mut *self.text_encoder,
            &mut *self.denoiser,
            &mut *self.vae_decoder,
        ];
        if let Some(encoder) = self.vae_encoder.as_deref_mut() {
            models.push(encoder);
        }
        models
    }
}

/// Token ids produced by an external tokenizer.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTokens {
    pub positive: Tensor<i64>,
    /// Required when guidance is enabled.
    pub negative: Option<Tensor<i64>>,
}

impl PromptTokens {
    pub fn new(positive: Tensor<i64>) -> Self {
        Self {
            positive,
            negative: None,
        }
    }

    pub fn with_negative(mut self, negative: Tensor<i64>) -> Self {
        self.negative = Some(negative);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PromptEmbeddings {
    pub cond: Tensor<f32>,
    pub uncond: Option<Tensor<f32>>,
}

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub prompt: PromptTokens,
    /// `[1, channels, height, width]` in `[-1, 1]`, for image-to-image.
    pub input_image: Option<ImageTensor>,
    pub options: GenerateOptions,
}

impl GenerateRequest {
    pub fn new(prompt: PromptTokens, options: GenerateOptions) -> Self {
        Self {
            prompt,
            input_image: None,
            options,
        }
    }

    pub fn with_input_image(mut self, image: ImageTensor) -> Self {
        self.input_image = Some(image);
        self
    }
}

#[derive(Debug, Clone)]
pub struct GenerateOutput {
    /// Decoded frames, batch = `frames`, values in `[-1, 1]`.
    pub images: ImageTensor,
    /// Final latent before decoding.
    pub latent: Tensor<f32>,
    pub scheduler_type: SchedulerType,
    pub steps: usize,
    pub elapsed: Duration,
}

impl GenerateOutput {
    pub fn into_video(self, frame_rate: f32) -> Result<VideoTensor> {
        Ok(VideoTensor::new(self.images.into_tensor(), frame_rate)?)
    }
}

struct PromptCache {
    tokens: PromptTokens,
    embeddings: PromptEmbeddings,
}

impl PromptCache {
    fn matches(&self, prompt: &PromptTokens, guided: bool) -> bool {
        self.tokens.positive == prompt.positive
            && (!guided || (self.embeddings.uncond.is_some() && self.tokens.negative == prompt.negative))
    }
}

pub struct DiffusionPipeline {
    config: PipelineConfig,
    models: DiffusionModels,
    prompt_cache: Option<PromptCache>,
}

impl DiffusionPipeline {
    pub fn new(config: PipelineConfig, models: DiffusionModels) -> Result<Self> {
        config.validate()?;
        if config.pipeline_type == PipelineType::Upscale {
            return Err(invalid("upscale models run through UpscalePipeline"));
        }
        log::info!("Created {} pipeline ({:?} memory)", config.pipeline_type, config.memory_mode);
        Ok(Self {
            config,
            models,
            prompt_cache: None,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn clear_prompt_cache(&mut self) {
        self.prompt_cache = None;
    }

    pub fn generate(
        &mut self,
        request: &GenerateRequest,
        progress: &mut dyn ProgressSink,
        token: &CancellationToken,
    ) -> Result<GenerateOutput> {
        let start = Instant::now();
        let options = &request.options;
        self.config.validate_options(options)?;
        self.check_request(request)?;

        let scheduler_type = options.resolve_scheduler(self.config.pipeline_type)?;
        let latent_dimensions = self.config.latent_dimensions(options)?;
        let scheduler_options = options.scheduler_options(latent_dimensions[2], latent_dimensions[3]);
        let mut scheduler = DiffusionScheduler::create(scheduler_type, scheduler_options)?;
        scheduler.initialize(options.strength)?;
        let steps = scheduler.total_steps();
        log::info!(
            "Generating {}x{} ({} frame(s)) with {}: {} steps, guidance {}, seed {}",
            options.width,
            options.height,
            options.frames,
            scheduler_type,
            steps,
            options.guidance_scale,
            options.seed
        );

        common::ensure_active(token)?;
        let guided = is_guidance_enabled(options.guidance_scale);
        let embeddings = self.encode_prompt(&request.prompt, guided, token)?;
        progress.report(Progress::new(ProgressStage::TextEncoding, 1, 1, start.elapsed()));

        let noise = random_normal(latent_dimensions, &mut seeded_rng(options.seed));
        let latent = match &request.input_image {
            Some(image) if options.process_type == ProcessType::ImageToImage => {
                let encoded = self.encode_image(image, options.frames, token)?;
                progress.report(Progress::new(ProgressStage::ImageEncoding, 1, 1, start.elapsed()));
                let first = scheduler
                    .timesteps()
                    .first()
                    .copied()
                    .ok_or_else(|| invalid("empty schedule"))?;
                scheduler.scale_noise(first, &encoded, &noise)?
            }
            _ => noise.mul_scalar(scheduler.init_noise_sigma()),
        };

        let latent = self.denoise(&mut scheduler, latent, &embeddings, options, progress, token, start)?;
        let images = self.decode(&latent, options, progress, token, start)?;

        let elapsed = start.elapsed();
        log::info!("Generation finished in {:.2?}", elapsed);
        Ok(GenerateOutput {
            images,
            latent,
            scheduler_type,
            steps,
            elapsed,
        })
    }

    fn check_request(&self, request: &GenerateRequest) -> Result<()> {
        let options = &request.options;
        if !self.config.pipeline_type.supports(options.process_type) {
            return Err(invalid(format!(
                "{} pipelines do not support {}",
                self.config.pipeline_type, options.process_type
            )));
        }
        if options.process_type == ProcessType::ImageToImage {
            let image = request
                .input_image
                .as_ref()
                .ok_or_else(|| invalid("image-to-image requires an input image"))?;
            if image.batch() != 1 || image.height() != options.height || image.width() != options.width {
                return Err(invalid(format!(
                    "input image {:?} does not match a single {}x{} image",
                    image.tensor().dimensions(),
                    options.width,
                    options.height
                )));
            }
            if self.models.vae_encoder.is_none() {
                return Err(invalid("image-to-image requires a VAE encoder"));
            }
        }
        if is_guidance_enabled(options.guidance_scale) && request.prompt.negative.is_none() {
            return Err(invalid("guidance requires negative prompt tokens"));
        }
        Ok(())
    }

    fn encode_prompt(
        &mut self,
        prompt: &PromptTokens,
        guided: bool,
        token: &CancellationToken,
    ) -> Result<PromptEmbeddings> {
        if let Some(cache) = &self.prompt_cache {
            if cache.matches(prompt, guided) {
                log::debug!("Prompt embeddings reused from cache");
                return Ok(cache.embeddings.clone());
            }
        }

        let names = &self.config.names;
        let mut stage = ModelStage::enter(&mut *self.models.text_encoder, self.config.memory_mode);
        let cond = encode_tokens(&mut stage, names, &prompt.positive, token)?;
        let uncond = match (&prompt.negative, guided) {
            (Some(negative), true) => Some(encode_tokens(&mut stage, names, negative, token)?),
            _ => None,
        };
        drop(stage);

        let embeddings = PromptEmbeddings { cond, uncond };
        self.prompt_cache = Some(PromptCache {
            tokens: prompt.clone(),
            embeddings: embeddings.clone(),
        });
        Ok(embeddings)
    }

    fn encode_image(&mut self, image: &ImageTensor, frames: usize, token: &CancellationToken) -> Result<Tensor<f32>> {
        let names = &self.config.names;
        let encoder = self
            .models
            .vae_encoder
            .as_deref_mut()
            .ok_or_else(|| PipelineError::ModelNotLoaded("vae_encoder".to_string()))?;
        let mut stage = ModelStage::enter(encoder, self.config.memory_mode);
        let request = InferenceRequest::new()
            .with_input(&names.vae_encoder_input, image.tensor().clone())
            .with_output(OutputSpec::new(&names.vae_encoder_output));
        let mut latent = stage.run(request, token)?.take_float(&names.vae_encoder_output)?;
        latent.sub_scalar_in_place(self.config.vae_shift_factor());
        latent.mul_scalar_in_place(self.config.vae_scaling_factor());
        Ok(latent.repeat(frames, 0)?)
    }

    #[allow(clippy::too_many_arguments)]
    fn denoise(
        &mut self,
        scheduler: &mut DiffusionScheduler,
        mut latent: Tensor<f32>,
        embeddings: &PromptEmbeddings,
        options: &GenerateOptions,
        progress: &mut dyn ProgressSink,
        token: &CancellationToken,
        start: Instant,
    ) -> Result<Tensor<f32>> {
        let cond = embeddings.cond.clone().repeat(options.frames, 0)?;
        let uncond = match &embeddings.uncond {
            Some(uncond) if is_guidance_enabled(options.guidance_scale) => {
                Some(uncond.clone().repeat(options.frames, 0)?)
            }
            _ => None,
        };

        let names = &self.config.names;
        let mut stage = ModelStage::enter(&mut *self.models.denoiser, self.config.memory_mode);
        let timesteps = scheduler.timesteps().to_vec();
        let total = timesteps.len();

        for (i, &timestep) in timesteps.iter().enumerate() {
            common::ensure_active(token)?;
            let input = scheduler.scale_input(timestep, &latent)?;
            let cond_prediction = predict(&mut stage, names, &input, timestep, &cond, token)?;
            let prediction = match &uncond {
                Some(uncond) => {
                    let uncond_prediction = predict(&mut stage, names, &input, timestep, uncond, token)?;
                    apply_guidance(&cond_prediction, &uncond_prediction, options.guidance_scale)?
                }
                None => cond_prediction,
            };

            let output = scheduler.step(timestep, &prediction, &latent)?;
            latent = output.sample;

            let mut report = Progress::new(ProgressStage::Denoising, i + 1, total, start.elapsed());
            if scheduler.is_final_order() {
                report.preview = output.denoised;
            }
            progress.report(report);
            log::debug!("Step {}/{} at timestep {:.3}", i + 1, total, timestep);
        }
        Ok(latent)
    }

    fn decode(
        &mut self,
        latent: &Tensor<f32>,
        options: &GenerateOptions,
        progress: &mut dyn ProgressSink,
        token: &CancellationToken,
        start: Instant,
    ) -> Result<ImageTensor> {
        let mut scaled = latent.div_scalar(self.config.vae_scaling_factor());
        scaled.add_scalar_in_place(self.config.vae_shift_factor());
        let tile = self.config.latent_tile_options(&options.tile);

        let names = &self.config.names;
        let mut stage = ModelStage::enter(&mut *self.models.vae_decoder, self.config.memory_mode);
        let total = scaled.dimensions()[0];
        let mut frames = Vec::with_capacity(total);
        for (i, frame) in scaled.split(0)?.enumerate() {
            common::ensure_active(token)?;
            let decoded = run_tiled(frame.to_tensor(), &tile, |tile_latent| {
                decode_tile(&mut stage, names, tile_latent, token)
            })?;
            frames.push(decoded);
            progress.report(Progress::new(ProgressStage::Decoding, i + 1, total, start.elapsed()));
        }
        Ok(ImageTensor::new(Tensor::join(&frames, 0)?)?)
    }
}

fn encode_tokens(
    stage: &mut ModelStage<'_>,
    names: &ModelIoNames,
    tokens: &Tensor<i64>,
    token: &CancellationToken,
) -> Result<Tensor<f32>> {
    let request = InferenceRequest::new()
        .with_input(&names.text_encoder_input, tokens.clone())
        .with_output(OutputSpec::new(&names.text_encoder_output));
    Ok(stage.run(request, token)?.take_float(&names.text_encoder_output)?)
}

fn predict(
    stage: &mut ModelStage<'_>,
    names: &ModelIoNames,
    sample: &Tensor<f32>,
    timestep: f32,
    hidden_states: &Tensor<f32>,
    token: &CancellationToken,
) -> Result<Tensor<f32>> {
    let output = OutputSpec::with_dimensions(&names.denoiser_output, sample.dimensions().to_vec());
    let request = InferenceRequest::new()
        .with_input(&names.denoiser_sample, sample.clone())
        .with_input(&names.denoiser_timestep, Tensor::filled(vec![1], timestep))
        .with_input(&names.denoiser_hidden_states, hidden_states.clone())
        .with_output(output.clone());
    let mut outputs = stage.run(request, token)?;
    outputs.validate(&[output])?;
    Ok(outputs.take_float(&names.denoiser_output)?)
}

fn decode_tile(
    stage: &mut ModelStage<'_>,
    names: &ModelIoNames,
    latent: Tensor<f32>,
    token: &CancellationToken,
) -> Result<Tensor<f32>> {
    let request = InferenceRequest::new()
        .with_input(&names.vae_decoder_input, latent)
        .with_output(OutputSpec::new(&names.vae_decoder_output));
    Ok(stage.run(request, token)?.take_float(&names.vae_decoder_output)?)
}

impl Pipeline for DiffusionPipeline {
    type Request = GenerateRequest;
    type Output = GenerateOutput;

    fn pipeline_type(&self) -> PipelineType {
        self.config.pipeline_type
    }

    fn is_loaded(&self) -> bool {
        self.models.text_encoder.is_loaded() && self.models.denoiser.is_loaded() && self.models.vae_decoder.is_loaded()
    }

    fn load(&mut self) -> Result<()> {
        for model in self.models.all_mut() {
            model.load()?;
        }
        Ok(())
    }

    fn unload(&mut self) {
        for model in self.models.all_mut() {
            model.unload();
        }
        log::info!("{} pipeline unloaded", self.config.pipeline_type);
    }

    fn run(
        &mut self,
        request: &GenerateRequest,
        progress: &mut dyn ProgressSink,
        token: &CancellationToken,
    ) -> Result<GenerateOutput> {
        self.generate(request, progress, token)
    }
}
