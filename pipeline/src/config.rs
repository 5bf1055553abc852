//! Pipeline and per-request configuration.
//!
//! Both structures deserialize from partial TOML/JSON documents; missing
//! fields take their defaults, and family-dependent values left unset fall
//! back to the [`PipelineType`].

use crate::error::{invalid, Result};
use crate::types::PipelineType;
use common::{load_settings, MemoryMode, ProcessType};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tensorstack_scheduler::{SchedulerOptions, SchedulerType};
use tensorstack_tensor::TileOptions;

/// Input and output tensor names of each model in a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelIoNames {
    pub text_encoder_input: String,
    pub text_encoder_output: String,
    pub denoiser_sample: String,
    pub denoiser_timestep: String,
    pub denoiser_hidden_states: String,
    pub denoiser_output: String,
    pub vae_encoder_input: String,
    pub vae_encoder_output: String,
    pub vae_decoder_input: String,
    pub vae_decoder_output: String,
    pub upscaler_input: String,
    pub upscaler_output: String,
}

impl Default for ModelIoNames {
    fn default() -> Self {
        Self {
            text_encoder_input: "input_ids".to_string(),
            text_encoder_output: "last_hidden_state".to_string(),
            denoiser_sample: "sample".to_string(),
            denoiser_timestep: "timestep".to_string(),
            denoiser_hidden_states: "encoder_hidden_states".to_string(),
            denoiser_output: "out_sample".to_string(),
            vae_encoder_input: "sample".to_string(),
            vae_encoder_output: "latent_sample".to_string(),
            vae_decoder_input: "latent_sample".to_string(),
            vae_decoder_output: "sample".to_string(),
            upscaler_input: "input".to_string(),
            upscaler_output: "output".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub pipeline_type: PipelineType,
    pub memory_mode: MemoryMode,
    /// Pixels per latent cell along each axis.
    pub latent_scale_factor: usize,
    pub latent_channels: Option<usize>,
    pub vae_scaling_factor: Option<f32>,
    pub vae_shift_factor: Option<f32>,
    /// Output size over input size for upscale models.
    pub upscale_factor: usize,
    pub frame_rate: f32,
    pub names: ModelIoNames,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::for_type(PipelineType::default())
    }
}

impl PipelineConfig {
    pub fn for_type(pipeline_type: PipelineType) -> Self {
        Self {
            pipeline_type,
            memory_mode: MemoryMode::default(),
            latent_scale_factor: 8,
            latent_channels: None,
            vae_scaling_factor: None,
            vae_shift_factor: None,
            upscale_factor: 4,
            frame_rate: 8.0,
            names: ModelIoNames::default(),
        }
    }

    pub fn with_memory_mode(mut self, memory_mode: MemoryMode) -> Self {
        self.memory_mode = memory_mode;
        self
    }

    /// Reads a TOML or JSON config file and validates it.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let config: Self = load_settings(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn latent_channels(&self) -> usize {
        self.latent_channels
            .unwrap_or_else(|| self.pipeline_type.latent_channels())
    }

    pub fn vae_scaling_factor(&self) -> f32 {
        self.vae_scaling_factor
            .unwrap_or_else(|| self.pipeline_type.vae_scaling_factor())
    }

    pub fn vae_shift_factor(&self) -> f32 {
        self.vae_shift_factor
            .unwrap_or_else(|| self.pipeline_type.vae_shift_factor())
    }

    pub fn validate(&self) -> Result<()> {
        if self.latent_scale_factor == 0 {
            return Err(invalid("latent_scale_factor must be positive"));
        }
        if self.pipeline_type != PipelineType::Upscale && self.latent_channels() == 0 {
            return Err(invalid("latent_channels must be positive"));
        }
        let scaling = self.vae_scaling_factor();
        if !(scaling.is_finite() && scaling > 0.0) {
            return Err(invalid(format!("vae_scaling_factor must be positive, got {}", scaling)));
        }
        if self.upscale_factor == 0 {
            return Err(invalid("upscale_factor must be positive"));
        }
        if !(self.frame_rate.is_finite() && self.frame_rate > 0.0) {
            return Err(invalid(format!("frame_rate must be positive, got {}", self.frame_rate)));
        }
        Ok(())
    }

    /// Validates `options` together with the tile geometry the decoder will
    /// see once pixel sizes are converted to latent cells.
    pub fn validate_options(&self, options: &GenerateOptions) -> Result<()> {
        options.validate()?;
        self.latent_tile_options(&options.tile).validate().map_err(|e| {
            invalid(format!(
                "tile options {:?} do not scale to latent space by {}: {}",
                options.tile, self.latent_scale_factor, e
            ))
        })?;
        Ok(())
    }

    /// `[frames, channels, height / f, width / f]` for a request.
    pub fn latent_dimensions(&self, options: &GenerateOptions) -> Result<Vec<usize>> {
        let f = self.latent_scale_factor;
        if options.width % f != 0 || options.height % f != 0 {
            return Err(invalid(format!(
                "{}x{} is not a multiple of the latent scale factor {}",
                options.width, options.height, f
            )));
        }
        Ok(vec![
            options.frames,
            self.latent_channels(),
            options.height / f,
            options.width / f,
        ])
    }

    /// Pixel-space tile options expressed in latent cells, for tiled decoding.
    pub fn latent_tile_options(&self, tile: &TileOptions) -> TileOptions {
        let f = self.latent_scale_factor.max(1);
        let overlap = tile.overlap / f;
        TileOptions {
            mode: tile.mode,
            max_tile_size: (tile.max_tile_size / f).max(1),
            overlap,
            min_tile_size: (tile.min_tile_size / f).max(overlap + 1),
        }
    }
}

/// One generation request's knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateOptions {
    pub process_type: ProcessType,
    pub steps: usize,
    /// Fraction of the schedule to run, in (0, 1]. Below 1 only for image-to-image.
    pub strength: f32,
    pub guidance_scale: f32,
    pub seed: u64,
    pub width: usize,
    pub height: usize,
    /// Latent batch decoded frame by frame; above 1 for video.
    pub frames: usize,
    /// `None` picks the pipeline family's default scheduler.
    pub scheduler_type: Option<SchedulerType>,
    pub scheduler: SchedulerOptions,
    pub tile: TileOptions,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            process_type: ProcessType::TextToImage,
            steps: 30,
            strength: 1.0,
            guidance_scale: 7.5,
            seed: 0,
            width: 512,
            height: 512,
            frames: 1,
            scheduler_type: None,
            scheduler: SchedulerOptions::default(),
            tile: TileOptions::default(),
        }
    }
}

impl GenerateOptions {
    pub fn validate(&self) -> Result<()> {
        if self.steps == 0 {
            return Err(invalid("steps must be at least 1"));
        }
        if !(self.strength > 0.0 && self.strength <= 1.0) {
            return Err(invalid(format!("strength must be in (0, 1], got {}", self.strength)));
        }
        if self.strength < 1.0 && self.process_type == ProcessType::TextToImage {
            return Err(invalid("strength below 1 requires an input image"));
        }
        if !(self.guidance_scale.is_finite() && self.guidance_scale >= 0.0) {
            return Err(invalid(format!(
                "guidance_scale must be non-negative, got {}",
                self.guidance_scale
            )));
        }
        if self.width == 0 || self.height == 0 {
            return Err(invalid("width and height must be positive"));
        }
        if self.frames == 0 {
            return Err(invalid("frames must be at least 1"));
        }
        self.tile.validate()?;
        Ok(())
    }

    /// Scheduler options with this request's steps and seed, and the latent
    /// sequence length used by dynamic shifting.
    pub fn scheduler_options(&self, latent_height: usize, latent_width: usize) -> SchedulerOptions {
        let mut options = self.scheduler.clone().with_steps(self.steps).with_seed(self.seed);
        if options.image_seq_len.is_none() {
            options.image_seq_len = Some((latent_height / 2) * (latent_width / 2));
        }
        options
    }

    pub fn resolve_scheduler(&self, pipeline_type: PipelineType) -> Result<SchedulerType> {
        self.scheduler_type
            .or_else(|| pipeline_type.default_scheduler())
            .ok_or_else(|| invalid(format!("{} pipelines do not use a scheduler", pipeline_type)))
    }
}
