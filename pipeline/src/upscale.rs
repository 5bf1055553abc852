//! Single-model super resolution through the tiling engine.

use crate::base::Pipeline;
use crate::config::{ModelIoNames, PipelineConfig};
use crate::error::{invalid, Result};
use crate::progress::{Progress, ProgressSink, ProgressStage};
use crate::stage::ModelStage;
use crate::types::PipelineType;
use common::CancellationToken;
use std::time::Instant;
use tensorstack_onnx_loader::{InferenceBackend, InferenceRequest, OutputSpec};
use tensorstack_tensor::{run_tiled, ImageTensor, Tensor, TileOptions};

#[derive(Debug, Clone)]
pub struct UpscaleRequest {
    pub image: ImageTensor,
    pub tile: TileOptions,
}

impl UpscaleRequest {
    pub fn new(image: ImageTensor) -> Self {
        Self {
            image,
            tile: TileOptions::default(),
        }
    }

    pub fn with_tiles(mut self, tile: TileOptions) -> Self {
        self.tile = tile;
        self
    }
}

pub struct UpscalePipeline {
    config: PipelineConfig,
    backend: Box<dyn InferenceBackend>,
}

impl UpscalePipeline {
    pub fn new(config: PipelineConfig, backend: Box<dyn InferenceBackend>) -> Result<Self> {
        config.validate()?;
        if config.pipeline_type != PipelineType::Upscale {
            return Err(invalid(format!("{} is not an upscale pipeline", config.pipeline_type)));
        }
        Ok(Self { config, backend })
    }

    pub fn scale_factor(&self) -> usize {
        self.config.upscale_factor
    }

    /// Upscales every image of the batch, tile by tile when oversized.
    pub fn upscale(
        &mut self,
        request: &UpscaleRequest,
        progress: &mut dyn ProgressSink,
        token: &CancellationToken,
    ) -> Result<ImageTensor> {
        let start = Instant::now();
        request.tile.validate()?;
        let factor = self.config.upscale_factor;
        let names = &self.config.names;
        let input = request.image.tensor();
        let total = request.image.batch();
        log::info!(
            "Upscaling {} image(s) of {}x{} by {}",
            total,
            request.image.width(),
            request.image.height(),
            factor
        );

        let mut stage = ModelStage::enter(&mut *self.backend, self.config.memory_mode);
        let mut upscaled = Vec::with_capacity(total);
        for (i, image) in input.split(0)?.enumerate() {
            common::ensure_active(token)?;
            let output = run_tiled(image.to_tensor(), &request.tile, |tile| {
                upscale_tile(&mut stage, names, tile, factor, token)
            })?;
            upscaled.push(output);
            progress.report(Progress::new(ProgressStage::Upscaling, i + 1, total, start.elapsed()));
        }
        drop(stage);

        log::info!("Upscale finished in {:.2?}", start.elapsed());
        Ok(ImageTensor::new(Tensor::join(&upscaled, 0)?)?)
    }
}

fn upscale_tile(
    stage: &mut ModelStage<'_>,
    names: &ModelIoNames,
    tile: Tensor<f32>,
    factor: usize,
    token: &CancellationToken,
) -> Result<Tensor<f32>> {
    let expected = match tile.dimensions() {
        &[batch, channels, height, width] => vec![batch, channels, height * factor, width * factor],
        other => return Err(invalid(format!("expected an image tile, got {:?}", other))),
    };
    let output = OutputSpec::with_dimensions(&names.upscaler_output, expected);
    let request = InferenceRequest::new()
        .with_input(&names.upscaler_input, tile)
        .with_output(output.clone());
    let mut outputs = stage.run(request, token)?;
    outputs.validate(&[output])?;
    Ok(outputs.take_float(&names.upscaler_output)?)
}

impl Pipeline for UpscalePipeline {
    type Request = UpscaleRequest;
    type Output = ImageTensor;

    fn pipeline_type(&self) -> PipelineType {
        PipelineType::Upscale
    }

    fn is_loaded(&self) -> bool {
        self.backend.is_loaded()
    }

    fn load(&mut self) -> Result<()> {
        Ok(self.backend.load()?)
    }

    fn unload(&mut self) {
        self.backend.unload();
    }

    fn run(
        &mut self,
        request: &UpscaleRequest,
        progress: &mut dyn ProgressSink,
        token: &CancellationToken,
    ) -> Result<ImageTensor> {
        self.upscale(request, progress, token)
    }
}
