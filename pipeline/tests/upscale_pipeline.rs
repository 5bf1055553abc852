mod support;

use common::{CancellationToken, MemoryMode};
use support::*;
use tensorstack_pipeline::{
    NoProgress, Pipeline, PipelineConfig, PipelineType, Progress, ProgressStage, UpscalePipeline, UpscaleRequest,
};
use tensorstack_tensor::{ImageTensor, Tensor, TileMode, TileOptions};

fn config(factor: usize) -> PipelineConfig {
    PipelineConfig {
        upscale_factor: factor,
        ..PipelineConfig::for_type(PipelineType::Upscale)
    }
}

fn gradient(size: usize) -> ImageTensor {
    let data = (0..3 * size * size).map(|v| (v % 97) as f32 / 97.0).collect();
    ImageTensor::new(Tensor::from_vec(data, vec![1, 3, size, size]).unwrap()).unwrap()
}

fn tiles() -> TileOptions {
    TileOptions {
        mode: TileMode::Quadrant,
        max_tile_size: 32,
        overlap: 4,
        min_tile_size: 16,
    }
}

#[test]
fn test_tiled_upscale_matches_whole_image() {
    init();
    let token = CancellationToken::new();

    let whole_backend = StubBackend::new("upscaler", StubKind::Upscaler { factor: 2 });
    let whole_stats = whole_backend.stats();
    let mut whole_pipeline = UpscalePipeline::new(config(2), Box::new(whole_backend)).unwrap();
    let whole = whole_pipeline
        .upscale(&UpscaleRequest::new(gradient(64)), &mut NoProgress, &token)
        .unwrap();

    let tiled_backend = StubBackend::new("upscaler", StubKind::Upscaler { factor: 2 });
    let tiled_stats = tiled_backend.stats();
    let mut tiled_pipeline = UpscalePipeline::new(config(2), Box::new(tiled_backend)).unwrap();
    let mut reports = Vec::new();
    let mut progress = |p: Progress| reports.push(p);
    let tiled = tiled_pipeline
        .upscale(&UpscaleRequest::new(gradient(64)).with_tiles(tiles()), &mut progress, &token)
        .unwrap();

    assert_eq!(whole_stats.calls(), 1);
    assert_eq!(tiled_stats.calls(), 4);
    assert_eq!(tiled.tensor().dimensions(), &[1, 3, 128, 128]);
    for (a, b) in whole.tensor().as_slice().iter().zip(tiled.tensor().as_slice()) {
        assert!((a - b).abs() < 1e-5, "{} vs {}", a, b);
    }
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].stage, ProgressStage::Upscaling);
}

#[test]
fn test_batch_is_upscaled_image_by_image() {
    init();
    let backend = StubBackend::new("upscaler", StubKind::Upscaler { factor: 4 });
    let stats = backend.stats();
    let mut pipeline = UpscalePipeline::new(
        PipelineConfig::for_type(PipelineType::Upscale).with_memory_mode(MemoryMode::Minimum),
        Box::new(backend),
    )
    .unwrap();
    assert_eq!(pipeline.scale_factor(), 4);

    let batch = ImageTensor::zeros(2, 3, 16, 16).unwrap();
    let output = pipeline
        .upscale(&UpscaleRequest::new(batch), &mut NoProgress, &CancellationToken::new())
        .unwrap();
    assert_eq!(output.tensor().dimensions(), &[2, 3, 64, 64]);
    assert_eq!(stats.calls(), 2);
    assert_eq!(stats.max_batch(), 1);
    assert!(!pipeline.is_loaded());
}

#[test]
fn test_wrong_output_size_is_an_error() {
    init();
    let backend = StubBackend::new("upscaler", StubKind::Upscaler { factor: 3 });
    let mut pipeline = UpscalePipeline::new(config(2), Box::new(backend)).unwrap();
    let result = pipeline.upscale(&UpscaleRequest::new(gradient(16)), &mut NoProgress, &CancellationToken::new());
    let error = result.unwrap_err();
    assert!(!error.is_cancelled());
}

#[test]
fn test_cancelled_upscale() {
    init();
    let backend = StubBackend::new("upscaler", StubKind::Upscaler { factor: 2 });
    let stats = backend.stats();
    let mut pipeline = UpscalePipeline::new(config(2), Box::new(backend)).unwrap();
    let token = CancellationToken::new();
    token.cancel();
    let result = pipeline.upscale(&UpscaleRequest::new(gradient(64)).with_tiles(tiles()), &mut NoProgress, &token);
    assert!(result.unwrap_err().is_cancelled());
    assert_eq!(stats.calls(), 0);
}

#[test]
fn test_requires_upscale_config() {
    let backend = StubBackend::new("upscaler", StubKind::Upscaler { factor: 2 });
    assert!(UpscalePipeline::new(PipelineConfig::default(), Box::new(backend)).is_err());
}
