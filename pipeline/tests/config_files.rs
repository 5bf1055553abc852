use common::MemoryMode;
use std::io::Write;
use tensorstack_pipeline::{GenerateOptions, PipelineConfig, PipelineError, PipelineType};
use tensorstack_scheduler::SchedulerType;
use tensorstack_tensor::TileMode;

fn write_file(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_toml_config_overrides_defaults() {
    let file = write_file(
        ".toml",
        r#"
pipeline_type = "flux"
memory_mode = "minimum"
frame_rate = 12.0

[names]
denoiser_output = "noise_pred"
"#,
    );
    let config = PipelineConfig::from_file(file.path()).unwrap();
    assert_eq!(config.pipeline_type, PipelineType::Flux);
    assert_eq!(config.memory_mode, MemoryMode::Minimum);
    assert_eq!(config.latent_channels(), 16);
    assert_eq!(config.frame_rate, 12.0);
    assert_eq!(config.names.denoiser_output, "noise_pred");
    assert_eq!(config.names.denoiser_sample, "sample");
}

#[test]
fn test_json_config() {
    let file = write_file(".json", r#"{ "pipeline_type": "upscale", "upscale_factor": 2 }"#);
    let config = PipelineConfig::from_file(file.path()).unwrap();
    assert_eq!(config.pipeline_type, PipelineType::Upscale);
    assert_eq!(config.upscale_factor, 2);
}

#[test]
fn test_invalid_config_is_rejected() {
    let file = write_file(".toml", "latent_scale_factor = 0\n");
    assert!(matches!(
        PipelineConfig::from_file(file.path()),
        Err(PipelineError::InvalidConfiguration(_))
    ));

    let missing = PipelineConfig::from_file("/nonexistent/pipeline.toml");
    assert!(matches!(missing, Err(PipelineError::Settings(_))));
}

#[test]
fn test_generate_options_from_toml() {
    let options: GenerateOptions = toml::from_str(
        r#"
steps = 12
guidance_scale = 4.0
scheduler_type = "lms"

[scheduler]
order = 2

[tile]
mode = "quadrant"
max_tile_size = 256
"#,
    )
    .unwrap();
    assert_eq!(options.steps, 12);
    assert_eq!(options.scheduler_type, Some(SchedulerType::Lms));
    assert_eq!(options.scheduler.order, 2);
    assert_eq!(options.tile.mode, TileMode::Quadrant);
    assert_eq!(options.tile.overlap, 16);
    assert!(options.validate().is_ok());
}
