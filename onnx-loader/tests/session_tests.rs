//! Session behaviour that does not need a model file on disk.

use common::CancellationToken;
use std::fs;
use tempfile::TempDir;
use tensorstack_onnx_loader::{
    ExecutionProviderKind, InferenceBackend, InferenceRequest, OnnxError, OnnxSession, OutputSpec,
    SessionOptions,
};
use tensorstack_tensor::Tensor;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn request() -> InferenceRequest {
    InferenceRequest::new()
        .with_input("sample", Tensor::filled(vec![1, 4, 8, 8], 0.0f32))
        .with_output(OutputSpec::new("out_sample"))
}

#[test]
fn test_session_is_lazy() {
    init();
    let session = OnnxSession::new("unet", "/nonexistent/unet/model.onnx", SessionOptions::default());
    assert!(!session.is_loaded());
    assert_eq!(session.name(), "unet");
}

#[test]
fn test_missing_model_fails_on_first_run() {
    init();
    let mut session = OnnxSession::new("unet", "/nonexistent/unet/model.onnx", SessionOptions::default());
    let result = session.run(request(), &CancellationToken::new());
    assert!(matches!(result, Err(OnnxError::ModelLoadFailed(_))));
    assert!(!session.is_loaded());
}

#[test]
fn test_cancelled_before_load() {
    init();
    let mut session = OnnxSession::new("unet", "/nonexistent/unet/model.onnx", SessionOptions::default());
    let token = CancellationToken::new();
    token.cancel();
    let result = session.run(request(), &token);
    assert!(matches!(result, Err(OnnxError::Cancelled)));
    assert!(result.unwrap_err().is_cancelled());
}

#[test]
fn test_invalid_request_is_rejected_before_load() {
    init();
    let mut session = OnnxSession::new("vae", "/nonexistent/vae.onnx", SessionOptions::default());
    let no_outputs = InferenceRequest::new().with_input("latent", Tensor::filled(vec![1], 0.0f32));
    assert!(matches!(
        session.run(no_outputs, &CancellationToken::new()),
        Err(OnnxError::InvalidInput(_))
    ));
}

#[test]
fn test_directory_model_path_fails_to_load() -> anyhow::Result<()> {
    init();
    let dir = TempDir::new()?;
    let mut session = OnnxSession::new("unet", dir.path(), SessionOptions::default());
    assert!(matches!(session.load(), Err(OnnxError::ModelLoadFailed(_))));
    assert!(!session.is_loaded());
    Ok(())
}

#[cfg(unix)]
#[test]
fn test_unreadable_model_path_surfaces_io_error() -> anyhow::Result<()> {
    init();
    let dir = TempDir::new()?;
    let blocker = dir.path().join("weights.bin");
    fs::write(&blocker, b"plain file")?;
    // A regular file used as a directory component fails with ENOTDIR, not ENOENT.
    let mut session = OnnxSession::new("unet", blocker.join("model.onnx"), SessionOptions::default());
    assert!(matches!(session.load(), Err(OnnxError::Io(_))));
    assert!(!session.is_loaded());
    Ok(())
}

#[test]
fn test_corrupt_model_fails_to_load() -> anyhow::Result<()> {
    init();
    let dir = TempDir::new()?;
    let path = dir.path().join("model.onnx");
    fs::write(&path, b"not an onnx graph")?;
    let mut session = OnnxSession::new("text_encoder", &path, SessionOptions::default());
    assert!(session.load().is_err());
    assert!(!session.is_loaded());
    session.unload();
    assert!(!session.is_loaded());
    Ok(())
}

#[test]
fn test_session_options_from_json() -> anyhow::Result<()> {
    let options: SessionOptions = serde_json::from_str(r#"{"provider": "cuda", "intra_threads": 8}"#)?;
    assert_eq!(options.provider, ExecutionProviderKind::Cuda);
    assert_eq!(options.intra_threads, 8);
    assert_eq!(options.inter_threads, 2);
    assert_eq!(options.optimization_level, 3);
    Ok(())
}
