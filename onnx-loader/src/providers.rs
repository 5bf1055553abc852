//! Execution provider selection.
//!
//! Hardware providers are compiled in through cargo features. A provider that
//! was requested but not compiled in is skipped with a warning, and the CPU
//! provider is always registered last as the fallback.

use ort::execution_providers::{CPUExecutionProvider, ExecutionProviderDispatch};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProviderKind {
    #[default]
    Cpu,
    Cuda,
    TensorRt,
    DirectMl,
    CoreMl,
}

impl ExecutionProviderKind {
    /// Whether this build can register the provider.
    pub fn is_compiled(&self) -> bool {
        match self {
            Self::Cpu => true,
            Self::Cuda => cfg!(feature = "cuda"),
            Self::TensorRt => cfg!(feature = "tensorrt"),
            Self::DirectMl => cfg!(feature = "directml"),
            Self::CoreMl => cfg!(feature = "coreml"),
        }
    }
}

impl fmt::Display for ExecutionProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Cpu => "cpu",
            Self::Cuda => "cuda",
            Self::TensorRt => "tensorrt",
            Self::DirectMl => "directml",
            Self::CoreMl => "coreml",
        };
        f.write_str(name)
    }
}

/// Providers to register for `kind` on `device_id`, CPU last.
pub fn dispatch_for(kind: ExecutionProviderKind, device_id: i32) -> Vec<ExecutionProviderDispatch> {
    let mut providers = Vec::new();
    match convert_provider(kind, device_id) {
        Some(provider) => {
            log::info!("Registered {} execution provider (device {})", kind, device_id);
            providers.push(provider);
        }
        None if kind != ExecutionProviderKind::Cpu => {
            log::warn!("{} provider requested but not compiled in, falling back to CPU", kind);
        }
        None => {}
    }
    providers.push(CPUExecutionProvider::default().build());
    providers
}

#[allow(unused_variables)]
fn convert_provider(kind: ExecutionProviderKind, device_id: i32) -> Option<ExecutionProviderDispatch> {
    match kind {
        ExecutionProviderKind::Cpu => None,

        ExecutionProviderKind::Cuda => {
            #[cfg(feature = "cuda")]
            {
                Some(
                    ort::execution_providers::CUDAExecutionProvider::default()
                        .with_device_id(device_id)
                        .build(),
                )
            }
            #[cfg(not(feature = "cuda"))]
            {
                None
            }
        }

        ExecutionProviderKind::TensorRt => {
            #[cfg(feature = "tensorrt")]
            {
                Some(
                    ort::execution_providers::TensorRTExecutionProvider::default()
                        .with_device_id(device_id)
                        .with_fp16(true)
                        .build(),
                )
            }
            #[cfg(not(feature = "tensorrt"))]
            {
                None
            }
        }

        ExecutionProviderKind::DirectMl => {
            #[cfg(feature = "directml")]
            {
                Some(
                    ort::execution_providers::DirectMLExecutionProvider::default()
                        .with_device_id(device_id)
                        .build(),
                )
            }
            #[cfg(not(feature = "directml"))]
            {
                None
            }
        }

        ExecutionProviderKind::CoreMl => {
            #[cfg(feature = "coreml")]
            {
                Some(ort::execution_providers::CoreMLExecutionProvider::default().build())
            }
            #[cfg(not(feature = "coreml"))]
            {
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_is_always_registered() {
        assert_eq!(dispatch_for(ExecutionProviderKind::Cpu, 0).len(), 1);
        for kind in [
            ExecutionProviderKind::Cuda,
            ExecutionProviderKind::TensorRt,
            ExecutionProviderKind::DirectMl,
            ExecutionProviderKind::CoreMl,
        ] {
            let expected = if kind.is_compiled() { 2 } else { 1 };
            assert_eq!(dispatch_for(kind, 0).len(), expected);
        }
    }

    #[test]
    fn test_kind_serialization() {
        let kind: ExecutionProviderKind = serde_json::from_str("\"directml\"").unwrap();
        assert_eq!(kind, ExecutionProviderKind::DirectMl);
        assert_eq!(serde_json::to_string(&ExecutionProviderKind::TensorRt).unwrap(), "\"tensorrt\"");
        assert_eq!(ExecutionProviderKind::Cuda.to_string(), "cuda");
    }
}
