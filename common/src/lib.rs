//! Common types shared across the TensorStack crates.
//!
//! The `common` crate sits at the bottom of the dependency hierarchy:
//! - Has NO dependencies on other workspace crates
//! - Provides the enums every pipeline layer agrees on
//! - Loads settings files for any `serde` configuration type

pub mod cancellation;
pub mod memory;
pub mod process;
pub mod settings;

pub use cancellation::{ensure_active, Cancelled};
pub use memory::MemoryMode;
pub use process::ProcessType;
pub use settings::{load_settings, save_settings, SettingsError, SettingsFormat};

/// Re-exported so downstream crates share one token type.
pub use tokio_util::sync::CancellationToken;
