//! Settings files.
//!
//! Any `serde` configuration type can be read from, or written to, a TOML or
//! JSON file. The format is picked from the file extension.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported settings format: {0}")]
    UnsupportedFormat(String),
}

impl From<toml::de::Error> for SettingsError {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml(e.to_string())
    }
}

impl From<toml::ser::Error> for SettingsError {
    fn from(e: toml::ser::Error) -> Self {
        Self::Toml(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsFormat {
    Toml,
    Json,
}

impl SettingsFormat {
    pub fn from_path(path: &Path) -> Result<Self, SettingsError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("toml") => Ok(Self::Toml),
            Some("json") => Ok(Self::Json),
            _ => Err(SettingsError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

pub fn load_settings<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, SettingsError> {
    let path = path.as_ref();
    let format = SettingsFormat::from_path(path)?;
    log::debug!("Loading {:?} settings from {}", format, path.display());
    let text = fs::read_to_string(path)?;
    match format {
        SettingsFormat::Toml => Ok(toml::from_str(&text)?),
        SettingsFormat::Json => Ok(serde_json::from_str(&text)?),
    }
}

pub fn save_settings<T: Serialize>(path: impl AsRef<Path>, settings: &T) -> Result<(), SettingsError> {
    let path = path.as_ref();
    let text = match SettingsFormat::from_path(path)? {
        SettingsFormat::Toml => toml::to_string_pretty(settings)?,
        SettingsFormat::Json => serde_json::to_string_pretty(settings)?,
    };
    fs::write(path, text)?;
    log::debug!("Saved settings to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryMode;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        steps: usize,
        guidance_scale: f32,
        memory_mode: MemoryMode,
    }

    fn sample() -> Sample {
        Sample {
            steps: 20,
            guidance_scale: 7.5,
            memory_mode: MemoryMode::Minimum,
        }
    }

    #[test]
    fn test_toml_and_json_round_trip() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        for name in ["settings.toml", "settings.json"] {
            let path = dir.path().join(name);
            save_settings(&path, &sample())?;
            let loaded: Sample = load_settings(&path)?;
            assert_eq!(loaded, sample());
        }
        Ok(())
    }

    #[test]
    fn test_reads_hand_written_toml() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("pipeline.TOML");
        fs::write(&path, "steps = 4\nguidance_scale = 1.0\nmemory_mode = \"maximum\"\n")?;
        let loaded: Sample = load_settings(&path)?;
        assert_eq!(loaded.steps, 4);
        assert_eq!(loaded.memory_mode, MemoryMode::Maximum);
        Ok(())
    }

    #[test]
    fn test_errors_are_classified() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let yaml = dir.path().join("settings.yaml");
        assert!(matches!(
            load_settings::<Sample>(&yaml),
            Err(SettingsError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            load_settings::<Sample>(dir.path().join("missing.json")),
            Err(SettingsError::Io(_))
        ));
        let bad = dir.path().join("bad.toml");
        fs::write(&bad, "steps = \"many\"")?;
        assert!(matches!(load_settings::<Sample>(&bad), Err(SettingsError::Toml(_))));
        Ok(())
    }
}
