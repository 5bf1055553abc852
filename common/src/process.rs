/// Process type enum.
///
/// What a generation request asks a pipeline to do. Tags use the
/// Hugging Face task naming so configs and model cards agree.
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ProcessType {
    /// Latent from seeded noise
    #[default]
    #[serde(rename = "text-to-image")]
    TextToImage,

    /// Latent from an encoded input image, noised to the strength level
    #[serde(rename = "image-to-image")]
    ImageToImage,

    /// Single-model super-resolution through the tiling engine
    #[serde(rename = "image-upscale")]
    ImageUpscale,
}

impl ProcessType {
    pub fn to_tag(&self) -> &'static str {
        match self {
            Self::TextToImage => "text-to-image",
            Self::ImageToImage => "image-to-image",
            Self::ImageUpscale => "image-upscale",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "text-to-image" => Some(Self::TextToImage),
            "image-to-image" => Some(Self::ImageToImage),
            "image-upscale" | "upscale" => Some(Self::ImageUpscale),
            _ => None,
        }
    }

    /// Whether the request carries an input image.
    pub fn needs_input_image(&self) -> bool {
        !matches!(self, Self::TextToImage)
    }
}

impl fmt::Display for ProcessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_type_serialization() {
        let json = serde_json::to_string(&ProcessType::ImageToImage).unwrap();
        assert_eq!(json, "\"image-to-image\"");
        let parsed: ProcessType = serde_json::from_str("\"image-upscale\"").unwrap();
        assert_eq!(parsed, ProcessType::ImageUpscale);
    }

    #[test]
    fn test_tag_conversion() {
        assert_eq!(ProcessType::from_tag("upscale"), Some(ProcessType::ImageUpscale));
        assert_eq!(ProcessType::from_tag("inpaint"), None);
        assert_eq!(ProcessType::TextToImage.to_string(), "text-to-image");
        assert!(ProcessType::ImageToImage.needs_input_image());
        assert!(!ProcessType::TextToImage.needs_input_image());
    }
}
