//! Semantic wrappers over `Tensor<f32>` with fixed axis meaning.
//!
//! - [`ImageTensor`]: `[batch, channels, height, width]`, channels in {1, 3, 4}
//! - [`VideoTensor`]: frame-batched image tensor plus a frame rate
//! - [`AudioTensor`]: `[channels, samples]` plus a sample rate
//!
//! Wrappers own the tensor they validate; `into_tensor` hands it back.

use crate::error::{Result, TensorError};
use crate::span::TensorSpan;
use crate::tensor::{Splits, Tensor};

const IMAGE_CHANNELS: [usize; 3] = [1, 3, 4];

#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    tensor: Tensor<f32>,
}

impl ImageTensor {
    pub fn new(tensor: Tensor<f32>) -> Result<Self> {
        validate_image(tensor.dimensions())?;
        Ok(Self { tensor })
    }

    pub fn zeros(batch: usize, channels: usize, height: usize, width: usize) -> Result<Self> {
        Self::new(Tensor::zeros(vec![batch, channels, height, width]))
    }

    /// Interleaved 8-bit RGB(A) pixels (`height * width * channels`) to a
    /// `[1, channels, height, width]` tensor in `[-1, 1]`.
    pub fn from_pixels(pixels: &[u8], width: usize, height: usize, channels: usize) -> Result<Self> {
        let values = pixels.iter().map(|&p| p as f32 / 255.0).collect();
        let mut hwc = Tensor::from_vec(values, vec![1, height, width, channels])?;
        hwc.normalize_one_one();
        Self::new(hwc.permute(&[0, 3, 1, 2])?)
    }

    /// First image of the batch as interleaved 8-bit pixels.
    pub fn to_pixels(&self) -> Result<Vec<u8>> {
        let first = self
            .tensor
            .split(0)?
            .next()
            .map(|span| span.to_tensor())
            .ok_or_else(|| TensorError::InvalidImage("empty batch".to_string()))?;
        let mut hwc = first.permute(&[0, 2, 3, 1])?;
        hwc.normalize_zero_one();
        Ok(hwc
            .as_slice()
            .iter()
            .map(|&v| (v * 255.0).round() as u8)
            .collect())
    }

    pub fn batch(&self) -> usize {
        self.tensor.dimensions()[0]
    }

    pub fn channels(&self) -> usize {
        self.tensor.dimensions()[1]
    }

    pub fn height(&self) -> usize {
        self.tensor.dimensions()[2]
    }

    pub fn width(&self) -> usize {
        self.tensor.dimensions()[3]
    }

    pub fn tensor(&self) -> &Tensor<f32> {
        &self.tensor
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        self.tensor.as_mut_slice()
    }

    pub fn into_tensor(self) -> Tensor<f32> {
        self.tensor
    }

    /// Reshape and re-check the image invariants; on failure the image is unchanged.
    pub fn reshape(&mut self, dimensions: Vec<usize>) -> Result<()> {
        validate_image(&dimensions)?;
        self.tensor.reshape(dimensions)
    }

    /// Iterate the batch as `[1, C, H, W]` views.
    pub fn images(&self) -> Result<Splits<'_, f32>> {
        self.tensor.split(0)
    }
}

fn validate_image(dimensions: &[usize]) -> Result<()> {
    if dimensions.len() != 4 {
        return Err(TensorError::InvalidImage(format!(
            "expected [batch, channels, height, width], got {:?}",
            dimensions
        )));
    }
    if dimensions.iter().any(|&d| d == 0) {
        return Err(TensorError::InvalidImage(format!(
            "dimensions must be positive, got {:?}",
            dimensions
        )));
    }
    if !IMAGE_CHANNELS.contains(&dimensions[1]) {
        return Err(TensorError::InvalidImage(format!(
            "channel count {} not in {:?}",
            dimensions[1], IMAGE_CHANNELS
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoTensor {
    frames: ImageTensor,
    frame_rate: f32,
}

impl VideoTensor {
    pub fn new(tensor: Tensor<f32>, frame_rate: f32) -> Result<Self> {
        if !(frame_rate.is_finite() && frame_rate > 0.0) {
            return Err(TensorError::InvalidImage(format!(
                "frame rate must be positive, got {}",
                frame_rate
            )));
        }
        Ok(Self {
            frames: ImageTensor::new(tensor)?,
            frame_rate,
        })
    }

    /// Join single images into one frame-batched tensor.
    pub fn from_frames(frames: &[ImageTensor], frame_rate: f32) -> Result<Self> {
        let tensor = Tensor::join(frames.iter().map(ImageTensor::tensor), 0)?;
        Self::new(tensor, frame_rate)
    }

    pub fn frame_count(&self) -> usize {
        self.frames.batch()
    }

    pub fn frame_rate(&self) -> f32 {
        self.frame_rate
    }

    pub fn duration_secs(&self) -> f32 {
        self.frame_count() as f32 / self.frame_rate
    }

    pub fn frames(&self) -> Result<Splits<'_, f32>> {
        self.frames.images()
    }

    pub fn frame(&self, index: usize) -> Result<TensorSpan<'_, f32>> {
        let count = self.frame_count();
        self.frames()?
            .nth(index)
            .ok_or_else(|| TensorError::IndexOutOfRange {
                index: vec![index],
                dimensions: vec![count],
            })
    }

    pub fn as_image(&self) -> &ImageTensor {
        &self.frames
    }

    pub fn into_tensor(self) -> Tensor<f32> {
        self.frames.into_tensor()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioTensor {
    tensor: Tensor<f32>,
    sample_rate: u32,
}

impl AudioTensor {
    pub fn new(tensor: Tensor<f32>, sample_rate: u32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(TensorError::InvalidAudio("sample rate must be non-zero".to_string()));
        }
        validate_audio(tensor.dimensions())?;
        Ok(Self {
            tensor,
            sample_rate,
        })
    }

    pub fn channels(&self) -> usize {
        self.tensor.dimensions()[0]
    }

    pub fn samples(&self) -> usize {
        self.tensor.dimensions()[1]
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn duration_secs(&self) -> f32 {
        self.samples() as f32 / self.sample_rate as f32
    }

    pub fn tensor(&self) -> &Tensor<f32> {
        &self.tensor
    }

    pub fn reshape(&mut self, dimensions: Vec<usize>) -> Result<()> {
        validate_audio(&dimensions)?;
        self.tensor.reshape(dimensions)
    }

    pub fn into_tensor(self) -> Tensor<f32> {
        self.tensor
    }
}

fn validate_audio(dimensions: &[usize]) -> Result<()> {
    if dimensions.len() != 2 || dimensions.iter().any(|&d| d == 0) {
        return Err(TensorError::InvalidAudio(format!(
            "expected positive [channels, samples], got {:?}",
            dimensions
        )));
    }
    Ok(())
}
