//! The scheduler contract and the schedule cursor every variant shares.

use crate::error::{invalid, Result, SchedulerError};
use crate::options::PredictionType;
use crate::schedule::strength_start;
use tensorstack_tensor::{Tensor, TensorError};

/// Lifecycle of one sampling run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SchedulerState {
    Uninitialized,
    Initialized { strength: f32 },
    Stepping { step: usize },
    Complete,
}

/// Result of one integration step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutput {
    pub sample: Tensor<f32>,
    /// Predicted clean sample, when the algorithm forms one.
    pub denoised: Option<Tensor<f32>>,
}

/// A step-wise diffusion sampler.
///
/// A run is `initialize`, then one `step` per entry of `timesteps()` in order.
/// Re-initializing starts a fresh run and discards all history.
pub trait Scheduler: Send {
    /// Compute the timestep and sigma schedule, truncated for `strength`.
    fn initialize(&mut self, strength: f32) -> Result<()>;

    /// Descending timesteps of the current run.
    fn timesteps(&self) -> &[f32];

    /// Noise scale per timestep, with a trailing terminal entry.
    fn sigmas(&self) -> &[f32];

    /// Scale applied to unit-variance noise to form the initial latent.
    fn init_noise_sigma(&self) -> f32;

    fn scale_input(&self, timestep: f32, sample: &Tensor<f32>) -> Result<Tensor<f32>>;

    /// Advance one step. `timestep` must be the next entry of `timesteps()`.
    fn step(&mut self, timestep: f32, prediction: &Tensor<f32>, sample: &Tensor<f32>) -> Result<StepOutput>;

    /// Forward-noise `sample` to the level of `timestep`.
    fn scale_noise(&self, timestep: f32, sample: &Tensor<f32>, noise: &Tensor<f32>) -> Result<Tensor<f32>>;

    fn current_step(&self) -> usize;

    fn total_steps(&self) -> usize;

    /// True once a multistep method runs at its configured order.
    fn is_final_order(&self) -> bool {
        true
    }

    fn state(&self) -> SchedulerState;
}

/// Timesteps, sigmas and the step cursor of one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schedule {
    timesteps: Vec<f32>,
    sigmas: Vec<f32>,
    cursor: usize,
    strength: Option<f32>,
}

impl Schedule {
    /// Build from the full schedule, keeping the tail selected by `strength`.
    pub fn new(timesteps: Vec<f64>, sigmas: Vec<f64>, strength: f32) -> Result<Self> {
        if sigmas.len() != timesteps.len() + 1 {
            return Err(invalid(format!(
                "{} sigmas for {} timesteps",
                sigmas.len(),
                timesteps.len()
            )));
        }
        let start = strength_start(timesteps.len(), strength)?;
        let timesteps: Vec<f32> = timesteps[start..].iter().map(|&t| t as f32).collect();
        let sigmas: Vec<f32> = sigmas[start..].iter().map(|&s| s as f32).collect();
        if timesteps.windows(2).any(|w| w[1] >= w[0]) {
            return Err(invalid(format!(
                "timesteps are not strictly decreasing: {:?}",
                timesteps
            )));
        }
        Ok(Self {
            timesteps,
            sigmas,
            cursor: 0,
            strength: Some(strength),
        })
    }

    pub fn timesteps(&self) -> &[f32] {
        &self.timesteps
    }

    pub fn sigmas(&self) -> &[f32] {
        &self.sigmas
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.timesteps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timesteps.is_empty()
    }

    pub fn is_initialized(&self) -> bool {
        self.strength.is_some()
    }

    pub fn sigma(&self, index: usize) -> f32 {
        self.sigmas[index]
    }

    /// Schedule index of `timestep`, preferring the cursor position.
    pub fn index_of(&self, timestep: f32) -> Result<usize> {
        self.ensure_initialized()?;
        if self.timesteps.get(self.cursor) == Some(&timestep) {
            return Ok(self.cursor);
        }
        self.timesteps
            .iter()
            .position(|&t| t == timestep)
            .ok_or(SchedulerError::TimestepMismatch {
                expected: self.timesteps.get(self.cursor).copied().unwrap_or(f32::NAN),
                actual: timestep,
            })
    }

    /// Validate that `timestep` is the next one to integrate and return its index.
    pub fn begin_step(&self, timestep: f32) -> Result<usize> {
        self.ensure_initialized()?;
        let expected = *self
            .timesteps
            .get(self.cursor)
            .ok_or(SchedulerError::Completed { steps: self.len() })?;
        if expected != timestep {
            return Err(SchedulerError::TimestepMismatch {
                expected,
                actual: timestep,
            });
        }
        Ok(self.cursor)
    }

    pub fn advance(&mut self) {
        self.cursor += 1;
    }

    pub fn state(&self) -> SchedulerState {
        match self.strength {
            None => SchedulerState::Uninitialized,
            Some(strength) if self.cursor == 0 => SchedulerState::Initialized { strength },
            Some(_) if self.cursor >= self.len() => SchedulerState::Complete,
            Some(_) => SchedulerState::Stepping { step: self.cursor },
        }
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(SchedulerError::NotInitialized)
        }
    }
}

pub(crate) fn ensure_same_shape(expected: &Tensor<f32>, actual: &Tensor<f32>) -> Result<()> {
    if expected.dimensions() != actual.dimensions() {
        return Err(TensorError::DimensionMismatch {
            expected: expected.dimensions().to_vec(),
            actual: actual.dimensions().to_vec(),
        }
        .into());
    }
    Ok(())
}

/// Clean-sample estimate from a model output at noise level `sigma`.
pub(crate) fn predict_original(
    prediction_type: PredictionType,
    sample: &Tensor<f32>,
    prediction: &Tensor<f32>,
    sigma: f32,
) -> Result<Tensor<f32>> {
    ensure_same_shape(sample, prediction)?;
    let denoised = match prediction_type {
        PredictionType::Epsilon => sample.add_scaled(prediction, -sigma)?,
        PredictionType::VPrediction => {
            let variance = sigma * sigma + 1.0;
            let mut denoised = prediction.mul_scalar(-sigma / variance.sqrt());
            denoised.add_scaled_in_place(sample, 1.0 / variance)?;
            denoised
        }
        PredictionType::Sample => prediction.clone(),
    };
    Ok(denoised)
}

/// `(sample - denoised) / sigma`, the probability-flow ODE derivative.
pub(crate) fn derivative(sample: &Tensor<f32>, denoised: &Tensor<f32>, sigma: f32) -> Result<Tensor<f32>> {
    let mut derivative = sample.sub_tensor(denoised)?;
    derivative.div_scalar_in_place(sigma);
    Ok(derivative)
}

/// `sample / sqrt(sigma^2 + 1)`.
pub(crate) fn scale_by_sigma(sample: &Tensor<f32>, sigma: f32) -> Tensor<f32> {
    sample.div_scalar((sigma * sigma + 1.0).sqrt())
}

/// `sample + noise * sigma`.
pub(crate) fn add_noise(sample: &Tensor<f32>, noise: &Tensor<f32>, sigma: f32) -> Result<Tensor<f32>> {
    ensure_same_shape(sample, noise)?;
    Ok(sample.add_scaled(noise, sigma)?)
}
