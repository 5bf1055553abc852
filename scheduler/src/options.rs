//! Scheduler configuration.
//!
//! Field names and defaults follow the `scheduler_config.json` convention used
//! by published diffusion checkpoints, so a checkpoint's config deserializes
//! directly into [`SchedulerOptions`].

use crate::error::{invalid, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetaSchedule {
    Linear,
    #[default]
    ScaledLinear,
    SquaredCosCapV2,
}

/// What the denoiser outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionType {
    #[default]
    Epsilon,
    VPrediction,
    Sample,
}

/// How inference timesteps are placed on the training grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestepSpacing {
    #[default]
    Linspace,
    Leading,
    Trailing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerOptions {
    /// Inference steps before strength truncation.
    pub steps: usize,
    #[serde(alias = "num_train_timesteps")]
    pub train_timesteps: usize,
    pub steps_offset: usize,
    pub beta_start: f32,
    pub beta_end: f32,
    pub beta_schedule: BetaSchedule,
    pub prediction_type: PredictionType,
    pub timestep_spacing: TimestepSpacing,
    pub use_karras_sigmas: bool,
    pub sigma_min: Option<f32>,
    pub sigma_max: Option<f32>,
    pub rho: f32,
    /// Multistep order (LMS).
    pub order: usize,
    /// DDIM stochasticity, 0 is deterministic.
    pub eta: f32,
    /// DDIM final step: `alpha_prev = 1` when set, otherwise `alphas_cumprod[0]`.
    pub set_alpha_to_one: bool,
    pub s_churn: f32,
    pub s_tmin: f32,
    /// Upper sigma bound for churn; 0 means unbounded.
    pub s_tmax: f32,
    pub s_noise: f32,
    /// Static flow-match shift.
    pub shift: f32,
    pub use_dynamic_shifting: bool,
    pub base_shift: f32,
    pub max_shift: f32,
    pub base_image_seq_len: usize,
    pub max_image_seq_len: usize,
    /// Latent patch count for dynamic shifting; filled by the pipeline when unset.
    pub image_seq_len: Option<usize>,
    /// Explicit descending timesteps, overriding `steps` and spacing.
    pub timesteps: Option<Vec<f32>>,
    /// Seed for samplers that inject noise.
    pub seed: u64,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            steps: 30,
            train_timesteps: 1000,
            steps_offset: 0,
            beta_start: 0.00085,
            beta_end: 0.012,
            beta_schedule: BetaSchedule::ScaledLinear,
            prediction_type: PredictionType::Epsilon,
            timestep_spacing: TimestepSpacing::Linspace,
            use_karras_sigmas: false,
            sigma_min: None,
            sigma_max: None,
            rho: 7.0,
            order: 4,
            eta: 0.0,
            set_alpha_to_one: true,
            s_churn: 0.0,
            s_tmin: 0.0,
            s_tmax: 0.0,
            s_noise: 1.0,
            shift: 1.0,
            use_dynamic_shifting: false,
            base_shift: 0.5,
            max_shift: 1.15,
            base_image_seq_len: 256,
            max_image_seq_len: 4096,
            image_seq_len: None,
            timesteps: None,
            seed: 0,
        }
    }
}

impl SchedulerOptions {
    pub fn with_steps(mut self, steps: usize) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sigma range in which Euler churn applies.
    pub fn churn_range(&self) -> (f32, f32) {
        let max = if self.s_tmax > 0.0 { self.s_tmax } else { f32::INFINITY };
        (self.s_tmin, max)
    }

    /// Number of steps the schedule will have before strength truncation.
    pub fn effective_steps(&self) -> usize {
        self.timesteps.as_ref().map_or(self.steps, Vec::len)
    }

    /// Reject option sets no scheduler can run, before any inference work.
    pub fn validate(&self) -> Result<()> {
        if self.train_timesteps < 2 {
            return Err(invalid(format!(
                "train_timesteps must be at least 2, got {}",
                self.train_timesteps
            )));
        }
        if self.effective_steps() == 0 {
            return Err(invalid("steps must be positive"));
        }
        if self.timesteps.is_none() && self.steps > self.train_timesteps {
            return Err(invalid(format!(
                "steps {} exceed train_timesteps {}",
                self.steps, self.train_timesteps
            )));
        }
        if self.timesteps.is_none() && self.timestep_spacing == TimestepSpacing::Leading {
            let last = (self.steps - 1) * (self.train_timesteps / self.steps) + self.steps_offset;
            if last >= self.train_timesteps {
                return Err(invalid(format!(
                    "leading spacing with {} steps and offset {} reaches timestep {} beyond the training grid",
                    self.steps, self.steps_offset, last
                )));
            }
        }
        if self.order == 0 {
            return Err(invalid("order must be at least 1"));
        }
        if !(self.beta_start > 0.0 && self.beta_end > self.beta_start && self.beta_end < 1.0) {
            return Err(invalid(format!(
                "beta range ({}, {}) must satisfy 0 < start < end < 1",
                self.beta_start, self.beta_end
            )));
        }
        if !(self.rho > 0.0) {
            return Err(invalid(format!("rho must be positive, got {}", self.rho)));
        }
        if !(0.0..=1.0).contains(&self.eta) {
            return Err(invalid(format!("eta must be in [0, 1], got {}", self.eta)));
        }
        let (churn_min, churn_max) = self.churn_range();
        if self.s_churn < 0.0 || self.s_noise < 0.0 || churn_min < 0.0 || churn_min > churn_max {
            return Err(invalid("churn parameters must be non-negative with s_tmin <= s_tmax"));
        }
        if !(self.shift > 0.0) {
            return Err(invalid(format!("shift must be positive, got {}", self.shift)));
        }
        if self.max_image_seq_len <= self.base_image_seq_len {
            return Err(invalid(format!(
                "max_image_seq_len {} must exceed base_image_seq_len {}",
                self.max_image_seq_len, self.base_image_seq_len
            )));
        }
        if let (Some(min), Some(max)) = (self.sigma_min, self.sigma_max) {
            if !(min > 0.0 && max > min) {
                return Err(invalid(format!(
                    "sigma range ({}, {}) must satisfy 0 < min < max",
                    min, max
                )));
            }
        }
        if let Some(timesteps) = &self.timesteps {
            let limit = self.train_timesteps as f32;
            if timesteps.iter().any(|t| !(0.0..limit).contains(t)) {
                return Err(invalid(format!("custom timesteps must lie in [0, {})", limit)));
            }
            if timesteps.windows(2).any(|w| w[1] >= w[0]) {
                return Err(invalid("custom timesteps must be strictly decreasing"));
            }
        }
        Ok(())
    }
}
