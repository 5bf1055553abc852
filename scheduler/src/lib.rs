//! TensorStack diffusion schedulers
//!
//! Step-wise numerical integrators that turn a denoiser's raw output into the
//! next latent:
//! - Euler and Euler-ancestral on the probability-flow ODE
//! - Linear multistep (LMS) with numerically integrated coefficients
//! - DDIM on `alphas_cumprod`
//! - Flow-matching Euler, with static or resolution-dependent shift
//!
//! Every variant implements [`Scheduler`]; [`DiffusionScheduler`] selects one
//! by [`SchedulerType`] at runtime.

pub mod ddim;
pub mod error;
pub mod euler;
pub mod euler_ancestral;
pub mod flow_match;
pub mod integrate;
pub mod lms;
pub mod options;
pub mod schedule;
pub mod scheduler;

pub use ddim::DdimScheduler;
pub use error::{Result, SchedulerError};
pub use euler::EulerScheduler;
pub use euler_ancestral::EulerAncestralScheduler;
pub use flow_match::FlowMatchEulerScheduler;
pub use lms::LmsScheduler;
pub use options::{BetaSchedule, PredictionType, SchedulerOptions, TimestepSpacing};
pub use scheduler::{Schedule, Scheduler, SchedulerState, StepOutput};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tensorstack_tensor::Tensor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerType {
    Euler,
    EulerAncestral,
    Lms,
    #[default]
    Ddim,
    FlowMatchEulerDiscrete,
    FlowMatchEulerDynamic,
}

impl SchedulerType {
    pub const ALL: [SchedulerType; 6] = [
        Self::Euler,
        Self::EulerAncestral,
        Self::Lms,
        Self::Ddim,
        Self::FlowMatchEulerDiscrete,
        Self::FlowMatchEulerDynamic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Euler => "euler",
            Self::EulerAncestral => "eulerancestral",
            Self::Lms => "lms",
            Self::Ddim => "ddim",
            Self::FlowMatchEulerDiscrete => "flowmatcheulerdiscrete",
            Self::FlowMatchEulerDynamic => "flowmatcheulerdynamic",
        }
    }

    /// Flow-matching variants predict velocity and start from unit noise.
    pub fn is_flow_match(&self) -> bool {
        matches!(self, Self::FlowMatchEulerDiscrete | Self::FlowMatchEulerDynamic)
    }
}

impl fmt::Display for SchedulerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchedulerType {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .collect::<String>()
            .to_lowercase();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| SchedulerError::InvalidConfiguration(format!("unknown scheduler '{}'", s)))
    }
}

/// Runtime-selected scheduler.
#[derive(Debug, Clone)]
pub enum DiffusionScheduler {
    Euler(EulerScheduler),
    EulerAncestral(EulerAncestralScheduler),
    Lms(LmsScheduler),
    Ddim(DdimScheduler),
    FlowMatch(FlowMatchEulerScheduler),
}

impl DiffusionScheduler {
    pub fn create(scheduler_type: SchedulerType, options: SchedulerOptions) -> Result<Self> {
        log::debug!("Creating {} scheduler", scheduler_type);
        Ok(match scheduler_type {
            SchedulerType::Euler => Self::Euler(EulerScheduler::new(options)?),
            SchedulerType::EulerAncestral => Self::EulerAncestral(EulerAncestralScheduler::new(options)?),
            SchedulerType::Lms => Self::Lms(LmsScheduler::new(options)?),
            SchedulerType::Ddim => Self::Ddim(DdimScheduler::new(options)?),
            SchedulerType::FlowMatchEulerDiscrete => {
                let options = SchedulerOptions {
                    use_dynamic_shifting: false,
                    ..options
                };
                Self::FlowMatch(FlowMatchEulerScheduler::new(options)?)
            }
            SchedulerType::FlowMatchEulerDynamic => {
                Self::FlowMatch(FlowMatchEulerScheduler::dynamic(options)?)
            }
        })
    }

    pub fn scheduler_type(&self) -> SchedulerType {
        match self {
            Self::Euler(_) => SchedulerType::Euler,
            Self::EulerAncestral(_) => SchedulerType::EulerAncestral,
            Self::Lms(_) => SchedulerType::Lms,
            Self::Ddim(_) => SchedulerType::Ddim,
            Self::FlowMatch(s) if s.is_dynamic() => SchedulerType::FlowMatchEulerDynamic,
            Self::FlowMatch(_) => SchedulerType::FlowMatchEulerDiscrete,
        }
    }

    fn inner(&self) -> &dyn Scheduler {
        match self {
            Self::Euler(s) => s,
            Self::EulerAncestral(s) => s,
            Self::Lms(s) => s,
            Self::Ddim(s) => s,
            Self::FlowMatch(s) => s,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Scheduler {
        match self {
            Self::Euler(s) => s,
            Self::EulerAncestral(s) => s,
            Self::Lms(s) => s,
            Self::Ddim(s) => s,
            Self::FlowMatch(s) => s,
        }
    }
}

impl Scheduler for DiffusionScheduler {
    fn initialize(&mut self, strength: f32) -> Result<()> {
        self.inner_mut().initialize(strength)
    }

    fn timesteps(&self) -> &[f32] {
        self.inner().timesteps()
    }

    fn sigmas(&self) -> &[f32] {
        self.inner().sigmas()
    }

    fn init_noise_sigma(&self) -> f32 {
        self.inner().init_noise_sigma()
    }

    fn scale_input(&self, timestep: f32, sample: &Tensor<f32>) -> Result<Tensor<f32>> {
        self.inner().scale_input(timestep, sample)
    }

    fn step(&mut self, timestep: f32, prediction: &Tensor<f32>, sample: &Tensor<f32>) -> Result<StepOutput> {
        self.inner_mut().step(timestep, prediction, sample)
    }

    fn scale_noise(&self, timestep: f32, sample: &Tensor<f32>, noise: &Tensor<f32>) -> Result<Tensor<f32>> {
        self.inner().scale_noise(timestep, sample, noise)
    }

    fn current_step(&self) -> usize {
        self.inner().current_step()
    }

    fn total_steps(&self) -> usize {
        self.inner().total_steps()
    }

    fn is_final_order(&self) -> bool {
        self.inner().is_final_order()
    }

    fn state(&self) -> SchedulerState {
        self.inner().state()
    }
}
