//! Flow-matching Euler sampler.
//!
//! The model predicts a velocity; sigmas run from 1 (pure noise) to 0 and the
//! latent is a straight interpolation `sigma * noise + (1 - sigma) * sample`.
//! Sigmas are shifted either by a fixed `shift` or, with dynamic shifting, by
//! an exponent that grows with the latent sequence length.

use crate::error::{invalid, Result};
use crate::options::SchedulerOptions;
use crate::schedule::{calculate_shift, linspace, shift_sigma, time_shift};
use crate::scheduler::{ensure_same_shape, Schedule, Scheduler, SchedulerState, StepOutput};
use tensorstack_tensor::Tensor;

#[derive(Debug, Clone)]
pub struct FlowMatchEulerScheduler {
    options: SchedulerOptions,
    schedule: Schedule,
}

impl FlowMatchEulerScheduler {
    pub fn new(options: SchedulerOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            options,
            schedule: Schedule::default(),
        })
    }

    /// Resolution-aware variant; `image_seq_len` defaults to the base length.
    pub fn dynamic(mut options: SchedulerOptions) -> Result<Self> {
        options.use_dynamic_shifting = true;
        Self::new(options)
    }

    pub fn is_dynamic(&self) -> bool {
        self.options.use_dynamic_shifting
    }

    fn shifted_sigmas(&self) -> Result<Vec<f64>> {
        let train = self.options.train_timesteps as f64;
        if let Some(custom) = &self.options.timesteps {
            return Ok(custom.iter().map(|&t| t as f64 / train).collect());
        }

        let sigmas = linspace(1.0, 1.0 / train, self.options.steps);
        if self.options.use_dynamic_shifting {
            let seq_len = self
                .options
                .image_seq_len
                .unwrap_or(self.options.base_image_seq_len);
            let mu = calculate_shift(seq_len, &self.options);
            if !mu.is_finite() {
                return Err(invalid(format!("dynamic shift for sequence length {} is not finite", seq_len)));
            }
            log::debug!("Flow match dynamic shift: seq_len {} -> mu {:.4}", seq_len, mu);
            Ok(sigmas.into_iter().map(|s| time_shift(mu, s)).collect())
        } else {
            let shift = self.options.shift as f64;
            Ok(sigmas.into_iter().map(|s| shift_sigma(s, shift)).collect())
        }
    }

    fn sigma_at(&self, timestep: f32) -> Result<f32> {
        let index = self.schedule.index_of(timestep)?;
        Ok(self.schedule.sigma(index))
    }
}

impl Scheduler for FlowMatchEulerScheduler {
    fn initialize(&mut self, strength: f32) -> Result<()> {
        let mut sigmas = self.shifted_sigmas()?;
        let train = self.options.train_timesteps as f64;
        let timesteps = sigmas.iter().map(|s| s * train).collect();
        sigmas.push(0.0);
        self.schedule = Schedule::new(timesteps, sigmas, strength)?;
        log::debug!(
            "Flow match initialized: {} steps, dynamic {}",
            self.schedule.len(),
            self.is_dynamic()
        );
        Ok(())
    }

    fn timesteps(&self) -> &[f32] {
        self.schedule.timesteps()
    }

    fn sigmas(&self) -> &[f32] {
        self.schedule.sigmas()
    }

    fn init_noise_sigma(&self) -> f32 {
        1.0
    }

    fn scale_input(&self, timestep: f32, sample: &Tensor<f32>) -> Result<Tensor<f32>> {
        self.schedule.index_of(timestep)?;
        Ok(sample.clone())
    }

    fn step(&mut self, timestep: f32, prediction: &Tensor<f32>, sample: &Tensor<f32>) -> Result<StepOutput> {
        let index = self.schedule.begin_step(timestep)?;
        ensure_same_shape(sample, prediction)?;
        let sigma = self.schedule.sigma(index);
        let sigma_next = self.schedule.sigma(index + 1);

        let next = sample.add_scaled(prediction, sigma_next - sigma)?;
        let denoised = sample.add_scaled(prediction, -sigma)?;

        self.schedule.advance();
        Ok(StepOutput {
            sample: next,
            denoised: Some(denoised),
        })
    }

    fn scale_noise(&self, timestep: f32, sample: &Tensor<f32>, noise: &Tensor<f32>) -> Result<Tensor<f32>> {
        let sigma = self.sigma_at(timestep)?;
        ensure_same_shape(sample, noise)?;
        let mut noised = sample.mul_scalar(1.0 - sigma);
        noised.add_scaled_in_place(noise, sigma)?;
        Ok(noised)
    }

    fn current_step(&self) -> usize {
        self.schedule.cursor()
    }

    fn total_steps(&self) -> usize {
        self.schedule.len()
    }

    fn state(&self) -> SchedulerState {
        self.schedule.state()
    }
}
