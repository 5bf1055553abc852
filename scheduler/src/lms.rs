//! Linear multistep (LMS) sampler.
//!
//! Each step combines up to `order` past ODE derivatives with coefficients
//! obtained by integrating the Lagrange basis polynomial of each derivative
//! over the next sigma interval.

use crate::error::Result;
use crate::integrate::{adaptive_simpson, LMS_TOLERANCE};
use crate::options::SchedulerOptions;
use crate::schedule::{sigma_init_noise, sigma_schedule};
use crate::scheduler::{
    add_noise, derivative, predict_original, scale_by_sigma, Schedule, Scheduler, SchedulerState,
    StepOutput,
};
use std::collections::VecDeque;
use tensorstack_tensor::Tensor;

#[derive(Debug, Clone)]
pub struct LmsScheduler {
    options: SchedulerOptions,
    schedule: Schedule,
    init_noise_sigma: f32,
    /// Newest derivative at the back; never longer than `options.order`.
    derivatives: VecDeque<Tensor<f32>>,
}

impl LmsScheduler {
    pub fn new(options: SchedulerOptions) -> Result<Self> {
        options.validate()?;
        let capacity = options.order;
        Ok(Self {
            options,
            schedule: Schedule::default(),
            init_noise_sigma: 1.0,
            derivatives: VecDeque::with_capacity(capacity),
        })
    }

    pub fn order(&self) -> usize {
        self.options.order
    }

    /// Derivatives currently retained for the multistep sum.
    pub fn history_len(&self) -> usize {
        self.derivatives.len()
    }

    fn push_derivative(&mut self, derivative: Tensor<f32>) {
        self.derivatives.push_back(derivative);
        while self.derivatives.len() > self.options.order {
            self.derivatives.pop_front();
        }
    }
}

/// Coefficient of the derivative `current` steps back, at schedule index `t`.
pub fn lms_coefficient(sigmas: &[f64], order: usize, t: usize, current: usize) -> f64 {
    let basis = |tau: f64| {
        (0..order)
            .filter(|&k| k != current)
            .map(|k| (tau - sigmas[t - k]) / (sigmas[t - current] - sigmas[t - k]))
            .product::<f64>()
    };
    adaptive_simpson(basis, sigmas[t], sigmas[t + 1], LMS_TOLERANCE)
}

impl Scheduler for LmsScheduler {
    fn initialize(&mut self, strength: f32) -> Result<()> {
        let (timesteps, sigmas) = sigma_schedule(&self.options);
        self.schedule = Schedule::new(timesteps, sigmas, strength)?;
        self.init_noise_sigma = sigma_init_noise(self.schedule.sigmas(), self.options.timestep_spacing);
        self.derivatives.clear();
        log::debug!(
            "LMS initialized: {} steps, order {}",
            self.schedule.len(),
            self.options.order
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
        self.init_noise_sigma
    }

    fn scale_input(&self, timestep: f32, sample: &Tensor<f32>) -> Result<Tensor<f32>> {
        let index = self.schedule.index_of(timestep)?;
        Ok(scale_by_sigma(sample, self.schedule.sigma(index)))
    }

    fn step(&mut self, timestep: f32, prediction: &Tensor<f32>, sample: &Tensor<f32>) -> Result<StepOutput> {
        let index = self.schedule.begin_step(timestep)?;
        let sigma = self.schedule.sigma(index);

        let denoised = predict_original(self.options.prediction_type, sample, prediction, sigma)?;
        self.push_derivative(derivative(sample, &denoised, sigma)?);

        let order = (index + 1).min(self.options.order);
        let sigmas: Vec<f64> = self.schedule.sigmas().iter().map(|&s| s as f64).collect();
        let mut next = sample.clone();
        for (current, derivative) in self.derivatives.iter().rev().take(order).enumerate() {
            let coefficient = lms_coefficient(&sigmas, order, index, current) as f32;
            next.add_scaled_in_place(derivative, coefficient)?;
        }

        self.schedule.advance();
        Ok(StepOutput {
            sample: next,
            denoised: Some(denoised),
        })
    }

    fn scale_noise(&self, timestep: f32, sample: &Tensor<f32>, noise: &Tensor<f32>) -> Result<Tensor<f32>> {
        let index = self.schedule.index_of(timestep)?;
        add_noise(sample, noise, self.schedule.sigma(index))
    }

    fn current_step(&self) -> usize {
        self.schedule.cursor()
    }

    fn total_steps(&self) -> usize {
        self.schedule.len()
    }

    fn is_final_order(&self) -> bool {
        self.derivatives.len() >= self.options.order
    }

    fn state(&self) -> SchedulerState {
        self.schedule.state()
    }
}
