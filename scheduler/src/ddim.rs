//! Denoising diffusion implicit models (DDIM), working on `alphas_cumprod`
//! rather than sigmas. `eta = 0` is the deterministic sampler.

use crate::error::Result;
use crate::options::{PredictionType, SchedulerOptions};
use crate::schedule::{alphas_cumprod, betas, spaced_timesteps};
use crate::scheduler::{ensure_same_shape, Schedule, Scheduler, SchedulerState, StepOutput};
use rand::rngs::StdRng;
use tensorstack_tensor::{random_normal, seeded_rng, Tensor};

#[derive(Debug, Clone)]
pub struct DdimScheduler {
    options: SchedulerOptions,
    schedule: Schedule,
    alphas_cumprod: Vec<f64>,
    rng: StdRng,
}

impl DdimScheduler {
    pub fn new(options: SchedulerOptions) -> Result<Self> {
        options.validate()?;
        let alphas_cumprod = alphas_cumprod(&betas(&options));
        let rng = seeded_rng(options.seed);
        Ok(Self {
            options,
            schedule: Schedule::default(),
            alphas_cumprod,
            rng,
        })
    }

    fn final_alpha(&self) -> f64 {
        if self.options.set_alpha_to_one {
            1.0
        } else {
            self.alphas_cumprod.first().copied().unwrap_or(1.0)
        }
    }

    fn alpha_at(&self, timestep: f32) -> f64 {
        let index = (timestep.round().max(0.0) as usize).min(self.alphas_cumprod.len() - 1);
        self.alphas_cumprod[index]
    }

    /// `(x0, epsilon)` implied by the model output.
    fn split_prediction(
        &self,
        sample: &Tensor<f32>,
        prediction: &Tensor<f32>,
        alpha: f64,
    ) -> Result<(Tensor<f32>, Tensor<f32>)> {
        ensure_same_shape(sample, prediction)?;
        let sqrt_alpha = alpha.sqrt() as f32;
        let sqrt_beta = (1.0 - alpha).sqrt() as f32;
        let pair = match self.options.prediction_type {
            PredictionType::Epsilon => {
                let mut x0 = sample.add_scaled(prediction, -sqrt_beta)?;
                x0.div_scalar_in_place(sqrt_alpha);
                (x0, prediction.clone())
            }
            PredictionType::VPrediction => {
                let mut x0 = sample.mul_scalar(sqrt_alpha);
                x0.add_scaled_in_place(prediction, -sqrt_beta)?;
                let mut eps = prediction.mul_scalar(sqrt_alpha);
                eps.add_scaled_in_place(sample, sqrt_beta)?;
                (x0, eps)
            }
            PredictionType::Sample => {
                let mut eps = sample.add_scaled(prediction, -sqrt_alpha)?;
                eps.div_scalar_in_place(sqrt_beta);
                (prediction.clone(), eps)
            }
        };
        Ok(pair)
    }
}

impl Scheduler for DdimScheduler {
    fn initialize(&mut self, strength: f32) -> Result<()> {
        let timesteps = spaced_timesteps(&self.options, true);
        let mut sigmas: Vec<f64> = timesteps
            .iter()
            .map(|&t| {
                let alpha = self.alpha_at(t as f32);
                ((1.0 - alpha) / alpha).sqrt()
            })
            .collect();
        sigmas.push(0.0);
        self.schedule = Schedule::new(timesteps, sigmas, strength)?;
        self.rng = seeded_rng(self.options.seed);
        log::debug!("DDIM initialized: {} steps, eta {}", self.schedule.len(), self.options.eta);
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
        let alpha = self.alpha_at(timestep);
        let alpha_prev = match self.schedule.timesteps().get(index + 1) {
            Some(&previous) => self.alpha_at(previous),
            None => self.final_alpha(),
        };

        let (denoised, epsilon) = self.split_prediction(sample, prediction, alpha)?;

        let variance = (1.0 - alpha_prev) / (1.0 - alpha) * (1.0 - alpha / alpha_prev);
        let std_dev = self.options.eta as f64 * variance.max(0.0).sqrt();
        let direction = (1.0 - alpha_prev - std_dev * std_dev).max(0.0).sqrt();

        let mut next = denoised.mul_scalar(alpha_prev.sqrt() as f32);
        next.add_scaled_in_place(&epsilon, direction as f32)?;
        if std_dev > 0.0 {
            let noise = random_normal(sample.dimensions().to_vec(), &mut self.rng);
            next.add_scaled_in_place(&noise, std_dev as f32)?;
        }

        self.schedule.advance();
        Ok(StepOutput {
            sample: next,
            denoised: Some(denoised),
        })
    }

    fn scale_noise(&self, timestep: f32, sample: &Tensor<f32>, noise: &Tensor<f32>) -> Result<Tensor<f32>> {
        self.schedule.index_of(timestep)?;
        ensure_same_shape(sample, noise)?;
        let alpha = self.alpha_at(timestep);
        let mut noised = sample.mul_scalar(alpha.sqrt() as f32);
        noised.add_scaled_in_place(noise, (1.0 - alpha).sqrt() as f32)?;
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
