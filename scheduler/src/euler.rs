use crate::error::Result;
use crate::options::SchedulerOptions;
use crate::schedule::{sigma_init_noise, sigma_schedule};
use crate::scheduler::{
    add_noise, derivative, predict_original, scale_by_sigma, Schedule, Scheduler, SchedulerState,
    StepOutput,
};
use rand::rngs::StdRng;
use tensorstack_tensor::{random_normal, seeded_rng, Tensor};

/// Euler method on the probability-flow ODE, with optional churn.
#[derive(Debug, Clone)]
pub struct EulerScheduler {
    options: SchedulerOptions,
    schedule: Schedule,
    init_noise_sigma: f32,
    rng: StdRng,
}

impl EulerScheduler {
    pub fn new(options: SchedulerOptions) -> Result<Self> {
        options.validate()?;
        let rng = seeded_rng(options.seed);
        Ok(Self {
            options,
            schedule: Schedule::default(),
            init_noise_sigma: 1.0,
            rng,
        })
    }

    pub fn options(&self) -> &SchedulerOptions {
        &self.options
    }

    fn churn(&self, sigma: f32) -> f32 {
        let steps = self.schedule.len();
        if self.options.s_churn <= 0.0 || steps < 2 {
            return 0.0;
        }
        let (min, max) = self.options.churn_range();
        if sigma < min || sigma > max {
            return 0.0;
        }
        (self.options.s_churn / (steps - 1) as f32).min(std::f32::consts::SQRT_2 - 1.0)
    }
}

impl Scheduler for EulerScheduler {
    fn initialize(&mut self, strength: f32) -> Result<()> {
        let (timesteps, sigmas) = sigma_schedule(&self.options);
        self.schedule = Schedule::new(timesteps, sigmas, strength)?;
        self.init_noise_sigma = sigma_init_noise(self.schedule.sigmas(), self.options.timestep_spacing);
        self.rng = seeded_rng(self.options.seed);
        log::debug!(
            "Euler initialized: {} steps, init sigma {:.4}",
            self.schedule.len(),
            self.init_noise_sigma
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
        let sigma_next = self.schedule.sigma(index + 1);

        let gamma = self.churn(sigma);
        let sigma_hat = sigma * (gamma + 1.0);
        let churned;
        let sample = if gamma > 0.0 {
            let noise = random_normal(sample.dimensions().to_vec(), &mut self.rng);
            let scale = self.options.s_noise * (sigma_hat * sigma_hat - sigma * sigma).sqrt();
            churned = add_noise(sample, &noise, scale)?;
            &churned
        } else {
            sample
        };

        let denoised = predict_original(self.options.prediction_type, sample, prediction, sigma_hat)?;
        let slope = derivative(sample, &denoised, sigma_hat)?;
        let next = sample.add_scaled(&slope, sigma_next - sigma_hat)?;

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

    fn state(&self) -> SchedulerState {
        self.schedule.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_prediction_moves_toward_terminal_sigma() {
        let mut scheduler = EulerScheduler::new(SchedulerOptions::default().with_steps(5)).unwrap();
        scheduler.initialize(1.0).unwrap();
        let sample = Tensor::filled(vec![1, 4, 2, 2], 1.0f32);
        let prediction = Tensor::zeros(vec![1, 4, 2, 2]);
        let timestep = scheduler.timesteps()[0];
        let out = scheduler.step(timestep, &prediction, &sample).unwrap();
        // Zero epsilon means the sample already is the clean estimate.
        assert_eq!(out.sample, sample);
        assert_eq!(out.denoised.unwrap(), sample);
        assert_eq!(scheduler.current_step(), 1);
    }

    #[test]
    fn test_epsilon_step_follows_euler_update() {
        let mut scheduler = EulerScheduler::new(SchedulerOptions::default().with_steps(4)).unwrap();
        scheduler.initialize(1.0).unwrap();
        let (s0, s1) = (scheduler.sigmas()[0], scheduler.sigmas()[1]);
        let sample = Tensor::filled(vec![3], 2.0f32);
        let prediction = Tensor::filled(vec![3], 0.5f32);
        let out = scheduler.step(scheduler.timesteps()[0], &prediction, &sample).unwrap();
        let expected = 2.0 + 0.5 * (s1 - s0);
        assert!(out.sample.as_slice().iter().all(|v| (v - expected).abs() < 1e-4));
    }

    #[test]
    fn test_scale_input_and_noise() {
        let mut scheduler = EulerScheduler::new(SchedulerOptions::default().with_steps(4)).unwrap();
        let sample = Tensor::filled(vec![2], 3.0f32);
        assert!(scheduler.scale_input(999.0, &sample).is_err());
        scheduler.initialize(1.0).unwrap();
        let t = scheduler.timesteps()[0];
        let sigma = scheduler.sigmas()[0];
        let scaled = scheduler.scale_input(t, &sample).unwrap();
        assert!((scaled.as_slice()[0] - 3.0 / (sigma * sigma + 1.0).sqrt()).abs() < 1e-6);
        let noise = Tensor::filled(vec![2], 1.0f32);
        let noised = scheduler.scale_noise(t, &sample, &noise).unwrap();
        assert!((noised.as_slice()[0] - (3.0 + sigma)).abs() < 1e-4);
        assert_eq!(scheduler.init_noise_sigma(), sigma);
    }

    #[test]
    fn test_churn_is_seeded() {
        let options = SchedulerOptions {
            s_churn: 1.0,
            seed: 11,
            ..SchedulerOptions::default().with_steps(6)
        };
        let run = || {
            let mut scheduler = EulerScheduler::new(options.clone()).unwrap();
            scheduler.initialize(1.0).unwrap();
            let mut sample = Tensor::filled(vec![8], 1.0f32);
            for t in scheduler.timesteps().to_vec() {
                let prediction = sample.mul_scalar(0.1);
                sample = scheduler.step(t, &prediction, &sample).unwrap().sample;
            }
            sample
        };
        assert_eq!(run(), run());
    }
}
