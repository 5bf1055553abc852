//! Schedule math shared by every scheduler variant.
//!
//! All curves are computed in `f64` and narrowed to `f32` only when stored on
//! a [`Schedule`](crate::scheduler::Schedule).

use crate::error::{invalid, Result};
use crate::options::{BetaSchedule, SchedulerOptions, TimestepSpacing};

/// `count` evenly spaced values from `start` to `end` inclusive.
pub fn linspace(start: f64, end: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (count - 1) as f64;
            (0..count).map(|i| start + step * i as f64).collect()
        }
    }
}

pub fn betas(options: &SchedulerOptions) -> Vec<f64> {
    let n = options.train_timesteps;
    let (start, end) = (options.beta_start as f64, options.beta_end as f64);
    match options.beta_schedule {
        BetaSchedule::Linear => linspace(start, end, n),
        BetaSchedule::ScaledLinear => linspace(start.sqrt(), end.sqrt(), n)
            .into_iter()
            .map(|b| b * b)
            .collect(),
        BetaSchedule::SquaredCosCapV2 => {
            let alpha_bar = |t: f64| ((t + 0.008) / 1.008 * std::f64::consts::FRAC_PI_2).cos().powi(2);
            (0..n)
                .map(|i| {
                    let t1 = i as f64 / n as f64;
                    let t2 = (i + 1) as f64 / n as f64;
                    (1.0 - alpha_bar(t2) / alpha_bar(t1)).min(0.999)
                })
                .collect()
        }
    }
}

pub fn alphas_cumprod(betas: &[f64]) -> Vec<f64> {
    betas
        .iter()
        .scan(1.0, |product, beta| {
            *product *= 1.0 - beta;
            Some(*product)
        })
        .collect()
}

/// Noise scale of every training timestep, ascending in `t`.
pub fn train_sigmas(alphas_cumprod: &[f64]) -> Vec<f64> {
    alphas_cumprod
        .iter()
        .map(|a| ((1.0 - a) / a).sqrt())
        .collect()
}

/// Descending inference timesteps on the training grid.
///
/// `rounded` snaps linspace spacing to integers for schedulers that index the
/// training tables directly.
pub fn spaced_timesteps(options: &SchedulerOptions, rounded: bool) -> Vec<f64> {
    if let Some(custom) = &options.timesteps {
        return custom.iter().map(|&t| t as f64).collect();
    }

    let train = options.train_timesteps;
    let steps = options.steps;
    let last = (train - 1) as f64;
    let offset = options.steps_offset as f64;
    let mut timesteps: Vec<f64> = match options.timestep_spacing {
        TimestepSpacing::Linspace => {
            let grid = linspace(0.0, last, steps);
            if rounded {
                grid.into_iter().map(f64::round).collect()
            } else {
                grid
            }
        }
        TimestepSpacing::Leading => {
            let ratio = (train / steps) as f64;
            (0..steps)
                .map(|i| (i as f64 * ratio).round() + offset)
                .collect()
        }
        TimestepSpacing::Trailing => {
            let ratio = train as f64 / steps as f64;
            (0..steps)
                .rev()
                .map(|i| (train as f64 - i as f64 * ratio).round() - 1.0)
                .collect()
        }
    };
    for t in timesteps.iter_mut() {
        *t = t.clamp(0.0, last);
    }
    timesteps.reverse();
    timesteps
}

/// Piecewise-linear interpolation of `fp` over ascending `xp`, clamped at the ends.
pub fn interp(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    let (Some(&first), Some(&last)) = (xp.first(), xp.last()) else {
        return 0.0;
    };
    if x <= first {
        return fp[0];
    }
    if x >= last {
        return fp[fp.len() - 1];
    }
    let upper = xp.partition_point(|&v| v <= x).min(xp.len() - 1);
    let lower = upper - 1;
    let span = xp[upper] - xp[lower];
    if span == 0.0 {
        return fp[lower];
    }
    let w = (x - xp[lower]) / span;
    fp[lower] + w * (fp[upper] - fp[lower])
}

/// Sigma at each (possibly fractional) timestep, from the training curve.
pub fn sigmas_for_timesteps(timesteps: &[f64], train_sigmas: &[f64]) -> Vec<f64> {
    let grid: Vec<f64> = (0..train_sigmas.len()).map(|t| t as f64).collect();
    timesteps
        .iter()
        .map(|&t| interp(t, &grid, train_sigmas))
        .collect()
}

/// Karras et al. (2022) power-law sigma spacing, descending from `sigma_max`.
pub fn karras_sigmas(sigma_min: f64, sigma_max: f64, steps: usize, rho: f64) -> Vec<f64> {
    let min_inv = sigma_min.powf(1.0 / rho);
    let max_inv = sigma_max.powf(1.0 / rho);
    linspace(0.0, 1.0, steps)
        .into_iter()
        .map(|ramp| (max_inv + ramp * (min_inv - max_inv)).powf(rho))
        .collect()
}

/// Fractional training timestep whose sigma is `sigma`, interpolated in log space.
pub fn sigma_to_t(sigma: f64, log_sigmas: &[f64]) -> f64 {
    if log_sigmas.len() < 2 {
        return 0.0;
    }
    let log_sigma = sigma.max(1e-10).ln();
    let low = log_sigmas
        .iter()
        .rposition(|&l| log_sigma >= l)
        .unwrap_or(0)
        .min(log_sigmas.len() - 2);
    let high = low + 1;
    let (l, h) = (log_sigmas[low], log_sigmas[high]);
    let w = ((l - log_sigma) / (l - h)).clamp(0.0, 1.0);
    (1.0 - w) * low as f64 + w * high as f64
}

/// Static flow-match shift; identity at `shift == 1`.
pub fn shift_sigma(sigma: f64, shift: f64) -> f64 {
    shift * sigma / (1.0 + (shift - 1.0) * sigma)
}

/// Resolution-dependent flow-match shift with exponent `mu`.
pub fn time_shift(mu: f64, sigma: f64) -> f64 {
    let e = mu.exp();
    e / (e + (1.0 / sigma - 1.0))
}

/// `mu` for dynamic shifting, linear in the latent sequence length.
pub fn calculate_shift(image_seq_len: usize, options: &SchedulerOptions) -> f64 {
    let base_len = options.base_image_seq_len as f64;
    let max_len = options.max_image_seq_len as f64;
    let slope = (options.max_shift as f64 - options.base_shift as f64) / (max_len - base_len);
    let intercept = options.base_shift as f64 - slope * base_len;
    image_seq_len as f64 * slope + intercept
}

/// Timesteps and sigmas (with terminal 0) for the sigma-space samplers.
pub fn sigma_schedule(options: &SchedulerOptions) -> (Vec<f64>, Vec<f64>) {
    let train = train_sigmas(&alphas_cumprod(&betas(options)));
    let timesteps = spaced_timesteps(options, false);
    let mut sigmas = sigmas_for_timesteps(&timesteps, &train);

    let (timesteps, mut sigmas) = if options.use_karras_sigmas && options.timesteps.is_none() {
        let sigma_min = options.sigma_min.map_or(sigmas[sigmas.len() - 1], f64::from);
        let sigma_max = options.sigma_max.map_or(sigmas[0], f64::from);
        sigmas = karras_sigmas(sigma_min, sigma_max, timesteps.len(), options.rho as f64);
        let log_sigmas: Vec<f64> = train.iter().map(|s| s.ln()).collect();
        let timesteps = sigmas.iter().map(|&s| sigma_to_t(s, &log_sigmas)).collect();
        (timesteps, sigmas)
    } else {
        (timesteps, sigmas)
    };
    sigmas.push(0.0);
    (timesteps, sigmas)
}

/// Initial latent scale for sigma-space samplers.
pub fn sigma_init_noise(sigmas: &[f32], spacing: TimestepSpacing) -> f32 {
    let max = sigmas.iter().copied().fold(0.0f32, f32::max);
    match spacing {
        TimestepSpacing::Linspace | TimestepSpacing::Trailing => max,
        TimestepSpacing::Leading => (max * max + 1.0).sqrt(),
    }
}

/// Index of the first kept step when running `steps` at `strength`.
///
/// Keeps the trailing `floor(strength * steps)` entries; zero kept steps is an error.
pub fn strength_start(steps: usize, strength: f32) -> Result<usize> {
    if !(strength > 0.0 && strength <= 1.0) {
        return Err(invalid(format!("strength must be in (0, 1], got {}", strength)));
    }
    let kept = (strength as f64 * steps as f64).floor() as usize;
    if kept == 0 {
        return Err(invalid(format!(
            "strength {} leaves no steps out of {}",
            strength, steps
        )));
    }
    Ok(steps - kept.min(steps))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    #[test]
    fn test_linspace_endpoints() {
        let v = linspace(0.0, 999.0, 4);
        assert_eq!(v, vec![0.0, 333.0, 666.0, 999.0]);
        assert_eq!(linspace(5.0, 9.0, 1), vec![5.0]);
        assert!(linspace(0.0, 1.0, 0).is_empty());
    }

    #[test]
    fn test_scaled_linear_matches_reference_values() {
        let options = SchedulerOptions::default();
        let acp = alphas_cumprod(&betas(&options));
        let sigmas = train_sigmas(&acp);
        // Stable Diffusion reference range.
        assert!(close(sigmas[0], 0.0292, 1e-3));
        assert!(close(sigmas[999], 14.6146, 1e-3));
        assert!(sigmas.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn test_cosine_betas_are_capped() {
        let options = SchedulerOptions {
            beta_schedule: BetaSchedule::SquaredCosCapV2,
            ..Default::default()
        };
        let b = betas(&options);
        assert_eq!(b.len(), 1000);
        assert!(b.iter().all(|&v| v > 0.0 && v <= 0.999));
        assert_eq!(b[999], 0.999);
    }

    #[test]
    fn test_spacing_variants() {
        let base = SchedulerOptions::default().with_steps(4);
        assert_eq!(spaced_timesteps(&base, false), vec![999.0, 666.0, 333.0, 0.0]);

        let leading = SchedulerOptions {
            timestep_spacing: TimestepSpacing::Leading,
            steps_offset: 1,
            ..base.clone()
        };
        assert_eq!(spaced_timesteps(&leading, false), vec![751.0, 501.0, 251.0, 1.0]);

        let trailing = SchedulerOptions {
            timestep_spacing: TimestepSpacing::Trailing,
            ..base
        };
        assert_eq!(spaced_timesteps(&trailing, false), vec![999.0, 749.0, 499.0, 249.0]);
    }

    #[test]
    fn test_interp_clamps_and_interpolates() {
        let xp = [0.0, 1.0, 2.0];
        let fp = [10.0, 20.0, 40.0];
        assert_eq!(interp(-1.0, &xp, &fp), 10.0);
        assert_eq!(interp(0.5, &xp, &fp), 15.0);
        assert_eq!(interp(1.5, &xp, &fp), 30.0);
        assert_eq!(interp(1.0, &xp, &fp), 20.0);
        assert_eq!(interp(3.0, &xp, &fp), 40.0);
    }

    #[test]
    fn test_karras_endpoints_and_order() {
        let sigmas = karras_sigmas(0.0292, 14.6146, 10, 7.0);
        assert!(close(sigmas[0], 14.6146, 1e-9));
        assert!(close(sigmas[9], 0.0292, 1e-9));
        assert!(sigmas.windows(2).all(|w| w[1] < w[0]));
    }

    #[test]
    fn test_sigma_to_t_inverts_training_curve() {
        let options = SchedulerOptions::default();
        let sigmas = train_sigmas(&alphas_cumprod(&betas(&options)));
        let log_sigmas: Vec<f64> = sigmas.iter().map(|s| s.ln()).collect();
        for t in [0usize, 10, 500, 999] {
            assert!(close(sigma_to_t(sigmas[t], &log_sigmas), t as f64, 1e-6));
        }
        let between = sigma_to_t((sigmas[400] * sigmas[401]).sqrt(), &log_sigmas);
        assert!(close(between, 400.5, 1e-6));
    }

    #[test]
    fn test_flow_shifts() {
        assert_eq!(shift_sigma(0.5, 1.0), 0.5);
        assert!(close(shift_sigma(0.5, 3.0), 0.75, 1e-12));
        assert!(close(time_shift(0.0, 0.5), 0.5, 1e-12));
        let options = SchedulerOptions::default();
        assert!(close(calculate_shift(256, &options), 0.5, 1e-6));
        assert!(close(calculate_shift(4096, &options), 1.15, 1e-6));
    }

    #[test]
    fn test_sigma_schedule_shapes() {
        let options = SchedulerOptions::default().with_steps(10);
        let (timesteps, sigmas) = sigma_schedule(&options);
        assert_eq!(timesteps.len(), 10);
        assert_eq!(sigmas.len(), 11);
        assert_eq!(sigmas[10], 0.0);
        assert!(sigmas.windows(2).all(|w| w[1] < w[0]));

        let karras = SchedulerOptions {
            use_karras_sigmas: true,
            ..options
        };
        let (timesteps, sigmas) = sigma_schedule(&karras);
        assert!(close(timesteps[0], 999.0, 1e-6));
        assert!(close(timesteps[9], 0.0, 1e-6));
        assert!(timesteps.windows(2).all(|w| w[1] < w[0]));
        assert_eq!(sigmas.len(), 11);
    }

    #[test]
    fn test_strength_start() {
        assert_eq!(strength_start(20, 1.0).unwrap(), 0);
        assert_eq!(strength_start(20, 0.5).unwrap(), 10);
        assert_eq!(strength_start(20, 0.33).unwrap(), 14);
        assert!(strength_start(20, 0.01).is_err());
        assert!(strength_start(20, 0.0).is_err());
        assert!(strength_start(20, 1.5).is_err());
    }
}
