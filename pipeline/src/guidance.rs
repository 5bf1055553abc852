//! Classifier-free guidance.

use crate::error::Result;
use tensorstack_tensor::Tensor;

/// Guidance only changes the prediction above a scale of 1.
pub fn is_guidance_enabled(guidance_scale: f32) -> bool {
    guidance_scale > 1.0
}

/// `uncond + scale * (cond - uncond)`; the conditional prediction is returned
/// unchanged when guidance is disabled.
pub fn apply_guidance(cond: &Tensor<f32>, uncond: &Tensor<f32>, guidance_scale: f32) -> Result<Tensor<f32>> {
    if !is_guidance_enabled(guidance_scale) {
        return Ok(cond.clone());
    }
    let difference = cond.sub_tensor(uncond)?;
    Ok(uncond.add_scaled(&difference, guidance_scale)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_one_is_identity() {
        let cond = Tensor::from_vec(vec![0.25f32, -1.5, 3.0], vec![3]).unwrap();
        let uncond = Tensor::from_vec(vec![9.0f32, 9.0, 9.0], vec![3]).unwrap();
        assert_eq!(apply_guidance(&cond, &uncond, 1.0).unwrap(), cond);
        assert_eq!(apply_guidance(&cond, &uncond, 0.0).unwrap(), cond);
    }

    #[test]
    fn test_guidance_extrapolates_from_unconditional() {
        let cond = Tensor::filled(vec![2], 1.0f32);
        let uncond = Tensor::filled(vec![2], 0.5f32);
        let guided = apply_guidance(&cond, &uncond, 7.5).unwrap();
        assert_eq!(guided.as_slice(), &[4.25, 4.25]);
    }

    #[test]
    fn test_shape_mismatch_is_rejected() {
        let cond = Tensor::filled(vec![2], 1.0f32);
        let uncond = Tensor::filled(vec![3], 0.5f32);
        assert!(apply_guidance(&cond, &uncond, 2.0).is_err());
    }
}
