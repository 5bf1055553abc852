//! Adaptive Simpson quadrature for the LMS coefficient integrals.

/// Absolute tolerance used for every LMS coefficient.
pub const LMS_TOLERANCE: f64 = 1e-4;

const MAX_DEPTH: u32 = 50;

/// Integrate `f` over `[a, b]`; `b < a` yields the signed (negated) integral.
pub fn adaptive_simpson<F>(f: F, a: f64, b: f64, epsilon: f64) -> f64
where
    F: Fn(f64) -> f64,
{
    if a == b {
        return 0.0;
    }
    let (fa, fb) = (f(a), f(b));
    let m = 0.5 * (a + b);
    let fm = f(m);
    let whole = simpson(a, b, fa, fm, fb);
    refine(&f, a, b, fa, fm, fb, whole, epsilon, MAX_DEPTH)
}

fn simpson(a: f64, b: f64, fa: f64, fm: f64, fb: f64) -> f64 {
    (b - a) / 6.0 * (fa + 4.0 * fm + fb)
}

#[allow(clippy::too_many_arguments)]
fn refine<F>(f: &F, a: f64, b: f64, fa: f64, fm: f64, fb: f64, whole: f64, epsilon: f64, depth: u32) -> f64
where
    F: Fn(f64) -> f64,
{
    let m = 0.5 * (a + b);
    let (lm, rm) = (0.5 * (a + m), 0.5 * (m + b));
    let (flm, frm) = (f(lm), f(rm));
    let left = simpson(a, m, fa, flm, fm);
    let right = simpson(m, b, fm, frm, fb);
    let delta = left + right - whole;
    if depth == 0 || delta.abs() <= 15.0 * epsilon {
        return left + right + delta / 15.0;
    }
    refine(f, a, m, fa, flm, fm, left, epsilon / 2.0, depth - 1)
        + refine(f, m, b, fm, frm, fb, right, epsilon / 2.0, depth - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polynomials_are_exact() {
        let cubic = |x: f64| 2.0 * x * x * x - x + 3.0;
        let exact = |x: f64| 0.5 * x.powi(4) - 0.5 * x * x + 3.0 * x;
        let value = adaptive_simpson(cubic, -1.0, 2.0, LMS_TOLERANCE);
        assert!((value - (exact(2.0) - exact(-1.0))).abs() < 1e-12);
    }

    #[test]
    fn test_reversed_bounds_negate() {
        let forward = adaptive_simpson(|x| x * x, 0.0, 3.0, LMS_TOLERANCE);
        let backward = adaptive_simpson(|x| x * x, 3.0, 0.0, LMS_TOLERANCE);
        assert!((forward - 9.0).abs() < 1e-12);
        assert!((forward + backward).abs() < 1e-12);
    }

    #[test]
    fn test_smooth_function_within_tolerance() {
        let value = adaptive_simpson(f64::sin, 0.0, std::f64::consts::PI, LMS_TOLERANCE);
        assert!((value - 2.0).abs() < LMS_TOLERANCE);
        assert_eq!(adaptive_simpson(f64::exp, 1.0, 1.0, LMS_TOLERANCE), 0.0);
    }
}
