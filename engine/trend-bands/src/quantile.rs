//! Quantiles of the posterior distributions
//!
//! Everything the band computer needs from special functions sits behind
//! [`quantile`], so these routines can be swapped for a numeric library
//! without touching the statistics above them.

use crate::models::DistributionParams;
use std::f64::consts::PI;

/// Bisection steps when inverting a CDF
pub const BISECTION_ITERATIONS: usize = 40;

const MAX_FRACTION_TERMS: usize = 1000;
const FRACTION_EPS: f64 = 1e-13;
const FPMIN: f64 = 1e-300;
const GAMMA_BRACKET_MASS: f64 = 1.0 - 1e-9;

const LANCZOS_G: f64 = 7.0;
const LANCZOS_COEFFICIENTS: [f64; 9] = [
    0.999_999_999_999_809_9,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_1,
    -176.615_029_162_140_6,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_572e-6,
    1.505_632_735_149_311_6e-7,
];

/// Natural log of the gamma function (Lanczos approximation), for `x > 0`
pub fn ln_gamma(x: f64) -> f64 {
    if x <= 0.0 {
        return f64::INFINITY;
    }
    if x < 0.5 {
        // Reflection keeps the approximation in its accurate range.
        return PI.ln() - (PI * x).sin().ln() - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let mut sum = LANCZOS_COEFFICIENTS[0];
    for (i, c) in LANCZOS_COEFFICIENTS.iter().enumerate().skip(1) {
        sum += c / (x + i as f64);
    }
    let t = x + LANCZOS_G + 0.5;
    0.5 * (2.0 * PI).ln() + (x + 0.5) * t.ln() - t + sum.ln()
}

/// Regularized incomplete beta function `I_x(a, b)`
pub fn incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    let ln_front = ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln();
    let front = ln_front.exp();
    // The continued fraction converges fast only below the mean; use the
    // symmetry I_x(a, b) = 1 - I_{1-x}(b, a) above it.
    let value = if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(a, b, x) / a
    } else {
        1.0 - front * beta_continued_fraction(b, a, 1.0 - x) / b
    };
    value.clamp(0.0, 1.0)
}

/// Continued fraction for the incomplete beta function (modified Lentz)
fn beta_continued_fraction(a: f64, b: f64, x: f64) -> f64 {
    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;

    let mut c = 1.0;
    let mut d = guard(1.0 - qab * x / qap).recip();
    let mut h = d;

    for m in 1..=MAX_FRACTION_TERMS {
        let m = m as f64;
        let m2 = 2.0 * m;

        let even = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = guard(1.0 + even * d).recip();
        c = guard(1.0 + even / c);
        h *= d * c;

        let odd = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = guard(1.0 + odd * d).recip();
        c = guard(1.0 + odd / c);
        let delta = d * c;
        h *= delta;

        if (delta - 1.0).abs() < FRACTION_EPS {
            break;
        }
    }
    h
}

/// Regularized lower incomplete gamma function `P(a, x)`
pub fn incomplete_gamma(a: f64, x: f64) -> f64 {
    if x <= 0.0 || a <= 0.0 {
        return 0.0;
    }
    let value = if x < a + 1.0 {
        gamma_series(a, x)
    } else {
        1.0 - gamma_continued_fraction(a, x)
    };
    value.clamp(0.0, 1.0)
}

/// Series expansion of `P(a, x)`, accurate for `x < a + 1`
fn gamma_series(a: f64, x: f64) -> f64 {
    let mut ap = a;
    let mut term = 1.0 / a;
    let mut sum = term;
    for _ in 0..MAX_FRACTION_TERMS {
        ap += 1.0;
        term *= x / ap;
        sum += term;
        if term.abs() < sum.abs() * FRACTION_EPS {
            break;
        }
    }
    sum * (-x + a * x.ln() - ln_gamma(a)).exp()
}

/// Continued fraction for `Q(a, x) = 1 - P(a, x)`, accurate for `x >= a + 1`
fn gamma_continued_fraction(a: f64, x: f64) -> f64 {
    let mut b = x + 1.0 - a;
    let mut c = 1.0 / FPMIN;
    let mut d = 1.0 / b;
    let mut h = d;
    for i in 1..=MAX_FRACTION_TERMS {
        let i = i as f64;
        let an = -i * (i - a);
        b += 2.0;
        d = guard(an * d + b).recip();
        c = guard(b + an / c);
        let delta = d * c;
        h *= delta;
        if (delta - 1.0).abs() < FRACTION_EPS {
            break;
        }
    }
    (-x + a * x.ln() - ln_gamma(a)).exp() * h
}

fn guard(x: f64) -> f64 {
    if x.abs() < FPMIN {
        FPMIN
    } else {
        x
    }
}

/// CDF of Beta(alpha, beta) at `x`
pub fn beta_cdf(x: f64, alpha: f64, beta: f64) -> f64 {
    incomplete_beta(alpha, beta, x)
}

/// CDF of Gamma(shape, rate) at `x`
pub fn gamma_cdf(x: f64, shape: f64, rate: f64) -> f64 {
    incomplete_gamma(shape, rate * x)
}

/// Standard normal CDF, via `erf(z) = P(1/2, z^2)`
pub fn normal_cdf(x: f64) -> f64 {
    let erf = incomplete_gamma(0.5, 0.5 * x * x);
    if x >= 0.0 {
        0.5 * (1.0 + erf)
    } else {
        0.5 * (1.0 - erf)
    }
}

/// Smallest `x` in `[lo, hi]` with `cdf(x) >= p`, to bisection precision
fn bisect(p: f64, mut lo: f64, mut hi: f64, iterations: usize, cdf: impl Fn(f64) -> f64) -> f64 {
    for _ in 0..iterations {
        let mid = 0.5 * (lo + hi);
        if cdf(mid) < p {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    0.5 * (lo + hi)
}

/// Quantile of Beta(alpha, beta)
pub fn beta_quantile(p: f64, alpha: f64, beta: f64) -> f64 {
    if p <= 0.0 {
        return 0.0;
    }
    if p >= 1.0 {
        return 1.0;
    }
    bisect(p, 0.0, 1.0, BISECTION_ITERATIONS, |x| beta_cdf(x, alpha, beta))
}

/// Quantile of Gamma(shape, rate)
pub fn gamma_quantile(p: f64, shape: f64, rate: f64) -> f64 {
    if p <= 0.0 || shape <= 0.0 || rate <= 0.0 {
        return 0.0;
    }
    let mean = shape / rate;
    let sd = shape.sqrt() / rate;
    let mut hi = mean + 10.0 * sd;
    // Same bracket for every p below GAMMA_BRACKET_MASS, so quantiles are
    // monotone in p.
    let target = p.max(GAMMA_BRACKET_MASS);
    for _ in 0..64 {
        if gamma_cdf(hi, shape, rate) >= target {
            break;
        }
        hi *= 2.0;
    }
    bisect(p, 0.0, hi, BISECTION_ITERATIONS, |x| gamma_cdf(x, shape, rate))
}

/// Quantile of the standard normal distribution
pub fn normal_quantile(p: f64) -> f64 {
    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }
    bisect(p, -12.0, 12.0, 64, normal_cdf)
}

/// Quantile `p` of the distribution described by `params`.
///
/// Gamma quantiles are per minute, matching the rate parameter. Normal
/// quantiles are for the weighted mean, with standard error
/// `sqrt(variance / max(total_weight, 1))`.
pub fn quantile(p: f64, params: &DistributionParams) -> f64 {
    match *params {
        DistributionParams::Beta { alpha, beta } => beta_quantile(p, alpha, beta),
        DistributionParams::Gamma { shape, rate } => gamma_quantile(p, shape, rate),
        DistributionParams::Normal { mean, variance, total_weight } => {
            let std_error = (variance / total_weight.max(1.0)).sqrt();
            mean + normal_quantile(p) * std_error
        }
    }
}

/// Equal-tailed interval holding `confidence` of the mass
pub fn credible_interval(confidence: f64, params: &DistributionParams) -> (f64, f64) {
    let tail = 0.5 * (1.0 - confidence);
    (quantile(tail, params), quantile(1.0 - tail, params))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    #[test]
    fn test_ln_gamma_known_values() {
        assert!(close(ln_gamma(1.0), 0.0, 1e-12));
        assert!(close(ln_gamma(2.0), 0.0, 1e-12));
        assert!(close(ln_gamma(5.0), 24.0_f64.ln(), 1e-10));
        assert!(close(ln_gamma(0.5), PI.sqrt().ln(), 1e-10));
        assert!(close(ln_gamma(101.0), 363.739_375_555_563_5, 1e-7));
    }

    #[test]
    fn test_ln_gamma_tiny_argument() {
        // Gamma(x) ~ 1/x near zero
        let x = 1e-6;
        assert!(close(ln_gamma(x), -(x.ln()), 1e-5));
    }

    #[test]
    fn test_incomplete_beta_closed_forms() {
        for &x in &[0.05, 0.3, 0.5, 0.77, 0.99] {
            assert!(close(incomplete_beta(1.0, 1.0, x), x, 1e-10));
            assert!(close(incomplete_beta(3.0, 1.0, x), x.powi(3), 1e-10));
            assert!(close(incomplete_beta(1.0, 2.0, x), 1.0 - (1.0 - x).powi(2), 1e-10));
        }
        assert!(close(incomplete_beta(2.0, 2.0, 0.5), 0.5, 1e-12));
        assert_eq!(incomplete_beta(2.0, 3.0, 0.0), 0.0);
        assert_eq!(incomplete_beta(2.0, 3.0, 1.0), 1.0);
    }

    #[test]
    fn test_incomplete_gamma_closed_forms() {
        for &x in &[0.01, 0.5, 1.0, 2.5, 7.0, 30.0] {
            assert!(close(incomplete_gamma(1.0, x), 1.0 - (-x).exp(), 1e-10));
            assert!(close(incomplete_gamma(2.0, x), 1.0 - (1.0 + x) * (-x).exp(), 1e-10));
        }
        assert_eq!(incomplete_gamma(3.0, 0.0), 0.0);
    }

    #[test]
    fn test_normal_quantile_eighty_percent() {
        assert!(close(normal_quantile(0.9), 1.281_551_6, 1e-6));
        assert!(close(normal_quantile(0.5), 0.0, 1e-9));
        assert!(close(normal_quantile(0.975), 1.959_964, 1e-5));
        assert!(close(normal_cdf(-1.959_964), 0.025, 1e-6));
    }

    #[test]
    fn test_beta_quantile_inverts_cdf() {
        let (a, b) = (12.0, 88.0);
        for &p in &[0.1, 0.5, 0.9] {
            let x = beta_quantile(p, a, b);
            assert!(close(beta_cdf(x, a, b), p, 1e-6));
        }
        assert!(close(beta_quantile(0.5, 2.0, 2.0), 0.5, 1e-9));
    }

    #[test]
    fn test_gamma_quantile_exponential() {
        for &p in &[0.1, 0.5, 0.9] {
            let x = gamma_quantile(p, 1.0, 2.0);
            assert!(close(x, -(1.0 - p).ln() / 2.0, 1e-6));
        }
    }

    #[test]
    fn test_gamma_quantile_wide_bracket() {
        // Large shape with small rate pushes the quantile far from zero
        let x = gamma_quantile(0.9, 400.0, 0.5);
        assert!(x > 800.0);
        assert!(close(gamma_cdf(x, 400.0, 0.5), 0.9, 1e-6));
    }

    #[test]
    fn test_degenerate_parameters_stay_finite() {
        let eps = 1e-6;
        let lo = beta_quantile(0.1, eps, 100.0);
        let hi = beta_quantile(0.9, eps, 100.0);
        assert!(lo.is_finite() && hi.is_finite());
        assert!(lo <= hi);
        let g = gamma_quantile(0.9, eps, 120.0);
        assert!(g.is_finite() && g >= 0.0);
    }

    #[test]
    fn test_normal_params_quantile() {
        let params = DistributionParams::Normal { mean: 3.0, variance: 4.0, total_weight: 4.0 };
        let (lo, hi) = credible_interval(0.8, &params);
        assert!(close(lo, 3.0 - 1.281_551_6, 1e-6));
        assert!(close(hi, 3.0 + 1.281_551_6, 1e-6));
    }

    #[test]
    fn test_interval_widens_with_confidence() {
        let params = DistributionParams::Beta { alpha: 7.0, beta: 43.0 };
        let (lo80, hi80) = credible_interval(0.8, &params);
        let (lo95, hi95) = credible_interval(0.95, &params);
        assert!(lo95 <= lo80 && hi80 <= hi95);
    }
}
