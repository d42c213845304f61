//! Closed-form probability distributions used by the pricing models.
//!
//! Provides:
//! - Poisson PMF/CDF with a thread-safe memoized ln-factorial table
//! - Standard normal CDF via the Abramowitz-Stegun error-function
//!   approximation (accurate to ~1.5e-7)
//! - Inverse standard normal CDF via Acklam's rational approximation

use parking_lot::RwLock;

/// Memoized ln(k!) values. Grown on demand under a write lock so the
/// table stays consistent when the Monte Carlo loop runs on rayon.
static LN_FACTORIALS: RwLock<Vec<f64>> = RwLock::new(Vec::new());

/// Natural log of k! from the shared memoized table.
fn ln_factorial(k: usize) -> f64 {
    {
        let table = LN_FACTORIALS.read();
        if let Some(&v) = table.get(k) {
            return v;
        }
    }

    let mut table = LN_FACTORIALS.write();
    if table.is_empty() {
        table.push(0.0); // ln(0!) = 0
    }
    while table.len() <= k {
        let n = table.len();
        let prev = table[n - 1];
        table.push(prev + (n as f64).ln());
    }
    table[k]
}

/// Poisson probability mass function P(X = k).
///
/// `lambda <= 0` or `k < 0` yields probability 0. Computed in log space
/// to stay stable for large lambda/k.
pub fn poisson_pmf(lambda: f64, k: i64) -> f64 {
    if lambda <= 0.0 || k < 0 {
        return 0.0;
    }
    let k = k as usize;
    (k as f64 * lambda.ln() - lambda - ln_factorial(k)).exp()
}

/// Poisson cumulative distribution P(X <= floor(k)).
///
/// `lambda <= 0` or `k < 0` yields probability 0.
pub fn poisson_cdf(lambda: f64, k: f64) -> f64 {
    if lambda <= 0.0 || k < 0.0 {
        return 0.0;
    }
    let upper = k.floor() as i64;
    let mut total = 0.0;
    for i in 0..=upper {
        total += poisson_pmf(lambda, i);
    }
    total.min(1.0)
}

// Abramowitz-Stegun 7.1.26 error-function coefficients
const ERF_A1: f64 = 0.254829592;
const ERF_A2: f64 = -0.284496736;
const ERF_A3: f64 = 1.421413741;
const ERF_A4: f64 = -1.453152027;
const ERF_A5: f64 = 1.061405429;
const ERF_P: f64 = 0.3275911;

/// Error function approximation, max error ~1.5e-7.
#[inline]
fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + ERF_P * x);
    let poly = ((((ERF_A5 * t + ERF_A4) * t + ERF_A3) * t + ERF_A2) * t + ERF_A1) * t;
    sign * (1.0 - poly * (-x * x).exp())
}

/// Standard normal cumulative distribution Phi(z).
#[inline]
pub fn normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2))
}

/// Normal CDF at `x` for an arbitrary mean and standard deviation.
///
/// A non-positive standard deviation degenerates to a step function at
/// the mean rather than producing NaN.
pub fn normal_cdf_with_params(x: f64, mean: f64, sd: f64) -> f64 {
    if sd <= 0.0 {
        return if x >= mean { 1.0 } else { 0.0 };
    }
    normal_cdf((x - mean) / sd)
}

// Acklam inverse-normal rational approximation coefficients
const INV_A: [f64; 6] = [
    -3.969683028665376e+01,
    2.209460984245205e+02,
    -2.759285104469687e+02,
    1.383577518672690e+02,
    -3.066479806614716e+01,
    2.506628277459239e+00,
];
const INV_B: [f64; 5] = [
    -5.447609879822406e+01,
    1.615858368580409e+02,
    -1.556989798598866e+02,
    6.680131188771972e+01,
    -1.328068155288572e+01,
];
const INV_C: [f64; 6] = [
    -7.784894002430293e-03,
    -3.223964580411365e-01,
    -2.400758277161838e+00,
    -2.549732539343734e+00,
    4.374664141464968e+00,
    2.938163982698783e+00,
];
const INV_D: [f64; 4] = [
    7.784695709041462e-03,
    3.224671290700398e-01,
    2.445134137142996e+00,
    3.754408661907416e+00,
];

const INV_P_LOW: f64 = 0.02425;

/// Inverse standard normal CDF (quantile function).
///
/// Acklam's rational approximation, relative error below 1.15e-9 across
/// the open interval. Inputs are clamped to [1e-10, 1 - 1e-10] so the
/// tails stay finite.
pub fn inverse_normal_cdf(p: f64) -> f64 {
    let p = p.clamp(1e-10, 1.0 - 1e-10);

    if p < INV_P_LOW {
        // Lower tail
        let q = (-2.0 * p.ln()).sqrt();
        (((((INV_C[0] * q + INV_C[1]) * q + INV_C[2]) * q + INV_C[3]) * q + INV_C[4]) * q
            + INV_C[5])
            / ((((INV_D[0] * q + INV_D[1]) * q + INV_D[2]) * q + INV_D[3]) * q + 1.0)
    } else if p <= 1.0 - INV_P_LOW {
        // Central region
        let q = p - 0.5;
        let r = q * q;
        (((((INV_A[0] * r + INV_A[1]) * r + INV_A[2]) * r + INV_A[3]) * r + INV_A[4]) * r
            + INV_A[5])
            * q
            / (((((INV_B[0] * r + INV_B[1]) * r + INV_B[2]) * r + INV_B[3]) * r + INV_B[4]) * r
                + 1.0)
    } else {
        // Upper tail
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        -(((((INV_C[0] * q + INV_C[1]) * q + INV_C[2]) * q + INV_C[3]) * q + INV_C[4]) * q
            + INV_C[5])
            / ((((INV_D[0] * q + INV_D[1]) * q + INV_D[2]) * q + INV_D[3]) * q + 1.0)
    }
}
