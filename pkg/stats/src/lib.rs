//! Online summary statistics and confidence-interval margins.
//!
//! [`RunningStats`] folds observations one at a time with Welford's update,
//! so nothing but the running moments is ever stored. Margins of error use a
//! two-sided Student-t critical value computed for the requested confidence
//! level and the sample's degrees of freedom.

use std::f64::consts::PI;

use serde::Serialize;

// ---------------------------------------------------------------------------
// Running moments
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    /// Sum of squared deviations from the running mean.
    m2: f64,
    min: f64,
    max: f64,
}

impl Default for RunningStats {
    fn default() -> Self {
        Self::new()
    }
}

impl RunningStats {
    pub const fn new() -> Self {
        Self {
            count: 0,
            mean: 0.0,
            m2: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    pub fn push(&mut self, x: f64) {
        debug_assert!(x.is_finite(), "non-finite observation {x}");
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
        self.min = self.min.min(x);
        self.max = self.max.max(x);
    }

    /// Combines two accumulators as if every observation had been pushed into
    /// one (Chan et al. pairwise update).
    pub fn merge(&mut self, other: &RunningStats) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = *other;
            return;
        }
        let left = self.count as f64;
        let right = other.count as f64;
        let total = left + right;
        let delta = other.mean - self.mean;
        self.mean += delta * right / total;
        self.m2 += other.m2 + delta * delta * left * right / total;
        self.count += other.count;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then_some(self.mean)
    }

    /// Unbiased sample variance; 0 until there are two observations.
    pub fn sample_variance(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        self.m2 / (self.count - 1) as f64
    }

    pub fn min(&self) -> Option<f64> {
        (self.count > 0).then_some(self.min)
    }

    pub fn max(&self) -> Option<f64> {
        (self.count > 0).then_some(self.max)
    }

    pub fn standard_error(&self) -> Option<f64> {
        (self.count > 1).then(|| (self.sample_variance() / self.count as f64).sqrt())
    }

    /// Half-width of the two-sided confidence interval around the mean.
    pub fn margin_of_error(&self, confidence: f64) -> Option<f64> {
        let standard_error = self.standard_error()?;
        let critical = student_t_critical(confidence, self.count - 1)?;
        Some(critical * standard_error)
    }

    pub fn summarize(&self, confidence_levels: &[f64]) -> Option<MetricSummary> {
        Some(MetricSummary {
            count: self.count,
            mean: self.mean()?,
            variance: self.sample_variance(),
            min: self.min()?,
            max: self.max()?,
            margins: confidence_levels
                .iter()
                .map(|confidence| Margin {
                    confidence: *confidence,
                    margin: self.margin_of_error(*confidence),
                })
                .collect(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSummary {
    pub count: u64,
    pub mean: f64,
    pub variance: f64,
    pub min: f64,
    pub max: f64,
    pub margins: Vec<Margin>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Margin {
    pub confidence: f64,
    /// `None` with fewer than two observations.
    pub margin: Option<f64>,
}

// ---------------------------------------------------------------------------
// Critical values
// ---------------------------------------------------------------------------

/// Two-sided Student-t critical value: `t` such that `P(|T| <= t) = confidence`.
pub fn student_t_critical(confidence: f64, degrees_of_freedom: u64) -> Option<f64> {
    if !(confidence > 0.0 && confidence < 1.0) {
        return None;
    }
    student_t_quantile(1.0 - (1.0 - confidence) / 2.0, degrees_of_freedom)
}

/// Inverse CDF of Student's t. Closed form for one and two degrees of
/// freedom; otherwise the two-sided tail `I_x(df/2, 1/2)` is inverted by
/// bisection on `x = df / (df + t^2)`.
pub fn student_t_quantile(p: f64, degrees_of_freedom: u64) -> Option<f64> {
    if !(p > 0.0 && p < 1.0) || degrees_of_freedom == 0 {
        return None;
    }
    match degrees_of_freedom {
        1 => Some((PI * (p - 0.5)).tan()),
        2 => Some((2.0 * p - 1.0) / (2.0 * p * (1.0 - p)).sqrt()),
        df => {
            if p == 0.5 {
                return Some(0.0);
            }
            let v = df as f64;
            let tail = 2.0 * p.min(1.0 - p);
            // The tail grows with x, so keep the root bracketed in [lo, hi].
            let (mut lo, mut hi) = (0.0f64, 1.0f64);
            for _ in 0..BISECTION_STEPS {
                let mid = 0.5 * (lo + hi);
                if mid <= lo || mid >= hi {
                    break;
                }
                if regularized_beta(mid, 0.5 * v, 0.5) < tail {
                    lo = mid;
                } else {
                    hi = mid;
                }
            }
            let x = 0.5 * (lo + hi);
            let t = (v * (1.0 - x) / x).sqrt();
            Some(if p < 0.5 { -t } else { t })
        }
    }
}

const BISECTION_STEPS: usize = 200;
const CF_MAX_ITERATIONS: usize = 10_000;
const CF_EPSILON: f64 = 1e-15;
const CF_FLOOR: f64 = 1e-300;

/// Regularized incomplete beta function `I_x(a, b)`.
pub fn regularized_beta(x: f64, a: f64, b: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    let front = (ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln())
        .exp();
    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(x, a, b) / a
    } else {
        1.0 - front * beta_continued_fraction(1.0 - x, b, a) / b
    }
}

// Modified Lentz evaluation of the incomplete beta continued fraction.
fn beta_continued_fraction(x: f64, a: f64, b: f64) -> f64 {
    let floor = |value: f64| {
        if value.abs() < CF_FLOOR {
            CF_FLOOR
        } else {
            value
        }
    };
    let (qab, qap, qam) = (a + b, a + 1.0, a - 1.0);
    let mut c = 1.0;
    let mut d = 1.0 / floor(1.0 - qab * x / qap);
    let mut h = d;
    for m in 1..=CF_MAX_ITERATIONS {
        let m = m as f64;
        let m2 = 2.0 * m;

        let even = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 / floor(1.0 + even * d);
        c = floor(1.0 + even / c);
        h *= d * c;

        let odd = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 / floor(1.0 + odd * d);
        c = floor(1.0 + odd / c);
        let step = d * c;
        h *= step;
        if (step - 1.0).abs() < CF_EPSILON {
            break;
        }
    }
    h
}

const LANCZOS: [f64; 14] = [
    57.156_235_665_862_923_5,
    -59.597_960_355_475_491_2,
    14.136_097_974_741_747_1,
    -0.491_913_816_097_620_199,
    0.339_946_499_848_118_887e-4,
    0.465_236_289_270_485_756e-4,
    -0.983_744_753_048_795_646e-4,
    0.158_088_703_224_912_494e-3,
    -0.210_264_441_724_104_883e-3,
    0.217_439_618_115_212_643e-3,
    -0.164_318_106_536_763_890e-3,
    0.844_182_239_838_527_433e-4,
    -0.261_908_384_015_814_087e-4,
    0.368_991_826_595_316_234e-5,
];

/// `ln Γ(x)` for `x > 0` (Lanczos, about 15 significant digits).
fn ln_gamma(x: f64) -> f64 {
    let mut tmp = x + 5.242_187_5;
    tmp = (x + 0.5) * tmp.ln() - tmp;
    let mut y = x;
    let mut series = 0.999_999_999_999_997_092;
    for coefficient in LANCZOS {
        y += 1.0;
        series += coefficient / y;
    }
    tmp + (2.506_628_274_631_000_5 * series / x).ln()
}

const A: [f64; 6] = [
    -3.969_683_028_665_376e1,
    2.209_460_984_245_205e2,
    -2.759_285_104_469_687e2,
    1.383_577_518_672_690e2,
    -3.066_479_806_614_716e1,
    2.506_628_277_459_239,
];
const B: [f64; 5] = [
    -5.447_609_879_822_406e1,
    1.615_858_368_580_409e2,
    -1.556_989_798_598_866e2,
    6.680_131_188_771_972e1,
    -1.328_068_155_288_572e1,
];
const C: [f64; 6] = [
    -7.784_894_002_430_293e-3,
    -3.223_964_580_411_365e-1,
    -2.400_758_277_161_838,
    -2.549_732_539_343_734,
    4.374_664_141_464_968,
    2.938_163_982_698_783,
];
const D: [f64; 4] = [
    7.784_695_709_041_462e-3,
    3.224_671_290_700_398e-1,
    2.445_134_137_142_996,
    3.754_408_661_907_416,
];
const P_LOW: f64 = 0.02425;

/// Standard normal inverse CDF (Acklam's rational approximation, relative
/// error below 1.2e-9).
pub fn normal_quantile(p: f64) -> Option<f64> {
    if !(p > 0.0 && p < 1.0) {
        return None;
    }
    let tail = |q: f64| {
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    };
    let value = if p < P_LOW {
        tail((-2.0 * p.ln()).sqrt())
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        -tail((-2.0 * (1.0 - p).ln()).sqrt())
    };
    Some(value)
}
