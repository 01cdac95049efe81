//! Student t distribution helpers for the significance test

const MAX_ITERATIONS: usize = 10_000;
const EPSILON: f64 = 1e-14;
const TINY: f64 = 1e-300;

/// Regularized incomplete beta function I_x(a, b)
///
/// Returns NaN outside the domain `0 <= x <= 1`, `a > 0`, `b > 0`.
pub fn regularized_incomplete_beta(x: f64, a: f64, b: f64) -> f64 {
    if !(0.0..=1.0).contains(&x) || a <= 0.0 || b <= 0.0 {
        return f64::NAN;
    }
    if x == 0.0 || x == 1.0 {
        return x;
    }

    let ln_front = libm::lgamma(a + b) - libm::lgamma(a) - libm::lgamma(b)
        + a * libm::log(x)
        + b * libm::log1p(-x);
    let front = libm::exp(ln_front);

    // The continued fraction converges quickly only on this side of the mean
    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(x, a, b) / a
    } else {
        1.0 - front * beta_continued_fraction(1.0 - x, b, a) / b
    }
}

/// Lentz evaluation of the incomplete beta continued fraction
fn beta_continued_fraction(x: f64, a: f64, b: f64) -> f64 {
    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;

    let mut c = 1.0;
    let mut d = clamp_tiny(1.0 - qab * x / qap).recip();
    let mut h = d;

    for m in 1..=MAX_ITERATIONS {
        let m = m as f64;
        let m2 = 2.0 * m;

        let even = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = clamp_tiny(1.0 + even * d).recip();
        c = clamp_tiny(1.0 + even / c);
        h *= d * c;

        let odd = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = clamp_tiny(1.0 + odd * d).recip();
        c = clamp_tiny(1.0 + odd / c);
        let delta = d * c;
        h *= delta;

        if (delta - 1.0).abs() < EPSILON {
            break;
        }
    }
    h
}

fn clamp_tiny(v: f64) -> f64 {
    if v.abs() < TINY { TINY } else { v }
}

/// Two-tailed p-value of `t` under Student's t with `df` degrees of freedom
pub fn student_t_two_tailed(t: f64, df: f64) -> f64 {
    if t.is_nan() || df.is_nan() || df <= 0.0 {
        return 1.0;
    }
    if t.is_infinite() {
        return 0.0;
    }
    let x = df / (df + t * t);
    regularized_incomplete_beta(x, df / 2.0, 0.5).clamp(0.0, 1.0)
}

/// Positive `t` whose two-tailed p-value is `alpha`
pub fn t_critical(df: f64, alpha: f64) -> f64 {
    let mut low = 0.0;
    let mut high = 1.0;
    while student_t_two_tailed(high, df) > alpha && high < 1e6 {
        low = high;
        high *= 2.0;
    }
    for _ in 0..200 {
        let mid = (low + high) / 2.0;
        if student_t_two_tailed(mid, df) > alpha {
            low = mid;
        } else {
            high = mid;
        }
        if high - low < 1e-12 {
            break;
        }
    }
    (low + high) / 2.0
}
