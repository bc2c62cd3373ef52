//! Evaluation kernels for the supported spline families.
//!
//! Every kernel takes the knot abscissae `xs` (strictly increasing), the
//! coefficient vector `ys` (one per knot), and a query time `t`, and returns
//! the interpolated value. Outside the knot span the curve extrapolates as a
//! constant: demographic histories are only constrained where the data can
//! see them, so the tails stay flat.
//!
//! Numerical notes:
//! - The natural-cubic second-derivative system is solved with nalgebra's LU
//!   on a dense matrix; the system is tiny (knot counts are tens, not
//!   thousands) and strictly diagonally dominant, so this is robust. A
//!   singular solve falls back to linear interpolation.
//! - Akima weights can vanish when three consecutive divided differences
//!   agree; the conventional average-slope fallback applies.

use nalgebra::{DMatrix, DVector};

use crate::domain::SplineFamily;

/// Evaluate `family` over `(xs, ys)` at `t`, with constant extrapolation.
///
/// Callers guarantee `xs` is strictly increasing and `ys.len() == xs.len()`;
/// the model type validates this at construction.
pub fn evaluate(family: SplineFamily, xs: &[f64], ys: &[f64], t: f64) -> f64 {
    match ys.len() {
        0 => 0.0,
        1 => ys[0],
        _ => {
            let t = t.clamp(xs[0], xs[xs.len() - 1]);
            match family {
                SplineFamily::Piecewise => piecewise(xs, ys, t),
                SplineFamily::Cubic => natural_cubic(xs, ys, t),
                SplineFamily::Pchip => pchip(xs, ys, t),
                SplineFamily::Akima => akima(xs, ys, t),
                SplineFamily::BSpline => bspline(xs, ys, t),
            }
        }
    }
}

/// Largest `i` with `xs[i] <= t`, capped at the final interval's left end.
fn interval(xs: &[f64], t: f64) -> usize {
    let n = xs.len();
    let mut lo = 0usize;
    let mut hi = n - 1;
    while hi - lo > 1 {
        let mid = (lo + hi) / 2;
        if xs[mid] <= t {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    lo
}

fn piecewise(xs: &[f64], ys: &[f64], t: f64) -> f64 {
    let i = interval(xs, t);
    if t >= xs[xs.len() - 1] {
        ys[ys.len() - 1]
    } else {
        ys[i]
    }
}

fn linear(xs: &[f64], ys: &[f64], t: f64) -> f64 {
    let i = interval(xs, t);
    let h = xs[i + 1] - xs[i];
    let u = (t - xs[i]) / h;
    ys[i] + u * (ys[i + 1] - ys[i])
}

/// Cubic Hermite on interval `i` with endpoint slopes `d0`, `d1`.
fn hermite(xs: &[f64], ys: &[f64], i: usize, d0: f64, d1: f64, t: f64) -> f64 {
    let h = xs[i + 1] - xs[i];
    let u = (t - xs[i]) / h;
    let u2 = u * u;
    let u3 = u2 * u;
    let h00 = 2.0 * u3 - 3.0 * u2 + 1.0;
    let h10 = u3 - 2.0 * u2 + u;
    let h01 = -2.0 * u3 + 3.0 * u2;
    let h11 = u3 - u2;
    h00 * ys[i] + h10 * h * d0 + h01 * ys[i + 1] + h11 * h * d1
}

fn natural_cubic(xs: &[f64], ys: &[f64], t: f64) -> f64 {
    let n = xs.len();
    if n < 3 {
        return linear(xs, ys, t);
    }

    // Second derivatives at the knots; natural boundary (zero curvature).
    let m = n - 2;
    let mut a = DMatrix::<f64>::zeros(m, m);
    let mut rhs = DVector::<f64>::zeros(m);
    for i in 1..n - 1 {
        let h0 = xs[i] - xs[i - 1];
        let h1 = xs[i + 1] - xs[i];
        let r = i - 1;
        a[(r, r)] = 2.0 * (h0 + h1);
        if r > 0 {
            a[(r, r - 1)] = h0;
        }
        if r + 1 < m {
            a[(r, r + 1)] = h1;
        }
        rhs[r] = 6.0 * ((ys[i + 1] - ys[i]) / h1 - (ys[i] - ys[i - 1]) / h0);
    }

    let Some(interior) = a.lu().solve(&rhs) else {
        return linear(xs, ys, t);
    };

    let mut m2 = vec![0.0; n];
    for r in 0..m {
        m2[r + 1] = interior[r];
    }

    let i = interval(xs, t);
    let h = xs[i + 1] - xs[i];
    let dl = xs[i + 1] - t;
    let dr = t - xs[i];
    m2[i] * dl * dl * dl / (6.0 * h)
        + m2[i + 1] * dr * dr * dr / (6.0 * h)
        + (ys[i] / h - m2[i] * h / 6.0) * dl
        + (ys[i + 1] / h - m2[i + 1] * h / 6.0) * dr
}

/// Fritsch–Carlson monotone cubic Hermite.
fn pchip(xs: &[f64], ys: &[f64], t: f64) -> f64 {
    let n = xs.len();
    if n < 3 {
        return linear(xs, ys, t);
    }

    let h: Vec<f64> = xs.windows(2).map(|w| w[1] - w[0]).collect();
    let delta: Vec<f64> = (0..n - 1).map(|i| (ys[i + 1] - ys[i]) / h[i]).collect();

    let mut d = vec![0.0; n];
    for i in 1..n - 1 {
        if delta[i - 1] * delta[i] <= 0.0 {
            d[i] = 0.0;
        } else {
            let w1 = 2.0 * h[i] + h[i - 1];
            let w2 = h[i] + 2.0 * h[i - 1];
            d[i] = (w1 + w2) / (w1 / delta[i - 1] + w2 / delta[i]);
        }
    }
    d[0] = pchip_endpoint(h[0], h[1], delta[0], delta[1]);
    d[n - 1] = pchip_endpoint(h[n - 2], h[n - 3], delta[n - 2], delta[n - 3]);

    let i = interval(xs, t);
    hermite(xs, ys, i, d[i], d[i + 1], t)
}

/// One-sided three-point endpoint slope with the standard shape limits.
fn pchip_endpoint(h0: f64, h1: f64, del0: f64, del1: f64) -> f64 {
    let mut d = ((2.0 * h0 + h1) * del0 - h0 * del1) / (h0 + h1);
    if d * del0 <= 0.0 {
        d = 0.0;
    } else if del0 * del1 < 0.0 && d.abs() > 3.0 * del0.abs() {
        d = 3.0 * del0;
    }
    d
}

fn akima(xs: &[f64], ys: &[f64], t: f64) -> f64 {
    let n = xs.len();
    if n < 3 {
        return linear(xs, ys, t);
    }

    // Divided differences padded with two linear extensions on each side.
    let mut delta = Vec::with_capacity(n + 3);
    delta.extend([0.0, 0.0]);
    for i in 0..n - 1 {
        delta.push((ys[i + 1] - ys[i]) / (xs[i + 1] - xs[i]));
    }
    delta[1] = 2.0 * delta[2] - delta[3];
    delta[0] = 2.0 * delta[1] - delta[2];
    let len = delta.len();
    delta.push(2.0 * delta[len - 1] - delta[len - 2]);
    let len = delta.len();
    delta.push(2.0 * delta[len - 1] - delta[len - 2]);

    let mut d = vec![0.0; n];
    for (i, slot) in d.iter_mut().enumerate() {
        // With the padding, interval i's difference sits at delta[i + 2].
        let w1 = (delta[i + 3] - delta[i + 2]).abs();
        let w2 = (delta[i + 1] - delta[i]).abs();
        *slot = if w1 + w2 > 0.0 {
            (w1 * delta[i + 1] + w2 * delta[i + 2]) / (w1 + w2)
        } else {
            0.5 * (delta[i + 1] + delta[i + 2])
        };
    }

    let i = interval(xs, t);
    hermite(xs, ys, i, d[i], d[i + 1], t)
}

/// Clamped B-spline with the coefficients as control points (de Boor).
///
/// Unlike the other families this one approximates rather than interpolates
/// the interior coefficients; the clamped ends still hit the first and last
/// coefficient exactly.
fn bspline(xs: &[f64], ys: &[f64], t: f64) -> f64 {
    let n = ys.len();
    let p = 3.min(n - 1);

    // Clamped knot vector with interior knots at averages of the abscissae.
    let mut kv = Vec::with_capacity(n + p + 1);
    for _ in 0..=p {
        kv.push(xs[0]);
    }
    for j in 1..n - p {
        let mean: f64 = xs[j..j + p].iter().sum::<f64>() / p as f64;
        kv.push(mean);
    }
    for _ in 0..=p {
        kv.push(xs[n - 1]);
    }

    // Knot span index: kv[k] <= t < kv[k + 1], with the right end closed.
    let mut k = p;
    while k < n - 1 && t >= kv[k + 1] {
        k += 1;
    }

    let mut d: Vec<f64> = (0..=p).map(|j| ys[j + k - p]).collect();
    for r in 1..=p {
        for j in (r..=p).rev() {
            let i = j + k - p;
            let denom = kv[i + p - r + 1] - kv[i];
            let alpha = if denom > 0.0 { (t - kv[i]) / denom } else { 0.0 };
            d[j] = (1.0 - alpha) * d[j - 1] + alpha * d[j];
        }
    }
    d[p]
}
