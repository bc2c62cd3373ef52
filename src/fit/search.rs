//! Bounded minimization strategies.
//!
//! The optimizer treats the searcher as a black box with a fixed contract:
//! minimize `f` over a box, deterministically, honoring `xtol`/`ftol`. Two
//! strategies are supported; both are derivative-free because the external
//! likelihood evaluator exposes values only.
//!
//! Why derivative-free searches with modest iteration caps?
//! - each objective evaluation is a full likelihood pass, so evaluation
//!   count dominates wall time
//! - determinism matters more than raw convergence speed: given the same
//!   inputs, a fit must reproduce exactly

use crate::domain::SearchAlgorithm;

/// Inverse golden ratio.
const INVPHI: f64 = 0.618_033_988_749_894_9;

/// Iteration cap for a single bounded minimization.
const MAX_LINE_EVALS: usize = 64;

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub x: Vec<f64>,
    pub value: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Minimize `f` over the box `bounds`, starting from `x0` (clamped into the
/// box). `max_iter` caps outer iterations (sweeps or simplex steps).
pub fn minimize(
    algorithm: SearchAlgorithm,
    f: &mut dyn FnMut(&[f64]) -> f64,
    x0: &[f64],
    bounds: &[(f64, f64)],
    xtol: f64,
    ftol: f64,
    max_iter: usize,
) -> SearchOutcome {
    let x0: Vec<f64> = x0
        .iter()
        .zip(bounds.iter())
        .map(|(&v, &(lo, hi))| v.clamp(lo, hi))
        .collect();
    match algorithm {
        SearchAlgorithm::Powell => coordinate_descent(f, &x0, bounds, xtol, ftol, max_iter),
        SearchAlgorithm::NelderMead => nelder_mead(f, &x0, bounds, xtol, ftol, max_iter),
    }
}

/// Golden-section minimization of a 1-D function on `[lo, hi]`.
fn golden_section(f: &mut dyn FnMut(f64) -> f64, lo: f64, hi: f64, xtol: f64) -> (f64, f64) {
    let mut a = lo;
    let mut b = hi;
    let mut c = b - INVPHI * (b - a);
    let mut d = a + INVPHI * (b - a);
    let mut fc = f(c);
    let mut fd = f(d);

    let mut evals = 2;
    while (b - a) > xtol && evals < MAX_LINE_EVALS {
        if fc < fd {
            b = d;
            d = c;
            fd = fc;
            c = b - INVPHI * (b - a);
            fc = f(c);
        } else {
            a = c;
            c = d;
            fc = fd;
            d = a + INVPHI * (b - a);
            fd = f(d);
        }
        evals += 1;
    }

    if fc < fd { (c, fc) } else { (d, fd) }
}

/// Cyclic coordinate descent with golden-section line minimization.
fn coordinate_descent(
    f: &mut dyn FnMut(&[f64]) -> f64,
    x0: &[f64],
    bounds: &[(f64, f64)],
    xtol: f64,
    ftol: f64,
    max_iter: usize,
) -> SearchOutcome {
    let mut x = x0.to_vec();
    let mut fx = f(&x);
    let mut iterations = 0;
    let mut converged = false;

    for _ in 0..max_iter {
        iterations += 1;
        let f_before = fx;

        for i in 0..x.len() {
            let (lo, hi) = bounds[i];
            if hi - lo <= xtol {
                continue;
            }
            let (xi, fxi) = {
                let x_scratch = x.clone();
                golden_section(
                    &mut |v| {
                        let mut xt = x_scratch.clone();
                        xt[i] = v;
                        f(&xt)
                    },
                    lo,
                    hi,
                    xtol,
                )
            };
            if fxi < fx {
                x[i] = xi;
                fx = fxi;
            }
        }

        if (f_before - fx).abs() <= ftol {
            converged = true;
            break;
        }
    }

    SearchOutcome {
        x,
        value: fx,
        iterations,
        converged,
    }
}

/// Bounded Nelder–Mead: the standard reflect/expand/contract/shrink moves,
/// with every candidate clamped into the box.
fn nelder_mead(
    f: &mut dyn FnMut(&[f64]) -> f64,
    x0: &[f64],
    bounds: &[(f64, f64)],
    xtol: f64,
    ftol: f64,
    max_iter: usize,
) -> SearchOutcome {
    let n = x0.len();
    if n == 0 {
        let value = f(x0);
        return SearchOutcome {
            x: Vec::new(),
            value,
            iterations: 0,
            converged: true,
        };
    }

    let clamp = |x: &mut [f64]| {
        for (v, &(lo, hi)) in x.iter_mut().zip(bounds.iter()) {
            *v = v.clamp(lo, hi);
        }
    };

    // Initial simplex: displace each coordinate by 10% of its box width,
    // flipping direction when that would leave the box.
    let mut simplex: Vec<Vec<f64>> = Vec::with_capacity(n + 1);
    simplex.push(x0.to_vec());
    for i in 0..n {
        let (lo, hi) = bounds[i];
        let step = 0.1 * (hi - lo);
        let mut v = x0.to_vec();
        v[i] = if v[i] + step <= hi { v[i] + step } else { v[i] - step };
        clamp(&mut v);
        simplex.push(v);
    }
    let mut values: Vec<f64> = simplex.iter().map(|v| f(v)).collect();

    let mut iterations = 0;
    let mut converged = false;

    for _ in 0..max_iter {
        iterations += 1;

        // Order best..worst.
        let mut order: Vec<usize> = (0..=n).collect();
        order.sort_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap_or(std::cmp::Ordering::Equal));
        let best = order[0];
        let worst = order[n];
        let second_worst = order[n - 1];

        let spread = (values[worst] - values[best]).abs();
        let size = simplex
            .iter()
            .map(|v| {
                v.iter()
                    .zip(simplex[best].iter())
                    .map(|(a, b)| (a - b).abs())
                    .fold(0.0, f64::max)
            })
            .fold(0.0, f64::max);
        if spread <= ftol || size <= xtol {
            converged = true;
            break;
        }

        // Centroid of all vertices except the worst.
        let mut centroid = vec![0.0; n];
        for (idx, v) in simplex.iter().enumerate() {
            if idx == worst {
                continue;
            }
            for (c, &vi) in centroid.iter_mut().zip(v.iter()) {
                *c += vi;
            }
        }
        for c in &mut centroid {
            *c /= n as f64;
        }

        let blend = |a: &[f64], b: &[f64], t: f64| -> Vec<f64> {
            let mut out: Vec<f64> = a
                .iter()
                .zip(b.iter())
                .map(|(&ai, &bi)| ai + t * (ai - bi))
                .collect();
            clamp(&mut out);
            out
        };

        let reflected = blend(&centroid, &simplex[worst], 1.0);
        let fr = f(&reflected);

        if fr < values[best] {
            let expanded = blend(&centroid, &simplex[worst], 2.0);
            let fe = f(&expanded);
            if fe < fr {
                simplex[worst] = expanded;
                values[worst] = fe;
            } else {
                simplex[worst] = reflected;
                values[worst] = fr;
            }
        } else if fr < values[second_worst] {
            simplex[worst] = reflected;
            values[worst] = fr;
        } else {
            let contracted = blend(&centroid, &simplex[worst], -0.5);
            let fc = f(&contracted);
            if fc < values[worst] {
                simplex[worst] = contracted;
                values[worst] = fc;
            } else {
                // Shrink toward the best vertex.
                let best_point = simplex[best].clone();
                for (idx, v) in simplex.iter_mut().enumerate() {
                    if idx == best {
                        continue;
                    }
                    for (vi, &bi) in v.iter_mut().zip(best_point.iter()) {
                        *vi = bi + 0.5 * (*vi - bi);
                    }
                    clamp(v);
                    values[idx] = f(v);
                }
            }
        }
    }

    let mut best = 0;
    for i in 1..=n {
        if values[i] < values[best] {
            best = i;
        }
    }
    SearchOutcome {
        x: simplex[best].clone(),
        value: values[best],
        iterations,
        converged,
    }
}
