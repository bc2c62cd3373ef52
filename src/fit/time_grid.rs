//! Hidden-state grid construction.
//!
//! Continuous coalescent time is discretized into a strictly increasing
//! array of boundaries. Two modes:
//!
//! - balanced: boundaries carve the reference model's coalescent prior into
//!   intervals of equal probability mass (first boundary 0)
//! - explicit: geometric spacing over a user-supplied `[start, end]` span
//!
//! Either way the raw boundaries (generations) are scaled by `2 * N0`; the
//! interior of the scaled grid becomes the spline knot set.

use crate::error::AnalysisError;
use crate::model::DemographicModel;

/// Resolution of the cumulative-hazard table used to invert the coalescent
/// prior in balanced mode.
const HAZARD_STEPS: usize = 4096;

/// Generate `count` geometrically spaced points between `start` and `end`
/// (inclusive).
pub fn geom_space(start: f64, end: f64, count: usize) -> Result<Vec<f64>, AnalysisError> {
    if !(start.is_finite() && end.is_finite() && start > 0.0 && end > 0.0 && end > start) {
        return Err(AnalysisError::config(format!(
            "Invalid time span: start={start}, end={end} (must be finite, >0, and end>start)."
        )));
    }
    if count < 2 {
        return Err(AnalysisError::config("Geometric spacing needs at least 2 points."));
    }

    let ln_start = start.ln();
    let ln_end = end.ln();
    let step = (ln_end - ln_start) / (count as f64 - 1.0);

    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        out.push((ln_start + step * i as f64).exp());
    }
    Ok(out)
}

/// Boundaries (raw generations) carving the reference model's coalescent
/// prior into `count` intervals of equal mass; the first boundary is 0.
///
/// The coalescence-time CDF is `1 - exp(-H(s))` with cumulative hazard
/// `H(s) = integral of 1/eta over [0, s]` in coalescent-scaled time. The
/// boundary for quantile `i/count` solves `H(s) = -ln(1 - i/count)`; the
/// hazard is tabulated by trapezoid prefix sums and inverted by linear
/// interpolation, which is exact for the flat reference model.
pub fn balanced_boundaries(
    reference: &DemographicModel,
    count: usize,
) -> Result<Vec<f64>, AnalysisError> {
    if count < 2 {
        return Err(AnalysisError::config("Balanced grid needs at least 2 boundaries."));
    }

    let k = count as f64;
    let targets: Vec<f64> = (0..count).map(|i| -(1.0 - i as f64 / k).ln()).collect();
    let max_target = targets[count - 1];

    // Expand the tabulation span until it covers the last quantile.
    let mut s_max = reference.size_at(0.0).max(1e-12) * max_target;
    let mut table = hazard_table(reference, s_max);
    let mut doublings = 0;
    while table.last().copied().unwrap_or(0.0) < max_target {
        doublings += 1;
        if doublings > 64 {
            return Err(AnalysisError::data(
                "Coalescent prior mass does not accumulate; reference model is degenerate.",
            ));
        }
        s_max *= 2.0;
        table = hazard_table(reference, s_max);
    }

    let ds = s_max / HAZARD_STEPS as f64;
    let mut out = Vec::with_capacity(count);
    for &target in &targets {
        let s = invert_hazard(&table, ds, target);
        out.push(s * 2.0 * reference.n0());
    }
    Ok(out)
}

/// Trapezoid prefix sums of `1/eta` over `[0, s_max]`, `HAZARD_STEPS`
/// uniform intervals. `table[j] = H(j * ds)`.
fn hazard_table(reference: &DemographicModel, s_max: f64) -> Vec<f64> {
    let ds = s_max / HAZARD_STEPS as f64;
    let mut table = Vec::with_capacity(HAZARD_STEPS + 1);
    let mut acc = 0.0;
    let mut prev_rate = 1.0 / reference.size_at(0.0);
    table.push(0.0);
    for j in 1..=HAZARD_STEPS {
        let rate = 1.0 / reference.size_at(j as f64 * ds);
        acc += 0.5 * (prev_rate + rate) * ds;
        table.push(acc);
        prev_rate = rate;
    }
    table
}

fn invert_hazard(table: &[f64], ds: f64, target: f64) -> f64 {
    if target <= 0.0 {
        return 0.0;
    }
    // First index at or above the target; the expansion loop guarantees one.
    let mut lo = 0usize;
    let mut hi = table.len() - 1;
    while hi - lo > 1 {
        let mid = (lo + hi) / 2;
        if table[mid] < target {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    let h0 = table[lo];
    let h1 = table[hi];
    let frac = if h1 > h0 { (target - h0) / (h1 - h0) } else { 0.0 };
    (lo as f64 + frac) * ds
}

/// Build the final scaled hidden-state grid of length `count`.
///
/// `timepoints` selects explicit mode; otherwise the balanced prior-mass
/// construction runs against the reference model. The result is divided
/// elementwise by `2 * N0` and must be strictly increasing; its interior
/// is the knot set.
pub fn build_hidden_states(
    reference: &DemographicModel,
    count: usize,
    timepoints: Option<(f64, f64)>,
    n0: f64,
) -> Result<Vec<f64>, AnalysisError> {
    if count < 3 {
        return Err(AnalysisError::config(format!(
            "At least 3 hidden states are required for a nonempty knot set (got {count})."
        )));
    }

    let mut grid = match timepoints {
        Some((start, end)) => geom_space(start, end, count)?,
        None => balanced_boundaries(reference, count)?,
    };
    for g in &mut grid {
        *g /= 2.0 * n0;
    }

    if grid.iter().any(|g| !g.is_finite()) {
        return Err(AnalysisError::data("Non-finite hidden-state boundary."));
    }
    if grid.windows(2).any(|w| w[1] <= w[0]) {
        return Err(AnalysisError::data("Hidden-state grid is not strictly increasing."));
    }
    Ok(grid)
}
