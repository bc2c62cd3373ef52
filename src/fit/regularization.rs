//! Regularization penalty derivation.
//!
//! The smoothness penalty weights a curvature term in the objective. An
//! explicit penalty is taken verbatim; otherwise the penalty is anchored to
//! the scale of the unregularized objective at initialization:
//! `|Q| * 10^-exponent`, where `Q` is the smoothness form over the
//! seeded-but-not-yet-optimized model. It must therefore be derived before
//! any optimization round runs.

use crate::error::AnalysisError;

pub fn derive_penalty(
    explicit: Option<f64>,
    q: f64,
    exponent: f64,
) -> Result<f64, AnalysisError> {
    if let Some(lambda) = explicit {
        if !(lambda.is_finite() && lambda >= 0.0) {
            return Err(AnalysisError::config(format!(
                "Explicit regularization penalty must be finite and >= 0 (got {lambda})."
            )));
        }
        return Ok(lambda);
    }

    let penalty = q.abs() * 10f64.powf(-exponent);
    if !(penalty.is_finite() && penalty >= 0.0) {
        return Err(AnalysisError::data(format!(
            "Derived regularization penalty is not finite (Q={q}, exponent={exponent})."
        )));
    }
    Ok(penalty)
}
