//! Configuration types for an analysis run.
//!
//! These types are intentionally lightweight and serializable so a run
//! configuration can be recorded alongside its artifacts and reloaded later.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

/// Spline family parameterizing log population size over the knot set.
///
/// The set is closed: name-keyed dispatch goes through [`SplineFamily::from_name`]
/// and unsupported names fail configuration up front, rather than being
/// resolved reflectively at evaluation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplineFamily {
    Cubic,
    BSpline,
    Akima,
    Pchip,
    Piecewise,
}

impl SplineFamily {
    pub fn from_name(name: &str) -> Result<Self, AnalysisError> {
        match name {
            "cubic" => Ok(SplineFamily::Cubic),
            "bspline" => Ok(SplineFamily::BSpline),
            "akima" => Ok(SplineFamily::Akima),
            "pchip" => Ok(SplineFamily::Pchip),
            "piecewise" => Ok(SplineFamily::Piecewise),
            other => Err(AnalysisError::config(format!(
                "Unsupported spline family '{other}' (expected one of: cubic, bspline, akima, pchip, piecewise)."
            ))),
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            SplineFamily::Cubic => "cubic",
            SplineFamily::BSpline => "bspline",
            SplineFamily::Akima => "akima",
            SplineFamily::Pchip => "pchip",
            SplineFamily::Piecewise => "piecewise",
        }
    }
}

/// Search strategy used for each bounded minimization inside a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchAlgorithm {
    /// Cyclic coordinate descent with golden-section line minimization.
    Powell,
    /// Bounded Nelder–Mead simplex.
    NelderMead,
}

impl SearchAlgorithm {
    pub fn from_name(name: &str) -> Result<Self, AnalysisError> {
        match name {
            "powell" => Ok(SearchAlgorithm::Powell),
            "neldermead" => Ok(SearchAlgorithm::NelderMead),
            other => Err(AnalysisError::config(format!(
                "Unsupported algorithm '{other}' (expected one of: powell, neldermead)."
            ))),
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            SearchAlgorithm::Powell => "powell",
            SearchAlgorithm::NelderMead => "neldermead",
        }
    }
}

/// Whether auxiliary (plugin) parameters are fit jointly with the spline
/// coefficients in one combined step per round, or in alternating blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitMode {
    Single,
    Multi,
}

/// A full run's configuration as understood by the analysis layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Stride used by the thinning filter; `<= 1` disables thinning.
    pub thinning: usize,
    /// Window width (sites) used by the binning filter; `<= 1` disables binning.
    pub window: u32,
    /// Per-generation, per-site mutation rate.
    pub mu: f64,
    /// Reference effective population size used to nondimensionalize time.
    pub n0: f64,
    /// Requested hidden-state count; the interior becomes the knot set.
    pub knots: usize,
    /// Optional explicit `(start, end)` span in generations, overriding
    /// balanced-grid construction.
    pub timepoints: Option<(f64, f64)>,
    pub spline: SplineFamily,
    /// Passed through to the external inference manager.
    pub polarization_error: f64,
    /// Directory receiving optimizer round artifacts.
    pub outdir: PathBuf,
    pub algorithm: SearchAlgorithm,
    /// Optimizer stopping tolerance on parameters.
    pub xtol: f64,
    /// Optimizer stopping tolerance on the objective.
    pub ftol: f64,
    /// Fixed recombination rate. When `None`, a `"rho"` plugin is registered
    /// and rho is learned jointly with the model.
    pub rho: Option<f64>,
    /// Alternate coefficient and plugin blocks instead of one joint step.
    pub single: bool,
    /// Fixed regularization penalty. When `None` the penalty is derived from
    /// the seeded model.
    pub lambda: Option<f64>,
    /// Exponent for the derived penalty (`|Q| * 10^-exponent`).
    pub regularization_exponent: f64,
    /// Seed for the model randomization step.
    pub seed: u64,
}

impl AnalysisConfig {
    pub fn mode(&self) -> FitMode {
        if self.single {
            FitMode::Single
        } else {
            FitMode::Multi
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            thinning: 0,
            window: 100,
            mu: 1.25e-8,
            n0: 1.0e4,
            knots: 32,
            timepoints: None,
            spline: SplineFamily::Cubic,
            polarization_error: 0.0,
            outdir: PathBuf::from("."),
            algorithm: SearchAlgorithm::Powell,
            xtol: 1e-4,
            ftol: 1e-6,
            rho: None,
            single: false,
            lambda: None,
            regularization_exponent: 6.0,
            seed: 42,
        }
    }
}
