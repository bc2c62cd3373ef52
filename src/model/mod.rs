//! The spline-parameterized demographic model.
//!
//! A model is an ordered vector of log-population-size coefficients tied to
//! a knot set in coalescent-scaled time (raw time divided by `2*N0`). The
//! coefficient vector is owned exclusively; during fitting the optimizer is
//! the sole writer and all mutation goes through [`DemographicModel::set_coefficients`].

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;
use serde::Serialize;

use crate::domain::SplineFamily;
use crate::error::AnalysisError;
use crate::math::spline;

/// Standard deviation of the post-seed perturbation. Small enough that the
/// randomized model stays near the Watterson-derived seed, large enough to
/// move the optimizer off the exactly-flat starting point.
const RANDOMIZE_SIGMA: f64 = 0.05;

#[derive(Debug, Clone, Serialize)]
pub struct DemographicModel {
    knots: Vec<f64>,
    n0: f64,
    family: SplineFamily,
    population: Option<String>,
    coefficients: Vec<f64>,
}

impl DemographicModel {
    pub fn new(
        knots: Vec<f64>,
        n0: f64,
        family: SplineFamily,
        population: Option<String>,
    ) -> Result<Self, AnalysisError> {
        if knots.is_empty() {
            return Err(AnalysisError::config("Model needs at least one knot."));
        }
        if knots.iter().any(|k| !k.is_finite()) {
            return Err(AnalysisError::data("Non-finite knot in model construction."));
        }
        if knots.windows(2).any(|w| w[1] <= w[0]) {
            return Err(AnalysisError::data("Knots must be strictly increasing."));
        }
        if !(n0.is_finite() && n0 > 0.0) {
            return Err(AnalysisError::config(format!("Invalid N0: {n0}.")));
        }
        let coefficients = vec![0.0; knots.len()];
        Ok(Self {
            knots,
            n0,
            family,
            population,
            coefficients,
        })
    }

    /// Single-knot piecewise-constant reference model (size `N0`, i.e. a
    /// log-coefficient of zero until seeded).
    pub fn flat(n0: f64, population: Option<String>) -> Result<Self, AnalysisError> {
        Self::new(vec![1.0], n0, SplineFamily::Piecewise, population)
    }

    /// Set every coefficient to one scalar.
    pub fn seed(&mut self, value: f64) {
        self.coefficients.fill(value);
    }

    /// Perturb the coefficients with small Normal deviates.
    ///
    /// Deterministic for a fixed seed, so seeded runs reproduce exactly.
    pub fn randomize(&mut self, seed: u64) -> Result<(), AnalysisError> {
        let mut rng = StdRng::seed_from_u64(seed);
        let normal = Normal::new(0.0, RANDOMIZE_SIGMA)
            .map_err(|e| AnalysisError::data(format!("Randomization distribution error: {e}")))?;
        for c in &mut self.coefficients {
            *c += normal.sample(&mut rng);
        }
        Ok(())
    }

    /// Replace the coefficient vector. The only mutation path during a fit.
    pub fn set_coefficients(&mut self, values: &[f64]) -> Result<(), AnalysisError> {
        if values.len() != self.coefficients.len() {
            return Err(AnalysisError::data(format!(
                "Coefficient vector length {} does not match knot count {}.",
                values.len(),
                self.coefficients.len()
            )));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(AnalysisError::data("Non-finite coefficient assignment."));
        }
        self.coefficients.copy_from_slice(values);
        Ok(())
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn knots(&self) -> &[f64] {
        &self.knots
    }

    pub fn n0(&self) -> f64 {
        self.n0
    }

    pub fn family(&self) -> SplineFamily {
        self.family
    }

    pub fn population(&self) -> Option<&str> {
        self.population.as_deref()
    }

    /// Log population size (in units of `N0`) at scaled time `t`.
    pub fn log_size_at(&self, t: f64) -> f64 {
        spline::evaluate(self.family, &self.knots, &self.coefficients, t)
    }

    /// Population size (in units of `N0`) at scaled time `t`.
    pub fn size_at(&self, t: f64) -> f64 {
        self.log_size_at(t).exp()
    }

    /// Smoothness quadratic form `Q`: the sum of squared second divided
    /// differences of the coefficients over the knots. Zero for flat models
    /// and for fewer than three knots.
    pub fn smoothness(&self) -> f64 {
        let x = &self.knots;
        let c = &self.coefficients;
        let n = c.len();
        if n < 3 {
            return 0.0;
        }
        let mut q = 0.0;
        for i in 1..n - 1 {
            let d0 = (c[i] - c[i - 1]) / (x[i] - x[i - 1]);
            let d1 = (c[i + 1] - c[i]) / (x[i + 1] - x[i]);
            q += (d1 - d0) * (d1 - d0);
        }
        q
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_model() -> DemographicModel {
        DemographicModel::new(
            vec![0.01, 0.05, 0.2, 0.8],
            1.0e4,
            SplineFamily::Pchip,
            Some("pop1".to_string()),
        )
        .unwrap()
    }

    #[test]
    fn seed_scenario_from_watterson() {
        // theta = 0.001, mu = 1.25e-8, N0 = 10000 -> NeN0 = 4.
        let ne_n0: f64 = 0.001 / (2.0 * 1.25e-8 * 1.0e4);
        assert!((ne_n0 - 4.0).abs() < 1e-12);

        let mut model = test_model();
        model.seed(ne_n0.ln());
        for &c in model.coefficients() {
            assert!((c - 1.3862943611198906).abs() < 1e-12);
        }
    }

    #[test]
    fn randomize_is_deterministic_under_fixed_seed() {
        let mut a = test_model();
        let mut b = test_model();
        a.seed(1.0);
        b.seed(1.0);
        a.randomize(7).unwrap();
        b.randomize(7).unwrap();
        assert_eq!(a.coefficients(), b.coefficients());

        let mut c = test_model();
        c.seed(1.0);
        c.randomize(8).unwrap();
        assert_ne!(a.coefficients(), c.coefficients());
    }

    #[test]
    fn randomize_stays_near_the_seed() {
        let mut model = test_model();
        model.seed(2.0);
        model.randomize(123).unwrap();
        for &c in model.coefficients() {
            assert!((c - 2.0).abs() < 1.0);
        }
    }

    #[test]
    fn set_coefficients_checks_length() {
        let mut model = test_model();
        assert!(model.set_coefficients(&[1.0, 2.0]).is_err());
        assert!(model.set_coefficients(&[1.0, 2.0, 3.0, 4.0]).is_ok());
        assert_eq!(model.coefficients(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn set_coefficients_rejects_non_finite() {
        let mut model = test_model();
        assert!(model.set_coefficients(&[1.0, f64::NAN, 3.0, 4.0]).is_err());
    }

    #[test]
    fn knots_must_increase() {
        let err = DemographicModel::new(vec![0.1, 0.1], 1.0e4, SplineFamily::Cubic, None).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Data);
    }

    #[test]
    fn flat_model_is_constant_and_smooth() {
        let mut model = DemographicModel::flat(1.0e4, None).unwrap();
        model.seed(4.0f64.ln());
        assert!((model.size_at(0.0) - 4.0).abs() < 1e-12);
        assert!((model.size_at(100.0) - 4.0).abs() < 1e-12);
        assert_eq!(model.smoothness(), 0.0);
    }

    #[test]
    fn smoothness_is_zero_for_flat_and_positive_for_bent() {
        let mut model = test_model();
        model.seed(1.5);
        assert_eq!(model.smoothness(), 0.0);

        model.set_coefficients(&[1.0, 2.0, 1.0, 2.0]).unwrap();
        assert!(model.smoothness() > 0.0);
    }
}
