//! Top-level analysis orchestration.
//!
//! This module is the "real main" of an estimation run. It wires the
//! otherwise-independent numerical subsystems together in the one order that
//! works:
//!
//! - run the data pipeline and collect summary statistics
//! - seed a flat reference model from the Watterson estimate
//! - discretize coalescent time into the hidden-state grid
//! - build the spline model on the grid interior, seed and randomize it
//! - construct the inference manager and the optimizer (plus plugins)
//! - derive the regularization penalty from the not-yet-optimized model
//!
//! Moving any of these steps breaks a data dependency: the grid needs the
//! seeded reference, the model needs the grid interior, and the derived
//! penalty must see the model before the first round touches it.

use crate::data::{
    Bin, Compress, Dataset, DropUninformativeContigs, Pipeline, RecodeMonomorphic, Statistics,
    Summarize, Thin, Validate,
};
use crate::diag::Diagnostics;
use crate::domain::AnalysisConfig;
use crate::error::AnalysisError;
use crate::fit::optimizer::{FitOutcome, Optimizer, RhoPlugin};
use crate::fit::regularization::derive_penalty;
use crate::fit::time_grid::build_hidden_states;
use crate::infer::{InferenceFactory, InferenceManager};
use crate::model::DemographicModel;

/// A dataset, model and inference manager wired together for estimation.
pub struct Analysis {
    config: AnalysisConfig,
    statistics: Statistics,
    dataset: Dataset,
    hidden_states: Vec<f64>,
    manager: Box<dyn InferenceManager>,
    optimizer: Optimizer,
    penalty: f64,
}

impl std::fmt::Debug for Analysis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analysis")
            .field("config", &self.config)
            .field("hidden_states", &self.hidden_states)
            .field("penalty", &self.penalty)
            .finish_non_exhaustive()
    }
}

impl Analysis {
    pub fn new(
        dataset: Dataset,
        config: AnalysisConfig,
        factory: &dyn InferenceFactory,
        diag: &Diagnostics,
    ) -> Result<Self, AnalysisError> {
        let mut pipeline = Pipeline::new();
        pipeline.add_filter(Thin::new(config.thinning));
        pipeline.add_filter(Bin::new(config.window));
        pipeline.add_filter(RecodeMonomorphic);
        pipeline.add_filter(Compress);
        pipeline.add_filter(Validate);
        pipeline.add_filter(DropUninformativeContigs);
        pipeline.add_filter(Summarize);

        // Single-population only; fail before any model state exists.
        let populations = dataset.populations();
        if populations.len() != 1 {
            diag.error(format!(
                "Input covers {} populations; multi-population inference is not supported. \
                 Split the input by population and estimate each separately.",
                populations.len()
            ));
            return Err(AnalysisError::config(format!(
                "Unsupported population count: {} (expected 1).",
                populations.len()
            )));
        }
        let population = populations.into_iter().next().unwrap_or_default();

        let (dataset, statistics) = pipeline.run(dataset)?;

        let theta_hat = statistics.watterson()?;
        let ne_n0 = theta_hat / (2.0 * config.mu * config.n0);
        if !(ne_n0.is_finite() && ne_n0 > 0.0) {
            return Err(AnalysisError::data(format!(
                "Degenerate NeN0 = {ne_n0} (theta={theta_hat}, mu={}, N0={}).",
                config.mu, config.n0
            )));
        }

        let mut reference = DemographicModel::flat(config.n0, Some(population.clone()))?;
        reference.seed(ne_n0.ln());

        let hidden_states =
            build_hidden_states(&reference, config.knots, config.timepoints, config.n0)?;
        let knots = hidden_states[1..hidden_states.len() - 1].to_vec();
        diag.debug(format!("Knots are: {knots:?}"));

        let mut model =
            DemographicModel::new(knots, config.n0, config.spline, Some(population))?;

        let manager = factory.build(&dataset, &hidden_states, config.polarization_error)?;

        model.seed(ne_n0.ln());
        model.randomize(config.seed)?;

        let mut optimizer = Optimizer::new(
            model,
            config.algorithm,
            config.xtol,
            config.ftol,
            config.outdir.clone(),
            config.mode(),
        )?;
        if config.rho.is_none() {
            optimizer.register_plugin(Box::new(RhoPlugin::new(theta_hat)?))?;
        }

        // Derived from the seeded-but-not-yet-optimized model, so the
        // penalty reflects the objective's natural scale at initialization.
        let q = optimizer.model().smoothness();
        let penalty = derive_penalty(config.lambda, q, config.regularization_exponent)?;
        diag.debug(format!("Regularization penalty: lambda={penalty:e}"));

        Ok(Self {
            config,
            statistics,
            dataset,
            hidden_states,
            manager,
            optimizer,
            penalty,
        })
    }

    /// Run up to `max_rounds` optimization rounds. The fitted model remains
    /// owned by the optimizer and is readable through [`Analysis::model`].
    pub fn fit(&mut self, max_rounds: usize) -> Result<FitOutcome, AnalysisError> {
        self.optimizer
            .run(self.manager.as_mut(), self.penalty, max_rounds)
    }

    pub fn hidden_states(&self) -> &[f64] {
        &self.hidden_states
    }

    pub fn model(&self) -> &DemographicModel {
        self.optimizer.model()
    }

    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn penalty(&self) -> f64 {
        self.penalty
    }

    pub fn optimizer(&self) -> &Optimizer {
        &self.optimizer
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Contig, SiteObs};
    use crate::domain::SplineFamily;
    use crate::error::ErrorKind;
    use crate::infer::AuxParams;

    /// Quadratic stand-in for the HMM evaluator.
    struct BowlManager;

    impl InferenceManager for BowlManager {
        fn loglik(&mut self, model: &DemographicModel, _aux: &AuxParams) -> Result<f64, AnalysisError> {
            Ok(-model.coefficients().iter().map(|c| c * c).sum::<f64>())
        }
    }

    struct BowlFactory;

    impl InferenceFactory for BowlFactory {
        fn build(
            &self,
            _dataset: &Dataset,
            hidden_states: &[f64],
            _polarization_error: f64,
        ) -> Result<Box<dyn InferenceManager>, AnalysisError> {
            assert!(!hidden_states.is_empty());
            Ok(Box::new(BowlManager))
        }
    }

    fn synthetic_contig(name: &str, population: &str, segregating: usize) -> Contig {
        let mut sites = Vec::new();
        for _ in 0..segregating {
            sites.push(SiteObs::new(200, 0, 4));
            sites.push(SiteObs::new(1, 2, 4));
        }
        sites.push(SiteObs::new(200, 0, 4));
        Contig::new(name, population, sites)
    }

    fn synthetic_dataset() -> Dataset {
        Dataset::new(vec![synthetic_contig("chr1", "pop1", 40)])
    }

    fn test_config(outdir: &std::path::Path) -> AnalysisConfig {
        AnalysisConfig {
            thinning: 0,
            window: 1,
            knots: 6,
            spline: SplineFamily::Pchip,
            outdir: outdir.to_path_buf(),
            regularization_exponent: 4.0,
            seed: 7,
            ..AnalysisConfig::default()
        }
    }

    #[test]
    fn two_populations_fail_before_construction() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = Dataset::new(vec![
            synthetic_contig("chr1", "popA", 10),
            synthetic_contig("chr2", "popB", 10),
        ]);
        let diag = Diagnostics::capture();
        let err = Analysis::new(dataset, test_config(dir.path()), &BowlFactory, &diag).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(diag.entries().iter().any(|e| e.level == crate::diag::Level::Error));
        // No optimizer was constructed, so no artifacts were written.
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[test]
    fn knot_set_is_grid_interior() {
        let dir = tempfile::tempdir().unwrap();
        let diag = Diagnostics::capture();
        let analysis =
            Analysis::new(synthetic_dataset(), test_config(dir.path()), &BowlFactory, &diag).unwrap();

        let hs = analysis.hidden_states();
        assert_eq!(hs.len(), 6);
        assert_eq!(hs[0], 0.0);
        assert!(hs.windows(2).all(|w| w[1] > w[0]));
        assert_eq!(analysis.model().knots(), &hs[1..hs.len() - 1]);
    }

    #[test]
    fn rho_plugin_registered_only_when_rate_unset() {
        let dir = tempfile::tempdir().unwrap();
        let diag = Diagnostics::capture();

        let learned =
            Analysis::new(synthetic_dataset(), test_config(dir.path()), &BowlFactory, &diag).unwrap();
        let names: Vec<&str> = learned.optimizer().plugins().iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["rho"]);

        let mut config = test_config(dir.path());
        config.rho = Some(1e-8);
        let fixed = Analysis::new(synthetic_dataset(), config, &BowlFactory, &diag).unwrap();
        assert!(fixed.optimizer().plugins().is_empty());
    }

    #[test]
    fn seeded_model_is_reproducible() {
        let dir = tempfile::tempdir().unwrap();
        let diag = Diagnostics::capture();
        let a = Analysis::new(synthetic_dataset(), test_config(dir.path()), &BowlFactory, &diag).unwrap();
        let b = Analysis::new(synthetic_dataset(), test_config(dir.path()), &BowlFactory, &diag).unwrap();
        assert_eq!(a.model().coefficients(), b.model().coefficients());
    }

    #[test]
    fn explicit_lambda_overrides_derivation() {
        let dir = tempfile::tempdir().unwrap();
        let diag = Diagnostics::capture();
        let mut config = test_config(dir.path());
        config.lambda = Some(0.25);
        let analysis = Analysis::new(synthetic_dataset(), config, &BowlFactory, &diag).unwrap();
        assert_eq!(analysis.penalty(), 0.25);
    }

    #[test]
    fn penalty_is_finite_and_nonnegative() {
        let dir = tempfile::tempdir().unwrap();
        let diag = Diagnostics::capture();
        let analysis =
            Analysis::new(synthetic_dataset(), test_config(dir.path()), &BowlFactory, &diag).unwrap();
        assert!(analysis.penalty().is_finite());
        assert!(analysis.penalty() >= 0.0);
    }

    #[test]
    fn degenerate_mu_is_a_data_error() {
        let dir = tempfile::tempdir().unwrap();
        let diag = Diagnostics::capture();
        let mut config = test_config(dir.path());
        config.mu = 0.0;
        let err = Analysis::new(synthetic_dataset(), config, &BowlFactory, &diag).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Data);
    }

    #[test]
    fn knot_values_are_logged_at_debug_level() {
        let dir = tempfile::tempdir().unwrap();
        let diag = Diagnostics::capture();
        Analysis::new(synthetic_dataset(), test_config(dir.path()), &BowlFactory, &diag).unwrap();

        let entries = diag.entries();
        assert!(entries.iter().any(|e| e.message.starts_with("Knots are:")));
        assert!(
            entries
                .iter()
                .any(|e| e.message.starts_with("Regularization penalty:"))
        );
    }
}
