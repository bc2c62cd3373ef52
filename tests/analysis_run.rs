//! End-to-end orchestration tests.
//!
//! These exercise the full path: synthetic observations through the filter
//! pipeline, grid construction, model seeding, optimizer wiring, and a fit
//! against a synthetic likelihood evaluator. Fine-grained behavior of the
//! individual stages is covered by unit tests in the library modules.

use ne_curves::analysis::Analysis;
use ne_curves::data::{Contig, Dataset, SiteObs};
use ne_curves::diag::Diagnostics;
use ne_curves::domain::{AnalysisConfig, SplineFamily};
use ne_curves::error::AnalysisError;
use ne_curves::infer::{AuxParams, InferenceFactory, InferenceManager};
use ne_curves::model::DemographicModel;

/// Synthetic evaluator with a known optimum: a quadratic bowl centered on a
/// target log-size history, plus a bowl on rho when it is being learned.
struct BowlManager {
    coeff_target: f64,
    rho_target: Option<f64>,
}

impl InferenceManager for BowlManager {
    fn loglik(&mut self, model: &DemographicModel, aux: &AuxParams) -> Result<f64, AnalysisError> {
        let mut ll: f64 = model
            .coefficients()
            .iter()
            .map(|c| -(c - self.coeff_target) * (c - self.coeff_target))
            .sum();
        if let (Some(target), Some(rho)) = (self.rho_target, aux.get("rho")) {
            ll -= ((rho - target) / target) * ((rho - target) / target);
        }
        Ok(ll)
    }
}

struct BowlFactory {
    coeff_target: f64,
    rho_target: Option<f64>,
    expected_polarization_error: f64,
}

impl InferenceFactory for BowlFactory {
    fn build(
        &self,
        dataset: &Dataset,
        hidden_states: &[f64],
        polarization_error: f64,
    ) -> Result<Box<dyn InferenceManager>, AnalysisError> {
        assert!(!dataset.contigs.is_empty());
        assert!(hidden_states.windows(2).all(|w| w[1] > w[0]));
        assert_eq!(polarization_error, self.expected_polarization_error);
        Ok(Box::new(BowlManager {
            coeff_target: self.coeff_target,
            rho_target: self.rho_target,
        }))
    }
}

/// One contig with `segregating` variant sites spread through monomorphic
/// stretches, sample size 4.
fn synthetic_dataset(segregating: usize) -> Dataset {
    let mut sites = Vec::new();
    for i in 0..segregating {
        sites.push(SiteObs::new(250, 0, 4));
        sites.push(SiteObs::new(1, 1 + (i % 3) as i32, 4));
    }
    sites.push(SiteObs::new(250, 0, 4));
    Dataset::new(vec![Contig::new("chr1", "pop1", sites)])
}

fn base_config(outdir: &std::path::Path) -> AnalysisConfig {
    AnalysisConfig {
        thinning: 0,
        window: 1,
        knots: 8,
        spline: SplineFamily::Pchip,
        polarization_error: 0.02,
        outdir: outdir.to_path_buf(),
        xtol: 1e-6,
        ftol: 1e-9,
        regularization_exponent: 4.0,
        seed: 11,
        ..AnalysisConfig::default()
    }
}

fn factory_for(config: &AnalysisConfig, coeff_target: f64, rho_target: Option<f64>) -> BowlFactory {
    BowlFactory {
        coeff_target,
        rho_target,
        expected_polarization_error: config.polarization_error,
    }
}

#[test]
fn full_run_fits_toward_the_evaluator_optimum() {
    let dir = tempfile::tempdir().unwrap();
    let config = base_config(dir.path());
    let diag = Diagnostics::capture();

    let theta_hat = {
        // theta anchors the rho bounds; pick the rho target inside them.
        let a4 = 1.0 + 0.5 + 1.0 / 3.0;
        let ds = synthetic_dataset(40);
        ds.segregating_sites() as f64 / (a4 * ds.total_span() as f64)
    };
    let factory = factory_for(&config, 0.8, Some(2.0 * theta_hat));

    let mut analysis = Analysis::new(synthetic_dataset(40), config, &factory, &diag).unwrap();

    let seeded = analysis.model().coefficients().to_vec();
    let outcome = analysis.fit(10).unwrap();

    assert!(outcome.rounds >= 1);
    assert!(outcome.value > -1e-2, "objective: {}", outcome.value);
    for c in analysis.model().coefficients() {
        assert!((c - 0.8).abs() < 1e-2, "coefficient {c} far from target");
    }
    assert_ne!(seeded, analysis.model().coefficients());

    // Round artifacts land in the configured output directory.
    assert!(dir.path().join("model_round_1.json").exists());
    assert!(dir.path().join("model_final.json").exists());
}

#[test]
fn explicit_timepoints_control_the_grid() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = base_config(dir.path());
    config.knots = 5;
    config.timepoints = Some((100.0, 10000.0));
    config.n0 = 1.0e4;
    let factory = factory_for(&config, 0.0, None);
    config.rho = Some(1e-9);

    let diag = Diagnostics::capture();
    let analysis = Analysis::new(synthetic_dataset(40), config, &factory, &diag).unwrap();

    let hs = analysis.hidden_states();
    assert_eq!(hs.len(), 5);
    assert!((hs[0] - 0.005).abs() < 1e-12);
    assert!((hs[4] - 0.5).abs() < 1e-12);
    assert!(hs.windows(2).all(|w| w[1] > w[0]));
    assert_eq!(analysis.model().knots(), &hs[1..4]);
}

#[test]
fn fixed_rho_runs_without_a_plugin() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = base_config(dir.path());
    config.rho = Some(1e-8);
    let factory = factory_for(&config, 0.5, None);

    let diag = Diagnostics::capture();
    let mut analysis = Analysis::new(synthetic_dataset(40), config, &factory, &diag).unwrap();
    assert!(analysis.optimizer().plugins().is_empty());

    let outcome = analysis.fit(10).unwrap();
    assert!(outcome.value > -1e-2);
}

#[test]
fn single_mode_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = base_config(dir.path());
    config.single = true;

    let theta_hat = {
        let a4 = 1.0 + 0.5 + 1.0 / 3.0;
        let ds = synthetic_dataset(40);
        ds.segregating_sites() as f64 / (a4 * ds.total_span() as f64)
    };
    let factory = factory_for(&config, 0.4, Some(3.0 * theta_hat));

    let diag = Diagnostics::capture();
    let mut analysis = Analysis::new(synthetic_dataset(40), config, &factory, &diag).unwrap();
    let outcome = analysis.fit(10).unwrap();
    assert!(outcome.value > -1e-2, "objective: {}", outcome.value);
}

#[test]
fn uninformative_contig_aborts_the_analysis() {
    let dir = tempfile::tempdir().unwrap();
    let config = base_config(dir.path());
    let factory = factory_for(&config, 0.0, None);

    let mut dataset = synthetic_dataset(40);
    dataset
        .contigs
        .push(Contig::new("chrEmpty", "pop1", vec![SiteObs::new(500, 0, 4)]));

    let diag = Diagnostics::capture();
    let err = Analysis::new(dataset, config, &factory, &diag).unwrap_err();
    assert_eq!(err.kind(), ne_curves::error::ErrorKind::Data);
    assert!(err.to_string().contains("chrEmpty"));
}

#[test]
fn identical_runs_produce_identical_fits() {
    let run = || {
        let dir = tempfile::tempdir().unwrap();
        let config = base_config(dir.path());
        let factory = factory_for(&config, 0.6, None);
        let mut config = config;
        config.rho = Some(1e-8);

        let diag = Diagnostics::capture();
        let mut analysis = Analysis::new(synthetic_dataset(40), config, &factory, &diag).unwrap();
        analysis.fit(5).unwrap();
        analysis.model().coefficients().to_vec()
    };
    assert_eq!(run(), run());
}
