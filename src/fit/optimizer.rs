//! The round-based optimizer.
//!
//! The optimizer owns the demographic model for the lifetime of a run and is
//! its sole writer: every completed round publishes the improved coefficient
//! vector through the model's setter, and any auxiliary parameters through
//! the owning plugin. Plugins contribute extra free parameters (with their
//! admissible boxes) and are consulted every round in registration order, so
//! optimization traces are deterministic.

use std::cell::RefCell;
use std::fs::{File, create_dir_all};
use std::path::PathBuf;

use serde::Serialize;

use crate::domain::{FitMode, SearchAlgorithm};
use crate::error::AnalysisError;
use crate::fit::search;
use crate::infer::{AuxParams, InferenceManager};
use crate::model::DemographicModel;

/// Coefficient search box: log population sizes within five orders of
/// magnitude of `N0`.
const LOG_SIZE_MIN: f64 = -11.512925464970229;
const LOG_SIZE_MAX: f64 = 11.512925464970229;

/// Outer-iteration cap for each bounded search inside a round.
const MAX_SEARCH_ITERATIONS: usize = 100;

/// A named capability contributing free parameters to the optimization.
pub trait Plugin {
    fn name(&self) -> &str;

    /// Current values of the contributed parameters.
    fn parameters(&self) -> Vec<f64>;

    /// Admissible box for each contributed parameter.
    fn bounds(&self) -> Vec<(f64, f64)>;

    fn set_parameters(&mut self, values: &[f64]) -> Result<(), AnalysisError>;
}

/// Learns the population-scaled recombination rate jointly with the model.
///
/// Registered automatically when no fixed rate is configured. The search
/// range is anchored to within two orders of magnitude of theta, and the
/// starting value is theta itself (the geometric center of the box).
pub struct RhoPlugin {
    theta: f64,
    rho: f64,
}

impl RhoPlugin {
    pub fn new(theta: f64) -> Result<Self, AnalysisError> {
        if !(theta.is_finite() && theta > 0.0) {
            return Err(AnalysisError::data(format!(
                "Cannot anchor rho bounds to a degenerate theta ({theta})."
            )));
        }
        Ok(Self { theta, rho: theta })
    }

    pub fn rho(&self) -> f64 {
        self.rho
    }
}

impl Plugin for RhoPlugin {
    fn name(&self) -> &str {
        "rho"
    }

    fn parameters(&self) -> Vec<f64> {
        vec![self.rho]
    }

    fn bounds(&self) -> Vec<(f64, f64)> {
        vec![(self.theta / 100.0, 100.0 * self.theta)]
    }

    fn set_parameters(&mut self, values: &[f64]) -> Result<(), AnalysisError> {
        match values {
            [rho] if rho.is_finite() => {
                self.rho = *rho;
                Ok(())
            }
            _ => Err(AnalysisError::data("rho plugin expects exactly one finite value.")),
        }
    }
}

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct FitOutcome {
    /// Penalized log-likelihood at the final state (higher is better).
    pub value: f64,
    pub rounds: usize,
    pub converged: bool,
}

#[derive(Serialize)]
struct RoundArtifact<'a> {
    label: &'a str,
    value: f64,
    model: &'a DemographicModel,
}

pub struct Optimizer {
    model: DemographicModel,
    algorithm: SearchAlgorithm,
    xtol: f64,
    ftol: f64,
    outdir: PathBuf,
    mode: FitMode,
    plugins: Vec<Box<dyn Plugin>>,
    started: bool,
}

impl Optimizer {
    pub fn new(
        model: DemographicModel,
        algorithm: SearchAlgorithm,
        xtol: f64,
        ftol: f64,
        outdir: PathBuf,
        mode: FitMode,
    ) -> Result<Self, AnalysisError> {
        if !(xtol.is_finite() && xtol > 0.0) {
            return Err(AnalysisError::config(format!("Invalid xtol: {xtol}.")));
        }
        if !(ftol.is_finite() && ftol > 0.0) {
            return Err(AnalysisError::config(format!("Invalid ftol: {ftol}.")));
        }
        Ok(Self {
            model,
            algorithm,
            xtol,
            ftol,
            outdir,
            mode,
            plugins: Vec::new(),
            started: false,
        })
    }

    pub fn model(&self) -> &DemographicModel {
        &self.model
    }

    pub fn mode(&self) -> FitMode {
        self.mode
    }

    pub fn plugins(&self) -> &[Box<dyn Plugin>] {
        &self.plugins
    }

    /// Register a plugin. Only legal before the first round begins;
    /// mid-run registration is an error, not a silent no-op.
    pub fn register_plugin(&mut self, plugin: Box<dyn Plugin>) -> Result<(), AnalysisError> {
        if self.started {
            return Err(AnalysisError::plugin(format!(
                "Cannot register plugin '{}' after optimization has begun.",
                plugin.name()
            )));
        }
        self.plugins.push(plugin);
        Ok(())
    }

    /// Run up to `max_rounds` optimization rounds against the evaluator.
    ///
    /// Each round minimizes the negative penalized log-likelihood over the
    /// model coefficients and all plugin parameters, then publishes the
    /// improved state in place. Stops early once a round improves the
    /// objective by less than `ftol`.
    pub fn run(
        &mut self,
        manager: &mut dyn InferenceManager,
        penalty: f64,
        max_rounds: usize,
    ) -> Result<FitOutcome, AnalysisError> {
        if max_rounds == 0 {
            return Err(AnalysisError::config("At least one optimization round is required."));
        }
        self.started = true;

        let ncoef = self.model.coefficients().len();
        let coeff_bounds = vec![(LOG_SIZE_MIN, LOG_SIZE_MAX); ncoef];

        // Flattened auxiliary layout, registration order.
        let mut aux = AuxParams::new();
        let mut offsets = Vec::with_capacity(self.plugins.len());
        let mut plugin_bounds: Vec<(f64, f64)> = Vec::new();
        for plugin in &self.plugins {
            offsets.push(aux.len());
            for value in plugin.parameters() {
                aux.push(plugin.name(), value);
            }
            plugin_bounds.extend(plugin.bounds());
        }

        let base = self.model.clone();
        let eval_error: RefCell<Option<AnalysisError>> = RefCell::new(None);

        // Negative penalized log-likelihood of a candidate. Evaluator
        // failures poison the candidate and are surfaced after the search.
        let mut eval = |coeffs: &[f64], aux: &AuxParams| -> f64 {
            let mut trial = base.clone();
            if trial.set_coefficients(coeffs).is_err() {
                return f64::INFINITY;
            }
            match manager.loglik(&trial, aux) {
                Ok(ll) if ll.is_finite() => -(ll - penalty * trial.smoothness()),
                Ok(_) => f64::INFINITY,
                Err(e) => {
                    eval_error.borrow_mut().get_or_insert(e);
                    f64::INFINITY
                }
            }
        };

        let mut coeffs: Vec<f64> = self.model.coefficients().to_vec();
        let mut current = eval(&coeffs, &aux);
        if let Some(e) = eval_error.borrow_mut().take() {
            return Err(e);
        }

        let mut rounds = 0;
        let mut converged = false;

        for round in 0..max_rounds {
            rounds = round + 1;
            let before = current;

            match self.mode {
                FitMode::Multi => {
                    let mut x = coeffs.clone();
                    x.extend_from_slice(aux.values());
                    let mut bounds = coeff_bounds.clone();
                    bounds.extend_from_slice(&plugin_bounds);

                    let outcome = search::minimize(
                        self.algorithm,
                        &mut |x: &[f64]| {
                            let (c, av) = x.split_at(ncoef);
                            let mut aux_trial = aux.clone();
                            if aux_trial.set_values(av).is_err() {
                                return f64::INFINITY;
                            }
                            eval(c, &aux_trial)
                        },
                        &x,
                        &bounds,
                        self.xtol,
                        self.ftol,
                        MAX_SEARCH_ITERATIONS,
                    );
                    if outcome.value < current {
                        coeffs.copy_from_slice(&outcome.x[..ncoef]);
                        aux.set_values(&outcome.x[ncoef..])?;
                        current = outcome.value;
                    }
                }
                FitMode::Single => {
                    // Coefficient block first, plugins fixed.
                    let outcome = search::minimize(
                        self.algorithm,
                        &mut |c: &[f64]| eval(c, &aux),
                        &coeffs,
                        &coeff_bounds,
                        self.xtol,
                        self.ftol,
                        MAX_SEARCH_ITERATIONS,
                    );
                    if outcome.value < current {
                        coeffs.copy_from_slice(&outcome.x);
                        current = outcome.value;
                    }

                    // Then each plugin block, registration order.
                    for (i, offset) in offsets.iter().copied().enumerate() {
                        let bounds = self.plugins[i].bounds();
                        if bounds.is_empty() {
                            continue;
                        }
                        let x0 = aux.values()[offset..offset + bounds.len()].to_vec();
                        let outcome = search::minimize(
                            self.algorithm,
                            &mut |v: &[f64]| {
                                let mut aux_trial = aux.clone();
                                if aux_trial.set_block(offset, v).is_err() {
                                    return f64::INFINITY;
                                }
                                eval(&coeffs, &aux_trial)
                            },
                            &x0,
                            &bounds,
                            self.xtol,
                            self.ftol,
                            MAX_SEARCH_ITERATIONS,
                        );
                        if outcome.value < current {
                            aux.set_block(offset, &outcome.x)?;
                            current = outcome.value;
                        }
                    }
                }
            }

            if let Some(e) = eval_error.borrow_mut().take() {
                return Err(e);
            }

            // Publish the round in place; the optimizer is the sole writer.
            self.model.set_coefficients(&coeffs)?;
            for (i, offset) in offsets.iter().copied().enumerate() {
                let arity = self.plugins[i].parameters().len();
                let values = aux.values()[offset..offset + arity].to_vec();
                self.plugins[i].set_parameters(&values)?;
            }
            self.checkpoint(&format!("round_{rounds}"), -current)?;

            if (before - current).abs() <= self.ftol {
                converged = true;
                break;
            }
        }

        self.checkpoint("final", -current)?;
        Ok(FitOutcome {
            value: -current,
            rounds,
            converged,
        })
    }

    /// Write a JSON snapshot of the model to the run's output directory.
    fn checkpoint(&self, label: &str, value: f64) -> Result<(), AnalysisError> {
        create_dir_all(&self.outdir).map_err(|e| {
            AnalysisError::io(format!(
                "Failed to create output directory '{}': {e}",
                self.outdir.display()
            ))
        })?;
        let path = self.outdir.join(format!("model_{label}.json"));
        let file = File::create(&path).map_err(|e| {
            AnalysisError::io(format!("Failed to create '{}': {e}", path.display()))
        })?;
        let artifact = RoundArtifact {
            label,
            value,
            model: &self.model,
        };
        serde_json::to_writer_pretty(file, &artifact)
            .map_err(|e| AnalysisError::io(format!("Failed to write '{}': {e}", path.display())))
    }
}
