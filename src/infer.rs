//! Seam to the external likelihood evaluator.
//!
//! The hidden Markov model forward/backward machinery lives outside this
//! crate; the analysis layer only needs something that can score a model
//! (plus the auxiliary plugin parameters) against the transformed dataset.
//! Tests substitute synthetic evaluators through the same seam.

use crate::data::Dataset;
use crate::error::AnalysisError;
use crate::model::DemographicModel;

/// Auxiliary parameter vector contributed by plugins, in registration order.
///
/// Names repeat when a plugin contributes more than one value; lookups by
/// name return the first occurrence.
#[derive(Debug, Clone, Default)]
pub struct AuxParams {
    names: Vec<String>,
    values: Vec<f64>,
}

impl AuxParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: f64) {
        self.names.push(name.into());
        self.values.push(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.values[i])
    }

    /// Replace all values at once; the layout (names, order) is fixed.
    pub fn set_values(&mut self, values: &[f64]) -> Result<(), AnalysisError> {
        if values.len() != self.values.len() {
            return Err(AnalysisError::data(format!(
                "Auxiliary parameter vector length {} does not match layout {}.",
                values.len(),
                self.values.len()
            )));
        }
        self.values.copy_from_slice(values);
        Ok(())
    }

    /// Overwrite a contiguous block of values (one plugin's contribution).
    pub fn set_block(&mut self, offset: usize, values: &[f64]) -> Result<(), AnalysisError> {
        let end = offset + values.len();
        if end > self.values.len() {
            return Err(AnalysisError::data(
                "Auxiliary parameter block out of range.",
            ));
        }
        self.values[offset..end].copy_from_slice(values);
        Ok(())
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&str, f64)> {
        self.names
            .iter()
            .map(|n| n.as_str())
            .zip(self.values.iter().copied())
    }
}

/// The external inference manager: evaluates the data log-likelihood for a
/// candidate model and auxiliary parameters.
pub trait InferenceManager {
    fn loglik(&mut self, model: &DemographicModel, aux: &AuxParams) -> Result<f64, AnalysisError>;
}

/// Builds an inference manager for one analysis run from the transformed
/// dataset, the hidden-state grid, and the polarization error rate.
pub trait InferenceFactory {
    fn build(
        &self,
        dataset: &Dataset,
        hidden_states: &[f64],
        polarization_error: f64,
    ) -> Result<Box<dyn InferenceManager>, AnalysisError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aux_params_lookup_and_update() {
        let mut aux = AuxParams::new();
        aux.push("rho", 0.5);
        aux.push("eps", 0.01);

        assert_eq!(aux.get("rho"), Some(0.5));
        assert_eq!(aux.get("missing"), None);

        aux.set_values(&[0.7, 0.02]).unwrap();
        assert_eq!(aux.get("rho"), Some(0.7));
        assert!(aux.set_values(&[1.0]).is_err());

        aux.set_block(1, &[0.05]).unwrap();
        assert_eq!(aux.get("eps"), Some(0.05));
    }
}
