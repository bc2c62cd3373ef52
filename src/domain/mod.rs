//! Shared configuration types.
//!
//! This module defines:
//!
//! - the closed selector enums (`SplineFamily`, `SearchAlgorithm`, `FitMode`)
//! - the full run configuration (`AnalysisConfig`)

pub mod types;

pub use types::*;
