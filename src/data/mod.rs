//! Observation data and the reduction pipeline.
//!
//! This module defines:
//!
//! - per-contig observation records (`SiteObs`, `Contig`, `Dataset`)
//! - the ordered filter chain (`Pipeline`) and its published `Statistics`

pub mod dataset;
pub mod filter;

pub use dataset::*;
pub use filter::*;
