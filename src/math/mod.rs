//! Mathematical utilities: spline family evaluation.

pub mod spline;

pub use spline::*;
