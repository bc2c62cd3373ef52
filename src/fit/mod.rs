//! Model fitting orchestration.
//!
//! Responsibilities:
//!
//! - discretize coalescent time into the hidden-state grid
//! - bounded minimization strategies used inside each round
//! - the round-based optimizer and its plugin mechanism
//! - regularization penalty derivation

pub mod optimizer;
pub mod regularization;
pub mod search;
pub mod time_grid;

pub use optimizer::*;
pub use regularization::*;
pub use search::*;
pub use time_grid::*;
