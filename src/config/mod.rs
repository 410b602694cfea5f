//! Typed options handed to external solver collaborators.

pub mod options;
pub use options::{SolverOptions, Verbosity};
