//! Solver options.
//!
//! These replace string-keyed parameter lists: every setting is a typed field
//! with a default, and [`SolverOptions::validate`] rejects values no solve
//! could honour.

use bitflags::bitflags;

use crate::error::BridgeError;

bitflags! {
    /// What a solver reports while it runs.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct Verbosity: u32 {
        const ERRORS              = 0b0_0001;
        const WARNINGS            = 0b0_0010;
        const ITERATION_DETAILS   = 0b0_0100;
        const STATUS_TEST_DETAILS = 0b0_1000;
        const FINAL_SUMMARY       = 0b1_0000;
    }
}

impl Default for Verbosity {
    fn default() -> Self {
        Verbosity::ERRORS | Verbosity::FINAL_SUMMARY
    }
}

/// Stopping criteria and reporting for a linear solve.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverOptions {
    pub max_iterations: usize,
    /// Bound on `‖b − A x‖ / ‖b‖`.
    pub convergence_tolerance: f64,
    pub verbosity: Verbosity,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            convergence_tolerance: 1e-8,
            verbosity: Verbosity::STATUS_TEST_DETAILS | Verbosity::FINAL_SUMMARY,
        }
    }
}

impl SolverOptions {
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.max_iterations == 0 {
            return Err(BridgeError::InvalidOption("max_iterations must be positive".into()));
        }
        if !(self.convergence_tolerance > 0.0 && self.convergence_tolerance.is_finite()) {
            return Err(BridgeError::InvalidOption(format!(
                "convergence_tolerance must be positive and finite, got {}",
                self.convergence_tolerance
            )));
        }
        Ok(())
    }
}
