//! Solver collaborators that consume bridged operators.

use crate::parallel::Comm;
use crate::utils::convergence::SolveStats;

/// Common interface for any solver driven through a communicator.
pub trait LinearSolver<M> {
    type Error;
    /// Solve A·x = b, writing this rank's slice of the result into `x`.
    /// Collective; `b` and `x` are laid out by `a`'s row partition.
    fn solve<C: Comm + ?Sized>(
        &mut self,
        comm: &C,
        a: &M,
        b: &[f64],
        x: &mut [f64],
    ) -> Result<SolveStats<f64>, Self::Error>;
}

pub mod direct_lu;
pub use direct_lu::DenseLuSolver;
