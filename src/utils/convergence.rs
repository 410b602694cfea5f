//! Convergence tracking and residual checks for solves through the bridge.

use crate::core::traits::DistributedMatrix;
use crate::error::BridgeError;
use crate::parallel::Comm;

/// Stopping criteria.
pub struct Convergence<T> {
    pub tol: T,
    pub max_iters: usize,
}

#[derive(Clone, Debug)]
pub struct SolveStats<T> {
    pub iterations: usize,
    /// Relative residual `‖b − A x‖ / ‖b‖` at exit.
    pub final_residual: T,
    pub converged: bool,
}

impl<T: Copy + num_traits::Float> Convergence<T> {
    /// Returns (should_stop, stats) given current `res_norm` and iteration `i`.
    ///
    /// A zero `res0_norm` counts as converged once `res_norm` is zero too.
    pub fn check(&self, res_norm: T, res0_norm: T, i: usize) -> (bool, SolveStats<T>) {
        let rel = if res0_norm > T::zero() {
            res_norm / res0_norm
        } else {
            res_norm
        };
        let converged = rel <= self.tol;
        (
            converged || i >= self.max_iters,
            SolveStats {
                iterations: i,
                final_residual: rel,
                converged,
            },
        )
    }
}

/// Collective: `‖b − A x‖ / ‖b‖`, or `‖b − A x‖` when `b` is zero.
///
/// `x` and `b` are this rank's slices laid out by `a`'s row partition.
pub fn relative_residual<C: Comm + ?Sized, M: DistributedMatrix>(
    comm: &C,
    a: &M,
    x: &[f64],
    b: &[f64],
) -> Result<f64, BridgeError> {
    let mut r = vec![0.0; b.len()];
    a.apply(comm, x, &mut r)?;
    for (ri, bi) in r.iter_mut().zip(b) {
        *ri = bi - *ri;
    }
    let r_norm = comm.dot(&r, &r)?.sqrt();
    let b_norm = comm.dot(b, b)?.sqrt();
    Ok(if b_norm > 0.0 { r_norm / b_norm } else { r_norm })
}
