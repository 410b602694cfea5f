//! Direct dense solve using Faer's LU with full pivoting.
//!
//! The operator is replicated on every rank, densified and factorised; each
//! rank keeps its own slice of the solution. Only suitable for small systems,
//! which is what it is for: a reference answer for anything built through the
//! bridge.

use faer::linalg::solvers::{FullPivLu, SolveCore};
use faer::{Conj, MatMut};

use crate::config::{SolverOptions, Verbosity};
use crate::core::traits::{check_same_len, DistributedMatrix};
use crate::error::BridgeError;
use crate::matrix::gather_to_faer;
use crate::parallel::{consensus, Comm};
use crate::solver::LinearSolver;
use crate::utils::convergence::{relative_residual, Convergence, SolveStats};

pub struct DenseLuSolver {
    options: SolverOptions,
}

impl DenseLuSolver {
    pub fn new(options: SolverOptions) -> Result<Self, BridgeError> {
        options.validate()?;
        Ok(Self { options })
    }

    pub fn options(&self) -> &SolverOptions {
        &self.options
    }
}

impl<M: DistributedMatrix> LinearSolver<M> for DenseLuSolver {
    type Error = BridgeError;

    fn solve<C: Comm + ?Sized>(
        &mut self,
        comm: &C,
        a: &M,
        b: &[f64],
        x: &mut [f64],
    ) -> Result<SolveStats<f64>, BridgeError> {
        let n = a.global_rows();
        if n != a.global_cols() {
            return Err(BridgeError::Solve(format!(
                "LU needs a square operator, got {n}x{}",
                a.global_cols()
            )));
        }
        let local_rows = a.row_partition().local_rows();
        let shapes = check_same_len(local_rows, b.len()).and(check_same_len(local_rows, x.len()));
        consensus(comm, shapes)?;

        let a_full = gather_to_faer(comm, a)?;
        let mut sol = comm.all_gather_f64(b)?;
        let factor = FullPivLu::new(a_full.to_dense().as_ref());
        let rhs = MatMut::from_column_major_slice_mut(&mut sol, n, 1);
        factor.solve_in_place_with_conj(Conj::No, rhs);
        let first = a.ownership_range().start;
        x.copy_from_slice(&sol[first..first + x.len()]);

        let rel = relative_residual(comm, a, x, b)?;
        let conv = Convergence {
            tol: self.options.convergence_tolerance,
            max_iters: self.options.max_iterations,
        };
        let (_, stats) = conv.check(rel, 1.0, 1);

        let verbosity = self.options.verbosity;
        if comm.rank() == 0 {
            if verbosity.contains(Verbosity::STATUS_TEST_DETAILS) {
                log::info!(
                    "dense LU: relative residual {:.3e} vs tolerance {:.3e}",
                    rel,
                    self.options.convergence_tolerance
                );
            }
            if !stats.converged && verbosity.contains(Verbosity::WARNINGS) {
                log::warn!("dense LU: residual {rel:.3e} above tolerance");
            }
            if verbosity.contains(Verbosity::FINAL_SUMMARY) {
                log::info!(
                    "dense LU: n = {n}, converged = {}, iterations = {}",
                    stats.converged,
                    stats.iterations
                );
            }
        }
        Ok(stats)
    }
}
