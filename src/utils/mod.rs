pub mod convergence;
pub use convergence::{relative_residual, Convergence, SolveStats};
