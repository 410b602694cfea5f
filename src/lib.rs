//! spbridge: move distributed sparse matrices and vectors between an
//! assembly-side (AIJ) representation and an operator-side (CRS) one.
//!
//! A matrix crosses the bridge either by reference, through a non-owning
//! adapter that answers row queries and products from the source, or by deep
//! copy into an owned CRS matrix, optionally redistributed to another row
//! layout. Distributed-memory parallelism goes through the [`parallel::Comm`]
//! trait, with serial, in-process threaded and MPI backends.

pub mod parallel;

pub mod bridge;
pub mod config;
pub mod core;
pub mod error;
pub mod matrix;
pub mod solver;
pub mod utils;
pub mod vector;

// Re-exports for convenience
pub use bridge::*;
pub use config::*;
pub use self::core::*;
pub use error::*;
pub use matrix::*;
pub use parallel::{consensus, Comm, DistributedRowPartition, SerialComm, ThreadComm};
pub use solver::*;
pub use utils::*;
pub use vector::*;

// Re-export SolveStats at the crate root for convenience
pub use utils::convergence::SolveStats;
