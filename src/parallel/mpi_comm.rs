//! MPI-based collective communication.
//!
//! This module provides an implementation of the `Comm` trait on top of the
//! `mpi` crate's world communicator. Variable-count collectives exchange
//! their counts first and then move the payload with a single varcount call.
//! Indices travel as `u64`. MPI errors abort the job (the MPI default error
//! handler), so these methods only fail on local conversion problems.
//!
//! # Example
//! ```no_run
//! # #[cfg(feature = "mpi")]
//! # {
//! use spbridge::parallel::{Comm, MpiComm};
//! let comm = MpiComm::new().unwrap();
//! println!("Rank: {} / {}", comm.rank(), comm.size());
//! comm.barrier();
//! # }
//! ```

use mpi::collective::SystemOperation;
use mpi::datatype::{Partition, PartitionMut};
use mpi::environment::Universe;
use mpi::topology::SimpleCommunicator;
use mpi::traits::*;
use mpi::Count;

use crate::error::BridgeError;

/// MPI communicator wrapper for distributed parallelism.
pub struct MpiComm {
    /// The MPI world communicator (all processes in the job).
    pub world: SimpleCommunicator,
    /// The rank (ID) of this process within the communicator.
    pub rank: usize,
    /// The total number of processes in the communicator.
    pub size: usize,
    // Finalizes MPI when dropped; declared last so `world` goes first.
    _universe: Universe,
}

impl MpiComm {
    /// Initializes MPI and wraps the world communicator.
    pub fn new() -> Result<Self, BridgeError> {
        let universe = mpi::initialize()
            .ok_or_else(|| BridgeError::Comm("MPI was already initialized".into()))?;
        let world = universe.world();
        let rank = world.rank() as usize;
        let size = world.size() as usize;
        Ok(MpiComm { world, rank, size, _universe: universe })
    }

    fn counts_to_all(&self, local: usize) -> Result<Vec<Count>, BridgeError> {
        let local = to_count(local)?;
        let mut counts = vec![0 as Count; self.size];
        self.world.all_gather_into(&local, &mut counts[..]);
        Ok(counts)
    }

    fn gather_varcount<T: Equivalence + Copy + Default>(
        &self,
        local: &[T],
    ) -> Result<Vec<T>, BridgeError> {
        let counts = self.counts_to_all(local.len())?;
        let displs = displacements(&counts);
        let total = counts.iter().map(|&c| c as usize).sum();
        let mut out = vec![T::default(); total];
        {
            let mut part = PartitionMut::new(&mut out[..], &counts[..], &displs[..]);
            self.world.all_gather_varcount_into(local, &mut part);
        }
        Ok(out)
    }

    fn exchange_varcount<T: Equivalence + Copy + Default>(
        &self,
        send: Vec<Vec<T>>,
    ) -> Result<Vec<Vec<T>>, BridgeError> {
        super::check_send_len(send.len(), self.size)?;
        let send_counts = send.iter().map(|v| to_count(v.len())).collect::<Result<Vec<_>, _>>()?;
        let mut recv_counts = vec![0 as Count; self.size];
        self.world.all_to_all_into(&send_counts[..], &mut recv_counts[..]);

        let flat: Vec<T> = send.concat();
        let send_displs = displacements(&send_counts);
        let recv_displs = displacements(&recv_counts);
        let total = recv_counts.iter().map(|&c| c as usize).sum();
        let mut recv = vec![T::default(); total];
        {
            let send_part = Partition::new(&flat[..], &send_counts[..], &send_displs[..]);
            let mut recv_part =
                PartitionMut::new(&mut recv[..], &recv_counts[..], &recv_displs[..]);
            self.world.all_to_all_varcount_into(&send_part, &mut recv_part);
        }
        let mut out = Vec::with_capacity(self.size);
        let mut offset = 0;
        for &c in &recv_counts {
            out.push(recv[offset..offset + c as usize].to_vec());
            offset += c as usize;
        }
        Ok(out)
    }
}

fn to_count(n: usize) -> Result<Count, BridgeError> {
    Count::try_from(n).map_err(|_| {
        BridgeError::Comm(format!("buffer of {n} elements exceeds MPI count range"))
    })
}

fn displacements(counts: &[Count]) -> Vec<Count> {
    counts
        .iter()
        .scan(0 as Count, |acc, &c| {
            let d = *acc;
            *acc += c;
            Some(d)
        })
        .collect()
}

impl super::Comm for MpiComm {
    /// Returns the rank (ID) of this process.
    fn rank(&self) -> usize { self.rank }
    /// Returns the total number of processes in the communicator.
    fn size(&self) -> usize { self.size }
    /// Synchronizes all processes at a barrier.
    fn barrier(&self) { self.world.barrier(); }

    fn all_gather_i64(&self, local: i64) -> Result<Vec<i64>, BridgeError> {
        let mut out = vec![0i64; self.size];
        self.world.all_gather_into(&local, &mut out[..]);
        Ok(out)
    }

    fn all_gather_f64(&self, local: &[f64]) -> Result<Vec<f64>, BridgeError> {
        self.gather_varcount(local)
    }

    fn all_gather_indices(&self, local: &[usize]) -> Result<Vec<usize>, BridgeError> {
        let wide: Vec<u64> = local.iter().map(|&i| i as u64).collect();
        Ok(self.gather_varcount(&wide)?.into_iter().map(|i| i as usize).collect())
    }

    /// Performs an all-reduce sum operation across all processes.
    fn all_reduce_sum(&self, x: f64) -> Result<f64, BridgeError> {
        let mut y = x;
        self.world.all_reduce_into(&x, &mut y, &SystemOperation::sum());
        Ok(y)
    }

    fn all_reduce_max(&self, x: f64) -> Result<f64, BridgeError> {
        let mut y = x;
        self.world.all_reduce_into(&x, &mut y, &SystemOperation::max());
        Ok(y)
    }

    fn all_to_all_indices(&self, send: Vec<Vec<usize>>) -> Result<Vec<Vec<usize>>, BridgeError> {
        let wide = send
            .into_iter()
            .map(|v| v.into_iter().map(|i| i as u64).collect())
            .collect();
        Ok(self
            .exchange_varcount::<u64>(wide)?
            .into_iter()
            .map(|v| v.into_iter().map(|i| i as usize).collect())
            .collect())
    }

    fn all_to_all_values(&self, send: Vec<Vec<f64>>) -> Result<Vec<Vec<f64>>, BridgeError> {
        self.exchange_varcount(send)
    }
}
