//! Collective communication for row-partitioned structures.
//!
//! Every data-moving method here is a collective: all ranks of the group must
//! call it, in the same order, with arguments of the same shape. Three
//! backends implement [`Comm`]:
//! - [`SerialComm`]: a group of one.
//! - [`ThreadComm`]: an in-process group, one OS thread per rank.
//! - `MpiComm` (feature `mpi`): the MPI world communicator.

use crate::error::BridgeError;

pub mod partition;
pub use partition::DistributedRowPartition;

pub mod thread_comm;
pub use thread_comm::ThreadComm;

#[cfg(feature = "mpi")]
pub mod mpi_comm;
#[cfg(feature = "mpi")]
pub use mpi_comm::MpiComm;

pub trait Comm {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;
    fn barrier(&self);

    /// One value per rank, in rank order.
    fn all_gather_i64(&self, local: i64) -> Result<Vec<i64>, BridgeError>;
    /// Concatenation of every rank's slice, in rank order.
    fn all_gather_f64(&self, local: &[f64]) -> Result<Vec<f64>, BridgeError>;
    /// Concatenation of every rank's slice, in rank order.
    fn all_gather_indices(&self, local: &[usize]) -> Result<Vec<usize>, BridgeError>;

    fn all_reduce_sum(&self, x: f64) -> Result<f64, BridgeError>;
    fn all_reduce_max(&self, x: f64) -> Result<f64, BridgeError>;

    /// `send[d]` goes to rank `d`; the result holds at `s` what rank `s` sent here.
    fn all_to_all_indices(&self, send: Vec<Vec<usize>>) -> Result<Vec<Vec<usize>>, BridgeError>;
    /// `send[d]` goes to rank `d`; the result holds at `s` what rank `s` sent here.
    fn all_to_all_values(&self, send: Vec<Vec<f64>>) -> Result<Vec<Vec<f64>>, BridgeError>;

    fn dot(&self, a: &[f64], b: &[f64]) -> Result<f64, BridgeError> {
        let local = a.iter().zip(b).map(|(&x, &y)| x * y).sum::<f64>();
        self.all_reduce_sum(local)
    }
}

/// Collective consistency check.
///
/// Every rank reports whether its local step succeeded. A rank that failed
/// gets its own error back; a rank that succeeded while a peer failed gets
/// [`BridgeError::CollectiveFailure`], so no rank carries on alone.
pub fn consensus<C: Comm + ?Sized, T>(
    comm: &C,
    local: Result<T, BridgeError>,
) -> Result<T, BridgeError> {
    let flag = if local.is_err() { 1.0 } else { 0.0 };
    let failed = comm.all_reduce_sum(flag)? as usize;
    match local {
        Err(e) => {
            log::warn!("rank {}: collective step failed: {}", comm.rank(), e);
            Err(e)
        }
        Ok(_) if failed > 0 => Err(BridgeError::CollectiveFailure {
            failed,
            size: comm.size(),
        }),
        Ok(v) => Ok(v),
    }
}

/// Communicator for a single process.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialComm;

impl SerialComm {
    pub fn new() -> Self {
        SerialComm
    }
}

impl Comm for SerialComm {
    fn rank(&self) -> usize { 0 }
    fn size(&self) -> usize { 1 }
    fn barrier(&self) {}

    fn all_gather_i64(&self, local: i64) -> Result<Vec<i64>, BridgeError> {
        Ok(vec![local])
    }
    fn all_gather_f64(&self, local: &[f64]) -> Result<Vec<f64>, BridgeError> {
        Ok(local.to_vec())
    }
    fn all_gather_indices(&self, local: &[usize]) -> Result<Vec<usize>, BridgeError> {
        Ok(local.to_vec())
    }
    fn all_reduce_sum(&self, x: f64) -> Result<f64, BridgeError> {
        Ok(x)
    }
    fn all_reduce_max(&self, x: f64) -> Result<f64, BridgeError> {
        Ok(x)
    }
    fn all_to_all_indices(&self, send: Vec<Vec<usize>>) -> Result<Vec<Vec<usize>>, BridgeError> {
        check_send_len(send.len(), 1)?;
        Ok(send)
    }
    fn all_to_all_values(&self, send: Vec<Vec<f64>>) -> Result<Vec<Vec<f64>>, BridgeError> {
        check_send_len(send.len(), 1)?;
        Ok(send)
    }
}

pub(crate) fn check_send_len(found: usize, size: usize) -> Result<(), BridgeError> {
    if found != size {
        return Err(BridgeError::Comm(format!(
            "all-to-all needs one buffer per rank ({size}), got {found}"
        )));
    }
    Ok(())
}
