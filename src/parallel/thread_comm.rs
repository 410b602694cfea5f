// In-process rank group: one thread per rank, collectives over shared slots.

use std::any::Any;
use std::sync::{Arc, Barrier, Mutex};

use crate::error::BridgeError;

type Payload = Arc<dyn Any + Send + Sync>;

struct Slot {
    op: &'static str,
    payload: Payload,
}

struct Shared {
    size: usize,
    barrier: Barrier,
    slots: Mutex<Vec<Option<Slot>>>,
}

/// One rank of an in-process group.
///
/// Collectives deposit a payload in this rank's slot, wait for the whole
/// group, read every slot, then wait again so no rank overwrites its slot
/// while a peer is still reading. A rank that panics leaves its peers blocked
/// at the barrier, exactly like a crashed MPI process.
#[derive(Clone)]
pub struct ThreadComm {
    rank: usize,
    shared: Arc<Shared>,
}

impl ThreadComm {
    /// Handles for every rank of a new group of `size` ranks.
    pub fn group(size: usize) -> Vec<ThreadComm> {
        let size = size.max(1);
        let shared = Arc::new(Shared {
            size,
            barrier: Barrier::new(size),
            slots: Mutex::new((0..size).map(|_| None).collect()),
        });
        (0..size)
            .map(|rank| ThreadComm {
                rank,
                shared: Arc::clone(&shared),
            })
            .collect()
    }

    /// Run `f` on every rank of a fresh group, one scoped thread per rank.
    /// Results come back in rank order.
    pub fn run<F, R>(size: usize, f: F) -> Vec<R>
    where
        F: Fn(ThreadComm) -> R + Sync,
        R: Send,
    {
        let comms = ThreadComm::group(size);
        let f = &f;
        std::thread::scope(|s| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|comm| s.spawn(move || f(comm)))
                .collect();
            handles
                .into_iter()
                .map(|h| match h.join() {
                    Ok(r) => r,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        })
    }

    fn exchange<T: Any + Send + Sync>(
        &self,
        op: &'static str,
        value: T,
    ) -> Result<Vec<Arc<T>>, BridgeError> {
        let posted = match self.shared.slots.lock() {
            Ok(mut slots) => {
                slots[self.rank] = Some(Slot {
                    op,
                    payload: Arc::new(value),
                });
                Ok(())
            }
            Err(_) => Err(BridgeError::Comm("slot table poisoned".into())),
        };
        self.shared.barrier.wait();
        let gathered = posted.and_then(|_| self.collect::<T>(op));
        self.shared.barrier.wait();
        gathered
    }

    fn collect<T: Any + Send + Sync>(&self, op: &'static str) -> Result<Vec<Arc<T>>, BridgeError> {
        let slots = self
            .shared
            .slots
            .lock()
            .map_err(|_| BridgeError::Comm("slot table poisoned".into()))?;
        let mut out = Vec::with_capacity(self.shared.size);
        for (r, slot) in slots.iter().enumerate() {
            let slot = slot
                .as_ref()
                .ok_or_else(|| BridgeError::Comm(format!("rank {r} posted nothing for {op}")))?;
            if slot.op != op {
                return Err(BridgeError::Comm(format!(
                    "rank {} entered {} while rank {r} entered {}",
                    self.rank, op, slot.op
                )));
            }
            let payload = Arc::clone(&slot.payload)
                .downcast::<T>()
                .map_err(|_| BridgeError::Comm(format!("payload type mismatch in {op}")))?;
            out.push(payload);
        }
        Ok(out)
    }

    fn all_to_all<T: Clone + Any + Send + Sync>(
        &self,
        op: &'static str,
        send: Vec<Vec<T>>,
    ) -> Result<Vec<Vec<T>>, BridgeError> {
        let valid = super::check_send_len(send.len(), self.shared.size);
        // Post even on a bad buffer count so peers are not left at the barrier.
        let all = self.exchange(op, send)?;
        valid?;
        all.iter()
            .map(|from| {
                from.get(self.rank)
                    .cloned()
                    .ok_or_else(|| {
                        BridgeError::Comm(format!("peer sent a short buffer table in {op}"))
                    })
            })
            .collect()
    }
}

impl super::Comm for ThreadComm {
    fn rank(&self) -> usize { self.rank }
    fn size(&self) -> usize { self.shared.size }
    fn barrier(&self) { self.shared.barrier.wait(); }

    fn all_gather_i64(&self, local: i64) -> Result<Vec<i64>, BridgeError> {
        Ok(self.exchange("all_gather_i64", local)?.into_iter().map(|v| *v).collect())
    }

    fn all_gather_f64(&self, local: &[f64]) -> Result<Vec<f64>, BridgeError> {
        let all = self.exchange("all_gather_f64", local.to_vec())?;
        Ok(all.iter().flat_map(|v| v.iter().copied()).collect())
    }

    fn all_gather_indices(&self, local: &[usize]) -> Result<Vec<usize>, BridgeError> {
        let all = self.exchange("all_gather_indices", local.to_vec())?;
        Ok(all.iter().flat_map(|v| v.iter().copied()).collect())
    }

    fn all_reduce_sum(&self, x: f64) -> Result<f64, BridgeError> {
        // Rank-order summation keeps every rank bit-identical.
        Ok(self.exchange("all_reduce_sum", x)?.iter().map(|v| **v).sum())
    }

    fn all_reduce_max(&self, x: f64) -> Result<f64, BridgeError> {
        Ok(self
            .exchange("all_reduce_max", x)?
            .iter()
            .map(|v| **v)
            .fold(f64::NEG_INFINITY, f64::max))
    }

    fn all_to_all_indices(&self, send: Vec<Vec<usize>>) -> Result<Vec<Vec<usize>>, BridgeError> {
        self.all_to_all("all_to_all_indices", send)
    }

    fn all_to_all_values(&self, send: Vec<Vec<f64>>) -> Result<Vec<Vec<f64>>, BridgeError> {
        self.all_to_all("all_to_all_values", send)
    }
}
