//! Contiguous row ownership for distributed sparse structures.
//!
//! Each rank owns the half-open global row range `[starts[r], starts[r + 1])`.
//! The whole boundary table is replicated on every rank, so ownership queries
//! never communicate.

use std::ops::Range;

use crate::error::BridgeError;
use crate::parallel::Comm;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributedRowPartition {
    rank: usize,
    /// Range boundaries, `size + 1` entries, `starts[0] == 0`.
    starts: Vec<usize>,
}

impl DistributedRowPartition {
    /// Collective: every rank passes the number of rows it owns.
    ///
    /// `first_row` of each rank is the exclusive prefix sum of the counts in
    /// rank order. All ranks see the same gathered table and therefore agree
    /// on success or failure.
    pub fn from_collective<C: Comm + ?Sized>(
        comm: &C,
        local_rows: i64,
    ) -> Result<Self, BridgeError> {
        let counts = comm
            .all_gather_i64(local_rows)
            .map_err(|e| {
                BridgeError::InvalidPartition(format!("gathering row counts failed: {e}"))
            })?;
        let mut checked = Vec::with_capacity(counts.len());
        for (r, &c) in counts.iter().enumerate() {
            if c < 0 {
                return Err(BridgeError::InvalidPartition(format!(
                    "rank {r} reported negative row count {c}"
                )));
            }
            checked.push(c as usize);
        }
        let part = Self::from_counts(&checked, comm.rank())?;
        log::debug!(
            "rank {}/{}: owns rows {:?} of {}",
            part.rank,
            part.size(),
            part.range(),
            part.global_rows()
        );
        Ok(part)
    }

    /// Even split of `global_rows`: the first `global_rows % size` ranks get one extra row.
    pub fn uniform<C: Comm + ?Sized>(comm: &C, global_rows: usize) -> Result<Self, BridgeError> {
        let size = comm.size();
        let base = global_rows / size;
        let extra = global_rows % size;
        let counts: Vec<usize> = (0..size).map(|r| base + usize::from(r < extra)).collect();
        Self::from_counts(&counts, comm.rank())
    }

    /// Build from a known per-rank count table, without communication.
    pub fn from_counts(counts: &[usize], rank: usize) -> Result<Self, BridgeError> {
        if counts.is_empty() {
            return Err(BridgeError::InvalidPartition("empty process group".into()));
        }
        if rank >= counts.len() {
            return Err(BridgeError::InvalidPartition(format!(
                "rank {rank} outside group of {}",
                counts.len()
            )));
        }
        let mut starts = Vec::with_capacity(counts.len() + 1);
        starts.push(0usize);
        for &c in counts {
            let next = starts[starts.len() - 1]
                .checked_add(c)
                .ok_or_else(|| BridgeError::InvalidPartition("row count overflow".into()))?;
            starts.push(next);
        }
        if starts[counts.len()] == 0 {
            return Err(BridgeError::InvalidPartition("global row count is zero".into()));
        }
        Ok(Self { rank, starts })
    }

    pub fn global_rows(&self) -> usize {
        self.starts[self.starts.len() - 1]
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn size(&self) -> usize {
        self.starts.len() - 1
    }

    /// `(first_row, local_row_count)` of this rank.
    pub fn local_range(&self) -> (usize, usize) {
        let r = self.range();
        (r.start, r.len())
    }

    pub fn local_rows(&self) -> usize {
        self.range().len()
    }

    pub fn range(&self) -> Range<usize> {
        self.starts[self.rank]..self.starts[self.rank + 1]
    }

    /// Rows owned by `rank`, or `None` if the layout has no such rank.
    pub fn range_of(&self, rank: usize) -> Option<Range<usize>> {
        let start = *self.starts.get(rank)?;
        let end = *self.starts.get(rank.checked_add(1)?)?;
        Some(start..end)
    }

    pub fn starts(&self) -> &[usize] {
        &self.starts
    }

    pub fn contains(&self, row: usize) -> bool {
        self.range().contains(&row)
    }

    /// Rank whose range contains `row`, by binary search over the boundaries.
    pub fn owner_of(&self, row: usize) -> Result<usize, BridgeError> {
        if row >= self.global_rows() {
            return Err(BridgeError::OutOfRange {
                row,
                global_rows: self.global_rows(),
            });
        }
        // Last boundary <= row; empty ranges share their start with the next
        // rank and are skipped by taking the last one.
        Ok(self.starts.partition_point(|&s| s <= row) - 1)
    }

    /// Same ownership table, regardless of which rank is looking at it.
    pub fn same_layout(&self, other: &Self) -> bool {
        self.starts == other.starts
    }

    pub(crate) fn to_local(&self, row: usize) -> Result<usize, BridgeError> {
        if !self.contains(row) {
            if row >= self.global_rows() {
                return Err(BridgeError::OutOfRange {
                    row,
                    global_rows: self.global_rows(),
                });
            }
            return Err(BridgeError::NotOwned { row, rank: self.rank });
        }
        Ok(row - self.starts[self.rank])
    }
}
