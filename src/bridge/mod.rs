//! Bridge between the assembly-side and operator-side representations.
//!
//! [`SparseBridge`] exposes a [`DistributedMatrix`] either as a non-owning
//! adapter ([`SparseBridge::adapt`]) or as an owned [`crate::matrix::CrsMatrix`] copy
//! ([`SparseBridge::copy`]), and moves vectors between row layouts.
//!
//! When the source and target layouts coincide, copies are local. Otherwise
//! every rank packs the rows it owns in the source for their target owner and
//! one all-to-all exchange delivers them. Row messages are encoded as an index
//! stream `[row, len, col_0 .. col_len]` plus a value stream.
//!
//! All operations that communicate are collective. Failures are agreed on by
//! the whole group before any rank continues (see [`consensus`]).

pub mod adapter;
pub use adapter::{BridgedMatrix, BridgedVector, MatrixAdapter, VectorView};

use std::sync::Arc;

use crate::core::traits::{DistVector, DistVectorMut, DistributedMatrix, SparseRow};
use crate::error::BridgeError;
use crate::matrix::CrsBuilder;
use crate::parallel::{consensus, Comm, DistributedRowPartition};
use crate::vector::CrsVector;

/// Matrix/vector bridge over a communicator.
pub struct SparseBridge<'c, C: Comm + ?Sized> {
    /// Communicator for collective copies.
    pub comm: &'c C,
}

impl<'c, C: Comm + ?Sized> SparseBridge<'c, C> {
    pub fn new(comm: &'c C) -> Self {
        Self { comm }
    }

    /// Reference mode: a [`MatrixAdapter`] over `source`.
    ///
    /// The adapter keeps a weak handle; once every `Arc` to the source is
    /// dropped, operations on the adapter fail with
    /// [`BridgeError::DanglingSource`]. A view cannot move rows between
    /// ranks, so the target layout must match the source's.
    pub fn adapt<M: DistributedMatrix>(
        &self,
        source: &Arc<M>,
        target: &DistributedRowPartition,
    ) -> Result<BridgedMatrix<M>, BridgeError> {
        check_global_rows(source.global_rows(), target.global_rows())?;
        check_layout(source.row_partition(), target)?;
        log::debug!(
            "rank {}: adapting rows {:?} by reference",
            self.comm.rank(),
            target.range()
        );
        Ok(BridgedMatrix::Reference(MatrixAdapter::new(source, target.clone())))
    }

    /// Deep-copy mode: an owned CRS matrix laid out by `target`.
    ///
    /// Collective whenever the layouts differ. A size mismatch is detected
    /// before anything is copied.
    pub fn copy<M: DistributedMatrix>(
        &self,
        source: &M,
        target: &DistributedRowPartition,
    ) -> Result<BridgedMatrix<M>, BridgeError> {
        check_global_rows(source.global_rows(), target.global_rows())?;
        check_group(self.comm, target)?;
        let staged = if source.row_partition().same_layout(target) {
            self.stage_local(source, target)
        } else {
            self.stage_redistributed(source, target)
        };
        let built = staged.and_then(|builder| {
            if let Some(&row) = builder.missing_rows().first() {
                return Err(BridgeError::RowNotFound(row));
            }
            builder.fill_complete()
        });
        let matrix = consensus(self.comm, built)?;
        log::debug!(
            "rank {}: copied {} rows, {} nonzeros",
            self.comm.rank(),
            target.local_rows(),
            matrix.local_nnz()
        );
        Ok(BridgedMatrix::OwnedCopy(matrix))
    }

    /// Owned copy of `source` laid out by `target`.
    pub fn copy_vector<V: DistVector + ?Sized>(
        &self,
        source: &V,
        target: &DistributedRowPartition,
    ) -> Result<BridgedVector<'static>, BridgeError> {
        let values = self.redistribute_values(source, target)?;
        Ok(BridgedVector::OwnedCopy(CrsVector::from_local(target.clone(), values)?))
    }

    /// Copy `source` into an existing vector of either representation.
    pub fn copy_vector_into<V: DistVector + ?Sized, T: DistVectorMut + ?Sized>(
        &self,
        source: &V,
        target: &mut T,
    ) -> Result<(), BridgeError> {
        let values = self.redistribute_values(source, target.partition())?;
        target.set_local_values(&values)
    }

    /// Zero-copy view of `source`'s local values.
    pub fn adapt_vector<'v, V: DistVectorMut + ?Sized>(
        &self,
        source: &'v mut V,
        target: &DistributedRowPartition,
    ) -> Result<BridgedVector<'v>, BridgeError> {
        check_vector_len(source.global_len(), target.global_rows())?;
        check_layout(source.partition(), target)?;
        Ok(BridgedVector::Reference(VectorView::new(
            target.clone(),
            source.local_values_mut(),
        )))
    }

    fn stage_local<M: DistributedMatrix>(
        &self,
        source: &M,
        target: &DistributedRowPartition,
    ) -> Result<CrsBuilder, BridgeError> {
        let mut builder = CrsBuilder::new(target.clone(), source.global_cols());
        for r in target.range() {
            let row = source.row(r).map_err(|e| missing_row(e, r))?;
            insert_row(&mut builder, &row)?;
        }
        Ok(builder)
    }

    fn stage_redistributed<M: DistributedMatrix>(
        &self,
        source: &M,
        target: &DistributedRowPartition,
    ) -> Result<CrsBuilder, BridgeError> {
        let packed = consensus(self.comm, pack_rows(source, target, self.comm.size()))?;
        let (send_idx, send_val) = packed;
        let recv_idx = self.comm.all_to_all_indices(send_idx)?;
        let recv_val = self.comm.all_to_all_values(send_val)?;
        log::trace!(
            "rank {}: received {} index words, {} values",
            self.comm.rank(),
            recv_idx.iter().map(Vec::len).sum::<usize>(),
            recv_val.iter().map(Vec::len).sum::<usize>()
        );

        let mut builder = CrsBuilder::new(target.clone(), source.global_cols());
        for (from, (idx, val)) in recv_idx.iter().zip(&recv_val).enumerate() {
            unpack_rows(&mut builder, idx, val).map_err(|e| match e {
                BridgeError::NotOwned { row, .. } => BridgeError::Assembly(format!(
                    "rank {from} sent row {row}, which this rank does not own"
                )),
                other => other,
            })?;
        }
        Ok(builder)
    }

    fn redistribute_values<V: DistVector + ?Sized>(
        &self,
        source: &V,
        target: &DistributedRowPartition,
    ) -> Result<Vec<f64>, BridgeError> {
        check_vector_len(source.global_len(), target.global_rows())?;
        check_group(self.comm, target)?;
        if source.partition().same_layout(target) {
            return Ok(source.local_values().to_vec());
        }

        let size = self.comm.size();
        let mut send_idx = vec![Vec::new(); size];
        let mut send_val = vec![Vec::new(); size];
        let first = source.partition().range().start;
        for (i, &v) in source.local_values().iter().enumerate() {
            let r = first + i;
            let dest = target.owner_of(r)?;
            send_idx[dest].push(r);
            send_val[dest].push(v);
        }
        let recv_idx = self.comm.all_to_all_indices(send_idx)?;
        let recv_val = self.comm.all_to_all_values(send_val)?;

        let result = (|| {
            let start = target.range().start;
            let mut out = vec![0.0; target.local_rows()];
            let mut seen = vec![false; target.local_rows()];
            for (idx, val) in recv_idx.iter().zip(&recv_val) {
                for (&r, &v) in idx.iter().zip(val) {
                    let i = target.to_local(r)?;
                    out[i] = v;
                    seen[i] = true;
                }
            }
            match seen.iter().position(|s| !s) {
                Some(i) => Err(BridgeError::RowNotFound(start + i)),
                None => Ok(out),
            }
        })();
        consensus(self.comm, result)
    }
}

fn check_global_rows(source_rows: usize, target_rows: usize) -> Result<(), BridgeError> {
    if source_rows != target_rows {
        return Err(BridgeError::PartitionMismatch { source_rows, target_rows });
    }
    Ok(())
}

fn check_group<C: Comm + ?Sized>(
    comm: &C,
    target: &DistributedRowPartition,
) -> Result<(), BridgeError> {
    if target.size() != comm.size() {
        return Err(BridgeError::InvalidPartition(format!(
            "target layout spans {} ranks, communicator has {}",
            target.size(),
            comm.size()
        )));
    }
    Ok(())
}

fn check_vector_len(found: usize, expected: usize) -> Result<(), BridgeError> {
    if found != expected {
        return Err(BridgeError::LengthMismatch { expected, found });
    }
    Ok(())
}

fn check_layout(
    source: &DistributedRowPartition,
    target: &DistributedRowPartition,
) -> Result<(), BridgeError> {
    if source.same_layout(target) {
        return Ok(());
    }
    // First rank whose range differs; identical on every rank. A rank present
    // in only one layout differs too.
    let rank = (0..source.size().max(target.size()))
        .find(|&r| source.range_of(r) != target.range_of(r))
        .unwrap_or(0);
    Err(BridgeError::LayoutMismatch { rank })
}

fn missing_row(e: BridgeError, row: usize) -> BridgeError {
    match e {
        BridgeError::NotOwned { .. } | BridgeError::OutOfRange { .. } => {
            BridgeError::RowNotFound(row)
        }
        other => other,
    }
}

fn insert_row(builder: &mut CrsBuilder, row: &SparseRow) -> Result<(), BridgeError> {
    let cols: Vec<usize> = row.columns().collect();
    let vals: Vec<f64> = row.values().collect();
    builder.insert_global_values(row.row, &cols, &vals)
}

type Packed = (Vec<Vec<usize>>, Vec<Vec<f64>>);

/// Every locally owned source row, addressed to its target owner.
fn pack_rows<M: DistributedMatrix>(
    source: &M,
    target: &DistributedRowPartition,
    size: usize,
) -> Result<Packed, BridgeError> {
    let mut idx = vec![Vec::new(); size];
    let mut val = vec![Vec::new(); size];
    for r in source.ownership_range() {
        let row = source.row(r).map_err(|e| missing_row(e, r))?;
        let dest = target.owner_of(r)?;
        idx[dest].push(r);
        idx[dest].push(row.len());
        idx[dest].extend(row.columns());
        val[dest].extend(row.values());
    }
    Ok((idx, val))
}

fn unpack_rows(builder: &mut CrsBuilder, idx: &[usize], val: &[f64]) -> Result<(), BridgeError> {
    let corrupt = || BridgeError::Assembly("truncated row message".into());
    let (mut i, mut k) = (0, 0);
    while i < idx.len() {
        let row = idx[i];
        let len = *idx.get(i + 1).ok_or_else(corrupt)?;
        let cols = idx.get(i + 2..i + 2 + len).ok_or_else(corrupt)?;
        let vals = val.get(k..k + len).ok_or_else(corrupt)?;
        builder.insert_global_values(row, cols, vals)?;
        i += 2 + len;
        k += len;
    }
    if k != val.len() {
        return Err(BridgeError::Assembly("row message has trailing values".into()));
    }
    Ok(())
}
