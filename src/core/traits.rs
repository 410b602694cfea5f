//! Core traits shared by both matrix/vector representations and the bridge.

use std::ops::Range;

use crate::error::BridgeError;
use crate::parallel::{Comm, DistributedRowPartition};

/// One matrix row as `(global column, value)` pairs, in producer order.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseRow {
    pub row: usize,
    pub entries: Vec<(usize, f64)>,
}

impl SparseRow {
    pub fn new(row: usize, entries: Vec<(usize, f64)>) -> Self {
        Self { row, entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy of this row with columns in ascending order.
    pub fn sorted(&self) -> SparseRow {
        let mut entries = self.entries.clone();
        entries.sort_by_key(|&(c, _)| c);
        SparseRow { row: self.row, entries }
    }

    /// Sorted by column with duplicate columns summed, as CSR storage needs.
    /// A column at or past `global_cols` is an `Assembly` error.
    pub fn canonical(mut self, global_cols: usize) -> Result<SparseRow, BridgeError> {
        self.entries.sort_by_key(|&(c, _)| c);
        let mut merged: Vec<(usize, f64)> = Vec::with_capacity(self.entries.len());
        for (c, v) in self.entries {
            if c >= global_cols {
                return Err(BridgeError::Assembly(format!(
                    "row {} references column {c}, matrix has {global_cols} columns",
                    self.row
                )));
            }
            match merged.last_mut() {
                Some(last) if last.0 == c => last.1 += v,
                _ => merged.push((c, v)),
            }
        }
        Ok(SparseRow { row: self.row, entries: merged })
    }

    pub fn columns(&self) -> impl Iterator<Item = usize> + '_ {
        self.entries.iter().map(|&(c, _)| c)
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.entries.iter().map(|&(_, v)| v)
    }

    /// Local row · full vector.
    pub fn dot(&self, x: &[f64]) -> f64 {
        self.entries.iter().map(|&(c, v)| v * x[c]).sum()
    }
}

/// A row-partitioned sparse matrix that can be queried row by row and applied.
pub trait DistributedMatrix {
    /// Row ownership of this matrix.
    fn row_partition(&self) -> &DistributedRowPartition;
    /// Number of global columns.
    fn global_cols(&self) -> usize;
    /// Global rows owned by this rank.
    fn ownership_range(&self) -> Range<usize> {
        self.row_partition().range()
    }
    fn global_rows(&self) -> usize {
        self.row_partition().global_rows()
    }
    /// A locally owned row.
    fn row(&self, global_row: usize) -> Result<SparseRow, BridgeError>;
    /// Collective: `y = A x` over local slices (`x` and `y` both over the local rows).
    fn apply<C: Comm + ?Sized>(
        &self,
        comm: &C,
        x: &[f64],
        y: &mut [f64],
    ) -> Result<(), BridgeError>;
}

/// Dense vector distributed with one value per owned row.
pub trait DistVector {
    fn partition(&self) -> &DistributedRowPartition;
    fn local_values(&self) -> &[f64];

    fn global_len(&self) -> usize {
        self.partition().global_rows()
    }

    /// Collective Euclidean norm.
    fn norm2<C: Comm + ?Sized>(&self, comm: &C) -> Result<f64, BridgeError> {
        let local: f64 = self.local_values().iter().map(|v| v * v).sum();
        Ok(comm.all_reduce_sum(local)?.sqrt())
    }

    /// Collective inner product.
    fn dot<C: Comm + ?Sized, V: DistVector + ?Sized>(
        &self,
        comm: &C,
        other: &V,
    ) -> Result<f64, BridgeError> {
        check_same_len(self.local_values().len(), other.local_values().len())?;
        comm.dot(self.local_values(), other.local_values())
    }
}

pub trait DistVectorMut: DistVector {
    fn local_values_mut(&mut self) -> &mut [f64];

    fn set_local_values(&mut self, values: &[f64]) -> Result<(), BridgeError> {
        let dst = self.local_values_mut();
        check_same_len(dst.len(), values.len())?;
        dst.copy_from_slice(values);
        Ok(())
    }
}

pub(crate) fn check_same_len(expected: usize, found: usize) -> Result<(), BridgeError> {
    if expected != found {
        return Err(BridgeError::LengthMismatch { expected, found });
    }
    Ok(())
}
