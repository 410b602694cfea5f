//! Bridged matrices and vectors, tagged by ownership.
//!
//! A reference-mode matrix holds only a [`Weak`] handle to its source, so a
//! dropped source is detected on the next operation instead of dangling. A
//! reference-mode vector borrows the source's storage and the borrow checker
//! keeps the source alive.

use std::sync::{Arc, Weak};

use crate::core::traits::{DistVector, DistVectorMut, DistributedMatrix, SparseRow};
use crate::error::BridgeError;
use crate::matrix::CrsMatrix;
use crate::parallel::{consensus, Comm, DistributedRowPartition};
use crate::vector::CrsVector;

/// Non-owning view of a source matrix through the operator interface.
#[derive(Debug)]
pub struct MatrixAdapter<M> {
    source: Weak<M>,
    row_map: DistributedRowPartition,
    global_cols: usize,
}

impl<M: DistributedMatrix> MatrixAdapter<M> {
    pub(crate) fn new(source: &Arc<M>, row_map: DistributedRowPartition) -> Self {
        Self {
            global_cols: source.global_cols(),
            source: Arc::downgrade(source),
            row_map,
        }
    }

    /// Whether the source matrix is still alive.
    pub fn is_alive(&self) -> bool {
        self.source.strong_count() > 0
    }

    fn source(&self) -> Result<Arc<M>, BridgeError> {
        self.source.upgrade().ok_or(BridgeError::DanglingSource)
    }
}

impl<M: DistributedMatrix> DistributedMatrix for MatrixAdapter<M> {
    fn row_partition(&self) -> &DistributedRowPartition {
        &self.row_map
    }

    fn global_cols(&self) -> usize {
        self.global_cols
    }

    /// The source's row, pairs passed through verbatim.
    fn row(&self, global_row: usize) -> Result<SparseRow, BridgeError> {
        self.source()?.row(global_row)
    }

    /// Runs the source's own product straight into `y`.
    fn apply<C: Comm + ?Sized>(
        &self,
        comm: &C,
        x: &[f64],
        y: &mut [f64],
    ) -> Result<(), BridgeError> {
        // A source dropped on one rank must fail every rank, not strand them
        // inside the product's gather.
        let source = consensus(comm, self.source())?;
        source.apply(comm, x, y)
    }
}

/// A matrix exposed through the operator interface, by reference or by copy.
#[derive(Debug)]
pub enum BridgedMatrix<M> {
    /// Aliases the source; valid only while the source lives.
    Reference(MatrixAdapter<M>),
    /// Owns an independent copy of every triple.
    OwnedCopy(CrsMatrix),
}

impl<M: DistributedMatrix> BridgedMatrix<M> {
    pub fn is_reference(&self) -> bool {
        matches!(self, BridgedMatrix::Reference(_))
    }
}

impl<M: DistributedMatrix> DistributedMatrix for BridgedMatrix<M> {
    fn row_partition(&self) -> &DistributedRowPartition {
        match self {
            BridgedMatrix::Reference(a) => a.row_partition(),
            BridgedMatrix::OwnedCopy(m) => m.row_partition(),
        }
    }

    fn global_cols(&self) -> usize {
        match self {
            BridgedMatrix::Reference(a) => a.global_cols(),
            BridgedMatrix::OwnedCopy(m) => m.global_cols(),
        }
    }

    fn row(&self, global_row: usize) -> Result<SparseRow, BridgeError> {
        match self {
            BridgedMatrix::Reference(a) => a.row(global_row),
            BridgedMatrix::OwnedCopy(m) => m.row(global_row),
        }
    }

    fn apply<C: Comm + ?Sized>(
        &self,
        comm: &C,
        x: &[f64],
        y: &mut [f64],
    ) -> Result<(), BridgeError> {
        match self {
            BridgedMatrix::Reference(a) => a.apply(comm, x, y),
            BridgedMatrix::OwnedCopy(m) => m.apply(comm, x, y),
        }
    }
}

/// Mutable view over another vector's local values.
#[derive(Debug)]
pub struct VectorView<'a> {
    partition: DistributedRowPartition,
    values: &'a mut [f64],
}

impl<'a> VectorView<'a> {
    pub(crate) fn new(partition: DistributedRowPartition, values: &'a mut [f64]) -> Self {
        Self { partition, values }
    }
}

impl DistVector for VectorView<'_> {
    fn partition(&self) -> &DistributedRowPartition {
        &self.partition
    }
    fn local_values(&self) -> &[f64] {
        &*self.values
    }
}

impl DistVectorMut for VectorView<'_> {
    fn local_values_mut(&mut self) -> &mut [f64] {
        &mut *self.values
    }
}

/// A vector on the operator side, by reference or by copy.
#[derive(Debug)]
pub enum BridgedVector<'a> {
    Reference(VectorView<'a>),
    OwnedCopy(CrsVector),
}

impl BridgedVector<'_> {
    pub fn is_reference(&self) -> bool {
        matches!(self, BridgedVector::Reference(_))
    }

    /// Owned vector; a reference view is copied out.
    pub fn into_owned(self) -> Result<CrsVector, BridgeError> {
        match self {
            BridgedVector::OwnedCopy(v) => Ok(v),
            BridgedVector::Reference(view) => {
                CrsVector::from_local(view.partition, view.values.to_vec())
            }
        }
    }
}

impl DistVector for BridgedVector<'_> {
    fn partition(&self) -> &DistributedRowPartition {
        match self {
            BridgedVector::Reference(v) => v.partition(),
            BridgedVector::OwnedCopy(v) => v.partition(),
        }
    }
    fn local_values(&self) -> &[f64] {
        match self {
            BridgedVector::Reference(v) => v.local_values(),
            BridgedVector::OwnedCopy(v) => v.local_values(),
        }
    }
}

impl DistVectorMut for BridgedVector<'_> {
    fn local_values_mut(&mut self) -> &mut [f64] {
        match self {
            BridgedVector::Reference(v) => v.local_values_mut(),
            BridgedVector::OwnedCopy(v) => v.local_values_mut(),
        }
    }
}
