// Operator-side CRS matrix and its two-phase builder.

use crate::core::traits::{check_same_len, DistributedMatrix, SparseRow};
use crate::error::BridgeError;
use crate::matrix::{csr_apply, flatten_rows, gather_to_faer};
use crate::parallel::{Comm, DistributedRowPartition};

/// Staging area for a [`CrsMatrix`]: insert rows, then `fill_complete`.
///
/// Inserting the same `(row, col)` twice accumulates. A builder lives only as
/// long as the construction that owns it.
#[derive(Debug)]
pub struct CrsBuilder {
    row_map: DistributedRowPartition,
    global_cols: usize,
    staged: Vec<Vec<(usize, f64)>>,
    touched: Vec<bool>,
}

impl CrsBuilder {
    pub fn new(row_map: DistributedRowPartition, global_cols: usize) -> Self {
        let n = row_map.local_rows();
        Self {
            row_map,
            global_cols,
            staged: vec![Vec::new(); n],
            touched: vec![false; n],
        }
    }

    pub fn row_map(&self) -> &DistributedRowPartition {
        &self.row_map
    }

    /// Stage `cols`/`values` for a locally owned global row. An empty
    /// insertion still marks the row as present.
    pub fn insert_global_values(
        &mut self,
        row: usize,
        cols: &[usize],
        values: &[f64],
    ) -> Result<(), BridgeError> {
        check_same_len(cols.len(), values.len())?;
        let i = self.row_map.to_local(row)?;
        self.staged[i].extend(cols.iter().copied().zip(values.iter().copied()));
        self.touched[i] = true;
        Ok(())
    }

    /// Global indices of local rows that never received an insertion.
    pub fn missing_rows(&self) -> Vec<usize> {
        let first = self.row_map.range().start;
        self.touched
            .iter()
            .enumerate()
            .filter(|(_, t)| !**t)
            .map(|(i, _)| first + i)
            .collect()
    }

    /// Sort each row by column, sum duplicates and freeze the structure.
    pub fn fill_complete(self) -> Result<CrsMatrix, BridgeError> {
        let global_cols = self.global_cols;
        let first = self.row_map.range().start;
        let rows = self
            .staged
            .into_iter()
            .enumerate()
            .map(|(i, row)| {
                SparseRow::new(first + i, row)
                    .canonical(global_cols)
                    .map(|r| r.entries)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let (row_ptr, col_idx, values) = flatten_rows(rows);
        log::debug!(
            "rank {}: fill_complete with {} local rows, {} nonzeros",
            self.row_map.rank(),
            row_ptr.len() - 1,
            values.len()
        );
        Ok(CrsMatrix {
            row_map: self.row_map,
            global_cols,
            row_ptr,
            col_idx,
            values,
        })
    }
}

/// Row-distributed CRS matrix with global column indices, sorted per row.
#[derive(Debug, Clone, PartialEq)]
pub struct CrsMatrix {
    row_map: DistributedRowPartition,
    global_cols: usize,
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<f64>,
}

impl CrsMatrix {
    pub fn row_map(&self) -> &DistributedRowPartition {
        &self.row_map
    }

    pub fn local_nnz(&self) -> usize {
        self.values.len()
    }

    /// Collective.
    pub fn global_nnz<C: Comm + ?Sized>(&self, comm: &C) -> Result<usize, BridgeError> {
        Ok(comm.all_reduce_sum(self.local_nnz() as f64)? as usize)
    }

    /// Column indices and values of a local row (`0..local_rows`).
    pub fn local_row_view(&self, local: usize) -> (&[usize], &[f64]) {
        let r = self.row_ptr[local]..self.row_ptr[local + 1];
        (&self.col_idx[r.clone()], &self.values[r])
    }

    /// Collective: the full matrix as a faer CSR matrix on every rank.
    pub fn to_faer<C: Comm + ?Sized>(
        &self,
        comm: &C,
    ) -> Result<faer::sparse::SparseRowMat<usize, f64>, BridgeError> {
        gather_to_faer(comm, self)
    }
}

impl DistributedMatrix for CrsMatrix {
    fn row_partition(&self) -> &DistributedRowPartition {
        &self.row_map
    }

    fn global_cols(&self) -> usize {
        self.global_cols
    }

    fn row(&self, global_row: usize) -> Result<SparseRow, BridgeError> {
        let i = self.row_map.to_local(global_row)?;
        let (cols, vals) = self.local_row_view(i);
        Ok(SparseRow::new(
            global_row,
            cols.iter().copied().zip(vals.iter().copied()).collect(),
        ))
    }

    fn apply<C: Comm + ?Sized>(
        &self,
        comm: &C,
        x: &[f64],
        y: &mut [f64],
    ) -> Result<(), BridgeError> {
        csr_apply(comm, self.global_cols, &self.row_ptr, &self.col_idx, &self.values, x, y)
    }
}
