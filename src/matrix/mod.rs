//! Matrix module: the assembly-side AIJ matrix and the operator-side CRS matrix.

pub mod aij;
pub use aij::{AijMatrix, InsertMode};
pub mod crs;
pub use crs::{CrsBuilder, CrsMatrix};

use faer::sparse::{SparseRowMat, SymbolicSparseRowMat};

use crate::core::traits::{check_same_len, DistributedMatrix};
use crate::error::BridgeError;
use crate::parallel::{consensus, Comm};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Collective `y = A x` for locally stored CSR rows with global column indices.
///
/// Every rank contributes its slice of `x`; the full vector is gathered once
/// and each local row is multiplied against it. A wrong `y` length on any rank
/// fails every rank before the gather.
pub(crate) fn csr_apply<C: Comm + ?Sized>(
    comm: &C,
    global_cols: usize,
    row_ptr: &[usize],
    col_idx: &[usize],
    values: &[f64],
    x: &[f64],
    y: &mut [f64],
) -> Result<(), BridgeError> {
    consensus(comm, check_same_len(row_ptr.len() - 1, y.len()))?;
    let x_full = comm.all_gather_f64(x)?;
    check_same_len(global_cols, x_full.len())?;
    let row_dot = |i: usize| -> f64 {
        (row_ptr[i]..row_ptr[i + 1])
            .map(|k| values[k] * x_full[col_idx[k]])
            .sum()
    };
    #[cfg(feature = "rayon")]
    {
        y.par_iter_mut().enumerate().for_each(|(i, yi)| *yi = row_dot(i));
    }
    #[cfg(not(feature = "rayon"))]
    {
        y.iter_mut().enumerate().for_each(|(i, yi)| *yi = row_dot(i));
    }
    Ok(())
}

/// Flatten per-row `(col, value)` lists (already sorted, unique) into CSR arrays.
pub(crate) fn flatten_rows(rows: Vec<Vec<(usize, f64)>>) -> (Vec<usize>, Vec<usize>, Vec<f64>) {
    let nnz = rows.iter().map(Vec::len).sum();
    let mut row_ptr = Vec::with_capacity(rows.len() + 1);
    let mut col_idx = Vec::with_capacity(nnz);
    let mut values = Vec::with_capacity(nnz);
    row_ptr.push(0);
    for row in rows {
        for (c, v) in row {
            col_idx.push(c);
            values.push(v);
        }
        row_ptr.push(col_idx.len());
    }
    (row_ptr, col_idx, values)
}

/// Collective: replicate the whole of `a` on every rank as a faer CSR matrix.
///
/// Rows may come in any column order; each is sorted and its duplicate
/// columns summed before it is shipped. Row lengths, column indices and values
/// are gathered in rank order, which is global row order for a contiguous
/// partition.
pub fn gather_to_faer<C: Comm + ?Sized, M: DistributedMatrix>(
    comm: &C,
    a: &M,
) -> Result<SparseRowMat<usize, f64>, BridgeError> {
    let global_cols = a.global_cols();
    let local = a
        .ownership_range()
        .map(|r| a.row(r).and_then(|row| row.canonical(global_cols)))
        .collect::<Result<Vec<_>, _>>();
    let rows = consensus(comm, local)?;
    let lens: Vec<usize> = rows.iter().map(|r| r.len()).collect();
    let cols: Vec<usize> = rows.iter().flat_map(|r| r.columns()).collect();
    let vals: Vec<f64> = rows.iter().flat_map(|r| r.values()).collect();

    let all_lens = comm.all_gather_indices(&lens)?;
    let col_idx = comm.all_gather_indices(&cols)?;
    let values = comm.all_gather_f64(&vals)?;
    check_same_len(a.global_rows(), all_lens.len())?;
    check_same_len(col_idx.len(), values.len())?;

    let mut row_ptr = Vec::with_capacity(all_lens.len() + 1);
    let mut total = 0;
    row_ptr.push(total);
    for len in all_lens {
        total += len;
        row_ptr.push(total);
    }
    let symbolic =
        SymbolicSparseRowMat::new_checked(a.global_rows(), global_cols, row_ptr, None, col_idx);
    Ok(SparseRowMat::new(symbolic, values))
}
