//! Shared fixtures: the five-point Laplacian and seeded random matrices.
#![allow(dead_code)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use spbridge::{AijMatrix, Comm, DistributedMatrix, DistributedRowPartition, InsertMode, SparseRow};

/// Five-point Laplacian on an `m × n` grid, rows split evenly across ranks.
pub fn laplacian<C: Comm + ?Sized>(comm: &C, m: usize, n: usize) -> AijMatrix {
    let p = DistributedRowPartition::uniform(comm, m * n).unwrap();
    laplacian_on(comm, p, m, n)
}

/// Five-point Laplacian over a given row partition.
pub fn laplacian_on<C: Comm + ?Sized>(
    comm: &C,
    p: DistributedRowPartition,
    m: usize,
    n: usize,
) -> AijMatrix {
    let mut a = AijMatrix::new(p, m * n);
    for r in a.ownership_range() {
        let (i, j) = (r / n, r % n);
        if i > 0 {
            a.set_value(r, r - n, -1.0, InsertMode::Insert).unwrap();
        }
        if i + 1 < m {
            a.set_value(r, r + n, -1.0, InsertMode::Insert).unwrap();
        }
        if j > 0 {
            a.set_value(r, r - 1, -1.0, InsertMode::Insert).unwrap();
        }
        if j + 1 < n {
            a.set_value(r, r + 1, -1.0, InsertMode::Insert).unwrap();
        }
        a.set_value(r, r, 4.0, InsertMode::Insert).unwrap();
    }
    a.assemble(comm).unwrap();
    a
}

/// Random sparse matrix; every rank draws the whole matrix from the same seed
/// and keeps its own rows, so all ranks agree on the entries.
pub fn random_sparse<C: Comm + ?Sized>(
    comm: &C,
    p: DistributedRowPartition,
    cols: usize,
    density: f64,
    seed: u64,
) -> AijMatrix {
    let mut rng = StdRng::seed_from_u64(seed);
    let rows = p.global_rows();
    let mut a = AijMatrix::new(p, cols);
    for r in 0..rows {
        for c in 0..cols {
            let keep = rng.gen_bool(density);
            let v: f64 = rng.gen_range(-1.0..1.0);
            if keep && a.row_partition().contains(r) {
                a.set_value(r, c, v, InsertMode::Insert).unwrap();
            }
        }
    }
    a.assemble(comm).unwrap();
    a
}

/// This rank's rows of `a`, in order.
pub fn local_rows<M: DistributedMatrix>(a: &M) -> Vec<SparseRow> {
    a.ownership_range().map(|r| a.row(r).unwrap()).collect()
}

/// Every row of `a`, gathered to all ranks as `(row, entries)` tuples.
pub fn all_rows<C: Comm + ?Sized, M: DistributedMatrix>(
    comm: &C,
    a: &M,
) -> Vec<(usize, Vec<(usize, f64)>)> {
    let mut lens = Vec::new();
    let mut cols = Vec::new();
    let mut vals = Vec::new();
    for row in local_rows(a) {
        lens.push(row.len());
        cols.extend(row.columns());
        vals.extend(row.values());
    }
    let lens = comm.all_gather_indices(&lens).unwrap();
    let cols = comm.all_gather_indices(&cols).unwrap();
    let vals = comm.all_gather_f64(&vals).unwrap();
    let mut out = Vec::with_capacity(lens.len());
    let mut k = 0;
    for (r, len) in lens.into_iter().enumerate() {
        let entries = (k..k + len).map(|i| (cols[i], vals[i])).collect();
        out.push((r, entries));
        k += len;
    }
    out
}
