//! Assembly-side AIJ matrix.
//!
//! Values are staged with [`AijMatrix::set_values`] and become visible after
//! the collective [`AijMatrix::assemble`]. Any rank may set entries of any
//! row; entries for rows owned elsewhere are stashed and shipped to their
//! owner during assembly. After assembly the local rows are stored as CSR
//! with global, sorted, unique column indices.

use std::collections::BTreeMap;

use crate::core::traits::{check_same_len, DistributedMatrix, SparseRow};
use crate::error::BridgeError;
use crate::matrix::{csr_apply, flatten_rows};
use crate::parallel::{consensus, Comm, DistributedRowPartition};

/// How staged values combine with what is already there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertMode {
    /// Last write wins.
    Insert,
    /// Values accumulate.
    Add,
}

impl InsertMode {
    fn code(mode: Option<InsertMode>) -> i64 {
        match mode {
            None => 0,
            Some(InsertMode::Insert) => 1,
            Some(InsertMode::Add) => 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AijMatrix {
    partition: DistributedRowPartition,
    global_cols: usize,
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<f64>,
    stash: Vec<(usize, usize, f64)>,
    stash_mode: Option<InsertMode>,
    assembled: bool,
}

impl AijMatrix {
    pub fn new(partition: DistributedRowPartition, global_cols: usize) -> Self {
        let local_rows = partition.local_rows();
        Self {
            partition,
            global_cols,
            row_ptr: vec![0; local_rows + 1],
            col_idx: Vec::new(),
            values: Vec::new(),
            stash: Vec::new(),
            stash_mode: None,
            assembled: false,
        }
    }

    pub fn is_assembled(&self) -> bool {
        self.assembled
    }

    pub fn local_nnz(&self) -> usize {
        self.values.len()
    }

    /// Stage the logically dense block `rows × cols`; `values` is row major.
    pub fn set_values(
        &mut self,
        rows: &[usize],
        cols: &[usize],
        values: &[f64],
        mode: InsertMode,
    ) -> Result<(), BridgeError> {
        check_same_len(rows.len() * cols.len(), values.len())?;
        if let Some(prev) = self.stash_mode {
            if prev != mode {
                return Err(BridgeError::Assembly(
                    "cannot mix insert and add values in one assembly phase".into(),
                ));
            }
        }
        let global_rows = self.partition.global_rows();
        if let Some(&r) = rows.iter().find(|&&r| r >= global_rows) {
            return Err(BridgeError::OutOfRange { row: r, global_rows });
        }
        if let Some(&c) = cols.iter().find(|&&c| c >= self.global_cols) {
            return Err(BridgeError::Assembly(format!(
                "column {c} outside [0, {})",
                self.global_cols
            )));
        }
        for (i, &r) in rows.iter().enumerate() {
            for (j, &c) in cols.iter().enumerate() {
                self.stash.push((r, c, values[i * cols.len() + j]));
            }
        }
        self.stash_mode = Some(mode);
        self.assembled = false;
        Ok(())
    }

    pub fn set_value(
        &mut self,
        row: usize,
        col: usize,
        value: f64,
        mode: InsertMode,
    ) -> Result<(), BridgeError> {
        self.set_values(&[row], &[col], &[value], mode)
    }

    /// Collective: route stashed entries to their owners and rebuild local CSR.
    pub fn assemble<C: Comm + ?Sized>(&mut self, comm: &C) -> Result<(), BridgeError> {
        let modes = comm.all_gather_i64(InsertMode::code(self.stash_mode))?;
        if modes.contains(&1) && modes.contains(&2) {
            return Err(BridgeError::Assembly(
                "ranks disagree on insert mode for this assembly".into(),
            ));
        }
        let mode = if modes.contains(&2) { InsertMode::Add } else { InsertMode::Insert };

        let size = comm.size();
        let mut send_idx = vec![Vec::new(); size];
        let mut send_val = vec![Vec::new(); size];
        for &(r, c, v) in &self.stash {
            let dest = self.partition.owner_of(r)?;
            send_idx[dest].extend([r, c]);
            send_val[dest].push(v);
        }
        let stashed = self.stash.len();
        let recv_idx = comm.all_to_all_indices(send_idx)?;
        let recv_val = comm.all_to_all_values(send_val)?;
        log::trace!(
            "rank {}: assembly shipped {} stashed entries, received from {} ranks",
            comm.rank(),
            stashed,
            recv_idx.iter().filter(|v| !v.is_empty()).count()
        );

        let first = self.partition.range().start;
        let mut rows: Vec<BTreeMap<usize, f64>> = (0..self.partition.local_rows())
            .map(|i| {
                (self.row_ptr[i]..self.row_ptr[i + 1])
                    .map(|k| (self.col_idx[k], self.values[k]))
                    .collect()
            })
            .collect();
        for (idx, val) in recv_idx.iter().zip(&recv_val) {
            check_same_len(idx.len(), 2 * val.len())
                .map_err(|e| BridgeError::Assembly(format!("corrupt assembly message: {e}")))?;
            for (pair, &v) in idx.chunks_exact(2).zip(val) {
                let row = &mut rows[pair[0] - first];
                match mode {
                    InsertMode::Insert => {
                        row.insert(pair[1], v);
                    }
                    InsertMode::Add => *row.entry(pair[1]).or_insert(0.0) += v,
                }
            }
        }

        let (row_ptr, col_idx, values) =
            flatten_rows(rows.into_iter().map(|m| m.into_iter().collect()).collect());
        self.row_ptr = row_ptr;
        self.col_idx = col_idx;
        self.values = values;
        self.stash.clear();
        self.stash_mode = None;
        self.assembled = true;
        log::debug!(
            "rank {}: assembled rows {:?} with {} nonzeros",
            comm.rank(),
            self.partition.range(),
            self.values.len()
        );
        Ok(())
    }
}

impl DistributedMatrix for AijMatrix {
    fn row_partition(&self) -> &DistributedRowPartition {
        &self.partition
    }

    fn global_cols(&self) -> usize {
        self.global_cols
    }

    fn row(&self, global_row: usize) -> Result<SparseRow, BridgeError> {
        if !self.assembled {
            return Err(BridgeError::Unassembled);
        }
        let i = self.partition.to_local(global_row)?;
        let entries = (self.row_ptr[i]..self.row_ptr[i + 1])
            .map(|k| (self.col_idx[k], self.values[k]))
            .collect();
        Ok(SparseRow::new(global_row, entries))
    }

    fn apply<C: Comm + ?Sized>(
        &self,
        comm: &C,
        x: &[f64],
        y: &mut [f64],
    ) -> Result<(), BridgeError> {
        let ready = if self.assembled {
            Ok(())
        } else {
            Err(BridgeError::Unassembled)
        };
        consensus(comm, ready)?;
        csr_apply(comm, self.global_cols, &self.row_ptr, &self.col_idx, &self.values, x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::{SerialComm, ThreadComm};

    fn serial(n: usize) -> AijMatrix {
        let p = DistributedRowPartition::from_counts(&[n], 0).unwrap();
        AijMatrix::new(p, n)
    }

    #[test]
    fn insert_overwrites_and_add_accumulates() {
        let comm = SerialComm;
        let mut a = serial(2);
        a.set_value(0, 1, 1.0, InsertMode::Insert).unwrap();
        a.set_value(0, 1, 3.0, InsertMode::Insert).unwrap();
        a.assemble(&comm).unwrap();
        assert_eq!(a.row(0).unwrap().entries, vec![(1, 3.0)]);

        a.set_values(&[0, 1], &[1], &[2.0, 5.0], InsertMode::Add).unwrap();
        a.assemble(&comm).unwrap();
        assert_eq!(a.row(0).unwrap().entries, vec![(1, 5.0)]);
        assert_eq!(a.row(1).unwrap().entries, vec![(1, 5.0)]);
    }

    #[test]
    fn mixing_modes_in_one_phase_fails() {
        let mut a = serial(2);
        a.set_value(0, 0, 1.0, InsertMode::Insert).unwrap();
        let err = a.set_value(0, 0, 1.0, InsertMode::Add).unwrap_err();
        assert!(matches!(err, BridgeError::Assembly(_)));
    }

    #[test]
    fn rows_are_unavailable_before_assembly() {
        let mut a = serial(2);
        a.set_value(0, 0, 1.0, InsertMode::Insert).unwrap();
        assert_eq!(a.row(0), Err(BridgeError::Unassembled));
    }

    #[test]
    fn out_of_range_row_is_rejected() {
        let mut a = serial(2);
        assert_eq!(
            a.set_value(2, 0, 1.0, InsertMode::Insert),
            Err(BridgeError::OutOfRange { row: 2, global_rows: 2 })
        );
    }

    #[test]
    fn off_process_entries_reach_their_owner() {
        let rows = ThreadComm::run(2, |comm| {
            let p = DistributedRowPartition::from_collective(&comm, 2).unwrap();
            let mut a = AijMatrix::new(p, 4);
            // Every rank adds 1.0 to the diagonal of every row.
            for r in 0..4 {
                a.set_value(r, r, 1.0, InsertMode::Add).unwrap();
            }
            a.assemble(&comm).unwrap();
            a.ownership_range()
                .map(|r| a.row(r).unwrap().entries)
                .collect::<Vec<_>>()
        });
        assert_eq!(rows[0], vec![vec![(0, 2.0)], vec![(1, 2.0)]]);
        assert_eq!(rows[1], vec![vec![(2, 2.0)], vec![(3, 2.0)]]);
    }
}
