//! Matrix bridging: reference adapters, deep copies and redistribution.

mod common;

use std::sync::Arc;

use approx::assert_abs_diff_eq;
use spbridge::{
    AijMatrix, BridgeError, BridgedMatrix, Comm, CrsVector, DistVector, DistVectorMut,
    DistributedMatrix, DistributedRowPartition, InsertMode, SerialComm, SparseBridge, ThreadComm,
};

use common::{all_rows, laplacian, laplacian_on, local_rows, random_sparse};

#[test]
fn interior_and_corner_rows_of_5x5_laplacian() {
    let comm = SerialComm;
    let a = Arc::new(laplacian(&comm, 5, 5));
    let bridge = SparseBridge::new(&comm);
    let copied = bridge.copy(a.as_ref(), a.row_partition()).unwrap();
    let adapted = bridge.adapt(&a, a.row_partition()).unwrap();

    for m in [&copied, &adapted] {
        let row = m.row(12).unwrap().sorted();
        assert_eq!(row.columns().collect::<Vec<_>>(), vec![7, 11, 12, 13, 17]);
        assert_eq!(row.values().collect::<Vec<_>>(), vec![-1.0, -1.0, 4.0, -1.0, -1.0]);

        let row = m.row(0).unwrap().sorted();
        assert_eq!(row.columns().collect::<Vec<_>>(), vec![0, 1, 5]);
        assert_eq!(row.values().collect::<Vec<_>>(), vec![4.0, -1.0, -1.0]);
    }
    assert!(adapted.is_reference());
    assert!(!copied.is_reference());
}

#[test]
fn bridged_apply_reproduces_source_product() {
    let comm = SerialComm;
    let a = Arc::new(laplacian(&comm, 5, 5));
    let u = vec![1.0; 25];
    let mut b = vec![0.0; 25];
    a.apply(&comm, &u, &mut b).unwrap();

    let bridge = SparseBridge::new(&comm);
    for m in [
        bridge.copy(a.as_ref(), a.row_partition()).unwrap(),
        bridge.adapt(&a, a.row_partition()).unwrap(),
    ] {
        let mut y = vec![0.0; 25];
        m.apply(&comm, &u, &mut y).unwrap();
        for (yi, bi) in y.iter().zip(&b) {
            assert_abs_diff_eq!(*yi, *bi, epsilon = 1e-10);
        }
    }
    // Row sums of the Laplacian: 0 inside, positive on the boundary.
    assert_abs_diff_eq!(b[12], 0.0);
    assert_abs_diff_eq!(b[0], 2.0);
}

#[test]
fn copy_preserves_every_row_of_random_matrices() {
    let comm = SerialComm;
    for seed in 0..5u64 {
        let p = DistributedRowPartition::from_collective(&comm, 17).unwrap();
        let a = random_sparse(&comm, p.clone(), 13, 0.3, seed);
        let copied = SparseBridge::new(&comm).copy(&a, &p).unwrap();
        assert_eq!(copied.global_cols(), 13);
        for (src, dst) in local_rows(&a).iter().zip(local_rows(&copied)) {
            assert_eq!(src.sorted(), dst.sorted(), "seed {seed}");
        }
    }
}

#[test]
fn copy_is_independent_of_later_source_changes() {
    let comm = SerialComm;
    let mut a = laplacian(&comm, 3, 3);
    let copied = SparseBridge::new(&comm).copy(&a, a.row_partition()).unwrap();
    a.set_value(4, 4, 100.0, InsertMode::Insert).unwrap();
    a.assemble(&comm).unwrap();
    let row = copied.row(4).unwrap().sorted();
    assert!(row.entries.contains(&(4, 4.0)));
}

#[test]
fn adapter_fails_once_source_is_dropped() {
    let comm = SerialComm;
    let a = Arc::new(laplacian(&comm, 3, 3));
    let adapted = SparseBridge::new(&comm).adapt(&a, a.row_partition()).unwrap();
    let BridgedMatrix::Reference(adapter) = &adapted else {
        panic!("adapt must return a reference");
    };
    assert!(adapter.is_alive());
    assert_eq!(adapted.row(0).unwrap().len(), 3);
    drop(a);
    assert!(!adapter.is_alive());
    assert_eq!(adapted.row(0), Err(BridgeError::DanglingSource));
    let mut y = vec![0.0; 9];
    assert_eq!(
        adapted.apply(&comm, &[1.0; 9], &mut y),
        Err(BridgeError::DanglingSource)
    );
}

#[test]
fn size_mismatch_fails_without_partial_copy() {
    let comm = SerialComm;
    let a = laplacian(&comm, 5, 5);
    let target = DistributedRowPartition::from_collective(&comm, 30).unwrap();
    let bridge = SparseBridge::new(&comm);
    let err = bridge.copy(&a, &target).unwrap_err();
    assert_eq!(
        err,
        BridgeError::PartitionMismatch { source_rows: 25, target_rows: 30 }
    );
    let a = Arc::new(a);
    assert!(matches!(
        bridge.adapt(&a, &target),
        Err(BridgeError::PartitionMismatch { .. })
    ));
}

#[test]
fn multi_rank_copy_and_adapt_match_source() {
    let checks = ThreadComm::run(3, |comm| {
        let a = Arc::new(laplacian(&comm, 4, 5));
        let bridge = SparseBridge::new(&comm);
        let copied = bridge.copy(a.as_ref(), a.row_partition()).unwrap();
        let adapted = bridge.adapt(&a, a.row_partition()).unwrap();

        let x: Vec<f64> = a.ownership_range().map(|r| (r as f64).sin()).collect();
        let mut want = vec![0.0; x.len()];
        let mut got_copy = vec![0.0; x.len()];
        let mut got_ref = vec![0.0; x.len()];
        a.apply(&comm, &x, &mut want).unwrap();
        copied.apply(&comm, &x, &mut got_copy).unwrap();
        adapted.apply(&comm, &x, &mut got_ref).unwrap();
        assert_eq!(local_rows(a.as_ref()), local_rows(&copied));
        let BridgedMatrix::OwnedCopy(owned) = &copied else {
            panic!("copy must own its entries");
        };
        // 4 x 5 grid: 20 diagonal entries and two per grid edge.
        assert_eq!(owned.global_nnz(&comm).unwrap(), 20 + 2 * (3 * 5 + 4 * 4));
        (want, got_copy, got_ref)
    });
    for (want, got_copy, got_ref) in checks {
        for i in 0..want.len() {
            assert_abs_diff_eq!(want[i], got_copy[i], epsilon = 1e-12);
            assert_abs_diff_eq!(want[i], got_ref[i], epsilon = 1e-12);
        }
    }
}

#[test]
fn copy_redistributes_to_a_different_layout() {
    let counts = [7usize, 1, 4];
    let results = ThreadComm::run(3, |comm| {
        let source_part = DistributedRowPartition::uniform(&comm, 12).unwrap();
        let target = DistributedRowPartition::from_counts(&counts, comm.rank()).unwrap();
        let a = random_sparse(&comm, source_part, 12, 0.4, 7);
        let copied = SparseBridge::new(&comm).copy(&a, &target).unwrap();
        assert_eq!(copied.row_partition(), &target);
        assert_eq!(copied.ownership_range(), target.range());
        (all_rows(&comm, &a), all_rows(&comm, &copied))
    });
    for (src, dst) in results {
        assert_eq!(src.len(), 12);
        assert_eq!(src, dst);
    }
}

#[test]
fn redistributed_copy_applies_like_the_source() {
    let results = ThreadComm::run(2, |comm| {
        let src_part = DistributedRowPartition::from_counts(&[9, 0], comm.rank()).unwrap();
        let a = laplacian_on(&comm, src_part, 3, 3);
        let target = DistributedRowPartition::uniform(&comm, 9).unwrap();
        let copied = SparseBridge::new(&comm).copy(&a, &target).unwrap();

        let x = CrsVector::from_local(target.clone(), vec![1.0; target.local_rows()]).unwrap();
        let mut y = CrsVector::new(target.clone());
        copied.apply(&comm, x.local_values(), y.local_values_mut()).unwrap();
        y.norm2(&comm).unwrap()
    });
    // Row sums 2, 1, 2, 1, 0, 1, 2, 1, 2.
    let expected = (4.0 * 4.0 + 4.0 * 1.0f64).sqrt();
    for n in results {
        assert_abs_diff_eq!(n, expected, epsilon = 1e-12);
    }
}

#[test]
fn rank_local_failure_is_reported_on_every_rank() {
    let results = ThreadComm::run(2, |comm| {
        let p = DistributedRowPartition::uniform(&comm, 4).unwrap();
        let mut a = AijMatrix::new(p.clone(), 4);
        for r in a.ownership_range() {
            a.set_value(r, r, 1.0, InsertMode::Insert).unwrap();
        }
        a.assemble(&comm).unwrap();
        if comm.rank() == 1 {
            // Rank 1 stages new values and never assembles them.
            a.set_value(2, 2, 5.0, InsertMode::Insert).unwrap();
        }
        let target = DistributedRowPartition::from_counts(&[1, 3], comm.rank()).unwrap();
        SparseBridge::new(&comm).copy(&a, &target).map(|_| ())
    });
    assert_eq!(results[1], Err(BridgeError::Unassembled));
    assert_eq!(
        results[0],
        Err(BridgeError::CollectiveFailure { failed: 1, size: 2 })
    );
}

#[test]
fn unassembled_source_fails_adapted_apply_on_every_rank() {
    let results = ThreadComm::run(2, |comm| {
        let mut a = laplacian(&comm, 2, 2);
        if comm.rank() == 1 {
            a.set_value(3, 3, 5.0, InsertMode::Insert).unwrap();
        }
        let a = Arc::new(a);
        let adapted = SparseBridge::new(&comm).adapt(&a, a.row_partition()).unwrap();
        let x = vec![1.0; a.row_partition().local_rows()];
        let mut y = vec![0.0; x.len()];
        adapted.apply(&comm, &x, &mut y)
    });
    assert_eq!(results[1], Err(BridgeError::Unassembled));
    assert_eq!(
        results[0],
        Err(BridgeError::CollectiveFailure { failed: 1, size: 2 })
    );
}

#[test]
fn wrong_output_length_fails_apply_on_every_rank() {
    let results = ThreadComm::run(2, |comm| {
        let a = Arc::new(laplacian(&comm, 2, 2));
        let bridge = SparseBridge::new(&comm);
        let copied = bridge.copy(a.as_ref(), a.row_partition()).unwrap();
        let adapted = bridge.adapt(&a, a.row_partition()).unwrap();
        let x = vec![1.0; 2];
        let mut y = vec![0.0; if comm.rank() == 0 { 3 } else { 2 }];
        (copied.apply(&comm, &x, &mut y), adapted.apply(&comm, &x, &mut y))
    });
    let mismatch = Err(BridgeError::LengthMismatch { expected: 2, found: 3 });
    assert_eq!(results[0], (mismatch.clone(), mismatch));
    let peer = Err(BridgeError::CollectiveFailure { failed: 1, size: 2 });
    assert_eq!(results[1], (peer.clone(), peer));
}
