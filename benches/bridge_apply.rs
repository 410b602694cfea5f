use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use spbridge::{
    AijMatrix, DistributedMatrix, DistributedRowPartition, InsertMode, SerialComm, SparseBridge,
};

fn laplacian(comm: &SerialComm, m: usize, n: usize) -> AijMatrix {
    let p = DistributedRowPartition::from_collective(comm, (m * n) as i64).unwrap();
    let mut a = AijMatrix::new(p, m * n);
    for r in 0..m * n {
        let (i, j) = (r / n, r % n);
        let mut cols = vec![r];
        let mut vals = vec![4.0];
        let stencil = [
            (i > 0, r.wrapping_sub(n)),
            (i + 1 < m, r + n),
            (j > 0, r.wrapping_sub(1)),
            (j + 1 < n, r + 1),
        ];
        for (ok, c) in stencil {
            if ok {
                cols.push(c);
                vals.push(-1.0);
            }
        }
        for (c, v) in cols.into_iter().zip(vals) {
            a.set_value(r, c, v, InsertMode::Insert).unwrap();
        }
    }
    a.assemble(comm).unwrap();
    a
}

fn bench_adapter_vs_copy(c: &mut Criterion) {
    let comm = SerialComm;
    let a = Arc::new(laplacian(&comm, 100, 100));
    let bridge = SparseBridge::new(&comm);
    let adapted = bridge.adapt(&a, a.row_partition()).unwrap();
    let copied = bridge.copy(a.as_ref(), a.row_partition()).unwrap();
    let x: Vec<f64> = (0..a.global_rows()).map(|i| (i as f64).sin()).collect();
    let mut y = vec![0.0; x.len()];

    c.bench_function("apply by reference", |ben| {
        ben.iter(|| adapted.apply(&comm, black_box(&x), black_box(&mut y)).unwrap())
    });

    c.bench_function("apply on copy", |ben| {
        ben.iter(|| copied.apply(&comm, black_box(&x), black_box(&mut y)).unwrap())
    });

    c.bench_function("deep copy 10k rows", |ben| {
        ben.iter(|| bridge.copy(black_box(a.as_ref()), a.row_partition()).unwrap())
    });
}

criterion_group!(benches, bench_adapter_vs_copy);
criterion_main!(benches);
