//! Assemble the 2-D five-point Laplacian on the assembly side, bridge it to
//! the operator side and solve `A x = b` for a known `u` with `b = A u`.
//!
//! ```text
//! cargo run --example laplace_bridge -- -m 20 -n 20 --ranks 4 --random-exact-sol
//! ```

use std::error::Error;
use std::sync::Arc;

use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;

use spbridge::{
    relative_residual, AijMatrix, AijVector, BridgeError, BridgedMatrix, Comm, CrsVector,
    DenseLuSolver, DistVector, DistVectorMut, DistributedMatrix, DistributedRowPartition,
    InsertMode, LinearSolver, SolverOptions, SparseBridge, ThreadComm, Verbosity,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Bridge a 2-D Laplacian between AIJ and CRS and solve it")]
struct Args {
    /// Mesh points in x.
    #[arg(short = 'm', default_value_t = 50)]
    m: usize,
    /// Mesh points in y.
    #[arg(short = 'n', default_value_t = 50)]
    n: usize,
    /// In-process ranks.
    #[arg(long, default_value_t = 1)]
    ranks: usize,
    /// Use a random exact solution instead of all ones.
    #[arg(long)]
    random_exact_sol: bool,
    /// Relative residual the solve must reach.
    #[arg(long, default_value_t = 1e-8)]
    tol: f64,
    /// Report solver status details.
    #[arg(long)]
    verbose: bool,
}

fn laplacian(comm: &ThreadComm, m: usize, n: usize) -> Result<AijMatrix, BridgeError> {
    let p = DistributedRowPartition::uniform(comm, m * n)?;
    let mut a = AijMatrix::new(p, m * n);
    for r in a.ownership_range() {
        let (i, j) = (r / n, r % n);
        if i > 0 {
            a.set_value(r, r - n, -1.0, InsertMode::Insert)?;
        }
        if i + 1 < m {
            a.set_value(r, r + n, -1.0, InsertMode::Insert)?;
        }
        if j > 0 {
            a.set_value(r, r - 1, -1.0, InsertMode::Insert)?;
        }
        if j + 1 < n {
            a.set_value(r, r + 1, -1.0, InsertMode::Insert)?;
        }
        a.set_value(r, r, 4.0, InsertMode::Insert)?;
    }
    a.assemble(comm)?;
    Ok(a)
}

fn run(comm: &ThreadComm, args: &Args) -> Result<(), BridgeError> {
    let root = comm.rank() == 0;
    let a = Arc::new(laplacian(comm, args.m, args.n)?);
    if root {
        println!("Matrix has {} ({}x{}) rows", args.m * args.n, args.m, args.n);
    }

    let mut u = AijVector::new(a.row_partition().clone());
    if args.random_exact_sol {
        let mut rng = StdRng::seed_from_u64(42 + comm.rank() as u64);
        u.set_random(&mut rng);
    } else {
        u.set(1.0);
    }
    let mut b = u.duplicate();
    a.apply(comm, u.local_values(), b.local_values_mut())?;
    let norm = b.norm2(comm)?;
    if root {
        println!("||b|| = {norm:.6}");
    }

    let bridge = SparseBridge::new(comm);
    let copied = bridge.copy(a.as_ref(), a.row_partition())?;
    let adapted = bridge.adapt(&a, a.row_partition())?;
    if let BridgedMatrix::OwnedCopy(m) = &copied {
        let nnz = m.global_nnz(comm)?;
        if root {
            println!("Copied matrix has {nnz} nonzeros");
        }
    }

    let epu = bridge.copy_vector(&u, copied.row_partition())?;
    let mut epb = CrsVector::new(copied.row_partition().clone());
    copied.apply(comm, epu.local_values(), epb.local_values_mut())?;
    let mut via_ref = CrsVector::new(copied.row_partition().clone());
    adapted.apply(comm, epu.local_values(), via_ref.local_values_mut())?;

    let norms = [
        ("crs u", epu.norm2(comm)?),
        ("aij u", u.norm2(comm)?),
        ("crs b", epb.norm2(comm)?),
        ("ref b", via_ref.norm2(comm)?),
        ("aij b", b.norm2(comm)?),
    ];
    if root {
        for (name, v) in norms {
            println!("||{name}||_2 = {v:.6}");
        }
    }

    let mut verbosity = Verbosity::ERRORS | Verbosity::WARNINGS | Verbosity::FINAL_SUMMARY;
    if args.verbose {
        verbosity |= Verbosity::STATUS_TEST_DETAILS;
    }
    let mut solver = DenseLuSolver::new(SolverOptions {
        convergence_tolerance: args.tol,
        verbosity,
        ..SolverOptions::default()
    })?;
    let mut x = CrsVector::new(copied.row_partition().clone());
    let stats = solver.solve(comm, &copied, epb.local_values(), x.local_values_mut())?;

    let rel = relative_residual(comm, &copied, x.local_values(), epb.local_values())?;
    if root {
        println!("relative residual = {rel:.3e}");
    }
    if !stats.converged {
        return Err(BridgeError::Solve(format!(
            "relative residual {rel:.3e} above {:.1e}",
            args.tol
        )));
    }

    // Back to the assembly side and compare against the exact solution.
    let mut x_aij = u.duplicate();
    bridge.copy_vector_into(&x, &mut x_aij)?;
    let mut diff = u.duplicate();
    diff.waxpy(-1.0, &u, &x_aij)?;
    let error = diff.norm2(comm)?;
    if root {
        println!("||x - u||_2 = {error:.3e}");
    }
    if error > 1e-6 {
        return Err(BridgeError::Solve(format!("solution error {error:.3e} above 1e-6")));
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    log::info!("Solving a {}x{} Laplacian on {} ranks", args.m, args.n, args.ranks);
    let results = ThreadComm::run(args.ranks, |comm| run(&comm, &args));
    for r in results {
        r?;
    }
    Ok(())
}
