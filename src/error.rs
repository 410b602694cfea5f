use thiserror::Error;

// Unified error type for spbridge

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    #[error("invalid partition: {0}")]
    InvalidPartition(String),
    #[error("row {row} outside global range [0, {global_rows})")]
    OutOfRange { row: usize, global_rows: usize },
    #[error("partition mismatch: source has {source_rows} global rows, target has {target_rows}")]
    PartitionMismatch { source_rows: usize, target_rows: usize },
    #[error("row layout of rank {rank} differs between source and target")]
    LayoutMismatch { rank: usize },
    #[error("assembly error: {0}")]
    Assembly(String),
    #[error("row {0} not found in source")]
    RowNotFound(usize),
    #[error("length mismatch: expected {expected}, found {found}")]
    LengthMismatch { expected: usize, found: usize },
    #[error("row {row} is not owned by rank {rank}")]
    NotOwned { row: usize, rank: usize },
    #[error("matrix is not assembled")]
    Unassembled,
    #[error("source of reference adapter has been dropped")]
    DanglingSource,
    #[error("collective operation failed on {failed} of {size} ranks")]
    CollectiveFailure { failed: usize, size: usize },
    #[error("communication error: {0}")]
    Comm(String),
    #[error("solve error: {0}")]
    Solve(String),
    #[error("invalid option: {0}")]
    InvalidOption(String),
}
