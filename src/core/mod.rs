pub mod traits;
pub use traits::{DistVector, DistVectorMut, DistributedMatrix, SparseRow};
