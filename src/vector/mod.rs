//! Distributed dense vectors of both representations.
//!
//! [`AijVector`] follows the assembly-side API (set, random fill, axpy);
//! [`CrsVector`] follows the operator-side API (put_scalar, update).

use rand::Rng;

use crate::core::traits::{check_same_len, DistVector, DistVectorMut};
use crate::error::BridgeError;
use crate::parallel::DistributedRowPartition;

/// Assembly-side vector: one value per locally owned row.
#[derive(Debug, Clone, PartialEq)]
pub struct AijVector {
    partition: DistributedRowPartition,
    values: Vec<f64>,
}

impl AijVector {
    /// Zero vector over `partition`.
    pub fn new(partition: DistributedRowPartition) -> Self {
        let values = vec![0.0; partition.local_rows()];
        Self { partition, values }
    }

    pub fn from_local(
        partition: DistributedRowPartition,
        values: Vec<f64>,
    ) -> Result<Self, BridgeError> {
        check_same_len(partition.local_rows(), values.len())?;
        Ok(Self { partition, values })
    }

    /// Zero vector with the same layout.
    pub fn duplicate(&self) -> Self {
        Self::new(self.partition.clone())
    }

    pub fn set(&mut self, alpha: f64) {
        self.values.iter_mut().for_each(|v| *v = alpha);
    }

    /// Uniform values in `[0, 1)`.
    pub fn set_random<R: Rng>(&mut self, rng: &mut R) {
        self.values.iter_mut().for_each(|v| *v = rng.gen_range(0.0..1.0));
    }

    /// Set one locally owned global entry.
    pub fn set_value(&mut self, global_row: usize, value: f64) -> Result<(), BridgeError> {
        let i = self.partition.to_local(global_row)?;
        self.values[i] = value;
        Ok(())
    }

    /// `self += alpha * x`
    pub fn axpy<V: DistVector + ?Sized>(&mut self, alpha: f64, x: &V) -> Result<(), BridgeError> {
        check_same_len(self.values.len(), x.local_values().len())?;
        for (yi, xi) in self.values.iter_mut().zip(x.local_values()) {
            *yi += alpha * xi;
        }
        Ok(())
    }

    /// `self = alpha * x + y`
    pub fn waxpy<X: DistVector + ?Sized, Y: DistVector + ?Sized>(
        &mut self,
        alpha: f64,
        x: &X,
        y: &Y,
    ) -> Result<(), BridgeError> {
        check_same_len(self.values.len(), x.local_values().len())?;
        check_same_len(self.values.len(), y.local_values().len())?;
        for ((w, xi), yi) in self.values.iter_mut().zip(x.local_values()).zip(y.local_values()) {
            *w = alpha * xi + yi;
        }
        Ok(())
    }
}

impl DistVector for AijVector {
    fn partition(&self) -> &DistributedRowPartition {
        &self.partition
    }
    fn local_values(&self) -> &[f64] {
        &self.values
    }
}

impl DistVectorMut for AijVector {
    fn local_values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }
}

/// Operator-side vector over a row map.
#[derive(Debug, Clone, PartialEq)]
pub struct CrsVector {
    row_map: DistributedRowPartition,
    values: Vec<f64>,
}

impl CrsVector {
    pub fn new(row_map: DistributedRowPartition) -> Self {
        let values = vec![0.0; row_map.local_rows()];
        Self { row_map, values }
    }

    pub fn from_local(
        row_map: DistributedRowPartition,
        values: Vec<f64>,
    ) -> Result<Self, BridgeError> {
        check_same_len(row_map.local_rows(), values.len())?;
        Ok(Self { row_map, values })
    }

    pub fn put_scalar(&mut self, alpha: f64) {
        self.values.iter_mut().for_each(|v| *v = alpha);
    }

    /// `self = alpha * a + beta * self`
    pub fn update<V: DistVector + ?Sized>(
        &mut self,
        alpha: f64,
        a: &V,
        beta: f64,
    ) -> Result<(), BridgeError> {
        check_same_len(self.values.len(), a.local_values().len())?;
        for (s, ai) in self.values.iter_mut().zip(a.local_values()) {
            *s = alpha * ai + beta * *s;
        }
        Ok(())
    }

    pub fn into_local(self) -> Vec<f64> {
        self.values
    }
}

impl DistVector for CrsVector {
    fn partition(&self) -> &DistributedRowPartition {
        &self.row_map
    }
    fn local_values(&self) -> &[f64] {
        &self.values
    }
}

impl DistVectorMut for CrsVector {
    fn local_values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }
}
