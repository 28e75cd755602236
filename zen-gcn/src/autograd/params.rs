//! Named trainable tensors
//!
//! Parameters live in a `BTreeMap`, so iteration is always in name order.
//! The optimizer state is indexed by position in that flattened order.

use std::collections::btree_map::Iter;
use std::collections::BTreeMap;

use crate::gnn::{GNNError, GNNResult};

use super::Matrix;

/// Name -> tensor map mutated only by optimizer steps
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterStore {
    tensors: BTreeMap<String, Matrix>,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tensor; names must be unique
    pub fn insert(&mut self, name: impl Into<String>, value: Matrix) -> GNNResult<()> {
        let name = name.into();
        if self.tensors.contains_key(&name) {
            return Err(GNNError::InvalidConfiguration(format!(
                "Parameter '{}' registered twice",
                name
            )));
        }
        self.tensors.insert(name, value);
        Ok(())
    }

    pub fn get(&self, name: &str) -> GNNResult<&Matrix> {
        self.tensors
            .get(name)
            .ok_or_else(|| GNNError::InvalidInput(format!("Unknown parameter '{}'", name)))
    }

    pub fn get_mut(&mut self, name: &str) -> GNNResult<&mut Matrix> {
        self.tensors
            .get_mut(name)
            .ok_or_else(|| GNNError::InvalidInput(format!("Unknown parameter '{}'", name)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tensors.contains_key(name)
    }

    /// Parameter names in iteration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tensors.keys().map(String::as_str)
    }

    pub fn iter(&self) -> Iter<'_, String, Matrix> {
        self.tensors.iter()
    }

    /// Number of named tensors
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Total number of scalars across all tensors
    pub fn parameter_count(&self) -> usize {
        self.tensors.values().map(|t| t.len()).sum()
    }

    /// Mutable references to every scalar, tensor by tensor in name order
    pub fn flat_mut(&mut self) -> Vec<&mut f32> {
        self.tensors
            .values_mut()
            .flat_map(|tensor| tensor.iter_mut())
            .collect()
    }

    /**
     * Flatten per-name gradients into the same order as [`flat_mut`](Self::flat_mut).
     *
     * Parameters without a gradient contribute zeros. A gradient whose shape
     * differs from its parameter is rejected.
     */
    pub fn flatten_gradients(&self, gradients: &BTreeMap<String, Matrix>) -> GNNResult<Vec<f32>> {
        let mut flat = Vec::with_capacity(self.parameter_count());

        for (name, tensor) in &self.tensors {
            match gradients.get(name) {
                Some(grad) if grad.dim() != tensor.dim() => {
                    return Err(GNNError::DimensionMismatch(format!(
                        "Gradient for '{}' has shape {:?}, parameter has {:?}",
                        name,
                        grad.dim(),
                        tensor.dim()
                    )));
                }
                Some(grad) => flat.extend(grad.iter().copied()),
                None => flat.extend(std::iter::repeat(0.0).take(tensor.len())),
            }
        }

        Ok(flat)
    }
}
