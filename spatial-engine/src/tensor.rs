// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Tensor descriptors.
//!
//! Tensors only carry an identifier and a shape; the simulator never holds
//! numeric data.

use std::collections::BTreeMap;
use std::fmt;

use crate::types::TensorId;

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Tensor {
    pub id: TensorId,
    pub dims: Vec<usize>,
}

impl Tensor {
    #[must_use]
    pub fn new(id: TensorId, dims: Vec<usize>) -> Self {
        Self { id, dims }
    }

    /// Number of elements, 0 for a tensor with no dimensions.
    #[must_use]
    pub fn size(&self) -> usize {
        if self.dims.is_empty() {
            0
        } else {
            self.dims.iter().product()
        }
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "t{}{:?}", self.id, self.dims)
    }
}

/// All tensors known to one core, ordered by id.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TensorTable {
    tensors: BTreeMap<TensorId, Tensor>,
}

impl TensorTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, id: TensorId) -> Option<&Tensor> {
        self.tensors.get(&id)
    }

    pub fn get_mut(&mut self, id: TensorId) -> Option<&mut Tensor> {
        self.tensors.get_mut(&id)
    }

    /// Insert or replace a tensor.
    pub fn insert(&mut self, tensor: Tensor) {
        self.tensors.insert(tensor.id, tensor);
    }

    /// Return the tensor with the given id, creating an empty placeholder if
    /// it does not exist yet.
    pub fn ensure(&mut self, id: TensorId) -> &mut Tensor {
        self.tensors
            .entry(id)
            .or_insert_with(|| Tensor::new(id, Vec::new()))
    }

    #[must_use]
    pub fn contains(&self, id: TensorId) -> bool {
        self.tensors.contains_key(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tensor> {
        self.tensors.values()
    }
}

impl fmt::Display for TensorTable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for tensor in self.tensors.values() {
            writeln!(f, "{tensor}")?;
        }
        Ok(())
    }
}
