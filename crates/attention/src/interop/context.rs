//! Tensor values exchanged between graph nodes during execution.

use std::collections::HashMap;

use candle_core::Tensor;

use crate::core::{AttentionError, Result};

/// Tensor values keyed by graph tensor name.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    tensors: HashMap<String, Tensor>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, tensor: Tensor) -> Option<Tensor> {
        self.tensors.insert(name.into(), tensor)
    }

    /// Looks up a tensor, failing when the name is not bound.
    pub fn get(&self, name: &str) -> Result<&Tensor> {
        self.tensors
            .get(name)
            .ok_or_else(|| AttentionError::MissingTensor(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tensors.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Tensor> {
        self.tensors.remove(name)
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }
}
