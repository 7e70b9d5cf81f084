//! Datatype annotations of the enclosing graph.

use std::collections::HashMap;

use datatype::DataType;

/// Read/write access to the datatype annotation of graph tensors.
pub trait ModelGraph {
    /// Datatype annotated on `tensor`, if the graph knows one.
    fn tensor_datatype(&self, tensor: &str) -> Option<DataType>;

    fn set_tensor_datatype(&mut self, tensor: &str, datatype: DataType);
}

/// Graph annotations kept in a plain map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InMemoryGraph {
    datatypes: HashMap<String, DataType>,
}

impl InMemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_datatype(mut self, tensor: impl Into<String>, datatype: DataType) -> Self {
        self.datatypes.insert(tensor.into(), datatype);
        self
    }

    pub fn len(&self) -> usize {
        self.datatypes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datatypes.is_empty()
    }
}

impl ModelGraph for InMemoryGraph {
    fn tensor_datatype(&self, tensor: &str) -> Option<DataType> {
        self.datatypes.get(tensor).copied()
    }

    fn set_tensor_datatype(&mut self, tensor: &str, datatype: DataType) {
        self.datatypes.insert(tensor.to_string(), datatype);
    }
}
