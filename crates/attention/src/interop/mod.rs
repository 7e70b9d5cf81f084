//! Boundary between an attention operator and the dataflow graph hosting it.
//!
//! The graph owns tensor datatype annotations and, during execution, the
//! tensor values flowing between nodes. Both are reached through small
//! abstractions so the operator can be driven by an in-memory graph in tests
//! and by a real graph integration elsewhere.

pub mod consistency;
pub mod context;
pub mod graph;

pub use consistency::{infer_node_datatype, DatatypeDrift};
pub use context::ExecutionContext;
pub use graph::{InMemoryGraph, ModelGraph};
