//! Configuration, analysis and HLS code emission for a single-head scaled
//! dot-product attention hardware operator.
//!
//! An operator is described by four shape parameters (`qk_dim`, `q_len`,
//! `v_dim`, `kv_len`), two fold factors trading parallelism for sequential
//! reuse (`emb_fold` along embeddings, `seq_fold` along the key/value
//! sequence), an element datatype per tensor role and the intermediate
//! datatypes of its two matrix multiplications. From that description the
//! crate derives folded stream shapes and widths, narrows the accumulators to
//! the smallest safe width, keeps the input datatypes consistent with the
//! enclosing graph and renders the HLS C++ fragments instantiating the
//! `ScaledDotProductAttention` template.
//!
//! Operators execute either against an exact in-process reference
//! (`softmax(Q Kᵀ / sqrt(qk_dim) + mask) V`) or by running the compiled C++
//! simulation of the generated code, exchanging folded `.npy` artifacts.

pub mod accumulator;
pub mod codegen;
pub mod core;
pub mod descriptor;
pub mod execution;
pub mod folding;
pub mod interop;
pub mod masks;
pub mod operator;
pub mod reference;
pub mod widths;

pub use crate::accumulator::{accumulator_width, AccumulatorWidths};
pub use crate::codegen::{Fragment, GeneratedCode};
pub use crate::core::{AttentionError, MaskMode, OperatorConfig, Result, TensorRole};
pub use crate::descriptor::OperatorDescriptor;
pub use crate::execution::ExecutionMode;
pub use crate::folding::FoldedShape;
pub use crate::operator::ScaledDotProductAttention;
