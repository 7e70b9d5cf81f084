//! Core types shared by every stage of the operator pipeline.
//!
//! The configuration model ([`OperatorConfig`]) is populated once, either
//! directly or from an [`OperatorDescriptor`](crate::descriptor::OperatorDescriptor),
//! and then read by the folding, width and code emission stages. Only the
//! accumulator analysis and the datatype consistency check mutate it.

pub mod config;
pub mod errors;

pub use config::{
    Activation, Folds, MaskMode, MatMulTypes, OperatorConfig, RoleTypes, Shapes, TensorRole,
    DEFAULT_INTERMEDIATE_TYPE, DEFAULT_MASK_TYPE,
};
pub use errors::{AttentionError, Result};
