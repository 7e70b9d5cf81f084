//! Mask utilities for the reference attention path.
//!
//! Masks are additive `f32` tensors shaped `[q_len, kv_len]`. Values are
//! either `0.0` (keep) or `f32::NEG_INFINITY` (discard), so adding a mask to
//! the attention scores before the softmax removes the discarded positions.

pub mod causal;

use candle_core::DType;

/// Dtype shared by all additive masks.
pub const MASK_DTYPE: DType = DType::F32;

pub use causal::build_causal_mask;

#[cfg(test)]
mod tests;
