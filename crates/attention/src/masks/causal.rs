//! Builders for causal attention masks.
//!
//! The resulting tensors have dtype [`MASK_DTYPE`](super::MASK_DTYPE) and shape
//! `[q_len, kv_len]`. Entries are `0.0` where attention is permitted and
//! `f32::NEG_INFINITY` otherwise.

use candle_core::{Device, Result, Tensor};

/// Construct a causal mask for the supplied sequence lengths.
///
/// Query `i` may attend to keys `0..=i`; every entry strictly above the main
/// diagonal is discarded. Queries and keys are aligned at position zero, so
/// keys beyond `q_len` are never visible.
pub fn build_causal_mask(device: &Device, q_len: usize, kv_len: usize) -> Result<Tensor> {
    let data: Vec<f32> = (0..q_len)
        .flat_map(|q| {
            (0..kv_len).map(move |k| if k > q { f32::NEG_INFINITY } else { 0.0 })
        })
        .collect();
    Tensor::from_vec(data, (q_len, kv_len), device)
}
