//! Single-head attention `softmax(Q Kᵀ / sqrt(qk_dim) + mask) V` on
//! two-dimensional `f32` tensors.

use std::sync::OnceLock;

use candle_core::{DType, Tensor};
use candle_nn::ops::softmax_last_dim;

use crate::core::{AttentionError, Result};

/// Numerically exact reference kernel.
#[derive(Debug, Default)]
pub struct ExactAttention {
    first_call: OnceLock<()>,
}

impl ExactAttention {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attends `q: [q_len, qk_dim]` over `k: [kv_len, qk_dim]` and
    /// `v: [kv_len, v_dim]`, returning `[q_len, v_dim]` in `f32`.
    ///
    /// The optional additive `mask` must be `[q_len, kv_len]`. Inputs of any
    /// float or integer dtype are promoted to `f32` before computing.
    pub fn attend(
        &self,
        q: &Tensor,
        k: &Tensor,
        v: &Tensor,
        mask: Option<&Tensor>,
    ) -> Result<Tensor> {
        let device = q.device();
        if !device.same_device(k.device()) || !device.same_device(v.device()) {
            return Err(AttentionError::InvalidShape {
                context: "q, k, v must reside on the same device".to_string(),
            });
        }

        let (q_len, qk_dim) = q.dims2().map_err(|_| AttentionError::InvalidShape {
            context: format!("q must have shape [q_len, qk_dim], got {:?}", q.dims()),
        })?;
        let (kv_len, kd) = k.dims2().map_err(|_| AttentionError::InvalidShape {
            context: format!("k must have shape [kv_len, qk_dim], got {:?}", k.dims()),
        })?;
        let (vk, v_dim) = v.dims2().map_err(|_| AttentionError::InvalidShape {
            context: format!("v must have shape [kv_len, v_dim], got {:?}", v.dims()),
        })?;
        if kd != qk_dim {
            return Err(AttentionError::InvalidShape {
                context: format!("k shape mismatch: expected [?, {qk_dim}] got [{kv_len}, {kd}]"),
            });
        }
        if vk != kv_len {
            return Err(AttentionError::InvalidShape {
                context: format!("v shape mismatch: expected [{kv_len}, ?] got [{vk}, {v_dim}]"),
            });
        }

        if self.first_call.set(()).is_ok() {
            log::info!(
                "attention::reference init q_len={q_len} kv_len={kv_len} qk_dim={qk_dim} v_dim={v_dim} masked={}",
                mask.is_some()
            );
        }

        let q = q.to_dtype(DType::F32)?;
        let k = k.to_dtype(DType::F32)?;
        let v = v.to_dtype(DType::F32)?;

        let scale = (qk_dim as f64).powf(-0.5);
        let k_t = k.t()?.contiguous()?;
        let mut scores = q.matmul(&k_t)?.affine(scale, 0.0)?;

        if let Some(mask) = mask {
            if !device.same_device(mask.device()) {
                return Err(AttentionError::InvalidShape {
                    context: "mask must reside on the same device as q".to_string(),
                });
            }
            if mask.dims() != [q_len, kv_len] {
                return Err(AttentionError::InvalidShape {
                    context: format!(
                        "mask shape mismatch: expected [{q_len}, {kv_len}] got {:?}",
                        mask.dims()
                    ),
                });
            }
            scores = scores.broadcast_add(&mask.to_dtype(DType::F32)?)?;
        }

        let probs = softmax_last_dim(&scores)?;
        Ok(probs.matmul(&v)?)
    }
}
