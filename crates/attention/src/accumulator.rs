//! Accumulator width minimization by value-range propagation.
//!
//! Each multiply-accumulate sums `dim` products of one element from each
//! operand. Bounding those products by the operands' extrema bounds the
//! accumulator, and the accumulator is narrowed to the smallest unsigned
//! integer covering that bound.

use datatype::DataType;

use crate::core::{AttentionError, OperatorConfig, Result, TensorRole};

/// Accumulator datatypes chosen for both multiplications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccumulatorWidths {
    pub qk: DataType,
    pub av: DataType,
}

/// Smallest accumulator width for `dim` products of `lhs` and `rhs` elements.
///
/// The bound is `max(-min, 1 + max)` of the accumulated range and the width
/// is `ceil(log2(bound) + 1)`.
// TODO: revisit for signed operands: `dim * lhs.min * rhs.min` is the most
// positive product when both minima are negative, so the negative side of
// the range is not covered.
pub fn accumulator_width(
    matmul: &'static str,
    dim: usize,
    lhs: DataType,
    rhs: DataType,
) -> Result<u32> {
    let dim = dim as f64;
    let acc_min = dim * lhs.min() * rhs.min();
    let acc_max = dim * lhs.max() * rhs.max();
    let bound = (-acc_min).max(1.0 + acc_max);
    if !bound.is_finite() || bound < 1.0 {
        return Err(AttentionError::AccumulatorRange { matmul, bound });
    }
    let width = (bound.log2() + 1.0).ceil();
    Ok(width as u32)
}

impl OperatorConfig {
    /// Narrows both accumulator datatypes to `UINT<width>` given the current
    /// query, key, value and attention weights datatypes.
    pub fn minimize_accumulator_width(&mut self) -> Result<AccumulatorWidths> {
        let qk_bits = accumulator_width(
            "query x key",
            self.qk_dim(),
            self.datatype(TensorRole::Query),
            self.datatype(TensorRole::Key),
        )?;
        let av_bits = accumulator_width(
            "attention x value",
            self.v_dim(),
            self.datatype(TensorRole::AttentionWeights),
            self.datatype(TensorRole::Value),
        )?;

        let widths = AccumulatorWidths {
            qk: DataType::uint(qk_bits)?,
            av: DataType::uint(av_bits)?,
        };
        log::info!(
            "attention::accumulator minimized qk {} -> {} av {} -> {}",
            self.qk_matmul().accumulator,
            widths.qk,
            self.av_matmul().accumulator,
            widths.av
        );
        self.qk_matmul_mut().accumulator = widths.qk;
        self.av_matmul_mut().accumulator = widths.av;
        Ok(widths)
    }
}
