//! Stream widths and the widest word the generated hardware must support.

use crate::core::{OperatorConfig, Result, TensorRole};

impl OperatorConfig {
    /// Bits transferred in parallel per cycle on a role's stream.
    pub fn stream_width(&self, role: TensorRole) -> Result<u64> {
        let folded = self.folded_shape(role)?;
        Ok(folded.lanes as u64 * u64::from(self.datatype(role).bitwidth()))
    }

    /// Width of a role's stream, or zero when the role is not active.
    fn optional_stream_width(&self, role: TensorRole) -> Result<u64> {
        if self.has_role(role) {
            self.stream_width(role)
        } else {
            Ok(0)
        }
    }

    /// Maximum bit-width over every stream, tile, accumulator and matmul
    /// output word of the operator.
    pub fn max_internal_width(&self) -> Result<u64> {
        let inputs_max = [TensorRole::Query, TensorRole::Key, TensorRole::Value]
            .into_iter()
            .map(|role| self.stream_width(role))
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .max()
            .unwrap_or(0);
        let output_bits = self.stream_width(TensorRole::Output)?;
        let mask_bits = self.optional_stream_width(TensorRole::Mask)?;
        let attention_bits = self.stream_width(TensorRole::AttentionWeights)?;

        let key_lanes = self.folded_shape(TensorRole::Key)?.lanes as u64;
        let value_lanes = self.folded_shape(TensorRole::Value)?.lanes as u64;
        let seq_lanes = self.folded_shape(TensorRole::AttentionWeights)?.lanes as u64;
        let bits = |role: TensorRole| u64::from(self.datatype(role).bitwidth());

        // A full tile of key or value elements crosses the interface at once.
        let tile_bits = (key_lanes * seq_lanes * bits(TensorRole::Key))
            .max(value_lanes * seq_lanes * bits(TensorRole::Value));
        // Accumulators are single elements, never streamed.
        let acc_bits = u64::from(self.qk_matmul().accumulator.bitwidth())
            .max(u64::from(self.av_matmul().accumulator.bitwidth()));
        let matmul_out_bits = (seq_lanes * u64::from(self.qk_matmul().output.bitwidth()))
            .max(value_lanes * u64::from(self.av_matmul().output.bitwidth()));
        let matmul_bits = tile_bits.max(acc_bits).max(matmul_out_bits);

        let widest = [inputs_max, output_bits, mask_bits, attention_bits, matmul_bits]
            .into_iter()
            .max()
            .unwrap_or(0);
        log::debug!(
            "attention::widths inputs={inputs_max} output={output_bits} mask={mask_bits} attention={attention_bits} matmul={matmul_bits} max={widest}"
        );
        Ok(widest)
    }
}
