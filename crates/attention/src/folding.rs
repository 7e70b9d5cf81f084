//! Normal and folded tensor shapes per role.
//!
//! Every role is a two-dimensional tensor `(outer, inner)`. Folding splits
//! the inner dimension into `fold` sequential steps of `lanes` parallel
//! elements, which is the layout the hardware streams consume and the layout
//! of the `.npy` artifacts exchanged with simulation.

use crate::core::config::check_fold;
use crate::core::{OperatorConfig, Result, TensorRole};

/// A role's shape after folding its inner dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FoldedShape {
    /// Extent of the unfolded outer dimension.
    pub outer: usize,
    /// Number of sequential steps the inner dimension is split into.
    pub fold: usize,
    /// Elements transferred in parallel per step.
    pub lanes: usize,
}

impl FoldedShape {
    /// The `(outer, inner)` shape this folding was derived from.
    pub fn normal(&self) -> (usize, usize) {
        (self.outer, self.fold * self.lanes)
    }

    pub fn dims(&self) -> [usize; 3] {
        [self.outer, self.fold, self.lanes]
    }

    pub fn elements(&self) -> usize {
        self.outer * self.fold * self.lanes
    }
}

impl OperatorConfig {
    /// Unfolded `(outer, inner)` shape of a role.
    pub fn normal_shape(&self, role: TensorRole) -> Result<(usize, usize)> {
        self.require_role(role)?;
        let shape = match role {
            TensorRole::Query => (self.q_len(), self.qk_dim()),
            TensorRole::Key => (self.kv_len(), self.qk_dim()),
            TensorRole::Value => (self.kv_len(), self.v_dim()),
            TensorRole::Mask | TensorRole::AttentionWeights => (self.q_len(), self.kv_len()),
            TensorRole::Output => (self.q_len(), self.v_dim()),
        };
        Ok(shape)
    }

    /// Folded shape of a role.
    ///
    /// Query, key, value and output fold their embedding dimension by
    /// `emb_fold`; mask and attention weights fold the key/value sequence
    /// dimension by `seq_fold`.
    pub fn folded_shape(&self, role: TensorRole) -> Result<FoldedShape> {
        let (outer, inner) = self.normal_shape(role)?;
        let (fold_field, fold, dim_field) = match role {
            TensorRole::Query | TensorRole::Key => ("emb_fold", self.emb_fold(), "qk_dim"),
            TensorRole::Value | TensorRole::Output => ("emb_fold", self.emb_fold(), "v_dim"),
            TensorRole::Mask | TensorRole::AttentionWeights => {
                ("seq_fold", self.seq_fold(), "kv_len")
            }
        };
        check_fold(fold_field, fold, dim_field, inner)?;
        Ok(FoldedShape {
            outer,
            fold,
            lanes: inner / fold,
        })
    }

    /// Output shape reported to graph-level shape inference.
    pub fn output_shape(&self) -> (usize, usize) {
        (self.q_len(), self.v_dim())
    }

    /// Number of words read from the output stream, i.e. the folded output
    /// shape without its lane dimension.
    pub fn number_output_values(&self) -> Result<usize> {
        let folded = self.folded_shape(TensorRole::Output)?;
        Ok(folded.outer * folded.fold)
    }
}
