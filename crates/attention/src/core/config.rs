//! Configuration of a single-head scaled dot-product attention operator.
//!
//! [`OperatorConfig`] is the single source of truth for one operator
//! instance: the four shape parameters, the two fold factors, the mask mode,
//! one datatype per [`TensorRole`] and the intermediate datatypes of the two
//! matrix multiplications. Setters never re-validate; callers that are about
//! to emit code or execute check [`OperatorConfig::validate`] first.

use std::{fmt, str::FromStr};

use datatype::DataType;
use serde::{Deserialize, Serialize};

use super::errors::{AttentionError, Result};

/// Unfolded problem size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shapes {
    /// Embedding dimension shared by queries and keys.
    pub qk_dim: usize,
    /// Length of the query sequence. Never folded.
    pub q_len: usize,
    /// Embedding dimension of the values and the output.
    pub v_dim: usize,
    /// Length of the key and value sequence.
    pub kv_len: usize,
}

/// Sequential reuse applied along the embedding and sequence axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Folds {
    pub emb_fold: usize,
    pub seq_fold: usize,
}

/// How the attention mask enters the computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaskMode {
    /// No mask at all.
    #[default]
    None,
    /// Mask streamed in as the fourth operator input.
    Input,
    /// Causal mask generated by the operator itself.
    Causal,
}

impl MaskMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MaskMode::None => "none",
            MaskMode::Input => "input",
            MaskMode::Causal => "causal",
        }
    }

    /// Whether the mask role takes part in shape and width derivations.
    pub fn has_mask(&self) -> bool {
        !matches!(self, MaskMode::None)
    }

    /// Whether the mask is a graph input of its own.
    pub fn is_input(&self) -> bool {
        matches!(self, MaskMode::Input)
    }
}

impl FromStr for MaskMode {
    type Err = AttentionError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(MaskMode::None),
            "input" => Ok(MaskMode::Input),
            "causal" => Ok(MaskMode::Causal),
            other => Err(AttentionError::invalid_config(
                "mask_mode",
                format!("'{other}' is not one of none, input, causal"),
            )),
        }
    }
}

impl fmt::Display for MaskMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named tensor position in the attention computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TensorRole {
    Query,
    Key,
    Value,
    Mask,
    AttentionWeights,
    Output,
}

impl TensorRole {
    /// All roles in canonical template order.
    pub const ALL: [TensorRole; 6] = [
        TensorRole::Query,
        TensorRole::Key,
        TensorRole::Value,
        TensorRole::Mask,
        TensorRole::AttentionWeights,
        TensorRole::Output,
    ];

    /// Single-letter prefix used by the generated type aliases.
    pub fn prefix(&self) -> &'static str {
        match self {
            TensorRole::Query => "Q",
            TensorRole::Key => "K",
            TensorRole::Value => "V",
            TensorRole::Mask => "M",
            TensorRole::AttentionWeights => "A",
            TensorRole::Output => "O",
        }
    }

    /// Name of the datatype alias, e.g. `QType`.
    pub fn type_alias(&self) -> String {
        format!("{}Type", self.prefix())
    }

    /// Name of the stream type alias, e.g. `QStream`.
    pub fn stream_alias(&self) -> String {
        format!("{}Stream", self.prefix())
    }

    /// Variable and artifact name of the role's stream.
    pub fn stream_name(&self) -> &'static str {
        match self {
            TensorRole::Query => "q",
            TensorRole::Key => "k",
            TensorRole::Value => "v",
            TensorRole::Mask => "m",
            TensorRole::AttentionWeights => "a",
            TensorRole::Output => "out",
        }
    }
}

impl fmt::Display for TensorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TensorRole::Query => "query",
            TensorRole::Key => "key",
            TensorRole::Value => "value",
            TensorRole::Mask => "mask",
            TensorRole::AttentionWeights => "attention weights",
            TensorRole::Output => "output",
        };
        f.write_str(name)
    }
}

/// Element datatype of every role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleTypes {
    pub query: DataType,
    pub key: DataType,
    pub value: DataType,
    pub mask: DataType,
    pub attention: DataType,
    pub output: DataType,
}

impl RoleTypes {
    /// Role datatypes with the default mask (`BINARY`) and attention weights
    /// (`UINT32`) datatypes.
    pub fn new(query: DataType, key: DataType, value: DataType, output: DataType) -> Self {
        Self {
            query,
            key,
            value,
            mask: DEFAULT_MASK_TYPE,
            attention: DEFAULT_INTERMEDIATE_TYPE,
            output,
        }
    }

    pub fn get(&self, role: TensorRole) -> DataType {
        match role {
            TensorRole::Query => self.query,
            TensorRole::Key => self.key,
            TensorRole::Value => self.value,
            TensorRole::Mask => self.mask,
            TensorRole::AttentionWeights => self.attention,
            TensorRole::Output => self.output,
        }
    }

    pub fn set(&mut self, role: TensorRole, datatype: DataType) {
        let slot = match role {
            TensorRole::Query => &mut self.query,
            TensorRole::Key => &mut self.key,
            TensorRole::Value => &mut self.value,
            TensorRole::Mask => &mut self.mask,
            TensorRole::AttentionWeights => &mut self.attention,
            TensorRole::Output => &mut self.output,
        };
        *slot = datatype;
    }
}

/// Default datatype of the mask elements.
pub const DEFAULT_MASK_TYPE: DataType = DataType::Binary;
/// Default datatype of attention weights, accumulators and matmul outputs.
pub const DEFAULT_INTERMEDIATE_TYPE: DataType = DataType::UInt(32);

/// Activation function applied to a matmul result or the softmax output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Activation {
    /// Forwards its input unchanged.
    #[default]
    PassThrough,
    /// Verbatim HLS activation type, e.g. a thresholding activation.
    Custom(String),
}

impl Activation {
    /// HLS type of the activation given the alias of the type it consumes.
    pub fn render(&self, input_alias: &str) -> String {
        match self {
            Activation::PassThrough => format!("PassThroughActivation<{input_alias}>"),
            Activation::Custom(hls_type) => hls_type.clone(),
        }
    }
}

impl From<String> for Activation {
    fn from(value: String) -> Self {
        match value.trim() {
            "" | "pass_through" | "PassThrough" => Activation::PassThrough,
            other => Activation::Custom(other.to_string()),
        }
    }
}

impl From<Activation> for String {
    fn from(value: Activation) -> Self {
        match value {
            Activation::PassThrough => "pass_through".to_string(),
            Activation::Custom(hls_type) => hls_type,
        }
    }
}

/// Intermediate datatypes of one matrix multiplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct MatMulTypes {
    pub accumulator: DataType,
    pub output: DataType,
    pub activation: Activation,
}

impl Default for MatMulTypes {
    fn default() -> Self {
        Self {
            accumulator: DEFAULT_INTERMEDIATE_TYPE,
            output: DEFAULT_INTERMEDIATE_TYPE,
            activation: Activation::PassThrough,
        }
    }
}

/// Complete configuration of one attention operator instance.
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorConfig {
    shapes: Shapes,
    folds: Folds,
    mask_mode: MaskMode,
    types: RoleTypes,
    qk_matmul: MatMulTypes,
    av_matmul: MatMulTypes,
    softmax_activation: Activation,
}

impl OperatorConfig {
    /// Configuration without a mask and with default intermediate datatypes.
    pub fn new(shapes: Shapes, folds: Folds, types: RoleTypes) -> Self {
        Self {
            shapes,
            folds,
            mask_mode: MaskMode::None,
            types,
            qk_matmul: MatMulTypes::default(),
            av_matmul: MatMulTypes::default(),
            softmax_activation: Activation::PassThrough,
        }
    }

    pub fn with_mask_mode(mut self, mask_mode: MaskMode) -> Self {
        self.mask_mode = mask_mode;
        self
    }

    pub fn shapes(&self) -> Shapes {
        self.shapes
    }

    pub fn folds(&self) -> Folds {
        self.folds
    }

    pub fn qk_dim(&self) -> usize {
        self.shapes.qk_dim
    }

    pub fn q_len(&self) -> usize {
        self.shapes.q_len
    }

    pub fn v_dim(&self) -> usize {
        self.shapes.v_dim
    }

    pub fn kv_len(&self) -> usize {
        self.shapes.kv_len
    }

    pub fn emb_fold(&self) -> usize {
        self.folds.emb_fold
    }

    pub fn seq_fold(&self) -> usize {
        self.folds.seq_fold
    }

    pub fn mask_mode(&self) -> MaskMode {
        self.mask_mode
    }

    pub fn role_types(&self) -> &RoleTypes {
        &self.types
    }

    pub fn datatype(&self, role: TensorRole) -> DataType {
        self.types.get(role)
    }

    pub fn qk_matmul(&self) -> &MatMulTypes {
        &self.qk_matmul
    }

    pub fn av_matmul(&self) -> &MatMulTypes {
        &self.av_matmul
    }

    pub fn softmax_activation(&self) -> &Activation {
        &self.softmax_activation
    }

    pub fn set_shapes(&mut self, shapes: Shapes) {
        self.shapes = shapes;
    }

    pub fn set_folds(&mut self, folds: Folds) {
        self.folds = folds;
    }

    pub fn set_qk_dim(&mut self, qk_dim: usize) {
        self.shapes.qk_dim = qk_dim;
    }

    pub fn set_q_len(&mut self, q_len: usize) {
        self.shapes.q_len = q_len;
    }

    pub fn set_v_dim(&mut self, v_dim: usize) {
        self.shapes.v_dim = v_dim;
    }

    pub fn set_kv_len(&mut self, kv_len: usize) {
        self.shapes.kv_len = kv_len;
    }

    pub fn set_emb_fold(&mut self, emb_fold: usize) {
        self.folds.emb_fold = emb_fold;
    }

    pub fn set_seq_fold(&mut self, seq_fold: usize) {
        self.folds.seq_fold = seq_fold;
    }

    pub fn set_mask_mode(&mut self, mask_mode: MaskMode) {
        self.mask_mode = mask_mode;
    }

    pub fn set_datatype(&mut self, role: TensorRole, datatype: DataType) {
        self.types.set(role, datatype);
    }

    pub fn set_qk_matmul(&mut self, types: MatMulTypes) {
        self.qk_matmul = types;
    }

    pub fn set_av_matmul(&mut self, types: MatMulTypes) {
        self.av_matmul = types;
    }

    pub fn set_softmax_activation(&mut self, activation: Activation) {
        self.softmax_activation = activation;
    }

    pub(crate) fn qk_matmul_mut(&mut self) -> &mut MatMulTypes {
        &mut self.qk_matmul
    }

    pub(crate) fn av_matmul_mut(&mut self) -> &mut MatMulTypes {
        &mut self.av_matmul
    }

    /// Whether every fold factor evenly divides the dimension it folds.
    ///
    /// `q_len` is never folded and therefore not part of the predicate.
    pub fn is_valid_folding(&self) -> bool {
        !self
            .problems()
            .iter()
            .any(|problem| matches!(problem, AttentionError::InvalidFolding { .. }))
    }

    /// Every shape and folding problem of the configuration, in field order.
    pub fn problems(&self) -> Vec<AttentionError> {
        let Shapes {
            qk_dim,
            q_len,
            v_dim,
            kv_len,
        } = self.shapes;
        let mut problems = Vec::new();
        for (field, value) in [
            ("qk_dim", qk_dim),
            ("q_len", q_len),
            ("v_dim", v_dim),
            ("kv_len", kv_len),
        ] {
            if value == 0 {
                problems.push(AttentionError::invalid_config(
                    field,
                    "must be greater than zero",
                ));
            }
        }

        let Folds { emb_fold, seq_fold } = self.folds;
        let folded: [(&'static str, usize, &[(&str, usize)]); 2] = [
            ("emb_fold", emb_fold, &[("qk_dim", qk_dim), ("v_dim", v_dim)]),
            ("seq_fold", seq_fold, &[("kv_len", kv_len)]),
        ];
        for (fold_field, fold, dims) in folded {
            for &(dim_field, dim) in dims {
                if let Err(err) = check_fold(fold_field, fold, dim_field, dim) {
                    problems.push(err);
                    // a zero fold is reported once
                    if fold == 0 {
                        break;
                    }
                }
            }
        }
        problems
    }

    /// Checks the configuration before emission or execution, naming the
    /// first offending field.
    pub fn validate(&self) -> Result<()> {
        match self.problems().into_iter().next() {
            Some(problem) => Err(problem),
            None => Ok(()),
        }
    }

    /// Roles that have a shape under the current mask mode.
    pub fn has_role(&self, role: TensorRole) -> bool {
        role != TensorRole::Mask || self.mask_mode.has_mask()
    }

    /// Roles streamed into the operator, in graph input order.
    pub fn input_roles(&self) -> Vec<TensorRole> {
        let mut roles = vec![TensorRole::Query, TensorRole::Key, TensorRole::Value];
        if self.mask_mode.is_input() {
            roles.push(TensorRole::Mask);
        }
        roles
    }

    pub(crate) fn require_role(&self, role: TensorRole) -> Result<()> {
        if self.has_role(role) {
            Ok(())
        } else {
            Err(AttentionError::InvalidRole {
                role,
                mask_mode: self.mask_mode,
            })
        }
    }
}

pub(crate) fn check_fold(
    fold_field: &'static str,
    fold: usize,
    dim_field: &str,
    dim: usize,
) -> Result<()> {
    if fold == 0 {
        return Err(AttentionError::InvalidFolding {
            field: fold_field,
            message: "fold factor must be greater than zero".to_string(),
        });
    }
    if dim % fold != 0 {
        return Err(AttentionError::InvalidFolding {
            field: fold_field,
            message: format!("{fold_field} {fold} does not divide {dim_field} {dim}"),
        });
    }
    Ok(())
}
