//! File-based description of an attention node.
//!
//! A descriptor is the serialized form of one [`ScaledDotProductAttention`]
//! node: its graph wiring, shapes, folds, datatypes and matmul intermediates.
//! It is read from TOML or JSON, chosen by file extension:
//!
//! ```toml
//! name = "sdpa_0"
//! inputs = ["q", "k", "v"]
//! output = "out"
//! mask_mode = "causal"
//!
//! [shapes]
//! qk_dim = 64
//! q_len = 16
//! v_dim = 64
//! kv_len = 16
//!
//! [folds]
//! emb_fold = 8
//! seq_fold = 4
//!
//! [types]
//! query = "UINT8"
//! key = "UINT8"
//! value = "UINT8"
//! output = "UINT32"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use datatype::DataType;
use serde::{Deserialize, Serialize};

use crate::core::{
    Activation, AttentionError, Folds, MaskMode, MatMulTypes, OperatorConfig, Result, RoleTypes,
    Shapes, DEFAULT_INTERMEDIATE_TYPE, DEFAULT_MASK_TYPE,
};
use crate::operator::ScaledDotProductAttention;

/// Role datatypes as written in a descriptor; mask and attention weights
/// fall back to their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorTypes {
    pub query: DataType,
    pub key: DataType,
    pub value: DataType,
    pub output: DataType,
    #[serde(default)]
    pub mask: Option<DataType>,
    #[serde(default)]
    pub attention: Option<DataType>,
}

impl From<&DescriptorTypes> for RoleTypes {
    fn from(types: &DescriptorTypes) -> Self {
        RoleTypes {
            query: types.query,
            key: types.key,
            value: types.value,
            mask: types.mask.unwrap_or(DEFAULT_MASK_TYPE),
            attention: types.attention.unwrap_or(DEFAULT_INTERMEDIATE_TYPE),
            output: types.output,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorDescriptor {
    pub name: String,
    pub inputs: Vec<String>,
    pub output: String,
    #[serde(default)]
    pub code_gen_dir: Option<PathBuf>,
    #[serde(default)]
    pub mask_mode: MaskMode,
    pub shapes: Shapes,
    pub folds: Folds,
    pub types: DescriptorTypes,
    #[serde(default)]
    pub qk_matmul: MatMulTypes,
    #[serde(default)]
    pub av_matmul: MatMulTypes,
    #[serde(default)]
    pub softmax_activation: Activation,
}

impl OperatorDescriptor {
    /// Loads and validates a descriptor.
    ///
    /// A relative `code_gen_dir` is resolved against the descriptor's
    /// directory.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let mut descriptor: OperatorDescriptor =
            match path.extension().and_then(|ext| ext.to_str()) {
                Some("json") => serde_json::from_str(&contents)?,
                Some("toml") | None => toml::from_str(&contents)?,
                Some(other) => {
                    return Err(AttentionError::ConfigFormat(format!(
                        "unsupported descriptor extension '{other}'"
                    )));
                }
            };

        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        descriptor.apply_base_path(base_dir);
        descriptor.validate()?;
        log::debug!(
            "attention::descriptor loaded {} from {}",
            descriptor.name,
            path.display()
        );
        Ok(descriptor)
    }

    fn apply_base_path(&mut self, base: &Path) {
        if let Some(dir) = &self.code_gen_dir {
            if dir.is_relative() {
                self.code_gen_dir = Some(base.join(dir));
            }
        }
    }

    /// Configuration described by this descriptor, without validation.
    pub fn operator_config(&self) -> OperatorConfig {
        let mut config = OperatorConfig::new(self.shapes, self.folds, (&self.types).into())
            .with_mask_mode(self.mask_mode);
        config.set_qk_matmul(self.qk_matmul.clone());
        config.set_av_matmul(self.av_matmul.clone());
        config.set_softmax_activation(self.softmax_activation.clone());
        config
    }

    /// Reports every problem at once.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.name.trim().is_empty() {
            errors.push("name must not be empty".to_string());
        }

        if self.output.trim().is_empty() {
            errors.push("output must not be empty".to_string());
        }

        let expected_inputs = if self.mask_mode.is_input() { 4 } else { 3 };
        if self.inputs.len() != expected_inputs {
            errors.push(format!(
                "inputs must list {expected_inputs} tensors for mask_mode '{}', got {}",
                self.mask_mode,
                self.inputs.len()
            ));
        }
        if self.inputs.iter().any(|input| input.trim().is_empty()) {
            errors.push("inputs must not contain empty names".to_string());
        }

        errors.extend(
            self.operator_config()
                .problems()
                .iter()
                .map(ToString::to_string),
        );

        if errors.is_empty() {
            Ok(())
        } else {
            Err(AttentionError::Validation(errors))
        }
    }

    /// Builds the graph node this descriptor describes.
    pub fn into_operator(self) -> ScaledDotProductAttention {
        let config = self.operator_config();
        let mut operator =
            ScaledDotProductAttention::new(self.name, self.inputs, self.output, config);
        operator.set_code_gen_dir(self.code_gen_dir);
        operator
    }
}
