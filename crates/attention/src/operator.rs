//! A scaled dot-product attention node as it sits in a dataflow graph.

use std::path::{Path, PathBuf};

use candle_core::Tensor;

use crate::codegen::GeneratedCode;
use crate::core::{AttentionError, MaskMode, OperatorConfig, Result, TensorRole};
use crate::execution::{
    clear_output, read_output, write_folded_input, ExecutionMode, PrecompiledSimulator,
    ProcessSimulator,
};
use crate::interop::{infer_node_datatype, DatatypeDrift, ExecutionContext, ModelGraph};
use crate::masks::build_causal_mask;
use crate::reference::ExactAttention;

/// Operator node: graph wiring plus the configuration it owns.
#[derive(Debug, Clone)]
pub struct ScaledDotProductAttention {
    name: String,
    inputs: Vec<String>,
    output: String,
    code_gen_dir: Option<PathBuf>,
    config: OperatorConfig,
}

impl ScaledDotProductAttention {
    /// `inputs` names the query, key and value tensors, followed by the mask
    /// tensor when the mask is an operator input.
    pub fn new(
        name: impl Into<String>,
        inputs: Vec<String>,
        output: impl Into<String>,
        config: OperatorConfig,
    ) -> Self {
        Self {
            name: name.into(),
            inputs,
            output: output.into(),
            code_gen_dir: None,
            config,
        }
    }

    pub fn with_code_gen_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.code_gen_dir = Some(dir.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn code_gen_dir(&self) -> Option<&Path> {
        self.code_gen_dir.as_deref()
    }

    pub fn set_code_gen_dir(&mut self, dir: Option<PathBuf>) {
        self.code_gen_dir = dir;
    }

    pub fn config(&self) -> &OperatorConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut OperatorConfig {
        &mut self.config
    }

    fn require_code_gen_dir(&self) -> Result<&Path> {
        self.code_gen_dir().ok_or_else(|| {
            AttentionError::invalid_config(
                "code_gen_dir",
                format!("node {} has no code generation directory", self.name),
            )
        })
    }

    /// Input tensor names paired with the roles they feed.
    fn input_bindings(&self) -> Result<Vec<(TensorRole, &str)>> {
        let roles = self.config.input_roles();
        if self.inputs.len() < roles.len() {
            return Err(AttentionError::invalid_config(
                "inputs",
                format!(
                    "node {} has {} inputs but mask mode '{}' needs {}",
                    self.name,
                    self.inputs.len(),
                    self.config.mask_mode(),
                    roles.len()
                ),
            ));
        }
        Ok(roles
            .into_iter()
            .zip(self.inputs.iter().map(String::as_str))
            .collect())
    }

    /// Adopts the graph's input datatypes and annotates the output tensor.
    pub fn infer_node_datatype<G: ModelGraph + ?Sized>(
        &mut self,
        graph: &mut G,
    ) -> Result<Vec<DatatypeDrift>> {
        infer_node_datatype(
            &mut self.config,
            &self.name,
            &self.inputs,
            &self.output,
            graph,
        )
    }

    /// Renders the HLS fragments of this node.
    pub fn generate_code(&self) -> Result<GeneratedCode> {
        let dir = self.require_code_gen_dir()?;
        self.config.generate_code(&self.name, dir)
    }

    /// Executes the node, running precompiled simulations as a child process.
    pub fn execute(&self, ctx: &mut ExecutionContext, mode: &str) -> Result<()> {
        self.execute_with(ctx, mode, &ProcessSimulator::default())
    }

    /// Executes the node in `mode`, binding the output tensor in `ctx` on
    /// success. Nothing is bound when any step fails.
    pub fn execute_with(
        &self,
        ctx: &mut ExecutionContext,
        mode: &str,
        simulator: &dyn PrecompiledSimulator,
    ) -> Result<()> {
        let mode: ExecutionMode = mode.parse()?;
        self.config.validate()?;
        let bindings = self.input_bindings()?;
        log::info!(
            "attention::operator executing {} in {mode} mode (mask {})",
            self.name,
            self.config.mask_mode()
        );

        let output = match mode {
            ExecutionMode::Reference => self.execute_reference(ctx, &bindings)?,
            ExecutionMode::Precompiled => self.execute_precompiled(ctx, &bindings, simulator)?,
            ExecutionMode::HardwareSim => {
                return Err(AttentionError::NotImplemented {
                    mode: ExecutionMode::HardwareSim.as_str(),
                })
            }
        };
        ctx.insert(self.output.clone(), output);
        Ok(())
    }

    /// Fetches a role's tensor and brings it to the role's normal shape.
    ///
    /// Leading unit dimensions are dropped; the trailing two must match
    /// `[outer, inner]` exactly.
    fn input_tensor(
        &self,
        ctx: &ExecutionContext,
        role: TensorRole,
        tensor_name: &str,
    ) -> Result<Tensor> {
        let tensor = ctx.get(tensor_name)?;
        let (outer, inner) = self.config.normal_shape(role)?;
        let dims = tensor.dims();
        let batch = dims.len().saturating_sub(2);
        let matches = dims.len() >= 2
            && dims[..batch].iter().all(|&d| d == 1)
            && dims[batch..] == [outer, inner];
        if !matches {
            return Err(AttentionError::InvalidShape {
                context: format!(
                    "{role} input {tensor_name} has shape {dims:?}, expected [{outer}, {inner}]"
                ),
            });
        }
        Ok(tensor.reshape((outer, inner))?)
    }

    fn input_tensors(
        &self,
        ctx: &ExecutionContext,
        bindings: &[(TensorRole, &str)],
    ) -> Result<Vec<Tensor>> {
        bindings
            .iter()
            .map(|(role, name)| self.input_tensor(ctx, *role, name))
            .collect()
    }

    fn execute_reference(
        &self,
        ctx: &ExecutionContext,
        bindings: &[(TensorRole, &str)],
    ) -> Result<Tensor> {
        let tensors = self.input_tensors(ctx, bindings)?;
        let (q, k, v) = (&tensors[0], &tensors[1], &tensors[2]);

        let mask = match self.config.mask_mode() {
            MaskMode::None => None,
            MaskMode::Input => tensors.get(3).cloned(),
            MaskMode::Causal => Some(build_causal_mask(
                q.device(),
                self.config.q_len(),
                self.config.kv_len(),
            )?),
        };
        ExactAttention::new().attend(q, k, v, mask.as_ref())
    }

    fn execute_precompiled(
        &self,
        ctx: &ExecutionContext,
        bindings: &[(TensorRole, &str)],
        simulator: &dyn PrecompiledSimulator,
    ) -> Result<Tensor> {
        let dir = self.require_code_gen_dir()?;
        let tensors = self.input_tensors(ctx, bindings)?;
        let folded = bindings
            .iter()
            .map(|(role, _)| self.config.folded_shape(*role))
            .collect::<Result<Vec<_>>>()?;

        for (((role, _), tensor), folded) in bindings.iter().zip(&tensors).zip(folded) {
            write_folded_input(dir, role.stream_name(), tensor, folded)?;
        }
        clear_output(dir)?;
        simulator.run(dir)?;
        read_output(dir, self.config.normal_shape(TensorRole::Output)?)
    }
}
