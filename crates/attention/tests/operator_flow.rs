use std::cell::Cell;
use std::path::Path;

use anyhow::Result;
use attention::codegen::{Fragment, GeneratedCode};
use attention::core::{Folds, RoleTypes, Shapes};
use attention::execution::PrecompiledSimulator;
use attention::interop::{ExecutionContext, InMemoryGraph, ModelGraph};
use attention::{AttentionError, MaskMode, OperatorConfig, ScaledDotProductAttention, TensorRole};
use candle_core::{DType, Device, Tensor};
use datatype::DataType;
use static_assertions::assert_impl_all;

assert_impl_all!(OperatorConfig: Send, Sync, Clone);
assert_impl_all!(ScaledDotProductAttention: Send, Sync, Clone);
assert_impl_all!(GeneratedCode: Send, Sync);

const Q_LEN: usize = 4;
const KV_LEN: usize = 8;
const QK_DIM: usize = 16;
const V_DIM: usize = 8;

fn config(mask_mode: MaskMode) -> OperatorConfig {
    OperatorConfig::new(
        Shapes {
            qk_dim: QK_DIM,
            q_len: Q_LEN,
            v_dim: V_DIM,
            kv_len: KV_LEN,
        },
        Folds {
            emb_fold: 4,
            seq_fold: 2,
        },
        RoleTypes::new(
            DataType::UInt(4),
            DataType::UInt(4),
            DataType::UInt(4),
            DataType::UInt(16),
        ),
    )
    .with_mask_mode(mask_mode)
}

fn node(mask_mode: MaskMode) -> ScaledDotProductAttention {
    let mut inputs = vec!["q".to_string(), "k".to_string(), "v".to_string()];
    if mask_mode.is_input() {
        inputs.push("m".to_string());
    }
    ScaledDotProductAttention::new("sdpa_0", inputs, "o", config(mask_mode))
}

fn ramp(len: usize, scale: f32, shape: (usize, usize)) -> Result<Tensor> {
    let data: Vec<f32> = (0..len).map(|i| ((i % 11) as f32) * scale).collect();
    Ok(Tensor::from_vec(data, shape, &Device::Cpu)?)
}

fn context() -> Result<ExecutionContext> {
    let mut ctx = ExecutionContext::new();
    ctx.insert("q", ramp(Q_LEN * QK_DIM, 0.1, (Q_LEN, QK_DIM))?);
    ctx.insert("k", ramp(KV_LEN * QK_DIM, 0.05, (KV_LEN, QK_DIM))?);
    ctx.insert("v", ramp(KV_LEN * V_DIM, 1.0, (KV_LEN, V_DIM))?);
    Ok(ctx)
}

#[test]
fn query_stream_of_small_operator() -> Result<()> {
    let cfg = config(MaskMode::None);
    assert!(cfg.is_valid_folding());
    let folded = cfg.folded_shape(TensorRole::Query)?;
    assert_eq!(folded.lanes, 4);
    assert_eq!(cfg.stream_width(TensorRole::Query)?, 16);
    assert_eq!(cfg.number_output_values()?, Q_LEN * 4);
    Ok(())
}

#[test]
fn query_drift_is_reported_once_and_output_is_asserted() -> Result<()> {
    let mut node = node(MaskMode::None);
    let mut graph = InMemoryGraph::new()
        .with_datatype("q", DataType::UInt(16))
        .with_datatype("k", DataType::UInt(4))
        .with_datatype("v", DataType::UInt(4))
        .with_datatype("o", DataType::Int(2));

    let drifts = node.infer_node_datatype(&mut graph)?;
    assert_eq!(drifts.len(), 1);
    assert_eq!(drifts[0].role, TensorRole::Query);
    assert_eq!(drifts[0].stored, DataType::UInt(4));
    assert_eq!(drifts[0].observed, DataType::UInt(16));
    assert_eq!(
        drifts[0].to_string(),
        "QType changing for sdpa_0: UINT4 -> UINT16"
    );

    let cfg = node.config();
    assert_eq!(cfg.datatype(TensorRole::Query), DataType::UInt(16));
    assert_eq!(cfg.datatype(TensorRole::Output), DataType::UInt(16));
    assert_eq!(graph.tensor_datatype("o"), Some(DataType::UInt(16)));
    assert_eq!(cfg.stream_width(TensorRole::Query)?, 64);

    // A second pass is quiet.
    assert!(node.infer_node_datatype(&mut graph)?.is_empty());
    Ok(())
}

#[test]
fn mask_datatype_is_propagated_in_input_mode() -> Result<()> {
    let mut node = node(MaskMode::Input);
    let mut graph = InMemoryGraph::new()
        .with_datatype("q", DataType::UInt(4))
        .with_datatype("k", DataType::UInt(4))
        .with_datatype("v", DataType::UInt(4))
        .with_datatype("m", DataType::Int(8));

    let drifts = node.infer_node_datatype(&mut graph)?;
    assert_eq!(drifts.len(), 1);
    assert_eq!(drifts[0].role, TensorRole::Mask);
    assert_eq!(node.config().datatype(TensorRole::Mask), DataType::Int(8));

    let code = node
        .config()
        .generate_code(node.name(), Path::new("/tmp/sdpa_0"))?;
    assert!(code
        .get(Fragment::Defines)
        .contains(&"using MType = ap_int<8>;".to_string()));
    Ok(())
}

#[test]
fn bogus_mode_fails_before_any_work() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let node = node(MaskMode::None).with_code_gen_dir(dir.path());
    let mut ctx = context()?;

    let err = node.execute(&mut ctx, "bogus").unwrap_err();
    assert!(matches!(
        err,
        AttentionError::InvalidConfig {
            field: "exec_mode",
            ..
        }
    ));
    assert!(!ctx.contains("o"));
    assert_eq!(std::fs::read_dir(dir.path())?.count(), 0);
    Ok(())
}

#[test]
fn invalid_folding_fails_execution() -> Result<()> {
    let mut node = node(MaskMode::None);
    node.config_mut().set_seq_fold(3);
    let mut ctx = context()?;
    let err = node.execute(&mut ctx, "reference").unwrap_err();
    assert!(matches!(
        err,
        AttentionError::InvalidFolding {
            field: "seq_fold",
            ..
        }
    ));
    assert!(!ctx.contains("o"));
    Ok(())
}

#[test]
fn reference_mode_writes_output_and_no_artifacts() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let node = node(MaskMode::None).with_code_gen_dir(dir.path());
    let mut ctx = context()?;

    node.execute(&mut ctx, "reference")?;
    let out = ctx.get("o")?;
    assert_eq!(out.dims(), &[Q_LEN, V_DIM]);
    assert_eq!(out.dtype(), DType::F32);
    assert_eq!(std::fs::read_dir(dir.path())?.count(), 0);

    // Attention weights are convex: every output lies within the value range.
    let values = out.flatten_all()?.to_vec1::<f32>()?;
    assert!(values.iter().all(|x| (0.0..=10.0).contains(x)));
    Ok(())
}

#[test]
fn causal_reference_first_query_copies_first_value() -> Result<()> {
    let node = node(MaskMode::Causal);
    let mut ctx = context()?;
    node.execute(&mut ctx, "reference")?;

    let out = ctx.get("o")?.to_vec2::<f32>()?;
    let v = ctx.get("v")?.to_vec2::<f32>()?;
    for (a, b) in out[0].iter().zip(&v[0]) {
        assert!((a - b).abs() < 1e-5);
    }
    Ok(())
}

#[test]
fn zero_input_mask_matches_unmasked() -> Result<()> {
    let mut ctx = context()?;
    node(MaskMode::None).execute(&mut ctx, "reference")?;
    let unmasked = ctx.remove("o").expect("output bound");

    ctx.insert("m", Tensor::zeros((Q_LEN, KV_LEN), DType::F32, &Device::Cpu)?);
    node(MaskMode::Input).execute(&mut ctx, "reference")?;
    let masked = ctx.get("o")?;

    let diff = masked.sub(&unmasked)?.abs()?.max_all()?.to_vec0::<f32>()?;
    assert!(diff < 1e-6);
    Ok(())
}

#[test]
fn missing_input_tensor_is_reported() -> Result<()> {
    let mut ctx = context()?;
    let err = node(MaskMode::Input)
        .execute(&mut ctx, "reference")
        .unwrap_err();
    assert!(matches!(err, AttentionError::MissingTensor(name) if name == "m"));
    Ok(())
}

#[test]
fn transposed_input_is_rejected() -> Result<()> {
    let mut ctx = context()?;
    ctx.insert("q", ramp(Q_LEN * QK_DIM, 0.1, (QK_DIM, Q_LEN))?);
    let err = node(MaskMode::None)
        .execute(&mut ctx, "reference")
        .unwrap_err();
    assert!(matches!(err, AttentionError::InvalidShape { .. }), "{err}");
    assert!(!ctx.contains("o"));
    Ok(())
}

#[test]
fn leading_unit_dimensions_are_accepted() -> Result<()> {
    let mut ctx = context()?;
    node(MaskMode::None).execute(&mut ctx, "reference")?;
    let expected = ctx.remove("o").expect("output bound");

    let q = ctx.get("q")?.unsqueeze(0)?;
    ctx.insert("q", q);
    node(MaskMode::None).execute(&mut ctx, "reference")?;
    let diff = ctx.get("o")?.sub(&expected)?.abs()?.max_all()?.to_vec0::<f32>()?;
    assert!(diff < 1e-6);
    Ok(())
}

/// Stands in for the compiled simulation: checks the folded inputs and
/// writes a folded output of ones.
struct FakeSimulator {
    calls: Cell<usize>,
    write_output: bool,
}

impl FakeSimulator {
    fn new(write_output: bool) -> Self {
        Self {
            calls: Cell::new(0),
            write_output,
        }
    }
}

impl PrecompiledSimulator for FakeSimulator {
    fn run(&self, code_gen_dir: &Path) -> attention::Result<()> {
        self.calls.set(self.calls.get() + 1);
        let q = Tensor::read_npy(code_gen_dir.join("q.npy"))?;
        assert_eq!(q.dims(), &[Q_LEN, 4, QK_DIM / 4]);
        assert_eq!(q.dtype(), DType::F32);
        let v = Tensor::read_npy(code_gen_dir.join("v.npy"))?;
        assert_eq!(v.dims(), &[KV_LEN, 4, V_DIM / 4]);
        if self.write_output {
            Tensor::ones((Q_LEN, 4, V_DIM / 4), DType::F32, &Device::Cpu)?
                .write_npy(code_gen_dir.join("out.npy"))?;
        }
        Ok(())
    }
}

#[test]
fn precompiled_mode_exchanges_folded_artifacts() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let node = node(MaskMode::Input).with_code_gen_dir(dir.path());
    let mut ctx = context()?;
    ctx.insert("m", Tensor::zeros((Q_LEN, KV_LEN), DType::F32, &Device::Cpu)?);

    let simulator = FakeSimulator::new(true);
    node.execute_with(&mut ctx, "precompiled", &simulator)?;
    assert_eq!(simulator.calls.get(), 1);

    let mask = Tensor::read_npy(dir.path().join("m.npy"))?;
    assert_eq!(mask.dims(), &[Q_LEN, 2, KV_LEN / 2]);

    let out = ctx.get("o")?;
    assert_eq!(out.dims(), &[Q_LEN, V_DIM]);
    assert_eq!(out.sum_all()?.to_vec0::<f32>()?, (Q_LEN * V_DIM) as f32);
    Ok(())
}

#[test]
fn precompiled_mode_without_output_fails() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let node = node(MaskMode::None).with_code_gen_dir(dir.path());
    let mut ctx = context()?;

    let err = node
        .execute_with(&mut ctx, "precompiled", &FakeSimulator::new(false))
        .unwrap_err();
    assert!(matches!(err, AttentionError::Simulation(_)));
    assert!(!ctx.contains("o"));
    Ok(())
}

#[test]
fn stale_output_is_not_reused() -> Result<()> {
    let dir = tempfile::tempdir()?;
    Tensor::full(42f32, (Q_LEN, 4, V_DIM / 4), &Device::Cpu)?
        .write_npy(dir.path().join("out.npy"))?;
    let node = node(MaskMode::None).with_code_gen_dir(dir.path());
    let mut ctx = context()?;

    let err = node
        .execute_with(&mut ctx, "precompiled", &FakeSimulator::new(false))
        .unwrap_err();
    assert!(matches!(err, AttentionError::Simulation(_)));
    assert!(!ctx.contains("o"));
    assert!(!dir.path().join("out.npy").exists());
    Ok(())
}

#[test]
fn failed_input_lookup_writes_no_artifacts() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let node = node(MaskMode::Input).with_code_gen_dir(dir.path());
    let mut ctx = context()?;
    let simulator = FakeSimulator::new(true);

    let err = node
        .execute_with(&mut ctx, "precompiled", &simulator)
        .unwrap_err();
    assert!(matches!(err, AttentionError::MissingTensor(name) if name == "m"));
    assert_eq!(std::fs::read_dir(dir.path())?.count(), 0);
    assert_eq!(simulator.calls.get(), 0);
    Ok(())
}

#[test]
fn precompiled_mode_needs_code_gen_dir() -> Result<()> {
    let mut ctx = context()?;
    let simulator = FakeSimulator::new(true);
    let err = node(MaskMode::None)
        .execute_with(&mut ctx, "precompiled", &simulator)
        .unwrap_err();
    assert!(matches!(
        err,
        AttentionError::InvalidConfig {
            field: "code_gen_dir",
            ..
        }
    ));
    assert_eq!(simulator.calls.get(), 0);
    Ok(())
}

#[test]
fn generated_code_instantiates_a_template() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut node = node(MaskMode::Causal).with_code_gen_dir(dir.path());
    node.config_mut().minimize_accumulator_width()?;

    let template = "$GLOBALS$\n$DEFINES$\nint main() {\n$STREAMDECLARATIONS$\n$READNPYDATA$\n$DOCOMPUTE$\n$DATAOUTSTREAM$\n$SAVEASCNPY$\n}\n$BLACKBOXFUNCTION$ {\n$PRAGMAS$\n$DOCOMPUTE$\n}\n";
    let source = node.generate_code()?.instantiate(template);

    assert!(!source.contains('$'));
    // 16 * 15 * 15 = 3600, bound 3601.
    assert!(source.contains("using AccQKMatMul = ap_uint<13>;"));
    assert!(source.contains("void sdpa_0 ("));
    assert!(source.contains(&format!("\"{}/q.npy\"", dir.path().display())));
    assert!(!source.contains("m.npy"));
    assert_eq!(source.matches("Attention attention(q, k, v);").count(), 2);
    Ok(())
}
