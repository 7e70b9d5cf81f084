use std::path::Path;

use datatype::DataType;

use crate::core::{OperatorConfig, Result, TensorRole};

const SHAPE_CONSTANT: &str = "static constexpr std::size_t";

/// Arguments of `ScaledDotProductAttention` in declaration order.
const ATTENTION_TEMPLATE_ARGS: [&str; 19] = [
    "QKDim",
    "QLen",
    "VDim",
    "KVLen",
    "EmbFold",
    "SeqFold",
    "QType",
    "KType",
    "VType",
    "MType",
    "AType",
    "OType",
    "AccQKMatMul",
    "OutQKMatMul",
    "ActQKMatMul",
    "AccAVMatMul",
    // The second multiplication writes the operator output directly.
    "OType",
    "ActAVMatMul",
    "ActASoftmax",
];

const STREAM_ALIASES: [TensorRole; 5] = [
    TensorRole::Query,
    TensorRole::Key,
    TensorRole::Value,
    TensorRole::Output,
    TensorRole::Mask,
];

/// Streams on the top-level interface: the graph inputs followed by the output.
fn interface_roles(config: &OperatorConfig) -> Vec<TensorRole> {
    let mut roles = config.input_roles();
    roles.push(TensorRole::Output);
    roles
}

fn type_alias(name: &str, datatype: DataType) -> String {
    format!("using {name} = {};", datatype.hls_type())
}

pub(super) fn globals() -> Vec<String> {
    vec![
        "#include \"activations.hpp\"".to_string(),
        "#include \"attention.hpp\"".to_string(),
    ]
}

pub(super) fn defines(config: &OperatorConfig) -> Vec<String> {
    let mut lines: Vec<String> = [
        ("QKDim", config.qk_dim()),
        ("QLen", config.q_len()),
        ("VDim", config.v_dim()),
        ("KVLen", config.kv_len()),
        ("EmbFold", config.emb_fold()),
        ("SeqFold", config.seq_fold()),
    ]
    .into_iter()
    .map(|(name, value)| format!("{SHAPE_CONSTANT} {name} = {value};"))
    .collect();

    lines.extend(
        TensorRole::ALL
            .into_iter()
            .map(|role| type_alias(&role.type_alias(), config.datatype(role))),
    );

    let qk = config.qk_matmul();
    let av = config.av_matmul();
    lines.push(type_alias("AccQKMatMul", qk.accumulator));
    lines.push(type_alias("OutQKMatMul", qk.output));
    lines.push(type_alias("AccAVMatMul", av.accumulator));
    lines.push(type_alias("OutAVMatMul", av.output));
    if av.output != config.datatype(TensorRole::Output) {
        log::warn!(
            "attention::codegen OutAVMatMul {} differs from OType {}; the operator uses OType",
            av.output,
            config.datatype(TensorRole::Output)
        );
    }

    lines.push(format!(
        "using ActQKMatMul = {};",
        qk.activation.render("AccQKMatMul")
    ));
    lines.push(format!(
        "using ActAVMatMul = {};",
        av.activation.render("AccAVMatMul")
    ));
    lines.push(format!(
        "using ActASoftmax = {};",
        config.softmax_activation().render("OutQKMatMul")
    ));

    lines.push("using Attention = ScaledDotProductAttention<".to_string());
    let last = ATTENTION_TEMPLATE_ARGS.len() - 1;
    for (index, arg) in ATTENTION_TEMPLATE_ARGS.iter().enumerate() {
        let separator = if index == last { "" } else { "," };
        lines.push(format!("    {arg}{separator}"));
    }
    lines.push(">;".to_string());

    lines.extend(STREAM_ALIASES.into_iter().map(|role| {
        let alias = role.stream_alias();
        format!("using {alias} = Attention::{alias};")
    }));
    lines
}

pub(super) fn read_npy_data(config: &OperatorConfig, code_gen_dir: &Path) -> Vec<String> {
    let dir = code_gen_dir.display();
    let mut lines = Vec::new();
    for role in config.input_roles() {
        let prefix = role.prefix();
        let stream = role.stream_name();
        lines.push(format!(
            "using {prefix}Packed = decltype({prefix}Stream{{}}.read());"
        ));
        lines.push(format!(
            "npy2apintstream<{prefix}Packed, {prefix}Type, {prefix}Type::width, float>("
        ));
        lines.push(format!("  \"{dir}/{stream}.npy\", {stream}, false"));
        lines.push(");".to_string());
    }
    lines
}

pub(super) fn stream_declarations(config: &OperatorConfig) -> Vec<String> {
    // Output before the optional mask, matching the alias order.
    let mut roles = vec![
        TensorRole::Query,
        TensorRole::Key,
        TensorRole::Value,
        TensorRole::Output,
    ];
    if config.mask_mode().is_input() {
        roles.push(TensorRole::Mask);
    }
    roles
        .into_iter()
        .map(|role| format!("{} {};", role.stream_alias(), role.stream_name()))
        .collect()
}

pub(super) fn docompute(config: &OperatorConfig) -> Vec<String> {
    let inputs = config
        .input_roles()
        .into_iter()
        .map(|role| role.stream_name())
        .collect::<Vec<_>>()
        .join(", ");
    vec![
        format!("Attention attention({inputs});"),
        "for(std::size_t i = 0; i < QLen * EmbFold; ++i) {".to_string(),
        "    out.write(attention.out.read());".to_string(),
        "}".to_string(),
    ]
}

pub(super) fn data_out_stream(config: &OperatorConfig, code_gen_dir: &Path) -> Result<Vec<String>> {
    let shape = config
        .folded_shape(TensorRole::Output)?
        .dims()
        .iter()
        .map(|dim| dim.to_string())
        .collect::<Vec<_>>()
        .join(",");
    let dir = code_gen_dir.display();
    Ok(vec![
        "using OPacked = decltype(OStream{}.read());".to_string(),
        "apintstream2npy<OPacked, OType, OType::width, float>(".to_string(),
        format!("  out, {{{shape}}}, \"{dir}/out.npy\", false"),
        ");".to_string(),
    ])
}

pub(super) fn blackbox_function(config: &OperatorConfig, node_name: &str) -> Vec<String> {
    let params = interface_roles(config)
        .into_iter()
        .map(|role| format!("{} &{}", role.stream_alias(), role.stream_name()))
        .collect::<Vec<_>>()
        .join(", ");
    vec![
        format!("void {node_name} ("),
        format!("    {params}"),
        ")".to_string(),
    ]
}

pub(super) fn pragmas(config: &OperatorConfig) -> Vec<String> {
    let mut lines: Vec<String> = interface_roles(config)
        .into_iter()
        .map(|role| format!("#pragma HLS INTERFACE axis port={}", role.stream_name()))
        .collect();
    lines.push("#pragma HLS INTERFACE ap_ctrl_none port=return".to_string());
    lines
}
