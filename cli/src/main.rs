use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{anyhow, bail, Context, Result};
use attention::{
    codegen::Fragment,
    interop::{ExecutionContext, InMemoryGraph, ModelGraph},
    OperatorDescriptor, ScaledDotProductAttention, TensorRole,
};
use candle_core::Tensor;
use clap::{Parser, Subcommand};
use datatype::DataType;

fn main() {
    if let Err(err) = run() {
        eprintln!("sdpa-hls failed: {err:#}");
        std::process::exit(1);
    }
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Configure, inspect and emit scaled dot-product attention operators",
    long_about = None
)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print shapes, stream widths and resource figures of an operator.
    Inspect {
        #[arg(value_name = "PATH", help = "Operator descriptor (TOML or JSON)")]
        descriptor: PathBuf,

        #[arg(
            long = "observed",
            value_name = "TENSOR=DTYPE",
            help = "Datatype annotated on a graph tensor, reconciled before inspection"
        )]
        observed: Vec<ObservedArg>,

        #[arg(long, help = "Minimize accumulator widths before inspection")]
        minimize: bool,
    },
    /// Render the HLS fragments of an operator.
    Emit {
        #[arg(value_name = "PATH", help = "Operator descriptor (TOML or JSON)")]
        descriptor: PathBuf,

        #[arg(long, value_name = "DIR", help = "Override the code generation directory")]
        code_gen_dir: Option<PathBuf>,

        #[arg(long, help = "Minimize accumulator widths before emission")]
        minimize: bool,

        #[arg(
            long,
            value_name = "PATH",
            help = "Template whose placeholders are replaced by the fragments"
        )]
        template: Option<PathBuf>,

        #[arg(short, long, value_name = "PATH", help = "Write the result to a file")]
        output: Option<PathBuf>,
    },
    /// Execute an operator on `.npy` inputs named after its input tensors.
    Run {
        #[arg(value_name = "PATH", help = "Operator descriptor (TOML or JSON)")]
        descriptor: PathBuf,

        #[arg(long, default_value = "reference", help = "reference, precompiled or hardwareSim")]
        mode: String,

        #[arg(long, value_name = "DIR", help = "Directory holding <input>.npy files")]
        inputs: PathBuf,

        #[arg(long, value_name = "DIR", help = "Override the code generation directory")]
        code_gen_dir: Option<PathBuf>,

        #[arg(short, long, value_name = "PATH", help = "Where to write the output tensor")]
        output: PathBuf,
    },
}

#[derive(Debug, Clone)]
struct ObservedArg {
    tensor: String,
    datatype: DataType,
}

impl FromStr for ObservedArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (tensor, datatype) = s
            .split_once('=')
            .ok_or_else(|| "observed datatype must be in the form tensor=DTYPE".to_string())?;
        if tensor.trim().is_empty() {
            return Err("observed tensor name must not be empty".into());
        }
        let datatype = datatype.trim().parse().map_err(|err| format!("{err}"))?;
        Ok(Self {
            tensor: tensor.trim().to_string(),
            datatype,
        })
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    match args.command {
        Command::Inspect {
            descriptor,
            observed,
            minimize,
        } => inspect(&descriptor, &observed, minimize),
        Command::Emit {
            descriptor,
            code_gen_dir,
            minimize,
            template,
            output,
        } => emit(
            &descriptor,
            code_gen_dir,
            minimize,
            template.as_deref(),
            output.as_deref(),
        ),
        Command::Run {
            descriptor,
            mode,
            inputs,
            code_gen_dir,
            output,
        } => execute(&descriptor, &mode, &inputs, code_gen_dir, &output),
    }
}

fn load(path: &Path, code_gen_dir: Option<PathBuf>) -> Result<ScaledDotProductAttention> {
    let descriptor = OperatorDescriptor::from_path(path)
        .with_context(|| format!("failed to load descriptor {}", path.display()))?;
    let mut operator = descriptor.into_operator();
    if code_gen_dir.is_some() {
        operator.set_code_gen_dir(code_gen_dir);
    }
    Ok(operator)
}

fn inspect(path: &Path, observed: &[ObservedArg], minimize: bool) -> Result<()> {
    let mut operator = load(path, None)?;
    operator.config().validate()?;

    if !observed.is_empty() {
        let mut graph = InMemoryGraph::new();
        for arg in observed {
            graph.set_tensor_datatype(&arg.tensor, arg.datatype);
        }
        for drift in operator.infer_node_datatype(&mut graph)? {
            println!("warning: {drift}");
        }
    }
    if minimize {
        let widths = operator.config_mut().minimize_accumulator_width()?;
        println!("accumulators: qk {} av {}", widths.qk, widths.av);
    }

    let config = operator.config();
    println!(
        "{} (mask {}, {} inputs)",
        operator.name(),
        config.mask_mode(),
        config.input_roles().len()
    );
    println!(
        "{:<18} {:<10} {:<12} {:<14} {:>8}",
        "role", "datatype", "normal", "folded", "width"
    );
    for role in TensorRole::ALL {
        if !config.has_role(role) {
            continue;
        }
        let (outer, inner) = config.normal_shape(role)?;
        let folded = config.folded_shape(role)?;
        println!(
            "{:<18} {:<10} {:<12} {:<14} {:>8}",
            role.to_string(),
            config.datatype(role).name(),
            format!("{outer}x{inner}"),
            format!("{}x{}x{}", folded.outer, folded.fold, folded.lanes),
            config.stream_width(role)?
        );
    }
    println!("max internal width: {}", config.max_internal_width()?);
    println!("output values: {}", config.number_output_values()?);
    Ok(())
}

fn emit(
    path: &Path,
    code_gen_dir: Option<PathBuf>,
    minimize: bool,
    template: Option<&Path>,
    output: Option<&Path>,
) -> Result<()> {
    let mut operator = load(path, code_gen_dir)?;
    if minimize {
        operator.config_mut().minimize_accumulator_width()?;
    }
    let code = operator.generate_code()?;

    let rendered = match template {
        Some(template) => {
            let source = fs::read_to_string(template)
                .with_context(|| format!("failed to read template {}", template.display()))?;
            code.instantiate(&source)
        }
        None => Fragment::ALL
            .iter()
            .map(|fragment| format!("// {fragment}\n{}\n", code.render(*fragment)))
            .collect::<Vec<_>>()
            .join("\n"),
    };

    match output {
        Some(output) => fs::write(output, rendered)
            .with_context(|| format!("failed to write {}", output.display()))?,
        None => print!("{rendered}"),
    }
    Ok(())
}

fn execute(
    path: &Path,
    mode: &str,
    inputs: &Path,
    code_gen_dir: Option<PathBuf>,
    output: &Path,
) -> Result<()> {
    let operator = load(path, code_gen_dir)?;
    let mut ctx = ExecutionContext::new();
    for name in operator.inputs() {
        let file = inputs.join(format!("{name}.npy"));
        let tensor = Tensor::read_npy(&file)
            .with_context(|| format!("failed to read input {}", file.display()))?;
        ctx.insert(name.clone(), tensor);
    }

    operator.execute(&mut ctx, mode)?;

    let result = ctx
        .get(operator.output())
        .map_err(|err| anyhow!("operator produced no output: {err}"))?;
    if result.dims().len() != 2 {
        bail!("unexpected output shape {:?}", result.dims());
    }
    result
        .write_npy(output)
        .with_context(|| format!("failed to write {}", output.display()))?;
    println!("wrote {} {:?}", output.display(), result.dims());
    Ok(())
}
