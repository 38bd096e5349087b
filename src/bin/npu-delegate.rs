//! Command line driver: lower a graph file for the generic or hardware target.
//!
//! ```text
//! npu-delegate model.graph --target generic -o model.glir --describe
//! npu-delegate model.graph --target hardware --accelerator-config npu-128 -o model.bin
//! ```
//!
//! Set `NPU_DELEGATE_VERBOSE=1` (or `RUST_LOG`) for pipeline logging.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};

use npu_delegate::hardware::CommandCompiler;
use npu_delegate::spec::DEFAULT_CONFIG_PATH;
use npu_delegate::{
    Artifact, BackendKind, BackendSelector, ChainedHardwareBackend, CompileSpecBuilder, Delegator,
    GenericLoweringBackend, Graph, HardwareTarget,
};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Target {
    Generic,
    Hardware,
}

#[derive(Parser)]
#[command(
    name = "npu-delegate",
    about = "Lower a partitioned graph to the generic artifact or an NPU binary",
    version
)]
struct Cli {
    /// Graph in text form
    graph: PathBuf,

    #[arg(long, value_enum, default_value = "generic")]
    target: Target,

    /// Accelerator configuration (hardware target)
    #[arg(long, default_value = "npu-128")]
    accelerator_config: String,

    /// Compiler configuration file (hardware target)
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config_path: String,

    #[arg(long)]
    system_config: Option<String>,

    #[arg(long)]
    memory_mode: Option<String>,

    /// Extra flags passed verbatim to the native compiler
    #[arg(long)]
    extra_flags: Option<String>,

    /// Directory for intermediate artifacts and failure dumps
    #[arg(long)]
    dump_dir: Option<PathBuf>,

    /// Permute rank-4 tensors to channels-last
    #[arg(long)]
    permute_nhwc: bool,

    #[arg(long)]
    quantize_io: bool,

    /// Native compiler executable
    #[arg(long, default_value = npu_delegate::hardware::DEFAULT_PROGRAM)]
    compiler: PathBuf,

    /// Where to write the produced bytes
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the records of the generic artifact
    #[arg(long)]
    describe: bool,
}

fn init_logging() {
    let default_filter = match std::env::var("NPU_DELEGATE_VERBOSE") {
        Ok(value) if value == "1" => "info",
        _ => "warn",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let text = fs::read_to_string(&cli.graph)?;
    let graph = Graph::parse(&text)?;

    let builder = match cli.target {
        Target::Generic => CompileSpecBuilder::new().generic_output()?,
        Target::Hardware => {
            let mut target = HardwareTarget::new(&cli.accelerator_config)
                .config_path(&cli.config_path);
            if let Some(system_config) = &cli.system_config {
                target = target.system_config(system_config);
            }
            if let Some(memory_mode) = &cli.memory_mode {
                target = target.memory_mode(memory_mode);
            }
            if let Some(extra) = &cli.extra_flags {
                target = target.extra_flags(extra);
            }
            CompileSpecBuilder::new().hardware_output(target)?
        }
    };
    let mut builder = builder
        .layout_permute(cli.permute_nhwc)
        .quantize_io(cli.quantize_io);
    if let Some(dir) = &cli.dump_dir {
        builder = builder.intermediate_dump_path(dir);
    }
    let compile_spec = builder.build();

    let request = BackendSelector::default().resolve(compile_spec)?;
    let delegator = Delegator::new(
        GenericLoweringBackend::default(),
        ChainedHardwareBackend::with_compiler(Box::new(CommandCompiler::new(&cli.compiler))),
    );
    let (result, generic_bytes) = match request.backend {
        BackendKind::GenericLowering => {
            let result = delegator.generic().preprocess(&graph, &request.compile_spec)?;
            let generic_bytes = result.processed_bytes.clone();
            (result, generic_bytes)
        }
        BackendKind::ChainedHardware => {
            let stages = delegator
                .hardware()
                .preprocess_stages(&graph, &request.compile_spec)?;
            (stages.binary, stages.intermediate.processed_bytes)
        }
    };

    if cli.describe {
        let artifact = Artifact::decode(&generic_bytes)?;
        println!("{} (artifact v{})", request.backend_identifier(), artifact.version);
        for (i, record) in artifact.records.iter().enumerate() {
            println!("  [{i}] {}", serde_json::to_string(record)?);
        }
    }

    match &cli.output {
        Some(path) => fs::write(path, &result.processed_bytes)?,
        None => println!(
            "{} produced {} bytes",
            request.backend_identifier(),
            result.processed_bytes.len()
        ),
    }
    Ok(())
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
