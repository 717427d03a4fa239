use anyhow::{Context, Result};
use aq_vm::{disassemble_module, Module, VmConfig, VM};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{debug, error};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// AQ - bytecode virtual machine
#[derive(Parser)]
#[command(name = "aq")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Runs compiled AQ bytecode modules", long_about = "AQ Virtual Machine\n\nLoads a compiled .aqbc module, links the modules it names on demand\nand runs its top-level entry method.")]
#[command(author = "AQ Team")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a compiled module
    Run {
        /// Path to the module file
        file: PathBuf,
        /// Print the disassembled module instead of running it
        #[arg(long)]
        disassemble: bool,
        /// JSON file with VM settings
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
        /// Directory `~file~class` modules are read from (default: the
        /// directory of FILE)
        #[arg(long, value_name = "DIR")]
        module_dir: Option<PathBuf>,
        /// Deepest allowed call nesting
        #[arg(long, value_name = "N")]
        max_call_depth: Option<usize>,
        /// Log loading and linking at debug level
        #[arg(short, long)]
        verbose: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            disassemble,
            config,
            module_dir,
            max_call_depth,
            verbose,
        } => {
            init_tracing(verbose);
            let options = RunOptions {
                config,
                module_dir,
                max_call_depth,
            };
            let result = if disassemble {
                disassemble_command(&file)
            } else {
                run_file(&file, &options)
            };
            if let Err(err) = result {
                error!("{:#}", err);
                eprintln!("Error: {:?}", err);
                std::process::exit(1);
            }
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "aq=warn,aq_vm=warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Command line overrides of [`VmConfig`]
struct RunOptions {
    config: Option<PathBuf>,
    module_dir: Option<PathBuf>,
    max_call_depth: Option<usize>,
}

/// Defaults, then the config file, then flags
fn build_config(file: &Path, options: &RunOptions) -> Result<VmConfig> {
    let mut config = match &options.config {
        Some(path) => VmConfig::from_file(path)
            .with_context(|| format!("failed to read config {}", path.display()))?,
        None => VmConfig {
            module_dir: module_dir_of(file),
            ..VmConfig::default()
        },
    };
    if let Some(dir) = &options.module_dir {
        config.module_dir = dir.clone();
    }
    if let Some(depth) = options.max_call_depth {
        config.max_call_depth = depth;
    }
    Ok(config)
}

fn module_dir_of(file: &Path) -> PathBuf {
    match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn run_file(file: &Path, options: &RunOptions) -> Result<()> {
    let bytes = std::fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    let config = build_config(file, options)?;
    debug!(module_dir = %config.module_dir.display(), max_call_depth = config.max_call_depth, "vm config");

    let mut vm = VM::with_config(config);
    vm.run(&bytes)
        .with_context(|| format!("failed to run {}", file.display()))?;

    for warning in vm.take_warnings() {
        debug!(%warning, "warning during run");
    }
    Ok(())
}

fn disassemble_command(file: &Path) -> Result<()> {
    let bytes = std::fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    let module = Module::decode(&bytes).with_context(|| format!("failed to decode {}", file.display()))?;
    print!("{}", disassemble_module(&module));
    Ok(())
}
