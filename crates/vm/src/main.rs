//! Viper CLI
//!
//! Command-line interface for verifying, formatting, and executing IL
//! modules.

use clap::{CommandFactory, Parser as ClapParser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;
use std::path::{Path, PathBuf};
use std::process;
use viper_runtime::report::{self, ExecutionSummary};
use viper_vm::{RunConfig, Vm, VmError};

#[derive(ClapParser)]
#[command(name = "viper")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Viper IL toolchain - verify, format, and run IL modules", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify and execute an IL module's @main
    Run {
        /// Input .vil module file
        input: PathBuf,

        /// Emit a per-instruction trace (requires RUST_LOG=trace)
        #[arg(long)]
        trace: bool,

        /// Abort after this many executed instructions
        #[arg(long, value_name = "N")]
        max_steps: Option<u64>,

        /// Interpreter recursion limit in frames
        #[arg(long, value_name = "N", default_value_t = 512)]
        max_frames: usize,
    },

    /// Verify an IL module and report diagnostics
    Verify {
        /// Input .vil module files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },

    /// Parse a module and print its canonical textual form
    Fmt {
        /// Input .vil module file
        input: PathBuf,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            input,
            trace,
            max_steps,
            max_frames,
        } => run(&input, trace, max_steps, max_frames),
        Commands::Verify { inputs } => verify(&inputs),
        Commands::Fmt { input } => fmt(&input),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut io::stdout());
        }
    }
}

fn load(path: &Path) -> viper_il::Module {
    let source = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: cannot read {}: {}", path.display(), e);
            process::exit(2);
        }
    };
    match viper_il::parse_module(&source) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("error: {}: {}", path.display(), e);
            process::exit(2);
        }
    }
}

fn run(input: &Path, trace: bool, max_steps: Option<u64>, max_frames: usize) {
    let module = load(input);
    if let Err(e) = viper_il::verify_module(&module) {
        eprintln!("error: {} failed verification:", input.display());
        for note in &e.notes {
            eprintln!("  {}", note);
        }
        process::exit(2);
    }

    let config = RunConfig {
        trace,
        max_steps,
        max_frames,
    };
    let mut vm = Vm::with_config(&module, config);
    let (exit_code, trap) = match vm.run() {
        // Normal termination: the exit code is @main's value truncated
        // to the host exit-code width.
        Ok(value) => (value as i32, None),
        Err(VmError::Trap(desc)) => (1, Some(desc.to_string())),
        Err(e) => {
            eprintln!("error: {}", e);
            (2, None)
        }
    };

    report::emit(&ExecutionSummary {
        instructions: vm.instruction_count(),
        exit_code,
        trap,
    });
    drop(vm);
    process::exit(exit_code);
}

fn verify(inputs: &[PathBuf]) {
    let mut failed = false;
    for path in inputs {
        let module = load(path);
        match viper_il::verify_module(&module) {
            Ok(()) => println!("{}: ok", path.display()),
            Err(e) => {
                failed = true;
                println!("{}: FAILED ({})", path.display(), e.code);
                for note in &e.notes {
                    println!("  {}", note);
                }
            }
        }
    }
    if failed {
        process::exit(1);
    }
}

fn fmt(input: &Path) {
    let module = load(input);
    print!("{}", viper_il::print_module(&module));
}
