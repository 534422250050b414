//! Ripple CLI, the command-line driver for the incremental compilation
//! engine.
//!
//! Provides `ripple build` for running a build from recorded front-end
//! summaries, `ripple status` and `ripple dependents` for inspecting the
//! build history, and `ripple invalidate` for discarding it.

#![warn(missing_docs)]

mod build;
mod inspect;
mod project;
mod summary;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

/// Ripple: incremental recompilation for a multi-unit compiler.
#[derive(Parser, Debug)]
#[command(name = "ripple", version, about = "Ripple incremental build engine")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose (debug-level) output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Control colored output.
    #[arg(long, global = true, value_enum, default_value_t = ColorChoice::Auto)]
    pub color: ColorChoice,

    /// Path to a custom `ripple.toml` configuration file.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run an incremental build from a front-end summary file.
    Build(BuildArgs),
    /// Show the committed build history.
    Status,
    /// Delete the build history so the next build starts from scratch.
    Invalidate,
    /// List the units that looked up a name.
    Dependents(DependentsArgs),
}

/// Arguments for the `ripple build` subcommand.
#[derive(Parser, Debug)]
pub struct BuildArgs {
    /// JSON file with one front-end summary per unit.
    #[arg(long)]
    pub summaries: PathBuf,

    /// Units created since the last build.
    #[arg(long, num_args = 1..)]
    pub added: Vec<String>,

    /// Units edited since the last build.
    #[arg(long, num_args = 1..)]
    pub modified: Vec<String>,

    /// Units deleted since the last build.
    #[arg(long, num_args = 1..)]
    pub removed: Vec<String>,

    /// Output format for the build report.
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

/// Arguments for the `ripple dependents` subcommand.
#[derive(Parser, Debug)]
pub struct DependentsArgs {
    /// Package or class member scope.
    pub scope: String,

    /// Simple name. Lists every lookup in the scope when omitted.
    pub name: Option<String>,
}

/// Controls whether colored output is produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ColorChoice {
    /// Detect from terminal capabilities.
    Auto,
    /// Always produce colored output.
    Always,
    /// Never produce colored output.
    Never,
}

/// Build report output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Human-readable terminal output.
    Text,
    /// Machine-readable JSON output.
    Json,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Whether to print verbose/debug information.
    pub verbose: bool,
    /// Whether to use colored output.
    pub color: bool,
    /// Optional path to a custom config file.
    pub config: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    let color = match cli.color {
        ColorChoice::Auto => std::env::var("TERM").is_ok(),
        ColorChoice::Always => true,
        ColorChoice::Never => false,
    };

    let global = GlobalArgs {
        quiet: cli.quiet,
        verbose: cli.verbose,
        color,
        config: cli.config,
    };
    init_logging(&global);

    let result = match cli.command {
        Command::Build(ref args) => build::run(args, &global),
        Command::Status => inspect::status(&global),
        Command::Invalidate => inspect::invalidate(&global),
        Command::Dependents(ref args) => inspect::dependents(args, &global),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}

/// Installs the stderr subscriber. `RUST_LOG` wins over the CLI flags.
fn init_logging(global: &GlobalArgs) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_log_level(global)));
    // Only fails if a subscriber is already installed.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn default_log_level(global: &GlobalArgs) -> &'static str {
    if global.quiet {
        "error"
    } else if global.verbose {
        "debug"
    } else {
        "warn"
    }
}
