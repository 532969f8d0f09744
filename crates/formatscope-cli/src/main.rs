//! formatscope CLI - identify file formats and unwrap layered encodings.

mod output;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use formatscope_core::config::CONFIG_FILE_NAME;
use formatscope_core::{Engine, ScopeConfig, classify_paths, detect_paths, generate_schema};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "formatscope")]
#[command(author, version, about = "Identify file formats by binary signature and layered detection", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to .formatscope.toml in the working directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Signature library (.toml, .json, .yaml) replacing the built-in one
    #[arg(long, global = true)]
    signatures: Option<PathBuf>,

    /// Detector module table replacing the built-in one
    #[arg(long, global = true)]
    modules: Option<PathBuf>,

    /// Maximum number of decode steps
    #[arg(long, global = true)]
    max_recursion: Option<usize>,

    /// Restrict detection to this format tag (repeatable)
    #[arg(long = "enable", value_name = "TAG", global = true)]
    enable: Vec<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    format: OutputFormat,

    /// Verbose logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify files against the signature library
    Identify {
        /// Files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Detect nested layers, decoding each one that can be unwrapped
    Detect {
        /// Files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Print the JSON schema of the config file
    Schema,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("{} {e:#}", "error:".red().bold());
            ExitCode::from(2)
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Returns whether every input was identified.
fn run(cli: &Cli) -> anyhow::Result<bool> {
    match &cli.command {
        Commands::Schema => {
            let schema = generate_schema();
            println!("{}", serde_json::to_string_pretty(&schema)?);
            Ok(true)
        }
        Commands::Identify { paths } => {
            let engine = build_engine(cli)?;
            let reports = classify_paths(&engine, paths)?;
            output::print_classifications(&reports, cli.format)?;
            Ok(reports
                .iter()
                .all(|r| r.result.as_ref().is_ok_and(|c| c.is_identified())))
        }
        Commands::Detect { paths } => {
            let engine = build_engine(cli)?;
            let reports = detect_paths(&engine, paths)?;
            output::print_detections(&reports, cli.format)?;
            Ok(reports.iter().all(|r| {
                r.result
                    .as_ref()
                    .is_ok_and(|layers| layers.iter().any(|id| !id.is_unknown()))
            }))
        }
    }
}

fn build_engine(cli: &Cli) -> anyhow::Result<Engine> {
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(path) = &cli.signatures {
        config.set_signature_file(Some(path.clone()));
    }
    if let Some(path) = &cli.modules {
        config.set_modules_file(Some(path.clone()));
    }
    if let Some(max_recursion) = cli.max_recursion {
        config.set_max_recursion(max_recursion);
    }
    if !cli.enable.is_empty() {
        config.set_enabled_formats(cli.enable.clone());
    }
    Engine::from_config(&config).context("preparing signatures and detectors")
}

/// An explicit `--config` must load; the implicit one only warns.
fn load_config(explicit: Option<&Path>) -> anyhow::Result<ScopeConfig> {
    if let Some(path) = explicit {
        return ScopeConfig::load(path);
    }
    let implicit = Path::new(CONFIG_FILE_NAME);
    if !implicit.is_file() {
        return Ok(ScopeConfig::default());
    }
    let (config, warning) = ScopeConfig::load_or_default(Some(implicit));
    if let Some(warning) = warning {
        tracing::warn!("{warning}");
    }
    Ok(config)
}
