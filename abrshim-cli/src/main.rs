//! abrshim CLI - Command-line interface
//!
//! Inspect BB decisions and segment URLs, manage the configuration file, and
//! run a shim session against a live coordinator with a simulated player.

mod commands;
mod error;
mod player;

use std::path::PathBuf;
use std::process::ExitCode;

use abrshim::logging::init_logging;
use clap::{ArgAction, Parser, Subcommand};

use commands::config::ConfigCommands;
use commands::session::SessionArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "abrshim", version, about = "Externally driven segment quality selection")]
struct Cli {
    /// Configuration file to use instead of the per-user config.ini
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show the BB fallback decision for a buffer level
    Decide {
        /// Buffer level in milliseconds
        #[arg(long)]
        buffer_ms: f64,

        /// Segment index to stamp on the decision
        #[arg(long, default_value_t = 1)]
        index: u64,
    },

    /// Parse a segment URL into quality and index
    ParseUrl {
        /// Segment URL, e.g. https://cdn.example.org/video2/14.m4s
        url: String,

        /// Ladder size bounding the quality field (defaults to abr.bitrates)
        #[arg(long)]
        max_rates: Option<usize>,
    },

    /// View or modify configuration settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Run the shim against a coordinator with a simulated player
    Session(SessionArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config_path = cli.config.as_deref();
    let mut config = commands::load_config(config_path)?;
    if let Some(level) = verbosity_level(cli.verbose) {
        config.logging.level = level.to_string();
    }
    let _log_guard = init_logging(&config.logging)?;

    match cli.command {
        Commands::Decide { buffer_ms, index } => commands::decide::run(&config, buffer_ms, index),
        Commands::ParseUrl { url, max_rates } => commands::parse_url::run(&config, &url, max_rates),
        Commands::Config { command } => commands::config::run(command, config_path),
        Commands::Session(args) => commands::session::run(&config, args),
    }
}

/// Log level forced by `-v` flags, if any.
fn verbosity_level(count: u8) -> Option<&'static str> {
    match count {
        0 => None,
        1 => Some("debug"),
        _ => Some("trace"),
    }
}
