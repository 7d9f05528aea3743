//! TileCanvas CLI - Command-line interface
//!
//! Renders vector features from a JSON file into PNG tiles using the
//! `tilecanvas` render pipeline.

mod commands;
mod error;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tilecanvas::logging::{init_logging, LoggingOptions};

use commands::config::ConfigCommands;
use commands::render::RenderArgs;

#[derive(Debug, Parser)]
#[command(name = "tilecanvas", version, about = "Render vector tile sources to PNG tiles")]
struct Cli {
    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Render every tile visible in a viewport to PNG files
    Render(RenderArgs),

    /// Inspect layer configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut options = LoggingOptions::default().with_default_filter(cli.log_level.clone());
    if let Some(path) = &cli.log_file {
        options = options.with_log_file(path.clone());
    }
    let _logging = match init_logging(&options) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Commands::Render(args) => commands::render::run(args),
        Commands::Config { command } => commands::config::run(command),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
