//! Configuration inspection CLI commands.
//!
//! Provides `config show` and `config path` for checking which layer
//! settings a render will use.

use std::path::PathBuf;

use clap::Subcommand;
use tilecanvas::config::{default_config_path, LayerConfig};

use super::common::load_config;
use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Print the effective layer configuration
    Show {
        /// Configuration file (defaults to the user config file)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show the default configuration file path
    Path,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Show { config } => {
            let config = load_config(config.as_deref())?;
            for (key, value) in describe(&config) {
                println!("{:<20} {}", key, value);
            }
            Ok(())
        }
        ConfigCommands::Path => match default_config_path() {
            Some(path) => {
                println!("{}", path.display());
                Ok(())
            }
            None => Err(CliError::Argument(
                "no configuration directory on this platform".to_string(),
            )),
        },
    }
}

fn describe(config: &LayerConfig) -> Vec<(&'static str, String)> {
    let optional = |value: Option<String>| value.unwrap_or_else(|| "(not set)".to_string());
    vec![
        ("tile_size", config.tile_size.to_string()),
        ("device_pixel_ratio", config.device_pixel_ratio.to_string()),
        ("tile_delay", optional(config.tile_delay.map(|d| d.to_string()))),
        (
            "background_color",
            optional(config.background_color.map(|c| c.to_string())),
        ),
        ("xray", config.xray.to_string()),
        ("debug_color", optional(config.debug_color.map(|c| c.to_string()))),
        ("pick_window_ms", config.pick_window.as_millis().to_string()),
        ("debug_brush_radius", config.debug_brush_radius.to_string()),
    ]
}
