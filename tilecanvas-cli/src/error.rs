//! CLI error types.

use std::fmt;
use std::path::PathBuf;

use tilecanvas::config::ConfigError;

/// Errors surfaced to the user by CLI commands.
#[derive(Debug)]
pub enum CliError {
    /// Configuration could not be loaded.
    Config(ConfigError),

    /// Invalid command-line argument.
    Argument(String),

    /// The input feature file could not be read or parsed.
    Input { path: PathBuf, reason: String },

    /// Writing output failed.
    Output { path: PathBuf, reason: String },

    /// Tiles did not finish rendering.
    Render(String),

    /// Failed to create the Tokio runtime.
    RuntimeCreation(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(e) => write!(f, "Configuration error: {}", e),
            CliError::Argument(msg) => write!(f, "Invalid argument: {}", msg),
            CliError::Input { path, reason } => {
                write!(f, "Failed to read input {}: {}", path.display(), reason)
            }
            CliError::Output { path, reason } => {
                write!(f, "Failed to write {}: {}", path.display(), reason)
            }
            CliError::Render(msg) => write!(f, "Render failed: {}", msg),
            CliError::RuntimeCreation(msg) => write!(f, "Failed to create Tokio runtime: {}", msg),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e)
    }
}

impl CliError {
    pub fn input(path: impl Into<PathBuf>, e: impl fmt::Display) -> Self {
        CliError::Input {
            path: path.into(),
            reason: e.to_string(),
        }
    }

    pub fn output(path: impl Into<PathBuf>, e: impl fmt::Display) -> Self {
        CliError::Output {
            path: path.into(),
            reason: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_error_display() {
        let err = CliError::input("/tmp/features.json", "unexpected end of file");
        let text = err.to_string();
        assert!(text.contains("/tmp/features.json"));
        assert!(text.contains("unexpected end of file"));
    }

    #[test]
    fn test_config_error_has_source() {
        use std::error::Error;
        let err: CliError = ConfigError::Parse("bad".into()).into();
        assert!(err.source().is_some());
    }
}
