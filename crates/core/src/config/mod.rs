//! Configuration loading, validation and first-run bootstrap.

mod loader;
mod types;

pub use loader::{bootstrap_config, load_config, load_config_from_str};
pub use types::{Config, LibraryConfig, TrackerConfig, TranscodeConfig};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// No config file existed; a blank template was written for the
    /// operator to fill in. The binary maps this to a distinguished exit.
    #[error("No config file found; a blank one was created at {0}. Edit it and rerun.")]
    FirstRun(String),

    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}
