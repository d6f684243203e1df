//! Configuration loading and types for rbuild.
//!
//! This module handles all aspects of configuration:
//! - Type definitions for config structures (`types`)
//! - Loading configs from files and environment overrides (`load`)

mod load;
mod types;

// Re-export all types for convenient access
pub use types::{Config, PageConfig, ResolvedPaths, SiteConfig, WatchConfig};

/// Default config file name, looked up in the current directory.
pub const DEFAULT_CONFIG_FILE: &str = "rbuild.yaml";

// =============================================================================
// Errors
// =============================================================================

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read environment overrides: {0}")]
    Environment(#[from] config::ConfigError),

    #[error("failed to get current working directory: {0}")]
    CwdFailure(std::io::Error),

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_yaml::Error),
}
