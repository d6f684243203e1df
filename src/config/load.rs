//! Configuration loading from files.
//!
//! The YAML file is the primary source. A small set of `RBUILD_*` environment
//! variables can override directories and the site URL, which is handy in CI.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::{Config, ConfigError, DEFAULT_CONFIG_FILE};

/// Settings that may be overridden from the environment.
#[derive(Debug, Default, Deserialize)]
struct EnvOverrides {
    output: Option<PathBuf>,
    templates: Option<PathBuf>,
    content: Option<PathBuf>,
    site_url: Option<String>,
    retries: Option<u32>,
}

impl Config {
    /// Resolve the config path from the command line argument, defaulting to `rbuild.yaml`.
    pub fn path_from_arg(config_file: Option<&Path>) -> Result<PathBuf, ConfigError> {
        let config_file = config_file.unwrap_or(Path::new(DEFAULT_CONFIG_FILE));
        if config_file.is_relative() {
            Ok(std::env::current_dir()
                .map_err(ConfigError::CwdFailure)?
                .join(config_file))
        } else {
            Ok(config_file.to_path_buf())
        }
    }

    /// Load the config file and apply environment overrides.
    ///
    /// A missing file is not an error: the defaults describe the conventional
    /// `template/`, `origin/`, `public/` layout next to the config path.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            Self::load_from_file(path)?
        } else {
            tracing::warn!("config file {} not found, using defaults", path.display());
            Self::default()
        };
        config.apply_env(None)?;
        Ok(config)
    }

    /// Load the config from a file path
    pub(crate) fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Parse a config from YAML text. An empty document yields the defaults.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Apply `RBUILD_*` overrides. `source` replaces the process environment (tests).
    fn apply_env(
        &mut self,
        source: Option<config::Map<String, String>>,
    ) -> Result<(), ConfigError> {
        let overrides: EnvOverrides = config::Config::builder()
            .add_source(
                config::Environment::with_prefix("RBUILD")
                    .try_parsing(true)
                    .source(source),
            )
            .build()?
            .try_deserialize()?;

        if let Some(output) = overrides.output {
            self.paths.output = output;
        }
        if let Some(templates) = overrides.templates {
            self.paths.templates = templates;
        }
        if let Some(content) = overrides.content {
            self.paths.content = content;
        }
        if let Some(url) = overrides.site_url {
            self.site.url = Some(url);
        }
        if let Some(retries) = overrides.retries {
            self.retries = retries;
        }
        Ok(())
    }
}
