//! Configuration type definitions.
//!
//! This module contains all the data structures used in rbuild configuration files.
//! These types are pure data - no I/O or complex logic.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Global page variables, available to placeholders and to the final render.
///
/// Keys are kept in file order so the rendered context is stable.
pub type PageConfig = serde_json::Map<String, serde_json::Value>;

// =============================================================================
// Root config
// =============================================================================

/// The full build configuration, normally read from `rbuild.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    /// Layout file name, relative to the template directory
    #[serde(default = "default_layout")]
    pub layout: String,
    /// Name of the per-directory metadata sidecar
    #[serde(default = "default_metadata_file")]
    pub metadata_file: String,
    /// Extra attempts when a template fetch fails
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Run the whitespace tidy pass over composed templates and page HTML
    #[serde(default = "default_tidy")]
    pub tidy: bool,
    /// Named templates composed once per build, exposed as `templates.<key>`
    #[serde(default)]
    pub child_templates: BTreeMap<String, ChildTemplate>,
    /// Global page variables
    #[serde(default)]
    pub page: PageConfig,
    /// Development-specific settings (watch mode, etc.)
    #[serde(default)]
    pub dev: DevConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site: SiteConfig::default(),
            paths: PathsConfig::default(),
            layout: default_layout(),
            metadata_file: default_metadata_file(),
            retries: default_retries(),
            tidy: default_tidy(),
            child_templates: BTreeMap::new(),
            page: PageConfig::new(),
            dev: DevConfig::default(),
        }
    }
}

fn default_layout() -> String {
    "layout.html".to_string()
}

fn default_metadata_file() -> String {
    "metadata.yaml".to_string()
}

fn default_retries() -> u32 {
    3
}

fn default_tidy() -> bool {
    true
}

impl Config {
    /// Base URL used for page `url` values.
    ///
    /// `site.url` wins; `page.siteUrl` is honoured for older configs.
    pub fn site_url(&self) -> Option<&str> {
        self.site
            .url
            .as_deref()
            .or_else(|| self.page.get("siteUrl").and_then(|v| v.as_str()))
    }

    /// Script used for `pageJs` when a page has no script of its own.
    pub fn default_script(&self) -> Option<&str> {
        self.site
            .default_script
            .as_deref()
            .or_else(|| self.page.get("defaultScript").and_then(|v| v.as_str()))
    }
}

// =============================================================================
// Site configuration
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Public base URL, e.g. `https://example.com`
    pub url: Option<String>,
    /// Fallback for the `pageJs` context value
    pub default_script: Option<String>,
}

// =============================================================================
// Directory configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_templates")]
    pub templates: PathBuf,
    #[serde(default = "default_content")]
    pub content: PathBuf,
    #[serde(default = "default_output")]
    pub output: PathBuf,
}

fn default_templates() -> PathBuf {
    PathBuf::from("template")
}

fn default_content() -> PathBuf {
    PathBuf::from("origin")
}

fn default_output() -> PathBuf {
    PathBuf::from("public")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            templates: default_templates(),
            content: default_content(),
            output: default_output(),
        }
    }
}

/// The configured directories, resolved against the config file's directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    pub templates: PathBuf,
    pub content: PathBuf,
    pub output: PathBuf,
}

impl PathsConfig {
    /// Resolve every directory against `base_path`.
    pub fn resolve(&self, base_path: &Path) -> ResolvedPaths {
        let resolve = |path: &PathBuf| {
            if path.is_relative() {
                base_path.join(path)
            } else {
                path.clone()
            }
        };
        ResolvedPaths {
            templates: resolve(&self.templates),
            content: resolve(&self.content),
            output: resolve(&self.output),
        }
    }
}

// =============================================================================
// Child templates
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildTemplate {
    /// Template path, relative to the template directory (or a URL)
    pub path: String,
}

// =============================================================================
// Development configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevConfig {
    /// File watching configuration
    #[serde(default)]
    pub watch: WatchConfig,
    /// Enable live reload in the browser when files change (default: true)
    #[serde(default = "default_live_reload")]
    pub live_reload: bool,
}

impl Default for DevConfig {
    fn default() -> Self {
        Self {
            watch: WatchConfig::default(),
            live_reload: true,
        }
    }
}

fn default_live_reload() -> bool {
    true
}

/// Configuration for file watching during development.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Use polling-based watcher instead of native file system events.
    /// Useful for network filesystems, Docker volumes, or other situations
    /// where native events are unreliable.
    #[serde(default)]
    pub poll: bool,
    /// Poll interval in milliseconds (only used if poll=true).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Debounce timeout in milliseconds.
    /// Changes within this window are batched together.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_debounce_ms() -> u64 {
    100
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll: false,
            poll_interval_ms: default_poll_interval_ms(),
            debounce_ms: default_debounce_ms(),
        }
    }
}
