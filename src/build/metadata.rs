//! Per-directory page metadata.
//!
//! Each content directory may hold a YAML sidecar (`metadata.yaml` by
//! default) that applies to every page in that directory:
//!
//! ```yaml
//! title: My Page
//! keywords: rust, static sites
//! description: A description
//! pagetype: article
//! pageJsPath: page.js
//! prefetch:
//!   - /next.html
//! author: custom values are passed through
//! ```

use std::path::{Path, PathBuf};

use super::compose::display_value;

/// Metadata loaded from a sidecar. Unknown keys are kept as-is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    values: serde_json::Map<String, serde_json::Value>,
}

#[derive(thiserror::Error, Debug)]
pub enum MetadataError {
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("metadata must be a mapping of keys to values")]
    NotAMapping,

    #[error("unsupported metadata value: {0}")]
    Value(#[from] serde_json::Error),
}

impl Metadata {
    /// All key/value pairs, reserved keys included.
    pub fn values(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.values
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.values.get(key)
    }

    /// A value rendered as text, skipping nulls and empty strings.
    pub fn text(&self, key: &str) -> Option<String> {
        self.get(key)
            .map(display_value)
            .filter(|text| !text.is_empty())
    }

    pub fn title(&self) -> Option<String> {
        self.text("title")
    }

    pub fn page_js_path(&self) -> Option<String> {
        self.text("pageJsPath")
    }

    /// Prefetch list; a single value is treated as a one-item list.
    pub fn prefetch(&self) -> Option<Vec<serde_json::Value>> {
        match self.get("prefetch")? {
            serde_json::Value::Null => None,
            serde_json::Value::Array(items) => Some(items.clone()),
            other => Some(vec![other.clone()]),
        }
    }
}

/// Parse sidecar text. An empty document is empty metadata.
pub fn parse_metadata(text: &str) -> Result<Metadata, MetadataError> {
    if text.trim().is_empty() {
        return Ok(Metadata::default());
    }
    match serde_yaml::from_str::<serde_yaml::Value>(text)? {
        serde_yaml::Value::Null => Ok(Metadata::default()),
        mapping @ serde_yaml::Value::Mapping(_) => match serde_json::to_value(mapping)? {
            serde_json::Value::Object(values) => Ok(Metadata { values }),
            _ => Err(MetadataError::NotAMapping),
        },
        _ => Err(MetadataError::NotAMapping),
    }
}

/// Sidecar location for a page: the page's directory plus `file_name`.
pub fn metadata_path(page: &Path, file_name: &str) -> PathBuf {
    page.parent()
        .map(|dir| dir.join(file_name))
        .unwrap_or_else(|| PathBuf::from(file_name))
}

/// Load the sidecar for a page.
///
/// A missing sidecar is empty metadata. An unreadable or malformed one is
/// logged and also treated as empty.
pub fn load_metadata(page: &Path, file_name: &str) -> Metadata {
    let path = metadata_path(page, file_name);
    if !path.exists() {
        return Metadata::default();
    }

    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!("failed to read metadata {}: {e}", path.display());
            return Metadata::default();
        }
    };

    match parse_metadata(&text) {
        Ok(metadata) => metadata,
        Err(e) => {
            tracing::warn!("ignoring metadata {}: {e}", path.display());
            Metadata::default()
        }
    }
}
