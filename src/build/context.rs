//! Per-page rendering context.
//!
//! The context is the global page config, with the page's metadata merged
//! over it, plus the derived keys every layout can rely on:
//! `doc`, `title`, `keywords`, `description`, `pagetype`, `url`, `pageJs`,
//! `prefetch` and `templates`.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use crate::config::{Config, PageConfig};

use super::format::output_page_path;
use super::metadata::Metadata;
use super::paths::{page_url, relative_to, url_path};

/// The values handed to the final render for one page.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct PageContext {
    values: serde_json::Map<String, Value>,
}

impl PageContext {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// String value of a key, or `""`.
    pub fn str(&self, key: &str) -> &str {
        self.get(key).and_then(Value::as_str).unwrap_or("")
    }

    pub fn values(&self) -> &serde_json::Map<String, Value> {
        &self.values
    }
}

/// Builds [`PageContext`]s from the build configuration.
pub struct PageContextBuilder<'a> {
    globals: &'a PageConfig,
    content_root: &'a Path,
    site_url: Option<&'a str>,
    default_script: Option<&'a str>,
    templates: Option<&'a BTreeMap<String, String>>,
}

impl<'a> PageContextBuilder<'a> {
    pub fn new(config: &'a Config, content_root: &'a Path) -> Self {
        Self {
            globals: &config.page,
            content_root,
            site_url: config.site_url(),
            default_script: config.default_script(),
            templates: None,
        }
    }

    /// Composed child templates, exposed as `templates.<key>`.
    pub fn with_templates(mut self, templates: &'a BTreeMap<String, String>) -> Self {
        self.templates = Some(templates);
        self
    }

    /// Build the context for the page at `page` with composed body `doc`.
    pub fn build(&self, metadata: &Metadata, doc: String, page: &Path) -> PageContext {
        let mut values = self.globals.clone();
        for (key, value) in metadata.values() {
            values.insert(key.clone(), value.clone());
        }

        let file_name = page
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        let relative = relative_to(page, self.content_root)
            .unwrap_or_else(|| file_name.clone().into());

        values.insert("doc".to_string(), Value::String(doc));
        values.insert(
            "title".to_string(),
            Value::String(metadata.title().unwrap_or(file_name)),
        );
        for key in ["keywords", "description", "pagetype"] {
            values.insert(
                key.to_string(),
                Value::String(metadata.text(key).unwrap_or_default()),
            );
        }
        values.insert(
            "url".to_string(),
            Value::String(page_url(
                self.site_url,
                &url_path(&output_page_path(&relative)),
            )),
        );
        values.insert("pageJs".to_string(), Value::String(self.page_js(metadata, page)));
        values.insert(
            "prefetch".to_string(),
            Value::Array(metadata.prefetch().unwrap_or_default()),
        );
        if let Some(templates) = self.templates {
            let templates = templates
                .iter()
                .map(|(key, text)| (key.clone(), Value::String(text.clone())))
                .collect();
            values.insert("templates".to_string(), Value::Object(templates));
        }

        PageContext { values }
    }

    /// Inline script for the page, or the configured default.
    fn page_js(&self, metadata: &Metadata, page: &Path) -> String {
        let default = || self.default_script.unwrap_or_default().to_string();
        let Some(script_path) = metadata.page_js_path() else {
            return default();
        };

        let script_path = page
            .parent()
            .map(|dir| dir.join(&script_path))
            .unwrap_or_else(|| script_path.into());
        match std::fs::read_to_string(&script_path) {
            Ok(script) => format!("<script>{script}</script>"),
            Err(e) => {
                tracing::warn!("failed to read page script {}: {e}", script_path.display());
                default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use serde_json::json;

    use super::*;
    use crate::build::metadata::parse_metadata;

    fn config(yaml: &str) -> Config {
        Config::from_yaml(yaml).unwrap()
    }

    #[test]
    fn test_derived_defaults() {
        let config = config("site:\n  url: https://x.com\n");
        let root = PathBuf::from("/o");
        let builder = PageContextBuilder::new(&config, &root);

        let ctx = builder.build(
            &Metadata::default(),
            "<p>body</p>".to_string(),
            Path::new("/o/blog/index.html"),
        );
        assert_eq!(ctx.str("doc"), "<p>body</p>");
        assert_eq!(ctx.str("title"), "index.html");
        assert_eq!(ctx.str("keywords"), "");
        assert_eq!(ctx.str("description"), "");
        assert_eq!(ctx.str("pagetype"), "");
        assert_eq!(ctx.str("url"), "https://x.com/blog/");
        assert_eq!(ctx.str("pageJs"), "");
        assert_eq!(ctx.get("prefetch"), Some(&json!([])));
        assert!(ctx.get("templates").is_none());
    }

    #[test]
    fn test_metadata_overrides_globals() {
        let config = config("page:\n  title: Global\n  lang: en\n  theme: light\n");
        let root = PathBuf::from("/o");
        let builder = PageContextBuilder::new(&config, &root);
        let metadata =
            parse_metadata("title: Foo\ntheme: dark\nprefetch: [/a.html]\n").unwrap();

        let ctx = builder.build(&metadata, String::new(), Path::new("/o/a.html"));
        assert_eq!(ctx.str("title"), "Foo");
        assert_eq!(ctx.str("theme"), "dark");
        assert_eq!(ctx.str("lang"), "en");
        assert_eq!(ctx.get("prefetch"), Some(&json!(["/a.html"])));
    }

    #[test]
    fn test_title_falls_back_to_file_name_over_global_title() {
        let config = config("page:\n  title: Global\n");
        let root = PathBuf::from("/o");
        let builder = PageContextBuilder::new(&config, &root);

        let ctx = builder.build(&Metadata::default(), String::new(), Path::new("/o/about.html"));
        assert_eq!(ctx.str("title"), "about.html");
    }

    #[test]
    fn test_markdown_page_url_uses_output_name() {
        let config = config("site:\n  url: https://x.com/\n");
        let root = PathBuf::from("/o");
        let builder = PageContextBuilder::new(&config, &root);

        let ctx = builder.build(&Metadata::default(), String::new(), Path::new("/o/notes/todo.md"));
        assert_eq!(ctx.str("url"), "https://x.com/notes/todo.html");
    }

    #[test]
    fn test_legacy_page_site_url_and_default_script() {
        let config = config(
            "page:\n  siteUrl: https://legacy.com\n  defaultScript: <script>d()</script>\n",
        );
        let root = PathBuf::from("/o");
        let builder = PageContextBuilder::new(&config, &root);

        let ctx = builder.build(&Metadata::default(), String::new(), Path::new("/o/index.html"));
        assert_eq!(ctx.str("url"), "https://legacy.com/");
        assert_eq!(ctx.str("pageJs"), "<script>d()</script>");
    }

    #[test]
    fn test_page_js_is_inlined() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("page.js"), "init();").unwrap();
        let config = config("site:\n  default_script: <script>fallback()</script>\n");
        let builder = PageContextBuilder::new(&config, dir.path());

        let metadata = parse_metadata("pageJsPath: page.js").unwrap();
        let ctx = builder.build(&metadata, String::new(), &dir.path().join("index.html"));
        assert_eq!(ctx.str("pageJs"), "<script>init();</script>");

        let metadata = parse_metadata("pageJsPath: missing.js").unwrap();
        let ctx = builder.build(&metadata, String::new(), &dir.path().join("index.html"));
        assert_eq!(ctx.str("pageJs"), "<script>fallback()</script>");
    }

    #[test]
    fn test_child_templates_are_exposed() {
        let config = Config::default();
        let root = PathBuf::from("/o");
        let mut templates = BTreeMap::new();
        templates.insert("nav".to_string(), "<nav/>".to_string());
        let builder = PageContextBuilder::new(&config, &root).with_templates(&templates);

        let ctx = builder.build(&Metadata::default(), String::new(), Path::new("/o/index.html"));
        assert_eq!(ctx.get("templates"), Some(&json!({ "nav": "<nav/>" })));
    }
}
