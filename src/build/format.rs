//! Page formats and output tidying.
//!
//! A page format turns a composed page body into HTML. HTML pages pass
//! through untouched; Markdown pages are converted with pulldown-cmark.
//! The registry also decides which content files are pages at all, and
//! which extension their output gets.
//!
//! # Adding a New Format
//!
//! ```ignore
//! struct AsciidocFormat;
//!
//! impl PageFormat for AsciidocFormat {
//!     fn name(&self) -> &'static str { "asciidoc" }
//!     fn extensions(&self) -> &[&'static str] { &["adoc", "asciidoc"] }
//!     fn to_html(&self, body: String) -> String { /* ... */ }
//! }
//!
//! registry.register(AsciidocFormat);
//! ```

use std::path::{Path, PathBuf};

use pulldown_cmark::{Options, Parser, html};

/// A page format that can turn a composed body into HTML.
pub trait PageFormat: Send + Sync {
    /// The name of this format (e.g., "html", "markdown").
    fn name(&self) -> &'static str;

    /// File extensions this format handles (lowercase, without dot).
    fn extensions(&self) -> &[&'static str];

    /// Convert a composed body to HTML.
    fn to_html(&self, body: String) -> String;
}

/// HTML pages are already HTML.
pub struct HtmlFormat;

impl PageFormat for HtmlFormat {
    fn name(&self) -> &'static str {
        "html"
    }

    fn extensions(&self) -> &[&'static str] {
        &["html", "htm"]
    }

    fn to_html(&self, body: String) -> String {
        body
    }
}

/// Markdown format implementation using pulldown-cmark.
pub struct MarkdownFormat;

impl PageFormat for MarkdownFormat {
    fn name(&self) -> &'static str {
        "markdown"
    }

    fn extensions(&self) -> &[&'static str] {
        &["md", "markdown"]
    }

    fn to_html(&self, body: String) -> String {
        let options = Options::ENABLE_TABLES
            | Options::ENABLE_FOOTNOTES
            | Options::ENABLE_STRIKETHROUGH
            | Options::ENABLE_TASKLISTS
            | Options::ENABLE_HEADING_ATTRIBUTES;

        let parser = Parser::new_ext(&body, options);
        let mut html_output = String::new();
        html::push_html(&mut html_output, parser);
        html_output
    }
}

/// Registry of page formats.
pub struct FormatRegistry {
    formats: Vec<Box<dyn PageFormat>>,
}

impl FormatRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            formats: Vec::new(),
        }
    }

    /// Create a registry with the default formats (HTML, Markdown).
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(HtmlFormat);
        registry.register(MarkdownFormat);
        registry
    }

    /// Register a new format.
    ///
    /// Later registrations take precedence for overlapping extensions.
    pub fn register<F: PageFormat + 'static>(&mut self, format: F) {
        self.formats.push(Box::new(format));
    }

    /// Find the format for a file extension.
    pub fn for_extension(&self, ext: &str) -> Option<&dyn PageFormat> {
        let ext_lower = ext.to_lowercase();
        // Search in reverse so later registrations take precedence
        self.formats
            .iter()
            .rev()
            .find(|f| f.extensions().iter().any(|e| *e == ext_lower))
            .map(|f| f.as_ref())
    }

    /// Find the format for a file path based on its extension.
    pub fn for_path(&self, path: &Path) -> Option<&dyn PageFormat> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.for_extension(ext))
    }

    /// Check if a path is a page (has a registered format).
    pub fn is_page(&self, path: &Path) -> bool {
        self.for_path(path).is_some()
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Output path of a page: HTML pages keep their name, others become `.html`.
pub fn output_page_path(path: &Path) -> PathBuf {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("html") || ext.eq_ignore_ascii_case("htm") => {
            path.to_path_buf()
        }
        _ => path.with_extension("html"),
    }
}

/// Elements whose content is kept byte for byte.
const PREFORMATTED: [&str; 2] = ["pre", "textarea"];

/// Cosmetic whitespace pass over composed HTML.
///
/// Strips trailing whitespace from every line, collapses runs of blank
/// lines into one, drops leading and trailing blank lines and ends the
/// text with a single newline. Lines inside `<pre>` and `<textarea>` are
/// left alone. Applying it twice changes nothing.
pub fn tidy(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_blank = false;
    let mut open = None;

    for line in text.lines() {
        let was_open = open.is_some();
        open = open_preformatted(line, open);
        if was_open || open.is_some() {
            if pending_blank {
                out.push('\n');
                pending_blank = false;
            }
            out.push_str(line);
            out.push('\n');
            continue;
        }

        let line = line.trim_end();
        if line.is_empty() {
            pending_blank = !out.is_empty();
            continue;
        }
        if pending_blank {
            out.push('\n');
            pending_blank = false;
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// The preformatted element still open at the end of `line`, given the one
/// open at its start.
fn open_preformatted(line: &str, mut open: Option<&'static str>) -> Option<&'static str> {
    let lower = line.to_ascii_lowercase();
    let mut pos = 0;
    loop {
        match open {
            Some(tag) => match lower[pos..].find(&format!("</{tag}")) {
                Some(i) => {
                    pos += i + tag.len() + 2;
                    open = None;
                }
                None => return open,
            },
            None => {
                let next = PREFORMATTED
                    .iter()
                    .filter_map(|tag| find_open_tag(&lower[pos..], tag).map(|i| (i, *tag)))
                    .min();
                match next {
                    Some((i, tag)) => {
                        pos += i + tag.len() + 1;
                        open = Some(tag);
                    }
                    None => return None,
                }
            }
        }
    }
}

/// Byte offset of the first `<tag>` or `<tag ...>` in `s`.
fn find_open_tag(s: &str, tag: &str) -> Option<usize> {
    let needle = format!("<{tag}");
    let mut from = 0;
    while let Some(i) = s[from..].find(&needle) {
        let at = from + i;
        match s[at + needle.len()..].chars().next() {
            Some(c) if c != '>' && !c.is_ascii_whitespace() => from = at + needle.len(),
            _ => return Some(at),
        }
    }
    None
}
