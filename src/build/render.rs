use tera::{Context, Tera};

use super::compose::display_value;
use super::context::PageContext;
use super::syntax::parse_render_marker;

/// Layout used when the template directory has no layout file.
pub const IDENTITY_LAYOUT: &str = "{{ doc | safe }}";

const LAYOUT_TEMPLATE_NAME: &str = "__layout__";

#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error("invalid layout: {}", error_chain(.0))]
    Layout(tera::Error),

    #[error("template error: {}", error_chain(.0))]
    Template(#[from] tera::Error),

    #[error("no value for `{0}` in the page body")]
    MissingValue(String),
}

/// Tera keeps the useful part of a message in the error sources.
fn error_chain(error: &tera::Error) -> String {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = std::error::Error::source(cause);
    }
    message
}

/// The final render stage, wrapping Tera.
///
/// The composed layout is parsed once. A page body is not a template: only
/// the `{{ name | safe }}` markers left by composition are filled from the
/// page context, then the body is handed to the layout as `doc`.
/// Autoescaping is off: composed text is trusted HTML.
pub struct Renderer {
    tera: Tera,
}

impl Renderer {
    /// Create a renderer for a composed layout.
    pub fn new(layout: &str) -> Result<Self, RenderError> {
        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);
        tera.add_raw_template(LAYOUT_TEMPLATE_NAME, layout)
            .map_err(RenderError::Layout)?;
        Ok(Self { tera })
    }

    /// Render a page with the given context.
    pub fn render_page(&self, context: &PageContext) -> Result<String, RenderError> {
        let body = fill_markers(context.str("doc"), context)?;

        let mut tera_context = Context::new();
        for (key, value) in context.values() {
            tera_context.insert(key.as_str(), value);
        }
        tera_context.insert("doc", &body);
        Ok(self.tera.render(LAYOUT_TEMPLATE_NAME, &tera_context)?)
    }
}

/// Replace every `{{ name | safe }}` marker in `body` with its context value.
///
/// Any other text, template syntax of other engines included, is copied
/// as is.
fn fill_markers(body: &str, context: &PageContext) -> Result<String, RenderError> {
    let mut out = String::with_capacity(body.len());
    let mut pos = 0;

    while let Some(offset) = body[pos..].find("{{") {
        let start = pos + offset;
        match parse_render_marker(&body[start..]) {
            Some((len, name)) => {
                let value = context
                    .get(name)
                    .ok_or_else(|| RenderError::MissingValue(name.to_string()))?;
                out.push_str(&body[pos..start]);
                out.push_str(&display_value(value));
                pos = start + len;
            }
            None => {
                out.push_str(&body[pos..start + 2]);
                pos = start + 2;
            }
        }
    }

    out.push_str(&body[pos..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use super::*;
    use crate::build::context::PageContextBuilder;
    use crate::build::metadata::{Metadata, parse_metadata};
    use crate::config::Config;

    fn context(config: &Config, metadata: &Metadata, doc: &str, page: &str) -> PageContext {
        let root = PathBuf::from("/o");
        PageContextBuilder::new(config, &root).build(metadata, doc.to_string(), Path::new(page))
    }

    #[test]
    fn test_identity_layout_renders_body() {
        let renderer = Renderer::new(IDENTITY_LAYOUT).unwrap();
        let ctx = context(&Config::default(), &Metadata::default(), "<p>hi</p>", "/o/a.html");
        assert_eq!(renderer.render_page(&ctx).unwrap(), "<p>hi</p>");
    }

    #[test]
    fn test_layout_sees_derived_keys() {
        let config = Config::from_yaml("site:\n  url: https://x.com\n").unwrap();
        let metadata = parse_metadata("title: Foo\npagetype: article").unwrap();
        let renderer = Renderer::new(
            "<title>{{ title | safe }}</title><a href=\"{{ url | safe }}\">{{ pagetype }}</a>{{ doc | safe }}{{ pageJs | safe }}",
        )
        .unwrap();

        let ctx = context(&config, &metadata, "<main/>", "/o/blog/index.html");
        assert_eq!(
            renderer.render_page(&ctx).unwrap(),
            "<title>Foo</title><a href=\"https://x.com/blog/\">article</a><main/>"
        );
    }

    #[test]
    fn test_markers_in_body_are_rendered() {
        let config = Config::from_yaml("page:\n  author: Ann\n").unwrap();
        let renderer = Renderer::new(IDENTITY_LAYOUT).unwrap();
        let ctx = context(
            &config,
            &Metadata::default(),
            "<h1>{{ title | safe }}</h1><p>{{ author | safe }}</p>",
            "/o/about.html",
        );
        assert_eq!(
            renderer.render_page(&ctx).unwrap(),
            "<h1>about.html</h1><p>Ann</p>"
        );
    }

    #[test]
    fn test_autoescape_is_off() {
        let config = Config::from_yaml("page:\n  banner: <b>bold</b>\n").unwrap();
        let renderer = Renderer::new("{{ banner }}|{{ doc }}").unwrap();
        let ctx = context(&config, &Metadata::default(), "<i>x</i>", "/o/a.html");
        assert_eq!(renderer.render_page(&ctx).unwrap(), "<b>bold</b>|<i>x</i>");
    }

    #[test]
    fn test_prefetch_is_a_list() {
        let metadata = parse_metadata("prefetch: [/a.html, /b.html]").unwrap();
        let renderer =
            Renderer::new("{% for p in prefetch %}<link href=\"{{ p }}\">{% endfor %}").unwrap();
        let ctx = context(&Config::default(), &metadata, "", "/o/a.html");
        assert_eq!(
            renderer.render_page(&ctx).unwrap(),
            "<link href=\"/a.html\"><link href=\"/b.html\">"
        );
    }

    #[test]
    fn test_each_page_renders_its_own_body() {
        let renderer = Renderer::new(IDENTITY_LAYOUT).unwrap();
        let first = context(&Config::default(), &Metadata::default(), "one", "/o/a.html");
        let second = context(&Config::default(), &Metadata::default(), "two", "/o/b.html");
        assert_eq!(renderer.render_page(&first).unwrap(), "one");
        assert_eq!(renderer.render_page(&second).unwrap(), "two");
    }

    #[test]
    fn test_invalid_layout() {
        assert!(matches!(
            Renderer::new("{% if %}"),
            Err(RenderError::Layout(_))
        ));
    }

    #[test]
    fn test_template_syntax_in_body_is_left_alone() {
        let renderer = Renderer::new(IDENTITY_LAYOUT).unwrap();
        let body = "<pre><code>{% for x in xs %}{{ x }}{% endfor %}</code></pre>{# not a comment\n{% raw %}{{{ three }}}";
        let ctx = context(&Config::default(), &Metadata::default(), body, "/o/a.html");
        assert_eq!(renderer.render_page(&ctx).unwrap(), body);
    }

    #[test]
    fn test_marker_values_are_displayed_as_text() {
        let config = Config::from_yaml("page:\n  count: 3\n  empty: ~\n").unwrap();
        let renderer = Renderer::new(IDENTITY_LAYOUT).unwrap();
        let ctx = context(
            &config,
            &Metadata::default(),
            "{{ count | safe }}|{{empty|safe}}|{{ url | safe }}",
            "/o/a.html",
        );
        assert_eq!(renderer.render_page(&ctx).unwrap(), "3||/a.html");
    }

    #[test]
    fn test_unknown_marker_is_a_render_error() {
        let renderer = Renderer::new(IDENTITY_LAYOUT).unwrap();
        let ctx = context(
            &Config::default(),
            &Metadata::default(),
            "{{ nothing_here | safe }}",
            "/o/a.html",
        );
        let err = renderer.render_page(&ctx).unwrap_err();
        assert!(matches!(err, RenderError::MissingValue(name) if name == "nothing_here"));
    }

    #[test]
    fn test_unknown_variable_in_layout_is_a_render_error() {
        let renderer = Renderer::new("{{ nothing_here }}").unwrap();
        let ctx = context(&Config::default(), &Metadata::default(), "", "/o/a.html");
        let err = renderer.render_page(&ctx).unwrap_err();
        assert!(matches!(err, RenderError::Template(_)));
    }
}
