//! Template composition.
//!
//! Expands include references into a single text. Every include is resolved
//! against the directory of the template that contains it, however deep the
//! nesting. Placeholders are substituted with this precedence:
//!
//! 1. parameters of the include that pulled the template in
//! 2. global page config
//! 3. the inline default
//! 4. otherwise a `{{ name | safe }}` expression for the final render
//!
//! A substituted value that itself contains an include reference is
//! expanded in place, against the directory of the template it landed in.
//!
//! Expansion uses an explicit stack of frames, one per template or
//! placeholder value being expanded. Including a template that is already
//! on the stack is a cycle, and so is a placeholder whose value leads back
//! to the same placeholder.

use crate::config::PageConfig;

use super::fetch::{FetchError, TemplateSource};
use super::format::tidy;
use super::paths::{Location, PathResolver, canonical};
use super::syntax::{Node, Params, Placeholder, find_reference, tokenize};

#[derive(thiserror::Error, Debug)]
pub enum ComposeError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("include cycle detected: {}", .chain.join(" -> "))]
    CycleDetected { chain: Vec<String> },
}

impl ComposeError {
    /// Whether the error must abort the whole build rather than one page.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ComposeError::Fetch(_))
    }
}

/// Final-render expression for a placeholder nothing could resolve.
pub fn render_marker(name: &str) -> String {
    format!("{{{{ {name} | safe }}}}")
}

/// Text form of a config value as it appears in a template.
pub fn display_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// One template or placeholder value being expanded.
struct Frame {
    location: Location,
    nodes: std::vec::IntoIter<Node>,
    params: Params,
    output: String,
    /// Name of the placeholder whose value this frame expands.
    placeholder: Option<String>,
}

impl Frame {
    fn new(location: Location, text: &str, params: Params) -> Self {
        Self {
            location,
            nodes: tokenize(text).into_iter(),
            output: String::with_capacity(text.len()),
            params,
            placeholder: None,
        }
    }

    fn label(&self) -> String {
        match &self.placeholder {
            Some(name) => format!("{{{{{{ {name} }}}}}}"),
            None => self.location.to_string(),
        }
    }
}

/// Expands include references and placeholders.
pub struct Composer<'a, S> {
    source: &'a S,
    resolver: &'a PathResolver,
    globals: &'a PageConfig,
    tidy: bool,
}

impl<'a, S: TemplateSource + Sync> Composer<'a, S> {
    pub fn new(source: &'a S, resolver: &'a PathResolver, globals: &'a PageConfig) -> Self {
        Self {
            source,
            resolver,
            globals,
            tidy: true,
        }
    }

    /// Enable or disable the tidy pass over the result.
    pub fn with_tidy(mut self, tidy: bool) -> Self {
        self.tidy = tidy;
        self
    }

    /// Compose `text`, which was read from `location`.
    pub async fn compose(&self, text: &str, location: &Location) -> Result<String, ComposeError> {
        let mut stack = vec![Frame::new(canonical(location), text, Params::new())];
        let mut composed = String::new();

        while let Some(frame) = stack.last_mut() {
            match frame.nodes.next() {
                Some(Node::Literal(literal)) => frame.output.push_str(&literal),
                Some(Node::Placeholder(placeholder)) => {
                    let value = self.substitute(&placeholder, &frame.params);
                    if find_reference(&value).is_none() {
                        frame.output.push_str(&value);
                        continue;
                    }

                    // The value pulls in templates: expand it inside this frame's directory
                    let location = frame.location.clone();
                    let params = frame.params.clone();
                    if stack
                        .iter()
                        .any(|f| f.placeholder.as_deref() == Some(placeholder.name.as_str()))
                    {
                        let mut chain: Vec<String> = stack.iter().map(Frame::label).collect();
                        chain.push(format!("{{{{{{ {} }}}}}}", placeholder.name));
                        return Err(ComposeError::CycleDetected { chain });
                    }
                    stack.push(Frame {
                        placeholder: Some(placeholder.name),
                        ..Frame::new(location, &value, params)
                    });
                }
                Some(Node::Include(reference)) => {
                    let target = canonical(
                        &self
                            .resolver
                            .resolve_template(&frame.location.parent(), &reference.name),
                    );
                    if stack.iter().any(|f| f.location == target) {
                        let mut chain: Vec<String> = stack.iter().map(Frame::label).collect();
                        chain.push(target.to_string());
                        return Err(ComposeError::CycleDetected { chain });
                    }

                    tracing::debug!("including {target}");
                    let text = self.source.fetch_text(&target).await?;
                    stack.push(Frame::new(target, &text, reference.params));
                }
                None => {
                    if let Some(done) = stack.pop() {
                        match stack.last_mut() {
                            Some(parent) => parent.output.push_str(&done.output),
                            None => composed = done.output,
                        }
                    }
                }
            }
        }

        Ok(if self.tidy { tidy(&composed) } else { composed })
    }

    fn substitute(&self, placeholder: &Placeholder, params: &Params) -> String {
        if let Some(value) = params.get(&placeholder.name) {
            return value.clone();
        }
        if let Some(value) = self.globals.get(&placeholder.name) {
            return display_value(value);
        }
        if let Some(default) = &placeholder.default {
            return default.clone();
        }
        render_marker(&placeholder.name)
    }
}
