//! Include-reference and placeholder scanning.
//!
//! Two markers are recognised in template text:
//!
//! ```text
//! {{ name }}                      include another template
//! {{ name | key=value | k2=v2 }}  include with parameters
//! {{{ name }}}                    placeholder
//! {{{ name=default }}}            placeholder with inline default
//! ```
//!
//! Scanning never fails. Anything that is not a well-formed marker is
//! literal text, including final-render expressions such as
//! `{{ title | safe }}` (a pipe segment without `=` is not a parameter).

use std::collections::BTreeMap;
use std::ops::Range;

/// Parameters attached to an include reference.
pub type Params = BTreeMap<String, String>;

/// A parsed `{{ name | k=v }}` marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateReference {
    pub name: String,
    pub params: Params,
}

/// A parsed `{{{ name=default }}}` marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub name: String,
    pub default: Option<String>,
}

/// One piece of tokenized template text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Literal(String),
    Include(TemplateReference),
    Placeholder(Placeholder),
}

/// A marker found at a byte range of the scanned text.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Marker {
    Include(TemplateReference),
    Placeholder(Placeholder),
}

/// Split `text` into literal runs and markers.
pub fn tokenize(text: &str) -> Vec<Node> {
    let mut nodes = Vec::new();
    let mut literal_start = 0;
    let mut pos = 0;

    while let Some(offset) = text[pos..].find("{{") {
        let start = pos + offset;
        match parse_marker_at(text, start) {
            Some((end, marker)) => {
                if literal_start < start {
                    nodes.push(Node::Literal(text[literal_start..start].to_string()));
                }
                nodes.push(match marker {
                    Marker::Include(reference) => Node::Include(reference),
                    Marker::Placeholder(placeholder) => Node::Placeholder(placeholder),
                });
                pos = end;
                literal_start = end;
            }
            None => pos = start + 1,
        }
    }

    if literal_start < text.len() {
        nodes.push(Node::Literal(text[literal_start..].to_string()));
    }
    nodes
}

/// Leftmost well-formed include reference and its byte range.
pub fn find_reference(text: &str) -> Option<(Range<usize>, TemplateReference)> {
    scan(text).find_map(|(range, marker)| match marker {
        Marker::Include(reference) => Some((range, reference)),
        Marker::Placeholder(_) => None,
    })
}

/// Iterate over all markers, left to right, without overlap.
fn scan(text: &str) -> impl Iterator<Item = (Range<usize>, Marker)> + '_ {
    let mut pos = 0;
    std::iter::from_fn(move || {
        while let Some(offset) = text[pos..].find("{{") {
            let start = pos + offset;
            if let Some((end, marker)) = parse_marker_at(text, start) {
                pos = end;
                return Some((start..end, marker));
            }
            pos = start + 1;
        }
        None
    })
}

/// Try to parse a marker starting at `start`, which must point at `{{`.
fn parse_marker_at(text: &str, start: usize) -> Option<(usize, Marker)> {
    let rest = &text[start..];
    if rest.starts_with("{{{") {
        if let Some((len, placeholder)) = parse_placeholder(rest) {
            return Some((start + len, Marker::Placeholder(placeholder)));
        }
        // `{{{` that is not a placeholder never opens an include either
        return None;
    }
    parse_reference(rest).map(|(len, reference)| (start + len, Marker::Include(reference)))
}

/// Parse `{{{ ident }}}` or `{{{ ident=default }}}` at the start of `s`.
fn parse_placeholder(s: &str) -> Option<(usize, Placeholder)> {
    let mut cursor = Cursor::new(s, 3);
    cursor.skip_whitespace();
    let name = cursor.take_while(|c| c.is_ascii_alphanumeric() || c == '_');
    if name.is_empty() {
        return None;
    }
    cursor.skip_whitespace();

    if cursor.eat("}}}") {
        return Some((
            cursor.pos,
            Placeholder {
                name: name.to_string(),
                default: None,
            },
        ));
    }

    if !cursor.eat("=") {
        return None;
    }
    let remaining = cursor.remaining();
    let close = remaining.find("}}}")?;
    let default = &remaining[..close];
    if default.contains('\n') {
        return None;
    }
    Some((
        cursor.pos + close + 3,
        Placeholder {
            name: name.to_string(),
            default: Some(default.trim().to_string()),
        },
    ))
}

/// Parse `{{ name | k=v }}` at the start of `s`.
fn parse_reference(s: &str) -> Option<(usize, TemplateReference)> {
    let mut cursor = Cursor::new(s, 2);
    cursor.skip_whitespace();
    let name = cursor.take_while(|c| !c.is_whitespace() && !matches!(c, '|' | '{' | '}'));
    if name.is_empty() {
        return None;
    }
    cursor.skip_whitespace();

    let mut params = Params::new();
    loop {
        if cursor.eat("}}") {
            return Some((
                cursor.pos,
                TemplateReference {
                    name: name.to_string(),
                    params,
                },
            ));
        }
        if !cursor.eat("|") {
            return None;
        }
        let segment = cursor.take_while(|c| !matches!(c, '|' | '{' | '}'));
        let (key, value) = segment.split_once('=')?;
        let key = key.trim();
        if key.is_empty() {
            return None;
        }
        params.insert(key.to_string(), value.trim().to_string());
    }
}

/// Parse a `{{ name | safe }}` final-render marker at the start of `s`.
///
/// Returns the marker length and the name. Only plain identifiers are
/// accepted, which is all composition ever emits.
pub fn parse_render_marker(s: &str) -> Option<(usize, &str)> {
    let mut cursor = Cursor::new(s, 0);
    if !cursor.eat("{{") || cursor.remaining().starts_with('{') {
        return None;
    }
    cursor.skip_whitespace();
    let name = cursor.take_while(|c| c.is_ascii_alphanumeric() || c == '_');
    if name.is_empty() {
        return None;
    }
    cursor.skip_whitespace();
    if !cursor.eat("|") {
        return None;
    }
    cursor.skip_whitespace();
    if !cursor.eat("safe") {
        return None;
    }
    cursor.skip_whitespace();
    cursor.eat("}}").then_some((cursor.pos, name))
}

/// Byte cursor over a marker candidate.
struct Cursor<'a> {
    s: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(s: &'a str, pos: usize) -> Self {
        Self { s, pos }
    }

    fn remaining(&self) -> &'a str {
        &self.s[self.pos..]
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.remaining().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let remaining = self.remaining();
        let len = remaining
            .char_indices()
            .find(|&(_, c)| !pred(c))
            .map_or(remaining.len(), |(i, _)| i);
        self.pos += len;
        &remaining[..len]
    }

    fn skip_whitespace(&mut self) {
        self.take_while(char::is_whitespace);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(name: &str, params: &[(&str, &str)]) -> TemplateReference {
        TemplateReference {
            name: name.to_string(),
            params: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_simple_reference() {
        let (range, found) = find_reference("<div>{{ nav.html }}</div>").unwrap();
        assert_eq!(range, 5..19);
        assert_eq!(found, reference("nav.html", &[]));
    }

    #[test]
    fn test_reference_without_spaces() {
        let (_, found) = find_reference("{{header}}").unwrap();
        assert_eq!(found, reference("header", &[]));
    }

    #[test]
    fn test_reference_with_params() {
        let (_, found) = find_reference("{{ card.html | title=Hello World | size=2 }}").unwrap();
        assert_eq!(
            found,
            reference("card.html", &[("title", "Hello World"), ("size", "2")])
        );
    }

    #[test]
    fn test_param_value_keeps_later_equals_signs() {
        let (_, found) = find_reference("{{ a | href=/x?y=1 }}").unwrap();
        assert_eq!(found.params["href"], "/x?y=1");
    }

    #[test]
    fn test_reference_to_url() {
        let (_, found) = find_reference("{{ https://x.com/t/nav.html }}").unwrap();
        assert_eq!(found.name, "https://x.com/t/nav.html");
    }

    #[test]
    fn test_no_reference() {
        assert_eq!(find_reference("plain <b>html</b>"), None);
        assert_eq!(find_reference("{{ }}"), None);
        assert_eq!(find_reference("{{ unclosed"), None);
        assert_eq!(find_reference("{{ a b }}"), None);
    }

    #[test]
    fn test_render_marker_is_not_a_reference() {
        assert_eq!(find_reference("{{ title | safe }}"), None);
        assert_eq!(find_reference("<h1>{{ title | safe }}</h1>"), None);
    }

    #[test]
    fn test_parse_render_marker() {
        assert_eq!(parse_render_marker("{{ title | safe }} rest"), Some((18, "title")));
        assert_eq!(parse_render_marker("{{page_js|safe}}"), Some((16, "page_js")));
        assert_eq!(parse_render_marker("{{ title }}"), None);
        assert_eq!(parse_render_marker("{{ a.b | safe }}"), None);
        assert_eq!(parse_render_marker("{{{ title | safe }}}"), None);
        assert_eq!(parse_render_marker("{% raw %}"), None);
    }

    #[test]
    fn test_placeholder_is_not_a_reference() {
        assert_eq!(find_reference("{{{ title }}}"), None);
        assert_eq!(find_reference("{{{ not a placeholder }}}"), None);
    }

    #[test]
    fn test_leftmost_well_formed_reference() {
        let (range, found) = find_reference("{{ bad | x }} then {{ good }}").unwrap();
        assert_eq!(found.name, "good");
        assert_eq!(range, 19..29);
    }

    fn placeholder(text: &str) -> Option<Placeholder> {
        match tokenize(text).as_slice() {
            [Node::Placeholder(p)] => Some(p.clone()),
            _ => None,
        }
    }

    #[test]
    fn test_placeholders() {
        let p = placeholder("{{{title}}}").unwrap();
        assert_eq!(p.name, "title");
        assert_eq!(p.default, None);

        let p = placeholder("{{{ color = dark blue }}}").unwrap();
        assert_eq!(p.name, "color");
        assert_eq!(p.default.as_deref(), Some("dark blue"));

        let p = placeholder("{{{empty=}}}").unwrap();
        assert_eq!(p.default.as_deref(), Some(""));

        let p = placeholder("{{{ nav={{ partials/nav }} }}}").unwrap();
        assert_eq!(p.default.as_deref(), Some("{{ partials/nav }}"));
    }

    #[test]
    fn test_malformed_placeholders() {
        assert_eq!(placeholder("{{{ two words }}}"), None);
        assert_eq!(placeholder("{{{ a=line\nbreak }}}"), None);
        assert_eq!(placeholder("{{{ unclosed"), None);
        assert_eq!(placeholder("{{ title }}"), None);
    }

    #[test]
    fn test_tokenize() {
        let nodes = tokenize("<a>{{ nav | x=1 }}</a>{{{title=Home}}}!");
        assert_eq!(
            nodes,
            vec![
                Node::Literal("<a>".to_string()),
                Node::Include(reference("nav", &[("x", "1")])),
                Node::Literal("</a>".to_string()),
                Node::Placeholder(Placeholder {
                    name: "title".to_string(),
                    default: Some("Home".to_string()),
                }),
                Node::Literal("!".to_string()),
            ]
        );
    }

    #[test]
    fn test_tokenize_plain_text_is_one_literal() {
        assert_eq!(
            tokenize("no markers { here } {{"),
            vec![Node::Literal("no markers { here } {{".to_string())]
        );
        assert!(tokenize("").is_empty());
    }

    #[test]
    fn test_tokenize_multibyte_text() {
        let nodes = tokenize("héllo {{ ñav }} wörld");
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[1], Node::Include(reference("ñav", &[])));
    }
}
