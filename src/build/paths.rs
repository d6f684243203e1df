//! Path and URL resolution.
//!
//! This module handles:
//! - Template locations, which are either local files or remote URLs
//! - Combining a base location with a reference found in a template
//! - Mirroring content-root paths into the output root
//! - Deriving public page URLs

use std::fmt;
use std::path::{Component, Path, PathBuf};

use url::Url;

// =============================================================================
// Locations
// =============================================================================

/// Where a template lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Location {
    /// A file on the local filesystem
    Local(PathBuf),
    /// An `http://` or `https://` URL
    Remote(Url),
}

impl Location {
    /// Parse a reference string. Only `http(s)` URLs are treated as remote.
    pub fn parse(s: &str) -> Self {
        match remote_url(s) {
            Some(url) => Location::Remote(url),
            None => Location::Local(PathBuf::from(s)),
        }
    }

    /// The directory containing this location.
    ///
    /// For URLs the last path segment is dropped and the trailing slash kept,
    /// so that a later join resolves inside the directory.
    pub fn parent(&self) -> Location {
        match self {
            Location::Local(path) => Location::Local(
                path.parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_default(),
            ),
            Location::Remote(url) => {
                Location::Remote(url.join("./").unwrap_or_else(|_| url.clone()))
            }
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Local(path) => write!(f, "{}", path.display()),
            Location::Remote(url) => write!(f, "{url}"),
        }
    }
}

fn remote_url(s: &str) -> Option<Url> {
    if !(s.starts_with("http://") || s.starts_with("https://")) {
        return None;
    }
    Url::parse(s).ok()
}

// =============================================================================
// Resolver
// =============================================================================

/// Combines a base location with a reference found inside a template.
///
/// References beginning with `/` are rooted at `root` (the template
/// directory), not at the filesystem root.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve `next` against the directory `base`.
    pub fn resolve(&self, base: &Location, next: &str) -> Location {
        match base {
            Location::Remote(base_url) => match base_url.join(next) {
                Ok(url) => Location::Remote(url),
                Err(_) => Location::parse(next),
            },
            Location::Local(_) if remote_url(next).is_some() => Location::parse(next),
            Location::Local(base) => {
                let joined = match next.strip_prefix('/') {
                    Some(rooted) => self.root.join(rooted),
                    None => base.join(next),
                };
                Location::Local(normalize(&joined))
            }
        }
    }

    /// Resolve an include reference to a template location.
    ///
    /// Same as [`resolve`](Self::resolve), except that a local reference
    /// without an extension names an `.html` file (`{{ nav }}` -> `nav.html`).
    pub fn resolve_template(&self, base: &Location, name: &str) -> Location {
        match self.resolve(base, name) {
            Location::Local(path) if path.extension().is_none() => {
                Location::Local(path.with_extension("html"))
            }
            other => other,
        }
    }
}

/// Identity of a location for cycle detection: local paths are normalized.
pub fn canonical(location: &Location) -> Location {
    match location {
        Location::Local(path) => Location::Local(normalize(path)),
        Location::Remote(url) => Location::Remote(url.clone()),
    }
}

/// Collapse `.` and `..` components without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(
                    out.components().next_back(),
                    Some(Component::Normal(_))
                ) && out.pop();
                if !popped && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

// =============================================================================
// Output mirroring
// =============================================================================

/// Path of `path` relative to `root`, or `None` when it lies outside.
pub fn relative_to(path: &Path, root: &Path) -> Option<PathBuf> {
    path.strip_prefix(root).ok().map(Path::to_path_buf)
}

/// Mirror a file from the `from` tree into the `to` tree.
///
/// ```ignore
/// mirror_path("origin/blog/a.png", "origin", "public") => "public/blog/a.png"
/// ```
pub fn mirror_path(path: &Path, from: &Path, to: &Path) -> Option<PathBuf> {
    relative_to(path, from).map(|relative| to.join(relative))
}

/// Content-relative path rendered with forward slashes.
pub fn url_path(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Public URL of a page.
///
/// The site URL and the content-relative path are joined with exactly one
/// slash, and a trailing `index.html` segment is dropped.
///
/// ```ignore
/// page_url(Some("https://x.com"), "blog/index.html") => "https://x.com/blog/"
/// page_url(None, "about.html") => "/about.html"
/// ```
pub fn page_url(site_url: Option<&str>, relative: &str) -> String {
    let base = site_url.unwrap_or("").trim_end_matches('/');
    let relative = relative.trim_start_matches('/');
    let relative = if relative == "index.html" {
        ""
    } else {
        relative.strip_suffix("/index.html").map_or(relative, |dir| {
            // keep the trailing slash of the directory
            &relative[..dir.len() + 1]
        })
    };
    format!("{base}/{relative}")
}

/// Get the base path from a config file path (its parent directory).
pub fn base_path_from_config(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(path: &str) -> Location {
        Location::Local(PathBuf::from(path))
    }

    #[test]
    fn test_parse_location() {
        assert!(matches!(Location::parse("https://x.com/a.html"), Location::Remote(_)));
        assert!(matches!(Location::parse("http://x.com/a.html"), Location::Remote(_)));
        assert_eq!(Location::parse("partials/a.html"), local("partials/a.html"));
        assert_eq!(Location::parse("C:/templates/a.html"), local("C:/templates/a.html"));
    }

    #[test]
    fn test_resolve_relative() {
        let resolver = PathResolver::new("/site/template");
        assert_eq!(
            resolver.resolve(&local("/site/template/sub"), "partial.html"),
            local("/site/template/sub/partial.html")
        );
        assert_eq!(
            resolver.resolve(&local("/site/template/sub"), "../top.html"),
            local("/site/template/top.html")
        );
        assert_eq!(
            resolver.resolve(&local("/site/template"), "./a/./b.html"),
            local("/site/template/a/b.html")
        );
    }

    #[test]
    fn test_resolve_rooted_at_template_root() {
        let resolver = PathResolver::new("/site/template");
        assert_eq!(
            resolver.resolve(&local("/site/template/deep/er"), "/partials/nav.html"),
            local("/site/template/partials/nav.html")
        );
    }

    #[test]
    fn test_resolve_remote_next_wins() {
        let resolver = PathResolver::new("/site/template");
        assert_eq!(
            resolver.resolve(&local("/site/template"), "https://cdn.x.com/a.html"),
            Location::parse("https://cdn.x.com/a.html")
        );
    }

    #[test]
    fn test_resolve_remote_base_uses_url_join() {
        let resolver = PathResolver::new("/site/template");
        let base = Location::parse("https://x.com/template/");
        assert_eq!(
            resolver.resolve(&base, "nav.html"),
            Location::parse("https://x.com/template/nav.html")
        );
        assert_eq!(
            resolver.resolve(&base, "/root.html"),
            Location::parse("https://x.com/root.html")
        );
    }

    #[test]
    fn test_resolve_template_defaults_to_html() {
        let resolver = PathResolver::new("/t");
        assert_eq!(
            resolver.resolve_template(&local("/t/sub"), "partial"),
            local("/t/sub/partial.html")
        );
        assert_eq!(
            resolver.resolve_template(&local("/t/sub"), "partial.htm"),
            local("/t/sub/partial.htm")
        );
        assert_eq!(
            resolver.resolve_template(&local("/t"), "https://x.com/api/header"),
            Location::parse("https://x.com/api/header")
        );
    }

    #[test]
    fn test_parent() {
        assert_eq!(local("/a/b/c.html").parent(), local("/a/b"));
        assert_eq!(
            Location::parse("https://x.com/t/layout.html").parent(),
            Location::parse("https://x.com/t/")
        );
    }

    #[test]
    fn test_normalize_keeps_leading_parent_dirs() {
        assert_eq!(normalize(Path::new("../a/../b")), PathBuf::from("../b"));
        assert_eq!(normalize(Path::new("/../a")), PathBuf::from("/a"));
    }

    #[test]
    fn test_mirror_path() {
        assert_eq!(
            mirror_path(
                Path::new("/site/origin/blog/a.png"),
                Path::new("/site/origin"),
                Path::new("/site/public")
            ),
            Some(PathBuf::from("/site/public/blog/a.png"))
        );
        assert_eq!(
            mirror_path(
                Path::new("/elsewhere/a.png"),
                Path::new("/site/origin"),
                Path::new("/site/public")
            ),
            None
        );
    }

    #[test]
    fn test_page_url_strips_index() {
        assert_eq!(
            page_url(Some("https://x.com"), "blog/index.html"),
            "https://x.com/blog/"
        );
        assert_eq!(page_url(Some("https://x.com/"), "index.html"), "https://x.com/");
        assert_eq!(
            page_url(Some("https://x.com"), "blog/post.html"),
            "https://x.com/blog/post.html"
        );
    }

    #[test]
    fn test_page_url_only_strips_trailing_segment() {
        assert_eq!(
            page_url(Some("https://x.com"), "index.html.d/page.html"),
            "https://x.com/index.html.d/page.html"
        );
        assert_eq!(
            page_url(Some("https://x.com"), "myindex.html"),
            "https://x.com/myindex.html"
        );
    }

    #[test]
    fn test_page_url_without_site_url_is_root_relative() {
        assert_eq!(page_url(None, "about.html"), "/about.html");
        assert_eq!(page_url(None, "index.html"), "/");
    }

    #[test]
    fn test_url_path() {
        assert_eq!(url_path(Path::new("blog/2024/post.html")), "blog/2024/post.html");
    }

    #[test]
    fn test_base_path_from_config() {
        assert_eq!(
            base_path_from_config(Path::new("/project/rbuild.yaml")),
            PathBuf::from("/project")
        );
        assert_eq!(
            base_path_from_config(Path::new("rbuild.yaml")),
            PathBuf::from("")
        );
    }
}
