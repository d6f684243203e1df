//! Rebuild planning and the composed-template cache.
//!
//! Watch mode turns filesystem events into [`ChangeKind`]s, and
//! [`invalidation_scope`] decides how much of the site has to be rebuilt.
//! The composed layout and child templates are kept in a [`BuildCache`] so a
//! single-page rebuild does not compose them again.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

// =============================================================================
// Change detection types
// =============================================================================

/// What kind of change was detected in the filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeKind {
    /// A page (HTML or Markdown) was added, modified, or deleted.
    Page { path: PathBuf, deleted: bool },
    /// A metadata sidecar was added, modified, or deleted.
    Metadata { path: PathBuf },
    /// Any other content file was added, modified, or deleted.
    Asset { path: PathBuf, deleted: bool },
    /// A file under the template directory changed.
    Template { path: PathBuf },
    /// The config file changed.
    Config,
}

/// One unit of work in a targeted rebuild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildTask {
    /// Compose and write a single page.
    Page(PathBuf),
    /// Rebuild every page directly inside a directory.
    Directory(PathBuf),
    /// Copy a single asset.
    Asset(PathBuf),
    /// Delete the output mirrored from a removed content file.
    Remove(PathBuf),
}

/// What scope of rebuild is needed based on the changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidationScope {
    /// Targeted work on individual files, in event order.
    Files(Vec<RebuildTask>),
    /// Full rebuild (a template changed).
    Full,
    /// Reload the config, then rebuild everything.
    Config,
}

impl InvalidationScope {
    pub fn is_empty(&self) -> bool {
        matches!(self, InvalidationScope::Files(tasks) if tasks.is_empty())
    }
}

/// Determine the invalidation scope based on a batch of changes.
pub fn invalidation_scope(changes: &[ChangeKind]) -> InvalidationScope {
    let mut tasks: Vec<RebuildTask> = Vec::new();
    let mut full = false;

    for change in changes {
        let task = match change {
            ChangeKind::Config => return InvalidationScope::Config,
            ChangeKind::Template { .. } => {
                full = true;
                continue;
            }
            ChangeKind::Page { path, deleted: true } | ChangeKind::Asset { path, deleted: true } => {
                RebuildTask::Remove(path.clone())
            }
            ChangeKind::Page { path, .. } => RebuildTask::Page(path.clone()),
            ChangeKind::Asset { path, .. } => RebuildTask::Asset(path.clone()),
            ChangeKind::Metadata { path } => RebuildTask::Directory(
                path.parent().map(Path::to_path_buf).unwrap_or_default(),
            ),
        };

        // A later event for the same file replaces an earlier one
        tasks.retain(|existing| !same_target(existing, &task));
        tasks.push(task);
    }

    if full {
        return InvalidationScope::Full;
    }
    InvalidationScope::Files(tasks)
}

fn same_target(a: &RebuildTask, b: &RebuildTask) -> bool {
    match (a, b) {
        (RebuildTask::Directory(a), RebuildTask::Directory(b)) => a == b,
        (RebuildTask::Directory(_), _) | (_, RebuildTask::Directory(_)) => false,
        (a, b) => a.path() == b.path(),
    }
}

impl RebuildTask {
    pub fn path(&self) -> &Path {
        match self {
            RebuildTask::Page(path)
            | RebuildTask::Directory(path)
            | RebuildTask::Asset(path)
            | RebuildTask::Remove(path) => path,
        }
    }
}

// =============================================================================
// Build cache
// =============================================================================

/// Templates composed by the last full build.
#[derive(Debug, Clone, Default)]
pub struct ComposedTemplates {
    /// Composed layout text
    pub layout: String,
    /// Composed child templates by key
    pub children: BTreeMap<String, String>,
}

/// Single-slot cache owned by the builder.
#[derive(Debug, Default)]
pub struct BuildCache {
    templates: Option<ComposedTemplates>,
}

impl BuildCache {
    /// Create a new empty build cache.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn templates(&self) -> Option<&ComposedTemplates> {
        self.templates.as_ref()
    }

    pub fn store(&mut self, templates: ComposedTemplates) {
        self.templates = Some(templates);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(path: &str) -> ChangeKind {
        ChangeKind::Page {
            path: PathBuf::from(path),
            deleted: false,
        }
    }

    #[test]
    fn test_template_change_is_full_rebuild() {
        let changes = vec![
            page("/o/a.html"),
            ChangeKind::Template {
                path: PathBuf::from("/t/nav.html"),
            },
        ];
        assert_eq!(invalidation_scope(&changes), InvalidationScope::Full);
    }

    #[test]
    fn test_config_change_wins() {
        let changes = vec![
            ChangeKind::Template {
                path: PathBuf::from("/t/nav.html"),
            },
            ChangeKind::Config,
        ];
        assert_eq!(invalidation_scope(&changes), InvalidationScope::Config);
    }

    #[test]
    fn test_file_tasks() {
        let changes = vec![
            page("/o/a.html"),
            ChangeKind::Metadata {
                path: PathBuf::from("/o/blog/metadata.yaml"),
            },
            ChangeKind::Asset {
                path: PathBuf::from("/o/logo.png"),
                deleted: false,
            },
            ChangeKind::Page {
                path: PathBuf::from("/o/old.html"),
                deleted: true,
            },
        ];
        assert_eq!(
            invalidation_scope(&changes),
            InvalidationScope::Files(vec![
                RebuildTask::Page(PathBuf::from("/o/a.html")),
                RebuildTask::Directory(PathBuf::from("/o/blog")),
                RebuildTask::Asset(PathBuf::from("/o/logo.png")),
                RebuildTask::Remove(PathBuf::from("/o/old.html")),
            ])
        );
    }

    #[test]
    fn test_later_event_replaces_earlier() {
        let changes = vec![
            page("/o/a.html"),
            page("/o/b.html"),
            ChangeKind::Page {
                path: PathBuf::from("/o/a.html"),
                deleted: true,
            },
            page("/o/b.html"),
        ];
        assert_eq!(
            invalidation_scope(&changes),
            InvalidationScope::Files(vec![
                RebuildTask::Remove(PathBuf::from("/o/a.html")),
                RebuildTask::Page(PathBuf::from("/o/b.html")),
            ])
        );
    }

    #[test]
    fn test_no_changes() {
        assert!(invalidation_scope(&[]).is_empty());
    }

    #[test]
    fn test_cache_slot() {
        let mut cache = BuildCache::new();
        assert!(cache.templates().is_none());

        cache.store(ComposedTemplates {
            layout: "{{ doc | safe }}".to_string(),
            children: BTreeMap::new(),
        });
        assert_eq!(cache.templates().unwrap().layout, "{{ doc | safe }}");

        cache.store(ComposedTemplates {
            layout: "<main>{{ doc | safe }}</main>".to_string(),
            children: BTreeMap::new(),
        });
        assert_eq!(
            cache.templates().unwrap().layout,
            "<main>{{ doc | safe }}</main>"
        );
    }
}
