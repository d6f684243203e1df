use std::path::{Path, PathBuf};

use crate::config::{Config, ResolvedPaths};

use super::cache::{BuildCache, ComposedTemplates, InvalidationScope, RebuildTask};
use super::compose::{ComposeError, Composer};
use super::context::PageContextBuilder;
use super::fetch::{FetchError, Fetcher};
use super::format::{FormatRegistry, output_page_path, tidy};
use super::metadata::load_metadata;
use super::paths::{Location, PathResolver, mirror_path};
use super::render::{IDENTITY_LAYOUT, RenderError, Renderer};

/// Path the preview server listens on for reload notifications.
pub const LIVE_RELOAD_PATH: &str = "/_rbuild/live-reload";

#[derive(thiserror::Error, Debug)]
pub enum BuildError {
    #[error("{kind} directory not found: {path}")]
    MissingDirectory { kind: &'static str, path: PathBuf },

    #[error("output directory {output} overlaps the {kind} directory {other}")]
    UnsafeOutput {
        output: PathBuf,
        kind: &'static str,
        other: PathBuf,
    },

    #[error("failed to compose {location}: {source}")]
    Compose {
        location: String,
        #[source]
        source: ComposeError,
    },

    #[error("failed to render {path}: {source}")]
    Render {
        path: PathBuf,
        #[source]
        source: RenderError,
    },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BuildError {
    /// Whether the error aborts the build instead of failing one file.
    pub fn is_fatal(&self) -> bool {
        match self {
            BuildError::Compose { source, .. } => source.is_fatal(),
            BuildError::Render { .. } | BuildError::Read { .. } | BuildError::Write { .. } => {
                false
            }
            _ => true,
        }
    }

    fn compose(location: &Location, source: ComposeError) -> Self {
        BuildError::Compose {
            location: location.to_string(),
            source,
        }
    }
}

/// A content file that could not be built.
#[derive(Debug)]
pub struct PageFailure {
    pub path: PathBuf,
    pub error: BuildError,
}

#[derive(Debug)]
pub struct BuildResult {
    pub output_dir: PathBuf,
    pub pages: usize,
    pub assets: usize,
    pub removed: usize,
    pub failures: Vec<PageFailure>,
}

impl BuildResult {
    fn new(output_dir: PathBuf) -> Self {
        Self {
            output_dir,
            pages: 0,
            assets: 0,
            removed: 0,
            failures: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    fn record(&mut self, path: &Path, error: BuildError) -> Result<(), BuildError> {
        if error.is_fatal() {
            return Err(error);
        }
        tracing::error!("{error}");
        self.failures.push(PageFailure {
            path: path.to_path_buf(),
            error,
        });
        Ok(())
    }
}

// =============================================================================
// File classification
// =============================================================================

/// Content files grouped by how they are built.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct FileClassification {
    pub html_files: Vec<PathBuf>,
    pub markdown_files: Vec<PathBuf>,
    pub other_files: Vec<PathBuf>,
}

/// Split files by extension using the registered page formats.
pub fn classify(files: impl IntoIterator<Item = PathBuf>, formats: &FormatRegistry) -> FileClassification {
    let mut classification = FileClassification::default();
    for file in files {
        match formats.for_path(&file).map(|format| format.name()) {
            Some("html") => classification.html_files.push(file),
            Some(_) => classification.markdown_files.push(file),
            None => classification.other_files.push(file),
        }
    }
    classification
}

/// Every file under `dir`, sorted, skipping hidden entries.
pub fn walk_content(dir: &Path) -> Result<Vec<PathBuf>, BuildError> {
    let mut files = Vec::new();
    walk_directory(dir, &mut files)?;
    files.sort();
    Ok(files)
}

fn walk_directory(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), BuildError> {
    let entries = std::fs::read_dir(dir).map_err(|source| BuildError::Read {
        path: dir.to_path_buf(),
        source,
    })?;

    for entry in entries {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }

        let path = entry.path();
        if path.is_dir() {
            walk_directory(&path, files)?;
        } else {
            files.push(path);
        }
    }
    Ok(())
}

// =============================================================================
// Output helpers
// =============================================================================

/// Create a directory and its parents. Existing directories are fine.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(path)
}

/// Write an output file, creating parent directories as needed.
pub fn write_output(path: &Path, contents: &str) -> Result<(), BuildError> {
    let write = || -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            ensure_dir(parent)?;
        }
        std::fs::write(path, contents)
    };
    write().map_err(|source| BuildError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn copy_output(from: &Path, to: &Path) -> Result<(), BuildError> {
    let copy = || -> std::io::Result<u64> {
        if let Some(parent) = to.parent() {
            ensure_dir(parent)?;
        }
        std::fs::copy(from, to)
    };
    copy().map(|_| ()).map_err(|source| BuildError::Write {
        path: to.to_path_buf(),
        source,
    })
}

/// Remove everything inside `dir`, keeping the directory itself.
fn empty_dir(dir: &Path) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            std::fs::remove_dir_all(&path)?;
        } else {
            std::fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// Script that reloads the page when the preview server announces a rebuild.
fn live_reload_script() -> String {
    format!(
        "<script>new EventSource(\"{LIVE_RELOAD_PATH}\").addEventListener(\"reload\", () => location.reload());</script>"
    )
}

fn inject_script(html: &mut String, script: &str) {
    match html.rfind("</body>") {
        Some(index) => html.insert_str(index, script),
        None => html.push_str(script),
    }
}

// =============================================================================
// Builder
// =============================================================================

pub struct Builder {
    config: Config,
    paths: ResolvedPaths,
    fetcher: Fetcher,
    formats: FormatRegistry,
    cache: BuildCache,
    live_reload: bool,
}

impl Builder {
    /// `base_path` is the directory relative config paths resolve against.
    pub fn new(config: Config, base_path: PathBuf) -> Self {
        let paths = config.paths.resolve(&base_path);
        let fetcher = Fetcher::new(config.retries);
        Self {
            config,
            paths,
            fetcher,
            formats: FormatRegistry::with_defaults(),
            cache: BuildCache::new(),
            live_reload: false,
        }
    }

    /// Inject the live reload script into every page.
    pub fn with_live_reload(mut self, enabled: bool) -> Self {
        self.live_reload = enabled;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn paths(&self) -> &ResolvedPaths {
        &self.paths
    }

    /// Build the whole site.
    pub async fn build(&mut self) -> Result<BuildResult, BuildError> {
        self.check_directories()?;

        let templates = self.compose_templates().await?;
        let renderer = self.renderer(&templates)?;

        let output_dir = self.paths.output.clone();
        if output_dir.exists() {
            empty_dir(&output_dir)?;
        } else {
            tracing::warn!("output directory {} does not exist, creating it", output_dir.display());
            ensure_dir(&output_dir)?;
        }

        let files = walk_content(&self.paths.content)?;
        let counts = classify(files.iter().cloned(), &self.formats);
        tracing::info!(
            "found {} HTML page(s), {} Markdown page(s) and {} other file(s)",
            counts.html_files.len(),
            counts.markdown_files.len(),
            counts.other_files.len()
        );

        // One pass in content order, pages and assets interleaved
        let mut result = BuildResult::new(output_dir);
        for file in &files {
            if self.formats.is_page(file) {
                match self.build_page(file, &templates, &renderer).await {
                    Ok(_) => result.pages += 1,
                    Err(e) => result.record(file, e)?,
                }
            } else {
                match self.copy_asset(file) {
                    Ok(true) => result.assets += 1,
                    Ok(false) => {}
                    Err(e) => result.record(file, e)?,
                }
            }
        }

        self.cache.store(templates);
        tracing::info!(
            "built {} page(s) and copied {} file(s) to {}",
            result.pages,
            result.assets,
            result.output_dir.display()
        );
        Ok(result)
    }

    /// Apply a targeted rebuild, reusing the cached layout.
    ///
    /// Falls back to a full build when nothing is cached yet or the scope
    /// asks for one.
    pub async fn rebuild(&mut self, scope: &InvalidationScope) -> Result<BuildResult, BuildError> {
        let tasks = match scope {
            InvalidationScope::Files(tasks) => tasks,
            InvalidationScope::Full | InvalidationScope::Config => return self.build().await,
        };
        let Some(templates) = self.cache.templates().cloned() else {
            return self.build().await;
        };
        let renderer = self.renderer(&templates)?;

        let mut result = BuildResult::new(self.paths.output.clone());
        for task in tasks {
            match task {
                RebuildTask::Page(page) => {
                    if !page.exists() || !self.formats.is_page(page) {
                        continue;
                    }
                    match self.build_page(page, &templates, &renderer).await {
                        Ok(_) => result.pages += 1,
                        Err(e) => result.record(page, e)?,
                    }
                }
                RebuildTask::Directory(dir) => {
                    for page in self.pages_in(dir)? {
                        match self.build_page(&page, &templates, &renderer).await {
                            Ok(_) => result.pages += 1,
                            Err(e) => result.record(&page, e)?,
                        }
                    }
                }
                RebuildTask::Asset(file) => match self.copy_asset(file) {
                    Ok(true) => result.assets += 1,
                    Ok(false) => {}
                    Err(e) => result.record(file, e)?,
                },
                RebuildTask::Remove(file) => {
                    if self.remove_output(file)? {
                        result.removed += 1;
                    }
                }
            }
        }

        tracing::info!(
            "rebuilt {} page(s), copied {} file(s), removed {} file(s)",
            result.pages,
            result.assets,
            result.removed
        );
        Ok(result)
    }

    fn check_directories(&self) -> Result<(), BuildError> {
        for (kind, path) in [
            ("template", &self.paths.templates),
            ("content", &self.paths.content),
        ] {
            if !path.is_dir() {
                return Err(BuildError::MissingDirectory {
                    kind,
                    path: path.clone(),
                });
            }
        }

        let output = absolute(&self.paths.output);
        for (kind, path) in [
            ("content", &self.paths.content),
            ("template", &self.paths.templates),
        ] {
            let other = absolute(path);
            if other.starts_with(&output) || output.starts_with(&other) {
                return Err(BuildError::UnsafeOutput {
                    output: self.paths.output.clone(),
                    kind,
                    other: path.clone(),
                });
            }
        }
        Ok(())
    }

    fn resolver(&self) -> PathResolver {
        PathResolver::new(&self.paths.templates)
    }

    /// Compose the layout and every child template.
    ///
    /// Any error here is fatal: every page depends on these templates.
    async fn compose_templates(&self) -> Result<ComposedTemplates, BuildError> {
        let resolver = self.resolver();
        let composer = Composer::new(&self.fetcher, &resolver, &self.config.page)
            .with_tidy(self.config.tidy);
        let root = Location::Local(self.paths.templates.clone());

        let layout_location = resolver.resolve(&root, &self.config.layout);
        let layout = match &layout_location {
            Location::Local(path) if !path.exists() => {
                tracing::warn!("layout {} not found, pages are written without one", path.display());
                IDENTITY_LAYOUT.to_string()
            }
            location => {
                tracing::info!("composing layout {location}");
                self.compose_template(&composer, location).await?
            }
        };

        let mut children = std::collections::BTreeMap::new();
        for (key, child) in &self.config.child_templates {
            let location = resolver.resolve_template(&root, &child.path);
            tracing::info!("composing child template {key} from {location}");
            children.insert(key.clone(), self.compose_template(&composer, &location).await?);
        }

        Ok(ComposedTemplates { layout, children })
    }

    async fn compose_template(
        &self,
        composer: &Composer<'_, Fetcher>,
        location: &Location,
    ) -> Result<String, BuildError> {
        let text = self
            .fetcher
            .fetch(location)
            .await
            .map_err(|e: FetchError| BuildError::compose(location, e.into()))?;
        composer
            .compose(&text, location)
            .await
            .map_err(|e| BuildError::compose(location, e))
    }

    fn renderer(&self, templates: &ComposedTemplates) -> Result<Renderer, BuildError> {
        Renderer::new(&templates.layout).map_err(|source| BuildError::Render {
            path: self.paths.templates.join(&self.config.layout),
            source,
        })
    }

    /// Compose, render and write one page. Returns the output path.
    async fn build_page(
        &self,
        page: &Path,
        templates: &ComposedTemplates,
        renderer: &Renderer,
    ) -> Result<PathBuf, BuildError> {
        tracing::debug!("building {}", page.display());
        let text = tokio::fs::read_to_string(page)
            .await
            .map_err(|source| BuildError::Read {
                path: page.to_path_buf(),
                source,
            })?;

        let resolver = self.resolver();
        let location = Location::Local(page.to_path_buf());
        let composed = Composer::new(&self.fetcher, &resolver, &self.config.page)
            .with_tidy(false)
            .compose(&text, &location)
            .await
            .map_err(|e| BuildError::compose(&location, e))?;
        let body = match self.formats.for_path(page) {
            Some(format) => format.to_html(composed),
            None => composed,
        };
        // Tidy after conversion so Markdown line breaks survive
        let body = if self.config.tidy { tidy(&body) } else { body };

        let metadata = load_metadata(page, &self.config.metadata_file);
        let context = PageContextBuilder::new(&self.config, &self.paths.content)
            .with_templates(&templates.children)
            .build(&metadata, body, page);
        let mut html = renderer
            .render_page(&context)
            .map_err(|source| BuildError::Render {
                path: page.to_path_buf(),
                source,
            })?;
        if self.live_reload {
            inject_script(&mut html, &live_reload_script());
        }

        let output = self.output_path(page)?;
        write_output(&output, &html)?;
        Ok(output)
    }

    /// Copy a non-page content file. Metadata sidecars are skipped.
    fn copy_asset(&self, file: &Path) -> Result<bool, BuildError> {
        if self.is_sidecar(file) || !file.exists() {
            return Ok(false);
        }
        let output = self.output_path(file)?;
        copy_output(file, &output)?;
        Ok(true)
    }

    /// Delete the output mirrored from a removed content file.
    fn remove_output(&self, file: &Path) -> Result<bool, BuildError> {
        if self.is_sidecar(file) {
            return Ok(false);
        }
        let output = self.output_path(file)?;
        if !output.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&output)?;
        tracing::info!("removed {}", output.display());
        Ok(true)
    }

    fn is_sidecar(&self, file: &Path) -> bool {
        file.file_name()
            .is_some_and(|name| name.to_string_lossy() == self.config.metadata_file)
    }

    /// Sorted pages directly inside `dir`.
    fn pages_in(&self, dir: &Path) -> Result<Vec<PathBuf>, BuildError> {
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut pages = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && self.formats.is_page(&path) {
                pages.push(path);
            }
        }
        pages.sort();
        Ok(pages)
    }

    /// Output location of a content file. Pages always end in `.html`/`.htm`.
    fn output_path(&self, file: &Path) -> Result<PathBuf, BuildError> {
        let mirrored = mirror_path(file, &self.paths.content, &self.paths.output).ok_or_else(|| {
            BuildError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is outside the content directory", file.display()),
            ))
        })?;
        Ok(if self.formats.is_page(file) {
            output_page_path(&mirrored)
        } else {
            mirrored
        })
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path)
        .map(|p| super::paths::normalize(&p))
        .unwrap_or_else(|_| path.to_path_buf())
}
