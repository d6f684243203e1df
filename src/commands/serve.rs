use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use axum::Router;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use futures_util::stream::Stream;
use tokio::sync::broadcast;
use tower_http::services::ServeDir;

use crate::{
    ServeArgs,
    build::{
        BuildResult, Builder, ChangeKind, FileWatcher, InvalidationScope, LIVE_RELOAD_PATH,
        PathClassifier, WatchEvent, WatchPaths, base_path_from_config, invalidation_scope,
    },
    config::Config,
};

/// SSE handler for live reload notifications.
async fn live_reload_handler(
    State(tx): State<broadcast::Sender<()>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = tx.subscribe();
    let stream = async_stream::stream! {
        let mut rx = rx;
        loop {
            match rx.recv().await {
                Ok(_) => {
                    yield Ok(Event::default().event("reload").data("reload"));
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    // Missed some messages, but that's fine - we just need the latest
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    break;
                }
            }
        }
    };
    Sse::new(stream).keep_alive(KeepAlive::default())
}

pub async fn run(args: &ServeArgs) -> Result<(), anyhow::Error> {
    // Watcher events carry canonical paths, so resolve everything the same way
    let config_path = canonical(&Config::path_from_arg(args.config_file.as_deref())?);
    let config = Config::load(&config_path)?;

    // Get the base path for resolving relative paths
    let base_path = canonical(&base_path_from_config(&config_path));
    let live_reload = args.watch && config.dev.live_reload;

    // Create broadcast channel for live reload
    let (reload_tx, _) = broadcast::channel::<()>(16);

    // Build the site first
    println!("Building site...");
    let mut builder = Builder::new(config, base_path.clone()).with_live_reload(live_reload);
    let result = builder.build().await?;
    report(&result);

    let output_dir = result.output_dir.clone();

    // Set up file watcher if enabled
    let _watcher_handle = if args.watch {
        let paths = builder.paths();
        let watch_paths = WatchPaths {
            content_dir: canonical(&paths.content),
            templates_dir: canonical(&paths.templates),
            config_path: canonical(&config_path),
        };
        let classifier = PathClassifier::new(&watch_paths, builder.config().metadata_file.clone());

        let watch_config = builder.config().dev.watch.clone();
        match FileWatcher::new(&watch_config, &watch_paths, classifier) {
            Ok(watcher) => {
                println!("Watching for changes...");
                let worker = RebuildWorker {
                    builder,
                    config_path: config_path.clone(),
                    base_path,
                    live_reload,
                    reload_tx: reload_tx.clone(),
                };
                Some(tokio::task::spawn_blocking(move || worker.run(watcher)))
            }
            Err(e) => {
                eprintln!("Warning: Failed to start file watcher: {}", e);
                None
            }
        }
    } else {
        None
    };

    // Create the static file server
    let serve_dir = ServeDir::new(&output_dir).append_index_html_on_directories(true);

    // Build router with SSE endpoint for live reload
    let app = Router::new()
        .route(LIVE_RELOAD_PATH, get(live_reload_handler))
        .with_state(reload_tx)
        .fallback_service(serve_dir);

    // Parse the address
    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;

    // Determine the URL to display
    let display_host = if args.bind == "0.0.0.0" {
        "localhost"
    } else {
        &args.bind
    };
    let url = format!("http://{}:{}", display_host, args.port);

    println!("\nServing site at {}", url);
    println!("Press Ctrl+C to stop\n");

    // Open browser if requested
    if args.open
        && let Err(e) = open::that(&url)
    {
        eprintln!("Failed to open browser: {}", e);
    }

    // Start the server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Owns the builder and applies rebuilds one batch at a time.
struct RebuildWorker {
    builder: Builder,
    config_path: PathBuf,
    base_path: PathBuf,
    live_reload: bool,
    reload_tx: broadcast::Sender<()>,
}

impl RebuildWorker {
    fn run(mut self, watcher: FileWatcher) {
        let rt = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                eprintln!("Failed to create rebuild runtime: {}", e);
                return;
            }
        };

        while let Some(event) = watcher.recv() {
            let mut changes = Vec::new();
            self.collect(event, &mut changes);
            // Fold anything that queued up during the last rebuild into this batch
            while let Some(event) = watcher.try_recv() {
                self.collect(event, &mut changes);
            }
            if changes.is_empty() {
                continue;
            }

            let scope = invalidation_scope(&changes);
            if scope.is_empty() {
                continue;
            }
            println!("\nDetected {} change(s), rebuilding...", changes.len());

            if scope == InvalidationScope::Config && !self.reload_config() {
                continue;
            }

            let rebuilt = rt.block_on(self.builder.rebuild(&scope));
            match rebuilt {
                Ok(result) => {
                    report(&result);
                    // Notify connected browsers to reload
                    let _ = self.reload_tx.send(());
                }
                Err(e) => eprintln!("Build error: {}", e),
            }
        }
    }

    fn collect(&self, event: WatchEvent, changes: &mut Vec<ChangeKind>) {
        match event {
            WatchEvent::FilesChanged(batch) => changes.extend(batch),
            WatchEvent::Error(e) => eprintln!("Watch error: {}", e),
        }
    }

    /// Replace the builder with one for the new config.
    ///
    /// Directory changes in the new config are not picked up by the running
    /// watcher.
    fn reload_config(&mut self) -> bool {
        match Config::load(&self.config_path) {
            Ok(config) => {
                println!("Reloaded {}", self.config_path.display());
                self.builder = Builder::new(config, self.base_path.clone())
                    .with_live_reload(self.live_reload);
                true
            }
            Err(e) => {
                eprintln!("Keeping previous config: {}", e);
                false
            }
        }
    }
}

fn report(result: &BuildResult) {
    println!(
        "Built {} pages, {} static files{}",
        result.pages,
        result.assets,
        if result.removed > 0 {
            format!(", removed {} file(s)", result.removed)
        } else {
            String::new()
        }
    );
    for failure in &result.failures {
        eprintln!("  {}: {}", failure.path.display(), failure.error);
    }
}

/// Canonicalize the path to ensure consistent matching with file events.
fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}
