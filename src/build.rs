mod builder;
mod cache;
pub mod compose;
pub mod context;
pub mod fetch;
pub mod format;
pub mod metadata;
pub mod paths;
mod render;
pub mod syntax;
mod watch;

pub use builder::{BuildResult, Builder, LIVE_RELOAD_PATH};
pub use cache::{ChangeKind, InvalidationScope, invalidation_scope};
pub use paths::base_path_from_config;
pub use watch::{FileWatcher, PathClassifier, WatchEvent, WatchPaths};
