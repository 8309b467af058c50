//! Filesystem trigger for interpreter hot-reload.
//!
//! Decouples the reload *trigger* from the swap logic: this module only
//! forwards "decode logic changed" signals into a channel the
//! [`InterpreterRegistry`](super::InterpreterRegistry) consumes. Any other
//! signal source can feed the same channel.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

/// Watches a decode script's directory and emits one reload signal per
/// relevant change.
///
/// The parent directory is watched rather than the file itself because most
/// editors save by rename-over, which would silently detach a file watch.
/// Every `.lua` create or modify in the directory signals a reload of the
/// configured script path: the signal means "decode logic changed", and the
/// registry always rebuilds from the script's current content.
pub struct ScriptWatcher {
    watcher: RecommendedWatcher,
    script_path: PathBuf,
}

impl std::fmt::Debug for ScriptWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptWatcher")
            .field("script_path", &self.script_path)
            .finish_non_exhaustive()
    }
}

impl ScriptWatcher {
    /// Start watching and forward reload signals into `signals`.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS watcher cannot be initialized or the
    /// script's directory cannot be watched.
    pub fn spawn(script_path: PathBuf, signals: mpsc::UnboundedSender<PathBuf>) -> Result<Self> {
        let target = script_path.clone();
        let mut watcher = notify::recommended_watcher(
            move |result: std::result::Result<Event, notify::Error>| match result {
                Ok(event) => {
                    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                        return;
                    }
                    if event
                        .paths
                        .iter()
                        .any(|path| path.extension().is_some_and(|ext| ext == "lua"))
                    {
                        let _ = signals.send(target.clone());
                    }
                }
                Err(e) => log::warn!("Script watcher error: {e}"),
            },
        )
        .context("Failed to create script watcher")?;

        let root = Self::watch_root(&script_path);
        watcher
            .watch(&root, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch: {}", root.display()))?;
        log::info!("Watching for decode script changes: {}", root.display());

        Ok(Self {
            watcher,
            script_path,
        })
    }

    /// Stop watching. Dropping the watcher has the same effect.
    pub fn stop(&mut self) {
        let root = Self::watch_root(&self.script_path);
        let _ = self.watcher.unwatch(&root);
    }

    pub fn script_path(&self) -> &Path {
        &self.script_path
    }

    fn watch_root(script_path: &Path) -> PathBuf {
        script_path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map_or_else(|| script_path.to_path_buf(), Path::to_path_buf)
    }
}
