//! Reload the config file when it changes on disk.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::Config;

/// Editors tend to emit bursts of events for one save.
const DEBOUNCE: Duration = Duration::from_millis(250);

/// Keeps the filesystem watch alive; dropping it stops reloading.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Watch the directory holding the config file and call
/// [`Config::reload`] on every change to the file itself.
pub fn watch(config: Arc<Config>) -> Result<ConfigWatcher> {
    let path = config
        .path()
        .context("In-memory configuration cannot be watched")?
        .to_path_buf();
    let dir = path
        .parent()
        .map(Path::to_path_buf)
        .context("Config path has no parent directory")?;
    std::fs::create_dir_all(&dir).context("Failed to create config directory")?;

    let (tx, mut rx) = mpsc::unbounded_channel::<()>();
    let target = path.clone();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) if touches(&event, &target) => {
            let _ = tx.send(());
        }
        Ok(_) => {}
        Err(err) => tracing::warn!("Config watch error: {}", err),
    })
    .context("Failed to create config watcher")?;

    watcher
        .watch(&dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("Failed to watch {}", dir.display()))?;

    let task = tokio::spawn(async move {
        while rx.recv().await.is_some() {
            tokio::time::sleep(DEBOUNCE).await;
            while rx.try_recv().is_ok() {}

            match config.reload() {
                Ok(changes) if !changes.is_empty() => {
                    tracing::info!(?changes, "Reloaded configuration");
                }
                Ok(_) => {}
                Err(err) => tracing::warn!("Failed to reload configuration: {:#}", err),
            }
        }
    });

    tracing::debug!(path = %path.display(), "Watching config file");

    Ok(ConfigWatcher {
        _watcher: watcher,
        task,
    })
}

fn touches(event: &Event, target: &Path) -> bool {
    !event.kind.is_access() && event.paths.iter().any(|p| p.file_name() == target.file_name())
}
