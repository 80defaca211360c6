//! Save observer
//!
//! Watches the workspace root and reports each saved file once per debounce
//! window as [`Message::DocumentSaved`]. Purely informational.

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use notify::RecursiveMode;
use notify_debouncer_full::{new_debouncer, DebounceEventResult};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::config::WatcherSettings;
use crate::message::Message;

/// Default debounce duration in milliseconds
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

/// Directory names never reported
pub const IGNORED_DIRS: &[&str] = &[".git", ".pairbot", "target"];

/// Configuration for the save observer
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub debounce: Duration,
    /// File extensions to report (empty = all files)
    pub extensions: Vec<String>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            extensions: Vec::new(),
        }
    }
}

impl WatcherConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_settings(settings: &WatcherSettings) -> Self {
        Self::new()
            .with_debounce_ms(settings.debounce_ms)
            .with_extensions(settings.extensions.clone())
    }

    /// Set debounce duration in milliseconds
    pub fn with_debounce_ms(mut self, ms: u64) -> Self {
        self.debounce = Duration::from_millis(ms);
        self
    }

    /// Set file extensions to report
    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions;
        self
    }

    /// Whether a changed path under `root` should be reported
    pub fn is_relevant(&self, root: &Path, path: &Path) -> bool {
        let relative = path.strip_prefix(root).unwrap_or(path);
        let ignored = relative.components().any(|c| match c {
            Component::Normal(name) => name
                .to_str()
                .map(|n| IGNORED_DIRS.contains(&n))
                .unwrap_or(false),
            _ => false,
        });
        if ignored {
            return false;
        }

        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.extensions.iter().any(|e| e == ext))
            .unwrap_or(false)
    }
}

/// Watches a workspace for saved files
pub struct SaveWatcher {
    root: PathBuf,
    config: WatcherConfig,
    stop_tx: Option<oneshot::Sender<()>>,
}

impl SaveWatcher {
    pub fn new(root: PathBuf, config: WatcherConfig) -> Self {
        Self {
            root,
            config,
            stop_tx: None,
        }
    }

    /// Start watching. Sends [`Message::DocumentSaved`] per saved file.
    pub fn start(&mut self, message_tx: mpsc::Sender<Message>) -> Result<(), String> {
        if self.is_running() {
            return Err("Watcher is already running".to_string());
        }

        let root = self.root.clone();
        let config = self.config.clone();
        let (stop_tx, stop_rx) = oneshot::channel();
        self.stop_tx = Some(stop_tx);

        tokio::task::spawn_blocking(move || {
            Self::run_watcher(root, config, message_tx, stop_rx);
        });

        Ok(())
    }

    /// Stop watching. Idempotent.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
    }

    pub fn is_running(&self) -> bool {
        self.stop_tx.is_some()
    }

    fn run_watcher(
        root: PathBuf,
        config: WatcherConfig,
        message_tx: mpsc::Sender<Message>,
        stop_rx: oneshot::Receiver<()>,
    ) {
        let tx_clone = message_tx.clone();
        let filter = config.clone();
        let filter_root = root.clone();

        let debouncer_result = new_debouncer(
            config.debounce,
            None,
            move |result: DebounceEventResult| match result {
                Ok(events) => {
                    // One notice per file, however many raw events it produced
                    let saved: BTreeSet<PathBuf> = events
                        .iter()
                        .filter(|event| event.kind.is_modify() || event.kind.is_create())
                        .flat_map(|event| event.paths.iter())
                        .filter(|path| !path.is_dir() && filter.is_relevant(&filter_root, path))
                        .cloned()
                        .collect();

                    if saved.is_empty() {
                        return;
                    }
                    debug!("Save observer detected {} file(s)", saved.len());

                    for path in saved {
                        if tx_clone
                            .blocking_send(Message::DocumentSaved { path })
                            .is_err()
                        {
                            return;
                        }
                    }
                }
                Err(errors) => {
                    for error in errors {
                        warn!("Save observer error: {:?}", error);
                        let _ = tx_clone.blocking_send(Message::WatcherError {
                            message: error.to_string(),
                        });
                    }
                }
            },
        );

        let mut debouncer = match debouncer_result {
            Ok(d) => d,
            Err(e) => {
                error!("Failed to create save observer: {}", e);
                let _ = message_tx.blocking_send(Message::WatcherError {
                    message: format!("Failed to create watcher: {}", e),
                });
                return;
            }
        };

        if let Err(e) = debouncer.watch(&root, RecursiveMode::Recursive) {
            warn!("Failed to watch {}: {}", root.display(), e);
            let _ = message_tx.blocking_send(Message::WatcherError {
                message: format!("Failed to watch {}: {}", root.display(), e),
            });
            return;
        }
        info!("Watching for saves: {}", root.display());

        // Blocks until stop() or the watcher handle is dropped
        let _ = stop_rx.blocking_recv();
        info!("Save observer stopping");
    }
}

impl Drop for SaveWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_watcher_config_default() {
        let config = WatcherConfig::default();
        assert_eq!(config.debounce, Duration::from_millis(500));
        assert!(config.extensions.is_empty());
    }

    #[test]
    fn test_from_settings() {
        let settings = WatcherSettings {
            enabled: true,
            debounce_ms: 200,
            extensions: vec!["py".to_string()],
        };
        let config = WatcherConfig::from_settings(&settings);
        assert_eq!(config.debounce, Duration::from_millis(200));
        assert_eq!(config.extensions, vec!["py".to_string()]);
    }

    #[test]
    fn test_is_relevant_ignores_tool_dirs() {
        let config = WatcherConfig::new();
        let root = Path::new("/w");

        assert!(config.is_relevant(root, Path::new("/w/src/a.py")));
        assert!(!config.is_relevant(root, Path::new("/w/.git/index")));
        assert!(!config.is_relevant(root, Path::new("/w/.pairbot/config.toml")));
        assert!(!config.is_relevant(root, Path::new("/w/target/debug/x")));
    }

    #[test]
    fn test_is_relevant_filters_extensions() {
        let config = WatcherConfig::new().with_extensions(vec!["py".to_string()]);
        let root = Path::new("/w");

        assert!(config.is_relevant(root, Path::new("/w/a.py")));
        assert!(!config.is_relevant(root, Path::new("/w/a.rs")));
        assert!(!config.is_relevant(root, Path::new("/w/Makefile")));
    }

    #[tokio::test]
    async fn test_stop_when_not_started() {
        let mut watcher = SaveWatcher::new(PathBuf::from("/tmp/none"), WatcherConfig::default());
        watcher.stop();
        assert!(!watcher.is_running());
    }

    #[tokio::test]
    async fn test_double_start_error() {
        let temp = tempdir().unwrap();
        let mut watcher = SaveWatcher::new(temp.path().to_path_buf(), WatcherConfig::default());
        let (tx, _rx) = mpsc::channel(32);

        assert!(watcher.start(tx.clone()).is_ok());
        let err = watcher.start(tx).unwrap_err();
        assert!(err.contains("already running"));

        watcher.stop();
        assert!(!watcher.is_running());
    }

    #[tokio::test]
    async fn test_reports_saved_file() {
        let temp = tempdir().unwrap();
        let root = dunce::canonicalize(temp.path()).unwrap();
        let mut watcher = SaveWatcher::new(root.clone(), WatcherConfig::new().with_debounce_ms(50));
        let (tx, mut rx) = mpsc::channel(32);
        watcher.start(tx).unwrap();

        // Give the blocking task time to register the watch
        tokio::time::sleep(Duration::from_millis(300)).await;
        std::fs::write(root.join("a.py"), "print('hi')\n").unwrap();

        let saved = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match rx.recv().await {
                    Some(Message::DocumentSaved { path }) => break path,
                    Some(_) => continue,
                    None => panic!("watcher channel closed"),
                }
            }
        })
        .await
        .expect("no save reported");

        assert!(saved.ends_with("a.py"));
        watcher.stop();
    }
}
