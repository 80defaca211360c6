//! Durable append-only log of everything the worker prints

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use pairbot_core::prelude::*;
use pairbot_core::OutputStream;

/// Shared handle to the worker output log.
///
/// Both pipe readers append through clones of the same handle, so lines from
/// stdout and stderr interleave in the order they were read.
#[derive(Clone)]
pub struct OutputLog {
    inner: Option<Arc<Mutex<File>>>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for OutputLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputLog").field("path", &self.path).finish()
    }
}

impl OutputLog {
    /// Open (or create) the log at `path` in append mode
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        debug!("Worker output log: {}", path.display());
        Ok(Self {
            inner: Some(Arc::new(Mutex::new(file))),
            path: Some(path.to_path_buf()),
        })
    }

    /// A log that discards everything
    pub fn disabled() -> Self {
        Self {
            inner: None,
            path: None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append one tagged line. Write failures are logged, never propagated.
    pub async fn append(&self, stream: OutputStream, line: &str) {
        let Some(inner) = &self.inner else {
            return;
        };
        let record = format!("{} {}\n", stream.tag(), line);
        let mut file = inner.lock().await;
        if let Err(e) = file.write_all(record.as_bytes()).await {
            warn!("Failed to append to worker output log: {}", e);
            return;
        }
        if let Err(e) = file.flush().await {
            warn!("Failed to flush worker output log: {}", e);
        }
    }
}
