//! Configuration types for pairbot
//!
//! Defines:
//! - `Settings` - Contents of `.pairbot/config.toml`
//! - Per-section settings structs with their defaults

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use pairbot_worker::{DEFAULT_ASK_URL, DEFAULT_CHANNEL_URL, DEFAULT_READINESS_MARKER};

/// Global settings from `.pairbot/config.toml`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub worker: WorkerSettings,

    #[serde(default)]
    pub channel: ChannelSettings,

    #[serde(default)]
    pub ask: AskSettings,

    #[serde(default)]
    pub watcher: WatcherSettings,

    #[serde(default)]
    pub panel: PanelSettings,
}

/// How to launch the worker
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerSettings {
    /// Interpreter used to run the server script
    #[serde(default = "default_python_path", alias = "pythonPath")]
    pub python_path: String,

    /// Server script; a leading `~/` is expanded against the home directory
    #[serde(default, alias = "serverPath")]
    pub server_path: String,

    /// Substring on stderr that signals the worker accepts connections
    #[serde(default = "default_readiness_marker")]
    pub readiness_marker: String,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            python_path: default_python_path(),
            server_path: String::new(),
            readiness_marker: default_readiness_marker(),
        }
    }
}

/// Duplex channel settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChannelSettings {
    #[serde(default = "default_channel_url")]
    pub url: String,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            url: default_channel_url(),
        }
    }
}

/// Question endpoint settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AskSettings {
    #[serde(default = "default_ask_url")]
    pub url: String,
}

impl Default for AskSettings {
    fn default() -> Self {
        Self {
            url: default_ask_url(),
        }
    }
}

/// Save observer settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WatcherSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Debounce duration in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// File extensions to report (empty = every file)
    #[serde(default)]
    pub extensions: Vec<String>,
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: default_debounce_ms(),
            extensions: Vec::new(),
        }
    }
}

/// Display surface settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PanelSettings {
    /// Directory the review panel page is written to.
    /// `None` uses `<data_local_dir>/pairbot/panel`.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl PanelSettings {
    pub fn resolved_dir(&self) -> PathBuf {
        match &self.dir {
            Some(dir) => dir.clone(),
            None => dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("pairbot")
                .join("panel"),
        }
    }
}

fn default_python_path() -> String {
    "/usr/local/bin/python3".to_string()
}

fn default_readiness_marker() -> String {
    DEFAULT_READINESS_MARKER.to_string()
}

fn default_channel_url() -> String {
    DEFAULT_CHANNEL_URL.to_string()
}

fn default_ask_url() -> String {
    DEFAULT_ASK_URL.to_string()
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_true() -> bool {
    true
}
