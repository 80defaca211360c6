//! Configuration file parsing for pairbot
//!
//! Supports:
//! - `.pairbot/config.toml` - Worker, channel, watcher and panel settings
//! - `PAIRBOT_PYTHON_PATH` / `PAIRBOT_SERVER_PATH` environment overrides

pub mod settings;
pub mod types;

pub use settings::{
    apply_env_overrides, expand_home, init_config_dir, load_settings, resolve_launch,
    ENV_PYTHON_PATH, ENV_SERVER_PATH,
};
pub use types::*;
