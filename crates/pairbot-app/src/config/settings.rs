//! Settings parser for .pairbot/config.toml and launch resolution

use std::path::{Path, PathBuf};

use super::types::{Settings, WorkerSettings};
use pairbot_core::prelude::*;
use pairbot_worker::LaunchSpec;

const CONFIG_FILENAME: &str = "config.toml";
pub(crate) const PAIRBOT_DIR: &str = ".pairbot";

/// Environment override for `worker.python_path`
pub const ENV_PYTHON_PATH: &str = "PAIRBOT_PYTHON_PATH";
/// Environment override for `worker.server_path`
pub const ENV_SERVER_PATH: &str = "PAIRBOT_SERVER_PATH";

// ─────────────────────────────────────────────────────────────────────────────
// Loading
// ─────────────────────────────────────────────────────────────────────────────

/// Load settings from `.pairbot/config.toml`, then apply environment overrides.
///
/// A missing or unreadable file is not an error: defaults are used and a
/// warning is logged.
pub fn load_settings(workspace_root: &Path) -> Settings {
    let config_path = workspace_root.join(PAIRBOT_DIR).join(CONFIG_FILENAME);

    let mut settings = if !config_path.exists() {
        debug!("No config file at {:?}, using defaults", config_path);
        Settings::default()
    } else {
        match std::fs::read_to_string(&config_path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(settings) => {
                    debug!("Loaded settings from {:?}", config_path);
                    settings
                }
                Err(e) => {
                    warn!("Failed to parse {:?}: {}", config_path, e);
                    Settings::default()
                }
            },
            Err(e) => {
                warn!("Failed to read {:?}: {}", config_path, e);
                Settings::default()
            }
        }
    };

    apply_env_overrides(&mut settings);
    settings
}

/// Apply `PAIRBOT_PYTHON_PATH` / `PAIRBOT_SERVER_PATH` when set and non-empty
pub fn apply_env_overrides(settings: &mut Settings) {
    if let Some(python) = non_empty_env(ENV_PYTHON_PATH) {
        debug!("{} overrides python_path", ENV_PYTHON_PATH);
        settings.worker.python_path = python;
    }
    if let Some(server) = non_empty_env(ENV_SERVER_PATH) {
        debug!("{} overrides server_path", ENV_SERVER_PATH);
        settings.worker.server_path = server;
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Create `.pairbot/config.toml` with commented defaults if it does not exist
pub fn init_config_dir(workspace_root: &Path) -> Result<()> {
    let pairbot_dir = workspace_root.join(PAIRBOT_DIR);

    if !pairbot_dir.exists() {
        std::fs::create_dir_all(&pairbot_dir)
            .map_err(|e| Error::config(format!("Failed to create .pairbot dir: {}", e)))?;
    }

    let config_path = pairbot_dir.join(CONFIG_FILENAME);
    if !config_path.exists() {
        let default_content = r#"# pairbot configuration

[worker]
python_path = "/usr/local/bin/python3"
server_path = ""        # e.g. "~/pairbot-server/server.py"
readiness_marker = "Uvicorn running on http://127.0.0.1:8000"

[channel]
url = "ws://127.0.0.1:8000/ws"

[ask]
url = "http://localhost:8000/ask_superduper"

[watcher]
enabled = true
debounce_ms = 500
extensions = []         # Empty = report every saved file

[panel]
# dir = "/path/to/panel"  # Default: <data dir>/pairbot/panel
"#;
        std::fs::write(&config_path, default_content)
            .map_err(|e| Error::config(format!("Failed to write config.toml: {}", e)))?;
        info!("Created {:?}", config_path);
    }

    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Launch Resolution
// ─────────────────────────────────────────────────────────────────────────────

/// Expand a leading `~/` (or a lone `~`) against the home directory.
///
/// Paths without a tilde prefix are returned unchanged.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    let rest = if path == "~" {
        ""
    } else if let Some(rest) = path.strip_prefix("~/") {
        rest
    } else {
        return Ok(PathBuf::from(path));
    };

    let home = dirs::home_dir().ok_or_else(|| {
        Error::config(format!(
            "cannot expand '{}': home directory is unknown",
            path
        ))
    })?;
    Ok(home.join(rest))
}

/// Turn worker settings and the workspace root into a concrete [`LaunchSpec`].
///
/// # Errors
///
/// - [`Error::Config`] when there is no workspace root, it cannot be
///   canonicalised, `server_path` or `python_path` is empty, or a `~/` path
///   cannot be expanded.
/// - [`Error::ExecutableNotFound`] when a bare interpreter name is not on `PATH`.
pub fn resolve_launch(
    settings: &WorkerSettings,
    workspace_root: Option<&Path>,
) -> Result<LaunchSpec> {
    let root = workspace_root.ok_or_else(|| Error::config("no workspace folder is open"))?;
    let working_dir = dunce::canonicalize(root).map_err(|e| {
        Error::config(format!(
            "workspace root {} is not usable: {}",
            root.display(),
            e
        ))
    })?;
    if !working_dir.is_dir() {
        return Err(Error::config(format!(
            "workspace root {} is not a directory",
            working_dir.display()
        )));
    }

    let python = settings.python_path.trim();
    if python.is_empty() {
        return Err(Error::config("worker.python_path is empty"));
    }
    let server = settings.server_path.trim();
    if server.is_empty() {
        return Err(Error::config(
            "worker.server_path is not set (config.toml or PAIRBOT_SERVER_PATH)",
        ));
    }

    let executable = resolve_executable(python)?;
    let script = expand_home(server)?;

    Ok(LaunchSpec::new(
        executable,
        vec![script.to_string_lossy().into_owned()],
        working_dir,
    ))
}

fn resolve_executable(python: &str) -> Result<PathBuf> {
    let expanded = expand_home(python)?;
    if expanded.components().count() > 1 {
        return Ok(expanded);
    }
    which::which(&expanded).map_err(|e| {
        debug!("which({}) failed: {}", python, e);
        Error::ExecutableNotFound { path: expanded }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::tempdir;

    fn clear_env() {
        std::env::remove_var(ENV_PYTHON_PATH);
        std::env::remove_var(ENV_SERVER_PATH);
    }

    fn worker(python: &str, server: &str) -> WorkerSettings {
        WorkerSettings {
            python_path: python.to_string(),
            server_path: server.to_string(),
            ..Default::default()
        }
    }

    #[test]
    #[serial]
    fn test_load_settings_defaults() {
        clear_env();
        let temp = tempdir().unwrap();
        let settings = load_settings(temp.path());

        assert_eq!(settings.worker.python_path, "/usr/local/bin/python3");
        assert!(settings.worker.server_path.is_empty());
        assert_eq!(settings.watcher.debounce_ms, 500);
    }

    #[test]
    #[serial]
    fn test_load_settings_custom() {
        clear_env();
        let temp = tempdir().unwrap();
        let dir = temp.path().join(".pairbot");
        std::fs::create_dir_all(&dir).unwrap();

        let config = r#"
[worker]
python_path = "/opt/py/bin/python"
server_path = "server.py"

[channel]
url = "ws://127.0.0.1:9000/ws"

[watcher]
enabled = false
"#;
        std::fs::write(dir.join("config.toml"), config).unwrap();

        let settings = load_settings(temp.path());
        assert_eq!(settings.worker.python_path, "/opt/py/bin/python");
        assert_eq!(settings.worker.server_path, "server.py");
        assert_eq!(settings.channel.url, "ws://127.0.0.1:9000/ws");
        assert!(!settings.watcher.enabled);
    }

    #[test]
    #[serial]
    fn test_load_settings_invalid_toml() {
        clear_env();
        let temp = tempdir().unwrap();
        let dir = temp.path().join(".pairbot");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("config.toml"), "not valid toml {{{{").unwrap();

        let settings = load_settings(temp.path());
        assert_eq!(settings.worker.python_path, "/usr/local/bin/python3");
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        clear_env();
        let temp = tempdir().unwrap();
        std::env::set_var(ENV_PYTHON_PATH, "/env/python");
        std::env::set_var(ENV_SERVER_PATH, "/env/server.py");

        let settings = load_settings(temp.path());
        clear_env();

        assert_eq!(settings.worker.python_path, "/env/python");
        assert_eq!(settings.worker.server_path, "/env/server.py");
    }

    #[test]
    #[serial]
    fn test_blank_env_is_ignored() {
        clear_env();
        std::env::set_var(ENV_SERVER_PATH, "   ");
        let mut settings = Settings::default();
        apply_env_overrides(&mut settings);
        clear_env();

        assert!(settings.worker.server_path.is_empty());
    }

    #[test]
    #[serial]
    fn test_init_config_dir() {
        clear_env();
        let temp = tempdir().unwrap();
        init_config_dir(temp.path()).unwrap();

        let path = temp.path().join(".pairbot/config.toml");
        assert!(path.exists());

        // The generated file parses back to the defaults
        let settings = load_settings(temp.path());
        assert_eq!(settings.channel.url, "ws://127.0.0.1:8000/ws");
        assert!(settings.panel.dir.is_none());
    }

    #[test]
    fn test_init_config_dir_keeps_existing() {
        let temp = tempdir().unwrap();
        let dir = temp.path().join(".pairbot");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("config.toml"), "[worker]\nserver_path = \"x.py\"\n").unwrap();

        init_config_dir(temp.path()).unwrap();

        let content = std::fs::read_to_string(dir.join("config.toml")).unwrap();
        assert!(content.contains("x.py"));
    }

    #[test]
    #[serial]
    fn test_expand_home() {
        let original = std::env::var_os("HOME");
        std::env::set_var("HOME", "/home/tester");

        assert_eq!(
            expand_home("~/srv/server.py").unwrap(),
            PathBuf::from("/home/tester/srv/server.py")
        );
        assert_eq!(expand_home("~").unwrap(), PathBuf::from("/home/tester"));
        assert_eq!(
            expand_home("/abs/server.py").unwrap(),
            PathBuf::from("/abs/server.py")
        );
        assert_eq!(
            expand_home("~other/x").unwrap(),
            PathBuf::from("~other/x")
        );

        match original {
            Some(home) => std::env::set_var("HOME", home),
            None => std::env::remove_var("HOME"),
        }
    }

    #[test]
    fn test_resolve_launch_without_workspace() {
        let err = resolve_launch(&worker("/bin/sh", "/srv/server.py"), None).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_resolve_launch_missing_workspace_dir() {
        let temp = tempdir().unwrap();
        let gone = temp.path().join("gone");
        let err = resolve_launch(&worker("/bin/sh", "/srv/server.py"), Some(gone.as_path()))
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_resolve_launch_empty_server_path() {
        let temp = tempdir().unwrap();
        let err = resolve_launch(&worker("/bin/sh", ""), Some(temp.path())).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        assert!(err.to_string().contains("server_path"));
    }

    #[test]
    fn test_resolve_launch_absolute_paths() {
        let temp = tempdir().unwrap();
        let spec =
            resolve_launch(&worker("/opt/py/python", "/srv/server.py"), Some(temp.path()))
                .unwrap();

        assert_eq!(spec.executable, PathBuf::from("/opt/py/python"));
        assert_eq!(spec.args, vec!["/srv/server.py".to_string()]);
        assert_eq!(
            spec.working_dir,
            dunce::canonicalize(temp.path()).unwrap()
        );
    }

    #[test]
    #[serial]
    fn test_resolve_launch_expands_server_home() {
        let original = std::env::var_os("HOME");
        std::env::set_var("HOME", "/home/tester");
        let temp = tempdir().unwrap();

        let spec = resolve_launch(&worker("/opt/py/python", "~/srv/server.py"), Some(temp.path()))
            .unwrap();

        match original {
            Some(home) => std::env::set_var("HOME", home),
            None => std::env::remove_var("HOME"),
        }
        assert_eq!(spec.args, vec!["/home/tester/srv/server.py".to_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_launch_bare_name_uses_path() {
        let temp = tempdir().unwrap();
        let spec = resolve_launch(&worker("sh", "server.py"), Some(temp.path())).unwrap();
        assert!(spec.executable.is_absolute());
        assert!(spec.executable.ends_with("sh"));
    }

    #[test]
    fn test_resolve_launch_unknown_bare_name() {
        let temp = tempdir().unwrap();
        let err = resolve_launch(
            &worker("pairbot-no-such-python-xyz", "server.py"),
            Some(temp.path()),
        )
        .unwrap_err();
        assert!(err.is_spawn_error());
    }
}
