//! pairbot - review worker supervisor
//!
//! This is the binary entry point. All logic lives in the library.

use std::path::PathBuf;

use clap::Parser;

/// pairbot - supervise a review worker and mirror its comments into a panel
#[derive(Parser, Debug)]
#[command(name = "pairbot")]
#[command(
    about = "Supervises a review worker and mirrors its comments into a review panel",
    long_about = None
)]
struct Args {
    /// Workspace root (defaults to the current directory)
    #[arg(value_name = "PATH")]
    path: Option<PathBuf>,

    /// Launch the worker immediately instead of waiting for `start`
    #[arg(long)]
    start: bool,

    /// Write `.pairbot/config.toml` with defaults and exit
    #[arg(long)]
    init: bool,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    // An unusable directory surfaces later as a configuration error on start
    let workspace_root = args
        .path
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    if args.init {
        pairbot_app::config::init_config_dir(&workspace_root)?;
        eprintln!(
            "Wrote {}",
            workspace_root.join(".pairbot").join("config.toml").display()
        );
        return Ok(());
    }

    pairbot_core::logging::init()?;
    pairbot::run_headless(&workspace_root, args.start).await?;
    Ok(())
}
