//! Headless mode runner - the event loop that stands in for the editor
//!
//! Line commands on stdin become engine messages; every engine event is
//! printed as NDJSON by a separate task subscribed to the event broadcast.

use std::path::Path;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use pairbot_app::{parse_chat_line, Engine, EngineEvent, Message};
use pairbot_core::prelude::*;

use super::HeadlessEvent;

/// Run in headless mode against `workspace_root`.
///
/// With `auto_start` the worker is launched right away, otherwise it waits
/// for a `start` command.
pub async fn run_headless(workspace_root: &Path, auto_start: bool) -> Result<()> {
    info!("═══════════════════════════════════════════════════════");
    info!("pairbot starting in headless mode");
    info!("Workspace: {}", workspace_root.display());
    info!("═══════════════════════════════════════════════════════");

    let mut engine = Engine::new(workspace_root.to_path_buf());
    let printer = spawn_event_printer(engine.subscribe());

    let stdin_tx = engine.msg_sender();
    std::thread::spawn(move || {
        spawn_stdin_reader_blocking(stdin_tx);
    });

    if auto_start {
        info!("Auto-starting worker");
        engine.process_message(Message::Start).await;
    }

    let result = headless_event_loop(&mut engine).await;

    engine.shutdown().await;

    // Dropping the engine closes the broadcast so the printer drains and exits
    drop(engine);
    if let Err(e) = printer.await {
        error!("Event printer task failed: {}", e);
    }

    info!("pairbot headless mode exiting");
    result
}

/// Main headless event loop
async fn headless_event_loop(engine: &mut Engine) -> Result<()> {
    loop {
        if engine.should_quit() {
            info!("Quit requested");
            break;
        }

        match engine.msg_rx.recv().await {
            Some(msg) => engine.process_message(msg).await,
            None => {
                info!("Message channel closed");
                break;
            }
        }
    }

    Ok(())
}

/// Print every engine event as one NDJSON line until the engine goes away
fn spawn_event_printer(mut events: broadcast::Receiver<EngineEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => HeadlessEvent::from(&event).emit(),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Headless output lagged, {} event(s) dropped", skipped);
                    HeadlessEvent::error(format!("{} event(s) dropped", skipped), false).emit();
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Translate one stdin line into an engine message.
///
/// Returns `None` for blank lines and unknown commands.
pub fn parse_command(line: &str) -> Option<Message> {
    let trimmed = line.trim();
    match trimmed {
        "" => None,
        "start" => Some(Message::Start),
        "stop" => Some(Message::Stop),
        "close" => Some(Message::CloseSurface),
        "q" | "quit" => Some(Message::Quit),
        _ => parse_chat_line(trimmed).map(Message::Chat),
    }
}

/// Read stdin commands and send them to the message channel (blocking)
fn spawn_stdin_reader_blocking(msg_tx: mpsc::Sender<Message>) {
    use std::io::BufRead;

    let stdin = std::io::stdin();
    let reader = stdin.lock();

    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to read stdin: {}", e);
                break;
            }
        };

        let Some(msg) = parse_command(&line) else {
            if !line.trim().is_empty() {
                warn!("Unknown stdin command: {}", line.trim());
            }
            continue;
        };

        let quit = matches!(msg, Message::Quit);
        info!("Stdin: {:?}", msg);
        if msg_tx.blocking_send(msg).is_err() || quit {
            break;
        }
    }

    info!("Stdin reader exiting");
}
