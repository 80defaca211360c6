//! Engine - owns one session and processes messages in order
//!
//! The Engine is the explicit session object: it owns the worker process, the
//! channel bridge, the display surface and the lifecycle state, and is the only
//! place they are mutated. Every input (host commands, worker and channel
//! events, saves, signals) arrives as a [`Message`] on one channel, and every
//! observable outcome leaves as an [`EngineEvent`] on a broadcast channel.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};

use pairbot_core::prelude::*;
use pairbot_core::{logging, ChannelEvent, InboundMessage, OutputStream, WorkerEvent};
use pairbot_worker::protocol::preview;
use pairbot_worker::{
    AskClient, ChannelBridge, ChannelState, OutputLog, ReadinessLatch, WorkerProcess, WorkerState,
};

use crate::chat::{ChatRequest, Participant};
use crate::config::{self, Settings};
use crate::engine_event::EngineEvent;
use crate::message::Message;
use crate::render;
use crate::session::{Phase, RunId, Session, Transition};
use crate::signals;
use crate::surface::{HtmlFileHost, NotificationSurface, SurfaceHost};
use crate::watcher::{SaveWatcher, WatcherConfig};

const MESSAGE_CHANNEL_CAPACITY: usize = 256;
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// How long shutdown waits for the worker to exit after asking it to stop
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Orchestration engine for pairbot.
pub struct Engine {
    /// Sender half of the message channel. Clone it for input sources.
    pub msg_tx: mpsc::Sender<Message>,

    /// Receiver half of the message channel. The runner drains it.
    pub msg_rx: mpsc::Receiver<Message>,

    /// Loaded settings
    pub settings: Settings,

    /// Workspace the worker runs in
    pub workspace_root: PathBuf,

    session: Session,
    worker: Option<WorkerProcess>,
    bridge: Option<ChannelBridge>,
    surface: NotificationSurface,

    /// Opened on first start unless set explicitly
    output_log: Option<OutputLog>,
    ask_client: Option<AskClient>,

    /// Most recently saved file; sent along with questions
    active_document: Option<PathBuf>,

    save_watcher: Option<SaveWatcher>,
    event_tx: broadcast::Sender<EngineEvent>,
    should_quit: bool,
    shut_down: bool,
}

impl Engine {
    /// Create an Engine for a workspace with the production setup:
    /// - creates `.pairbot/config.toml` if missing and loads settings
    /// - shows reviews through an [`HtmlFileHost`] in the panel directory
    /// - starts the save observer (if enabled) and the signal handler
    pub fn new(workspace_root: PathBuf) -> Self {
        if let Err(e) = config::init_config_dir(&workspace_root) {
            warn!("Failed to initialize .pairbot directory: {}", e);
        }
        let settings = config::load_settings(&workspace_root);
        let host = HtmlFileHost::new(settings.panel.resolved_dir());
        info!("Review panel: {}", host.page_path().display());

        let engine = Self::with_settings(workspace_root, settings, Box::new(host));
        signals::spawn_signal_handler(engine.msg_sender());
        engine
    }

    /// Create an Engine with explicit settings and surface host.
    ///
    /// Starts the save observer when `settings.watcher.enabled`; installs no
    /// signal handler.
    pub fn with_settings(
        workspace_root: PathBuf,
        settings: Settings,
        host: Box<dyn SurfaceHost>,
    ) -> Self {
        let (msg_tx, msg_rx) = mpsc::channel::<Message>(MESSAGE_CHANNEL_CAPACITY);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let save_watcher = if settings.watcher.enabled {
            Self::start_save_watcher(&workspace_root, &settings, msg_tx.clone())
        } else {
            None
        };

        Self {
            msg_tx,
            msg_rx,
            settings,
            workspace_root,
            session: Session::new(),
            worker: None,
            bridge: None,
            surface: NotificationSurface::new(host),
            output_log: None,
            ask_client: None,
            active_document: None,
            save_watcher,
            event_tx,
            should_quit: false,
            shut_down: false,
        }
    }

    /// Use `log` as the durable worker output log instead of the default file
    pub fn set_output_log(&mut self, log: OutputLog) {
        self.output_log = Some(log);
    }

    /// Subscribe to engine events.
    ///
    /// A subscriber that falls behind by more than the buffer loses the oldest
    /// events (`RecvError::Lagged`).
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }

    pub fn msg_sender(&self) -> mpsc::Sender<Message> {
        self.msg_tx.clone()
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    pub fn phase(&self) -> Phase {
        self.session.phase()
    }

    pub fn current_run(&self) -> Option<RunId> {
        self.session.run()
    }

    pub fn worker_state(&self) -> WorkerState {
        self.worker
            .as_ref()
            .map(WorkerProcess::state)
            .unwrap_or(WorkerState::NotStarted)
    }

    /// State of the channel of the latest run; `None` if none was constructed
    pub fn channel_state(&self) -> Option<ChannelState> {
        self.bridge.as_ref().map(ChannelBridge::state)
    }

    pub fn surface(&self) -> &NotificationSurface {
        &self.surface
    }

    pub fn active_document(&self) -> Option<&Path> {
        self.active_document.as_deref()
    }

    /// Wait up to `limit` for the worker of the latest run to exit
    pub async fn wait_worker_exit(&self, limit: Duration) -> bool {
        match &self.worker {
            Some(worker) => worker.wait_exit(limit).await,
            None => true,
        }
    }

    /// Process one message.
    pub async fn process_message(&mut self, msg: Message) {
        match msg {
            Message::Start => self.handle_start().await,
            Message::Stop => self.handle_stop(),
            Message::Quit => {
                info!("Quit requested");
                self.should_quit = true;
            }
            Message::CloseSurface => {
                if let Some(id) = self.surface.close() {
                    self.emit(EngineEvent::SurfaceDisposed { id });
                }
            }
            Message::SurfaceDisposed { id } => {
                if self.surface.on_disposed(id) {
                    self.emit(EngineEvent::SurfaceDisposed { id });
                }
            }
            Message::Chat(request) => self.handle_chat(request),
            Message::Worker { run, event } => self.handle_worker_event(run, event),
            Message::Channel { run, event } => self.handle_channel_event(run, event),
            Message::DocumentSaved { path } => {
                info!("Document saved: {}", path.display());
                self.active_document = Some(path.clone());
                self.emit(EngineEvent::DocumentSaved { path });
            }
            Message::WatcherError { message } => {
                self.emit(EngineEvent::Error {
                    message,
                    fatal: false,
                });
            }
            Message::AskCompleted { question, result } => match result {
                Ok(answer) => self.emit(EngineEvent::Answer { question, answer }),
                Err(message) => {
                    warn!("Question failed: {}", message);
                    self.emit(EngineEvent::Error {
                        message,
                        fatal: false,
                    });
                }
            },
        }
    }

    /// Drain and process every message already queued. Returns the count.
    pub async fn drain_pending_messages(&mut self) -> usize {
        let mut count = 0;
        while let Ok(msg) = self.msg_rx.try_recv() {
            self.process_message(msg).await;
            count += 1;
        }
        count
    }

    /// Deactivate: close the channel, stop the worker, release the surface.
    ///
    /// Waits briefly for the worker to exit so it does not outlive the host.
    /// Safe to call more than once.
    pub async fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        info!("Shutting down");

        if let Some(bridge) = self.bridge.as_mut() {
            bridge.close();
        }

        if let Some(worker) = self.worker.as_mut() {
            worker.stop();
        }
        if !self.wait_worker_exit(SHUTDOWN_TIMEOUT).await {
            warn!("Worker did not exit within {:?}", SHUTDOWN_TIMEOUT);
        }

        if let Some(id) = self.surface.close() {
            self.emit(EngineEvent::SurfaceDisposed { id });
        }

        if let Some(t) = self.session.stop() {
            self.emit_transition(t);
        }

        if let Some(watcher) = self.save_watcher.as_mut() {
            watcher.stop();
        }

        self.emit(EngineEvent::Shutdown);
    }

    // ─────────────────────────────────────────────────────────
    // Host commands
    // ─────────────────────────────────────────────────────────

    async fn handle_start(&mut self) {
        let phase = self.session.phase();
        if phase != Phase::Idle {
            warn!("Start ignored while {}", phase);
            self.emit(EngineEvent::Error {
                message: format!("worker is {}; stop it before starting again", phase),
                fatal: false,
            });
            return;
        }

        let root = self.workspace_root.as_path();
        let spec = match config::resolve_launch(&self.settings.worker, Some(root)) {
            Ok(spec) => spec,
            Err(e) => {
                self.report(&e);
                return;
            }
        };

        let Some((run, transition)) = self.session.begin_launch() else {
            return;
        };
        self.emit_transition(transition);

        let output_log = self.output_log().await;
        let readiness = ReadinessLatch::new(self.settings.worker.readiness_marker.clone());
        let (worker_tx, worker_rx) = mpsc::channel::<WorkerEvent>(EVENT_CHANNEL_CAPACITY);

        match WorkerProcess::spawn(&spec, readiness, output_log, worker_tx) {
            Ok(process) => {
                forward_worker_events(run, worker_rx, self.msg_tx.clone());
                info!("{} started: {}", run, spec.display_command());
                self.emit(EngineEvent::WorkerStarted {
                    run,
                    pid: process.id(),
                    command: spec.display_command(),
                });
                // Replaces the stopped worker and closed channel of the previous run
                self.worker = Some(process);
                self.bridge = None;
            }
            Err(e) => {
                self.report(&e);
                if let Some(t) = self.session.stop() {
                    self.emit_transition(t);
                }
            }
        }
    }

    fn handle_stop(&mut self) {
        if let Some(bridge) = self.bridge.as_mut() {
            bridge.close();
        }
        if let Some(worker) = self.worker.as_mut() {
            worker.stop();
        }
        if let Some(t) = self.session.stop() {
            info!("Stopped {:?}", self.session.run());
            self.emit_transition(t);
        }
    }

    fn handle_chat(&mut self, request: ChatRequest) {
        match request.participant {
            Participant::ReviewBot => {
                debug!(
                    "{} received '{}'; nothing to answer",
                    request.participant, request.prompt
                );
            }
            Participant::Superduper => {
                if request.prompt.is_empty() {
                    self.emit(EngineEvent::Error {
                        message: "empty question".to_string(),
                        fatal: false,
                    });
                    return;
                }
                let client = match self.ask_client() {
                    Ok(client) => client,
                    Err(e) => {
                        self.report(&e);
                        return;
                    }
                };
                let filename = self
                    .active_document
                    .as_ref()
                    .map(|p| p.display().to_string());
                let tx = self.msg_tx.clone();
                let question = request.prompt;

                tokio::spawn(async move {
                    let result = client
                        .ask(&question, filename.as_deref())
                        .await
                        .map(|response| response.answer)
                        .map_err(|e| e.to_string());
                    let _ = tx.send(Message::AskCompleted { question, result }).await;
                });
            }
        }
    }

    // ─────────────────────────────────────────────────────────
    // Run events
    // ─────────────────────────────────────────────────────────

    fn handle_worker_event(&mut self, run: RunId, event: WorkerEvent) {
        if !self.session.is_current(run) {
            trace!("Dropping worker event from stale {}", run);
            return;
        }

        match event {
            WorkerEvent::Stdout(line) => self.emit(EngineEvent::WorkerOutput {
                stream: OutputStream::Stdout,
                line,
            }),
            WorkerEvent::Stderr(line) => self.emit(EngineEvent::WorkerOutput {
                stream: OutputStream::Stderr,
                line,
            }),
            WorkerEvent::Ready => self.handle_ready(run),
            WorkerEvent::Exited { code } => {
                info!("{} worker exited with {:?}", run, code);
                self.emit(EngineEvent::WorkerExited { run, code });

                // The channel never outlives the worker
                if let Some(bridge) = self.bridge.as_mut() {
                    bridge.close();
                }
                if let Some(t) = self.session.mark_disconnected() {
                    self.emit_transition(t);
                }
            }
        }
    }

    fn handle_ready(&mut self, run: RunId) {
        let Some(transition) = self.session.mark_ready() else {
            debug!("Readiness ignored while {}", self.session.phase());
            return;
        };
        info!("{} worker is ready", run);
        self.emit(EngineEvent::WorkerReady { run });
        self.emit_transition(transition);

        let (channel_tx, channel_rx) = mpsc::channel::<ChannelEvent>(EVENT_CHANNEL_CAPACITY);
        match ChannelBridge::open(&self.settings.channel.url, channel_tx) {
            Ok(bridge) => {
                forward_channel_events(run, channel_rx, self.msg_tx.clone());
                self.bridge = Some(bridge);
            }
            Err(e) => {
                self.report(&e);
                if let Some(t) = self.session.mark_disconnected() {
                    self.emit_transition(t);
                }
            }
        }
    }

    fn handle_channel_event(&mut self, run: RunId, event: ChannelEvent) {
        if !self.session.is_current(run) {
            trace!("Dropping channel event from stale {}", run);
            return;
        }

        match event {
            ChannelEvent::Opened => {
                let address = self.settings.channel.url.clone();
                info!("Channel open: {}", address);
                self.emit(EngineEvent::ChannelOpened { address });
            }
            ChannelEvent::Message(message) => {
                if self.session.phase() != Phase::Connected {
                    debug!("Frame for {} arrived after disconnect; dropped", message.filename);
                    return;
                }
                self.show_review(message);
            }
            ChannelEvent::Malformed { raw, reason } => {
                let err = Error::malformed(reason.clone());
                warn!("{} ({})", err, preview(&raw));
                self.emit(EngineEvent::MalformedFrame {
                    reason,
                    raw: preview(&raw).to_string(),
                });
            }
            ChannelEvent::Error(message) => {
                warn!("Channel error: {}", message);
                self.emit(EngineEvent::ChannelError { message });
            }
            ChannelEvent::Closed { reason } => {
                info!("Channel closed ({:?})", reason);
                self.emit(EngineEvent::ChannelClosed { reason });
                if self.session.phase() == Phase::Connected {
                    if let Some(t) = self.session.mark_disconnected() {
                        self.emit_transition(t);
                    }
                }
            }
        }
    }

    fn show_review(&mut self, message: InboundMessage) {
        let created = self.surface.current_id().is_none();
        match self.surface.show_review(&message) {
            Ok(id) => {
                self.session.record_review();
                if created {
                    self.emit(EngineEvent::SurfaceShown { id });
                }
                self.emit(EngineEvent::Review {
                    markdown: render::review_markdown(&message),
                    filename: message.filename,
                    comment: message.comment,
                });
            }
            Err(e) => {
                warn!("Failed to render review for {}: {}", message.filename, e);
                self.emit(EngineEvent::Error {
                    message: format!("failed to render review: {}", e),
                    fatal: false,
                });
            }
        }
    }

    // ─────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────

    async fn output_log(&mut self) -> OutputLog {
        if let Some(log) = &self.output_log {
            return log.clone();
        }
        let log = match logging::get_worker_output_log() {
            Ok(path) => match OutputLog::open(&path).await {
                Ok(log) => log,
                Err(e) => {
                    warn!("Worker output log unavailable: {}", e);
                    OutputLog::disabled()
                }
            },
            Err(e) => {
                warn!("Worker output log unavailable: {}", e);
                OutputLog::disabled()
            }
        };
        self.output_log = Some(log.clone());
        log
    }

    fn ask_client(&mut self) -> Result<AskClient> {
        if let Some(client) = &self.ask_client {
            return Ok(client.clone());
        }
        let client = AskClient::new(self.settings.ask.url.clone())?;
        self.ask_client = Some(client.clone());
        Ok(client)
    }

    fn report(&self, err: &Error) {
        if err.is_fatal() {
            error!("{}", err);
        } else {
            warn!("{}", err);
        }
        self.emit(EngineEvent::error(err));
    }

    fn emit_transition(&self, t: Transition) {
        debug!("Phase {} -> {}", t.from, t.to);
        self.emit(EngineEvent::PhaseChanged {
            old_phase: t.from,
            new_phase: t.to,
        });
    }

    /// Emit a single EngineEvent to all subscribers.
    ///
    /// send() only fails when nobody is subscribed, which is fine.
    fn emit(&self, event: EngineEvent) {
        let _ = self.event_tx.send(event);
    }

    fn start_save_watcher(
        workspace_root: &Path,
        settings: &Settings,
        msg_tx: mpsc::Sender<Message>,
    ) -> Option<SaveWatcher> {
        let mut watcher = SaveWatcher::new(
            workspace_root.to_path_buf(),
            WatcherConfig::from_settings(&settings.watcher),
        );
        if let Err(e) = watcher.start(msg_tx) {
            warn!("Failed to start save observer: {}", e);
            return None;
        }
        Some(watcher)
    }
}

/// Tag worker events with their run and feed them into the message channel
fn forward_worker_events(
    run: RunId,
    mut rx: mpsc::Receiver<WorkerEvent>,
    msg_tx: mpsc::Sender<Message>,
) {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if msg_tx.send(Message::Worker { run, event }).await.is_err() {
                break;
            }
        }
    });
}

/// Tag channel events with their run and feed them into the message channel
fn forward_channel_events(
    run: RunId,
    mut rx: mpsc::Receiver<ChannelEvent>,
    msg_tx: mpsc::Sender<Message>,
) {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if msg_tx.send(Message::Channel { run, event }).await.is_err() {
                break;
            }
        }
    });
}
