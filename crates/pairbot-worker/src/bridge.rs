//! Duplex channel to the worker over WebSocket.
//!
//! A [`ChannelBridge`] is opened once the worker reports readiness. Opening
//! returns immediately; a background task owns the socket, performs the
//! handshake, and reports every transition on an event channel:
//!
//! ```text
//!   open() ──▶ Connecting ──handshake ok──▶ Open ──close frame / error / close()──▶ Closed
//!                  │                                                          ▲
//!                  └──────────── handshake failed / close() ─────────────────┘
//! ```
//!
//! Inbound text frames are decoded into [`InboundMessage`]s. A frame that fails
//! to decode is reported as [`ChannelEvent::Malformed`] and the socket keeps
//! reading; frames are forwarded strictly in arrival order.

use std::sync::{Arc, RwLock};

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use pairbot_core::events::ChannelEvent;
use pairbot_core::prelude::*;

use super::protocol::{decode_frame, preview};

/// Capacity of the command channel (bounded, to apply backpressure).
const CMD_CHANNEL_CAPACITY: usize = 16;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Connection state of a [`ChannelBridge`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelState {
    /// Handshake in progress.
    Connecting,
    /// Connected and reading frames.
    Open,
    /// Terminal. Carries the close reason, if one is known.
    Closed(Option<String>),
}

impl ChannelState {
    pub fn is_closed(&self) -> bool {
        matches!(self, ChannelState::Closed(_))
    }
}

/// Internal messages sent from the public API to the background task.
enum BridgeCommand {
    SendText {
        text: String,
        ack: oneshot::Sender<Result<()>>,
    },
    Close,
}

/// Handle to one duplex channel. At most one exists per worker run.
pub struct ChannelBridge {
    address: String,
    /// `None` once `close()` has been called.
    cmd_tx: Option<mpsc::Sender<BridgeCommand>>,
    state: Arc<RwLock<ChannelState>>,
}

impl std::fmt::Debug for ChannelBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelBridge")
            .field("address", &self.address)
            .field("state", &self.state())
            .finish()
    }
}

impl ChannelBridge {
    /// Start connecting to `address` and return without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Channel`] if `address` is not a `ws://` or `wss://` URL.
    /// Connection failures are reported asynchronously as
    /// [`ChannelEvent::Error`] followed by [`ChannelEvent::Closed`].
    pub fn open(address: &str, event_tx: mpsc::Sender<ChannelEvent>) -> Result<Self> {
        let url = url::Url::parse(address)
            .map_err(|e| Error::channel(format!("invalid channel address {address}: {e}")))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::channel(format!(
                "channel address must use ws:// or wss://, got {address}"
            )));
        }

        let (cmd_tx, cmd_rx) = mpsc::channel::<BridgeCommand>(CMD_CHANNEL_CAPACITY);
        let state = Arc::new(RwLock::new(ChannelState::Connecting));

        info!("Opening channel to {}", address);
        tokio::spawn(run_bridge_task(
            address.to_string(),
            cmd_rx,
            event_tx,
            Arc::clone(&state),
        ));

        Ok(Self {
            address: address.to_string(),
            cmd_tx: Some(cmd_tx),
            state,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn state(&self) -> ChannelState {
        self.state.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ChannelState::Open
    }

    /// Send a text frame to the worker.
    ///
    /// # Errors
    ///
    /// - [`Error::ChannelClosed`] once the channel is closed or `close()` was called.
    /// - [`Error::Channel`] if the handshake is still running or the write fails.
    pub async fn send(&self, text: impl Into<String>) -> Result<()> {
        if self.state().is_closed() {
            return Err(Error::ChannelClosed);
        }
        let cmd_tx = self.cmd_tx.as_ref().ok_or(Error::ChannelClosed)?;

        let (ack, ack_rx) = oneshot::channel();
        cmd_tx
            .send(BridgeCommand::SendText {
                text: text.into(),
                ack,
            })
            .await
            .map_err(|_| Error::ChannelClosed)?;

        ack_rx.await.map_err(|_| Error::ChannelClosed)?
    }

    /// Close the channel. Idempotent, and safe before the handshake finished.
    pub fn close(&mut self) {
        if let Some(cmd_tx) = self.cmd_tx.take() {
            debug!("Closing channel to {}", self.address);
            // If the queue is full, dropping the sender still ends the task
            let _ = cmd_tx.try_send(BridgeCommand::Close);
        }
    }
}

impl Drop for ChannelBridge {
    fn drop(&mut self) {
        self.close();
    }
}

// ---------------------------------------------------------------------------
// Background task
// ---------------------------------------------------------------------------

async fn run_bridge_task(
    address: String,
    mut cmd_rx: mpsc::Receiver<BridgeCommand>,
    event_tx: mpsc::Sender<ChannelEvent>,
    state: Arc<RwLock<ChannelState>>,
) {
    let connect = connect_async(address.as_str());
    tokio::pin!(connect);

    let ws_stream = loop {
        tokio::select! {
            result = &mut connect => {
                match result {
                    Ok((ws_stream, _response)) => break ws_stream,
                    Err(err) => {
                        let reason = format!("failed to connect to {address}: {err}");
                        warn!("Channel: {}", reason);
                        let _ = event_tx.send(ChannelEvent::Error(reason.clone())).await;
                        finish(&state, &event_tx, Some(reason)).await;
                        return;
                    }
                }
            }
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(BridgeCommand::SendText { ack, .. }) => {
                        let _ = ack.send(Err(Error::channel("channel is still connecting")));
                    }
                    Some(BridgeCommand::Close) | None => {
                        debug!("Channel: closed before the handshake completed");
                        finish(&state, &event_tx, None).await;
                        return;
                    }
                }
            }
        }
    };

    set_state(&state, ChannelState::Open);
    info!("Channel open: {}", address);
    let _ = event_tx.send(ChannelEvent::Opened).await;

    let reason = run_io_loop(ws_stream, &mut cmd_rx, &event_tx).await;
    finish(&state, &event_tx, reason).await;
    debug!("Channel background task exiting");
}

/// Read/write loop for an open socket. Returns the close reason.
async fn run_io_loop(
    ws_stream: WsStream,
    cmd_rx: &mut mpsc::Receiver<BridgeCommand>,
    event_tx: &mpsc::Sender<ChannelEvent>,
) -> Option<String> {
    let (mut ws_sink, mut ws_stream) = ws_stream.split();

    loop {
        tokio::select! {
            frame = ws_stream.next() => {
                match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        handle_frame(text.as_str(), event_tx).await;
                    }
                    Some(Ok(WsMessage::Binary(bytes))) => {
                        match std::str::from_utf8(&bytes) {
                            Ok(text) => handle_frame(text, event_tx).await,
                            Err(err) => {
                                warn!("Channel: binary frame is not UTF-8: {}", err);
                                let _ = event_tx
                                    .send(ChannelEvent::Malformed {
                                        raw: String::from_utf8_lossy(&bytes).into_owned(),
                                        reason: err.to_string(),
                                    })
                                    .await;
                            }
                        }
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        debug!("Channel: received Close frame");
                        return frame
                            .map(|f| f.reason.as_str().to_string())
                            .filter(|r| !r.is_empty());
                    }
                    Some(Ok(_)) => {
                        // Ping/Pong/raw frames
                    }
                    Some(Err(err)) => {
                        warn!("Channel: read error: {}", err);
                        let reason = err.to_string();
                        let _ = event_tx.send(ChannelEvent::Error(reason.clone())).await;
                        return Some(reason);
                    }
                    None => {
                        debug!("Channel: stream ended");
                        return None;
                    }
                }
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(BridgeCommand::SendText { text, ack }) => {
                        let result = ws_sink
                            .send(WsMessage::Text(text.into()))
                            .await
                            .map_err(|e| Error::channel(format!("failed to send frame: {e}")));
                        let _ = ack.send(result);
                    }
                    Some(BridgeCommand::Close) | None => {
                        send_close(&mut ws_sink).await;
                        return None;
                    }
                }
            }
        }
    }
}

/// Decode one frame and forward either the message or the decode failure.
async fn handle_frame(raw: &str, event_tx: &mpsc::Sender<ChannelEvent>) {
    let event = match decode_frame(raw) {
        Ok(message) => {
            debug!("Channel: review for {}", message.filename);
            ChannelEvent::Message(message)
        }
        Err(err) => {
            warn!("Channel: dropping malformed frame {:?}: {}", preview(raw), err);
            ChannelEvent::Malformed {
                raw: raw.to_string(),
                reason: err.to_string(),
            }
        }
    };
    if event_tx.send(event).await.is_err() {
        debug!("Channel: event receiver dropped");
    }
}

fn set_state(state: &RwLock<ChannelState>, new_state: ChannelState) {
    let mut guard = state.write().unwrap_or_else(|e| e.into_inner());
    *guard = new_state;
}

async fn finish(
    state: &RwLock<ChannelState>,
    event_tx: &mpsc::Sender<ChannelEvent>,
    reason: Option<String>,
) {
    set_state(state, ChannelState::Closed(reason.clone()));
    info!("Channel closed ({})", reason.as_deref().unwrap_or("no reason"));
    let _ = event_tx.send(ChannelEvent::Closed { reason }).await;
}

/// Send a WebSocket Close frame, ignoring any write errors.
async fn send_close(ws_sink: &mut SplitSink<WsStream, WsMessage>) {
    let _ = ws_sink.send(WsMessage::Close(None)).await;
    let _ = ws_sink.close().await;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
