//! Stand-ins for the review worker
//!
//! The worker process is played by a `/bin/sh` script and its channel by an
//! in-process WebSocket server, so the whole start → ready → review → stop
//! flow runs without Python.

use std::path::Path;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;

pub const MARKER: &str = "Uvicorn running on http://127.0.0.1:8000";

/// Write a worker script into `dir` and return its path.
///
/// The script prints a startup line, the readiness marker on stderr (like
/// uvicorn does), then idles until killed.
pub fn write_worker_script(dir: &Path) -> String {
    let path = dir.join("server.sh");
    let script = format!("echo 'starting review server'\necho '{MARKER}' >&2\nsleep 30\n");
    std::fs::write(&path, script).expect("write worker script");
    path.display().to_string()
}

/// A one-connection WebSocket server that pushes scripted frames
pub struct MockChannelServer {
    pub url: String,
    handle: JoinHandle<usize>,
}

impl MockChannelServer {
    /// Bind on an ephemeral port. The first client receives `frames` in order;
    /// the server then waits for the client to go away.
    pub async fn start(frames: Vec<String>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");

        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut ws = tokio_tungstenite::accept_async(stream)
                .await
                .expect("handshake");

            for frame in frames {
                ws.send(WsMessage::text(frame)).await.expect("send frame");
            }

            let mut received = 0;
            while let Some(Ok(msg)) = ws.next().await {
                if msg.is_close() {
                    break;
                }
                received += 1;
            }
            received
        });

        Self {
            url: format!("ws://{addr}/ws"),
            handle,
        }
    }

    /// Wait for the client to disconnect; returns how many frames it sent
    pub async fn finished(self, limit: Duration) -> Option<usize> {
        tokio::time::timeout(limit, self.handle)
            .await
            .ok()
            .and_then(|r| r.ok())
    }
}

/// A `ws://` address nothing listens on
pub async fn refused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("ws://{addr}/ws")
}
