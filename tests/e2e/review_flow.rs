//! Full review flow: start → readiness → channel → review panel → stop

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use pairbot_app::{ChannelState, EngineEvent, Message, Participant, Phase, WorkerState};

use super::mock_worker::{refused_url, MockChannelServer};
use crate::{count, Harness};

const REVIEW: &str = r#"{"filename":"a.py","comment":"looks good"}"#;

async fn wait_channel_closed(harness: &Harness) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !harness
        .engine
        .channel_state()
        .map(|s| s.is_closed())
        .unwrap_or(true)
    {
        assert!(
            tokio::time::Instant::now() < deadline,
            "channel never closed: {:?}",
            harness.engine.channel_state()
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn test_review_reaches_panel() {
    let server = MockChannelServer::start(vec!["not json".to_string(), REVIEW.to_string()]).await;
    let mut harness = Harness::new(&server.url);

    harness.engine.process_message(Message::Start).await;
    assert_eq!(harness.engine.phase(), Phase::Launching);

    let events = harness
        .pump_until(|e| matches!(e, EngineEvent::Review { .. }))
        .await;

    assert_eq!(
        count(&events, |e| matches!(e, EngineEvent::WorkerReady { .. })),
        1
    );
    assert_eq!(
        count(&events, |e| matches!(e, EngineEvent::ChannelOpened { .. })),
        1
    );
    assert_eq!(
        count(&events, |e| matches!(e, EngineEvent::MalformedFrame { .. })),
        1
    );
    assert!(events.iter().any(|e| matches!(
        e,
        EngineEvent::WorkerOutput { line, .. } if line == "starting review server"
    )));
    assert_eq!(harness.engine.phase(), Phase::Connected);
    assert_eq!(harness.engine.channel_state(), Some(ChannelState::Open));

    // One surface, carrying the rendered review
    let created = harness.host.created();
    assert_eq!(created.len(), 1);
    let html = harness.host.content(created[0]).expect("surface content");
    assert!(html.contains("<strong>a.py</strong>"));
    assert!(html.contains("looks good"));

    harness.engine.shutdown().await;
    assert!(server.finished(Duration::from_secs(5)).await.is_some());
}

#[tokio::test]
async fn test_stop_twice_leaves_everything_terminal() {
    let server = MockChannelServer::start(vec![REVIEW.to_string()]).await;
    let mut harness = Harness::new(&server.url);

    harness.engine.process_message(Message::Start).await;
    harness
        .pump_until(|e| matches!(e, EngineEvent::Review { .. }))
        .await;

    harness.engine.process_message(Message::Stop).await;
    harness.engine.process_message(Message::Stop).await;

    assert_eq!(harness.engine.phase(), Phase::Idle);
    assert!(harness.engine.wait_worker_exit(Duration::from_secs(5)).await);
    assert!(matches!(
        harness.engine.worker_state(),
        WorkerState::Exited(_)
    ));
    wait_channel_closed(&harness).await;
    assert!(server.finished(Duration::from_secs(5)).await.is_some());

    // The panel survives a stop; only the user or deactivation closes it
    assert_eq!(harness.host.live().len(), 1);
}

#[tokio::test]
async fn test_restart_after_refused_channel() {
    let mut harness = Harness::new(&refused_url().await);

    harness.engine.process_message(Message::Start).await;
    harness
        .pump_until(|e| matches!(e, EngineEvent::ChannelClosed { .. }))
        .await;
    assert_eq!(harness.engine.phase(), Phase::Disconnected);

    // Disconnected only leaves through an explicit stop
    harness.engine.process_message(Message::Start).await;
    assert!(harness
        .drain()
        .iter()
        .any(|e| matches!(e, EngineEvent::Error { fatal: false, .. })));

    harness.engine.process_message(Message::Stop).await;
    assert_eq!(harness.engine.phase(), Phase::Idle);

    harness.engine.process_message(Message::Start).await;
    assert_eq!(harness.engine.phase(), Phase::Launching);
    harness.engine.shutdown().await;
}

#[tokio::test]
async fn test_invalid_executable_opens_no_channel() {
    let mut harness = Harness::new(&refused_url().await);
    harness.engine.settings.worker.python_path = "/nonexistent/python3".to_string();

    harness.engine.process_message(Message::Start).await;

    let events = harness.drain();
    assert!(events
        .iter()
        .any(|e| matches!(e, EngineEvent::Error { fatal: true, .. })));
    assert_eq!(
        count(&events, |e| matches!(e, EngineEvent::WorkerStarted { .. })),
        0
    );
    assert!(harness.engine.channel_state().is_none());
    assert_eq!(harness.engine.phase(), Phase::Idle);
}

#[tokio::test]
async fn test_user_closing_panel_then_next_review_reopens_it() {
    let server = MockChannelServer::start(vec![REVIEW.to_string()]).await;
    let mut harness = Harness::new(&server.url);

    harness.engine.process_message(Message::Start).await;
    harness
        .pump_until(|e| matches!(e, EngineEvent::Review { .. }))
        .await;
    let first = harness.host.created()[0];

    harness.engine.process_message(Message::CloseSurface).await;
    assert!(harness.host.is_disposed(first));
    assert!(harness.engine.surface().current_id().is_none());

    // A stale disposal notice for the closed surface is ignored
    harness
        .engine
        .process_message(Message::SurfaceDisposed { id: first })
        .await;
    assert!(harness.host.live().is_empty());

    harness.engine.shutdown().await;
}

/// Serve one HTTP request with `body` and return the request text
async fn one_shot_ask_server(body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");

    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        let mut request = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = stream.read(&mut buf).await.expect("read");
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&request);
            if let Some(split) = text.find("\r\n\r\n") {
                let length = text[..split]
                    .lines()
                    .find_map(|l| {
                        let (name, value) = l.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if request.len() >= split + 4 + length {
                    break;
                }
            }
        }

        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).await.expect("write");
        let _ = stream.shutdown().await;
        String::from_utf8_lossy(&request).into_owned()
    });

    (format!("http://{addr}/ask_superduper"), handle)
}

#[tokio::test]
async fn test_ask_sends_active_document_and_emits_answer() {
    let (ask_url, server) = one_shot_ask_server(r#"{"answer":"It prints **hi**."}"#).await;
    let mut harness = Harness::new(&refused_url().await);
    harness.engine.settings.ask.url = ask_url;

    let saved = harness.workspace.path().join("a.py");
    harness
        .engine
        .process_message(Message::DocumentSaved {
            path: saved.clone(),
        })
        .await;
    harness
        .engine
        .process_message(Message::Chat(pairbot_app::ChatRequest {
            participant: Participant::Superduper,
            prompt: "what does this do?".to_string(),
        }))
        .await;

    let events = harness
        .pump_until(|e| matches!(e, EngineEvent::Answer { .. }))
        .await;
    assert!(events.iter().any(|e| matches!(
        e,
        EngineEvent::Answer { question, answer }
            if question == "what does this do?" && answer == "It prints **hi**."
    )));

    let request = server.await.expect("server task");
    assert!(request.starts_with("POST /ask_superduper"));
    assert!(request.contains(r#""question":"what does this do?""#));
    assert!(request.contains("a.py"));
}
