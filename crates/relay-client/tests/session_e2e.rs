//! Client sessions against a live relay server on loopback.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use relay_client::mock::RecordingRenderer;
use relay_client::{connect, run_session, ClientConfig, SessionEnd};
use relay_server::{DispatchMode, RunningServer, ServerConfig};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(5);

fn start_relay(mode: DispatchMode) -> RunningServer {
    let config = ServerConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        mode,
        poll_timeout: Some(Duration::from_millis(20)),
        ..ServerConfig::default()
    };
    RunningServer::start(&config).unwrap()
}

async fn wait_for_live(server: &RunningServer, n: usize) {
    let deadline = Instant::now() + WAIT;
    while server.handle().live_connections() != n {
        assert!(Instant::now() < deadline, "relay never reached {n} clients");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// A session running in the background with its input channel and renderer.
struct Participant {
    input: mpsc::Sender<String>,
    renderer: Arc<Mutex<RecordingRenderer>>,
    token: CancellationToken,
    session: tokio::task::JoinHandle<SessionEnd>,
}

async fn join_as(server: &RunningServer, username: &'static str) -> Participant {
    let config = ClientConfig::new("127.0.0.1", server.local_addr().port());
    let stream = connect(&config).await.unwrap();
    let (reader, writer) = stream.into_split();
    let (input, lines) = mpsc::channel(8);
    let renderer = Arc::new(Mutex::new(RecordingRenderer::default()));
    let token = CancellationToken::new();

    let session = {
        let renderer = Arc::clone(&renderer);
        let token = token.clone();
        tokio::spawn(async move {
            run_session(reader, writer, lines, username, &*renderer, token).await
        })
    };

    Participant {
        input,
        renderer,
        token,
        session,
    }
}

async fn wait_for_incoming(participant: &Participant, expected: usize) -> Vec<String> {
    let deadline = Instant::now() + WAIT;
    loop {
        let incoming = participant.renderer.lock().unwrap().incoming.clone();
        if incoming.len() >= expected {
            return incoming;
        }
        assert!(Instant::now() < deadline, "only received {incoming:?}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn test_chat_line_reaches_other_client_through_relay() {
    for mode in [DispatchMode::Threaded, DispatchMode::Multiplexed] {
        // Arrange
        let server = start_relay(mode);
        let alice = join_as(&server, "alice").await;
        wait_for_live(&server, 1).await;
        let bob = join_as(&server, "bob").await;
        wait_for_live(&server, 2).await;

        // Act
        alice.input.send("hello".into()).await.unwrap();

        // Assert
        let seen = wait_for_incoming(&bob, 1).await;
        assert_eq!(seen, vec!["alice: hello".to_string()], "{mode}");
        assert!(alice.renderer.lock().unwrap().incoming.is_empty());
        assert_eq!(
            alice.renderer.lock().unwrap().own,
            vec!["alice: hello".to_string()]
        );

        alice.token.cancel();
        bob.token.cancel();
        assert_eq!(alice.session.await.unwrap(), SessionEnd::Cancelled);
        assert_eq!(bob.session.await.unwrap(), SessionEnd::Cancelled);
    }
}

#[tokio::test]
async fn test_typed_quit_ends_session_and_leaves_relay() {
    // Arrange
    let server = start_relay(DispatchMode::Threaded);
    let alice = join_as(&server, "alice").await;
    let bob = join_as(&server, "bob").await;
    wait_for_live(&server, 2).await;

    // Act
    alice.input.send("quit".into()).await.unwrap();
    let end = tokio::time::timeout(WAIT, alice.session).await.unwrap().unwrap();

    // Assert: alice is gone and bob never saw the sentinel.
    assert_eq!(end, SessionEnd::LocalQuit);
    wait_for_live(&server, 1).await;
    assert!(bob.renderer.lock().unwrap().incoming.is_empty());
    bob.token.cancel();
}

#[tokio::test]
async fn test_server_shutdown_ends_client_session() {
    // Arrange
    let server = start_relay(DispatchMode::Multiplexed);
    let alice = join_as(&server, "alice").await;
    wait_for_live(&server, 1).await;

    // Act
    let stopped = tokio::task::spawn_blocking(move || server.stop(WAIT))
        .await
        .unwrap();
    let end = tokio::time::timeout(WAIT, alice.session).await.unwrap().unwrap();

    // Assert: the input channel is still open, so only the peer ended it.
    assert!(stopped.is_some());
    assert!(matches!(
        end,
        SessionEnd::PeerClosed | SessionEnd::ReceiveFailed(_)
    ));
    drop(alice.input);
}
