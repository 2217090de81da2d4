//! One chat session over an established connection.
//!
//! Two loops share the connection and a [`CancellationToken`]:
//!
//! ```text
//!   input lines ──► input loop ──"alice: hi\n"──► writer ─┐
//!                      │                                  │  server
//!                      │ cancel()          cancel()       │
//!                      ▼                      ▲           │
//!                  CancellationToken ◄────────┘           │
//!                      │                                  │
//!   renderer ◄──── receive loop ◄──────────── reader ◄────┘
//! ```
//!
//! Whichever loop finishes first records why ([`SessionEnd`]) and cancels the
//! token; the other loop sees the cancellation at its next await point and
//! returns without recording anything.  Cancelling the token from outside
//! (Ctrl-C) ends both loops with [`SessionEnd::Cancelled`].

use std::fmt;
use std::io;
use std::sync::{Mutex, OnceLock, PoisonError};

use relay_core::{is_quit, QUIT_SENTINEL, RECV_BUFFER_SIZE};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::domain::{compose_message, decode_incoming, encode_outgoing, parse_input, InputLine};

/// Output sink for chat text.
pub trait Renderer {
    /// Shows text received from the relay.
    fn render_incoming(&mut self, text: &str);

    /// Shows a line this client is about to send.
    fn render_own(&mut self, message: &str);
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The user typed `quit`; the sentinel was sent.
    LocalQuit,
    /// Local input reached end of file.
    InputClosed,
    /// The server closed the connection.
    PeerClosed,
    /// The server relayed an exact `quit`.
    PeerQuit,
    /// Writing to the connection failed.
    SendFailed(io::ErrorKind),
    /// Reading from the connection failed.
    ReceiveFailed(io::ErrorKind),
    /// The session was cancelled from outside.
    Cancelled,
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEnd::LocalQuit => f.write_str("quit requested"),
            SessionEnd::InputClosed => f.write_str("input closed"),
            SessionEnd::PeerClosed => f.write_str("server closed the connection"),
            SessionEnd::PeerQuit => f.write_str("server sent quit"),
            SessionEnd::SendFailed(kind) => write!(f, "send failed ({kind})"),
            SessionEnd::ReceiveFailed(kind) => write!(f, "receive failed ({kind})"),
            SessionEnd::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Runs the input and receive loops until one of them ends.
///
/// `input` yields raw lines typed by the user; a closed channel counts as end
/// of input.  Each chat line is echoed through `renderer` before it is sent.
pub async fn run_session<R, W, Ren>(
    mut reader: R,
    mut writer: W,
    mut input: mpsc::Receiver<String>,
    username: &str,
    renderer: &Mutex<Ren>,
    token: CancellationToken,
) -> SessionEnd
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    Ren: Renderer,
{
    let first = OnceLock::new();
    let finish = |end: SessionEnd| {
        if first.set(end).is_ok() {
            debug!(%end, "session finishing");
        }
        token.cancel();
    };

    let input_loop = async {
        loop {
            let line = tokio::select! {
                _ = token.cancelled() => return,
                line = input.recv() => line,
            };
            let Some(line) = line else {
                finish(SessionEnd::InputClosed);
                return;
            };

            let outgoing = match parse_input(&line) {
                InputLine::Blank => continue,
                InputLine::Quit => QUIT_SENTINEL.to_owned(),
                InputLine::Message(text) => {
                    let message = compose_message(username, &text);
                    lock(renderer).render_own(&message);
                    message
                }
            };

            if let Err(e) = send(&mut writer, &outgoing).await {
                finish(SessionEnd::SendFailed(e.kind()));
                return;
            }
            if outgoing == QUIT_SENTINEL {
                finish(SessionEnd::LocalQuit);
                return;
            }
        }
    };

    let receive_loop = async {
        let mut buf = [0u8; RECV_BUFFER_SIZE];
        loop {
            let read = tokio::select! {
                _ = token.cancelled() => return,
                read = reader.read(&mut buf) => read,
            };
            match read {
                Ok(0) => {
                    finish(SessionEnd::PeerClosed);
                    return;
                }
                Ok(n) => {
                    let bytes = &buf[..n];
                    lock(renderer).render_incoming(&decode_incoming(bytes));
                    if is_quit(bytes) {
                        finish(SessionEnd::PeerQuit);
                        return;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    finish(SessionEnd::ReceiveFailed(e.kind()));
                    return;
                }
            }
        }
    };

    tokio::join!(input_loop, receive_loop);
    first.into_inner().unwrap_or(SessionEnd::Cancelled)
}

async fn send<W: AsyncWrite + Unpin>(writer: &mut W, text: &str) -> io::Result<()> {
    writer.write_all(&encode_outgoing(text)).await?;
    writer.flush().await
}

fn lock<Ren>(renderer: &Mutex<Ren>) -> std::sync::MutexGuard<'_, Ren> {
    renderer.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
