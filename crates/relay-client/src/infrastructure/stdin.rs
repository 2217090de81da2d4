//! Line reader thread for standard input.
//!
//! Blocking reads from stdin cannot be cancelled.  Running them on a plain
//! OS thread keeps them off the async runtime, so the process can exit while
//! a read is still pending.

use std::io::BufRead;
use std::thread;

use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Lines buffered between the reader thread and the session.
const LINE_QUEUE: usize = 16;

/// Spawns a thread that forwards each line of `source` to the returned channel.
///
/// The channel closes when `source` reaches end of file, a read fails, or the
/// receiver is dropped.
///
/// # Errors
///
/// Returns the error from spawning the thread.
pub fn spawn_line_reader<B>(source: B) -> std::io::Result<mpsc::Receiver<String>>
where
    B: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(LINE_QUEUE);
    thread::Builder::new()
        .name("relay-stdin".into())
        .spawn(move || {
            for line in source.lines() {
                match line {
                    Ok(line) => {
                        if tx.blocking_send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("stdin read failed: {e}");
                        break;
                    }
                }
            }
            debug!("stdin reader finished");
        })?;
    Ok(rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_forwards_lines_then_closes() {
        // Arrange
        let source = Cursor::new(b"hello\nquit\n".to_vec());

        // Act
        let mut rx = spawn_line_reader(source).unwrap();

        // Assert
        assert_eq!(rx.recv().await.as_deref(), Some("hello"));
        assert_eq!(rx.recv().await.as_deref(), Some("quit"));
        assert_eq!(rx.recv().await, None);
    }
}
