//! Terminal output.
//!
//! Chat text goes to stdout; log lines go to stderr (see `main.rs`), so the
//! two never interleave mid-line.
//!
//! The user's own line is redrawn in green over the line they just typed:
//!
//! ```text
//! ESC[1A   cursor up one line (back onto the typed input)
//! ESC[K    erase to end of line
//! ESC[32m  green ... ESC[0m reset
//! ```

use std::io::{self, BufRead, Write};

use tracing::debug;

use crate::application::session::Renderer;

const CURSOR_UP_AND_CLEAR: &str = "\x1b[1A\x1b[K";
const GREEN: &str = "\x1b[32m";
const RESET: &str = "\x1b[0m";

/// Renders chat text to any writer, normally stdout.
#[derive(Debug)]
pub struct TerminalRenderer<W: Write> {
    out: W,
}

impl TerminalRenderer<io::Stdout> {
    pub fn stdout() -> Self {
        Self { out: io::stdout() }
    }
}

impl<W: Write> TerminalRenderer<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, args: std::fmt::Arguments<'_>) {
        let written = self.out.write_fmt(args).and_then(|()| self.out.flush());
        if let Err(e) = written {
            debug!("terminal write failed: {e}");
        }
    }
}

impl<W: Write> Renderer for TerminalRenderer<W> {
    fn render_incoming(&mut self, text: &str) {
        self.emit(format_args!("{text}\n"));
    }

    fn render_own(&mut self, message: &str) {
        self.emit(format_args!("{CURSOR_UP_AND_CLEAR}{GREEN}{message}{RESET}\n"));
    }
}

/// Asks for a username until a non-blank one is entered.
///
/// # Errors
///
/// Returns `UnexpectedEof` if input ends before a name is given, or any
/// read/write error.
pub fn prompt_username<R: BufRead, W: Write>(input: &mut R, out: &mut W) -> io::Result<String> {
    loop {
        write!(out, "Enter your username: ")?;
        out.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "input closed before a username was entered",
            ));
        }
        let name = line.trim();
        if !name.is_empty() {
            return Ok(name.to_owned());
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
