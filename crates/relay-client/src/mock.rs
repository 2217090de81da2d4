//! Recording renderer for tests.

use crate::application::session::Renderer;

/// Keeps every rendered line instead of printing it.
#[derive(Debug, Default, Clone)]
pub struct RecordingRenderer {
    /// Text received from the relay, in arrival order.
    pub incoming: Vec<String>,
    /// This client's own echoed lines, in send order.
    pub own: Vec<String>,
}

impl Renderer for RecordingRenderer {
    fn render_incoming(&mut self, text: &str) {
        self.incoming.push(text.to_owned());
    }

    fn render_own(&mut self, message: &str) {
        self.own.push(message.to_owned());
    }
}
