//! Console output for the chat.

use std::io::Write;

use runtime::{Output, Renderer};
use tracing::warn;

pub const ANSWER_PREFIX: &str = "🤖 Chatbot: ";

/// Prints answers, streamed tokens and errors to a terminal.
pub struct ConsoleRenderer<W> {
    out: W,
    streaming: bool,
}

impl<W: Write + Send + 'static> ConsoleRenderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            streaming: false,
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }

    fn write(&mut self, output: &Output) -> std::io::Result<()> {
        match output {
            Output::Delta(token) => {
                if !self.streaming {
                    write!(self.out, "{ANSWER_PREFIX}")?;
                    self.streaming = true;
                }
                write!(self.out, "{token}")?;
            }
            Output::Answer(text) => {
                if std::mem::take(&mut self.streaming) {
                    writeln!(self.out)?;
                } else {
                    writeln!(self.out, "{ANSWER_PREFIX}{text}")?;
                }
            }
            Output::Error(message) => {
                if std::mem::take(&mut self.streaming) {
                    writeln!(self.out)?;
                }
                writeln!(self.out, "Error: {message}")?;
            }
        }
        self.out.flush()
    }
}

impl<W: Write + Send + 'static> Renderer for ConsoleRenderer<W> {
    fn render(&mut self, output: &Output) {
        if let Err(e) = self.write(output) {
            warn!(error = %e, "failed to write to console");
        }
    }
}
