//! Channel pipeline between the user and a session.
//!
//! Two workers run per conversation. The inbound worker takes the next
//! queued message and drives [`Session::turn`]; the outbound worker renders
//! what the turn produced and then signals that the turn is complete. The
//! input side dispatches one message at a time and waits for that signal.
//!
//! A single [`CancellationToken`] stops everything. Both workers live in a
//! [`TaskTracker`], so [`Pipeline::shutdown`] can wait for them to finish.

use std::any::Any;
use std::io::Write;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::model::Backend;
use crate::session::{Output, Session};
use crate::tools::ToolHost;
use crate::Error;

const OUTPUT_BUFFER: usize = 64;

/// Words that end the conversation, matched exactly after trimming.
pub const EXIT_WORDS: &[&str] = &["exit", "quit", "bye"];

/// A classified line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Nothing but whitespace; ask again.
    Empty,
    /// One of the exit words.
    Exit,
    /// Anything else, trimmed.
    Message(String),
}

impl Input {
    pub fn classify(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            Self::Empty
        } else if EXIT_WORDS.contains(&line) {
            Self::Exit
        } else {
            Self::Message(line.to_string())
        }
    }
}

/// Displays session output.
pub trait Renderer: Send + 'static {
    fn render(&mut self, output: &Output);
}

/// A running pair of workers serving one session.
pub struct Pipeline {
    jobs: Option<mpsc::Sender<String>>,
    done: mpsc::Receiver<()>,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl Pipeline {
    /// Start the inbound and outbound workers.
    pub fn spawn<B, H, R>(session: Session<B, H>, renderer: R) -> Self
    where
        B: Backend + 'static,
        H: ToolHost + 'static,
        R: Renderer,
    {
        let (jobs_tx, jobs_rx) = mpsc::channel(1);
        let (output_tx, output_rx) = mpsc::channel(OUTPUT_BUFFER);
        let (done_tx, done_rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();

        tracker.spawn(inbound(session, jobs_rx, output_tx, cancel.clone()));
        tracker.spawn(outbound(renderer, output_rx, done_tx, cancel.clone()));
        tracker.close();

        Self {
            jobs: Some(jobs_tx),
            done: done_rx,
            cancel,
            tracker,
        }
    }

    /// A handle that stops the pipeline when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Dispatch one message and wait until its turn has been rendered.
    ///
    /// Returns `false` if the pipeline was cancelled or has stopped.
    pub async fn submit(&mut self, message: String) -> bool {
        let Some(jobs) = &self.jobs else {
            return false;
        };
        if self.cancel.is_cancelled() || jobs.send(message).await.is_err() {
            return false;
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            done = self.done.recv() => done.is_some(),
        }
    }

    /// Cancel both workers, close the job queue and wait for the workers
    /// to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        self.jobs.take();
        self.tracker.wait().await;
        info!("pipeline shut down");
    }
}

async fn inbound<B: Backend, H: ToolHost>(
    mut session: Session<B, H>,
    mut jobs: mpsc::Receiver<String>,
    output: mpsc::Sender<Output>,
    cancel: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            message = jobs.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };

        let turn = AssertUnwindSafe(session.turn(&message, &output)).catch_unwind();
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            outcome = turn => outcome,
        };

        let reply = match outcome {
            Ok(Ok(answer)) => Output::Answer(answer),
            Ok(Err(e)) => {
                warn!(error = %e, "turn failed");
                Output::Error(e.to_string())
            }
            Err(panic) => {
                let fault = Error::Internal(panic_message(panic.as_ref()));
                error!(error = %fault, "turn panicked");
                session.abandon_turn();
                Output::Error(fault.to_string())
            }
        };

        if cancel.is_cancelled() || output.send(reply).await.is_err() {
            break;
        }
    }
    debug!("inbound worker stopped");
}

async fn outbound<R: Renderer>(
    mut renderer: R,
    mut outputs: mpsc::Receiver<Output>,
    done: mpsc::Sender<()>,
    cancel: CancellationToken,
) {
    loop {
        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            output = outputs.recv() => match output {
                Some(output) => output,
                None => break,
            },
        };

        renderer.render(&output);
        if output.is_terminal() && done.send(()).await.is_err() {
            break;
        }
    }
    debug!("outbound worker stopped");
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "turn panicked".to_string()
    }
}

/// Prompts and status lines printed by [`run_repl`].
#[derive(Debug, Clone)]
pub struct ReplText {
    pub prompt: String,
    pub reprompt: String,
    pub thinking: String,
    pub farewell: String,
}

impl Default for ReplText {
    fn default() -> Self {
        Self {
            prompt: "You: ".into(),
            reprompt: "Please type your message".into(),
            thinking: "Bot is thinking...".into(),
            farewell: "Bye. Thanks for chatting with me.".into(),
        }
    }
}

/// Read lines from `input` and feed them to the pipeline until an exit
/// word, end of input, or cancellation.
///
/// Empty lines are answered with a reprompt and never reach the session.
pub async fn run_repl<I, W>(
    pipeline: &mut Pipeline,
    input: I,
    mut console: W,
    text: &ReplText,
) -> std::io::Result<()>
where
    I: AsyncBufRead + Unpin,
    W: Write,
{
    let cancel = pipeline.cancellation_token();
    let mut lines = input.lines();

    loop {
        write!(console, "{}", text.prompt)?;
        console.flush()?;

        let line = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            debug!("input closed");
            break;
        };

        match Input::classify(&line) {
            Input::Empty => writeln!(console, "{}", text.reprompt)?,
            Input::Exit => {
                writeln!(console, "{}", text.farewell)?;
                info!("conversation ended by user");
                break;
            }
            Input::Message(message) => {
                writeln!(console, "{}", text.thinking)?;
                if !pipeline.submit(message).await {
                    break;
                }
            }
        }
    }
    Ok(())
}
