//! Conversation session: the tool-orchestration loop.
//!
//! One call to [`Session::turn`] takes a user message through as many
//! model/tool rounds as it needs and returns the final answer:
//!
//! ```text
//! RequestSent ──▶ ToolCallsPending ──▶ RequestSent ──▶ … ──▶ FinalAnswerReady
//! ```
//!
//! Tool failures are written into the transcript for the model to react
//! to. Completion API failures abort the turn and never touch history.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::model::{
    Backend, Message, ModelError, ModelParams, ModelRequest, ModelResponse, StreamAccumulator,
    StreamEvent, ToolResult, Usage,
};
use crate::recovery::{ArgumentRecovery, JsonRepair, NoRecovery, parse_arguments};
use crate::tools::ToolHost;
use crate::transcript::Transcript;
use crate::{Error, Result};

/// Default cap on tool-call rounds within one turn.
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 16;

/// How completions are fetched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseMode {
    /// Wait for the whole response.
    #[default]
    Complete,
    /// Stream tokens, forwarding content as [`Output::Delta`].
    Streaming,
}

/// Something for the user to see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// A streamed fragment of the answer being generated.
    Delta(String),
    /// The final answer of a turn.
    Answer(String),
    /// A failed turn. Rendered as `Error: <message>`.
    Error(String),
}

impl Output {
    /// Whether this output ends a turn.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Delta(_))
    }
}

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub params: ModelParams,
    pub system: String,
    /// Append final answers to the transcript. Off gives a stateless bot.
    pub history: bool,
    /// Sliding window in turns; `None` keeps everything.
    pub window: Option<usize>,
    pub max_tool_rounds: usize,
    pub mode: ResponseMode,
    /// Try to repair malformed tool arguments before giving up on them.
    pub repair_arguments: bool,
}

impl SessionSettings {
    pub fn new(params: ModelParams, system: impl Into<String>) -> Self {
        Self {
            params,
            system: system.into(),
            history: true,
            window: None,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            mode: ResponseMode::Complete,
            repair_arguments: true,
        }
    }

    pub fn history(mut self, history: bool) -> Self {
        self.history = history;
        self
    }

    pub fn window(mut self, window: Option<usize>) -> Self {
        self.window = window;
        self
    }

    pub fn max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    pub fn mode(mut self, mode: ResponseMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn repair_arguments(mut self, repair: bool) -> Self {
        self.repair_arguments = repair;
        self
    }
}

enum TurnState {
    RequestSent,
    ToolCallsPending(Message),
    FinalAnswerReady(Message),
}

/// A single conversation.
///
/// The backend and tool host are shared handles; the transcript belongs to
/// the session alone.
pub struct Session<B, H> {
    backend: Arc<B>,
    tools: Arc<H>,
    transcript: Transcript,
    settings: SessionSettings,
    recovery: Box<dyn ArgumentRecovery>,
    /// Index of the current turn's user message.
    turn_start: Option<usize>,
}

impl<B: Backend, H: ToolHost> Session<B, H> {
    pub fn new(backend: Arc<B>, tools: Arc<H>, settings: SessionSettings) -> Result<Self> {
        if settings.system.trim().is_empty() {
            return Err(Error::Config("system instruction is empty".into()));
        }
        if settings.max_tool_rounds == 0 {
            return Err(Error::Config("max_tool_rounds must be at least 1".into()));
        }

        let recovery: Box<dyn ArgumentRecovery> = if settings.repair_arguments {
            Box::new(JsonRepair)
        } else {
            Box::new(NoRecovery)
        };
        let transcript = Transcript::new(settings.system.clone()).with_window(settings.window);

        Ok(Self {
            backend,
            tools,
            transcript,
            settings,
            recovery,
            turn_start: None,
        })
    }

    /// Replace the argument recovery strategy.
    pub fn with_recovery(mut self, recovery: impl ArgumentRecovery + 'static) -> Self {
        self.recovery = Box::new(recovery);
        self
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Discard everything an unfinished turn added, its user message included.
    ///
    /// A turn that unwound part way can leave tool calls without results.
    /// Does nothing once a turn has returned.
    pub fn abandon_turn(&mut self) {
        if let Some(start) = self.turn_start.take() {
            let dropped = self.transcript.messages().len().saturating_sub(start);
            self.transcript.truncate(start);
            warn!(dropped, "discarded abandoned turn");
        }
    }

    /// Run one user turn to its final answer.
    ///
    /// In streaming mode content is forwarded to `output` as it arrives;
    /// the final answer itself is returned, not sent.
    pub async fn turn(&mut self, input: &str, output: &mpsc::Sender<Output>) -> Result<String> {
        self.turn_start = None;
        self.transcript.push_user(input);
        self.turn_start = Some(self.transcript.messages().len() - 1);

        let result = self.run_turn(output).await;
        self.turn_start = None;
        result
    }

    async fn run_turn(&mut self, output: &mpsc::Sender<Output>) -> Result<String> {
        let mut rounds = 0;
        let mut usage = Usage::default();
        let mut state = TurnState::RequestSent;

        loop {
            state = match state {
                TurnState::RequestSent => {
                    let response = self.request(output).await?;
                    usage.input_tokens += response.usage.input_tokens;
                    usage.output_tokens += response.usage.output_tokens;

                    if response.message.has_tool_calls() {
                        TurnState::ToolCallsPending(response.message)
                    } else {
                        TurnState::FinalAnswerReady(response.message)
                    }
                }
                TurnState::ToolCallsPending(message) => {
                    if rounds == self.settings.max_tool_rounds {
                        warn!(rounds, "tool-call round limit reached");
                        return Err(Error::RoundLimit(rounds));
                    }
                    rounds += 1;
                    self.run_tools(message, rounds).await;
                    TurnState::RequestSent
                }
                TurnState::FinalAnswerReady(message) => {
                    let answer = message.text();
                    if self.settings.history && !answer.is_empty() {
                        self.transcript.push(message);
                    }
                    info!(
                        rounds,
                        input_tokens = usage.input_tokens,
                        output_tokens = usage.output_tokens,
                        total_tokens = usage.total_tokens(),
                        "turn finished"
                    );
                    return Ok(answer);
                }
            };
        }
    }

    async fn request(
        &self,
        output: &mpsc::Sender<Output>,
    ) -> std::result::Result<ModelResponse, ModelError> {
        let tools = self.tools.catalogue().await;
        let request = ModelRequest {
            messages: self.transcript.messages(),
            tools: &tools,
            params: &self.settings.params,
        };
        debug!(
            messages = request.messages.len(),
            tools = tools.len(),
            mode = ?self.settings.mode,
            "requesting completion"
        );

        match self.settings.mode {
            ResponseMode::Complete => self.backend.call(request).await,
            ResponseMode::Streaming => {
                let mut stream = self.backend.stream(request).await?;
                let mut accumulator = StreamAccumulator::new();
                while let Some(event) = stream.next().await {
                    let event = event?;
                    if let StreamEvent::Text(token) = &event {
                        // A closed receiver only means nobody is watching.
                        let _ = output.send(Output::Delta(token.clone())).await;
                    }
                    accumulator.push(&event);
                }
                accumulator.finish()
            }
        }
    }

    /// Record the assistant message, then answer each of its calls in order.
    async fn run_tools(&mut self, message: Message, round: usize) {
        let calls = message.tool_calls();
        self.transcript.push(message);

        for call in calls {
            let result = match parse_arguments(&call.arguments, self.recovery.as_ref()) {
                Ok(arguments) => {
                    debug!(round, tool = %call.name, id = %call.id, "invoking tool");
                    match self.tools.invoke(&call.name, arguments).await {
                        Ok(text) => ToolResult::success(&call.id, text),
                        Err(e) => {
                            warn!(tool = %call.name, error = %e, "tool call failed");
                            ToolResult::failure(&call.id, e)
                        }
                    }
                }
                Err(e) => {
                    warn!(tool = %call.name, error = %e, "unparseable tool arguments");
                    ToolResult::failure(&call.id, e)
                }
            };
            self.transcript.push(Message::tool(result));
        }

        debug_assert!(self.transcript.is_well_paired());
    }
}
