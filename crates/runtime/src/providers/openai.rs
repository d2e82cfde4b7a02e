//! OpenAI chat completions backend.

use std::collections::VecDeque;

use crate::model::{
    Backend, FinishReason, Message, ModelError, ModelRequest, ModelResponse, ModelStream, Part,
    Role, StreamEvent, ToolCall, ToolSpec, Usage,
};
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

// ─────────────────────────────────────────────────────────────────────────────
// API Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<i64>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<ApiStreamOptions>,
}

#[derive(Debug, Serialize)]
struct ApiStreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ApiToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    /// Some compatible servers omit this; an empty type counts as a function.
    #[serde(rename = "type", default)]
    call_type: String,
    function: ApiFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ApiTool<'a> {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: ApiFunction<'a>,
}

#[derive(Debug, Serialize)]
struct ApiFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ApiToolCall>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

impl From<ApiUsage> for Usage {
    fn from(usage: ApiUsage) -> Self {
        Usage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiStreamChunk {
    #[serde(default)]
    choices: Vec<ApiStreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiStreamChoice {
    #[serde(default)]
    delta: ApiDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ApiToolCallDelta>,
}

#[derive(Debug, Deserialize)]
struct ApiToolCallDelta {
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<ApiFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct ApiFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend Implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for creating an OpenAI backend.
#[derive(Debug, Clone)]
pub struct OpenAiBackendBuilder {
    api_key: String,
    base_url: String,
}

impl OpenAiBackendBuilder {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point the backend at any OpenAI-compatible API.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn build(self) -> OpenAiBackend {
        OpenAiBackend {
            client: reqwest::Client::new(),
            api_key: self.api_key,
            base_url: self.base_url,
        }
    }
}

/// OpenAI chat completions backend.
///
/// The underlying HTTP client is built once and never mutated, so one
/// instance can be shared by reference across the whole process.
pub struct OpenAiBackend {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiBackend {
    pub fn builder(api_key: impl Into<String>) -> OpenAiBackendBuilder {
        OpenAiBackendBuilder::new(api_key)
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn message_to_api(msg: &Message) -> ApiMessage {
        let role = match msg.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };

        if let Some(result) = msg.tool_result() {
            return ApiMessage {
                role,
                content: Some(result.content()),
                tool_calls: Vec::new(),
                tool_call_id: Some(result.tool_call_id().to_string()),
            };
        }

        let tool_calls: Vec<ApiToolCall> = msg
            .parts
            .iter()
            .filter_map(|part| match part {
                Part::ToolCall(call) => Some(ApiToolCall {
                    id: call.id.clone(),
                    call_type: "function".to_string(),
                    function: ApiFunctionCall {
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    },
                }),
                _ => None,
            })
            .collect();

        // Assistant messages that only carry tool calls send null content.
        let text = msg.text();
        let content = if text.is_empty() && !tool_calls.is_empty() {
            None
        } else {
            Some(text)
        };

        ApiMessage {
            role,
            content,
            tool_calls,
            tool_call_id: None,
        }
    }

    fn tool_to_api(spec: &ToolSpec) -> ApiTool<'_> {
        ApiTool {
            tool_type: "function",
            function: ApiFunction {
                name: &spec.name,
                description: &spec.description,
                parameters: &spec.schema,
            },
        }
    }

    fn build_request<'a>(request: &ModelRequest<'a>, stream: bool) -> ApiRequest<'a> {
        ApiRequest {
            model: &request.params.model,
            messages: request.messages.iter().map(Self::message_to_api).collect(),
            tools: request.tools.iter().map(Self::tool_to_api).collect(),
            temperature: request.params.temperature,
            max_tokens: request.params.max_tokens,
            seed: request.params.seed,
            stream,
            stream_options: stream.then_some(ApiStreamOptions {
                include_usage: true,
            }),
        }
    }

    fn response_to_message(message: ApiResponseMessage) -> Message {
        let mut parts = Vec::new();
        if let Some(text) = message.content.filter(|t| !t.is_empty()) {
            parts.push(Part::Text(text));
        }
        parts.extend(
            message
                .tool_calls
                .into_iter()
                .filter(|call| call.call_type.is_empty() || call.call_type == "function")
                .map(|call| {
                    Part::ToolCall(ToolCall {
                        id: call.id,
                        name: call.function.name,
                        arguments: call.function.arguments,
                    })
                }),
        );
        Message::from_parts(Role::Assistant, parts)
    }

    async fn post(&self, body: &ApiRequest<'_>) -> Result<reqwest::Response, ModelError> {
        debug!(
            endpoint = %self.endpoint(),
            messages = body.messages.len(),
            tools = body.tools.len(),
            stream = body.stream,
            "sending completion request"
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Api(format!("{status}: {body}")));
        }

        Ok(response)
    }
}

impl std::fmt::Display for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "openai({})", self.base_url)
    }
}

impl Backend for OpenAiBackend {
    async fn call(&self, request: ModelRequest<'_>) -> Result<ModelResponse, ModelError> {
        let body = Self::build_request(&request, false);
        let response = self.post(&body).await?;

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or(ModelError::EmptyResponse)?;

        let finish_reason = choice
            .finish_reason
            .as_deref()
            .map(FinishReason::from_api)
            .unwrap_or_default();

        Ok(ModelResponse {
            message: Self::response_to_message(choice.message),
            usage: api_response.usage.map(Usage::from).unwrap_or_default(),
            finish_reason,
        })
    }

    async fn stream(&self, request: ModelRequest<'_>) -> Result<ModelStream, ModelError> {
        let body = Self::build_request(&request, true);
        let response = self.post(&body).await?;
        Ok(sse_events(response.bytes_stream().boxed()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Server-Sent Events
// ─────────────────────────────────────────────────────────────────────────────

struct SseState<S> {
    bytes: S,
    buffer: Vec<u8>,
    pending: VecDeque<Result<StreamEvent, ModelError>>,
    done: bool,
}

/// Decode an SSE byte stream into model stream events.
///
/// Events are separated by a blank line. A `data: [DONE]` payload ends the
/// stream; a transport error is yielded once and then the stream ends.
fn sse_events<S, B, E>(bytes: S) -> ModelStream
where
    S: Stream<Item = Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send,
    E: std::fmt::Display + Send,
{
    let state = SseState {
        bytes,
        buffer: Vec::new(),
        pending: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((event, state));
            }
            if state.done {
                return None;
            }

            if let Some(block) = take_block(&mut state.buffer) {
                match std::str::from_utf8(&block) {
                    Ok(block) => {
                        let (events, finished) = parse_sse_block(block);
                        state.pending.extend(events);
                        state.done = finished;
                    }
                    Err(e) => {
                        let error = ModelError::InvalidResponse(format!("event is not UTF-8: {e}"));
                        state.pending.push_back(Err(error));
                    }
                }
                continue;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => state.buffer.extend_from_slice(chunk.as_ref()),
                Some(Err(e)) => {
                    state.done = true;
                    state
                        .pending
                        .push_back(Err(ModelError::Network(e.to_string())));
                }
                None => {
                    // Flush a final block that was not followed by a blank line.
                    let tail = std::mem::take(&mut state.buffer);
                    let (events, _) = parse_sse_block(&String::from_utf8_lossy(&tail));
                    state.pending.extend(events);
                    state.done = true;
                }
            }
        }
    })
    .boxed()
}

/// Remove the first complete event block from the buffer.
///
/// Works on raw bytes so a multi-byte character split across network
/// chunks is only decoded once the whole block has arrived.
fn take_block(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    let lf = find(buffer, b"\n\n").map(|at| (at, 2));
    let crlf = find(buffer, b"\r\n\r\n").map(|at| (at, 4));
    let (at, len) = match (lf, crlf) {
        (Some(a), Some(b)) => a.min(b),
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => return None,
    };
    let mut block: Vec<u8> = buffer.drain(..at + len).collect();
    block.truncate(at);
    Some(block)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Parse one SSE event block.
///
/// Returns the decoded events and whether the terminating `[DONE]` marker
/// was seen. Comment lines and non-data fields are ignored.
fn parse_sse_block(block: &str) -> (Vec<Result<StreamEvent, ModelError>>, bool) {
    let mut events = Vec::new();
    for line in block.lines() {
        let Some(data) = line.strip_prefix("data:") else {
            continue;
        };
        let data = data.trim();
        if data.is_empty() {
            continue;
        }
        if data == "[DONE]" {
            return (events, true);
        }
        match serde_json::from_str::<ApiStreamChunk>(data) {
            Ok(chunk) => events.extend(chunk_events(chunk).into_iter().map(Ok)),
            Err(e) => events.push(Err(ModelError::InvalidResponse(format!(
                "bad stream chunk: {e}"
            )))),
        }
    }
    (events, false)
}

fn chunk_events(chunk: ApiStreamChunk) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    if let Some(choice) = chunk.choices.into_iter().next() {
        if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
            events.push(StreamEvent::Text(text));
        }
        for call in choice.delta.tool_calls {
            let (name, arguments) = match call.function {
                Some(function) => (function.name, function.arguments.unwrap_or_default()),
                None => (None, String::new()),
            };
            events.push(StreamEvent::ToolCallDelta {
                index: call.index,
                id: call.id,
                name,
                arguments,
            });
        }
        if let Some(reason) = choice.finish_reason {
            events.push(StreamEvent::Finish(FinishReason::from_api(&reason)));
        }
    }
    if let Some(usage) = chunk.usage {
        events.push(StreamEvent::Usage(usage.into()));
    }
    events
}
