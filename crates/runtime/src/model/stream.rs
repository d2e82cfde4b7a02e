//! Streaming completion events and their accumulation.
//!
//! A streaming backend yields [`StreamEvent`]s. [`StreamAccumulator`] folds
//! them back into the same [`ModelResponse`] shape the non-streaming path
//! returns, so the session handles both flavors with one code path.

use futures::stream::BoxStream;

use super::errors::ModelError;
use super::types::{FinishReason, Message, ModelResponse, Part, Role, ToolCall, Usage};

/// A lazily produced sequence of stream events.
pub type ModelStream = BoxStream<'static, Result<StreamEvent, ModelError>>;

/// One incremental piece of a streamed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A content token.
    Text(String),
    /// A fragment of the tool call at `index`. The id and name usually arrive
    /// with the first fragment, arguments are spread across many.
    ToolCallDelta {
        index: usize,
        id: Option<String>,
        name: Option<String>,
        arguments: String,
    },
    /// The model finished its choice.
    Finish(FinishReason),
    /// Token usage, sent once near the end of the stream.
    Usage(Usage),
}

#[derive(Debug, Default)]
struct PartialCall {
    index: usize,
    id: String,
    name: String,
    arguments: String,
}

/// Folds stream events into a complete response.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    text: String,
    calls: Vec<PartialCall>,
    finish_reason: Option<FinishReason>,
    usage: Usage,
    events: usize,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: &StreamEvent) {
        self.events += 1;
        match event {
            StreamEvent::Text(token) => self.text.push_str(token),
            StreamEvent::ToolCallDelta {
                index,
                id,
                name,
                arguments,
            } => {
                let position = match self.calls.iter().position(|c| c.index == *index) {
                    Some(position) => position,
                    None => {
                        self.calls.push(PartialCall {
                            index: *index,
                            ..PartialCall::default()
                        });
                        self.calls.len() - 1
                    }
                };
                let call = &mut self.calls[position];
                if let Some(id) = id {
                    call.id.clone_from(id);
                }
                if let Some(name) = name {
                    call.name.push_str(name);
                }
                call.arguments.push_str(arguments);
            }
            StreamEvent::Finish(reason) => self.finish_reason = Some(reason.clone()),
            StreamEvent::Usage(usage) => self.usage = *usage,
        }
    }

    /// The content accumulated so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Build the final response.
    ///
    /// A stream that produced no events at all is an empty response.
    pub fn finish(mut self) -> Result<ModelResponse, ModelError> {
        if self.events == 0 {
            return Err(ModelError::EmptyResponse);
        }

        self.calls.sort_by_key(|c| c.index);

        let mut parts = Vec::with_capacity(self.calls.len() + 1);
        if !self.text.is_empty() {
            parts.push(Part::Text(self.text));
        }
        for call in self.calls {
            if call.name.is_empty() {
                return Err(ModelError::InvalidResponse(format!(
                    "streamed tool call {} has no name",
                    call.index
                )));
            }
            parts.push(Part::ToolCall(ToolCall {
                id: call.id,
                name: call.name,
                arguments: call.arguments,
            }));
        }

        let has_calls = parts.iter().any(|p| matches!(p, Part::ToolCall(_)));
        let finish_reason = self.finish_reason.unwrap_or(if has_calls {
            FinishReason::ToolCalls
        } else {
            FinishReason::Stop
        });

        Ok(ModelResponse {
            message: Message::from_parts(Role::Assistant, parts),
            usage: self.usage,
            finish_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(index: usize, id: Option<&str>, name: Option<&str>, args: &str) -> StreamEvent {
        StreamEvent::ToolCallDelta {
            index,
            id: id.map(str::to_string),
            name: name.map(str::to_string),
            arguments: args.to_string(),
        }
    }

    #[test]
    fn accumulates_text_tokens() {
        let mut acc = StreamAccumulator::new();
        for token in ["Bon", "jour", "!"] {
            acc.push(&StreamEvent::Text(token.into()));
        }
        acc.push(&StreamEvent::Finish(FinishReason::Stop));
        assert_eq!(acc.text(), "Bonjour!");

        let response = acc.finish().unwrap();
        assert_eq!(response.message.text(), "Bonjour!");
        assert!(!response.message.has_tool_calls());
        assert_eq!(response.finish_reason, FinishReason::Stop);
    }

    #[test]
    fn reassembles_interleaved_tool_calls_in_index_order() {
        let mut acc = StreamAccumulator::new();
        acc.push(&delta(1, Some("call_b"), Some("notion__search"), ""));
        acc.push(&delta(0, Some("call_a"), Some("weather__get_forecast"), "{\"ci"));
        acc.push(&delta(1, None, None, "{\"query\":\"todo\"}"));
        acc.push(&delta(0, None, None, "ty\":\"Paris\"}"));
        acc.push(&StreamEvent::Usage(Usage {
            input_tokens: 12,
            output_tokens: 7,
        }));

        let response = acc.finish().unwrap();
        let calls = response.message.tool_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(
            calls[0],
            ToolCall::new("call_a", "weather__get_forecast", "{\"city\":\"Paris\"}")
        );
        assert_eq!(calls[1].id, "call_b");
        assert_eq!(calls[1].arguments, "{\"query\":\"todo\"}");
        assert_eq!(response.finish_reason, FinishReason::ToolCalls);
        assert_eq!(response.usage.total_tokens(), 19);
    }

    #[test]
    fn empty_stream_is_an_empty_response() {
        assert!(matches!(
            StreamAccumulator::new().finish(),
            Err(ModelError::EmptyResponse)
        ));
    }

    #[test]
    fn nameless_tool_call_is_invalid() {
        let mut acc = StreamAccumulator::new();
        acc.push(&delta(0, Some("call_a"), None, "{}"));
        assert!(matches!(acc.finish(), Err(ModelError::InvalidResponse(_))));
    }
}
