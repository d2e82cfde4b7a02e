//! Conversation transcript with a sliding window.

use std::collections::HashSet;

use tracing::debug;

use crate::model::{Message, Role};

/// The ordered message log sent to the model.
///
/// The system message is always first and is never evicted. When a window
/// of `n` turns is set, older turns are dropped before each new user
/// message so that at most `2 * n` messages follow the system message.
/// Eviction always starts the kept tail at a user message, so an assistant
/// message is never separated from the tool results that answer it.
#[derive(Debug, Clone)]
pub struct Transcript {
    messages: Vec<Message>,
    window: Option<usize>,
}

impl Transcript {
    pub fn new(system: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system)],
            window: None,
        }
    }

    /// Keep only the most recent `turns` turns. `None` disables trimming.
    pub fn with_window(mut self, turns: Option<usize>) -> Self {
        self.window = turns;
        self
    }

    pub fn window(&self) -> Option<usize> {
        self.window
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn system(&self) -> &Message {
        &self.messages[0]
    }

    /// Apply the window, then append a user message.
    pub fn push_user(&mut self, text: impl Into<String>) {
        self.trim();
        self.messages.push(Message::user(text));
    }

    /// Append an assistant or tool message.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Drop every message from index `len` on. The system message stays.
    pub fn truncate(&mut self, len: usize) {
        self.messages.truncate(len.max(1));
    }

    /// Drop old turns according to the window.
    pub fn trim(&mut self) {
        let Some(turns) = self.window else {
            return;
        };

        let history = self.messages.len() - 1;
        let limit = turns.saturating_mul(2);
        if history <= limit {
            return;
        }

        let tail_start = self.messages.len() - limit;
        let start = self.messages[tail_start..]
            .iter()
            .position(|m| m.role == Role::User)
            .map_or(self.messages.len(), |offset| tail_start + offset);

        let dropped = start - 1;
        self.messages.drain(1..start);
        debug!(dropped, kept = self.messages.len() - 1, "trimmed transcript");
    }

    /// Whether every tool message answers a call from the assistant
    /// message right before its run, and every such call is answered
    /// before the next non-tool message.
    pub fn is_well_paired(&self) -> bool {
        let mut pending: HashSet<String> = HashSet::new();
        for message in &self.messages {
            match message.role {
                Role::Tool => {
                    let Some(result) = message.tool_result() else {
                        return false;
                    };
                    if !pending.remove(result.tool_call_id()) {
                        return false;
                    }
                }
                _ => {
                    if !pending.is_empty() {
                        return false;
                    }
                    if message.role == Role::Assistant {
                        pending = message.tool_calls().into_iter().map(|c| c.id).collect();
                    }
                }
            }
        }
        pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Part, ToolCall, ToolResult};

    fn tool_turn(transcript: &mut Transcript, user: &str, call_id: &str) {
        transcript.push_user(user);
        transcript.push(Message::from_parts(
            Role::Assistant,
            vec![Part::ToolCall(ToolCall::new(call_id, "weather__get_forecast", "{}"))],
        ));
        transcript.push(Message::tool(ToolResult::success(call_id, "{}")));
        transcript.push(Message::assistant("sunny"));
    }

    #[test]
    fn unbounded_by_default() {
        let mut transcript = Transcript::new("sys");
        for i in 0..20 {
            transcript.push_user(format!("q{i}"));
            transcript.push(Message::assistant(format!("a{i}")));
        }
        assert_eq!(transcript.messages().len(), 41);
        assert_eq!(transcript.system().role, Role::System);
    }

    #[test]
    fn window_bounds_length_and_keeps_system_first() {
        let n = 3;
        let mut transcript = Transcript::new("sys").with_window(Some(n));
        for i in 0..10 {
            transcript.push_user(format!("q{i}"));
            transcript.push(Message::assistant(format!("a{i}")));

            transcript.trim();
            assert!(transcript.messages().len() <= 1 + 2 * n);
            assert_eq!(transcript.messages()[0].role, Role::System);
            assert_eq!(transcript.messages()[0].text(), "sys");
        }
        assert_eq!(transcript.messages()[1].text(), "q7");
        assert_eq!(transcript.messages().last().unwrap().text(), "a9");
    }

    #[test]
    fn window_never_splits_tool_pairs() {
        let mut transcript = Transcript::new("sys").with_window(Some(2));
        for i in 0..5 {
            tool_turn(&mut transcript, &format!("q{i}"), &format!("call_{i}"));
            assert!(transcript.is_well_paired());
        }
        transcript.push_user("last");
        assert!(transcript.is_well_paired());
        assert_eq!(transcript.messages()[1].role, Role::User);
        assert!(transcript.messages().len() <= 2 + 2 * 2);
    }

    #[test]
    fn zero_window_keeps_only_current_message() {
        let mut transcript = Transcript::new("sys").with_window(Some(0));
        transcript.push_user("one");
        transcript.push(Message::assistant("1"));
        transcript.push_user("two");
        assert_eq!(transcript.messages().len(), 2);
        assert_eq!(transcript.messages()[1].text(), "two");
    }

    #[test]
    fn truncate_keeps_system_message() {
        let mut transcript = Transcript::new("sys");
        tool_turn(&mut transcript, "q", "call_1");
        transcript.truncate(2);
        assert_eq!(transcript.messages().len(), 2);
        assert_eq!(transcript.messages()[1].text(), "q");

        transcript.truncate(0);
        assert_eq!(transcript.messages().len(), 1);
        assert_eq!(transcript.system().text(), "sys");
    }

    #[test]
    fn pairing_detects_orphan_tool_message() {
        let mut transcript = Transcript::new("sys");
        transcript.push_user("hi");
        transcript.push(Message::tool(ToolResult::success("call_x", "{}")));
        assert!(!transcript.is_well_paired());
    }

    #[test]
    fn pairing_detects_unanswered_call() {
        let mut transcript = Transcript::new("sys");
        transcript.push_user("hi");
        transcript.push(Message::from_parts(
            Role::Assistant,
            vec![
                Part::ToolCall(ToolCall::new("a", "x__y", "{}")),
                Part::ToolCall(ToolCall::new("b", "x__y", "{}")),
            ],
        ));
        transcript.push(Message::tool(ToolResult::success("a", "{}")));
        assert!(!transcript.is_well_paired());

        transcript.push(Message::tool(ToolResult::success("b", "{}")));
        assert!(transcript.is_well_paired());
    }
}
