//! Completion protocol types and the backend trait.

pub mod errors;
pub mod stream;
pub mod types;

pub use errors::ModelError;
pub use stream::{ModelStream, StreamAccumulator, StreamEvent};
pub use types::{
    Backend, FinishReason, Message, ModelParams, ModelRequest, ModelResponse, Part, Role,
    ToolCall, ToolResult, ToolSpec, Usage,
};
