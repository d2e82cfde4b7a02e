//! Tool host trait.

use std::future::Future;

use mcp::JsonObject;

use crate::model::ToolSpec;
use crate::tools::ToolError;

/// Trait for tool execution hosts.
///
/// This is the boundary between the orchestration loop and side effects.
/// The catalogue is read on every request, so implementations must reflect
/// their current state rather than a snapshot.
pub trait ToolHost: Send + Sync {
    /// Tool definitions to publish to the model.
    fn catalogue(&self) -> impl Future<Output = Vec<ToolSpec>> + Send;

    /// Invoke a tool by its published name.
    ///
    /// On success the result is text for the model. On failure the error's
    /// `Display` is what the model sees instead.
    fn invoke(
        &self,
        name: &str,
        arguments: JsonObject,
    ) -> impl Future<Output = Result<String, ToolError>> + Send;
}
