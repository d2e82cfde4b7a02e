//! Empty tool host implementation.

use mcp::JsonObject;

use crate::model::ToolSpec;
use crate::tools::{ToolError, ToolHost};

/// A tool host with no tools.
///
/// Used when no backends are configured, and in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyToolHost;

impl ToolHost for EmptyToolHost {
    async fn catalogue(&self) -> Vec<ToolSpec> {
        Vec::new()
    }

    async fn invoke(&self, name: &str, _arguments: JsonObject) -> Result<String, ToolError> {
        let (backend, _) = super::schema::split_qualified(name)?;
        Err(ToolError::NotFound(backend.to_string()))
    }
}
