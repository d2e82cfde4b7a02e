//! Connection traits used by the tool registry.
//!
//! The registry never talks to rmcp directly; it opens connections through a
//! [`Connector`] and drives them through [`ToolConnection`]. [`RmcpConnector`]
//! is the production implementation.

use std::future::Future;

use serde_json::Value;

use crate::client::McpClient;
use crate::config::BackendConfig;
use crate::error::Result;
use crate::tool::{JsonObject, ToolDescriptor};

/// An open, stateful connection to one tool backend.
pub trait ToolConnection: Send + Sync {
    /// List the backend's tools.
    fn list_tools(&self) -> impl Future<Output = Result<Vec<ToolDescriptor>>> + Send;

    /// Invoke a tool by its short (backend-local) name.
    fn call_tool(
        &self,
        name: &str,
        arguments: JsonObject,
    ) -> impl Future<Output = Result<Value>> + Send;

    /// Close the connection. Best effort; never fails.
    fn close(&self) -> impl Future<Output = ()> + Send;
}

/// Opens connections to tool backends.
pub trait Connector: Send + Sync {
    type Connection: ToolConnection + 'static;

    fn connect(
        &self,
        config: &BackendConfig,
    ) -> impl Future<Output = Result<Self::Connection>> + Send;
}

/// Connector that speaks MCP through rmcp.
#[derive(Debug, Default, Clone, Copy)]
pub struct RmcpConnector;

impl Connector for RmcpConnector {
    type Connection = McpClient;

    async fn connect(&self, config: &BackendConfig) -> Result<McpClient> {
        McpClient::connect(config).await
    }
}

impl ToolConnection for McpClient {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        McpClient::list_tools(self).await
    }

    async fn call_tool(&self, name: &str, arguments: JsonObject) -> Result<Value> {
        McpClient::call_tool(self, name, arguments).await
    }

    async fn close(&self) {
        McpClient::close(self);
    }
}
