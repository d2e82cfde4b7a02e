//! MCP client built on the official rmcp SDK.

use rmcp::{
    RoleClient, ServiceExt,
    model::CallToolRequestParams,
    service::RunningService,
    transport::{
        ConfigureCommandExt, StreamableHttpClientTransport, TokioChildProcess,
        streamable_http_client::StreamableHttpClientTransportConfig,
    },
};
use serde_json::Value;
use tokio::process::Command;
use tracing::debug;

use crate::config::{BackendConfig, Endpoint};
use crate::error::{Error, Result};
use crate::tool::{JsonObject, ToolDescriptor};

/// A live session with one MCP server.
pub struct McpClient {
    name: String,
    service: RunningService<RoleClient, ()>,
}

impl McpClient {
    /// Connect to the backend described by `config`.
    pub async fn connect(config: &BackendConfig) -> Result<Self> {
        match Endpoint::parse(&config.endpoint)? {
            Endpoint::Http { url } => {
                Self::connect_http(&config.name, &url, config.api_key.as_deref()).await
            }
            Endpoint::Command { program, args } => {
                Self::spawn(&config.name, &program, &args).await
            }
        }
    }

    /// Spawn an MCP server process and connect over its stdio.
    pub async fn spawn(name: &str, program: &str, args: &[String]) -> Result<Self> {
        debug!(backend = %name, %program, ?args, "spawning MCP server");

        let transport = TokioChildProcess::new(Command::new(program).configure(|cmd| {
            for arg in args {
                cmd.arg(arg);
            }
        }))?;

        let service = ()
            .serve(transport)
            .await
            .map_err(|e| Error::Connect(e.to_string()))?;

        Ok(Self {
            name: name.to_string(),
            service,
        })
    }

    /// Connect to an MCP server over streamable HTTP.
    pub async fn connect_http(name: &str, url: &str, api_key: Option<&str>) -> Result<Self> {
        debug!(backend = %name, %url, "connecting to MCP server");

        let mut config = StreamableHttpClientTransportConfig::with_uri(url);
        if let Some(key) = api_key {
            config = config.auth_header(key);
        }
        let transport = StreamableHttpClientTransport::from_config(config);

        let service = ()
            .serve(transport)
            .await
            .map_err(|e| Error::Connect(e.to_string()))?;

        Ok(Self {
            name: name.to_string(),
            service,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// List the tools the server exposes.
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        let response = self
            .service
            .list_tools(Default::default())
            .await
            .map_err(|e| Error::Protocol(e.to_string()))?;

        Ok(response.tools.into_iter().map(ToolDescriptor::from).collect())
    }

    /// Call a tool and return the full structured result.
    ///
    /// The whole `CallToolResult` is returned (content blocks, structured
    /// content, error flag), not a flattened text rendering.
    pub async fn call_tool(&self, name: &str, arguments: JsonObject) -> Result<Value> {
        let params = CallToolRequestParams {
            name: name.to_string().into(),
            arguments: Some(arguments),
            meta: None,
            task: None,
        };

        let result = self
            .service
            .call_tool(params)
            .await
            .map_err(|e| Error::ToolCallFailed(e.to_string()))?;

        Ok(serde_json::to_value(&result)?)
    }

    /// Terminate the session. The server process, if any, is killed on drop.
    pub fn close(&self) {
        debug!(backend = %self.name, "closing MCP session");
        self.service.cancellation_token().cancel();
    }
}
