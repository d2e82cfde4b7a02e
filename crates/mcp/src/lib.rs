//! MCP (Model Context Protocol) client library.
//!
//! This crate connects to tool backends over MCP, either by spawning a
//! server process and talking over its stdio or by connecting to a
//! streamable HTTP endpoint.
//!
//! # Example
//!
//! ```no_run
//! use mcp::{BackendConfig, McpClient};
//!
//! # async fn example() -> mcp::Result<()> {
//! let config = BackendConfig::new("weather", "http://localhost:8080/mcp");
//! let client = McpClient::connect(&config).await?;
//!
//! for tool in client.list_tools().await? {
//!     println!("Tool: {}", tool.name);
//! }
//!
//! let mut args = serde_json::Map::new();
//! args.insert("city".into(), "Paris".into());
//! let result = client.call_tool("get_forecast", args).await?;
//! println!("{result}");
//!
//! client.close();
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod connector;
mod error;
mod tool;

pub use client::McpClient;
pub use config::{BackendConfig, Endpoint};
pub use connector::{Connector, RmcpConnector, ToolConnection};
pub use error::{Error, Result};
pub use tool::{JsonObject, ToolDescriptor};
