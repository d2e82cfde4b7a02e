//! Parley runtime: the tool-orchestration loop behind the chatbot.
//!
//! # Overview
//!
//! - **Tool registry** ([`ToolRegistry`]): connects to MCP backends,
//!   publishes their tools as `<backend>__<tool>` and routes calls back.
//! - **Completion gateway** ([`Backend`], [`OpenAiBackend`]): one shared
//!   handle to the chat completions API, streaming or not.
//! - **Transcript** ([`Transcript`]): the message log with a sliding window.
//! - **Session** ([`Session`]): the request / tool-call / re-request loop.
//! - **Pipeline** ([`Pipeline`]): inbound and outbound workers with a
//!   shared cancellation token.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use mcp::BackendConfig;
//! use runtime::{ModelParams, OpenAiBackend, Session, SessionSettings, ToolRegistry};
//! use tokio::time::{Duration, Instant};
//!
//! # async fn example() -> runtime::Result<()> {
//! let backend = Arc::new(OpenAiBackend::builder("sk-...").build());
//! let registry = Arc::new(ToolRegistry::mcp());
//! let configs = [BackendConfig::new("weather", "http://localhost:8080/mcp")];
//! registry
//!     .register_all(&configs, Instant::now() + Duration::from_secs(30))
//!     .await?;
//!
//! let settings = SessionSettings::new(ModelParams::new("gpt-4.1"), "You are helpful.");
//! let mut session = Session::new(backend, registry, settings)?;
//! let (tx, _rx) = tokio::sync::mpsc::channel(16);
//! let answer = session.turn("What's the weather in Paris?", &tx).await?;
//! println!("{answer}");
//! # Ok(())
//! # }
//! ```

mod error;
pub mod model;
mod pipeline;
mod providers;
pub mod recovery;
mod session;
pub mod tools;
mod transcript;

pub use error::{Error, Result};
pub use model::{Backend, Message, ModelError, ModelParams, Role, ToolSpec};
pub use pipeline::{EXIT_WORDS, Input, Pipeline, Renderer, ReplText, run_repl};
pub use providers::{OpenAiBackend, OpenAiBackendBuilder};
pub use recovery::{ArgumentRecovery, JsonRepair, NoRecovery};
pub use session::{DEFAULT_MAX_TOOL_ROUNDS, Output, ResponseMode, Session, SessionSettings};
pub use tools::{EmptyToolHost, RegistryError, ToolError, ToolHost, ToolRegistry};
pub use transcript::Transcript;
