//! Tool backend configuration and endpoint parsing.

use serde::Deserialize;

use crate::error::{Error, Result};

/// Configuration for one tool backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BackendConfig {
    /// Unique backend name; becomes the prefix of every published tool name.
    pub name: String,
    /// Either an `http(s)://` URL or a command line to spawn.
    pub endpoint: String,
    /// Optional bearer credential for HTTP endpoints.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl BackendConfig {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

/// Where a backend lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// MCP over streamable HTTP.
    Http { url: String },
    /// MCP over the stdio of a child process.
    Command { program: String, args: Vec<String> },
}

impl Endpoint {
    /// Parse an endpoint string.
    ///
    /// `http://` and `https://` URLs select the HTTP transport. Anything else
    /// is split on whitespace into a program and its arguments; no shell
    /// quoting is interpreted.
    pub fn parse(endpoint: &str) -> Result<Self> {
        let endpoint = endpoint.trim();
        if endpoint.is_empty() {
            return Err(Error::InvalidEndpoint("endpoint is empty".into()));
        }

        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            return Ok(Self::Http {
                url: endpoint.to_string(),
            });
        }

        let mut parts = endpoint.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| Error::InvalidEndpoint(endpoint.to_string()))?;
        Ok(Self::Command {
            program,
            args: parts.collect(),
        })
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http { url } => write!(f, "{url}"),
            Self::Command { program, args } if args.is_empty() => write!(f, "{program}"),
            Self::Command { program, args } => write!(f, "{program} {}", args.join(" ")),
        }
    }
}
