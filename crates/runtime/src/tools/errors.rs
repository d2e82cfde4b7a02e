use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from a single tool call.
///
/// The `Display` output is what the model reads in the transcript, so the
/// prefixes are part of the in-band contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum ToolError {
    /// The call's arguments could not be parsed, even after recovery.
    #[error("error_parsing_args: {0}")]
    InvalidArguments(String),
    /// The tool name is not of the form `<backend>__<tool>`.
    #[error("tool_error: malformed tool name {0:?}, expected <backend>__<tool>")]
    Routing(String),
    /// No backend with this name is registered.
    #[error("tool_error: no backend registered as {0:?}")]
    NotFound(String),
    /// The backend reported a failure.
    #[error("tool_error: {0}")]
    Execution(String),
}

/// Errors from registering tool backends.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RegistryError {
    /// The backend configuration is unusable; never retried.
    #[error("invalid backend config: {0}")]
    Validation(String),

    /// Connecting to the backend or listing its tools failed.
    #[error("backend {backend}: {source}")]
    Connect {
        backend: String,
        #[source]
        source: mcp::Error,
    },

    /// Batch registration deadline passed before this backend finished.
    #[error("backend {backend}: registration deadline elapsed")]
    DeadlineElapsed { backend: String },

    /// One or more backends in a batch failed. Successful backends stay
    /// registered. Failures are kept in configuration order.
    #[error("registration failed: {}", join(failures))]
    Registration { failures: Vec<RegistryError> },
}

impl RegistryError {
    /// The backend this error is about, if it names one.
    pub fn backend(&self) -> Option<&str> {
        match self {
            Self::Connect { backend, .. } | Self::DeadlineElapsed { backend } => Some(backend),
            _ => None,
        }
    }

    /// Whether a fresh attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connect { .. })
    }
}

fn join(failures: &[RegistryError]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
