use thiserror::Error;

use crate::model::ModelError;
use crate::tools::{RegistryError, ToolError};

/// Runtime errors.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Session settings are unusable.
    #[error("config error: {0}")]
    Config(String),

    /// The completion API failed; the turn was abandoned.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// A tool backend could not be registered.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    /// The model kept requesting tools past the per-turn cap.
    #[error("gave up after {0} tool-call rounds without a final answer")]
    RoundLimit(usize),

    /// Something unexpected failed inside a turn.
    #[error("internal fault: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
