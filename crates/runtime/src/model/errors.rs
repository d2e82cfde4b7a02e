use thiserror::Error;

/// Errors from completion API calls.
///
/// Any of these aborts the current turn; none is written to the transcript.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ModelError {
    /// A network error occurred during the API call.
    #[error("network: {0}")]
    Network(String),

    /// The completion API returned an error response.
    #[error("provider api: {0}")]
    Api(String),

    /// The provider response could not be parsed.
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    /// The provider answered with zero choices.
    #[error("empty response: no choices returned")]
    EmptyResponse,
}
