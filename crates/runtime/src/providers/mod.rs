//! Completion API backends.

mod openai;

pub use openai::{OpenAiBackend, OpenAiBackendBuilder};
