//! Configuration loading from parley.toml, the environment and flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use mcp::BackendConfig;
use runtime::{ModelParams, ResponseMode, SessionSettings};
use serde::Deserialize;

/// Config file read when `--config` is not given, if it exists.
pub const DEFAULT_CONFIG_FILE: &str = "parley.toml";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub conversation: ConversationConfig,

    #[serde(default)]
    pub registration: RegistrationConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Tool backends to register at startup.
    #[serde(default)]
    pub backends: Vec<BackendConfig>,
}

/// Completion API settings.
#[derive(Debug, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model")]
    pub name: String,

    /// Any OpenAI-compatible endpoint. Defaults to the OpenAI API.
    pub base_url: Option<String>,

    /// Usually supplied through `OPENAI_API_KEY` instead.
    pub api_key: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    pub max_tokens: Option<u32>,

    #[serde(default = "default_seed")]
    pub seed: Option<i64>,

    /// Stream tokens as they are generated.
    #[serde(default)]
    pub stream: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model(),
            base_url: None,
            api_key: None,
            temperature: default_temperature(),
            max_tokens: None,
            seed: default_seed(),
            stream: false,
        }
    }
}

/// Conversation behavior.
#[derive(Debug, Deserialize)]
pub struct ConversationConfig {
    /// Inline system instruction. Wins over `system_file`.
    pub system: Option<String>,

    pub system_file: Option<PathBuf>,

    #[serde(default = "default_true")]
    pub history: bool,

    /// Sliding window in turns.
    pub window: Option<usize>,

    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,

    #[serde(default = "default_true")]
    pub repair_arguments: bool,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            system: None,
            system_file: None,
            history: true,
            window: None,
            max_tool_rounds: default_max_tool_rounds(),
            repair_arguments: true,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RegistrationConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Log output settings.
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset.
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    /// Append logs here instead of stderr.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Settings taken from command-line flags.
#[derive(Debug, Default)]
pub struct Overrides {
    pub stream: bool,
    pub no_history: bool,
    pub window: Option<usize>,
    pub log_file: Option<PathBuf>,
    pub log_format: Option<LogFormat>,
}

fn default_model() -> String {
    "gpt-4.1".to_string()
}

fn default_temperature() -> f32 {
    1.0
}

fn default_seed() -> Option<i64> {
    Some(0)
}

fn default_true() -> bool {
    true
}

fn default_max_tool_rounds() -> usize {
    runtime::DEFAULT_MAX_TOOL_ROUNDS
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_level() -> String {
    "warn".to_string()
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load `path` if given, else `parley.toml` if present, else defaults.
    pub fn discover(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::load(DEFAULT_CONFIG_FILE),
            None => Ok(Self::default()),
        }
    }

    /// Apply environment variables on top of the file settings.
    pub fn apply_env(
        &mut self,
        var: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(key) = var("OPENAI_API_KEY") {
            self.model.api_key = Some(key);
        }
        if let Some(url) = var("OPENAI_BASE_URL") {
            self.model.base_url = Some(url);
        }
        if let Some(model) = var("MODEL") {
            self.model.name = model;
        }
        if let Some(value) = var("TEMPERATURE") {
            self.model.temperature = parse_env("TEMPERATURE", &value)?;
        }
        if let Some(value) = var("MAX_TOKENS") {
            self.model.max_tokens = Some(parse_env("MAX_TOKENS", &value)?);
        }
        if let Some(system) = var("SYSTEM_MESSAGE") {
            self.conversation.system = Some(system);
        }
        Ok(())
    }

    /// Apply command-line flags, which win over everything else.
    pub fn apply_overrides(&mut self, overrides: Overrides) {
        if overrides.stream {
            self.model.stream = true;
        }
        if overrides.no_history {
            self.conversation.history = false;
        }
        if overrides.window.is_some() {
            self.conversation.window = overrides.window;
        }
        if overrides.log_file.is_some() {
            self.logging.file = overrides.log_file;
        }
        if let Some(format) = overrides.log_format {
            self.logging.format = format;
        }
    }

    pub fn api_key(&self) -> Result<&str, ConfigError> {
        self.model
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)
    }

    /// The system instruction, inline or read from its file.
    pub fn system_instruction(&self) -> Result<String, ConfigError> {
        let conversation = &self.conversation;
        if let Some(system) = conversation.system.as_deref().filter(|s| !s.trim().is_empty()) {
            return Ok(system.to_string());
        }
        if let Some(path) = &conversation.system_file {
            let system = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;
            if !system.trim().is_empty() {
                return Ok(system.trim().to_string());
            }
        }
        Err(ConfigError::MissingSystem)
    }

    pub fn session_settings(&self) -> Result<SessionSettings, ConfigError> {
        let mut params = ModelParams::new(&self.model.name)
            .temperature(self.model.temperature)
            .seed(self.model.seed);
        if let Some(max_tokens) = self.model.max_tokens {
            params = params.max_tokens(max_tokens);
        }
        let mode = if self.model.stream {
            ResponseMode::Streaming
        } else {
            ResponseMode::Complete
        };

        Ok(SessionSettings::new(params, self.system_instruction()?)
            .history(self.conversation.history)
            .window(self.conversation.window)
            .max_tool_rounds(self.conversation.max_tool_rounds)
            .mode(mode)
            .repair_arguments(self.conversation.repair_arguments))
    }

    pub fn registration_timeout(&self) -> Duration {
        Duration::from_secs(self.registration.timeout_secs)
    }
}

fn parse_env<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        name,
        value: value.to_string(),
    })
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid value for {name}: {value:?}")]
    InvalidEnv { name: &'static str, value: String },

    #[error("API key not configured: set OPENAI_API_KEY or model.api_key")]
    MissingApiKey,

    #[error(
        "system instruction not configured: set SYSTEM_MESSAGE, conversation.system or conversation.system_file"
    )]
    MissingSystem,
}
