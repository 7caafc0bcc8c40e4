//! Application configuration.
//!
//! Layers, lowest priority first: built-in defaults, an optional YAML file
//! (`--config` / `CONFIG_FILE`, else `./config.yaml` when present),
//! `CORTEX_` prefixed environment variables (`CORTEX_SERVER__PORT=8080`),
//! then command line flags.
//!
//! Model service settings are read separately from the process environment
//! by [`load_llm_settings`].

use std::env;
use std::path::Path;
use std::time::Duration;

use clap::Parser;
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

use crate::llm::{
    DEFAULT_BASE_URL, DEFAULT_MODEL, LlmProtocol, LlmSettings, Provider, TransportMode,
};
use crate::session::DEFAULT_SESSION_TIMEOUT;

/// Greeting every new session starts with.
pub const DEFAULT_WELCOME_MESSAGE: &str =
    "Welcome to CortexLuma. How can I illuminate your ideas today?";

/// Persona sent as the system instruction of every conversation.
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are CortexLuma, an insightful assistant that \
     helps people illuminate their ideas. Answer clearly and concisely.";

/// Config file picked up from the working directory when none is given.
const CWD_CONFIG_FILE: &str = "config.yaml";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Address to bind
    #[arg(long, env = "HOST")]
    pub host: Option<String>,

    /// Reply delivery: `stream` or `whole`
    #[arg(long, env = "CHAT_MODE")]
    pub mode: Option<TransportMode>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub chat: ChatConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    /// Whether replies stream in or arrive whole.
    pub mode: TransportMode,
    /// Assistant persona. An empty string disables it.
    pub system_instruction: Option<String>,
    pub welcome_message: String,
    /// Also append a model message with the error text when a turn fails.
    pub append_error_message: bool,
    /// Idle sessions are dropped after this many seconds.
    pub session_idle_timeout_secs: u64,
}

impl ChatConfig {
    /// System instruction, ignoring a blank value.
    #[must_use]
    pub fn system_instruction(&self) -> Option<String> {
        self.system_instruction
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
    }

    #[must_use]
    pub fn session_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session_idle_timeout_secs)
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        // 1. Defaults
        let mut builder = Config::builder()
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("chat.mode", TransportMode::default().as_str())?
            .set_default("chat.system_instruction", DEFAULT_SYSTEM_INSTRUCTION)?
            .set_default("chat.welcome_message", DEFAULT_WELCOME_MESSAGE)?
            .set_default("chat.append_error_message", true)?
            .set_default(
                "chat.session_idle_timeout_secs",
                DEFAULT_SESSION_TIMEOUT.as_secs(),
            )?;

        // 2. Config file: explicit path must exist, ./config.yaml is optional
        if let Some(path) = &cli.config {
            builder = builder.add_source(File::new(path, FileFormat::Yaml).required(true));
        } else if Path::new(CWD_CONFIG_FILE).exists() {
            builder = builder.add_source(File::new(CWD_CONFIG_FILE, FileFormat::Yaml));
        }

        // 3. Environment, e.g. CORTEX_SERVER__PORT=8000
        builder = builder.add_source(
            Environment::with_prefix("CORTEX")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        // 4. CLI flags (and their clap env fallbacks)
        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", port)?;
        }
        if let Some(host) = cli.host {
            builder = builder.set_override("server.host", host)?;
        }
        if let Some(mode) = cli.mode {
            builder = builder.set_override("chat.mode", mode.as_str())?;
        }

        builder.build()?.try_deserialize()
    }
}

/// Load model service settings from the process environment.
///
/// A missing credential is not an error here: the server still starts and
/// every send fails until the key is provided.
pub fn load_llm_settings() -> Result<LlmSettings, String> {
    llm_settings_from(|key| env::var(key).ok())
}

/// Build [`LlmSettings`] from an environment lookup.
pub fn llm_settings_from<F>(lookup: F) -> Result<LlmSettings, String>
where
    F: Fn(&str) -> Option<String>,
{
    let non_blank = |key: &str| lookup(key).filter(|s| !s.trim().is_empty());

    let base_url = non_blank("LLM_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    let model = non_blank("LLM_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());

    let api_key = non_blank("GEMINI_API_KEY")
        .or_else(|| non_blank("API_KEY"))
        .or_else(|| non_blank("LLM_API_KEY"));

    let protocol = match non_blank("LLM_PROTOCOL")
        .unwrap_or_else(|| "auto".to_string())
        .to_lowercase()
        .as_str()
    {
        "auto" => LlmProtocol::Auto,
        "gemini" => LlmProtocol::Gemini,
        "chat" => LlmProtocol::Chat,
        other => return Err(format!("Unknown LLM_PROTOCOL: {other}")),
    };

    let provider = Provider::detect_from_url(&base_url);

    Ok(LlmSettings {
        base_url,
        api_key,
        model,
        protocol,
        provider,
    })
}
