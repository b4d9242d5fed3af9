//! Loading, saving and overriding the application's configuration.
//!
//! The configuration is a YAML document (normally `<config_dir>/config.yaml`)
//! deserialized into [`BizbotConfig`]. Every field has a default, so a partial
//! file is valid. After loading, the LLM settings can be overridden from the
//! environment with [`BizbotConfig::apply_env_overrides`].
//!
//! ```no_run
//! use bizbot::config::load_config;
//!
//! let mut config = load_config("/path/to/config.yaml").unwrap();
//! config.apply_process_env();
//! println!("{:?}", config.llm.default_provider);
//! ```

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::result::ConnectionError;
use serde::{Deserialize, Serialize};
use std::{
    env,
    error::Error,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::*;

use crate::llm::Provider;

/// Represents the application's configuration.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(default)]
pub struct BizbotConfig {
    /// SQLite database path or URL.
    pub database_url: String,

    /// Append a `chatbot_logs` row for every exchange.
    pub log_exchanges: bool,

    /// Directory of `<business_type>.yaml` system prompt overrides.
    pub prompts_dir: Option<PathBuf>,

    /// Language model settings.
    pub llm: LlmSettings,
}

impl Default for BizbotConfig {
    fn default() -> Self {
        Self {
            database_url: "bizbot.db".to_string(),
            log_exchanges: true,
            prompts_dir: None,
            llm: LlmSettings::default(),
        }
    }
}

/// Settings for the LLM fallback path.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(default)]
pub struct LlmSettings {
    /// Provider used when none is requested explicitly.
    pub default_provider: Provider,

    pub anthropic_model: String,
    pub anthropic_api_key: Option<String>,
    /// Full URL of the Anthropic Messages endpoint.
    pub anthropic_api_url: String,

    pub openai_model: String,
    pub openai_api_key: Option<String>,
    /// Base URL of an OpenAI-compatible API (without `/chat/completions`).
    pub openai_api_base: String,

    /// Maximum tokens in a generated reply.
    pub max_tokens: u32,

    pub temperature: f32,

    /// Send prior turns of the session along with each fallback request.
    pub enable_context: bool,

    /// Number of user/assistant exchanges kept per session.
    pub max_context_turns: usize,

    /// Intent confidence below which the message is routed to the LLM.
    pub fallback_threshold: f32,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            default_provider: Provider::Anthropic,
            anthropic_model: "claude-3-sonnet-20240229".to_string(),
            anthropic_api_key: None,
            anthropic_api_url: "https://api.anthropic.com/v1/messages".to_string(),
            openai_model: "gpt-4".to_string(),
            openai_api_key: None,
            openai_api_base: "https://api.openai.com/v1".to_string(),
            max_tokens: 1000,
            temperature: 0.7,
            enable_context: true,
            max_context_turns: 5,
            fallback_threshold: 0.3,
        }
    }
}

impl BizbotConfig {
    /// Apply overrides from the process environment.
    pub fn apply_process_env(&mut self) {
        self.apply_env_overrides(|name| env::var(name).ok());
    }

    /// Apply overrides from `lookup`, which maps an environment variable name to its value.
    ///
    /// Recognised variables:
    /// `LLM_PROVIDER`, `ANTHROPIC_MODEL`, `ANTHROPIC_API_KEY`, `OPENAI_MODEL`,
    /// `OPENAI_API_KEY`, `LLM_MAX_TOKENS`, `LLM_TEMPERATURE`, `LLM_ENABLE_CONTEXT`,
    /// `LLM_MAX_CONTEXT_TURNS`, `LLM_FALLBACK_THRESHOLD` and `BIZBOT_DATABASE_URL`.
    ///
    /// A value that does not parse is logged and ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("BIZBOT_DATABASE_URL") {
            self.database_url = url;
        }

        let llm = &mut self.llm;
        if let Some(provider) = lookup("LLM_PROVIDER") {
            llm.default_provider = Provider::from_name(&provider);
        }
        if let Some(model) = lookup("ANTHROPIC_MODEL") {
            llm.anthropic_model = model;
        }
        if let Some(key) = lookup("ANTHROPIC_API_KEY") {
            llm.anthropic_api_key = Some(key);
        }
        if let Some(model) = lookup("OPENAI_MODEL") {
            llm.openai_model = model;
        }
        if let Some(key) = lookup("OPENAI_API_KEY") {
            llm.openai_api_key = Some(key);
        }
        if let Some(v) = parse_var(&lookup, "LLM_MAX_TOKENS") {
            llm.max_tokens = v;
        }
        if let Some(v) = parse_var(&lookup, "LLM_TEMPERATURE") {
            llm.temperature = v;
        }
        if let Some(raw) = lookup("LLM_ENABLE_CONTEXT") {
            match parse_flag(&raw) {
                Some(v) => llm.enable_context = v,
                None => warn!("Ignoring LLM_ENABLE_CONTEXT={raw:?}: expected true or false"),
            }
        }
        if let Some(v) = parse_var(&lookup, "LLM_MAX_CONTEXT_TURNS") {
            llm.max_context_turns = v;
        }
        if let Some(v) = parse_var(&lookup, "LLM_FALLBACK_THRESHOLD") {
            llm.fallback_threshold = v;
        }
    }
}

fn parse_var<F, T>(lookup: &F, name: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let raw = lookup(name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring {name}={raw:?}: not a valid value");
            None
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// Loads the application's configuration from a YAML file.
///
/// Fields missing from the file take their defaults.
///
/// # Errors
/// The file cannot be read or is not valid YAML for [`BizbotConfig`].
pub fn load_config(file: impl AsRef<Path>) -> Result<BizbotConfig, Box<dyn Error>> {
    let file = file.as_ref();
    debug!("Loading config from: {}", file.display());
    let content = fs::read_to_string(file)?;
    let config: BizbotConfig = serde_yaml::from_str(&content)?;
    Ok(config)
}

/// Writes the configuration as YAML, creating parent directories as needed.
pub fn save_config(config: &BizbotConfig, file: impl AsRef<Path>) -> Result<(), Box<dyn Error>> {
    let file = file.as_ref();
    if let Some(parent) = file.parent() {
        fs::create_dir_all(parent)?;
    }
    info!("Writing config file: {}", file.display());
    fs::write(file, serde_yaml::to_string(config)?)?;
    Ok(())
}

/// Opens the SQLite database and turns on foreign key enforcement.
pub fn establish_connection(db_url: &str) -> ConnectionResult<SqliteConnection> {
    let mut connection = SqliteConnection::establish(db_url)?;
    connection
        .batch_execute("PRAGMA foreign_keys = ON;")
        .map_err(ConnectionError::CouldntSetupConfiguration)?;
    Ok(connection)
}
