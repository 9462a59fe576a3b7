//! Configuration management for the helpdesk bot.
//!
//! The bot reads an optional JSON file at `~/.helpdesk-bot/config.json`
//! (or the path in `HELPDESK_CONFIG`), then applies environment overrides.
//! A `.env` file in the working directory is loaded into the environment first.
//!
//! # Configuration Priority
//!
//! 1. Environment variables
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `TELEGRAM_BOT_TOKEN` → telegram.bot_token
//! - `GIGACHAT_CREDENTIALS` → llm.credentials
//! - `GIGACHAT_SCOPE` → llm.scope
//! - `GIGACHAT_MODEL` → llm.model
//! - `GIGACHAT_VERIFY_SSL_CERTS` → llm.verify_tls
//! - `HELPDESK_TRANSCRIPT_DIR` → transcript.dir
//! - `HELPDESK_LOG_LEVEL` → observability.log_level
//! - `HELPDESK_LOG_FORMAT` → observability.log_format

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default system instruction placed at the head of every session.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a technical support bot. \
Your task is to help users solve their technical problems, \
give instructions and advice, and ask for clarification \
when there is not enough information.";

/// Default number of user/bot pairs replayed after the system instruction.
pub const DEFAULT_MAX_PAIRS: usize = 8;

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".helpdesk-bot"),
        |dirs| dirs.home_dir().join(".helpdesk-bot"),
    )
}

/// Get the configuration file path, honouring `HELPDESK_CONFIG`.
pub fn config_path() -> PathBuf {
    std::env::var("HELPDESK_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| config_dir().join("config.json"))
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Telegram transport settings
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// LLM provider settings
    #[serde(default)]
    pub llm: LlmConfig,

    /// Session and context window settings
    #[serde(default)]
    pub session: SessionConfig,

    /// Transcript output settings
    #[serde(default)]
    pub transcript: TranscriptConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// How this configuration was assembled. Loading runs before logging is
    /// set up, so callers log this once the subscriber is installed.
    #[serde(skip)]
    pub provenance: Provenance,
}

/// Sources and notices collected while loading configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Provenance {
    /// Config file that was read, if any
    pub file: Option<PathBuf>,
    /// `.env` file that was loaded, if any
    pub dotenv: Option<PathBuf>,
    /// Values that were present but ignored
    pub warnings: Vec<String>,
}

impl Provenance {
    /// Emit the collected information through `tracing`.
    pub fn log(&self) {
        match &self.file {
            Some(path) => tracing::info!(path = %path.display(), "Config file loaded"),
            None => tracing::info!("Config file not found, using defaults"),
        }
        if let Some(path) = &self.dotenv {
            tracing::debug!(path = %path.display(), "Environment loaded from .env");
        }
        for warning in &self.warnings {
            tracing::warn!("{warning}");
        }
    }
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        let mut config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;
        config.provenance.file = Some(path.to_path_buf());
        Ok(config)
    }

    /// Load `.env`, the config file, and environment overrides.
    pub fn load_with_env() -> Result<Self> {
        // A missing .env is normal in production
        let dotenv = dotenvy::dotenv().ok();

        let mut config = Self::load()?;
        config.provenance.dotenv = dotenv;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = Some(token);
        }

        if let Some(credentials) = lookup("GIGACHAT_CREDENTIALS") {
            self.llm.credentials = Some(credentials);
        }
        if let Some(scope) = lookup("GIGACHAT_SCOPE") {
            self.llm.scope = scope;
        }
        if let Some(model) = lookup("GIGACHAT_MODEL") {
            self.llm.model = model;
        }
        if let Some(verify) = lookup("GIGACHAT_VERIFY_SSL_CERTS") {
            match parse_bool(&verify) {
                Some(v) => self.llm.verify_tls = v,
                None => self.provenance.warnings.push(format!(
                    "Ignoring unrecognised GIGACHAT_VERIFY_SSL_CERTS value: {verify}"
                )),
            }
        }

        if let Some(dir) = lookup("HELPDESK_TRANSCRIPT_DIR") {
            self.transcript.dir = PathBuf::from(dir);
        }

        if let Some(level) = lookup("HELPDESK_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = lookup("HELPDESK_LOG_FORMAT") {
            self.observability.log_format = format;
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

// ============================================================================
// Telegram Configuration
// ============================================================================

/// Telegram Bot API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot token issued by @BotFather (required)
    #[serde(default)]
    pub bot_token: Option<String>,

    /// Usernames or numeric IDs allowed to talk to the bot ("*" = everyone)
    #[serde(default = "default_allowed_users")]
    pub allowed_users: Vec<String>,

    /// Long-poll timeout for getUpdates, in seconds
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,

    /// Bot API base URL
    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            allowed_users: default_allowed_users(),
            poll_timeout_secs: default_poll_timeout(),
            api_base: default_telegram_api_base(),
        }
    }
}

fn default_allowed_users() -> Vec<String> {
    vec!["*".into()]
}

fn default_poll_timeout() -> u64 {
    30
}

fn default_telegram_api_base() -> String {
    "https://api.telegram.org".into()
}

// ============================================================================
// LLM Configuration
// ============================================================================

/// GigaChat provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Authorization key used for the OAuth token exchange (required)
    #[serde(default)]
    pub credentials: Option<String>,

    /// OAuth scope
    #[serde(default = "default_scope")]
    pub scope: String,

    /// Model name
    #[serde(default = "default_model")]
    pub model: String,

    /// OAuth token endpoint
    #[serde(default = "default_auth_url")]
    pub auth_url: String,

    /// Chat API base URL (`/chat/completions` is appended)
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Verify TLS certificates. Disabling this is logged on start-up.
    #[serde(default = "default_true")]
    pub verify_tls: bool,

    /// Extra PEM root certificate to trust
    #[serde(default)]
    pub ca_cert_path: Option<PathBuf>,

    /// HTTP request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            credentials: None,
            scope: default_scope(),
            model: default_model(),
            auth_url: default_auth_url(),
            base_url: default_llm_base_url(),
            verify_tls: default_true(),
            ca_cert_path: None,
            timeout_secs: default_llm_timeout(),
        }
    }
}

fn default_scope() -> String {
    "GIGACHAT_API_PERS".into()
}

fn default_model() -> String {
    "GigaChat".into()
}

fn default_auth_url() -> String {
    "https://ngw.devices.sberbank.ru:9443/api/v2/oauth".into()
}

fn default_llm_base_url() -> String {
    "https://gigachat.devices.sberbank.ru/api/v1".into()
}

fn default_true() -> bool {
    true
}

fn default_llm_timeout() -> u64 {
    120
}

// ============================================================================
// Session Configuration
// ============================================================================

/// Role used when a model reply is replayed back to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReplyRole {
    /// Replies are replayed as assistant turns
    #[default]
    Assistant,
    /// Replies are replayed as system turns (legacy behaviour)
    System,
}

/// Session and context window settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// System instruction placed at the head of every session
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Number of user/bot pairs replayed to the model after the system prompt
    #[serde(default = "default_max_pairs")]
    pub max_pairs: usize,

    /// Role tag for replayed model replies
    #[serde(default)]
    pub reply_role: ReplyRole,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            max_pairs: default_max_pairs(),
            reply_role: ReplyRole::default(),
        }
    }
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.into()
}

fn default_max_pairs() -> usize {
    DEFAULT_MAX_PAIRS
}

// ============================================================================
// Transcript Configuration
// ============================================================================

/// Where transcripts are written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptConfig {
    /// Output directory (default: working directory)
    #[serde(default = "default_transcript_dir")]
    pub dir: PathBuf,
}

impl Default for TranscriptConfig {
    fn default() -> Self {
        Self {
            dir: default_transcript_dir(),
        }
    }
}

fn default_transcript_dir() -> PathBuf {
    PathBuf::from(".")
}

// ============================================================================
// Observability Configuration
// ============================================================================

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.telegram.bot_token.is_none());
        assert_eq!(config.telegram.allowed_users, vec!["*".to_string()]);
        assert_eq!(config.telegram.poll_timeout_secs, 30);
        assert!(config.llm.verify_tls);
        assert_eq!(config.llm.model, "GigaChat");
        assert_eq!(config.session.max_pairs, DEFAULT_MAX_PAIRS);
        assert_eq!(config.session.reply_role, ReplyRole::Assistant);
        assert_eq!(config.transcript.dir, PathBuf::from("."));
        assert_eq!(config.observability.log_level, "info");
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.session.system_prompt, DEFAULT_SYSTEM_PROMPT);
        assert_eq!(config.llm.scope, "GIGACHAT_API_PERS");
    }

    #[test]
    fn test_partial_json() {
        let json = r#"{
            "telegram": { "bot_token": "123:ABC", "allowed_users": ["alice"] },
            "session": { "max_pairs": 3, "reply_role": "system" },
            "observability": { "level": "debug", "format": "json" }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.telegram.bot_token.as_deref(), Some("123:ABC"));
        assert_eq!(config.telegram.allowed_users, vec!["alice".to_string()]);
        assert_eq!(config.session.max_pairs, 3);
        assert_eq!(config.session.reply_role, ReplyRole::System);
        assert_eq!(config.observability.log_level, "debug");
        assert_eq!(config.observability.log_format, "json");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides_from(lookup_from(&[
            ("TELEGRAM_BOT_TOKEN", "tg-token"),
            ("GIGACHAT_CREDENTIALS", "giga-key"),
            ("GIGACHAT_VERIFY_SSL_CERTS", "False"),
            ("HELPDESK_TRANSCRIPT_DIR", "/var/lib/helpdesk"),
            ("HELPDESK_LOG_LEVEL", "warn"),
        ]));

        assert_eq!(config.telegram.bot_token.as_deref(), Some("tg-token"));
        assert_eq!(config.llm.credentials.as_deref(), Some("giga-key"));
        assert!(!config.llm.verify_tls);
        assert_eq!(config.transcript.dir, PathBuf::from("/var/lib/helpdesk"));
        assert_eq!(config.observability.log_level, "warn");
    }

    #[test]
    fn test_unrecognised_bool_keeps_value() {
        let mut config = Config::default();
        config.apply_overrides_from(lookup_from(&[("GIGACHAT_VERIFY_SSL_CERTS", "maybe")]));
        assert!(config.llm.verify_tls);
        assert_eq!(config.provenance.warnings.len(), 1);
        assert!(config.provenance.warnings[0].contains("maybe"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "llm": { "credentials": "abc", "timeout_secs": 5 } }"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.llm.credentials.as_deref(), Some("abc"));
        assert_eq!(config.llm.timeout_secs, 5);
        assert_eq!(config.provenance.file.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_defaults_record_no_sources() {
        let config = Config::default();
        assert_eq!(config.provenance, Provenance::default());
        // Provenance is runtime metadata, never part of the file format
        let json = serde_json::to_value(&config).unwrap();
        assert!(json.get("provenance").is_none());
    }

    #[test]
    fn test_load_from_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "not json").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }
}
