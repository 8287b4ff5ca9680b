//! Configuration for avatalk.
//!
//! Every section carries `#[serde(default)]`, so a config file only needs the
//! keys it overrides. Files may be JSON, TOML or YAML.

use crate::error::ConfigError;
use crate::types::{AvatarQuality, VoiceEmotion, VoiceSettings};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Prefix for environment overrides (`AVATALK_ANSWER_ENDPOINT`, ...).
pub const ENV_PREFIX: &str = "AVATALK_";

/// Upper bound for `session.inactivity_timeout_secs` (24 hours).
pub const MAX_INACTIVITY_TIMEOUT_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AvatalkConfig {
    pub credential: CredentialConfig,
    pub answer: AnswerConfig,
    pub avatar: AvatarConfig,
    pub session: SessionConfig,
    pub token_server: TokenServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialConfig {
    /// Local endpoint answering an empty POST with a plain-text token.
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:3000/api/get-access-token".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnswerConfig {
    /// Question-answering endpoint receiving `{"Query": ...}`.
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:3000/api/query".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AvatarProviderType {
    #[default]
    HeyGen,
    /// In-process transport driven by a controller; no network.
    Scripted,
}

impl FromStr for AvatarProviderType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "heygen" => Ok(AvatarProviderType::HeyGen),
            "scripted" => Ok(AvatarProviderType::Scripted),
            other => Err(ConfigError::Parse(format!("unknown avatar provider '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AvatarConfig {
    pub provider: AvatarProviderType,
    pub base_url: String,
    pub avatar_id: String,
    pub quality: AvatarQuality,
    pub language: String,
    pub knowledge_id: Option<String>,
    pub knowledge_base: Option<String>,
    pub voice_rate: f32,
    pub voice_emotion: VoiceEmotion,
    pub disable_idle_timeout: bool,
    /// Upper bound on waiting for a sync speak task to finish.
    pub speak_timeout_secs: u64,
    pub request_timeout_secs: u64,
    /// Permit plain `http://` and `ws://` endpoints (local fakes only).
    pub allow_insecure: bool,
}

impl Default for AvatarConfig {
    fn default() -> Self {
        Self {
            provider: AvatarProviderType::HeyGen,
            base_url: "https://api.heygen.com".to_string(),
            avatar_id: "Marianne_Chair_Sitting_public".to_string(),
            quality: AvatarQuality::Medium,
            language: "en".to_string(),
            knowledge_id: None,
            knowledge_base: None,
            voice_rate: 1.5,
            voice_emotion: VoiceEmotion::Excited,
            disable_idle_timeout: true,
            speak_timeout_secs: 60,
            request_timeout_secs: 30,
            allow_insecure: false,
        }
    }
}

impl AvatarConfig {
    pub fn voice(&self) -> VoiceSettings {
        VoiceSettings {
            rate: self.voice_rate,
            emotion: self.voice_emotion,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub inactivity_timeout_secs: u64,
    pub reply_clear_delay_ms: u64,
    pub utterance_separator: String,
    pub turn_queue_capacity: usize,
    /// Abort start when the host denies microphone access.
    pub require_microphone: bool,
    /// Spoken when the answer response has no recognizable reply.
    pub no_answer_reply: String,
    /// Spoken once when an answer cycle fails.
    pub error_reply: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout_secs: 600,
            reply_clear_delay_ms: 1000,
            utterance_separator: " ".to_string(),
            turn_queue_capacity: 8,
            require_microphone: false,
            no_answer_reply: "I'm sorry, I don't have an answer for that.".to_string(),
            error_reply: "Sorry, something went wrong. Please try again.".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenServerConfig {
    pub bind: String,
    /// Name of the environment variable holding the vendor API key.
    pub api_key_env: String,
    pub upstream_base_url: String,
}

impl Default for TokenServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3000".to_string(),
            api_key_env: "HEYGEN_API_KEY".to_string(),
            upstream_base_url: "https://api.heygen.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl FromStr for AvatalkConfig {
    type Err = ConfigError;

    /// Accepts JSON, TOML or YAML, tried in that order.
    fn from_str(content: &str) -> Result<Self, Self::Err> {
        let json_err = match serde_json::from_str::<AvatalkConfig>(content) {
            Ok(config) => return Ok(config),
            Err(e) => e,
        };
        let toml_err = match toml::from_str::<AvatalkConfig>(content) {
            Ok(config) => return Ok(config),
            Err(e) => e,
        };
        match serde_yaml::from_str::<AvatalkConfig>(content) {
            Ok(config) => Ok(config),
            Err(yaml_err) => Err(ConfigError::Parse(format!(
                "not valid JSON ({}), TOML ({}) or YAML ({})",
                json_err,
                toml_err,
                yaml_err
            ))),
        }
    }
}

impl AvatalkConfig {
    /// Load configuration from a file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        content.parse()
    }

    /// Defaults with `AVATALK_*` environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(format!("{}{}", ENV_PREFIX, key)).ok());
    }

    /// Apply overrides from `lookup`, keyed without the `AVATALK_` prefix.
    /// Unparseable numeric values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("CREDENTIAL_ENDPOINT") {
            self.credential.endpoint = v;
        }
        if let Some(v) = lookup("ANSWER_ENDPOINT") {
            self.answer.endpoint = v;
        }
        if let Some(v) = lookup("AVATAR_PROVIDER").and_then(|v| v.parse().ok()) {
            self.avatar.provider = v;
        }
        if let Some(v) = lookup("AVATAR_BASE_URL") {
            self.avatar.base_url = v;
        }
        if let Some(v) = lookup("AVATAR_ID") {
            self.avatar.avatar_id = v;
        }
        if let Some(v) = lookup("LANGUAGE") {
            self.avatar.language = v;
        }
        if let Some(v) = lookup("KNOWLEDGE_ID") {
            self.avatar.knowledge_id = Some(v).filter(|v| !v.is_empty());
        }
        if let Some(v) = lookup("INACTIVITY_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.session.inactivity_timeout_secs = v;
        }
        if let Some(v) = lookup("REQUIRE_MICROPHONE").and_then(|v| v.parse().ok()) {
            self.session.require_microphone = v;
        }
        if let Some(v) = lookup("TOKEN_SERVER_BIND") {
            self.token_server.bind = v;
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = lookup("LOG_JSON").and_then(|v| v.parse().ok()) {
            self.logging.json = v;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_http_url("credential.endpoint", &self.credential.endpoint)?;
        validate_http_url("answer.endpoint", &self.answer.endpoint)?;
        if self.credential.timeout_secs == 0 || self.answer.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "request timeouts must be > 0".to_string(),
            ));
        }

        let avatar = &self.avatar;
        validate_http_url("avatar.base_url", &avatar.base_url)?;
        if !avatar.allow_insecure && !avatar.base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "avatar.base_url must use HTTPS (set avatar.allow_insecure for local endpoints)"
                    .to_string(),
            ));
        }
        if avatar.avatar_id.trim().is_empty() || avatar.avatar_id.len() > 256 {
            return Err(ConfigError::Validation(
                "avatar.avatar_id must be 1-256 characters".to_string(),
            ));
        }
        if !is_language_code(&avatar.language) {
            return Err(ConfigError::Validation(format!(
                "avatar.language '{}' is not a language code",
                avatar.language
            )));
        }
        if !(0.5..=1.5).contains(&avatar.voice_rate) {
            return Err(ConfigError::Validation(
                "avatar.voice_rate must be between 0.5 and 1.5".to_string(),
            ));
        }
        if avatar.speak_timeout_secs == 0 || avatar.request_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "avatar timeouts must be > 0".to_string(),
            ));
        }

        let session = &self.session;
        if session.inactivity_timeout_secs == 0
            || session.inactivity_timeout_secs > MAX_INACTIVITY_TIMEOUT_SECS
        {
            return Err(ConfigError::Validation(format!(
                "session.inactivity_timeout_secs must be between 1 and {}",
                MAX_INACTIVITY_TIMEOUT_SECS
            )));
        }
        if session.turn_queue_capacity == 0 {
            return Err(ConfigError::Validation(
                "session.turn_queue_capacity must be > 0".to_string(),
            ));
        }
        if session.no_answer_reply.trim().is_empty() || session.error_reply.trim().is_empty() {
            return Err(ConfigError::Validation(
                "fallback replies cannot be empty".to_string(),
            ));
        }

        if self.token_server.api_key_env.trim().is_empty() {
            return Err(ConfigError::Validation(
                "token_server.api_key_env cannot be empty".to_string(),
            ));
        }
        validate_http_url("token_server.upstream_base_url", &self.token_server.upstream_base_url)?;

        Ok(())
    }
}

fn validate_http_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let url = url::Url::parse(value)
        .map_err(|e| ConfigError::Validation(format!("{} is not a valid URL: {}", field, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::Validation(format!(
            "{} must be http(s), got '{}'",
            field, other
        ))),
    }
}

/// `en`, `zh`, `pt-BR` and the like.
fn is_language_code(code: &str) -> bool {
    !code.is_empty()
        && code.len() <= 16
        && code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        && !code.starts_with('-')
}
