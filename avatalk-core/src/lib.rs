//! Shared types for avatalk: the avatar wire vocabulary, transport events
//! and configuration.

pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::{
    AnswerConfig, AvatalkConfig, AvatarConfig, AvatarProviderType, CredentialConfig,
    LoggingConfig, SessionConfig, TokenServerConfig,
};
pub use error::{ConfigError, Result};
pub use events::TransportEvent;
pub use types::{
    AvatarQuality, Credential, MediaHandle, SessionInfo, SessionRequest, SpeakRequest, TaskMode,
    TaskType, VoiceEmotion, VoiceSettings,
};
