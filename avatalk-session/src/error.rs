//! Error types for avatalk-session

use avatalk_avatar::AvatarError;
use avatalk_core::ConfigError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("A session is already active or starting")]
    AlreadyActive,

    #[error("No active session")]
    NotActive,

    #[error("Credential error: {0}")]
    Credential(String),

    #[error("Answer service error: {0}")]
    Answer(String),

    #[error("Microphone unavailable: {0}")]
    Microphone(String),

    #[error("Avatar error: {0}")]
    Avatar(#[from] AvatarError),

    #[error("Orchestrator unavailable: {0}")]
    Channel(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, SessionError>;
