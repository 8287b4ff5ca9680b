//! Error types for avatalk-avatar

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AvatarError {
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),
}
