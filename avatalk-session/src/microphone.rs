//! Microphone access check made before a session starts.

use crate::error::{Result, SessionError};
use async_trait::async_trait;

/// Host-side microphone capability check, made before a session starts.
#[async_trait]
pub trait MicrophoneProbe: Send + Sync {
    async fn request_access(&self) -> Result<()>;
}

/// Fixed answer. Audio capture itself belongs to whatever client joins the
/// media room, so headless hosts have nothing to ask.
pub struct StaticMicrophone {
    granted: bool,
}

impl StaticMicrophone {
    pub fn granted() -> Self {
        Self { granted: true }
    }

    pub fn denied() -> Self {
        Self { granted: false }
    }
}

#[async_trait]
impl MicrophoneProbe for StaticMicrophone {
    async fn request_access(&self) -> Result<()> {
        if self.granted {
            Ok(())
        } else {
            Err(SessionError::Microphone("access denied by host".to_string()))
        }
    }
}
