use crate::error::AvatarError;
use async_trait::async_trait;
use avatalk_core::{Credential, SessionInfo, SessionRequest, SpeakRequest, TransportEvent};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Buffered transport events per connection.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Control surface of a connected avatar service.
#[async_trait]
pub trait AvatarTransport: Send + Sync {
    fn provider_name(&self) -> &'static str;

    /// Create and start the streaming session. `stream_ready` follows on the
    /// event feed once media is available.
    async fn create_session(&self, request: &SessionRequest) -> Result<SessionInfo, AvatarError>;

    async fn start_voice_chat(&self, muted: bool) -> Result<(), AvatarError>;

    /// Sync requests resolve only after the avatar finished speaking.
    async fn speak(&self, request: SpeakRequest) -> Result<(), AvatarError>;

    /// Idempotent; a transport without a session returns `Ok(())`.
    async fn stop_session(&self) -> Result<(), AvatarError>;
}

pub struct AvatarConnection {
    pub transport: Arc<dyn AvatarTransport>,
    pub events: mpsc::Receiver<TransportEvent>,
}

impl std::fmt::Debug for AvatarConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvatarConnection")
            .field("provider", &self.transport.provider_name())
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait AvatarConnector: Send + Sync {
    async fn connect(&self, credential: &Credential) -> Result<AvatarConnection, AvatarError>;
}
