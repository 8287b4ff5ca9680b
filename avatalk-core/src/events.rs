//! Events emitted by the avatar transport.
//!
//! The realtime feed delivers JSON frames tagged by `type`; the names below
//! are the vendor's event names.

use crate::types::MediaHandle;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportEvent {
    StreamReady { media: MediaHandle },
    StreamDisconnected,
    UserStart,
    UserStop,
    UserTalkingMessage { message: String },
    UserEndMessage,
    AvatarStartTalking,
    AvatarStopTalking,
    AvatarTalkingMessage { message: String },
    AvatarEndMessage,
}

impl TransportEvent {
    /// Decode one realtime frame. Unknown or malformed frames yield `None`.
    pub fn from_frame(frame: &str) -> Option<Self> {
        serde_json::from_str(frame).ok()
    }

    pub fn name(&self) -> &'static str {
        match self {
            TransportEvent::StreamReady { .. } => "stream_ready",
            TransportEvent::StreamDisconnected => "stream_disconnected",
            TransportEvent::UserStart => "user_start",
            TransportEvent::UserStop => "user_stop",
            TransportEvent::UserTalkingMessage { .. } => "user_talking_message",
            TransportEvent::UserEndMessage => "user_end_message",
            TransportEvent::AvatarStartTalking => "avatar_start_talking",
            TransportEvent::AvatarStopTalking => "avatar_stop_talking",
            TransportEvent::AvatarTalkingMessage { .. } => "avatar_talking_message",
            TransportEvent::AvatarEndMessage => "avatar_end_message",
        }
    }
}
