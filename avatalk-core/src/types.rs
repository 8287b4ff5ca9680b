//! Request and session types exchanged with the avatar streaming service.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Short-lived access token minted by the credential endpoint.
///
/// An empty credential is a valid value: a failed fetch degrades to it and
/// the connection attempt that follows is expected to fail.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into().trim().to_string())
    }

    pub fn empty() -> Self {
        Self(String::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Log-safe rendering: a short prefix and the length.
    pub fn redacted(&self) -> String {
        if self.0.is_empty() {
            return "<empty>".to_string();
        }
        let prefix: String = self.0.chars().take(4).collect();
        format!("{}…({} chars)", prefix, self.0.chars().count())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Credential").field(&self.redacted()).finish()
    }
}

/// Stream rendering quality requested from the vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AvatarQuality {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VoiceEmotion {
    #[default]
    Excited,
    Serious,
    Friendly,
    Soothing,
    Broadcaster,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceSettings {
    pub rate: f32,
    pub emotion: VoiceEmotion,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            rate: 1.5,
            emotion: VoiceEmotion::Excited,
        }
    }
}

/// Parameters for creating a streaming avatar session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRequest {
    pub quality: AvatarQuality,
    pub avatar_name: String,
    pub language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub knowledge_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub knowledge_base: Option<String>,
    pub voice: VoiceSettings,
    pub disable_idle_timeout: bool,
}

/// What the vendor returns for a freshly created session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub url: String,
    pub access_token: String,
    #[serde(default)]
    pub realtime_endpoint: Option<String>,
}

impl SessionInfo {
    pub fn media_handle(&self) -> MediaHandle {
        MediaHandle {
            session_id: self.session_id.clone(),
            url: self.url.clone(),
            access_token: self.access_token.clone(),
        }
    }
}

/// Reference to the inbound audio/video stream of a connected session.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaHandle {
    pub session_id: String,
    pub url: String,
    pub access_token: String,
}

impl fmt::Debug for MediaHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaHandle")
            .field("session_id", &self.session_id)
            .field("url", &self.url)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// `Sync` tasks complete only once the avatar has finished speaking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskMode {
    Sync,
    Async,
}

/// `Repeat` speaks the text verbatim; `Talk` lets the vendor's own model answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Repeat,
    Talk,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakRequest {
    pub text: String,
    pub task_mode: TaskMode,
    pub task_type: TaskType,
}

impl SpeakRequest {
    /// Verbatim speech that blocks until the avatar is done.
    pub fn repeat_sync(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            task_mode: TaskMode::Sync,
            task_type: TaskType::Repeat,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_debug_is_redacted() {
        let credential = Credential::new("abcdefghijklmnop");
        let rendered = format!("{:?}", credential);
        assert!(!rendered.contains("abcdefghijklmnop"));
        assert!(rendered.contains("abcd"));
        assert!(rendered.contains("16 chars"));
    }

    #[test]
    fn test_credential_trims_whitespace() {
        let credential = Credential::new("  token\n");
        assert_eq!(credential.expose(), "token");
        assert!(Credential::new("   ").is_empty());
    }

    #[test]
    fn test_media_handle_debug_hides_token() {
        let handle = MediaHandle {
            session_id: "s1".to_string(),
            url: "wss://media.example".to_string(),
            access_token: "secret-room-token".to_string(),
        };
        assert!(!format!("{:?}", handle).contains("secret-room-token"));
    }

    #[test]
    fn test_session_request_wire_format() {
        let request = SessionRequest {
            quality: AvatarQuality::Medium,
            avatar_name: "Marianne_Chair_Sitting_public".to_string(),
            language: "en".to_string(),
            knowledge_id: None,
            knowledge_base: Some("facts".to_string()),
            voice: VoiceSettings::default(),
            disable_idle_timeout: true,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["quality"], "medium");
        assert_eq!(value["voice"]["emotion"], "excited");
        assert!(value.get("knowledge_id").is_none());
        assert_eq!(value["knowledge_base"], "facts");
    }

    #[test]
    fn test_repeat_sync_request() {
        let request = SpeakRequest::repeat_sync("Hello.");
        assert_eq!(request.task_mode, TaskMode::Sync);
        assert_eq!(request.task_type, TaskType::Repeat);
        assert_eq!(serde_json::to_value(&request).unwrap()["task_mode"], "sync");
    }
}
