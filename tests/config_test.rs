// Configuration files driving a whole session

use async_trait::async_trait;
use avatalk_avatar::{ScriptedConnector, TransportCall};
use avatalk_core::{AvatalkConfig, AvatarProviderType, ConfigError, SessionRequest};
use avatalk_session::{
    AnswerService, SessionDeps, SessionEvent, SessionOrchestrator, SessionState,
    StaticCredentialSource,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

struct FixedAnswer(&'static str);

#[async_trait]
impl AnswerService for FixedAnswer {
    async fn ask(&self, _question: &str) -> avatalk_session::Result<Value> {
        Ok(json!({ "answer": self.0 }))
    }
}

fn write_config(suffix: &str, content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[tokio::test]
async fn test_yaml_file_shapes_the_session_request() {
    let file = write_config(
        ".yaml",
        r#"
avatar:
  provider: scripted
  avatar_id: Wayne_20240711
  quality: high
  language: pt-BR
  knowledge_base: "You are a museum guide."
session:
  no_answer_reply: "No idea, sorry."
"#,
    );
    let config = AvatalkConfig::from_file(file.path()).unwrap();
    config.validate().unwrap();
    assert_eq!(config.avatar.provider, AvatarProviderType::Scripted);

    let (connector, controller) = ScriptedConnector::new();
    let deps = SessionDeps::new(
        Arc::new(StaticCredentialSource::new("tok")),
        Arc::new(connector),
        Arc::new(FixedAnswer("Follow me.")),
    );
    let (handle, _task) = SessionOrchestrator::spawn(&config, deps);
    handle.start().await.unwrap();

    let request = controller
        .calls()
        .into_iter()
        .find_map(|call| match call {
            TransportCall::CreateSession(request) => Some(request),
            _ => None,
        })
        .unwrap();
    assert_eq!(
        request,
        SessionRequest {
            quality: avatalk_core::AvatarQuality::High,
            avatar_name: "Wayne_20240711".to_string(),
            language: "pt-BR".to_string(),
            knowledge_id: None,
            knowledge_base: Some("You are a museum guide.".to_string()),
            voice: config.avatar.voice(),
            disable_idle_timeout: true,
        }
    );
}

#[tokio::test]
async fn test_toml_file_sets_timeout() {
    let file = write_config(
        ".toml",
        r#"
[session]
inactivity_timeout_secs = 1
reply_clear_delay_ms = 10
"#,
    );
    let config = AvatalkConfig::from_file(file.path()).unwrap();
    config.validate().unwrap();

    let (connector, _controller) = ScriptedConnector::new();
    let deps = SessionDeps::new(
        Arc::new(StaticCredentialSource::new("tok")),
        Arc::new(connector),
        Arc::new(FixedAnswer("ok")),
    );
    let (handle, _task) = SessionOrchestrator::spawn(&config, deps);
    let mut events = handle.subscribe();
    handle.start().await.unwrap();

    let ended = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if let Ok(SessionEvent::Ended(reason)) = events.recv().await {
                return reason;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(ended, avatalk_session::EndReason::InactivityTimeout);
    assert_eq!(handle.state(), SessionState::Idle);
}

#[test]
fn test_overrides_then_validation() {
    let file = write_config(".json", r#"{"answer": {"endpoint": "http://10.0.0.5/query"}}"#);
    let mut config = AvatalkConfig::from_file(file.path()).unwrap();

    let env: HashMap<&str, &str> = HashMap::from([
        ("ANSWER_ENDPOINT", "ftp://10.0.0.5/query"),
        ("INACTIVITY_TIMEOUT_SECS", "120"),
    ]);
    config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

    assert_eq!(config.session.inactivity_timeout_secs, 120);
    assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let result = AvatalkConfig::from_file(dir.path().join("absent.toml"));
    assert!(matches!(result, Err(ConfigError::Io(_))));
}
