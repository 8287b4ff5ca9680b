//! Tests for the in-process scripted provider

use avatalk_avatar::{AvatarConnector, AvatarError, FailurePoint, ScriptedConnector, TransportCall};
use avatalk_core::{Credential, SessionRequest, SpeakRequest, TransportEvent, VoiceSettings};
use tokio_test::{assert_err, assert_ok};

fn request() -> SessionRequest {
    SessionRequest {
        quality: Default::default(),
        avatar_name: "test-avatar".to_string(),
        language: "en".to_string(),
        knowledge_id: None,
        knowledge_base: None,
        voice: VoiceSettings::default(),
        disable_idle_timeout: true,
    }
}

#[tokio::test]
async fn test_records_calls_in_order() {
    let (connector, controller) = ScriptedConnector::new();
    let connection = connector.connect(&Credential::new("tok")).await.unwrap();

    connection.transport.create_session(&request()).await.unwrap();
    connection.transport.start_voice_chat(false).await.unwrap();
    connection
        .transport
        .speak(SpeakRequest::repeat_sync("Hello."))
        .await
        .unwrap();
    connection.transport.stop_session().await.unwrap();

    let calls = controller.calls();
    assert_eq!(
        calls[0],
        TransportCall::Connect {
            credential: "tok".to_string()
        }
    );
    assert_eq!(calls[1], TransportCall::CreateSession(request()));
    assert_eq!(calls[2], TransportCall::StartVoiceChat { muted: false });
    assert_eq!(calls[3], TransportCall::Speak(SpeakRequest::repeat_sync("Hello.")));
    assert_eq!(calls[4], TransportCall::StopSession);
    assert_eq!(controller.spoken(), vec!["Hello."]);
}

#[tokio::test]
async fn test_create_session_emits_stream_ready() {
    let (connector, _controller) = ScriptedConnector::new();
    let mut connection = connector.connect(&Credential::new("tok")).await.unwrap();

    let info = connection.transport.create_session(&request()).await.unwrap();
    match connection.events.recv().await {
        Some(TransportEvent::StreamReady { media }) => assert_eq!(media.session_id, info.session_id),
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_sync_speech_is_echoed() {
    let (connector, _controller) = ScriptedConnector::new();
    let mut connection = connector.connect(&Credential::new("tok")).await.unwrap();

    connection
        .transport
        .speak(SpeakRequest::repeat_sync("Hi there."))
        .await
        .unwrap();

    let mut seen = Vec::new();
    while let Ok(event) = connection.events.try_recv() {
        seen.push(event);
    }
    assert_eq!(
        seen,
        vec![
            TransportEvent::AvatarStartTalking,
            TransportEvent::AvatarTalkingMessage {
                message: "Hi there.".to_string()
            },
            TransportEvent::AvatarStopTalking,
            TransportEvent::AvatarEndMessage,
        ]
    );
}

#[tokio::test]
async fn test_failure_points() {
    let (connector, controller) = ScriptedConnector::new();
    controller.fail(FailurePoint::Connect);
    assert!(matches!(
        connector.connect(&Credential::new("tok")).await,
        Err(AvatarError::Provider(_))
    ));

    controller.recover(FailurePoint::Connect);
    assert!(matches!(
        connector.connect(&Credential::empty()).await,
        Err(AvatarError::Config(_))
    ));

    controller.fail(FailurePoint::CreateSession);
    let connection = assert_ok!(connector.connect(&Credential::new("tok")).await);
    assert_err!(connection.transport.create_session(&request()).await);
    assert_eq!(controller.count(FailurePoint::Connect), 3);
    assert_eq!(controller.count(FailurePoint::CreateSession), 1);
}

#[tokio::test]
async fn test_controller_drives_user_turn() {
    let (connector, controller) = ScriptedConnector::new();
    assert!(!controller.say("nobody listening").await);

    let mut connection = connector.connect(&Credential::new("tok")).await.unwrap();
    assert!(controller.is_connected());
    assert!(controller.say("hello  there").await);

    let mut seen = Vec::new();
    while let Ok(event) = connection.events.try_recv() {
        seen.push(event.name());
    }
    assert_eq!(
        seen,
        vec![
            "user_start",
            "user_talking_message",
            "user_talking_message",
            "user_stop",
            "user_end_message"
        ]
    );

    connection.transport.stop_session().await.unwrap();
    assert!(!controller.is_connected());
    assert!(!controller.emit(TransportEvent::UserStart).await);
}
