// End-to-end conversation flows
//
// The vendor token API and the answer service are local axum fakes; the
// avatar itself is the in-process scripted provider.

use avatalk_avatar::{FailurePoint, ScriptedConnector, ScriptedController, TransportCall};
use avatalk_cli::token_server::{self, TokenServerState, TOKEN_PATH};
use avatalk_core::{AvatalkConfig, Credential, TokenServerConfig};
use avatalk_session::{
    CycleOutcome, EndReason, HttpAnswerService, HttpCredentialSource, OrchestratorHandle,
    SessionDeps, SessionEvent, SessionOrchestrator, SessionState,
};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Vendor token API fake; `None` answers 401.
async fn fake_vendor(token: Option<&'static str>) -> SocketAddr {
    let app = Router::new().route(
        "/v1/streaming.create_token",
        post(move || async move {
            match token {
                Some(token) => (StatusCode::OK, Json(json!({"data": {"token": token}}))),
                None => (StatusCode::UNAUTHORIZED, Json(json!({"error": "bad key"}))),
            }
        }),
    );
    serve(app).await
}

struct AnswerFake {
    addr: SocketAddr,
    queries: Arc<Mutex<Vec<Value>>>,
}

async fn fake_answers(reply: Value) -> AnswerFake {
    let queries = Arc::new(Mutex::new(Vec::new()));
    let seen = queries.clone();
    let app = Router::new().route(
        "/api/query",
        post(move |Json(body): Json<Value>| {
            let seen = seen.clone();
            let reply = reply.clone();
            async move {
                seen.lock().push(body);
                Json(reply)
            }
        }),
    );
    AnswerFake {
        addr: serve(app).await,
        queries,
    }
}

struct Conversation {
    handle: OrchestratorHandle,
    task: tokio::task::JoinHandle<()>,
    controller: ScriptedController,
    events: broadcast::Receiver<SessionEvent>,
}

/// Token server in front of the vendor fake, then the orchestrator on top.
async fn conversation(vendor: SocketAddr, answers: &AnswerFake) -> Conversation {
    let token_config = TokenServerConfig {
        upstream_base_url: format!("http://{}", vendor),
        ..TokenServerConfig::default()
    };
    let state = TokenServerState::new(&token_config, Credential::new("vendor-api-key")).unwrap();
    let token_addr = serve(token_server::router(state)).await;

    let mut config = AvatalkConfig::default();
    config.credential.endpoint = format!("http://{}{}", token_addr, TOKEN_PATH);
    config.answer.endpoint = format!("http://{}/api/query", answers.addr);
    config.session.reply_clear_delay_ms = 200;
    config.validate().unwrap();

    let (connector, controller) = ScriptedConnector::new();
    let deps = SessionDeps::new(
        Arc::new(HttpCredentialSource::new(&config.credential).unwrap()),
        Arc::new(connector),
        Arc::new(HttpAnswerService::new(&config.answer).unwrap()),
    );
    let (handle, task) = SessionOrchestrator::spawn(&config, deps);
    let events = handle.subscribe();
    Conversation {
        handle,
        task,
        controller,
        events,
    }
}

async fn wait_for<F>(events: &mut broadcast::Receiver<SessionEvent>, pred: F) -> SessionEvent
where
    F: Fn(&SessionEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event stream closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for session event")
}

#[tokio::test]
async fn test_spoken_question_is_answered_aloud() {
    let vendor = fake_vendor(Some("minted-token")).await;
    let answers = fake_answers(json!({"answers": [{"answer": "Hi there. How are you?"}]})).await;
    let mut c = conversation(vendor, &answers).await;

    c.handle.start().await.unwrap();
    assert_eq!(
        c.controller.calls().first(),
        Some(&TransportCall::Connect {
            credential: "minted-token".to_string()
        })
    );

    assert!(c.controller.say("what can you do").await);
    let finished = wait_for(&mut c.events, |e| matches!(e, SessionEvent::AnswerFinished(_))).await;

    assert_eq!(
        finished,
        SessionEvent::AnswerFinished(CycleOutcome::Answered { segments: 2 })
    );
    assert_eq!(
        answers.queries.lock().as_slice(),
        &[json!({"Query": "what can you do"})]
    );
    assert_eq!(c.controller.spoken(), vec!["Hi there.", "How are you?"]);

    wait_for(&mut c.events, |e| *e == SessionEvent::ReplyCleared).await;
    c.handle.end().await.unwrap();
    assert_eq!(c.handle.state(), SessionState::Idle);
    assert!(!c.controller.is_connected());
}

#[tokio::test]
async fn test_rejected_vendor_key_leaves_no_session() {
    let vendor = fake_vendor(None).await;
    let answers = fake_answers(json!({"answer": "unused"})).await;
    let mut c = conversation(vendor, &answers).await;

    assert!(c.handle.start().await.is_err());
    wait_for(&mut c.events, |e| matches!(e, SessionEvent::StartFailed { .. })).await;

    assert_eq!(c.handle.state(), SessionState::Idle);
    assert_eq!(
        c.controller.calls(),
        vec![TransportCall::Connect {
            credential: String::new()
        }]
    );
    assert!(answers.queries.lock().is_empty());
}

#[tokio::test]
async fn test_typed_question_without_reply_field() {
    let vendor = fake_vendor(Some("minted-token")).await;
    let answers = fake_answers(json!({"status": "no match"})).await;
    let mut c = conversation(vendor, &answers).await;

    c.handle.start().await.unwrap();
    c.handle.submit_text("anything").await.unwrap();
    let finished = wait_for(&mut c.events, |e| matches!(e, SessionEvent::AnswerFinished(_))).await;

    assert_eq!(finished, SessionEvent::AnswerFinished(CycleOutcome::NoAnswer));
    assert_eq!(
        c.controller.spoken(),
        vec![AvatalkConfig::default().session.no_answer_reply]
    );
}

#[tokio::test]
async fn test_vendor_disconnect_then_fresh_session() {
    let vendor = fake_vendor(Some("minted-token")).await;
    let answers = fake_answers(json!({"answer": "Sure."})).await;
    let mut c = conversation(vendor, &answers).await;

    c.handle.start().await.unwrap();
    wait_for(&mut c.events, |e| matches!(e, SessionEvent::StreamReady(_))).await;
    c.controller
        .emit(avatalk_core::TransportEvent::StreamDisconnected)
        .await;
    let ended = wait_for(&mut c.events, |e| matches!(e, SessionEvent::Ended(_))).await;
    assert_eq!(ended, SessionEvent::Ended(EndReason::Disconnected));

    c.handle.start().await.unwrap();
    assert_eq!(c.handle.state(), SessionState::Active);
    assert_eq!(c.controller.count(FailurePoint::Connect), 2);
    assert_eq!(c.controller.count(FailurePoint::StopSession), 1);
}

#[tokio::test]
async fn test_closing_the_view_stops_the_avatar() {
    let vendor = fake_vendor(Some("minted-token")).await;
    let answers = fake_answers(json!({"answer": "Sure."})).await;
    let c = conversation(vendor, &answers).await;

    c.handle.start().await.unwrap();
    assert!(c.controller.is_connected());

    let Conversation {
        handle,
        task,
        controller,
        ..
    } = c;
    drop(handle);
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("orchestrator should stop with the view")
        .unwrap();

    assert!(!controller.is_connected());
    assert_eq!(controller.count(FailurePoint::StopSession), 1);
}
