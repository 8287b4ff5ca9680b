//! Shared fakes for orchestrator tests

#![allow(dead_code)]

use async_trait::async_trait;
use avatalk_avatar::{ScriptedConnector, ScriptedController};
use avatalk_core::{AvatalkConfig, Credential};
use avatalk_session::{
    AnswerService, CredentialSource, MicrophoneProbe, OrchestratorHandle, SessionDeps,
    SessionError, SessionEvent, SessionOrchestrator,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

pub struct FakeCredentials {
    token: Option<String>,
    calls: AtomicUsize,
}

impl FakeCredentials {
    pub fn ok(token: &str) -> Arc<Self> {
        Arc::new(Self {
            token: Some(token.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            token: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialSource for FakeCredentials {
    async fn fetch(&self) -> avatalk_session::Result<Credential> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.token {
            Some(token) => Ok(Credential::new(token.clone())),
            None => Err(SessionError::Credential("connection refused".to_string())),
        }
    }
}

pub struct FakeAnswers {
    queued: Mutex<VecDeque<Result<Value, String>>>,
    default: Value,
    questions: Mutex<Vec<String>>,
}

impl FakeAnswers {
    pub fn always(response: Value) -> Arc<Self> {
        Arc::new(Self {
            queued: Mutex::new(VecDeque::new()),
            default: response,
            questions: Mutex::new(Vec::new()),
        })
    }

    pub fn replying(answer: &str) -> Arc<Self> {
        Self::always(json!({ "answer": answer }))
    }

    pub fn queue(&self, response: Result<Value, String>) {
        self.queued.lock().push_back(response);
    }

    pub fn questions(&self) -> Vec<String> {
        self.questions.lock().clone()
    }
}

#[async_trait]
impl AnswerService for FakeAnswers {
    async fn ask(&self, question: &str) -> avatalk_session::Result<Value> {
        self.questions.lock().push(question.to_string());
        let next = self.queued.lock().pop_front();
        match next {
            Some(Ok(value)) => Ok(value),
            Some(Err(message)) => Err(SessionError::Answer(message)),
            None => Ok(self.default.clone()),
        }
    }
}

pub struct Harness {
    pub handle: OrchestratorHandle,
    pub task: JoinHandle<()>,
    pub controller: ScriptedController,
    pub credentials: Arc<FakeCredentials>,
    pub answers: Arc<FakeAnswers>,
    pub events: broadcast::Receiver<SessionEvent>,
}

pub fn test_config() -> AvatalkConfig {
    let mut config = AvatalkConfig::default();
    config.avatar.avatar_id = "test-avatar".to_string();
    config.avatar.knowledge_id = Some("kb-1".to_string());
    config
}

pub fn harness(config: AvatalkConfig, credentials: Arc<FakeCredentials>, answers: Arc<FakeAnswers>) -> Harness {
    harness_with_microphone(config, credentials, answers, None)
}

pub fn harness_with_microphone(
    config: AvatalkConfig,
    credentials: Arc<FakeCredentials>,
    answers: Arc<FakeAnswers>,
    microphone: Option<Arc<dyn MicrophoneProbe>>,
) -> Harness {
    let (connector, controller) = ScriptedConnector::new();
    let mut deps = SessionDeps::new(credentials.clone(), Arc::new(connector), answers.clone());
    if let Some(microphone) = microphone {
        deps = deps.with_microphone(microphone);
    }
    let (handle, task) = SessionOrchestrator::spawn(&config, deps);
    let events = handle.subscribe();
    Harness {
        handle,
        task,
        controller,
        credentials,
        answers,
        events,
    }
}

pub fn default_harness() -> Harness {
    harness(
        test_config(),
        FakeCredentials::ok("tok-1"),
        FakeAnswers::replying("Hi there. How are you?"),
    )
}

/// Wait for the first event matching `matches`, skipping everything else.
pub async fn wait_for<F>(events: &mut broadcast::Receiver<SessionEvent>, matches: F) -> SessionEvent
where
    F: Fn(&SessionEvent) -> bool,
{
    let result = tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            match events.recv().await {
                Ok(event) if matches(&event) => return event,
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await;
    result.expect("timed out waiting for session event")
}

pub async fn wait_for_answer(events: &mut broadcast::Receiver<SessionEvent>) -> SessionEvent {
    wait_for(events, |e| matches!(e, SessionEvent::AnswerFinished(_))).await
}

/// Everything already published, without waiting.
pub fn drain(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    loop {
        match events.try_recv() {
            Ok(event) => seen.push(event),
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    seen
}
