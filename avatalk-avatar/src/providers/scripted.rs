//! In-process avatar provider.
//!
//! [`ScriptedConnector`] hands out transports that record every call and
//! never touch the network. The paired [`ScriptedController`] plays the
//! vendor's part: it injects events, inspects recorded calls and makes chosen
//! steps fail.

use crate::error::AvatarError;
use crate::transport::{AvatarConnection, AvatarConnector, AvatarTransport, EVENT_CHANNEL_CAPACITY};
use async_trait::async_trait;
use avatalk_core::{Credential, SessionInfo, SessionRequest, SpeakRequest, TaskMode, TransportEvent};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    Connect { credential: String },
    CreateSession(SessionRequest),
    StartVoiceChat { muted: bool },
    Speak(SpeakRequest),
    StopSession,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailurePoint {
    Connect,
    CreateSession,
    StartVoiceChat,
    Speak,
    StopSession,
}

struct ScriptState {
    calls: Vec<TransportCall>,
    failures: HashSet<FailurePoint>,
    events: Option<mpsc::Sender<TransportEvent>>,
    sessions_created: u64,
    echo_speech: bool,
    speak_delay: Duration,
}

impl Default for ScriptState {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            failures: HashSet::new(),
            events: None,
            sessions_created: 0,
            echo_speech: true,
            speak_delay: Duration::ZERO,
        }
    }
}

impl ScriptState {
    fn record(&mut self, call: TransportCall, point: FailurePoint) -> Result<(), AvatarError> {
        self.calls.push(call);
        if self.failures.contains(&point) {
            return Err(AvatarError::Provider(format!("scripted failure at {:?}", point)));
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct ScriptedConnector {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedConnector {
    pub fn new() -> (Self, ScriptedController) {
        let connector = Self::default();
        let controller = ScriptedController {
            state: connector.state.clone(),
        };
        (connector, controller)
    }
}

#[async_trait]
impl AvatarConnector for ScriptedConnector {
    async fn connect(&self, credential: &Credential) -> Result<AvatarConnection, AvatarError> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        {
            let mut state = self.state.lock();
            state.record(
                TransportCall::Connect {
                    credential: credential.expose().to_string(),
                },
                FailurePoint::Connect,
            )?;
            if credential.is_empty() {
                return Err(AvatarError::Config("Session token is empty".to_string()));
            }
            state.events = Some(tx.clone());
        }
        debug!("Scripted transport connected");

        Ok(AvatarConnection {
            transport: Arc::new(ScriptedTransport {
                state: self.state.clone(),
                events: tx,
            }),
            events: rx,
        })
    }
}

pub struct ScriptedTransport {
    state: Arc<Mutex<ScriptState>>,
    events: mpsc::Sender<TransportEvent>,
}

impl ScriptedTransport {
    async fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event).await;
    }
}

#[async_trait]
impl AvatarTransport for ScriptedTransport {
    fn provider_name(&self) -> &'static str {
        "scripted"
    }

    async fn create_session(&self, request: &SessionRequest) -> Result<SessionInfo, AvatarError> {
        let info = {
            let mut state = self.state.lock();
            state.record(
                TransportCall::CreateSession(request.clone()),
                FailurePoint::CreateSession,
            )?;
            state.sessions_created += 1;
            let n = state.sessions_created;
            SessionInfo {
                session_id: format!("scripted-{}", n),
                url: format!("scripted://media/{}", n),
                access_token: format!("scripted-room-{}", n),
                realtime_endpoint: None,
            }
        };
        self.emit(TransportEvent::StreamReady {
            media: info.media_handle(),
        })
        .await;
        Ok(info)
    }

    async fn start_voice_chat(&self, muted: bool) -> Result<(), AvatarError> {
        self.state
            .lock()
            .record(TransportCall::StartVoiceChat { muted }, FailurePoint::StartVoiceChat)
    }

    async fn speak(&self, request: SpeakRequest) -> Result<(), AvatarError> {
        let (delay, echo) = {
            let mut state = self.state.lock();
            state.record(TransportCall::Speak(request.clone()), FailurePoint::Speak)?;
            (state.speak_delay, state.echo_speech)
        };

        if echo && request.task_mode == TaskMode::Sync {
            self.emit(TransportEvent::AvatarStartTalking).await;
            self.emit(TransportEvent::AvatarTalkingMessage {
                message: request.text.clone(),
            })
            .await;
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if echo && request.task_mode == TaskMode::Sync {
            self.emit(TransportEvent::AvatarStopTalking).await;
            self.emit(TransportEvent::AvatarEndMessage).await;
        }
        Ok(())
    }

    async fn stop_session(&self) -> Result<(), AvatarError> {
        let mut state = self.state.lock();
        state.events = None;
        state.record(TransportCall::StopSession, FailurePoint::StopSession)
    }
}

/// Test and offline driver for [`ScriptedConnector`].
#[derive(Clone)]
pub struct ScriptedController {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedController {
    /// Make `point` fail until [`recover`](Self::recover) is called.
    pub fn fail(&self, point: FailurePoint) {
        self.state.lock().failures.insert(point);
    }

    pub fn recover(&self, point: FailurePoint) {
        self.state.lock().failures.remove(&point);
    }

    /// Echo sync speech back as avatar talking events (on by default).
    pub fn set_echo_speech(&self, echo: bool) {
        self.state.lock().echo_speech = echo;
    }

    /// How long each speak call takes.
    pub fn set_speak_delay(&self, delay: Duration) {
        self.state.lock().speak_delay = delay;
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn count(&self, point: FailurePoint) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| call_point(call) == point)
            .count()
    }

    /// Texts of every speak call, in call order.
    pub fn spoken(&self) -> Vec<String> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                TransportCall::Speak(request) => Some(request.text.clone()),
                _ => None,
            })
            .collect()
    }

    /// True while a connection is open and not yet stopped.
    pub fn is_connected(&self) -> bool {
        self.state
            .lock()
            .events
            .as_ref()
            .map(|tx| !tx.is_closed())
            .unwrap_or(false)
    }

    /// Deliver `event` to the current connection. Returns false when there
    /// is none.
    pub async fn emit(&self, event: TransportEvent) -> bool {
        let sender = self.state.lock().events.clone();
        match sender {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }

    /// Play one complete user turn: start, one fragment per word, stop, end.
    pub async fn say(&self, utterance: &str) -> bool {
        if !self.emit(TransportEvent::UserStart).await {
            return false;
        }
        for word in utterance.split_whitespace() {
            self.emit(TransportEvent::UserTalkingMessage {
                message: word.to_string(),
            })
            .await;
        }
        self.emit(TransportEvent::UserStop).await;
        self.emit(TransportEvent::UserEndMessage).await
    }
}

fn call_point(call: &TransportCall) -> FailurePoint {
    match call {
        TransportCall::Connect { .. } => FailurePoint::Connect,
        TransportCall::CreateSession(_) => FailurePoint::CreateSession,
        TransportCall::StartVoiceChat { .. } => FailurePoint::StartVoiceChat,
        TransportCall::Speak(_) => FailurePoint::Speak,
        TransportCall::StopSession => FailurePoint::StopSession,
    }
}
