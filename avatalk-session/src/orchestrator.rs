//! Session orchestrator
//!
//! One actor task owns every piece of session state. Caller commands,
//! transport events and timer messages are consumed one at a time, so the
//! buffers need no locking. Callers talk to it through a cloneable
//! [`OrchestratorHandle`]; dropping the last handle tears the session down.

use crate::answer::AnswerService;
use crate::buffer::{ReplyBuffer, UtteranceBuffer};
use crate::credential::CredentialSource;
use crate::error::{Result, SessionError};
use crate::extract::ReplyExtractorChain;
use crate::microphone::{MicrophoneProbe, StaticMicrophone};
use crate::state::{EndReason, SessionEvent, SessionSnapshot, SessionState, SharedSessionState};
use crate::timer::InactivityTimer;
use crate::turn::{AnswerCycle, TurnQueue};
use avatalk_avatar::{AvatarConnector, AvatarTransport};
use avatalk_core::{
    AvatalkConfig, AvatarConfig, Credential, MediaHandle, SessionConfig, SessionRequest,
    TransportEvent,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const COMMAND_CHANNEL_CAPACITY: usize = 32;
const EVENT_BROADCAST_CAPACITY: usize = 256;

/// External collaborators of an orchestrator.
#[derive(Clone)]
pub struct SessionDeps {
    pub credentials: Arc<dyn CredentialSource>,
    pub connector: Arc<dyn AvatarConnector>,
    pub answers: Arc<dyn AnswerService>,
    pub microphone: Arc<dyn MicrophoneProbe>,
    pub extractors: Arc<ReplyExtractorChain>,
}

impl SessionDeps {
    pub fn new(
        credentials: Arc<dyn CredentialSource>,
        connector: Arc<dyn AvatarConnector>,
        answers: Arc<dyn AnswerService>,
    ) -> Self {
        Self {
            credentials,
            connector,
            answers,
            microphone: Arc::new(StaticMicrophone::granted()),
            extractors: Arc::new(ReplyExtractorChain::default()),
        }
    }

    pub fn with_microphone(mut self, microphone: Arc<dyn MicrophoneProbe>) -> Self {
        self.microphone = microphone;
        self
    }

    pub fn with_extractors(mut self, extractors: ReplyExtractorChain) -> Self {
        self.extractors = Arc::new(extractors);
        self
    }
}

enum Command {
    Start(oneshot::Sender<Result<()>>),
    End(oneshot::Sender<()>),
    SubmitText(String, oneshot::Sender<Result<()>>),
    Shutdown(oneshot::Sender<()>),
}

/// Messages the orchestrator schedules for itself, tagged with the session
/// generation they belong to.
enum Internal {
    InactivityExpired { generation: u64 },
    ClearReply { generation: u64, revision: u64 },
}

struct Session {
    id: Uuid,
    generation: u64,
    credential: Credential,
    avatar_id: String,
    language: String,
    media: Option<MediaHandle>,
    started_at: DateTime<Utc>,
    timer: Option<InactivityTimer>,
    transport: Arc<dyn AvatarTransport>,
    turns: TurnQueue,
}

pub struct SessionOrchestrator {
    avatar: AvatarConfig,
    settings: SessionConfig,
    deps: SessionDeps,
    state: SessionState,
    session: Option<Session>,
    generation: u64,
    utterance: UtteranceBuffer,
    reply: ReplyBuffer,
    transport_events: Option<mpsc::Receiver<TransportEvent>>,
    commands: mpsc::Receiver<Command>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
    events: broadcast::Sender<SessionEvent>,
    shared: SharedSessionState,
}

impl SessionOrchestrator {
    /// Spawn the orchestrator task. It runs until shut down or until every
    /// handle is dropped.
    pub fn spawn(config: &AvatalkConfig, deps: SessionDeps) -> (OrchestratorHandle, JoinHandle<()>) {
        let (command_tx, commands) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_BROADCAST_CAPACITY);
        let shared = SharedSessionState::default();
        let separator = config.session.utterance_separator.clone();

        let orchestrator = Self {
            avatar: config.avatar.clone(),
            settings: config.session.clone(),
            deps,
            state: SessionState::Idle,
            session: None,
            generation: 0,
            utterance: UtteranceBuffer::new(separator.clone()),
            reply: ReplyBuffer::new(separator),
            transport_events: None,
            commands,
            internal_tx,
            internal_rx,
            events: events.clone(),
            shared: shared.clone(),
        };

        let handle = OrchestratorHandle {
            commands: command_tx,
            events,
            shared,
        };
        (handle, tokio::spawn(orchestrator.run()))
    }

    async fn run(mut self) {
        debug!("Session orchestrator running");
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown(done)) => {
                        self.end(EndReason::ViewClosed).await;
                        let _ = done.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                    None => {
                        self.end(EndReason::ViewClosed).await;
                        break;
                    }
                },
                event = next_event(&mut self.transport_events) => {
                    self.handle_transport_event(event).await;
                }
                Some(message) = self.internal_rx.recv() => {
                    self.handle_internal(message).await;
                }
            }
        }
        debug!("Session orchestrator stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start(reply) => {
                let result = self.start().await;
                let _ = reply.send(result);
            }
            Command::End(reply) => {
                self.end(EndReason::Requested).await;
                let _ = reply.send(());
            }
            Command::SubmitText(text, reply) => {
                let _ = reply.send(self.submit_text(text));
            }
            Command::Shutdown(done) => {
                let _ = done.send(());
            }
        }
    }

    fn publish(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state == state {
            return;
        }
        debug!("Session state {:?} -> {:?}", self.state, state);
        self.state = state;
        self.shared.update(|s| s.state = state);
        self.publish(SessionEvent::StateChanged(state));
    }

    fn is_current(&self, generation: u64) -> bool {
        self.session
            .as_ref()
            .map(|s| s.generation == generation)
            .unwrap_or(false)
    }

    async fn start(&mut self) -> Result<()> {
        if self.state != SessionState::Idle {
            warn!("Start rejected: session is {:?}", self.state);
            return Err(SessionError::AlreadyActive);
        }
        self.set_state(SessionState::Starting);
        info!("Starting avatar session");

        match self.establish().await {
            Ok((session, events)) => {
                let session_id = session.id;
                let deadline = session.timer.as_ref().map(InactivityTimer::deadline);
                let snapshot = SessionSnapshot {
                    state: SessionState::Active,
                    session_id: Some(session.id),
                    avatar_id: Some(session.avatar_id.clone()),
                    language: Some(session.language.clone()),
                    media: session.media.clone(),
                    started_at: Some(session.started_at),
                    inactivity_deadline: deadline,
                    timer_armed: deadline.is_some(),
                    ..SessionSnapshot::default()
                };
                self.session = Some(session);
                self.transport_events = Some(events);
                self.shared.update(|s| *s = snapshot);
                self.set_state(SessionState::Active);
                info!("Avatar session {} active", session_id);
                self.publish(SessionEvent::Started { session_id });
                Ok(())
            }
            Err(e) => {
                error!("Failed to start avatar session: {}", e);
                self.set_state(SessionState::Idle);
                self.publish(SessionEvent::StartFailed {
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Run the start sequence. On error nothing is left open.
    async fn establish(&mut self) -> Result<(Session, mpsc::Receiver<TransportEvent>)> {
        match self.deps.microphone.request_access().await {
            Ok(()) => debug!("Microphone access granted"),
            Err(e) if self.settings.require_microphone => return Err(e),
            Err(e) => warn!("Continuing without microphone confirmation: {}", e),
        }

        let credential = match self.deps.credentials.fetch().await {
            Ok(credential) => credential,
            Err(e) => {
                warn!("Failed to fetch access token: {}", e);
                Credential::empty()
            }
        };

        let connection = self.deps.connector.connect(&credential).await?;
        let transport = connection.transport;
        let request = SessionRequest {
            quality: self.avatar.quality,
            avatar_name: self.avatar.avatar_id.clone(),
            language: self.avatar.language.clone(),
            knowledge_id: self.avatar.knowledge_id.clone(),
            knowledge_base: self.avatar.knowledge_base.clone(),
            voice: self.avatar.voice(),
            disable_idle_timeout: self.avatar.disable_idle_timeout,
        };

        let opened = async {
            let info = transport.create_session(&request).await?;
            transport.start_voice_chat(false).await?;
            Ok::<_, SessionError>(info)
        }
        .await;
        let info = match opened {
            Ok(info) => info,
            Err(e) => {
                if let Err(stop_err) = transport.stop_session().await {
                    debug!("Cleanup after failed start also failed: {}", stop_err);
                }
                return Err(e);
            }
        };
        debug!(
            "{} session {} created",
            transport.provider_name(),
            info.session_id
        );

        self.generation += 1;
        let generation = self.generation;
        let timeout = Duration::from_secs(self.settings.inactivity_timeout_secs);
        let internal = self.internal_tx.clone();
        let timer = InactivityTimer::arm(timeout, move || {
            let _ = internal.send(Internal::InactivityExpired { generation });
        });

        let turns = TurnQueue::spawn(
            AnswerCycle {
                answers: self.deps.answers.clone(),
                extractors: self.deps.extractors.clone(),
                transport: transport.clone(),
                no_answer_reply: self.settings.no_answer_reply.clone(),
                error_reply: self.settings.error_reply.clone(),
                events: self.events.clone(),
            },
            self.settings.turn_queue_capacity,
        );

        let session = Session {
            id: Uuid::new_v4(),
            generation,
            credential,
            avatar_id: self.avatar.avatar_id.clone(),
            language: self.avatar.language.clone(),
            media: None,
            started_at: Utc::now(),
            timer: Some(timer),
            transport,
            turns,
        };
        Ok((session, connection.events))
    }

    /// Tear down whatever is active. Safe to call in any state.
    async fn end(&mut self, reason: EndReason) {
        self.transport_events = None;
        self.utterance.clear();
        self.reply.clear();

        if let Some(session) = self.session.take() {
            let Session {
                id,
                credential,
                timer,
                transport,
                turns,
                ..
            } = session;
            if let Some(timer) = timer {
                timer.cancel();
            }
            drop(turns);
            if let Err(e) = transport.stop_session().await {
                warn!("Failed to stop avatar session (ignored): {}", e);
            }
            info!(
                "Avatar session {} ended ({:?}, token {})",
                id,
                reason,
                credential.redacted()
            );
            self.shared.update(|s| *s = SessionSnapshot::default());
            self.set_state(SessionState::Idle);
            self.publish(SessionEvent::Ended(reason));
        } else {
            debug!("End requested with no active session");
            self.shared.update(|s| {
                s.utterance.clear();
                s.reply.clear();
                s.media = None;
            });
        }
    }

    fn submit_text(&mut self, text: String) -> Result<()> {
        if self.session.is_none() {
            return Err(SessionError::NotActive);
        }
        let question = text.trim();
        if question.is_empty() {
            debug!("Ignoring blank text input");
            return Ok(());
        }
        self.enqueue_turn(question.to_string())
    }

    fn enqueue_turn(&self, question: String) -> Result<()> {
        let session = self.session.as_ref().ok_or(SessionError::NotActive)?;
        if session.turns.enqueue(question) {
            Ok(())
        } else {
            warn!("Turn queue full, dropping question");
            Err(SessionError::Channel("turn queue is full".to_string()))
        }
    }

    async fn handle_transport_event(&mut self, event: Option<TransportEvent>) {
        let Some(event) = event else {
            self.transport_events = None;
            if self.session.is_some() {
                warn!("Transport event feed closed");
                self.end(EndReason::Disconnected).await;
            }
            return;
        };
        debug!("Transport event: {}", event.name());

        match event {
            TransportEvent::StreamDisconnected => {
                info!("Avatar stream disconnected");
                self.end(EndReason::Disconnected).await;
            }
            TransportEvent::StreamReady { media } => {
                if let Some(session) = self.session.as_mut() {
                    session.media = Some(media.clone());
                }
                let stored = media.clone();
                self.shared.update(|s| s.media = Some(stored));
                self.publish(SessionEvent::StreamReady(media));
            }
            TransportEvent::UserStart => {
                self.utterance.begin_turn();
                self.shared.update(|s| {
                    s.user_talking = true;
                    s.utterance.clear();
                });
                self.publish(SessionEvent::UserTalking(true));
            }
            TransportEvent::UserStop => {
                self.utterance.end_turn();
                self.shared.update(|s| s.user_talking = false);
                self.publish(SessionEvent::UserTalking(false));
            }
            TransportEvent::UserTalkingMessage { message } => {
                self.utterance.push(&message);
                let text = self.utterance.text();
                self.shared.update(|s| s.utterance = text);
            }
            TransportEvent::UserEndMessage => {
                let text = self.utterance.flush();
                self.shared.update(|s| s.utterance.clear());
                let question = text.trim();
                if question.is_empty() {
                    debug!("Ignoring empty utterance");
                    return;
                }
                self.publish(SessionEvent::UserUtterance(question.to_string()));
                if let Err(e) = self.enqueue_turn(question.to_string()) {
                    warn!("Utterance not answered: {}", e);
                }
            }
            TransportEvent::AvatarStartTalking => {
                self.shared.update(|s| s.avatar_talking = true);
                self.publish(SessionEvent::AvatarTalking(true));
            }
            TransportEvent::AvatarStopTalking => {
                self.shared.update(|s| s.avatar_talking = false);
                self.publish(SessionEvent::AvatarTalking(false));
            }
            TransportEvent::AvatarTalkingMessage { message } => {
                self.reply.push(&message);
                let text = self.reply.text();
                self.shared.update(|s| s.reply = text.clone());
                self.publish(SessionEvent::AvatarReply(text));
            }
            TransportEvent::AvatarEndMessage => {
                self.publish(SessionEvent::AvatarReply(self.reply.text()));
                self.schedule_reply_clear();
            }
        }
    }

    fn schedule_reply_clear(&self) {
        let Some(generation) = self.session.as_ref().map(|s| s.generation) else {
            return;
        };
        let revision = self.reply.revision();
        let delay = Duration::from_millis(self.settings.reply_clear_delay_ms);
        let internal = self.internal_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = internal.send(Internal::ClearReply {
                generation,
                revision,
            });
        });
    }

    async fn handle_internal(&mut self, message: Internal) {
        match message {
            Internal::InactivityExpired { generation } => {
                if !self.is_current(generation) {
                    debug!("Ignoring stale inactivity timer");
                    return;
                }
                info!("Session inactive for too long, ending");
                self.end(EndReason::InactivityTimeout).await;
            }
            Internal::ClearReply {
                generation,
                revision,
            } => {
                if !self.is_current(generation) || self.reply.revision() != revision {
                    return;
                }
                self.reply.clear();
                self.shared.update(|s| s.reply.clear());
                self.publish(SessionEvent::ReplyCleared);
            }
        }
    }
}

async fn next_event(
    events: &mut Option<mpsc::Receiver<TransportEvent>>,
) -> Option<TransportEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Cloneable front of a running [`SessionOrchestrator`].
#[derive(Clone)]
pub struct OrchestratorHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<SessionEvent>,
    shared: SharedSessionState,
}

impl OrchestratorHandle {
    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SessionError::Channel("orchestrator stopped".to_string()))
    }

    /// Start a session. Failures come back as `Err` with the orchestrator
    /// already back in `Idle`.
    pub async fn start(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Start(tx)).await?;
        rx.await
            .map_err(|_| SessionError::Channel("start request dropped".to_string()))?
    }

    /// End the current session, if any.
    pub async fn end(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::End(tx)).await?;
        rx.await
            .map_err(|_| SessionError::Channel("end request dropped".to_string()))
    }

    /// Ask a typed question as if it had been spoken.
    pub async fn submit_text(&self, text: impl Into<String>) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::SubmitText(text.into(), tx)).await?;
        rx.await
            .map_err(|_| SessionError::Channel("text request dropped".to_string()))?
    }

    /// End any session and stop the orchestrator task.
    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Shutdown(tx)).await?;
        rx.await
            .map_err(|_| SessionError::Channel("shutdown request dropped".to_string()))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.snapshot()
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }
}
