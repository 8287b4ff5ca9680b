//! Observable session state.

use avatalk_core::MediaHandle;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    #[default]
    Idle,
    Starting,
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Requested,
    Disconnected,
    InactivityTimeout,
    ViewClosed,
}

/// How one answer cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    Answered { segments: usize },
    NoAnswer,
    Failed,
}

/// Published to every subscriber of an orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged(SessionState),
    Started { session_id: Uuid },
    StartFailed { error: String },
    StreamReady(MediaHandle),
    UserTalking(bool),
    UserUtterance(String),
    AvatarTalking(bool),
    AvatarReply(String),
    ReplyCleared,
    AnswerStarted { question: String },
    AnswerFinished(CycleOutcome),
    Ended(EndReason),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub session_id: Option<Uuid>,
    pub avatar_id: Option<String>,
    pub language: Option<String>,
    #[serde(skip)]
    pub media: Option<MediaHandle>,
    pub started_at: Option<DateTime<Utc>>,
    pub inactivity_deadline: Option<DateTime<Utc>>,
    pub timer_armed: bool,
    pub user_talking: bool,
    pub avatar_talking: bool,
    pub utterance: String,
    pub reply: String,
}

/// Read side shared with handles; only the orchestrator writes.
#[derive(Clone, Default)]
pub struct SharedSessionState {
    inner: Arc<RwLock<SessionSnapshot>>,
}

impl SharedSessionState {
    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.read().clone()
    }

    pub fn state(&self) -> SessionState {
        self.inner.read().state
    }

    pub(crate) fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut SessionSnapshot),
    {
        f(&mut self.inner.write());
    }
}
