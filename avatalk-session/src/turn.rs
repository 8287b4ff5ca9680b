//! The answer cycle and the per-session queue that serializes it.

use crate::answer::AnswerService;
use crate::extract::ReplyExtractorChain;
use crate::segment::split_sentences;
use crate::state::{CycleOutcome, SessionEvent};
use avatalk_avatar::AvatarTransport;
use avatalk_core::SpeakRequest;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Question in, spoken reply out.
#[derive(Clone)]
pub struct AnswerCycle {
    pub answers: Arc<dyn AnswerService>,
    pub extractors: Arc<ReplyExtractorChain>,
    pub transport: Arc<dyn AvatarTransport>,
    pub no_answer_reply: String,
    pub error_reply: String,
    pub events: broadcast::Sender<SessionEvent>,
}

impl AnswerCycle {
    pub async fn run(&self, question: &str) -> CycleOutcome {
        let _ = self.events.send(SessionEvent::AnswerStarted {
            question: question.to_string(),
        });
        let outcome = self.answer(question).await;
        info!("Answer cycle finished: {:?}", outcome);
        let _ = self.events.send(SessionEvent::AnswerFinished(outcome));
        outcome
    }

    async fn answer(&self, question: &str) -> CycleOutcome {
        let response = match self.answers.ask(question).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Answer request failed: {}", e);
                self.apologize().await;
                return CycleOutcome::Failed;
            }
        };

        let (segments, outcome) = match self.extractors.extract(&response) {
            Some(reply) => {
                let segments = split_sentences(&reply);
                let count = segments.len();
                (segments, CycleOutcome::Answered { segments: count })
            }
            None => {
                info!("Answer response had no recognizable reply");
                (vec![self.no_answer_reply.clone()], CycleOutcome::NoAnswer)
            }
        };

        for segment in segments {
            debug!("Speaking segment ({} chars)", segment.len());
            if let Err(e) = self.transport.speak(SpeakRequest::repeat_sync(segment)).await {
                warn!("Speak failed: {}", e);
                self.apologize().await;
                return CycleOutcome::Failed;
            }
        }
        outcome
    }

    async fn apologize(&self) {
        let request = SpeakRequest::repeat_sync(self.error_reply.clone());
        if let Err(e) = self.transport.speak(request).await {
            warn!("Could not speak error reply: {}", e);
        }
    }
}

/// FIFO of questions drained by one worker, so cycles never overlap.
/// Dropping the queue aborts the worker and any cycle in flight.
pub(crate) struct TurnQueue {
    questions: mpsc::Sender<String>,
    worker: JoinHandle<()>,
}

impl TurnQueue {
    pub(crate) fn spawn(cycle: AnswerCycle, capacity: usize) -> Self {
        let (questions, mut rx) = mpsc::channel::<String>(capacity.max(1));
        let worker = tokio::spawn(async move {
            while let Some(question) = rx.recv().await {
                cycle.run(&question).await;
            }
        });
        Self { questions, worker }
    }

    /// False when the queue is full.
    pub(crate) fn enqueue(&self, question: String) -> bool {
        self.questions.try_send(question).is_ok()
    }
}

impl Drop for TurnQueue {
    fn drop(&mut self) {
        self.worker.abort();
    }
}
