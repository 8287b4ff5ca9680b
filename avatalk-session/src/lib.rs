//! Avatar conversation sessions.
//!
//! [`SessionOrchestrator`] runs the lifecycle of one conversation: it
//! fetches a credential, connects the avatar transport, buffers user turns,
//! sends finished utterances to the answer service and speaks the replies
//! back sentence by sentence.

pub mod answer;
pub mod buffer;
pub mod credential;
pub mod error;
pub mod extract;
pub mod microphone;
pub mod orchestrator;
pub mod segment;
pub mod state;
pub mod timer;
pub mod turn;

pub use answer::{AnswerService, HttpAnswerService};
pub use buffer::{ReplyBuffer, UtteranceBuffer};
pub use credential::{CredentialSource, HttpCredentialSource, StaticCredentialSource};
pub use error::{Result, SessionError};
pub use extract::{
    ArrayFieldExtractor, NestedFieldExtractor, ReplyExtractor, ReplyExtractorChain,
    TopLevelFieldExtractor,
};
pub use microphone::{MicrophoneProbe, StaticMicrophone};
pub use orchestrator::{OrchestratorHandle, SessionDeps, SessionOrchestrator};
pub use segment::split_sentences;
pub use state::{CycleOutcome, EndReason, SessionEvent, SessionSnapshot, SessionState};
pub use timer::InactivityTimer;
pub use turn::AnswerCycle;
