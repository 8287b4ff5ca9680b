// Interactive conversation console
// Holds the orchestrator handle for as long as the user keeps it open

use anyhow::Result;
use avatalk_avatar::{AvatarConnector, HeyGenConnector, ScriptedConnector, ScriptedController};
use avatalk_core::{AvatalkConfig, AvatarProviderType};
use avatalk_session::{
    CredentialSource, HttpAnswerService, HttpCredentialSource, OrchestratorHandle, SessionDeps,
    SessionEvent, SessionOrchestrator, StaticCredentialSource,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::{info, warn};

const OFFLINE_TOKEN: &str = "offline-token";

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Start,
    End,
    Status,
    Help,
    Quit,
    Say(String),
}

impl ConsoleCommand {
    /// `None` for blank lines.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let command = match line {
            "/start" => Self::Start,
            "/end" => Self::End,
            "/status" => Self::Status,
            "/help" => Self::Help,
            "/quit" | "/exit" => Self::Quit,
            other => Self::Say(other.to_string()),
        };
        Some(command)
    }
}

/// One line of console output per event.
pub fn format_event(event: &SessionEvent) -> String {
    match event {
        SessionEvent::StateChanged(state) => format!("[state] {:?}", state),
        SessionEvent::Started { session_id } => format!("[session] started {}", session_id),
        SessionEvent::StartFailed { error } => format!("[session] start failed: {}", error),
        SessionEvent::StreamReady(media) => format!("[stream] ready ({})", media.session_id),
        SessionEvent::UserTalking(true) => "[you] ...".to_string(),
        SessionEvent::UserTalking(false) => "[you] (stopped talking)".to_string(),
        SessionEvent::UserUtterance(text) => format!("[you] {}", text),
        SessionEvent::AvatarTalking(true) => "[avatar] ...".to_string(),
        SessionEvent::AvatarTalking(false) => "[avatar] (stopped talking)".to_string(),
        SessionEvent::AvatarReply(text) => format!("[avatar] {}", text),
        SessionEvent::ReplyCleared => "[avatar] (reply cleared)".to_string(),
        SessionEvent::AnswerStarted { question } => format!("[answer] asking: {}", question),
        SessionEvent::AnswerFinished(outcome) => format!("[answer] {:?}", outcome),
        SessionEvent::Ended(reason) => format!("[session] ended ({:?})", reason),
    }
}

pub struct Console {
    handle: OrchestratorHandle,
    task: tokio::task::JoinHandle<()>,
    /// Present in offline mode; typed lines are spoken through it.
    controller: Option<ScriptedController>,
}

impl Console {
    /// Wire the orchestrator. Offline mode, or the scripted provider in the
    /// config, replaces the vendor with the in-process transport.
    pub fn new(config: &AvatalkConfig, offline: bool) -> Result<Self> {
        let answers = Arc::new(HttpAnswerService::new(&config.answer)?);
        let offline = offline || config.avatar.provider == AvatarProviderType::Scripted;

        let (credentials, connector, controller): (
            Arc<dyn CredentialSource>,
            Arc<dyn AvatarConnector>,
            Option<ScriptedController>,
        ) = if offline {
            let (connector, controller) = ScriptedConnector::new();
            (
                Arc::new(StaticCredentialSource::new(OFFLINE_TOKEN)),
                Arc::new(connector),
                Some(controller),
            )
        } else {
            (
                Arc::new(HttpCredentialSource::new(&config.credential)?),
                Arc::new(HeyGenConnector::new(&config.avatar)?),
                None,
            )
        };

        let deps = SessionDeps::new(credentials, connector, answers);
        let (handle, task) = SessionOrchestrator::spawn(config, deps);
        Ok(Self {
            handle,
            task,
            controller,
        })
    }

    pub fn handle(&self) -> &OrchestratorHandle {
        &self.handle
    }

    /// Start a session, then read commands from stdin until `/quit`, EOF or
    /// Ctrl-C. The session ends with the console.
    pub async fn run(self) -> Result<()> {
        let printer = tokio::spawn(print_events(self.handle.subscribe()));
        print_help(self.controller.is_some());

        if let Err(e) = self.handle.start().await {
            println!("Could not start a session: {}. Type /start to retry.", e);
        }

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted");
                    None
                }
            };
            let Some(line) = line else { break };
            let Some(command) = ConsoleCommand::parse(&line) else {
                continue;
            };
            if command == ConsoleCommand::Quit {
                break;
            }
            if let Err(e) = self.execute(command).await {
                println!("Error: {}", e);
            }
        }

        self.close().await;
        printer.abort();
        Ok(())
    }

    pub async fn execute(&self, command: ConsoleCommand) -> Result<()> {
        match command {
            ConsoleCommand::Start => self.handle.start().await?,
            ConsoleCommand::End => self.handle.end().await?,
            ConsoleCommand::Status => {
                println!("{}", serde_json::to_string_pretty(&self.handle.snapshot())?);
            }
            ConsoleCommand::Help => print_help(self.controller.is_some()),
            ConsoleCommand::Say(text) => match &self.controller {
                Some(controller) => {
                    if !controller.say(&text).await {
                        println!("No active session. Type /start first.");
                    }
                }
                None => self.handle.submit_text(text).await?,
            },
            ConsoleCommand::Quit => {}
        }
        Ok(())
    }

    /// Tear the view down: the orchestrator ends any live session and stops.
    pub async fn close(self) {
        if let Err(e) = self.handle.shutdown().await {
            warn!("Orchestrator already stopped: {}", e);
        }
        drop(self.handle);
        if let Err(e) = self.task.await {
            warn!("Orchestrator task failed: {}", e);
        }
    }
}

async fn print_events(mut events: broadcast::Receiver<SessionEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => println!("{}", format_event(&event)),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Console skipped {} events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn print_help(offline: bool) {
    println!("Commands: /start, /end, /status, /help, /quit");
    if offline {
        println!("Offline mode: each line is spoken to the avatar as your voice.");
    } else {
        println!("Each line is sent as a typed question; speak into the avatar page to talk.");
    }
}
