//! Interactive chat session
//!
//! Owns the current thread and assistant, turns user lines into runs, and
//! applies the `SessionCommand`s that tools queue during a run.

mod command;
mod ui;

pub use command::{ChatCommand, SessionCommand};
#[cfg(test)]
pub use ui::ScriptedUi;
pub use ui::{TerminalUi, UserInterface};

use crate::backend::{Backend, MessageRole, TransportError};
use crate::runtime::{RunError, RunExecutor, RunRequest, RuntimeConfig};
use crate::state_machine::{RunOutcome, SeenMessageSet, TimeoutReason};
use crate::store::{LabelStore, StoreError};
use crate::tools::ToolRegistry;
use std::io;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

const CONTROLS: &str = "[Q] quit | [swapT] thread | [swapA] assistant | [tool] enable tools";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("terminal: {0}")]
    Io(#[from] io::Error),
    #[error("no assistants are available to this API key")]
    NoAssistants,
}

/// Whether the user kept the session open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

pub struct ChatSession<B: Backend + 'static, U: UserInterface> {
    backend: Arc<B>,
    executor: RunExecutor<B>,
    labels: LabelStore,
    ui: U,
    seen: SeenMessageSet,
    thread_id: String,
    assistant_id: String,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
}

impl<B: Backend + 'static, U: UserInterface> ChatSession<B, U> {
    pub fn new(
        backend: Arc<B>,
        registry: Arc<ToolRegistry>,
        config: RuntimeConfig,
        labels: LabelStore,
        ui: U,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let executor = RunExecutor::new(backend.clone(), registry, config, tx);
        Self {
            backend,
            executor,
            labels,
            ui,
            seen: SeenMessageSet::new(),
            thread_id: String::new(),
            assistant_id: String::new(),
            commands: rx,
        }
    }

    /// Select an assistant and a thread, then chat until the user quits
    pub async fn run(&mut self) -> Result<(), SessionError> {
        if self.select_assistant().await? == Flow::Quit {
            return Ok(());
        }
        if self.select_thread().await? == Flow::Quit {
            return Ok(());
        }

        loop {
            self.drain_commands();
            self.ui.say(CONTROLS);
            let Some(line) = self.ui.read_line("you: ")? else {
                break;
            };
            let Some(command) = ChatCommand::parse(&line) else {
                continue;
            };

            let flow = match command {
                ChatCommand::Quit => Flow::Quit,
                ChatCommand::SwapThread => {
                    let result = self.select_thread().await;
                    self.recover(result)?
                }
                ChatCommand::SwapAssistant => {
                    let result = self.select_assistant().await;
                    self.recover(result)?
                }
                ChatCommand::Tools => {
                    let result = self.enable_tools().await;
                    self.recover(result)?
                }
                ChatCommand::Message(text) => {
                    self.turn(&text).await;
                    Flow::Continue
                }
            };
            if flow == Flow::Quit {
                break;
            }
        }

        tracing::info!(thread_id = %self.thread_id, "Chat session ended");
        Ok(())
    }

    /// Report a failed control command and stay at the prompt.
    ///
    /// Terminal errors still end the session.
    fn recover(&mut self, result: Result<Flow, SessionError>) -> Result<Flow, SessionError> {
        match result {
            Ok(flow) => Ok(flow),
            Err(SessionError::Io(e)) => Err(SessionError::Io(e)),
            Err(e) => {
                tracing::warn!(thread_id = %self.thread_id, error = %e, "Command failed");
                self.ui.say(&format!("error: {e}"));
                Ok(Flow::Continue)
            }
        }
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            self.apply(command);
        }
    }

    fn apply(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::ChangeAssistant { assistant_id } => {
                tracing::info!(from = %self.assistant_id, to = %assistant_id, "Assistant changed by tool");
                self.ui.say(&format!("(switched to assistant {assistant_id})"));
                self.assistant_id = assistant_id;
            }
        }
    }

    // ========================================================================
    // Selection
    // ========================================================================

    async fn select_assistant(&mut self) -> Result<Flow, SessionError> {
        let assistants = self.backend.list_assistants().await?;
        if assistants.is_empty() {
            return Err(SessionError::NoAssistants);
        }
        let names: Vec<String> = assistants
            .iter()
            .map(|a| format!("{} ({})", a.label(), a.model))
            .collect();

        let Some(idx) = self.ui.choose("Select an assistant:", &names)? else {
            return Ok(Flow::Quit);
        };
        self.assistant_id.clone_from(&assistants[idx].id);
        self.ui
            .say(&format!("Using assistant {}", assistants[idx].label()));
        Ok(Flow::Continue)
    }

    async fn select_thread(&mut self) -> Result<Flow, SessionError> {
        loop {
            let mut options = vec![
                "Thread label (new or existing)".to_string(),
                "Thread id".to_string(),
            ];
            let saved = self.labels.labels();
            if !saved.is_empty() {
                options.push("Saved labels".to_string());
            }

            let Some(choice) = self.ui.choose("Select a thread:", &options)? else {
                return Ok(Flow::Quit);
            };
            let thread_id = match choice {
                0 => {
                    let Some(label) = self.ui.read_line("label: ")? else {
                        return Ok(Flow::Quit);
                    };
                    let label = label.trim();
                    if label.is_empty() {
                        continue;
                    }
                    let existing = self.labels.get(label).map(str::to_string);
                    match existing {
                        Some(id) => id,
                        None => {
                            let id = self.backend.create_thread().await?;
                            self.labels.insert(label, &id)?;
                            self.ui.say(&format!("Created thread '{label}'"));
                            id
                        }
                    }
                }
                1 => {
                    let Some(id) = self.ui.read_line("thread id: ")? else {
                        return Ok(Flow::Quit);
                    };
                    let id = id.trim().to_string();
                    if id.is_empty() {
                        continue;
                    }
                    id
                }
                _ => {
                    let Some(idx) = self.ui.choose("Saved labels:", &saved)? else {
                        return Ok(Flow::Quit);
                    };
                    let Some(id) = self.labels.get(&saved[idx]) else {
                        continue;
                    };
                    id.to_string()
                }
            };

            match self.open_thread(&thread_id).await {
                Ok(()) => return Ok(Flow::Continue),
                Err(e) => self.ui.say(&format!("Could not open thread {thread_id}: {e}")),
            }
        }
    }

    /// Print history oldest first and mark all of it seen
    async fn open_thread(&mut self, thread_id: &str) -> Result<(), TransportError> {
        let messages = self.backend.list_messages(thread_id).await?;
        self.thread_id = thread_id.to_string();

        let label = self.labels.find_label(thread_id).unwrap_or(thread_id).to_string();
        self.ui.say(&format!("--- thread {label} ---"));
        for message in messages.iter().rev() {
            self.ui.say(&format!("{}: {}", message.role, message.text));
        }
        self.seen.extend(messages.into_iter().map(|m| m.id));
        tracing::info!(thread_id, seen = self.seen.len(), "Thread opened");
        Ok(())
    }

    // ========================================================================
    // Turns
    // ========================================================================

    async fn turn(&mut self, text: &str) {
        match self.submit(text).await {
            Ok(outcome) => {
                tracing::info!(
                    thread_id = %self.thread_id,
                    run_id = %outcome.run_id(),
                    success = outcome.is_success(),
                    "Turn finished"
                );
                let report = describe(&outcome);
                self.ui.say(&report);
            }
            Err(e) => {
                tracing::error!(thread_id = %self.thread_id, error = %e, "Turn failed");
                self.ui.say(&format!("error: {e}"));
            }
        }
    }

    async fn submit(&mut self, text: &str) -> Result<RunOutcome, RunError> {
        let message = self
            .backend
            .create_message(&self.thread_id, MessageRole::User, text)
            .await?;
        self.seen.insert(message.id);

        let request = RunRequest::new(self.thread_id.clone(), self.assistant_id.clone());
        self.executor.execute(&request, &mut self.seen).await
    }

    // ========================================================================
    // Tool enablement
    // ========================================================================

    async fn enable_tools(&mut self) -> Result<Flow, SessionError> {
        let registry = self.executor.registry().clone();
        let names = registry.metadata_names();
        if names.is_empty() {
            self.ui.say("No tools are defined.");
            return Ok(Flow::Continue);
        }

        let Some(picked) = self.ui.choose_many("Select tools to enable:", &names)? else {
            return Ok(Flow::Quit);
        };
        let selected: Vec<&str> = picked.iter().map(|&i| names[i].as_str()).collect();
        self.ui.say(&format!("Selected: {}", selected.join(", ")));

        match self.ui.confirm("Enable these tools")? {
            None => return Ok(Flow::Quit),
            Some(false) => {
                self.ui.say("Nothing changed.");
                return Ok(Flow::Continue);
            }
            Some(true) => {}
        }

        let definitions: Vec<_> = selected
            .iter()
            .filter_map(|name| registry.definition(name))
            .collect();
        match self
            .backend
            .update_assistant_tools(&self.assistant_id, &definitions)
            .await
        {
            Ok(assistant) => self.ui.say(&format!(
                "Enabled {} tools on {}",
                definitions.len(),
                assistant.label()
            )),
            Err(e) => self.ui.say(&format!("error: {e}")),
        }
        Ok(Flow::Continue)
    }
}

/// User-facing line for a finished run
fn describe(outcome: &RunOutcome) -> String {
    match outcome {
        RunOutcome::Completed { message, .. } => format!("assistant: {}", message.text),
        RunOutcome::NoNewOutput { .. } => "(the assistant produced no new output)".to_string(),
        RunOutcome::Failed { status, reason, .. } => format!("run {status}: {reason}"),
        RunOutcome::Cancelled { .. } => "run was cancelled".to_string(),
        RunOutcome::TimedOut {
            reason,
            polls,
            submissions,
            ..
        } => {
            let limit = match reason {
                TimeoutReason::MaxPolls => "poll limit",
                TimeoutReason::Deadline => "time limit",
            };
            format!("gave up waiting: {limit} reached after {polls} polls and {submissions} tool submissions")
        }
    }
}
