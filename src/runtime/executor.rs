//! Run executor

use super::{RuntimeConfig, ToolDispatcher};
use crate::backend::{Backend, RunOverrides, TransportError};
use crate::session::SessionCommand;
use crate::state_machine::{
    transition, Effect, Event, RunContext, RunOutcome, RunPhase, SeenMessageSet, TransitionError,
};
use crate::tools::{SessionScope, ToolRegistry};
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// What to run
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub thread_id: String,
    pub assistant_id: String,
    pub overrides: RunOverrides,
}

impl RunRequest {
    pub fn new(thread_id: impl Into<String>, assistant_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            assistant_id: assistant_id.into(),
            overrides: RunOverrides::default(),
        }
    }

    #[allow(dead_code)] // Overrides are not exposed in the chat UI yet
    pub fn with_overrides(mut self, overrides: RunOverrides) -> Self {
        self.overrides = overrides;
        self
    }
}

/// The only errors `execute` propagates
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Drives one run at a time from creation to a terminal outcome
pub struct RunExecutor<B: Backend + 'static> {
    backend: Arc<B>,
    dispatcher: ToolDispatcher,
    config: RuntimeConfig,
    commands: mpsc::UnboundedSender<SessionCommand>,
}

impl<B: Backend + 'static> RunExecutor<B> {
    pub fn new(
        backend: Arc<B>,
        registry: Arc<ToolRegistry>,
        config: RuntimeConfig,
        commands: mpsc::UnboundedSender<SessionCommand>,
    ) -> Self {
        let dispatcher = ToolDispatcher::new(registry, config.tool_timeout);
        Self {
            backend,
            dispatcher,
            config,
            commands,
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        self.dispatcher.registry()
    }

    /// Create a run and drive it to completion.
    ///
    /// `seen` gains the id of the message returned in `Completed`.
    pub async fn execute(
        &self,
        request: &RunRequest,
        seen: &mut SeenMessageSet,
    ) -> Result<RunOutcome, RunError> {
        let thread_id = request.thread_id.as_str();
        let run = self
            .backend
            .create_run(thread_id, &request.assistant_id, &request.overrides)
            .await?;
        let started = Instant::now();
        let run_id = run.id;

        let backend: Arc<dyn Backend> = self.backend.clone();
        let scope = SessionScope {
            thread_id: request.thread_id.clone(),
            assistant_id: request.assistant_id.clone(),
            backend,
            registry: self.dispatcher.registry().clone(),
            commands: self.commands.clone(),
        };

        let mut state = RunPhase::initial();
        let mut pending = VecDeque::from([Effect::PollRun]);

        while let Some(effect) = pending.pop_front() {
            let event = match effect {
                Effect::PollRun => {
                    let run = self.backend.get_run(thread_id, &run_id).await?;
                    tracing::debug!(
                        run_id = %run_id,
                        status = %run.status,
                        terminal = run.status.is_terminal(),
                        "Run observed"
                    );
                    Some(Event::StatusObserved {
                        run,
                        elapsed: started.elapsed(),
                    })
                }
                Effect::Wait { delay } => {
                    tokio::time::sleep(delay).await;
                    None
                }
                Effect::DispatchTools { batch } => {
                    tracing::info!(run_id = %run_id, calls = batch.len(), "Dispatching tool calls");
                    let outputs = self.dispatcher.dispatch(&batch, &scope).await;
                    Some(Event::ToolOutputsReady { outputs })
                }
                Effect::SubmitOutputs { outputs } => {
                    let run = self
                        .backend
                        .submit_tool_outputs(thread_id, &run_id, &outputs)
                        .await?;
                    tracing::debug!(run_id = %run_id, status = %run.status, "Tool outputs submitted");
                    Some(Event::OutputsSubmitted)
                }
                Effect::ListMessages => {
                    let messages = self.backend.list_messages(thread_id).await?;
                    Some(Event::MessagesListed { messages })
                }
                Effect::MarkSeen { message_id } => {
                    seen.insert(message_id);
                    None
                }
                Effect::CancelRun => {
                    if let Err(e) = self.backend.cancel_run(thread_id, &run_id).await {
                        tracing::warn!(run_id = %run_id, error = %e, "Cancel after timeout failed");
                    }
                    None
                }
            };

            if let Some(event) = event {
                let ctx = RunContext::new(&run_id, &self.config.poll, seen);
                let result = transition(&state, &ctx, event)?;
                state = result.new_state;
                pending.extend(result.effects);
            }
        }

        match state {
            RunPhase::Finished(outcome) => {
                tracing::info!(run_id = %run_id, outcome = ?outcome_label(&outcome), "Run finished");
                Ok(outcome)
            }
            other => Err(TransitionError::Stalled {
                phase: other.name(),
            }
            .into()),
        }
    }
}

fn outcome_label(outcome: &RunOutcome) -> &'static str {
    match outcome {
        RunOutcome::Completed { .. } => "completed",
        RunOutcome::NoNewOutput { .. } => "no_new_output",
        RunOutcome::Failed { .. } => "failed",
        RunOutcome::Cancelled { .. } => "cancelled",
        RunOutcome::TimedOut { .. } => "timed_out",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MessageRole, PendingAction, Run, RunStatus, ToolArguments, TransportErrorKind};
    use crate::runtime::testing::{EchoTool, FailingTool, MockBackend};
    use crate::state_machine::{PollPolicy, TimeoutReason};
    use std::time::Duration;

    fn config() -> RuntimeConfig {
        RuntimeConfig {
            poll: PollPolicy {
                interval: Duration::from_millis(1),
                max_polls: Some(50),
                run_timeout: Some(Duration::from_secs(30)),
                cancel_on_timeout: true,
            },
            tool_timeout: Some(Duration::from_secs(5)),
        }
    }

    fn executor(backend: Arc<MockBackend>, config: RuntimeConfig) -> RunExecutor<MockBackend> {
        let registry = ToolRegistry::new()
            .with_static(Arc::new(EchoTool))
            .with_static(Arc::new(FailingTool));
        let (tx, _rx) = mpsc::unbounded_channel();
        RunExecutor::new(backend, Arc::new(registry), config, tx)
    }

    fn action(call_id: &str, tool: &str) -> PendingAction {
        PendingAction::new(call_id, tool, ToolArguments::parse(r#"{"text": "ping"}"#))
    }

    fn status(status: RunStatus) -> Run {
        Run::new("run_1", "thread_1", status)
    }

    #[tokio::test]
    async fn test_scenario_tool_round_trip_then_completion() {
        let backend = Arc::new(MockBackend::new());
        backend.push_message("thread_1", MessageRole::User, "hello");
        let mut seen = SeenMessageSet::new();
        seen.extend(backend.message_ids("thread_1"));

        backend.queue_run(status(RunStatus::InProgress));
        backend.queue_run(status(RunStatus::RequiresAction).with_actions(vec![action("c1", "echo")]));
        backend.queue_run(status(RunStatus::InProgress));
        backend.queue_completion("pong");

        let exec = executor(backend.clone(), config());
        let outcome = exec
            .execute(&RunRequest::new("thread_1", "asst_1"), &mut seen)
            .await
            .unwrap();

        assert_eq!(outcome.text(), Some("pong"));
        let submissions = backend.submissions();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].len(), 1);
        assert_eq!(submissions[0][0].call_id, "c1");
        assert_eq!(backend.get_run_calls(), 4);
        // Reply is now seen
        let RunOutcome::Completed { message, .. } = &outcome else {
            panic!("expected completion");
        };
        assert!(seen.contains(&message.id));
    }

    #[tokio::test]
    async fn test_scenario_failure_without_submissions() {
        let backend = Arc::new(MockBackend::new());
        backend.queue_run(status(RunStatus::InProgress));
        backend.queue_run(status(RunStatus::Failed).with_error("server_error", "boom"));

        let exec = executor(backend.clone(), config());
        let outcome = exec
            .execute(&RunRequest::new("thread_1", "asst_1"), &mut SeenMessageSet::new())
            .await
            .unwrap();

        let RunOutcome::Failed { reason, .. } = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert!(reason.contains("boom"));
        assert!(backend.submissions().is_empty());
        assert_eq!(backend.get_run_calls(), 2);
    }

    #[tokio::test]
    async fn test_scenario_failing_tool_still_submits_every_call() {
        let backend = Arc::new(MockBackend::new());
        backend.queue_run(
            status(RunStatus::RequiresAction)
                .with_actions(vec![action("c1", "fail"), action("c2", "echo")]),
        );
        backend.queue_completion("done");

        let exec = executor(backend.clone(), config());
        let outcome = exec
            .execute(&RunRequest::new("thread_1", "asst_1"), &mut SeenMessageSet::new())
            .await
            .unwrap();

        assert_eq!(outcome.text(), Some("done"));
        let submissions = backend.submissions();
        assert_eq!(submissions.len(), 1);
        let ids: Vec<&str> = submissions[0].iter().map(|o| o.call_id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2"]);
        assert!(submissions[0][0].output.contains("deliberate failure"));
    }

    #[tokio::test]
    async fn test_completed_with_nothing_new() {
        let backend = Arc::new(MockBackend::new());
        backend.push_message("thread_1", MessageRole::User, "hello");
        let mut seen = SeenMessageSet::new();
        seen.extend(backend.message_ids("thread_1"));
        backend.queue_run(status(RunStatus::Completed));

        let exec = executor(backend.clone(), config());
        let outcome = exec
            .execute(&RunRequest::new("thread_1", "asst_1"), &mut seen)
            .await
            .unwrap();
        assert!(matches!(outcome, RunOutcome::NoNewOutput { .. }));
    }

    #[tokio::test]
    async fn test_poll_limit_times_out_and_cancels() {
        let backend = Arc::new(MockBackend::new());
        backend.queue_run(status(RunStatus::RequiresAction).with_actions(vec![action("c1", "echo")]));
        // Stays in progress forever afterwards
        let mut cfg = config();
        cfg.poll.max_polls = Some(4);

        let exec = executor(backend.clone(), cfg);
        let outcome = exec
            .execute(&RunRequest::new("thread_1", "asst_1"), &mut SeenMessageSet::new())
            .await
            .unwrap();

        assert_eq!(
            outcome,
            RunOutcome::TimedOut {
                run_id: backend.last_run_id().unwrap(),
                reason: TimeoutReason::MaxPolls,
                polls: 4,
                submissions: 1,
            }
        );
        assert_eq!(backend.submissions().len(), 1);
        assert_eq!(backend.cancel_calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_cancel_still_times_out() {
        let backend = Arc::new(MockBackend::new());
        backend.fail_cancel(TransportError::network("connection refused"));
        let mut cfg = config();
        cfg.poll.max_polls = Some(3);

        let exec = executor(backend.clone(), cfg);
        let outcome = exec
            .execute(&RunRequest::new("thread_1", "asst_1"), &mut SeenMessageSet::new())
            .await
            .unwrap();

        assert_eq!(
            outcome,
            RunOutcome::TimedOut {
                run_id: backend.last_run_id().unwrap(),
                reason: TimeoutReason::MaxPolls,
                polls: 3,
                submissions: 0,
            }
        );
        assert_eq!(backend.cancel_calls(), 1);
    }

    #[tokio::test]
    async fn test_deadline_times_out() {
        let backend = Arc::new(MockBackend::new());
        let mut cfg = config();
        cfg.poll.max_polls = None;
        cfg.poll.run_timeout = Some(Duration::from_millis(30));
        cfg.poll.interval = Duration::from_millis(5);
        cfg.poll.cancel_on_timeout = false;

        let exec = executor(backend.clone(), cfg);
        let outcome = exec
            .execute(&RunRequest::new("thread_1", "asst_1"), &mut SeenMessageSet::new())
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            RunOutcome::TimedOut {
                reason: TimeoutReason::Deadline,
                ..
            }
        ));
        assert_eq!(backend.cancel_calls(), 0);
    }

    #[tokio::test]
    async fn test_transport_error_propagates() {
        let backend = Arc::new(MockBackend::new());
        backend.queue_run_error(TransportError::new(TransportErrorKind::ServerError, "503"));

        let exec = executor(backend, config());
        let err = exec
            .execute(&RunRequest::new("thread_1", "asst_1"), &mut SeenMessageSet::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::Transport(_)));
    }

    #[tokio::test]
    async fn test_overrides_forwarded() {
        let backend = Arc::new(MockBackend::new());
        backend.queue_run(status(RunStatus::Cancelled));
        let overrides = RunOverrides {
            model: Some("gpt-4o-mini".to_string()),
            ..RunOverrides::default()
        };

        let exec = executor(backend.clone(), config());
        let request = RunRequest::new("thread_1", "asst_9").with_overrides(overrides.clone());
        let outcome = exec.execute(&request, &mut SeenMessageSet::new()).await.unwrap();

        assert!(matches!(outcome, RunOutcome::Cancelled { .. }));
        let created = backend.created_runs();
        assert_eq!(created, vec![("thread_1".to_string(), "asst_9".to_string(), overrides)]);
    }
}
