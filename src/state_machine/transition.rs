//! Pure state transition function

use super::{Effect, Event, RunContext, RunOutcome, RunPhase};
use crate::backend::{PendingActionBatch, Run, RunStatus, ToolOutput};
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: RunPhase,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: RunPhase) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Run already finished")]
    AlreadyFinished,
    #[error("Unexpected {event} while {phase}")]
    UnexpectedEvent {
        phase: &'static str,
        event: &'static str,
    },
    #[error("No effects left while {phase}")]
    Stalled { phase: &'static str },
}

/// Pure transition function.
///
/// Given the same phase, context and event it always produces the same
/// result. All I/O is expressed as returned effects.
pub fn transition(
    state: &RunPhase,
    ctx: &RunContext<'_>,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match (state, event) {
        // ============================================================
        // Status observations
        // ============================================================
        (
            RunPhase::AwaitingStatus { polls, submissions },
            Event::StatusObserved { run, elapsed },
        ) => Ok(observe(ctx, *polls + 1, *submissions, &run, elapsed)),

        // ============================================================
        // Tool batches
        // ============================================================
        (
            RunPhase::ExecutingTools {
                polls,
                submissions,
                call_ids,
            },
            Event::ToolOutputsReady { outputs },
        ) => {
            let outputs = reconcile_outputs(call_ids, outputs);
            Ok(TransitionResult::new(RunPhase::SubmittingOutputs {
                polls: *polls,
                submissions: *submissions,
            })
            .with_effect(Effect::SubmitOutputs { outputs }))
        }

        // The submit response is not treated as an observation; poll right away
        (
            RunPhase::SubmittingOutputs { polls, submissions },
            Event::OutputsSubmitted,
        ) => Ok(TransitionResult::new(RunPhase::AwaitingStatus {
            polls: *polls,
            submissions: *submissions + 1,
        })
        .with_effect(Effect::PollRun)),

        // ============================================================
        // Output collection
        // ============================================================
        (RunPhase::CollectingOutput { .. }, Event::MessagesListed { messages }) => {
            let run_id = ctx.run_id.to_string();
            match ctx.seen.first_unseen(&messages) {
                Some(message) => {
                    let message_id = message.id.clone();
                    Ok(TransitionResult::new(RunPhase::Finished(RunOutcome::Completed {
                        run_id,
                        message: message.clone(),
                    }))
                    .with_effect(Effect::MarkSeen { message_id }))
                }
                None => Ok(TransitionResult::new(RunPhase::Finished(
                    RunOutcome::NoNewOutput { run_id },
                ))),
            }
        }

        (RunPhase::Finished(_), _) => Err(TransitionError::AlreadyFinished),

        (state, event) => Err(TransitionError::UnexpectedEvent {
            phase: state.name(),
            event: event.name(),
        }),
    }
}

/// Handle one get-run observation. `polls` already counts it.
fn observe(
    ctx: &RunContext<'_>,
    polls: u32,
    submissions: u32,
    run: &Run,
    elapsed: Duration,
) -> TransitionResult {
    let run_id = ctx.run_id.to_string();

    match run.status {
        RunStatus::Completed | RunStatus::Incomplete => {
            TransitionResult::new(RunPhase::CollectingOutput { polls, submissions })
                .with_effect(Effect::ListMessages)
        }
        RunStatus::Failed | RunStatus::Expired => {
            let reason = match &run.last_error {
                Some(failure) => format!("{}: {}", failure.code, failure.message),
                None => format!("run {}", run.status),
            };
            TransitionResult::new(RunPhase::Finished(RunOutcome::Failed {
                run_id,
                status: run.status,
                reason,
            }))
        }
        RunStatus::Cancelled => {
            TransitionResult::new(RunPhase::Finished(RunOutcome::Cancelled { run_id }))
        }
        _ => {
            if let Some(reason) = ctx.policy.exhausted(polls, elapsed) {
                let effects = ctx.policy.cancel_on_timeout.then_some(Effect::CancelRun);
                return TransitionResult::new(RunPhase::Finished(RunOutcome::TimedOut {
                    run_id,
                    reason,
                    polls,
                    submissions,
                }))
                .with_effects(effects);
            }

            match pending_batch(run) {
                Some(batch) => {
                    let call_ids = batch.iter().map(|a| a.call_id.clone()).collect();
                    TransitionResult::new(RunPhase::ExecutingTools {
                        polls,
                        submissions,
                        call_ids,
                    })
                    .with_effect(Effect::DispatchTools { batch })
                }
                // Working, or requires_action with nothing to act on
                None => TransitionResult::new(RunPhase::AwaitingStatus { polls, submissions })
                    .with_effect(Effect::wait(ctx.policy.interval))
                    .with_effect(Effect::PollRun),
            }
        }
    }
}

fn pending_batch(run: &Run) -> Option<PendingActionBatch> {
    if run.status != RunStatus::RequiresAction {
        return None;
    }
    run.required_action
        .as_ref()
        .filter(|batch| !batch.is_empty())
        .cloned()
}

/// Exactly one output per call id, in batch order.
///
/// Outputs for unknown ids and repeats are dropped; missing ids get an
/// error output so the submission is never short.
fn reconcile_outputs(call_ids: &[String], outputs: Vec<ToolOutput>) -> Vec<ToolOutput> {
    let mut by_id: Vec<Option<ToolOutput>> = vec![None; call_ids.len()];
    for output in outputs {
        if let Some(idx) = call_ids.iter().position(|id| *id == output.call_id) {
            if by_id[idx].is_none() {
                by_id[idx] = Some(output);
            }
        }
    }

    let mut emitted = HashSet::new();
    call_ids
        .iter()
        .zip(by_id)
        .filter(|(id, _)| emitted.insert(id.as_str()))
        .map(|(id, output)| {
            output.unwrap_or_else(|| ToolOutput::error(id.clone(), "no output produced for call"))
        })
        .collect()
}
