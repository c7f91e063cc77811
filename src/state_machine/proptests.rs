//! Property-based tests for the run state machine
//!
//! Drives `transition` with arbitrary observation sequences and checks the
//! invariants that must hold no matter what the backend reports.

#![allow(clippy::single_match_else)]

use super::transition::*;
use super::*;
use crate::backend::{Message, MessageRole, PendingAction, Run, RunStatus, ToolArguments, ToolOutput};
use proptest::prelude::*;
use std::collections::{HashSet, VecDeque};
use std::time::Duration;

// ============================================================================
// Test Helpers
// ============================================================================

fn test_policy(max_polls: u32) -> PollPolicy {
    PollPolicy {
        interval: Duration::from_millis(5),
        max_polls: Some(max_polls),
        run_timeout: None,
        cancel_on_timeout: true,
    }
}

fn message(id: &str) -> Message {
    Message {
        id: id.to_string(),
        role: MessageRole::Assistant,
        text: format!("text {id}"),
        created_at: chrono::Utc::now(),
    }
}

/// Stand-in for the executor: answers every effect synchronously.
///
/// Returns the terminal phase and the effects seen along the way.
fn drive(
    observations: &[Run],
    policy: &PollPolicy,
    seen: &SeenMessageSet,
    messages: &[Message],
) -> (RunPhase, Vec<Effect>) {
    let ctx = RunContext::new("run_p", policy, seen);
    let mut state = RunPhase::initial();
    let mut pending = VecDeque::from([Effect::PollRun]);
    let mut log = Vec::new();
    let mut next_obs = 0usize;

    while let Some(effect) = pending.pop_front() {
        log.push(effect.clone());
        let event = match effect {
            Effect::PollRun => {
                // Past the end of the script the run stays in progress
                let run = observations
                    .get(next_obs)
                    .cloned()
                    .unwrap_or_else(|| Run::new("run_p", "t", RunStatus::InProgress));
                next_obs += 1;
                Event::StatusObserved {
                    run,
                    elapsed: Duration::ZERO,
                }
            }
            Effect::DispatchTools { batch } => Event::ToolOutputsReady {
                outputs: batch
                    .iter()
                    .map(|a| ToolOutput::success(a.call_id.clone(), "ok"))
                    .collect(),
            },
            Effect::SubmitOutputs { .. } => Event::OutputsSubmitted,
            Effect::ListMessages => Event::MessagesListed {
                messages: messages.to_vec(),
            },
            Effect::Wait { .. } | Effect::MarkSeen { .. } | Effect::CancelRun => continue,
        };

        let result = transition(&state, &ctx, event).expect("executor fed a valid event");
        state = result.new_state;
        pending.extend(result.effects);
    }

    (state, log)
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_status() -> impl Strategy<Value = RunStatus> {
    prop_oneof![
        Just(RunStatus::Queued),
        Just(RunStatus::InProgress),
        Just(RunStatus::RequiresAction),
        Just(RunStatus::Cancelling),
        Just(RunStatus::Cancelled),
        Just(RunStatus::Failed),
        Just(RunStatus::Completed),
        Just(RunStatus::Expired),
        Just(RunStatus::Incomplete),
        Just(RunStatus::Unknown),
    ]
}

fn arb_batch() -> impl Strategy<Value = Vec<PendingAction>> {
    prop::collection::vec("[a-z]{6}", 0..4).prop_map(|ids| {
        ids.into_iter()
            .map(|id| PendingAction::new(id, "echo", ToolArguments::parse("{}")))
            .collect()
    })
}

fn arb_observation() -> impl Strategy<Value = Run> {
    (arb_status(), arb_batch()).prop_map(|(status, batch)| {
        let run = Run::new("run_p", "t", status);
        if status == RunStatus::RequiresAction {
            run.with_actions(batch)
        } else {
            run
        }
    })
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_always_terminates_within_poll_budget(
        observations in prop::collection::vec(arb_observation(), 0..30),
        max_polls in 1u32..40,
    ) {
        let policy = test_policy(max_polls);
        let seen = SeenMessageSet::new();
        let (state, log) = drive(&observations, &policy, &seen, &[message("m1")]);

        prop_assert!(state.is_finished());
        let polls = log.iter().filter(|e| **e == Effect::PollRun).count();
        prop_assert!(polls <= max_polls as usize);
    }

    #[test]
    fn prop_one_submit_per_actionable_observation(
        observations in prop::collection::vec(arb_observation(), 0..30),
    ) {
        let policy = test_policy(100);
        let seen = SeenMessageSet::new();
        let (_, log) = drive(&observations, &policy, &seen, &[]);

        let dispatches = log
            .iter()
            .filter(|e| matches!(e, Effect::DispatchTools { .. }))
            .count();
        let submits = log.iter().filter(|e| e.is_submit()).count();
        prop_assert_eq!(dispatches, submits);
    }

    #[test]
    fn prop_submissions_cover_each_call_id_once(
        ids in prop::collection::vec("[a-c]{1}", 1..8),
        answered in prop::collection::vec(any::<bool>(), 8),
    ) {
        let policy = test_policy(10);
        let seen = SeenMessageSet::new();
        let ctx = RunContext::new("run_p", &policy, &seen);
        let state = RunPhase::ExecutingTools {
            polls: 1,
            submissions: 0,
            call_ids: ids.clone(),
        };
        let outputs = ids
            .iter()
            .zip(&answered)
            .filter(|(_, keep)| **keep)
            .map(|(id, _)| ToolOutput::success(id.clone(), "ok"))
            .collect();

        let result = transition(&state, &ctx, Event::ToolOutputsReady { outputs }).unwrap();
        let Effect::SubmitOutputs { outputs } = &result.effects[0] else {
            panic!("expected a submit effect");
        };

        let distinct: HashSet<&String> = ids.iter().collect();
        let submitted: HashSet<&String> = outputs.iter().map(|o| &o.call_id).collect();
        prop_assert_eq!(outputs.len(), distinct.len());
        prop_assert_eq!(submitted, distinct);
    }

    #[test]
    fn prop_terminal_outcome_matches_first_terminal_status(
        prefix in prop::collection::vec(
            prop_oneof![Just(RunStatus::Queued), Just(RunStatus::InProgress)],
            0..10,
        ),
        terminal in prop_oneof![
            Just(RunStatus::Completed),
            Just(RunStatus::Failed),
            Just(RunStatus::Cancelled),
            Just(RunStatus::Expired),
        ],
    ) {
        let policy = test_policy(100);
        let seen = SeenMessageSet::new();
        let mut observations: Vec<Run> = prefix
            .into_iter()
            .map(|s| Run::new("run_p", "t", s))
            .collect();
        observations.push(Run::new("run_p", "t", terminal));

        let (state, log) = drive(&observations, &policy, &seen, &[message("m1")]);
        let RunPhase::Finished(outcome) = state else {
            panic!("machine did not finish");
        };

        match terminal {
            RunStatus::Completed => prop_assert_eq!(outcome.text(), Some("text m1")),
            RunStatus::Cancelled => {
                let is_cancelled = matches!(outcome, RunOutcome::Cancelled { .. });
                prop_assert!(is_cancelled);
            }
            _ => {
                let is_failed = matches!(outcome, RunOutcome::Failed { .. });
                prop_assert!(is_failed);
            }
        }
        prop_assert!(!log.iter().any(|e| *e == Effect::CancelRun));
    }

    #[test]
    fn prop_seen_messages_never_returned(
        total in 1usize..6,
        seen_count in 0usize..6,
    ) {
        let messages: Vec<Message> = (0..total).map(|i| message(&format!("m{i}"))).collect();
        let mut seen = SeenMessageSet::new();
        seen.extend(messages.iter().take(seen_count).map(|m| m.id.clone()));
        let policy = test_policy(10);
        let observations = vec![Run::new("run_p", "t", RunStatus::Completed)];

        let (state, _) = drive(&observations, &policy, &seen, &messages);
        match state {
            RunPhase::Finished(RunOutcome::Completed { message, .. }) => {
                prop_assert!(!seen.contains(&message.id));
                prop_assert!(seen_count < total);
            }
            RunPhase::Finished(RunOutcome::NoNewOutput { .. }) => {
                prop_assert!(seen_count >= total);
            }
            other => prop_assert!(false, "unexpected end state {:?}", other),
        }
    }
}
