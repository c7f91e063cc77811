//! Run state types

use crate::backend::{Message, RunStatus};
use std::collections::HashSet;
use std::time::Duration;

/// Limits and pacing for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    /// Constant delay between observations of a working run
    pub interval: Duration,
    /// Give up after this many get-run observations
    pub max_polls: Option<u32>,
    /// Give up once this much wall-clock time has passed since the run was created
    pub run_timeout: Option<Duration>,
    /// Issue a cancel-run call when giving up
    pub cancel_on_timeout: bool,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_polls: Some(600),
            run_timeout: Some(Duration::from_secs(20 * 60)),
            cancel_on_timeout: true,
        }
    }
}

impl PollPolicy {
    /// Which limit, if any, is exhausted after `polls` observations and `elapsed` time
    pub fn exhausted(&self, polls: u32, elapsed: Duration) -> Option<TimeoutReason> {
        if self.max_polls.is_some_and(|max| polls >= max) {
            return Some(TimeoutReason::MaxPolls);
        }
        if self.run_timeout.is_some_and(|limit| elapsed >= limit) {
            return Some(TimeoutReason::Deadline);
        }
        None
    }
}

/// Message ids already shown to the user.
///
/// Message listing returns the whole thread every time, so this is what
/// separates new output from history. Append-only.
#[derive(Debug, Clone, Default)]
pub struct SeenMessageSet {
    ids: HashSet<String>,
}

impl SeenMessageSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when the id was not seen before
    pub fn insert(&mut self, message_id: impl Into<String>) -> bool {
        self.ids.insert(message_id.into())
    }

    pub fn contains(&self, message_id: &str) -> bool {
        self.ids.contains(message_id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[allow(dead_code)] // Pairs with len()
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// First message in listing order that has not been seen
    pub fn first_unseen<'a>(&self, messages: &'a [Message]) -> Option<&'a Message> {
        messages.iter().find(|m| !self.contains(&m.id))
    }
}

impl<S: Into<String>> Extend<S> for SeenMessageSet {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        self.ids.extend(iter.into_iter().map(Into::into));
    }
}

/// Read-only inputs to a transition
#[derive(Debug, Clone, Copy)]
pub struct RunContext<'a> {
    pub run_id: &'a str,
    pub policy: &'a PollPolicy,
    pub seen: &'a SeenMessageSet,
}

impl<'a> RunContext<'a> {
    pub fn new(run_id: &'a str, policy: &'a PollPolicy, seen: &'a SeenMessageSet) -> Self {
        Self {
            run_id,
            policy,
            seen,
        }
    }
}

/// Where the executor is in the lifecycle of one run
#[derive(Debug, Clone, PartialEq)]
pub enum RunPhase {
    /// Waiting for the next get-run observation
    AwaitingStatus { polls: u32, submissions: u32 },

    /// Local tools are running for the listed call ids
    ExecutingTools {
        polls: u32,
        submissions: u32,
        call_ids: Vec<String>,
    },

    /// Outputs sent, waiting for the backend to accept them
    SubmittingOutputs { polls: u32, submissions: u32 },

    /// Run completed, waiting for the message listing
    CollectingOutput { polls: u32, submissions: u32 },

    /// Terminal
    Finished(RunOutcome),
}

impl RunPhase {
    pub fn initial() -> Self {
        RunPhase::AwaitingStatus {
            polls: 0,
            submissions: 0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RunPhase::AwaitingStatus { .. } => "awaiting_status",
            RunPhase::ExecutingTools { .. } => "executing_tools",
            RunPhase::SubmittingOutputs { .. } => "submitting_outputs",
            RunPhase::CollectingOutput { .. } => "collecting_output",
            RunPhase::Finished(_) => "finished",
        }
    }

    #[cfg(test)]
    pub fn is_finished(&self) -> bool {
        matches!(self, RunPhase::Finished(_))
    }
}

/// Which liveness limit ended a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutReason {
    MaxPolls,
    Deadline,
}

/// How a run ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// First previously unseen message after completion
    Completed { run_id: String, message: Message },

    /// Completed, but every listed message had already been seen
    NoNewOutput { run_id: String },

    /// `failed` or `expired`; never retried under the same run id
    Failed {
        run_id: String,
        status: RunStatus,
        reason: String,
    },

    Cancelled { run_id: String },

    /// A liveness limit was hit; earlier submissions stand
    TimedOut {
        run_id: String,
        reason: TimeoutReason,
        polls: u32,
        submissions: u32,
    },
}

impl RunOutcome {
    pub fn run_id(&self) -> &str {
        match self {
            RunOutcome::Completed { run_id, .. }
            | RunOutcome::NoNewOutput { run_id }
            | RunOutcome::Failed { run_id, .. }
            | RunOutcome::Cancelled { run_id }
            | RunOutcome::TimedOut { run_id, .. } => run_id,
        }
    }

    /// Assistant text, if the run produced any
    #[cfg(test)]
    pub fn text(&self) -> Option<&str> {
        match self {
            RunOutcome::Completed { message, .. } => Some(&message.text),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self,
            RunOutcome::Completed { .. } | RunOutcome::NoNewOutput { .. }
        )
    }
}
