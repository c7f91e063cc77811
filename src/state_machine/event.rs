//! Events that drive the run state machine

use crate::backend::{Message, Run, ToolOutput};
use std::time::Duration;

/// Results of executed effects, fed back into `transition`
#[derive(Debug, Clone)]
pub enum Event {
    /// A get-run call returned
    StatusObserved {
        run: Run,
        /// Time since the run was created, as measured by the executor
        elapsed: Duration,
    },

    /// The dispatcher finished a batch
    ToolOutputsReady { outputs: Vec<ToolOutput> },

    /// The backend accepted the submitted outputs
    OutputsSubmitted,

    /// Message listing for the thread, newest first
    MessagesListed { messages: Vec<Message> },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::StatusObserved { .. } => "status_observed",
            Event::ToolOutputsReady { .. } => "tool_outputs_ready",
            Event::OutputsSubmitted => "outputs_submitted",
            Event::MessagesListed { .. } => "messages_listed",
        }
    }
}
