//! Effects produced by state transitions

use crate::backend::{PendingActionBatch, ToolOutput};
use std::time::Duration;

/// I/O the executor performs after a transition, in order
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Observe the run once
    PollRun,

    /// Sleep before the next observation
    Wait { delay: Duration },

    /// Run local tools for a pending batch
    DispatchTools { batch: PendingActionBatch },

    /// Send one output per call id back to the backend
    SubmitOutputs { outputs: Vec<ToolOutput> },

    /// Fetch the thread's messages after completion
    ListMessages,

    /// Record a message as shown to the user
    MarkSeen { message_id: String },

    /// Best-effort cancel when a liveness limit is hit
    CancelRun,
}

impl Effect {
    pub fn wait(delay: Duration) -> Self {
        Effect::Wait { delay }
    }

    #[cfg(test)]
    pub fn is_submit(&self) -> bool {
        matches!(self, Effect::SubmitOutputs { .. })
    }
}
