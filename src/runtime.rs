//! Runtime for executing runs
//!
//! Effects from the state machine are carried out here against a `Backend`
//! and the local tool registry.

mod dispatcher;
mod executor;

#[cfg(test)]
pub mod testing;

pub use dispatcher::ToolDispatcher;
pub use executor::{RunError, RunExecutor, RunRequest};

use crate::state_machine::PollPolicy;
use std::time::Duration;

/// Pacing and limits for the executor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub poll: PollPolicy,
    /// Upper bound on a single tool call; `None` leaves calls unbounded
    pub tool_timeout: Option<Duration>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            poll: PollPolicy::default(),
            tool_timeout: Some(Duration::from_secs(60)),
        }
    }
}
