//! Run polling state machine
//!
//! Pure transitions over run observations; the runtime executes the effects.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::Effect;
pub use event::Event;
pub use state::{PollPolicy, RunContext, RunOutcome, RunPhase, SeenMessageSet, TimeoutReason};
pub use transition::{transition, TransitionError};
