//! The thinkloop execution loop.
//!
//! An [`Agent`] works toward its goals one **cycle** at a time:
//!
//! 1. **Think**: build a prompt from the profile, the available commands,
//!    and recent history; ask the model for exactly one command
//! 2. **Check**: if the proposal is empty or repeats the last one, re-think
//!    once on the smart model
//! 3. **Authorize**: in interactive mode the user approves, declines with
//!    feedback, or exits
//! 4. **Act**: run the command through the registry
//! 5. **Record**: store the result as an episode the next prompt will show
//!
//! The loop stops on `finish`, an exhausted cycle or money budget,
//! cancellation, or a fatal error.

pub mod loop_runner;
pub mod parser;
pub mod prompt;
pub mod watchdog;

#[cfg(test)]
mod test_helpers;

pub use loop_runner::{Agent, LoopOutcome};
pub use parser::{ParseError, ResponseParser};
pub use prompt::{Prompt, PromptBuilder, PromptInput};
pub use watchdog::{EscalationPolicy, TierGuard, Watchdog};
