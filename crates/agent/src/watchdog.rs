//! Stagnation detection and tier escalation.
//!
//! When the model proposes no command, or proposes exactly the command it
//! ran last cycle, the loop discards the proposal and thinks once more on
//! the smart tier. [`TierGuard`] makes that switch scoped: the previous tier
//! comes back when the guard drops, on every exit path.

use std::sync::{Arc, RwLock};

use thinkloop_core::agent::AgentSettings;
use thinkloop_core::history::{Action, ActionHistory};
use tracing::debug;

/// Extension point consulted after every think step.
pub trait EscalationPolicy: Send + Sync {
    /// `Some(reason)` to discard `proposed` and re-think on the smart tier.
    fn should_escalate(
        &self,
        proposed: &Action,
        history: &ActionHistory,
        settings: &AgentSettings,
    ) -> Option<String>;
}

/// Escalates on a missing command or an exact repeat of the previous one.
///
/// Only the immediately preceding completed episode is compared.
#[derive(Debug, Clone, Copy, Default)]
pub struct Watchdog;

impl EscalationPolicy for Watchdog {
    fn should_escalate(
        &self,
        proposed: &Action,
        history: &ActionHistory,
        settings: &AgentSettings,
    ) -> Option<String> {
        if !settings.can_escalate() {
            return None;
        }

        if !proposed.has_command() {
            return Some("the model proposed no command".into());
        }

        let previous = history.previous_action()?;
        if previous.same_invocation(proposed) {
            return Some(format!("the model repeated {}", proposed.format_call()));
        }
        None
    }
}

/// Forces the smart tier until dropped, then restores the prior `big_brain`.
#[must_use = "the tier is restored as soon as the guard is dropped"]
pub struct TierGuard {
    settings: Arc<RwLock<AgentSettings>>,
    previous: bool,
}

impl TierGuard {
    pub fn escalate(settings: &Arc<RwLock<AgentSettings>>) -> Self {
        let mut guard = settings.write().unwrap_or_else(|p| p.into_inner());
        let previous = guard.big_brain;
        guard.big_brain = true;
        drop(guard);
        debug!("Tier escalated to smart");
        Self {
            settings: Arc::clone(settings),
            previous,
        }
    }
}

impl Drop for TierGuard {
    fn drop(&mut self) {
        let mut guard = self.settings.write().unwrap_or_else(|p| p.into_inner());
        guard.big_brain = self.previous;
        debug!(big_brain = self.previous, "Tier restored");
    }
}
