//! Domain event system: observers of the agent loop.
//!
//! The loop publishes events as a cycle progresses. The CLI, tests, or any
//! other component can subscribe without the loop knowing about them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::provider::ModelTier;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A new cycle began
    CycleStarted {
        agent_id: String,
        cycle: u32,
        timestamp: DateTime<Utc>,
    },

    /// The model answered a think request
    ModelResponded {
        model: String,
        tier: ModelTier,
        tokens_used: u32,
        timestamp: DateTime<Utc>,
    },

    /// The watchdog switched to the smart tier for a re-think
    Escalated {
        reason: String,
        from_model: String,
        to_model: String,
        timestamp: DateTime<Utc>,
    },

    /// A command finished running
    CommandExecuted {
        command: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// An episode was completed and stored
    EpisodeRecorded {
        index: usize,
        summary: String,
        timestamp: DateTime<Utc>,
    },

    /// The loop stopped
    LoopFinished {
        agent_id: String,
        outcome: String,
        cycles: u32,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
