//! Run limits: money/token ceilings and the cycle counter.

use thinkloop_core::{BudgetTotals, Usage};
use tracing::{debug, warn};

use crate::pricing::PricingTable;

/// Token and cost ceiling with running totals.
///
/// Constructed once per run and handed to the loop. A ceiling of 0 means
/// no limit on that axis.
pub struct ResourceBudget {
    pricing: PricingTable,
    max_cost_usd: f64,
    max_tokens: u64,
    totals: BudgetTotals,
}

impl ResourceBudget {
    pub fn new(pricing: PricingTable) -> Self {
        Self {
            pricing,
            max_cost_usd: 0.0,
            max_tokens: 0,
            totals: BudgetTotals::default(),
        }
    }

    /// No ceilings, default prices.
    pub fn unlimited() -> Self {
        Self::new(PricingTable::with_defaults())
    }

    pub fn with_max_cost(mut self, max_cost_usd: f64) -> Self {
        self.max_cost_usd = max_cost_usd.max(0.0);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Add one model call's usage. Returns what the call cost.
    pub fn record_usage(&mut self, model: &str, usage: &Usage) -> f64 {
        let cost = self
            .pricing
            .compute_cost(model, usage.prompt_tokens, usage.completion_tokens);
        self.totals.prompt_tokens += u64::from(usage.prompt_tokens);
        self.totals.completion_tokens += u64::from(usage.completion_tokens);
        self.totals.total_cost_usd += cost;
        self.totals.model_calls += 1;

        debug!(
            model,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            cost_usd = cost,
            total_cost_usd = self.totals.total_cost_usd,
            "Recorded model usage"
        );
        if self.is_exhausted() {
            warn!(
                total_cost_usd = self.totals.total_cost_usd,
                total_tokens = self.totals.total_tokens(),
                "Resource budget exhausted"
            );
        }
        cost
    }

    /// Whether either configured ceiling has been reached.
    pub fn is_exhausted(&self) -> bool {
        let cost_hit = self.max_cost_usd > 0.0 && self.totals.total_cost_usd >= self.max_cost_usd;
        let tokens_hit = self.max_tokens > 0 && self.totals.total_tokens() >= self.max_tokens;
        cost_hit || tokens_hit
    }

    /// Money left, `None` when there is no cost ceiling.
    pub fn remaining_usd(&self) -> Option<f64> {
        (self.max_cost_usd > 0.0).then(|| (self.max_cost_usd - self.totals.total_cost_usd).max(0.0))
    }

    pub fn totals(&self) -> BudgetTotals {
        self.totals
    }

    /// Reload totals from a persisted run.
    pub fn restore(&mut self, totals: BudgetTotals) {
        self.totals = totals;
    }

    pub fn pricing(&self) -> &PricingTable {
        &self.pricing
    }
}

/// Counts completed cycles against a limit (0 = unlimited).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleCounter {
    limit: u32,
    completed: u32,
    /// Limit as configured. Only a single-step limit is re-armed by `grant`.
    configured: u32,
}

impl CycleCounter {
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            completed: 0,
            configured: limit,
        }
    }

    /// Continue counting from a resumed run.
    pub fn resumed(limit: u32, completed: u32) -> Self {
        Self {
            limit: if limit > 0 { completed + limit } else { 0 },
            completed,
            configured: limit,
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn completed(&self) -> u32 {
        self.completed
    }

    pub fn tick(&mut self) {
        self.completed += 1;
    }

    pub fn is_exhausted(&self) -> bool {
        self.limit > 0 && self.completed >= self.limit
    }

    /// The user authorized the cycle in progress plus `n` more.
    ///
    /// With a single-step limit the limit stays one step ahead of the
    /// user's authorizations. No effect when the counter is unlimited or
    /// configured with a larger limit, which stays a hard ceiling.
    pub fn grant(&mut self, n: u32) {
        if self.configured == 1 {
            self.limit = self.limit.max(self.completed + 1 + n);
        }
    }

    /// Cycles left, `None` when unlimited.
    pub fn remaining(&self) -> Option<u32> {
        (self.limit > 0).then(|| self.limit.saturating_sub(self.completed))
    }
}
