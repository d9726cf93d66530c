//! Cost tracking and run limits for thinkloop agents.
//!
//! Prices every model call with a built-in pricing table, keeps running
//! token/cost totals against an optional ceiling, and counts cycles against
//! the configured cycle limit.

pub mod budget;
pub mod pricing;

pub use budget::{CycleCounter, ResourceBudget};
pub use pricing::{ModelPricing, PricingTable};
