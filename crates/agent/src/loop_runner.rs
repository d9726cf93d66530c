//! The agent execution loop.
//!
//! Each cycle:
//! 1. Check the budget, the cycle limit and cancellation
//! 2. Think: build a prompt, call the model, parse one action
//! 3. Open an episode; let the escalation policy veto and re-think once on
//!    the smart tier
//! 4. Present the action and, in interactive mode, ask for authorization
//! 5. Execute the command (bounded by a timeout and the cancellation token)
//! 6. Record the result, persist state, publish events
//!
//! Only `finish`, an exhausted limit, cancellation, or a fatal error end the
//! loop. Every other failure becomes an episode result the model sees on
//! its next cycle.

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::Value;
use thinkloop_core::agent::AgentSettings;
use thinkloop_core::command::{CommandContext, CommandOutput, CommandRegistry, FINISH_COMMAND};
use thinkloop_core::context::ContextProvider;
use thinkloop_core::error::{AgentError, CommandError, ProviderError, Result, StateError};
use thinkloop_core::event::{DomainEvent, EventBus};
use thinkloop_core::history::{Action, ActionHistory, ActionResult};
use thinkloop_core::interaction::{Authorization, AutoApprove, UserInteraction};
use thinkloop_core::provider::{Provider, ProviderRequest};
use thinkloop_core::state::{AgentState, StateStore};
use thinkloop_core::workspace::Workspace;
use thinkloop_telemetry::{CycleCounter, ResourceBudget};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::parser::ResponseParser;
use crate::prompt::{PromptBuilder, PromptInput};
use crate::watchdog::{EscalationPolicy, TierGuard, Watchdog};

const DEFAULT_MAX_PARSE_ATTEMPTS: u32 = 3;
const DEFAULT_MODEL_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(300);
const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);

/// How a run ended without an error.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopOutcome {
    /// `finish` succeeded; carries its reason
    Completed(String),
    /// The cycle limit was reached
    TerminatedByCycleLimit { cycles: u32 },
    /// The cost or token ceiling was reached
    TerminatedByBudget { cost_usd: f64, tokens: u64 },
    /// Cancelled by the token or by the user choosing to exit
    Cancelled,
}

impl std::fmt::Display for LoopOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed(reason) => write!(f, "completed: {reason}"),
            Self::TerminatedByCycleLimit { cycles } => {
                write!(f, "cycle limit reached after {cycles} cycles")
            }
            Self::TerminatedByBudget { cost_usd, tokens } => {
                write!(f, "budget exhausted (${cost_usd:.4}, {tokens} tokens)")
            }
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

enum Gate {
    Proceed,
    Declined(String),
    Exit,
}

enum Execution {
    Finished(std::result::Result<CommandOutput, CommandError>),
    Cancelled,
}

/// An autonomous agent: its state plus everything needed to run cycles.
pub struct Agent {
    /// Identity, goals, history and counters; what gets persisted
    state: AgentState,

    /// Live settings; the tier guard flips `big_brain` here
    settings: Arc<RwLock<AgentSettings>>,

    /// The LLM provider
    provider: Arc<dyn Provider>,

    /// Commands the model may choose from
    registry: Arc<CommandRegistry>,

    /// Where commands read and write files
    workspace: Arc<dyn Workspace>,

    /// Authorization and presentation
    interaction: Arc<dyn UserInteraction>,

    /// Saved after every recorded episode when present
    store: Option<Arc<dyn StateStore>>,

    /// Consulted after each think step; `None` disables escalation
    escalation: Option<Box<dyn EscalationPolicy>>,

    /// Fills the `## Context` prompt section
    context: Option<Arc<dyn ContextProvider>>,

    budget: ResourceBudget,
    cycles: CycleCounter,
    prompt: PromptBuilder,

    /// Event bus for domain events
    event_bus: Arc<EventBus>,

    cancel: CancellationToken,

    /// Think attempts before an unusable reply becomes fatal
    max_parse_attempts: u32,
    model_timeout: Duration,
    command_timeout: Duration,

    /// Cycles the user already approved in advance
    preauthorized: u32,
}

impl Agent {
    /// Create an agent from new or loaded state.
    ///
    /// An episode left in progress by an interrupted run is discarded so the
    /// first cycle starts clean.
    pub fn new(
        mut state: AgentState,
        provider: Arc<dyn Provider>,
        registry: Arc<CommandRegistry>,
        workspace: Arc<dyn Workspace>,
    ) -> Self {
        if let Some(stale) = state.history.rewind_incomplete() {
            info!(
                agent_id = %state.agent_id,
                command = stale.action.name.as_deref().unwrap_or("<none>"),
                "Discarded unfinished episode from a previous run"
            );
        }

        let settings = state.settings.clone();
        let mut budget = ResourceBudget::unlimited();
        budget.restore(state.budget);
        let cycles = CycleCounter::resumed(settings.cycle_limit, state.cycles_completed);
        let prompt = PromptBuilder::new()
            .with_functions(settings.use_functions)
            .with_history_window(settings.history_window);

        Self {
            state,
            settings: Arc::new(RwLock::new(settings)),
            provider,
            registry,
            workspace,
            interaction: Arc::new(AutoApprove),
            store: None,
            escalation: Some(Box::new(Watchdog)),
            context: None,
            budget,
            cycles,
            prompt,
            event_bus: Arc::new(EventBus::default()),
            cancel: CancellationToken::new(),
            max_parse_attempts: DEFAULT_MAX_PARSE_ATTEMPTS,
            model_timeout: DEFAULT_MODEL_TIMEOUT,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            preauthorized: 0,
        }
    }

    pub fn with_interaction(mut self, interaction: Arc<dyn UserInteraction>) -> Self {
        self.interaction = interaction;
        self
    }

    pub fn with_state_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use a budget with ceilings. Totals from earlier runs carry over.
    pub fn with_budget(mut self, mut budget: ResourceBudget) -> Self {
        budget.restore(self.budget.totals());
        self.budget = budget;
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn with_escalation_policy(mut self, policy: impl EscalationPolicy + 'static) -> Self {
        self.escalation = Some(Box::new(policy));
        self
    }

    pub fn without_escalation(mut self) -> Self {
        self.escalation = None;
        self
    }

    pub fn with_context(mut self, context: Arc<dyn ContextProvider>) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_max_parse_attempts(mut self, attempts: u32) -> Self {
        self.max_parse_attempts = attempts.max(1);
        self
    }

    pub fn with_model_timeout(mut self, timeout: Duration) -> Self {
        self.model_timeout = timeout;
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn id(&self) -> &str {
        &self.state.agent_id
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    pub fn history(&self) -> &ActionHistory {
        &self.state.history
    }

    /// Snapshot of the live settings.
    pub fn settings(&self) -> AgentSettings {
        self.settings
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn budget(&self) -> &ResourceBudget {
        &self.budget
    }

    pub fn cycles(&self) -> CycleCounter {
        self.cycles
    }

    /// Token that stops the run at its next suspension point.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    /// Consume the agent, returning its up-to-date state.
    pub fn into_state(mut self) -> AgentState {
        self.sync_state();
        self.state
    }

    /// Run cycles until the agent finishes, hits a limit, is cancelled, or
    /// fails fatally. State is persisted before returning either way.
    pub async fn run(&mut self) -> Result<LoopOutcome> {
        info!(
            agent_id = %self.state.agent_id,
            goals = self.state.profile.goals.len(),
            cycles_completed = self.cycles.completed(),
            "Agent run starting"
        );

        match self.run_cycles().await {
            Ok(outcome) => {
                self.persist().await?;
                info!(agent_id = %self.state.agent_id, outcome = %outcome, "Agent run finished");
                self.publish_finished(outcome.to_string());
                Ok(outcome)
            }
            Err(e) => {
                warn!(agent_id = %self.state.agent_id, error = %e, "Agent run failed");
                if let Err(save_err) = self.persist().await {
                    warn!(error = %save_err, "Failed to persist state after error");
                }
                self.publish_finished(format!("error: {e}"));
                Err(e)
            }
        }
    }

    async fn run_cycles(&mut self) -> Result<LoopOutcome> {
        loop {
            if self.cancel.is_cancelled() {
                return Ok(LoopOutcome::Cancelled);
            }
            if self.budget.is_exhausted() {
                let totals = self.budget.totals();
                info!(
                    cost_usd = totals.total_cost_usd,
                    tokens = totals.total_tokens(),
                    "Budget exhausted"
                );
                return Ok(LoopOutcome::TerminatedByBudget {
                    cost_usd: totals.total_cost_usd,
                    tokens: totals.total_tokens(),
                });
            }
            if self.cycles.is_exhausted() {
                info!(cycles = self.cycles.completed(), "Cycle limit reached");
                return Ok(LoopOutcome::TerminatedByCycleLimit {
                    cycles: self.cycles.completed(),
                });
            }

            let cycle = self.cycles.completed() + 1;
            debug!(cycle, "Cycle starting");
            self.event_bus.publish(DomainEvent::CycleStarted {
                agent_id: self.state.agent_id.clone(),
                cycle,
                timestamp: Utc::now(),
            });

            let Some(mut action) = self.think().await? else {
                return Ok(LoopOutcome::Cancelled);
            };
            let mut index = self.state.history.append(action.clone())?;

            if let Some(reason) = self.escalation_reason(&action) {
                let settings = self.settings();
                warn!(
                    cycle,
                    reason = %reason,
                    from = %settings.fast_llm,
                    to = %settings.smart_llm,
                    "Escalating to the smart model"
                );
                self.event_bus.publish(DomainEvent::Escalated {
                    reason,
                    from_model: settings.fast_llm.clone(),
                    to_model: settings.smart_llm.clone(),
                    timestamp: Utc::now(),
                });

                self.state.history.rewind_incomplete();
                let rethought = {
                    let _guard = TierGuard::escalate(&self.settings);
                    self.think().await
                };
                let Some(next) = rethought? else {
                    return Ok(LoopOutcome::Cancelled);
                };
                action = next;
                index = self.state.history.append(action.clone())?;
            }

            self.interaction
                .present(&self.state.profile.ai_name, &action)
                .await;

            match self.authorize(&action).await {
                Gate::Proceed => {}
                Gate::Declined(feedback) => {
                    info!(cycle, "Action declined with feedback");
                    self.record(index, ActionResult::Interrupted { feedback }).await?;
                    continue;
                }
                Gate::Exit => {
                    info!(cycle, "User chose to exit");
                    self.state.history.rewind_incomplete();
                    return Ok(LoopOutcome::Cancelled);
                }
            }

            let settings = self.settings();
            let result = match self.execute(&action, &settings).await {
                Execution::Finished(Ok(output)) => ActionResult::Success { output },
                Execution::Finished(Err(e)) if e.is_fatal() => {
                    let message = e.to_string();
                    self.record(index, e.into()).await?;
                    return Err(AgentError::Terminated(message));
                }
                Execution::Finished(Err(e)) => e.into(),
                Execution::Cancelled => {
                    let command = action.name.clone().unwrap_or_default();
                    self.record(index, CommandError::Cancelled { command }.into())
                        .await?;
                    return Ok(LoopOutcome::Cancelled);
                }
            };

            let finish_reason = match (&result, action.name.as_deref()) {
                (ActionResult::Success { output }, Some(FINISH_COMMAND)) => Some(match output {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                }),
                _ => None,
            };

            self.record(index, result).await?;

            if let Some(reason) = finish_reason {
                return Ok(LoopOutcome::Completed(reason));
            }
        }
    }

    /// One think step. `None` means the run was cancelled meanwhile.
    ///
    /// Unusable replies are retried with a corrective note, transient
    /// provider failures are retried as they are; both share the attempt
    /// bound.
    async fn think(&mut self) -> Result<Option<Action>> {
        let mut corrections: Vec<String> = Vec::new();
        let mut last_error = None;

        for attempt in 1..=self.max_parse_attempts {
            let request = self.build_request(&corrections);
            let model = request.model.clone();
            let tier = request.tier;
            debug!(attempt, tier = %tier, model = %model, messages = request.messages.len(), "Thinking");

            let reply = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(None),
                reply = tokio::time::timeout(self.model_timeout, self.provider.complete(request)) => reply,
            };

            let response = match reply {
                Err(_) => {
                    warn!(attempt, model = %model, "Model call timed out");
                    last_error = Some(AgentError::Provider(ProviderError::Timeout(format!(
                        "{model} did not answer within {}s",
                        self.model_timeout.as_secs()
                    ))));
                    continue;
                }
                Ok(Err(e)) if e.is_retryable() => {
                    warn!(attempt, error = %e, "Model call failed, retrying");
                    if let ProviderError::RateLimited { retry_after_secs } = &e {
                        let wait = Duration::from_secs(*retry_after_secs).min(MAX_RATE_LIMIT_WAIT);
                        tokio::select! {
                            biased;
                            _ = self.cancel.cancelled() => return Ok(None),
                            _ = tokio::time::sleep(wait) => {}
                        }
                    }
                    last_error = Some(e.into());
                    continue;
                }
                Ok(Err(e)) => return Err(e.into()),
                Ok(Ok(response)) => response,
            };

            let billed_model = if response.model.is_empty() {
                model.as_str()
            } else {
                response.model.as_str()
            };
            let tokens_used = response.usage.map(|u| u.total_tokens).unwrap_or(0);
            if let Some(usage) = &response.usage {
                let cost = self.budget.record_usage(billed_model, usage);
                debug!(model = billed_model, tokens = tokens_used, cost_usd = cost, "Usage recorded");
            }
            self.event_bus.publish(DomainEvent::ModelResponded {
                model: billed_model.to_string(),
                tier,
                tokens_used,
                timestamp: Utc::now(),
            });

            match ResponseParser::parse(&response.message) {
                Ok(action) => {
                    debug!(
                        command = action.name.as_deref().unwrap_or("<none>"),
                        "Parsed action"
                    );
                    return Ok(Some(action));
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Unusable model response");
                    corrections.push(e.to_string());
                    last_error = Some(AgentError::InvalidAgentResponse {
                        attempts: attempt,
                        message: e.to_string(),
                    });
                }
            }
        }

        Err(last_error.unwrap_or_else(|| AgentError::InvalidAgentResponse {
            attempts: self.max_parse_attempts,
            message: "no usable response".into(),
        }))
    }

    fn build_request(&self, corrections: &[String]) -> ProviderRequest {
        let settings = self.settings();
        let tier = settings.active_tier();
        let commands = self.registry.get_available_commands(&settings);
        let context = self.context.as_ref().and_then(|c| c.render());

        let prompt = self.prompt.build(&PromptInput {
            profile: &self.state.profile,
            directives: &self.state.directives,
            commands: &commands,
            history: &self.state.history,
            context,
            corrections,
        });

        ProviderRequest {
            model: settings.model_for(tier).to_string(),
            tier,
            messages: prompt.messages,
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            functions: prompt.functions,
        }
    }

    fn escalation_reason(&self, action: &Action) -> Option<String> {
        let policy = self.escalation.as_ref()?;
        policy.should_escalate(action, &self.state.history, &self.settings())
    }

    async fn authorize(&mut self, action: &Action) -> Gate {
        let settings = self.settings();
        if !settings.requires_authorization() {
            return Gate::Proceed;
        }

        let name = action.name.as_deref().unwrap_or_default();
        if !action.has_command() || settings.is_auto_approved(name) {
            self.cycles.grant(1);
            return Gate::Proceed;
        }
        if self.preauthorized > 0 {
            self.preauthorized -= 1;
            self.cycles.grant(1);
            debug!(command = name, remaining = self.preauthorized, "Pre-authorized cycle");
            return Gate::Proceed;
        }

        let answer = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Authorization::Exit,
            answer = self.interaction.authorize(action) => answer,
        };

        match answer {
            Authorization::Approve => {
                self.cycles.grant(1);
                Gate::Proceed
            }
            Authorization::ApproveFor(n) => {
                self.cycles.grant(n);
                self.preauthorized = n.saturating_sub(1);
                Gate::Proceed
            }
            Authorization::Feedback(feedback) => {
                self.cycles.grant(1);
                Gate::Declined(feedback)
            }
            Authorization::Exit => Gate::Exit,
        }
    }

    async fn execute(&self, action: &Action, settings: &AgentSettings) -> Execution {
        let Some(name) = action.name.as_deref().filter(|_| action.has_command()) else {
            return Execution::Finished(Err(CommandError::UnknownCommand {
                name: String::new(),
                reason: Some("the response did not name a command".into()),
            }));
        };

        let bound = match self.registry.resolve(name, &action.args, settings) {
            Ok(bound) => bound,
            Err(e) => {
                debug!(command = name, error = %e, "Command rejected");
                return Execution::Finished(Err(e));
            }
        };
        let ctx = CommandContext {
            agent_id: self.state.agent_id.clone(),
            workspace: Arc::clone(&self.workspace),
            settings: settings.clone(),
        };

        info!(command = name, "Executing command");
        let start = Instant::now();
        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            result = tokio::time::timeout(self.command_timeout, self.registry.invoke(bound, ctx)) => Some(result),
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        let execution = match outcome {
            None => {
                warn!(command = name, "Command cancelled");
                Execution::Cancelled
            }
            Some(Err(_)) => {
                warn!(command = name, timeout_secs = self.command_timeout.as_secs(), "Command timed out");
                Execution::Finished(Err(CommandError::Timeout {
                    command: name.to_string(),
                    timeout_secs: self.command_timeout.as_secs(),
                }))
            }
            Some(Ok(result)) => Execution::Finished(result),
        };

        self.event_bus.publish(DomainEvent::CommandExecuted {
            command: name.to_string(),
            success: matches!(execution, Execution::Finished(Ok(_))),
            duration_ms,
            timestamp: Utc::now(),
        });
        execution
    }

    /// Complete the episode at `index`, count the cycle, and persist.
    async fn record(&mut self, index: usize, result: ActionResult) -> Result<()> {
        self.state.history.record_result(index, result, None)?;
        self.cycles.tick();

        let summary = self
            .state
            .history
            .get(index)
            .and_then(|e| e.summary.clone())
            .unwrap_or_default();
        debug!(index, summary = %summary, "Episode recorded");
        self.event_bus.publish(DomainEvent::EpisodeRecorded {
            index,
            summary,
            timestamp: Utc::now(),
        });

        self.persist().await?;
        Ok(())
    }

    fn sync_state(&mut self) {
        self.state.settings = self.settings();
        self.state.budget = self.budget.totals();
        self.state.cycles_completed = self.cycles.completed();
        self.state.touch();
    }

    async fn persist(&mut self) -> std::result::Result<(), StateError> {
        self.sync_state();
        if let Some(store) = &self.store {
            store.save(&self.state).await?;
        }
        Ok(())
    }

    fn publish_finished(&self, outcome: String) {
        self.event_bus.publish(DomainEvent::LoopFinished {
            agent_id: self.state.agent_id.clone(),
            outcome,
            cycles: self.cycles.completed(),
            timestamp: Utc::now(),
        });
    }
}
