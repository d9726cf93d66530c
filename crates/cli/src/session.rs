//! Wiring a configured agent together and running it in the terminal.

use std::sync::Arc;
use std::time::Duration;

use thinkloop_agent::{Agent, LoopOutcome};
use thinkloop_commands::{ShellPolicy, builtin_registry};
use thinkloop_config::{AppConfig, BudgetConfig};
use thinkloop_core::context::AgentContext;
use thinkloop_core::event::DomainEvent;
use thinkloop_core::interaction::{AutoApprove, UserInteraction};
use thinkloop_core::state::AgentState;
use thinkloop_providers::OpenAiCompatProvider;
use thinkloop_storage::{FileStateStore, LocalWorkspace};
use thinkloop_telemetry::{ModelPricing, PricingTable, ResourceBudget};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::console::ConsoleInteraction;

/// A budget with the configured ceilings and price overrides.
pub fn budget_from_config(config: &BudgetConfig) -> ResourceBudget {
    let pricing = PricingTable::with_defaults();
    for (model, price) in &config.custom_pricing {
        pricing.set(model.clone(), ModelPricing::new(price.input_per_m, price.output_per_m));
    }
    ResourceBudget::new(pricing)
        .with_max_cost(config.max_cost_usd)
        .with_max_tokens(config.max_tokens)
}

/// Run `state` to completion with everything `config` describes.
pub async fn execute(config: &AppConfig, state: AgentState) -> Result<(), Box<dyn std::error::Error>> {
    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    THINKLOOP_API_KEY=sk-...");
        eprintln!("    OPENAI_API_KEY=sk-...");
        eprintln!();
        eprintln!("  Or add api_key to {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let provider = Arc::new(OpenAiCompatProvider::from_config(config)?);
    let workspace_root = config.workspace_root();
    let workspace = Arc::new(
        LocalWorkspace::new(&workspace_root)?
            .with_restriction(state.settings.restrict_to_workspace)
            .with_forbidden_paths(config.workspace.forbidden_paths.clone()),
    );

    let interaction: Arc<dyn UserInteraction> = if state.settings.noninteractive {
        Arc::new(AutoApprove)
    } else {
        Arc::new(ConsoleInteraction::new())
    };
    let context = Arc::new(AgentContext::new());
    let registry = builtin_registry(
        ShellPolicy::new(
            config.commands.shell_allowlist.clone(),
            config.commands.shell_denylist.clone(),
        ),
        Arc::clone(&context),
        Arc::clone(&interaction),
    )?;

    let store = Arc::new(FileStateStore::new(config.data_dir()));
    let mut agent = Agent::new(state, provider, Arc::new(registry), workspace)
        .with_interaction(interaction)
        .with_state_store(store)
        .with_context(context)
        .with_budget(budget_from_config(&config.budget))
        .with_max_parse_attempts(config.run.max_parse_attempts)
        .with_model_timeout(Duration::from_secs(config.run.model_timeout_secs))
        .with_command_timeout(Duration::from_secs(config.run.command_timeout_secs));

    info!(
        agent_id = agent.id(),
        workspace = %workspace_root.display(),
        fast_llm = %config.fast_llm,
        smart_llm = %config.smart_llm,
        "Agent ready"
    );

    let token = agent.cancellation_token();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n  Interrupted, stopping after saving state...");
            token.cancel();
        }
    });

    let printer = spawn_event_printer(agent.event_bus().subscribe());

    let result = agent.run().await;
    ctrl_c.abort();

    let agent_id = agent.id().to_string();
    let cycles = agent.cycles().completed();
    let totals = agent.budget().totals();
    // Closes the bus so the printer drains what is buffered and stops
    drop(agent);
    if let Err(e) = printer.await {
        warn!(error = %e, "Event printer stopped unexpectedly");
    }

    println!();
    println!("  Agent:    {agent_id}");
    println!("  Cycles:   {cycles}");
    println!("  Tokens:   {}", totals.total_tokens());
    println!("  Cost:     ${:.4}", totals.total_cost_usd);

    match result? {
        LoopOutcome::Completed(reason) => println!("  Finished: {reason}"),
        LoopOutcome::TerminatedByCycleLimit { cycles } => {
            println!("  Stopped after {cycles} cycles (limit reached). Resume with `thinkloop resume {agent_id}`")
        }
        LoopOutcome::TerminatedByBudget { cost_usd, tokens } => {
            println!("  Budget exhausted (${cost_usd:.4}, {tokens} tokens)")
        }
        LoopOutcome::Cancelled => {
            println!("  Cancelled. Resume with `thinkloop resume {agent_id}`")
        }
    }
    Ok(())
}

/// Print episode summaries and escalations until the bus closes.
/// Resolves to the number of lines printed.
fn spawn_event_printer(mut events: broadcast::Receiver<Arc<DomainEvent>>) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut printed = 0;
        loop {
            match events.recv().await {
                Ok(event) => match &*event {
                    DomainEvent::EpisodeRecorded { summary, .. } => {
                        println!("  SYSTEM: {summary}\n");
                        printed += 1;
                    }
                    DomainEvent::Escalated { reason, to_model, .. } => {
                        println!("  Switching to {to_model}: {reason}");
                        printed += 1;
                    }
                    _ => {}
                },
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event printer fell behind"),
                Err(RecvError::Closed) => break,
            }
        }
        printed
    })
}
