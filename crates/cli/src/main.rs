//! thinkloop CLI: the main entry point.
//!
//! Commands:
//! - `run`     Create an agent from the config and flags, then run it
//! - `resume`  Continue a saved agent
//! - `list`    Show saved agents
//! - `config`  Write, print, or locate the configuration file

use clap::{Parser, Subcommand};

mod commands;
mod console;
mod session;

#[derive(Parser)]
#[command(
    name = "thinkloop",
    about = "thinkloop: an autonomous agent that works toward goals one command at a time",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new agent and run it
    Run(commands::run::RunArgs),

    /// Continue a saved agent
    Resume {
        /// Id printed when the agent was created
        agent_id: String,
    },

    /// List saved agents
    List,

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a starter config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration
    Show,
    /// Print the config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run(args) => commands::run::run(args).await?,
        Commands::Resume { agent_id } => commands::resume::run(&agent_id).await?,
        Commands::List => commands::list::run().await?,
        Commands::Config { action } => match action {
            ConfigAction::Init { force } => commands::config_cmd::init(force).await?,
            ConfigAction::Show => commands::config_cmd::show().await?,
            ConfigAction::Path => commands::config_cmd::path().await?,
        },
    }

    Ok(())
}
