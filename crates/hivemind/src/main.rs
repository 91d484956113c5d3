//! hivemind - autonomous mission engine

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{
    cancel_command, capabilities_command, feedback_command, history_command, init_command,
    resume_command, run_command, show_command, status_command,
};

/// hivemind - plan, execute and reflect on missions from your terminal
#[derive(Parser)]
#[command(name = "hivemind")]
#[command(about = "◆ An autonomous mission engine")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize config, workspace and mission store
    Init,
    /// Plan and execute a new mission
    Run {
        /// What the mission should achieve
        goal: String,
    },
    /// Continue an unfinished mission
    Resume {
        /// Mission ID
        id: String,
    },
    /// Answer a mission waiting on an operator, then resume it
    Feedback {
        /// Mission ID
        id: String,
        /// Guidance for the planner
        text: String,
    },
    /// Cancel an unfinished mission
    Cancel {
        /// Mission ID
        id: String,
        /// Recorded as the failure reason
        #[arg(short, long, default_value = "cancelled by operator")]
        reason: String,
    },
    /// Show one mission
    Show {
        /// Mission ID, or `last` for the newest mission
        id: String,
        /// Print the full record as JSON
        #[arg(long)]
        json: bool,
    },
    /// List recent missions, newest first
    History {
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// List capability providers and their actions
    Capabilities,
    /// Show system status
    Status,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let (label, result) = match cli.command {
        Commands::Init => ("Init", init_command().await),
        Commands::Run { goal } => ("Run", run_command(goal).await),
        Commands::Resume { id } => ("Resume", resume_command(id).await),
        Commands::Feedback { id, text } => ("Feedback", feedback_command(id, text).await),
        Commands::Cancel { id, reason } => ("Cancel", cancel_command(id, reason).await),
        Commands::Show { id, json } => ("Show", show_command(id, json).await),
        Commands::History { limit } => ("History", history_command(limit).await),
        Commands::Capabilities => ("Capabilities", capabilities_command().await),
        Commands::Status => ("Status", status_command().await),
    };

    if let Err(e) = result {
        error!("{} failed: {:#}", label, e);
        std::process::exit(1);
    }
}
