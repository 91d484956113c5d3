//! hivemind command implementations

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use hivemind_capability::{register_builtin, CapabilityRegistry};
use hivemind_config::{self, Config};
use hivemind_engine::{LlmPlanner, MissionEngine};
use hivemind_mission::{Mission, MissionStatus};
use hivemind_provider::openrouter::OpenRouterProvider;
use hivemind_store::{JsonStateStore, StateStore};

type Engine = MissionEngine<LlmPlanner<OpenRouterProvider>>;

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━";

/// `show` alias for the newest mission
const LAST: &str = "last";

fn build_registry(config: &Config) -> Result<CapabilityRegistry> {
    let mut registry = CapabilityRegistry::with_timeout(config.step_timeout());
    register_builtin(&mut registry, config).context("Failed to register capability providers")?;
    Ok(registry)
}

async fn open_store(config: &Config) -> Result<JsonStateStore> {
    let dir = config.state_dir();
    JsonStateStore::open(&dir)
        .await
        .with_context(|| format!("Failed to open mission store at {}", dir.display()))
}

/// Engine wired to the configured planner endpoint. Commands that never
/// reach the planner work without an API key.
async fn build_engine(config: &Config) -> Result<Engine> {
    let registry = build_registry(config)?;
    let store = open_store(config).await?;
    let provider = OpenRouterProvider::new(
        config.api_key().unwrap_or_default(),
        config.api_base(),
        Some(config.model()),
    );
    let planner = LlmPlanner::from_config(provider, config);
    Ok(MissionEngine::from_config(
        Arc::new(registry),
        planner,
        Arc::new(store),
        config,
    ))
}

fn require_api_key(config: &Config) -> Result<()> {
    if !config.has_api_key() {
        anyhow::bail!(
            "No API key configured. Set planner.api_key in {} or {}",
            hivemind_config::config_path().display(),
            hivemind_config::ENV_API_KEY
        );
    }
    Ok(())
}

/// Cancel the engine's token on Ctrl+C
fn cancel_on_interrupt(engine: &Engine) {
    let token = engine.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("◆ Interrupt received, stopping mission");
            eprintln!("\n◆ Interrupted, cancelling mission...");
            token.cancel();
        }
    });
}

/// Initialize config, workspace and mission store
pub async fn init_command() -> Result<()> {
    println!("◆ Initializing hivemind...");
    println!("{RULE}");

    let config = hivemind_config::init().await?;

    println!("Config:    {}", hivemind_config::config_path().display());
    println!("Workspace: {}", config.workspace_path().display());
    println!("Missions:  {}", config.state_dir().display());

    println!("\n◆ hivemind initialized");
    println!("\nNext steps:");
    println!(
        "  1. Add your API key to {}",
        hivemind_config::config_path().display()
    );
    println!("     Get one at: https://openrouter.ai/keys");
    println!("  2. Start a mission: hivemind run \"list the files in my workspace\"");

    Ok(())
}

/// Plan and execute a new mission
pub async fn run_command(goal: String) -> Result<()> {
    let config = Config::load().await?;
    require_api_key(&config)?;

    let workspace = config.workspace_path();
    hivemind_config::paths::ensure_dir(&workspace)
        .await
        .with_context(|| format!("Failed to create workspace {}", workspace.display()))?;

    let engine = build_engine(&config).await?;
    cancel_on_interrupt(&engine);

    println!("◆ Mission: {}", goal);
    let mission = engine.execute_mission(&goal).await;
    print_mission(&mission);
    Ok(())
}

/// Continue an unfinished mission
pub async fn resume_command(id: String) -> Result<()> {
    let config = Config::load().await?;
    require_api_key(&config)?;
    let engine = build_engine(&config).await?;
    cancel_on_interrupt(&engine);

    let mission = engine
        .resume(&id)
        .await
        .with_context(|| format!("Could not resume mission {id}"))?;
    print_mission(&mission);
    Ok(())
}

/// Submit operator guidance, then resume the mission
pub async fn feedback_command(id: String, text: String) -> Result<()> {
    let config = Config::load().await?;
    require_api_key(&config)?;
    let engine = build_engine(&config).await?;

    let mission = engine
        .submit_feedback(&id, &text)
        .await
        .with_context(|| format!("Could not submit feedback for mission {id}"))?;

    if mission.status == MissionStatus::AwaitingHuman {
        warn!("◆ No new plan from guidance, mission {} still waiting", id);
        print_mission(&mission);
        return Ok(());
    }

    cancel_on_interrupt(&engine);
    let mission = engine
        .resume(&id)
        .await
        .with_context(|| format!("Could not resume mission {id}"))?;
    print_mission(&mission);
    Ok(())
}

/// Cancel an unfinished mission
pub async fn cancel_command(id: String, reason: String) -> Result<()> {
    let config = Config::load().await?;
    let engine = build_engine(&config).await?;

    let mission = engine
        .cancel(&id, &reason)
        .await
        .with_context(|| format!("Could not cancel mission {id}"))?;
    println!("✓ Mission {} cancelled", mission.id);
    Ok(())
}

/// Show one mission
pub async fn show_command(id: String, json: bool) -> Result<()> {
    let config = Config::load().await?;
    let store = open_store(&config).await?;

    let mission = if id == LAST {
        store.last().await?.context("No missions yet")?
    } else {
        store
            .load(&id)
            .await
            .with_context(|| format!("Could not load mission {id}"))?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&mission)?);
    } else {
        print_mission(&mission);
    }
    Ok(())
}

/// List recent missions
pub async fn history_command(limit: usize) -> Result<()> {
    let config = Config::load().await?;
    let store = open_store(&config).await?;

    let history = store.history(limit).await?;
    if history.is_empty() {
        println!("No missions yet");
        return Ok(());
    }

    println!("◆ Recent missions");
    println!("{RULE}");
    for summary in history {
        println!(
            "{}  {:<14} {}/{} steps  {}  {}",
            summary.id,
            summary.status.as_str(),
            summary.steps_succeeded,
            summary.steps_total,
            summary.created_at.format("%Y-%m-%d %H:%M"),
            summary.goal
        );
    }
    Ok(())
}

/// List capability providers and their actions
pub async fn capabilities_command() -> Result<()> {
    let config = Config::load().await?;
    let registry = build_registry(&config)?;

    println!("◆ Capabilities");
    println!("{RULE}");
    for descriptor in registry.describe_all() {
        println!("{}: {}", descriptor.name, descriptor.description);
        for action in &descriptor.actions {
            let params: Vec<String> = action
                .params
                .iter()
                .map(|p| {
                    if p.required {
                        p.name.clone()
                    } else {
                        format!("[{}]", p.name)
                    }
                })
                .collect();
            println!("  {}({}) {}", action.name, params.join(", "), action.description);
        }
    }
    Ok(())
}

/// Show status
pub async fn status_command() -> Result<()> {
    let config_path = hivemind_config::config_path();

    println!("◆ hivemind System Status");
    println!("{RULE}");
    println!(
        "Config:    {} {}",
        config_path.display(),
        if config_path.exists() {
            "[OK]"
        } else {
            "[Missing]"
        }
    );

    let config = Config::load().await?;
    let workspace = config.workspace_path();
    let state_dir = config.state_dir();
    println!(
        "Workspace: {} {}",
        workspace.display(),
        if workspace.exists() { "[OK]" } else { "[Missing]" }
    );
    println!(
        "Missions:  {} {}",
        state_dir.display(),
        if state_dir.exists() { "[OK]" } else { "[Missing]" }
    );
    println!("Model:     {}", config.model());
    println!(
        "API Key:   {}",
        if config.has_api_key() {
            "[Set]"
        } else {
            "[Missing]"
        }
    );
    println!(
        "Search:    {}",
        if config.search_api_key().is_some() {
            "[Set]"
        } else {
            "[Missing]"
        }
    );
    println!(
        "Policy:    {} retries, {} replans, {} escalations",
        config.engine.retry_limit, config.engine.replan_limit, config.engine.escalation_budget
    );

    if state_dir.exists() {
        let store = JsonStateStore::new(&state_dir);
        match store.load_all().await {
            Ok(missions) => {
                let open = missions.iter().filter(|m| !m.is_terminal()).count();
                println!("Stored:    {} missions ({} open)", missions.len(), open);
            }
            Err(e) => warn!("◆ Could not read mission store: {}", e),
        }
    }

    println!("\n◆ Ready");
    Ok(())
}

fn print_mission(mission: &Mission) {
    println!("\n◆ Mission {}", mission.id);
    println!("{RULE}");
    println!("Goal:    {}", mission.goal);
    println!("Status:  {}", mission.status);
    println!(
        "Created: {}",
        mission.created_at.format("%Y-%m-%d %H:%M:%S")
    );

    if !mission.steps.is_empty() {
        println!("Steps:");
        for step in &mission.steps {
            let observation = step.observation.as_deref().unwrap_or("");
            println!(
                "  #{} [{}] {} {}",
                step.index,
                step.status,
                step.label(),
                observation
            );
        }
    }

    match mission.status {
        MissionStatus::Completed => {
            if let Some(result) = &mission.result {
                let rendered = match result {
                    serde_json::Value::String(s) => s.clone(),
                    other => serde_json::to_string_pretty(other).unwrap_or_default(),
                };
                println!("Result:\n{}", rendered);
            }
        }
        MissionStatus::Failed => {
            if let Some(error) = &mission.error {
                println!("Error:   {}", error);
            }
        }
        MissionStatus::AwaitingHuman => {
            if let Some(question) = &mission.question {
                println!("Question: {}", question);
            }
            println!(
                "\nAnswer with: hivemind feedback {} \"<guidance>\"",
                mission.id
            );
        }
        _ => {
            println!("\nContinue with: hivemind resume {}", mission.id);
        }
    }
}
