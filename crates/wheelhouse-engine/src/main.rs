//! CLI entry point for the wheelhouse mission engine.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};
use uuid::Uuid;

use wheelhouse_core::{EngineConfig, LogbookConfig, MissionId};
use wheelhouse_logbook::{FileLogbook, Logbook, LogbookError};

use wheelhouse_engine::briefing::render_briefing;
use wheelhouse_engine::scheduler::execution_order;
use wheelhouse_engine::{ExecutorRegistry, JsonOrderParser, MissionEngine};

#[derive(Parser)]
#[command(name = "wheelhouse")]
#[command(about = "Mission orchestration for bounded-context AI agents")]
struct Cli {
    /// Config file prefix (default: wheelhouse).
    #[arg(short, long, default_value = "wheelhouse", global = true)]
    config: String,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate an order file and show its execution order and first briefing.
    Inspect {
        /// Order document in JSON form.
        order: PathBuf,
    },
    /// Print the recorded executions of a mission from the logbook.
    History {
        #[arg(long)]
        mission_id: String,
    },
    /// Print the effective engine configuration.
    ShowConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if cli.json {
        fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Command::Inspect { order } => inspect(&cli.config, &order).await,
        Command::History { mission_id } => history(&cli.config, &mission_id),
        Command::ShowConfig => {
            let config = EngineConfig::load(&cli.config)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

async fn inspect(config_prefix: &str, path: &Path) -> anyhow::Result<()> {
    let request = std::fs::read_to_string(path)?;
    let config = EngineConfig::load(config_prefix)?;

    let engine = MissionEngine::new(config, ExecutorRegistry::new());
    let mission_id = engine
        .start_mission_from_order(&JsonOrderParser, &request)
        .await?;
    tracing::debug!(mission_id = %mission_id, "Order accepted");

    let mission = engine
        .mission()
        .await
        .ok_or_else(|| anyhow::anyhow!("mission vanished after start"))?;

    println!("Mission: {} ({} steps)", mission.title, mission.total_steps());
    println!("Execution order:");
    for (position, step_id) in execution_order(&mission).iter().enumerate() {
        if let Some(step) = mission.step(*step_id) {
            println!(
                "  {}. #{} [{}] {}",
                position + 1,
                step.step_id,
                step.assigned_role,
                step.description
            );
        }
    }
    println!();

    let context = engine.build_context(None).await?;
    print!("{}", render_briefing(&context));
    Ok(())
}

fn history(config_prefix: &str, raw_id: &str) -> anyhow::Result<()> {
    let mission_id = MissionId(Uuid::parse_str(raw_id)?);
    let config = LogbookConfig::load(config_prefix)?;
    let logbook = FileLogbook::new(&config.dir)?;

    match logbook.load_mission(mission_id) {
        Ok(record) => println!(
            "Mission: {} [{}] progress {}%",
            record.mission.title,
            record.mission.status,
            record.mission.progress()
        ),
        Err(LogbookError::MissionNotFound(_)) => {
            anyhow::bail!("Mission {mission_id} not found in {}", config.dir)
        }
        Err(e) => return Err(e.into()),
    }

    let records = logbook.list_executions(mission_id)?;
    if records.is_empty() {
        println!("No executions recorded.");
    }
    for record in records {
        println!(
            "{} step #{} [{}] retries {} {:?}: {}",
            record.recorded_at.to_rfc3339(),
            record.step_id,
            record.role,
            record.retry_count,
            record.entry.result,
            record.entry.action
        );
        for problem in &record.entry.problems {
            println!("    problem: {problem}");
        }
    }
    Ok(())
}
