#![warn(clippy::all, clippy::pedantic)]

use std::{collections::BTreeMap, path::PathBuf};

use checkup::rpc::{AgentClient, AgentService, ManagerStats};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use tracing::{error, info};

mod apply;
mod config;
mod diff;
mod error;

use config::Config;
use diff::CheckDiff;
use error::AppError;

/// Uppe central, distributes checks over a fleet of agents
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Configuration file, created with defaults when missing
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Push the additions and removals of a diff file to the agents
    Apply { diff: PathBuf },
    /// Print the check ids of every agent
    List,
    /// Print the scheduler status of every agent
    Stats {
        /// Print JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenv().ok();
    let cli = Cli::parse();

    let config = Config::from_config(cli.config.as_ref())?;
    logger::init_with(&config.log);

    let result = run(cli.command, &config).await;
    if let Err(err) = &result {
        error!("{err}");
    }
    result
}

async fn run(command: Command, config: &Config) -> Result<(), AppError> {
    if config.agents.is_empty() {
        return Err(AppError::NoAgents);
    }
    let agents: Vec<(String, AgentClient)> = config
        .agents
        .iter()
        .map(|address| (address.clone(), AgentClient::new(address.as_str()).with_timeout(config.timeout)))
        .collect();

    match command {
        Command::Apply { diff } => {
            let diff = CheckDiff::from_file(&diff)?;
            let report = apply::apply(&agents, &diff).await;

            for placement in &report.placed {
                println!("placed {} on {}", placement.check_id, placement.agent);
            }
            for id in &report.removed {
                println!("removed {id}");
            }
            for failure in &report.failed {
                println!("failed {}: {}", failure.check_id, failure.reason);
            }
            info!(
                placed = report.placed.len(),
                removed = report.removed.len(),
                unreachable = report.unreachable.len(),
                "diff applied"
            );

            if !report.is_success() {
                return Err(AppError::Incomplete(report.failed.len()));
            }
        }
        Command::List => {
            for (name, agent) in &agents {
                let list = agent
                    .list_checks()
                    .await
                    .map_err(|source| AppError::Rpc { agent: name.clone(), source })?;
                println!("{name}: {}", list.ids.join(", "));
            }
        }
        Command::Stats { json } => {
            for (name, agent) in &agents {
                let stats = agent
                    .get_manager_stats()
                    .await
                    .map_err(|source| AppError::Rpc { agent: name.clone(), source })?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&BTreeMap::from([(name, &stats)]))?);
                } else {
                    print_stats(name, &stats);
                }
            }
        }
    }

    Ok(())
}

fn print_stats(agent: &str, stats: &ManagerStats) {
    println!("{agent}");
    for (id, status) in &stats.controllers {
        println!(
            "  {id} ({}): every {}, {} ok, {} failed, {} in a row",
            status.name,
            humantime::format_duration(status.config.interval),
            status.run.success_count,
            status.run.failure_count,
            status.run.consecutive_failure_count,
        );
        if let Some(err) = &status.run.last_error {
            println!("    last error: {err}");
        }
    }
}
