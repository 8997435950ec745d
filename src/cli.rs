//! CLI interface for mas-evolution

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value};

use crate::config::{self, Config};
use crate::server::McpServer;
use crate::tools::{execute_tool, ToolCall, ToolContext};

#[derive(Parser)]
#[command(name = "mas-evolution")]
#[command(about = "Track skill usage, spot weak skills and evolve them", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the evolution tools over MCP stdio (default when no command given)
    Serve,
    /// Record one skill invocation
    Track {
        /// Skill name
        skill: String,
        /// Mark the invocation as failed
        #[arg(long)]
        failed: bool,
        /// Execution time in seconds
        #[arg(short = 't', long)]
        time: Option<f64>,
        /// Tokens consumed
        #[arg(long)]
        tokens: Option<u64>,
        /// Error message of a failed invocation
        #[arg(short, long)]
        error: Option<String>,
    },
    /// Analyze performance patterns
    Analyze {
        /// Only report on this skill
        #[arg(short, long)]
        skill: Option<String>,
        /// Analysis timeframe (day, week, month, all)
        #[arg(long)]
        timeframe: Option<String>,
    },
    /// Generate improvement suggestions
    Improve {
        /// Filter by priority (high, medium, low)
        #[arg(short, long)]
        priority: Option<String>,
        /// Filter by type (optimization, fix, creation, composition)
        #[arg(short = 'T', long = "type")]
        suggestion_type: Option<String>,
    },
    /// Apply an optimization to a skill
    Evolve {
        /// Skill to improve
        skill: String,
        /// Metric to optimize (speed, reliability, tokens)
        metric: String,
        /// Apply without asking for confirmation
        #[arg(long)]
        auto: bool,
    },
    /// Compare two versions of a skill
    AbTest {
        /// Skill name
        skill: String,
        /// Version A identifier
        version_a: String,
        /// Version B identifier
        version_b: String,
        /// Number of test iterations
        #[arg(short, long)]
        iterations: Option<u32>,
    },
    /// Show or reset configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
        /// Reset configuration to defaults
        #[arg(long)]
        reset: bool,
    },
}

/// Run the CLI
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    let (name, arguments) = match cli.command {
        None | Some(Commands::Serve) => return serve().await,
        Some(Commands::Config { show, reset }) => {
            if reset {
                config::reset_config()?;
            } else if show {
                config::show_config()?;
            } else {
                print!("{}", config::default_config_toml());
            }
            return Ok(());
        }
        Some(Commands::Track { skill, failed, time, tokens, error }) => {
            let mut args = Map::new();
            args.insert("skillName".into(), json!(skill));
            args.insert("success".into(), json!(!failed));
            if let Some(time) = time {
                args.insert("executionTime".into(), json!(time));
            }
            if let Some(tokens) = tokens {
                args.insert("tokensUsed".into(), json!(tokens));
            }
            if let Some(error) = error {
                args.insert("error".into(), json!(error));
            }
            ("track_metrics", Value::Object(args))
        }
        Some(Commands::Analyze { skill, timeframe }) => (
            "analyze_performance",
            json!({ "skillName": skill, "timeframe": timeframe }),
        ),
        Some(Commands::Improve { priority, suggestion_type }) => (
            "generate_improvements",
            json!({ "priority": priority, "type": suggestion_type }),
        ),
        Some(Commands::Evolve { skill, metric, auto }) => (
            "apply_evolution",
            json!({ "skillName": skill, "metric": metric, "auto": auto }),
        ),
        Some(Commands::AbTest { skill, version_a, version_b, iterations }) => (
            "a_b_test",
            json!({
                "skillName": skill,
                "versionA": version_a,
                "versionB": version_b,
                "iterations": iterations
            }),
        ),
    };

    let ctx = ToolContext::from_config(&Config::load()?)?;
    let call = ToolCall {
        name: name.to_string(),
        arguments,
    };
    let result = execute_tool(&call, &ctx).await?;
    println!("{}", result.message);

    if !result.success {
        anyhow::bail!("{} did not complete", name);
    }
    Ok(())
}

async fn serve() -> Result<()> {
    let config = Config::load()?;
    let cache_dir = config.cache_dir()?;
    tracing::info!("Cache directory: {}", cache_dir.display());
    tracing::info!(
        "Metrics file: {}",
        cache_dir.join(crate::metrics::storage::METRICS_DOCUMENT).display()
    );

    let ctx = ToolContext::from_config(&config)?;
    McpServer::new(ctx).run_stdio().await
}
