//! Command-line access to the agent API.
//!
//! Uses the same environment as the service, so with the SQLite or JSON
//! backend it sees the service's history, cooldowns and rate-limit windows.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use goahead::application::system::Application;
use goahead::config::Config;
use goahead::domain::agents::AgentInput;
use goahead::domain::scope::Timeframe;
use goahead::interfaces::api::{ApiError, ApiResult, RecomputeScope};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::Level;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Run against a throwaway in-memory store with demo agents
    #[arg(long)]
    in_memory: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered agents and their state
    Agents,
    /// Run one agent through the guard pipeline
    Run {
        agent: String,
        #[arg(short, long, default_value = "all")]
        product: String,
        #[arg(short, long, default_value = "All")]
        timeframe: String,
        #[arg(long)]
        symbol: Option<String>,
        /// Extra input context as a JSON object
        #[arg(long)]
        context: Option<String>,
        /// Bypass the cooldown (rate limits still apply)
        #[arg(short, long)]
        force: bool,
    },
    Enable {
        agent: String,
    },
    Disable {
        agent: String,
    },
    /// Recent runs, newest first
    History {
        agent: String,
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Show or recompute KPIs
    Kpis {
        #[arg(short, long)]
        timeframe: Option<String>,
        #[arg(short, long)]
        product: Option<String>,
        #[arg(long)]
        recompute: bool,
    },
    /// Evaluate the retraining policy for one scope
    Trainer {
        #[arg(short, long, default_value = "equities")]
        product: String,
        #[arg(short, long, default_value = "5D")]
        timeframe: String,
        #[arg(short, long)]
        force: bool,
        /// Show recent decisions instead of evaluating
        #[arg(long)]
        decisions: Option<usize>,
        /// Show last retrain and cooldown per timeframe of the product
        #[arg(long, conflicts_with = "decisions")]
        status: bool,
    },
    /// Orchestrator counters since start
    Metrics,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::WARN.into()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = if cli.in_memory {
        Config::in_memory()
    } else {
        Config::from_env()?
    };

    let app = Application::build(config).await?;
    app.orchestrator.start().await;
    let api = app.api();

    let ok = match cli.command {
        Commands::Agents => print(api.list_agents().await)?,
        Commands::Run {
            agent,
            product,
            timeframe,
            symbol,
            context,
            force,
        } => {
            let timeframe: Timeframe = timeframe.parse()?;
            let mut input = AgentInput::new(product, timeframe);
            input.symbol = symbol;
            if let Some(raw) = context {
                let context: Map<String, Value> =
                    serde_json::from_str(&raw).context("--context must be a JSON object")?;
                input.context = context;
            }
            print(api.run_agent(&agent, input, force).await)?
        }
        Commands::Enable { agent } => print(api.enable_agent(&agent).await)?,
        Commands::Disable { agent } => print(api.disable_agent(&agent).await)?,
        Commands::History { agent, limit } => print(api.get_history(&agent, limit).await)?,
        Commands::Kpis {
            timeframe,
            product,
            recompute,
        } => {
            if recompute {
                let scope = match product {
                    Some(product) => RecomputeScope::Product(product),
                    None => RecomputeScope::Overall,
                };
                let timeframe = timeframe.unwrap_or_else(|| "All".to_string());
                print(api.recompute_kpis(scope, &timeframe).await)?
            } else {
                print(api.get_kpis(timeframe.as_deref(), product.as_deref()).await)?
            }
        }
        Commands::Trainer {
            product,
            timeframe,
            force,
            decisions,
            status,
        } => match decisions {
            Some(limit) => print(api.trainer_decisions(limit).await)?,
            None if status => print(api.trainer_status(Some(&product)).await)?,
            None => print(api.run_trainer(&product, &timeframe, force).await)?,
        },
        Commands::Metrics => print(api.get_orchestrator_metrics().await)?,
    };

    app.shutdown().await;
    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

/// Prints the response or the error body as JSON. Returns whether it succeeded.
fn print<T: Serialize>(result: ApiResult<T>) -> Result<bool> {
    let (json, ok) = match result {
        Ok(response) => (serde_json::to_string_pretty(&response)?, true),
        Err(error) => (error_body(&error)?, false),
    };
    println!("{}", json);
    Ok(ok)
}

fn error_body(error: &ApiError) -> Result<String> {
    let mut body = serde_json::to_value(error)?;
    body["status"] = Value::from(error.status);
    Ok(serde_json::to_string_pretty(&body)?)
}
