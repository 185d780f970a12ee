use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use chat_response_eval::config::Config;
use chat_response_eval::output::{self, OutputFormat};
use chat_response_eval::report;
use chat_response_eval::runner::Runner;

/// Chat Response Evaluation CLI - Generate model responses and score them with evaluators
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML run file
    run_file: PathBuf,

    /// Output format: plain or json
    #[arg(short, long, default_value = "plain")]
    output: OutputFormat,

    /// Verbose output - log progress for each scenario
    #[arg(short, long)]
    verbose: bool,

    /// Dotenv file with API keys, loaded before the run file
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Execution name for reports (default: Execution-<UTC timestamp>)
    #[arg(long)]
    execution_name: Option<String>,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    if let Some(env_file) = &args.env_file {
        dotenvy::from_path(env_file)
            .with_context(|| format!("Failed to load env file: {}", env_file.display()))?;
    }

    let config = Config::from_file(&args.run_file)?;
    let execution_name = args
        .execution_name
        .unwrap_or_else(|| report::execution_name(chrono::Utc::now()));
    let runner = Runner::new(config, execution_name);
    tracing::info!(execution = runner.execution_name(), "Starting run");

    let outcomes = runner.run_scenarios().await?;

    output::print_results(&outcomes, args.output);

    let errored: Vec<&str> = outcomes
        .iter()
        .filter(|o| o.error.is_some())
        .map(|o| o.scenario.as_str())
        .collect();
    let failed: Vec<&str> = outcomes
        .iter()
        .filter(|o| !o.passed && o.error.is_none())
        .map(|o| o.scenario.as_str())
        .collect();

    match (errored.is_empty(), failed.is_empty()) {
        (true, true) => {}
        (true, false) => anyhow::bail!(
            "Evaluation did not meet the expected criteria: {}",
            failed.join(", ")
        ),
        (false, true) => anyhow::bail!("Scenarios failed to run: {}", errored.join(", ")),
        (false, false) => anyhow::bail!(
            "Scenarios failed to run: {}; did not meet the expected criteria: {}",
            errored.join(", "),
            failed.join(", ")
        ),
    }

    Ok(())
}
