use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod dataset;
mod db;
mod decide;
mod error;
mod fomo;
mod models;
mod oracle;
mod report;

use config::RuleConfig;
use decide::{NudgeDecider, OraclePolicy};
use models::AnalyzeRequest;
use oracle::OracleSet;
use report::Outcome;

#[derive(Parser)]
#[command(name = "fomo-nudge")]
#[command(about = "Scores event FOMO and decides which engagement nudges to show", long_about = None)]
struct Cli {
    /// Rules file (JSON); built-in rules are used when omitted
    #[arg(long, global = true, env = "NUDGE_RULES")]
    rules: Option<PathBuf>,
    /// Resume classifier exported as JSON coefficients
    #[arg(long, global = true, env = "RESUME_MODEL")]
    resume_model: Option<PathBuf>,
    /// Event classifier exported as JSON coefficients
    #[arg(long, global = true, env = "EVENT_MODEL")]
    event_model: Option<PathBuf>,
    /// Skip unloaded models instead of rejecting requests
    #[arg(long, global = true)]
    rule_only: bool,
    /// Evaluate as of this date (YYYY-MM-DD) instead of the current UTC date
    #[arg(long, global = true)]
    today: Option<NaiveDate>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decide nudges for one user and print the response JSON
    Analyze {
        #[arg(long)]
        input: PathBuf,
        /// Store the decision in the Postgres nudge log
        #[arg(long)]
        record: bool,
    },
    /// Explain a user's FOMO score
    Insights {
        #[arg(long)]
        input: PathBuf,
    },
    /// Analyze a JSON array of users and write a markdown report
    Batch {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, default_value = "nudge-report.md")]
        out: PathBuf,
    },
    /// Export labelled training features as CSV
    Export {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, default_value = "processed_fomo_dataset.csv")]
        out: PathBuf,
    },
    /// Create or upgrade the nudge log schema
    InitDb,
    /// Show recorded nudges for a user
    History {
        #[arg(long)]
        user_id: String,
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

fn build_decider(cli: &Cli) -> anyhow::Result<NudgeDecider> {
    let rules = match &cli.rules {
        Some(path) => RuleConfig::load(path)?,
        None => RuleConfig::default(),
    };
    let oracles = OracleSet::load(cli.resume_model.as_deref(), cli.event_model.as_deref())?;
    let policy = if cli.rule_only {
        OraclePolicy::RuleOnly
    } else {
        OraclePolicy::Strict
    };
    Ok(NudgeDecider::new(Arc::new(rules), oracles, policy))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fomo_nudge=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let today = cli.today.unwrap_or_else(|| Utc::now().date_naive());

    match &cli.command {
        Commands::Analyze { input, record } => {
            let decider = build_decider(&cli)?;
            let request: AnalyzeRequest = read_json(input)?;
            let decision = decider.analyze(&request, today)?;

            if *record {
                let pool = db::connect().await?;
                let id = db::record_decision(&pool, &decision, today).await?;
                tracing::info!(%id, user_id = %request.user_id, "decision recorded");
            }

            println!("{}", serde_json::to_string_pretty(&decision.response)?);
        }
        Commands::Insights { input } => {
            let request: AnalyzeRequest = read_json(input)?;
            request.validate()?;
            let insights = fomo::insights(
                &request.profile,
                &request.activity,
                &request.peer_snapshot,
                today,
            )?;
            println!("{}", serde_json::to_string_pretty(&insights)?);
        }
        Commands::Batch { input, out } => {
            let decider = build_decider(&cli)?;
            let requests: Vec<AnalyzeRequest> = read_json(input)?;
            let outcomes: Vec<Outcome> = requests
                .iter()
                .map(|request| match decider.analyze(request, today) {
                    Ok(decision) => Outcome::Decided(decision),
                    Err(err) => Outcome::Rejected {
                        user_id: request.user_id.clone(),
                        reason: err.to_string(),
                    },
                })
                .collect();

            let label = input.display().to_string();
            let report = report::build_report(&label, today, &outcomes);
            std::fs::write(out, report)?;
            println!("Report for {} users written to {}.", outcomes.len(), out.display());
        }
        Commands::Export { input, out } => {
            let requests: Vec<AnalyzeRequest> = read_json(input)?;
            let rows = dataset::build_rows(&requests, today);
            let file = std::fs::File::create(out)
                .with_context(|| format!("failed to create {}", out.display()))?;
            dataset::write_features(&rows, file)?;
            println!("Wrote {} of {} rows to {}.", rows.len(), requests.len(), out.display());
        }
        Commands::InitDb => {
            let pool = db::connect().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::History { user_id, limit } => {
            let pool = db::connect().await?;
            let history = db::fetch_history(&pool, user_id, *limit).await?;

            if history.is_empty() {
                println!("No nudges recorded for {user_id}.");
                return Ok(());
            }

            println!("Recent nudges for {user_id}:");
            for entry in history.iter() {
                println!(
                    "- {} [{}] {} ({}, fomo {:.2})",
                    entry.decided_on, entry.kind, entry.title, entry.priority, entry.fomo_score
                );
            }
        }
    }

    Ok(())
}
