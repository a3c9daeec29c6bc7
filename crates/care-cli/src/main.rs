//! Command-line driver for the care recommendation engine
//!
//! Wires `care-core` to a TOML configuration file, a JSON state file and
//! OpenAI-compatible providers, runs one inbound call and prints its outcome.
//!
//! # Usage
//!
//! ```bash
//! care-cli --config engine.toml --state state.json directive --subject s1 \
//!     --id d1 --category diet --text "Two portions of vegetables with dinner"
//! care-cli --state state.json submit --subject s1 --score diet=2 --score exercise=7
//! care-cli --config engine.toml --state state.json chat --subject s1 --text "What next?"
//! care-cli --state state.json usage --subject s1 --feature keep_going
//! RUST_LOG=care_core=debug care-cli --state state.json chat --subject s1 --text hi --connectivity offline
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use care_core::{
    Category, ConnectivityLevel, Directive, EngineConfig, EngineError, EventBus, FeatureId,
    MemoryStore, ProviderRegistry, ScoreSubmission, SupervisorOrchestrator,
};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Engine configuration (TOML). Defaults plus CARE_* overrides when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON state file standing in for the storage service
    #[arg(long, default_value = "care-state.json")]
    state: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send one conversational message
    Chat {
        #[arg(long)]
        subject: String,
        #[arg(long)]
        text: String,
        #[arg(long, default_value = "full")]
        connectivity: ConnectivityLevel,
    },
    /// Submit the day's scores
    Submit {
        #[arg(long)]
        subject: String,
        /// Defaults to today (UTC)
        #[arg(long)]
        date: Option<NaiveDate>,
        /// `category=value`, repeatable
        #[arg(long = "score", value_parser = parse_score, required = true)]
        scores: Vec<(Category, i64)>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Record one feature use
    Usage {
        #[arg(long)]
        subject: String,
        #[arg(long)]
        feature: FeatureId,
    },
    /// Add or replace a clinician directive in the state file
    Directive {
        #[arg(long)]
        subject: String,
        #[arg(long)]
        id: String,
        #[arg(long)]
        category: Category,
        #[arg(long)]
        text: String,
        #[arg(long, default_value_t = false)]
        inactive: bool,
    },
}

fn parse_score(raw: &str) -> Result<(Category, i64), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected category=value, got '{}'", raw))?;
    let value = value
        .trim()
        .parse::<i64>()
        .map_err(|e| format!("invalid score '{}': {}", value, e))?;
    Ok((Category::parse(name), value))
}

fn load_config(path: Option<&PathBuf>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => {
            let config = EngineConfig::from_env();
            config.validate()?;
            Ok(config)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "care_core=info,care_cli=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(args.config.as_ref())?;
    let store = Arc::new(
        MemoryStore::load(&args.state)
            .with_context(|| format!("loading state from {}", args.state.display()))?,
    );

    let registry = ProviderRegistry::from_config(
        &config.providers,
        &config.consensus.circuit_breaker,
        config.consensus.deadline(),
    )?;
    if registry.is_empty() {
        warn!("No providers configured, online replies will use the apology");
    }

    let bus = EventBus::new().shared();
    let mut events = bus.subscribe();
    let engine = SupervisorOrchestrator::new(config, Arc::new(registry), store.clone(), bus);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let output = match args.command {
        Command::Chat {
            subject,
            text,
            connectivity,
        } => {
            let outcome = engine
                .handle_subject_message(&subject, &text, connectivity, &cancel)
                .await?;
            json!({ "status": "ok", "outcome": outcome })
        }
        Command::Submit {
            subject,
            date,
            scores,
            notes,
        } => {
            let date = date.unwrap_or_else(|| Utc::now().date_naive());
            let mut submission = ScoreSubmission::new(subject, date);
            for (category, value) in scores {
                submission = submission.with_score(category, value);
            }
            submission.notes = notes;

            match engine.handle_score_submission(&submission).await {
                Ok(outcome) => json!({ "status": "ok", "outcome": outcome }),
                Err(
                    e @ (EngineError::DuplicateSubmission { .. }
                    | EngineError::InvalidScore { .. }
                    | EngineError::EmptySubmission),
                ) => {
                    info!(error = %e, "Submission rejected");
                    json!({ "status": "rejected", "message": e.user_message() })
                }
                Err(e) => return Err(e.into()),
            }
        }
        Command::Usage { subject, feature } => {
            let outcome = engine.handle_feature_usage(&subject, feature).await;
            json!({ "status": "ok", "outcome": outcome })
        }
        Command::Directive {
            subject,
            id,
            category,
            text,
            inactive,
        } => {
            let mut directive = Directive::new(id, subject, category, text);
            if inactive {
                directive = directive.inactive();
            }
            info!(directive_id = %directive.id, "Saving directive");
            store.add_directive(directive.clone()).await;
            json!({ "status": "saved", "directive": directive })
        }
    };

    let applied = store.drain(&mut events).await;
    store
        .save(&args.state)
        .await
        .with_context(|| format!("saving state to {}", args.state.display()))?;
    info!(applied, state = %args.state.display(), "State saved");

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
