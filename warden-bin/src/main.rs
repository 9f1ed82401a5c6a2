use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use warden_capability::register_builtins;
use warden_config::ConfigLoader;
use warden_core::{ActionKind, ActionRequest, EventBus, WardenError};
use warden_gateway::{CapabilityRegistry, Gateway};
use warden_safety::{ApprovalBroker, BudgetLedger, GuardrailEngine, LedgerStore, PolicyRuleSet};

mod notifier;

use notifier::CliNotifier;

#[derive(Parser)]
#[command(name = "warden", version, about = "Action-safety gateway for autonomous agents")]
struct Cli {
    /// Path to warden.toml (default: ~/.warden/warden.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit one action through the gateway and print the outcome
    Submit {
        /// Action kind (read_file, write_file, delete_file, run_command,
        /// install_package, invoke_model)
        #[arg(long)]
        kind: String,
        /// Handler parameters as a JSON object
        #[arg(long, default_value = "{}")]
        params: String,
        /// Estimated USD cost (model-invoking kinds only)
        #[arg(long)]
        cost: Option<f64>,
        #[arg(long, default_value = "cli")]
        requester: String,
        #[arg(long, default_value = "submitted from the command line")]
        reason: String,
    },
    /// Show the current budget period
    Budget,
    /// Show the effective policy table
    Policy,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> warden_core::Result<()> {
    let cli = Cli::parse();

    let loader = ConfigLoader::load(cli.config.as_deref())?;
    let config = loader.into_config();

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Submit {
            kind,
            params,
            cost,
            requester,
            reason,
        } => {
            let kind = ActionKind::from_str(&kind)
                .map_err(|e| WardenError::Other(anyhow::anyhow!(e)))?;
            let params: serde_json::Value = serde_json::from_str(&params)?;

            let events = EventBus::default();
            let policy = PolicyRuleSet::from_config(&config)?;
            let mut ledger = BudgetLedger::new(
                config.budget.daily_cap_usd,
                config.budget.utc_offset_hours,
                config.budget.low_water_fraction,
                events.clone(),
            );
            if let Some(path) = &config.budget.ledger_path {
                ledger = ledger.with_store(LedgerStore::open(path)?)?;
            }
            let broker = ApprovalBroker::new(events.clone());
            let notifier = Arc::new(CliNotifier::new(Arc::clone(&broker), events.clone()));

            let mut registry = CapabilityRegistry::new();
            register_builtins(&mut registry, &config)?;

            let gateway = Gateway::new(
                policy,
                Arc::new(ledger),
                broker,
                registry,
                notifier,
                events,
                Duration::from_secs(config.approval.timeout_secs),
            )
            .with_guardrails(GuardrailEngine::from_config(&config));

            let mut request = ActionRequest::new(kind, params, &requester, &reason);
            if let Some(cost) = cost {
                request = request.with_cost(cost);
            }

            let result = gateway.submit(request).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if let Some(entry) = gateway.audit().entries().last() {
                println!("audit: {}", serde_json::to_string(entry)?);
            }
        }
        Commands::Budget => {
            let events = EventBus::default();
            let mut ledger = BudgetLedger::new(
                config.budget.daily_cap_usd,
                config.budget.utc_offset_hours,
                config.budget.low_water_fraction,
                events,
            );
            if let Some(path) = &config.budget.ledger_path {
                ledger = ledger.with_store(LedgerStore::open(path)?)?;
            }
            let period = ledger.snapshot();
            println!(
                "day {}: spent ${:.4} of ${:.4} ({} transactions, ${:.4} remaining)",
                period.day_key,
                period.spent_usd,
                period.cap_usd,
                period.transactions.len(),
                ledger.remaining(),
            );
        }
        Commands::Policy => {
            let policy = PolicyRuleSet::from_config(&config)?;
            for (kind, tier) in policy.entries() {
                println!("{kind:<16} {tier}");
            }
            println!("(unmapped kinds require approval)");
        }
    }

    Ok(())
}
