//! txflow command line driver
//!
//! Runs one action through the full lifecycle against the simulated ledger:
//! resolve, estimate, submit, wait for confirmation. Lifecycle events are
//! printed to stdout as JSON lines; logs go to stderr.

#![deny(unused_imports)]
#![deny(unused_mut)]
#![deny(unused_variables)]
#![warn(unused_must_use)]

use anyhow::{bail, Context, Result};
use clap::Parser;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use txflow::actions::{descriptor_for, vest_required};
use txflow::config::{Config, LoggingConfig};
use txflow::ledger::SimulatedLedger;
use txflow::metrics::metrics;
use txflow::monitor::{ConfirmationOutcome, NotifyHub};
use txflow::orchestrator::{
    run_session, LifecycleEvent, SessionCommand, SessionHandle, SessionOptions, SubmitOutcome,
    TxOrchestrator,
};
use txflow::resolver::{SessionSnapshot, UserInput};
use txflow::types::{ActionKind, ReadModel};

/// How long to wait for the first estimate before giving up
const ESTIMATE_TIMEOUT: Duration = Duration::from_secs(30);

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "txflow.toml", env = "TXFLOW_CONFIG")]
    config: String,

    /// Action to run: deposit, migrate or mint
    #[arg(short, long)]
    action: ActionKind,

    /// Amount to mint (ignored by deposit and migrate)
    #[arg(long, conflicts_with = "max")]
    amount: Option<String>,

    /// Mint the maximum the collateral allows
    #[arg(long)]
    max: bool,

    /// Gas price in gwei (defaults to the configured price)
    #[arg(long)]
    gas_price: Option<Decimal>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Print collected metrics (prometheus text format) to stderr on exit
    #[arg(long)]
    metrics: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (config, found) = load_config(&args.config)?;
    init_logging(args.verbose, &config.logging)?;
    if !found {
        warn!("Config file '{}' not found, using defaults", args.config);
    }

    info!(version = env!("CARGO_PKG_VERSION"), action = %args.action, "Starting txflow");

    let input = if args.max {
        UserInput::max()
    } else {
        UserInput::custom(args.amount.clone().unwrap_or_default())
    };
    let derived = config.simulation.derived.clone();

    let descriptor = descriptor_for(args.action);
    match descriptor.resolve(&input, &derived) {
        Ok(Some(request)) => info!(request = ?request, "Resolved action"),
        Ok(None) => bail!("Nothing to {}: inputs do not resolve to an action", args.action),
        Err(err) => bail!("{}", err.user_message()),
    }
    if args.action == ActionKind::MigrateEscrow && vest_required(&derived) {
        warn!("Claimable escrow is present; vest it before migrating");
    }

    let ledger = Arc::new(SimulatedLedger::from_config(&config.simulation));
    let mut hub = NotifyHub::new();
    if let Some(ms) = config.simulation.auto_confirm_after_ms {
        let outcome = match &config.simulation.failure_reason {
            Some(reason) => ConfirmationOutcome::Failed(reason.clone()),
            None => ConfirmationOutcome::Confirmed,
        };
        hub = hub.with_auto_resolve(Duration::from_millis(ms), outcome);
    }

    let orch = TxOrchestrator::new(descriptor, ledger, Arc::new(hub), &config).with_refresher(
        Arc::new(|kind: ActionKind, targets: &[ReadModel]| {
            info!(action = %kind, targets = ?targets, "Refreshing read models");
        }),
    );
    let mut events = orch.subscribe_events();

    let (tx, rx) = mpsc::channel(config.session.command_buffer);
    let session = SessionHandle::new(tx);
    let options = SessionOptions {
        pending_warn_after: config
            .submission
            .pending_warn_after_secs
            .map(Duration::from_secs),
    };
    let task = tokio::spawn(run_session(orch, rx, options));

    if let Some(gwei) = args.gas_price {
        session.send(SessionCommand::SetGasPrice(gwei)).await;
    }
    session.send(SessionCommand::SetDerived(derived)).await;
    session.send(SessionCommand::SetInput(input)).await;
    session.send(SessionCommand::SetSession(SessionSnapshot::ready())).await;

    let result = drive(&session, &mut events).await;

    session.shutdown().await;
    let orch = task.await.context("Session task panicked")?;
    let stats = orch.stats();
    info!(
        state = ?orch.state(),
        estimates = stats.estimates_requested,
        submissions = stats.submissions,
        confirmed = stats.confirmed,
        failed = stats.failed,
        "Done"
    );
    if args.metrics {
        eprint!("{}", metrics().render()?);
    }
    result
}

/// Wait for an estimate, submit, then wait for the terminal event
async fn drive(
    session: &SessionHandle,
    events: &mut broadcast::Receiver<LifecycleEvent>,
) -> Result<()> {
    tokio::time::timeout(ESTIMATE_TIMEOUT, wait_for_estimate(events))
        .await
        .context("Timed out waiting for a gas estimate")??;

    match session.submit().await {
        Some(SubmitOutcome::Submitted(handle)) => {
            info!(handle = %handle, "Waiting for confirmation")
        }
        Some(SubmitOutcome::Rejected(err)) => bail!("{}", err.user_message()),
        Some(SubmitOutcome::Skipped(reason)) => bail!("Submit skipped: {}", reason.as_str()),
        None => bail!("Session stopped before submitting"),
    }

    loop {
        tokio::select! {
            event = next_event(events) => match event? {
                LifecycleEvent::Confirmed { .. } => return Ok(()),
                LifecycleEvent::Failed { error, .. } => bail!("{}", error.user_message()),
                _ => {}
            },
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted while waiting for confirmation");
                return Ok(());
            }
        }
    }
}

async fn wait_for_estimate(events: &mut broadcast::Receiver<LifecycleEvent>) -> Result<()> {
    loop {
        match next_event(events).await? {
            LifecycleEvent::EstimateUpdated { .. } => return Ok(()),
            LifecycleEvent::EstimateCleared { error: Some(err), .. } => {
                bail!("{}", err.user_message())
            }
            _ => {}
        }
    }
}

/// Receive and print the next lifecycle event
async fn next_event(events: &mut broadcast::Receiver<LifecycleEvent>) -> Result<LifecycleEvent> {
    loop {
        match events.recv().await {
            Ok(event) => {
                println!("{}", serde_json::to_string(&event)?);
                return Ok(event);
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "Event stream lagged")
            }
            Err(broadcast::error::RecvError::Closed) => bail!("Event stream closed"),
        }
    }
}

/// Initialize logging subsystem
fn init_logging(verbose: bool, logging: &LoggingConfig) -> Result<()> {
    let directive = if verbose {
        "txflow=debug,info".to_string()
    } else {
        logging
            .filter
            .clone()
            .unwrap_or_else(|| "txflow=info,warn".to_string())
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(directive));

    let (json, plain) = if logging.json {
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_writer(std::io::stderr);
        (Some(layer), None)
    } else {
        let layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr);
        (None, Some(layer))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(plain)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(())
}

/// Load configuration from file with fallback to defaults
fn load_config(path: &str) -> Result<(Config, bool)> {
    if std::path::Path::new(path).exists() {
        let config = Config::from_file_with_env(path)
            .with_context(|| format!("Failed to load config from {}", path))?;
        Ok((config, true))
    } else {
        let mut config = Config::default();
        config.apply_env_overrides()?;
        Ok((config, false))
    }
}
