//! Session event loop
//!
//! One task owns one [`TxOrchestrator`] and multiplexes commands, in-flight
//! estimations, the in-flight submission and monitor events with
//! `tokio::select!`. Ledger calls run as futures polled by the loop, so a slow
//! wallet signature never holds up input handling or re-estimation.

use futures::stream::{FuturesUnordered, StreamExt};
use rust_decimal::Decimal;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::estimator::EstimationTicket;
use super::orchestrator::{SubmissionResult, SubmitOutcome, SubmitTicket, TxOrchestrator};
use crate::resolver::{AmountMode, DerivedState, SessionSnapshot, UserInput};
use crate::types::FlowStats;

type SubmitReply = Option<oneshot::Sender<SubmitOutcome>>;

/// Commands accepted by [`run_session`]
#[derive(Debug)]
pub enum SessionCommand {
    SetInput(UserInput),
    SelectMode(AmountMode),
    SetAmountText(String),
    SetDerived(DerivedState),
    SetSession(SessionSnapshot),
    SetGasPrice(Decimal),
    /// Answered once the ledger client accepts or refuses the transaction
    Submit {
        reply: SubmitReply,
    },
    Reset,
    DismissPrompt,
    Shutdown,
}

/// Cloneable sender side of a running session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    pub fn new(tx: mpsc::Sender<SessionCommand>) -> Self {
        Self { tx }
    }

    /// Queue a command; `false` once the session has stopped
    pub async fn send(&self, command: SessionCommand) -> bool {
        self.tx.send(command).await.is_ok()
    }

    /// Submit and wait for the outcome
    pub async fn submit(&self) -> Option<SubmitOutcome> {
        let (reply, rx) = oneshot::channel();
        if !self.send(SessionCommand::Submit { reply: Some(reply) }).await {
            return None;
        }
        rx.await.ok()
    }

    pub async fn shutdown(&self) {
        let _ = self.tx.send(SessionCommand::Shutdown).await;
    }
}

/// Session tuning
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Publish `StillPending` at this interval while waiting
    pub pending_warn_after: Option<Duration>,
}

/// Drive `orch` until `Shutdown` or until every command sender is dropped
///
/// An in-flight submission is never cancelled: on shutdown the loop waits
/// for the ledger client's answer and applies it before returning the
/// orchestrator.
pub async fn run_session(
    mut orch: TxOrchestrator,
    mut commands: mpsc::Receiver<SessionCommand>,
    options: SessionOptions,
) -> TxOrchestrator {
    let mut estimations = FuturesUnordered::new();
    let mut submissions = FuturesUnordered::new();
    let mut ticker = options.pending_warn_after.map(|period| {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    info!(action = %orch.kind(), "Session started");

    loop {
        let was_waiting = orch.is_waiting();

        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    debug!("Command channel closed");
                    break;
                };
                match handle_command(&mut orch, command) {
                    Step::Estimate(Some(ticket)) => estimations.push(ticket.run()),
                    Step::Estimate(None) => {}
                    Step::Submit(ticket, reply) => {
                        submissions.push(async move { (ticket.run().await, reply) });
                    }
                    Step::Stop => break,
                }
            }
            Some(outcome) = estimations.next(), if !estimations.is_empty() => {
                orch.complete_estimate(outcome);
            }
            Some((result, reply)) = submissions.next(), if !submissions.is_empty() => {
                if let Some(ticket) = finish_submit(&mut orch, result, reply) {
                    estimations.push(ticket.run());
                }
            }
            Some(event) = orch.next_confirmation() => {
                orch.apply_confirmation(event);
            }
            _ = tick(&mut ticker), if was_waiting => {
                orch.report_still_pending();
            }
        }

        if !was_waiting && orch.is_waiting() {
            if let Some(interval) = ticker.as_mut() {
                interval.reset();
            }
        }
    }

    while let Some((result, reply)) = submissions.next().await {
        debug!("Applying submission answered after shutdown");
        let ticket = finish_submit(&mut orch, result, reply);
        orch.run_estimation(ticket).await;
    }

    let stats: FlowStats = orch.stats();
    info!(
        action = %orch.kind(),
        submissions = stats.submissions,
        confirmed = stats.confirmed,
        failed = stats.failed,
        "Session stopped"
    );
    orch
}

enum Step {
    Estimate(Option<EstimationTicket>),
    Submit(SubmitTicket, SubmitReply),
    Stop,
}

fn handle_command(orch: &mut TxOrchestrator, command: SessionCommand) -> Step {
    let ticket = match command {
        SessionCommand::SetInput(input) => orch.set_input(input),
        SessionCommand::SelectMode(mode) => orch.select_mode(mode),
        SessionCommand::SetAmountText(text) => orch.set_amount_text(text),
        SessionCommand::SetDerived(derived) => orch.set_derived(derived),
        SessionCommand::SetSession(session) => orch.set_session(session),
        SessionCommand::SetGasPrice(gwei) => {
            if let Err(err) = orch.set_gas_price(gwei) {
                warn!(gas_price_gwei = %gwei, error = %err, "Gas price rejected");
            }
            None
        }
        SessionCommand::Submit { reply } => match orch.begin_submit() {
            Ok(ticket) => return Step::Submit(ticket, reply),
            Err(reason) => {
                if let Some(reply) = reply {
                    let _ = reply.send(SubmitOutcome::Skipped(reason));
                }
                None
            }
        },
        SessionCommand::Reset => {
            orch.reset();
            None
        }
        SessionCommand::DismissPrompt => {
            orch.dismiss_prompt();
            None
        }
        SessionCommand::Shutdown => return Step::Stop,
    };
    Step::Estimate(ticket)
}

fn finish_submit(
    orch: &mut TxOrchestrator,
    result: SubmissionResult,
    reply: SubmitReply,
) -> Option<EstimationTicket> {
    let (outcome, ticket) = orch.complete_submit(result);
    if let Some(reply) = reply {
        let _ = reply.send(outcome);
    }
    ticket
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
