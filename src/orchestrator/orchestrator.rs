//! Transaction lifecycle state machine for one action kind

use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};

use super::estimator::{
    EstimateApplied, EstimationDeps, EstimationOutcome, EstimationTicket, ResourceEstimate,
    ResourceEstimator,
};
use super::state::{LifecycleEvent, TxPhase};
use super::TransactionError;
use crate::actions::ActionDescriptor;
use crate::config::Config;
use crate::ledger::{classify_submission_error, gwei_to_wei, LedgerClient, LedgerError};
use crate::metrics::metrics;
use crate::monitor::{ConfirmationEvent, ConfirmationOutcome, ConfirmationSink, TxMonitor};
use crate::observability::TraceContext;
use crate::resolver::{AmountMode, DerivedState, SessionSnapshot, UserInput};
use crate::structured_logging::FlowLogger;
use crate::types::{
    ActionArgs, ActionKind, ActionRequest, FlowStats, MethodRef, PendingHandle, ReadModel,
    ResourceParams, TransactionState,
};

/// Listener notified after a confirmed transaction
pub trait RefreshHook: Send + Sync {
    /// Re-fetch the read-models `kind` mutated
    fn refresh(&self, kind: ActionKind, targets: &[ReadModel]);
}

impl<F> RefreshHook for F
where
    F: Fn(ActionKind, &[ReadModel]) + Send + Sync,
{
    fn refresh(&self, kind: ActionKind, targets: &[ReadModel]) {
        self(kind, targets)
    }
}

/// Why a `submit()` call did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// A transaction is already in flight, or the last one succeeded
    NotPresubmit,
    /// The ledger client has not answered the previous submit yet
    SubmitInFlight,
    /// Wallet disconnected or upstream not ready
    NotReady,
    /// The current estimate is in an error state
    EstimateError,
    /// Input does not resolve to a request
    NoRequest,
    /// No estimate for the current request yet
    NoEstimate,
    /// Gas price does not convert to wei
    InvalidGasPrice,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NotPresubmit => "not_presubmit",
            SkipReason::SubmitInFlight => "submit_in_flight",
            SkipReason::NotReady => "not_ready",
            SkipReason::EstimateError => "estimate_error",
            SkipReason::NoRequest => "no_request",
            SkipReason::NoEstimate => "no_estimate",
            SkipReason::InvalidGasPrice => "invalid_gas_price",
        }
    }
}

/// Result of [`TxOrchestrator::submit`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Submitted(PendingHandle),
    Rejected(TransactionError),
    Skipped(SkipReason),
}

/// Submission that passed the guards
///
/// Produced by [`TxOrchestrator::begin_submit`]. Running it only talks to the
/// ledger client; the result goes back through
/// [`TxOrchestrator::complete_submit`].
pub struct SubmitTicket {
    request: ActionRequest,
    method: MethodRef,
    args: ActionArgs,
    params: ResourceParams,
    trace: TraceContext,
    ledger: Arc<dyn LedgerClient>,
}

impl fmt::Debug for SubmitTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubmitTicket")
            .field("method", &self.method)
            .field("request", &self.request)
            .field("params", &self.params)
            .finish()
    }
}

impl SubmitTicket {
    /// Sign and broadcast; resolves once the client has a handle or an error
    pub async fn run(self) -> SubmissionResult {
        let result = self.ledger.submit(self.method, &self.args, self.params).await;
        SubmissionResult {
            request: self.request,
            params: self.params,
            trace: self.trace,
            result,
        }
    }
}

/// Ledger answer for a [`SubmitTicket`]
#[derive(Debug)]
pub struct SubmissionResult {
    request: ActionRequest,
    params: ResourceParams,
    trace: TraceContext,
    result: Result<PendingHandle, LedgerError>,
}

/// Lifecycle orchestrator for one action kind
///
/// Owns the estimator, the lifecycle phase and the last transaction error.
/// All mutation goes through `&mut self`; the session loop serialises calls.
pub struct TxOrchestrator {
    descriptor: Arc<dyn ActionDescriptor>,
    ledger: Arc<dyn LedgerClient>,
    monitor: Arc<dyn TxMonitor>,
    refresher: Option<Arc<dyn RefreshHook>>,

    estimator: ResourceEstimator,
    phase: TxPhase,
    /// Set between `begin_submit` and `complete_submit`
    submitting: bool,
    tx_error: Option<TransactionError>,
    gas_price_gwei: Decimal,

    input: UserInput,
    derived: DerivedState,
    session: SessionSnapshot,

    sink: ConfirmationSink,
    confirmations: mpsc::UnboundedReceiver<ConfirmationEvent>,
    events: broadcast::Sender<LifecycleEvent>,
    prompt: watch::Sender<bool>,

    stats: FlowStats,
    logger: FlowLogger,
}

impl TxOrchestrator {
    pub fn new(
        descriptor: Arc<dyn ActionDescriptor>,
        ledger: Arc<dyn LedgerClient>,
        monitor: Arc<dyn TxMonitor>,
        config: &Config,
    ) -> Self {
        let (sink, confirmations) = ConfirmationSink::channel();
        let (events, _) = broadcast::channel(config.session.event_capacity);
        let (prompt, _) = watch::channel(false);
        let logger = FlowLogger::new(descriptor.kind());
        let estimator = ResourceEstimator::new(
            Arc::clone(&descriptor),
            Arc::clone(&ledger),
            &config.estimation,
        );

        Self {
            descriptor,
            ledger,
            monitor,
            refresher: None,
            estimator,
            phase: TxPhase::Presubmit,
            submitting: false,
            tx_error: None,
            gas_price_gwei: config.submission.default_gas_price_gwei,
            input: UserInput::default(),
            derived: DerivedState::default(),
            session: SessionSnapshot::default(),
            sink,
            confirmations,
            events,
            prompt,
            stats: FlowStats::default(),
            logger,
        }
    }

    pub fn with_refresher(mut self, refresher: Arc<dyn RefreshHook>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    // ---- observers ----

    pub fn kind(&self) -> ActionKind {
        self.descriptor.kind()
    }

    pub fn state(&self) -> TransactionState {
        self.phase.state()
    }

    pub fn phase(&self) -> &TxPhase {
        &self.phase
    }

    pub fn is_waiting(&self) -> bool {
        matches!(self.phase, TxPhase::Waiting { .. })
    }

    /// Handle of the in-flight or last successful transaction
    pub fn handle(&self) -> Option<&PendingHandle> {
        self.phase.handle()
    }

    pub fn input(&self) -> &UserInput {
        &self.input
    }

    pub fn derived(&self) -> &DerivedState {
        &self.derived
    }

    pub fn gas_price_gwei(&self) -> Decimal {
        self.gas_price_gwei
    }

    /// Request resolved from the current input and derived state
    pub fn current_request(&self) -> Result<Option<ActionRequest>, TransactionError> {
        self.descriptor.resolve(&self.input, &self.derived)
    }

    /// Estimate valid for the current request
    pub fn estimate(&self) -> Option<&ResourceEstimate> {
        match self.current_request() {
            Ok(Some(request)) => self.estimator.estimate_for(&request),
            _ => None,
        }
    }

    pub fn estimate_error(&self) -> Option<&TransactionError> {
        self.estimator.error()
    }

    /// Error from the last submission or confirmation
    pub fn tx_error(&self) -> Option<&TransactionError> {
        self.tx_error.as_ref()
    }

    /// The error to display: transaction errors first, then estimation
    pub fn error(&self) -> Option<&TransactionError> {
        self.tx_error.as_ref().or_else(|| self.estimator.error())
    }

    /// Whether `submit()` would pass its guards right now
    pub fn can_submit(&self) -> bool {
        self.submit_guard().is_ok()
    }

    pub fn stats(&self) -> FlowStats {
        let (requested, superseded) = self.estimator.counters();
        FlowStats {
            estimates_requested: requested,
            estimates_superseded: superseded,
            ..self.stats.clone()
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    /// Confirmation-prompt side channel; `true` while the wallet prompt is open
    pub fn subscribe_prompt(&self) -> watch::Receiver<bool> {
        self.prompt.subscribe()
    }

    pub fn prompt_open(&self) -> bool {
        *self.prompt.borrow()
    }

    // ---- inputs ----

    pub fn set_input(&mut self, input: UserInput) -> Option<EstimationTicket> {
        self.input = input;
        self.retrigger()
    }

    pub fn select_mode(&mut self, mode: AmountMode) -> Option<EstimationTicket> {
        self.input.select_mode(mode);
        self.retrigger()
    }

    /// Ignored (no re-estimation) while the amount is locked
    pub fn set_amount_text(&mut self, text: impl Into<String>) -> Option<EstimationTicket> {
        if !self.input.set_amount_text(text) {
            return None;
        }
        self.retrigger()
    }

    pub fn set_derived(&mut self, derived: DerivedState) -> Option<EstimationTicket> {
        self.derived = derived;
        self.retrigger()
    }

    pub fn set_session(&mut self, session: SessionSnapshot) -> Option<EstimationTicket> {
        self.session = session;
        self.retrigger()
    }

    /// Gas price chosen by the user, in gwei
    pub fn set_gas_price(&mut self, gwei: Decimal) -> Result<(), TransactionError> {
        if gwei_to_wei(gwei).is_none() {
            return Err(TransactionError::InvalidArgument);
        }
        self.gas_price_gwei = gwei;
        Ok(())
    }

    pub fn dismiss_prompt(&mut self) {
        self.prompt.send_replace(false);
    }

    // ---- estimation ----

    fn retrigger(&mut self) -> Option<EstimationTicket> {
        let had_estimate = self.estimator.estimate().is_some();
        let previous_error = self.estimator.error().cloned();

        let deps = EstimationDeps {
            request: self.current_request(),
            wallet_connected: self.session.wallet_connected,
            app_ready: self.session.app_ready,
            available: self.descriptor.available_resource(&self.derived),
        };
        let ticket = self.estimator.update_deps(deps);

        let error = self.estimator.error().cloned();
        if self.estimator.estimate().is_none() && (had_estimate || error != previous_error) {
            self.publish(LifecycleEvent::EstimateCleared {
                action: self.kind(),
                error,
            });
        }
        ticket
    }

    /// Feed back the outcome of a ticket; stale outcomes are dropped
    pub fn complete_estimate(&mut self, outcome: EstimationOutcome) -> bool {
        match self.estimator.complete(outcome) {
            EstimateApplied::Updated(estimate) => {
                self.publish(LifecycleEvent::EstimateUpdated {
                    action: self.kind(),
                    estimate,
                });
                true
            }
            EstimateApplied::Failed(err) => {
                self.publish(LifecycleEvent::EstimateCleared {
                    action: self.kind(),
                    error: Some(err),
                });
                true
            }
            EstimateApplied::Superseded => false,
        }
    }

    /// Run a ticket to completion inline
    pub async fn run_estimation(&mut self, ticket: Option<EstimationTicket>) -> bool {
        match ticket {
            Some(ticket) => {
                let outcome = ticket.run().await;
                self.complete_estimate(outcome)
            }
            None => false,
        }
    }

    // ---- lifecycle ----

    fn submit_guard(&self) -> Result<(ActionRequest, u64, u128), SkipReason> {
        if self.submitting {
            return Err(SkipReason::SubmitInFlight);
        }
        if !matches!(self.phase, TxPhase::Presubmit) {
            return Err(SkipReason::NotPresubmit);
        }
        if !self.session.can_estimate() {
            return Err(SkipReason::NotReady);
        }
        if self.estimator.error().map(|e| e.blocks_submit()).unwrap_or(false) {
            return Err(SkipReason::EstimateError);
        }
        let request = match self.current_request() {
            Ok(Some(request)) => request,
            Ok(None) => return Err(SkipReason::NoRequest),
            Err(_) => return Err(SkipReason::EstimateError),
        };
        let padded = self
            .estimator
            .estimate_for(&request)
            .map(|e| e.padded)
            .ok_or(SkipReason::NoEstimate)?;
        let price = gwei_to_wei(self.gas_price_gwei).ok_or(SkipReason::InvalidGasPrice)?;
        Ok((request, padded, price))
    }

    /// Submit the current request and wait for the ledger client inline
    ///
    /// The session loop uses [`Self::begin_submit`] / [`Self::complete_submit`]
    /// instead so it keeps serving inputs while the client is busy.
    pub async fn submit(&mut self) -> SubmitOutcome {
        let ticket = match self.begin_submit() {
            Ok(ticket) => ticket,
            Err(reason) => return SubmitOutcome::Skipped(reason),
        };
        let (outcome, estimation) = self.complete_submit(ticket.run().await);
        self.run_estimation(estimation).await;
        outcome
    }

    /// Check the submit guards and open the confirmation prompt
    ///
    /// Clears the last transaction error. Further submits are skipped until
    /// the returned ticket's result is fed to [`Self::complete_submit`].
    pub fn begin_submit(&mut self) -> Result<SubmitTicket, SkipReason> {
        let (request, gas_limit, gas_price) = match self.submit_guard() {
            Ok(ready) => ready,
            Err(reason) => {
                self.stats.submits_skipped += 1;
                metrics()
                    .submits_skipped
                    .with_label_values(&[self.kind().as_str(), reason.as_str()])
                    .inc();
                self.logger.log_submit_skipped(reason.as_str());
                return Err(reason);
            }
        };

        self.tx_error = None;
        self.submitting = true;
        self.prompt.send_replace(true);

        let method = self.descriptor.method(&request);
        let args = self.descriptor.call_args(&request);
        let params = ResourceParams {
            resource_limit: gas_limit,
            resource_price: gas_price,
        };
        let trace = TraceContext::for_submission(self.kind());
        self.logger.log_submit_attempt(&trace, method, gas_limit, gas_price);

        Ok(SubmitTicket {
            request,
            method,
            args,
            params,
            trace,
            ledger: Arc::clone(&self.ledger),
        })
    }

    /// Apply the ledger answer for the ticket from [`Self::begin_submit`]
    ///
    /// Accepted: close the prompt, register with the monitor, enter `Waiting`.
    /// Refused: stay in `Presubmit` with `SubmissionRejected`, prompt left open.
    /// A re-estimation ticket is returned when clearing the typed amount
    /// changed the request.
    pub fn complete_submit(
        &mut self,
        submission: SubmissionResult,
    ) -> (SubmitOutcome, Option<EstimationTicket>) {
        self.submitting = false;
        let SubmissionResult {
            request,
            params,
            trace,
            result,
        } = submission;

        match result {
            Ok(handle) => {
                self.prompt.send_replace(false);
                self.monitor.register_handle(&handle, self.sink.clone());
                self.logger.log_submitted(&trace, &handle);

                self.stats.submissions += 1;
                metrics().submissions_total.with_label_values(&[self.kind().as_str()]).inc();
                metrics().in_flight.inc();

                self.phase = TxPhase::Waiting {
                    handle: handle.clone(),
                    request,
                    trace,
                };
                self.publish(LifecycleEvent::Submitted {
                    action: self.kind(),
                    handle: handle.clone(),
                    gas_limit: params.resource_limit,
                });

                let estimation = self.clear_submitted_amount();
                (SubmitOutcome::Submitted(handle), estimation)
            }
            Err(err) => {
                let user_rejected = err.is_user_rejection();
                let err = classify_submission_error(&err);
                self.logger.log_submit_rejected(&trace, &err, user_rejected);

                self.stats.submissions_rejected += 1;
                metrics()
                    .submissions_rejected
                    .with_label_values(&[self.kind().as_str()])
                    .inc();

                self.tx_error = Some(err.clone());
                self.publish(LifecycleEvent::Failed {
                    action: self.kind(),
                    handle: None,
                    error: err.clone(),
                });
                (SubmitOutcome::Rejected(err), None)
            }
        }
    }

    fn clear_submitted_amount(&mut self) -> Option<EstimationTicket> {
        if !self.descriptor.clears_amount_after_submit() || self.input.amount_text().is_empty() {
            return None;
        }
        // locked (max) amounts stay as they are
        if !self.input.set_amount_text(String::new()) {
            return None;
        }
        self.retrigger()
    }

    /// `Waiting -> Success` for the in-flight handle; other events are ignored
    pub fn on_confirmed(&mut self, handle: &PendingHandle) -> bool {
        let trace = match &self.phase {
            TxPhase::Waiting { handle: current, trace, .. } if current == handle => trace.clone(),
            other => {
                self.logger.log_stale_event(handle, other.as_str());
                return false;
            }
        };

        self.logger.log_confirmed(&trace, handle);
        self.stats.confirmed += 1;
        let m = metrics();
        m.confirmations_total.with_label_values(&[self.kind().as_str()]).inc();
        m.in_flight.dec();
        m.confirmation_latency.observe(trace.elapsed_ms().max(0) as f64 / 1_000.0);

        self.phase = TxPhase::Success {
            handle: handle.clone(),
            trace,
        };

        if let Some(refresher) = &self.refresher {
            refresher.refresh(self.descriptor.kind(), self.descriptor.refresh_targets());
        }
        self.publish(LifecycleEvent::Confirmed {
            action: self.kind(),
            handle: handle.clone(),
        });
        true
    }

    /// `Waiting -> Presubmit` with `ConfirmationFailed(reason)`
    pub fn on_failed(&mut self, handle: &PendingHandle, reason: impl Into<String>) -> bool {
        let trace = match &self.phase {
            TxPhase::Waiting { handle: current, trace, .. } if current == handle => trace.clone(),
            other => {
                self.logger.log_stale_event(handle, other.as_str());
                return false;
            }
        };

        let reason = reason.into();
        self.logger.log_failed(&trace, handle, &reason);
        self.stats.failed += 1;
        let m = metrics();
        m.failures_total.with_label_values(&[self.kind().as_str()]).inc();
        m.in_flight.dec();

        let err = TransactionError::ConfirmationFailed(reason);
        self.phase = TxPhase::Presubmit;
        self.tx_error = Some(err.clone());
        self.publish(LifecycleEvent::Failed {
            action: self.kind(),
            handle: Some(handle.clone()),
            error: err,
        });
        true
    }

    /// Route a monitor event to `on_confirmed` / `on_failed`
    pub fn apply_confirmation(&mut self, event: ConfirmationEvent) -> bool {
        match event.outcome {
            ConfirmationOutcome::Confirmed => self.on_confirmed(&event.handle),
            ConfirmationOutcome::Failed(reason) => self.on_failed(&event.handle, reason),
        }
    }

    /// Next event delivered by the monitor
    pub async fn next_confirmation(&mut self) -> Option<ConfirmationEvent> {
        self.confirmations.recv().await
    }

    /// `Success -> Presubmit`; no-op in any other state
    pub fn reset(&mut self) -> bool {
        if !matches!(self.phase, TxPhase::Success { .. }) {
            return false;
        }
        self.phase = TxPhase::Presubmit;
        self.tx_error = None;
        self.publish(LifecycleEvent::Reset { action: self.kind() });
        true
    }

    /// Publish `StillPending` for the in-flight handle, if any
    pub fn report_still_pending(&self) -> bool {
        let TxPhase::Waiting { handle, trace, .. } = &self.phase else {
            return false;
        };
        let elapsed_ms = trace.elapsed_ms();
        self.logger.log_still_pending(handle, elapsed_ms);
        self.publish(LifecycleEvent::StillPending {
            action: self.kind(),
            handle: handle.clone(),
            elapsed_ms,
        });
        true
    }

    fn publish(&self, event: LifecycleEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}
