//! Resource (gas) estimation with last-request-wins staleness
//!
//! The estimator never awaits anything itself. A dependency change hands out
//! an [`EstimationTicket`] tagged with a fresh generation; whoever runs the
//! ticket feeds the [`EstimationOutcome`] back through
//! [`ResourceEstimator::complete`], which drops it unless its generation is
//! still the current one.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;

use crate::actions::ActionDescriptor;
use crate::config::EstimationConfig;
use crate::ledger::{classify_estimation_error, pad_estimate, LedgerClient, LedgerError};
use crate::metrics::{metrics, Timer};
use crate::orchestrator::TransactionError;
use crate::structured_logging::FlowLogger;
use crate::types::{ActionArgs, ActionRequest, MethodRef};

/// Last successful estimate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceEstimate {
    /// Raw estimate after the safety buffer; this is the submitted gas limit
    pub padded: u64,
    /// Estimate as returned by the ledger client
    pub raw: u64,
    /// Request the estimate was computed for
    pub request: ActionRequest,
    pub computed_at: DateTime<Utc>,
}

/// Everything a re-estimation depends on
///
/// Compared by value; an unchanged dependency set does not re-trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EstimationDeps {
    /// Output of the resolver
    pub request: Result<Option<ActionRequest>, TransactionError>,
    pub wallet_connected: bool,
    pub app_ready: bool,
    /// Local balance checked for a shortfall before calling the ledger
    pub available: Option<Decimal>,
}

/// One pending ledger estimation
pub struct EstimationTicket {
    generation: u64,
    request: ActionRequest,
    method: MethodRef,
    args: ActionArgs,
    ledger: Arc<dyn LedgerClient>,
}

impl std::fmt::Debug for EstimationTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EstimationTicket")
            .field("generation", &self.generation)
            .field("method", &self.method)
            .field("request", &self.request)
            .finish()
    }
}

impl EstimationTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn request(&self) -> &ActionRequest {
        &self.request
    }

    /// Call the ledger estimator
    pub async fn run(self) -> EstimationOutcome {
        let timer = Timer::new();
        let result = self.ledger.estimate_cost(self.method, &self.args).await;
        timer.observe_duration(&metrics().estimate_latency);

        EstimationOutcome {
            generation: self.generation,
            request: self.request,
            result,
        }
    }
}

/// Result of running an [`EstimationTicket`]
#[derive(Debug, Clone)]
pub struct EstimationOutcome {
    pub generation: u64,
    pub request: ActionRequest,
    pub result: Result<u64, LedgerError>,
}

/// What [`ResourceEstimator::complete`] did with an outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EstimateApplied {
    Updated(ResourceEstimate),
    Failed(TransactionError),
    /// A newer trigger exists; the outcome was dropped
    Superseded,
}

/// Estimator for one orchestrator
pub struct ResourceEstimator {
    descriptor: Arc<dyn ActionDescriptor>,
    ledger: Arc<dyn LedgerClient>,
    gas_buffer_factor: f64,
    revert_error_code: i64,
    deps: Option<EstimationDeps>,
    generation: u64,
    in_flight: Option<u64>,
    estimate: Option<ResourceEstimate>,
    error: Option<TransactionError>,
    requested: u64,
    superseded: u64,
    logger: FlowLogger,
}

impl ResourceEstimator {
    pub fn new(
        descriptor: Arc<dyn ActionDescriptor>,
        ledger: Arc<dyn LedgerClient>,
        config: &EstimationConfig,
    ) -> Self {
        let logger = FlowLogger::new(descriptor.kind());
        Self {
            descriptor,
            ledger,
            gas_buffer_factor: config.gas_buffer_factor,
            revert_error_code: config.revert_error_code,
            deps: None,
            generation: 0,
            in_flight: None,
            estimate: None,
            error: None,
            requested: 0,
            superseded: 0,
            logger,
        }
    }

    pub fn estimate(&self) -> Option<&ResourceEstimate> {
        self.estimate.as_ref()
    }

    pub fn error(&self) -> Option<&TransactionError> {
        self.error.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Estimate valid for `request`, if any
    pub fn estimate_for(&self, request: &ActionRequest) -> Option<&ResourceEstimate> {
        self.estimate.as_ref().filter(|e| &e.request == request)
    }

    /// (triggers issued, results discarded as superseded)
    pub fn counters(&self) -> (u64, u64) {
        (self.requested, self.superseded)
    }

    /// Record a dependency change
    ///
    /// Returns a ticket when the ledger has to be asked; every call with
    /// changed dependencies supersedes the previous ticket even when no new
    /// ticket is issued.
    pub fn update_deps(&mut self, deps: EstimationDeps) -> Option<EstimationTicket> {
        if self.deps.as_ref() == Some(&deps) {
            return None;
        }

        self.generation += 1;
        self.in_flight = None;
        self.deps = Some(deps.clone());

        if !deps.wallet_connected || !deps.app_ready {
            self.estimate = None;
            self.error = None;
            return None;
        }

        if let Some(available) = deps.available {
            if available <= Decimal::ZERO {
                self.estimate = None;
                self.set_error(TransactionError::InsufficientResource);
                return None;
            }
        }

        let request = match deps.request {
            Ok(Some(request)) => request,
            Ok(None) => {
                self.estimate = None;
                self.error = None;
                return None;
            }
            Err(err) => {
                self.estimate = None;
                self.set_error(err);
                return None;
            }
        };

        if self.estimate.as_ref().map(|e| e.request != request).unwrap_or(false) {
            self.estimate = None;
        }
        self.error = None;
        self.in_flight = Some(self.generation);
        self.requested += 1;

        let method = self.descriptor.method(&request);
        let args = self.descriptor.call_args(&request);
        self.logger.log_estimate_requested(self.generation, method);
        metrics()
            .estimates_requested
            .with_label_values(&[self.descriptor.kind().as_str()])
            .inc();

        Some(EstimationTicket {
            generation: self.generation,
            request,
            method,
            args,
            ledger: Arc::clone(&self.ledger),
        })
    }

    /// Apply an outcome if it belongs to the current generation
    pub fn complete(&mut self, outcome: EstimationOutcome) -> EstimateApplied {
        if outcome.generation != self.generation || self.in_flight != Some(outcome.generation) {
            self.superseded += 1;
            metrics().estimates_superseded.inc();
            self.logger.log_estimate_superseded(outcome.generation, self.generation);
            return EstimateApplied::Superseded;
        }
        self.in_flight = None;

        match outcome.result {
            Ok(raw) => {
                let estimate = ResourceEstimate {
                    padded: pad_estimate(raw, self.gas_buffer_factor),
                    raw,
                    request: outcome.request,
                    computed_at: Utc::now(),
                };
                self.logger.log_estimate_ready(outcome.generation, raw, estimate.padded);
                self.estimate = Some(estimate.clone());
                self.error = None;
                EstimateApplied::Updated(estimate)
            }
            Err(err) => {
                let err = classify_estimation_error(&err, self.revert_error_code);
                self.estimate = None;
                self.set_error(err.clone());
                EstimateApplied::Failed(err)
            }
        }
    }

    /// Trigger and settle in one step
    pub async fn refresh(&mut self, deps: EstimationDeps) -> Option<EstimateApplied> {
        let ticket = self.update_deps(deps)?;
        let outcome = ticket.run().await;
        Some(self.complete(outcome))
    }

    fn set_error(&mut self, err: TransactionError) {
        self.logger.log_estimate_failed(self.generation, &err);
        metrics()
            .estimates_failed
            .with_label_values(&[self.descriptor.kind().as_str(), err.category()])
            .inc();
        self.error = Some(err);
    }
}
