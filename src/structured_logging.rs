//! Structured logging for lifecycle events

use crate::observability::TraceContext;
use crate::orchestrator::TransactionError;
use crate::types::{ActionKind, MethodRef, PendingHandle};

/// Structured logger for one orchestrator's lifecycle events
///
/// Field names are stable (`action`, `handle`, `generation`,
/// `correlation_id`, `gas_limit`, `error_category`) so JSON output can be
/// queried directly.
#[derive(Debug, Clone, Copy)]
pub struct FlowLogger {
    action: ActionKind,
}

impl FlowLogger {
    pub fn new(action: ActionKind) -> Self {
        Self { action }
    }

    pub fn log_estimate_requested(&self, generation: u64, method: MethodRef) {
        tracing::debug!(
            action = %self.action,
            generation,
            method = %method,
            "Estimation triggered"
        );
    }

    pub fn log_estimate_ready(&self, generation: u64, raw: u64, padded: u64) {
        tracing::debug!(
            action = %self.action,
            generation,
            raw_gas = raw,
            gas_limit = padded,
            "Estimate ready"
        );
    }

    pub fn log_estimate_failed(&self, generation: u64, error: &TransactionError) {
        tracing::info!(
            action = %self.action,
            generation,
            error_category = error.category(),
            error = %error,
            "Estimation failed"
        );
    }

    pub fn log_estimate_superseded(&self, generation: u64, current: u64) {
        tracing::debug!(
            action = %self.action,
            generation,
            current_generation = current,
            "Discarding superseded estimate"
        );
    }

    pub fn log_submit_attempt(
        &self,
        trace: &TraceContext,
        method: MethodRef,
        gas_limit: u64,
        gas_price_wei: u128,
    ) {
        tracing::info!(
            action = %self.action,
            correlation_id = %trace.correlation_id,
            method = %method,
            gas_limit,
            gas_price_wei = %gas_price_wei,
            "Submitting transaction"
        );
    }

    pub fn log_submitted(&self, trace: &TraceContext, handle: &PendingHandle) {
        tracing::info!(
            action = %self.action,
            correlation_id = %trace.correlation_id,
            handle = %handle,
            "Transaction submitted"
        );
    }

    /// Declined signatures are routine and logged at info; anything else warns
    pub fn log_submit_rejected(
        &self,
        trace: &TraceContext,
        error: &TransactionError,
        user_rejected: bool,
    ) {
        if user_rejected {
            tracing::info!(
                action = %self.action,
                correlation_id = %trace.correlation_id,
                error_category = error.category(),
                error = %error,
                "Submission declined by user"
            );
        } else {
            tracing::warn!(
                action = %self.action,
                correlation_id = %trace.correlation_id,
                error_category = error.category(),
                error = %error,
                "Submission rejected"
            );
        }
    }

    pub fn log_submit_skipped(&self, reason: &str) {
        tracing::debug!(action = %self.action, reason, "Submit ignored");
    }

    pub fn log_confirmed(&self, trace: &TraceContext, handle: &PendingHandle) {
        tracing::info!(
            action = %self.action,
            correlation_id = %trace.correlation_id,
            handle = %handle,
            elapsed_ms = trace.elapsed_ms(),
            "Transaction confirmed"
        );
    }

    pub fn log_failed(&self, trace: &TraceContext, handle: &PendingHandle, reason: &str) {
        tracing::warn!(
            action = %self.action,
            correlation_id = %trace.correlation_id,
            handle = %handle,
            reason,
            elapsed_ms = trace.elapsed_ms(),
            "Transaction failed"
        );
    }

    pub fn log_stale_event(&self, handle: &PendingHandle, state: &str) {
        tracing::debug!(
            action = %self.action,
            handle = %handle,
            state,
            "Ignoring confirmation event for non-current handle"
        );
    }

    pub fn log_still_pending(&self, handle: &PendingHandle, elapsed_ms: i64) {
        tracing::warn!(
            action = %self.action,
            handle = %handle,
            elapsed_ms,
            "Transaction still pending"
        );
    }
}
