//! In-process ledger client
//!
//! Deterministic gas estimates from configuration, optional latency and
//! scriptable failures. Used by the CLI driver and the test suites.

use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;
use tracing::debug;

use super::{LedgerClient, LedgerError};
use crate::config::SimulationConfig;
use crate::types::{ActionArgs, ArgValue, MethodRef, PendingHandle, ResourceParams};

/// One accepted submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRecord {
    pub method: MethodRef,
    pub args: ActionArgs,
    pub params: ResourceParams,
    pub handle: PendingHandle,
}

#[derive(Debug, Default)]
struct SimState {
    estimate_overrides: HashMap<String, u64>,
    estimate_failures: VecDeque<LedgerError>,
    submit_failures: VecDeque<LedgerError>,
    queued_handles: VecDeque<PendingHandle>,
    nonce: u64,
    estimate_calls: u64,
    submit_calls: u64,
    submissions: Vec<SubmissionRecord>,
}

/// Simulated [`LedgerClient`]
#[derive(Debug)]
pub struct SimulatedLedger {
    base_gas: BTreeMap<String, u64>,
    fallback_gas: u64,
    gas_per_entry: u64,
    latency: Duration,
    state: Mutex<SimState>,
}

impl Default for SimulatedLedger {
    fn default() -> Self {
        Self::from_config(&SimulationConfig::default())
    }
}

impl SimulatedLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &SimulationConfig) -> Self {
        Self {
            base_gas: config.base_gas.clone(),
            fallback_gas: config.fallback_gas,
            gas_per_entry: config.gas_per_entry,
            latency: Duration::from_millis(config.latency_ms),
            state: Mutex::new(SimState::default()),
        }
    }

    /// Fixed round-trip latency (plus up to 25% jitter)
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Pin the estimate for one method, keyed as `Contract.method`
    pub fn set_estimate(&self, method: impl Into<String>, gas: u64) {
        self.state.lock().estimate_overrides.insert(method.into(), gas);
    }

    /// Fail the next estimate call with `err`
    pub fn fail_next_estimate(&self, err: LedgerError) {
        self.state.lock().estimate_failures.push_back(err);
    }

    /// Fail the next submit call with `err`
    pub fn fail_next_submit(&self, err: LedgerError) {
        self.state.lock().submit_failures.push_back(err);
    }

    /// Return `handle` from the next successful submit instead of a derived one
    pub fn queue_handle(&self, handle: impl Into<PendingHandle>) {
        self.state.lock().queued_handles.push_back(handle.into());
    }

    pub fn estimate_calls(&self) -> u64 {
        self.state.lock().estimate_calls
    }

    pub fn submit_calls(&self) -> u64 {
        self.state.lock().submit_calls
    }

    pub fn last_submission(&self) -> Option<SubmissionRecord> {
        self.state.lock().submissions.last().cloned()
    }

    pub fn submissions(&self) -> Vec<SubmissionRecord> {
        self.state.lock().submissions.clone()
    }

    fn gas_for(&self, method: MethodRef, args: &ActionArgs) -> u64 {
        let key = method.to_string();
        if let Some(gas) = self.state.lock().estimate_overrides.get(&key) {
            return *gas;
        }

        let base = self.base_gas.get(&key).copied().unwrap_or(self.fallback_gas);
        let entries: u64 = args
            .values()
            .map(|v| match v {
                ArgValue::EntryIds(chunks) => chunks.iter().map(|c| c.len() as u64).sum(),
                ArgValue::Amount(_) => 0,
            })
            .sum();
        base.saturating_add(entries.saturating_mul(self.gas_per_entry))
    }

    async fn simulate_latency(&self) {
        if self.latency.is_zero() {
            return;
        }
        let max_jitter = (self.latency.as_millis() as u64 / 4).max(1);
        let jitter = Duration::from_millis(fastrand::u64(0..max_jitter));
        tokio::time::sleep(self.latency + jitter).await;
    }
}

/// `0x` + hex(sha256(method, args, nonce))
fn derive_handle(method: MethodRef, args: &ActionArgs, nonce: u64) -> PendingHandle {
    let mut hasher = Sha256::new();
    hasher.update(method.to_string().as_bytes());
    hasher.update(serde_json::to_vec(args).unwrap_or_default());
    hasher.update(nonce.to_le_bytes());
    PendingHandle::new(format!("0x{}", hex::encode(hasher.finalize())))
}

#[async_trait]
impl LedgerClient for SimulatedLedger {
    async fn estimate_cost(
        &self,
        method: MethodRef,
        args: &ActionArgs,
    ) -> Result<u64, LedgerError> {
        self.simulate_latency().await;

        let failure = {
            let mut state = self.state.lock();
            state.estimate_calls += 1;
            state.estimate_failures.pop_front()
        };
        if let Some(err) = failure {
            debug!(method = %method, error = %err, "Simulated estimate failure");
            return Err(err);
        }

        let gas = self.gas_for(method, args);
        debug!(method = %method, gas, "Simulated estimate");
        Ok(gas)
    }

    async fn submit(
        &self,
        method: MethodRef,
        args: &ActionArgs,
        params: ResourceParams,
    ) -> Result<PendingHandle, LedgerError> {
        self.simulate_latency().await;

        let mut state = self.state.lock();
        state.submit_calls += 1;
        if let Some(err) = state.submit_failures.pop_front() {
            debug!(method = %method, error = %err, "Simulated submit failure");
            return Err(err);
        }

        state.nonce += 1;
        let handle = match state.queued_handles.pop_front() {
            Some(handle) => handle,
            None => derive_handle(method, args, state.nonce),
        };
        state.submissions.push(SubmissionRecord {
            method,
            args: args.clone(),
            params,
            handle: handle.clone(),
        });

        debug!(
            method = %method,
            handle = %handle,
            gas_limit = params.resource_limit,
            "Simulated submission accepted"
        );
        Ok(handle)
    }
}
