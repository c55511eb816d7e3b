use serde::Serialize;

use super::estimator::ResourceEstimate;
use super::TransactionError;
use crate::observability::TraceContext;
use crate::types::{ActionKind, ActionRequest, PendingHandle, TransactionState};

/// Lifecycle phase; handles live inside the variants that own them
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxPhase {
    Presubmit,
    Waiting {
        handle: PendingHandle,
        /// Request frozen at submit time
        request: ActionRequest,
        trace: TraceContext,
    },
    Success {
        handle: PendingHandle,
        trace: TraceContext,
    },
}

impl TxPhase {
    pub fn state(&self) -> TransactionState {
        match self {
            TxPhase::Presubmit => TransactionState::Presubmit,
            TxPhase::Waiting { .. } => TransactionState::Waiting,
            TxPhase::Success { .. } => TransactionState::Success,
        }
    }

    pub fn handle(&self) -> Option<&PendingHandle> {
        match self {
            TxPhase::Presubmit => None,
            TxPhase::Waiting { handle, .. } | TxPhase::Success { handle, .. } => Some(handle),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TxPhase::Presubmit => "presubmit",
            TxPhase::Waiting { .. } => "waiting",
            TxPhase::Success { .. } => "success",
        }
    }
}

/// Published to listeners on every observable lifecycle change
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    EstimateUpdated {
        action: ActionKind,
        estimate: ResourceEstimate,
    },
    /// Estimate dropped; `error` says why when it was not a plain input change
    EstimateCleared {
        action: ActionKind,
        error: Option<TransactionError>,
    },
    Submitted {
        action: ActionKind,
        handle: PendingHandle,
        gas_limit: u64,
    },
    Confirmed {
        action: ActionKind,
        handle: PendingHandle,
    },
    /// Submission rejected (`handle` absent) or transaction failed on chain
    Failed {
        action: ActionKind,
        handle: Option<PendingHandle>,
        error: TransactionError,
    },
    Reset {
        action: ActionKind,
    },
    StillPending {
        action: ActionKind,
        handle: PendingHandle,
        elapsed_ms: i64,
    },
}
