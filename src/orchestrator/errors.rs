//! Error types for the transaction lifecycle
//!
//! Every variant is recoverable: the orchestrator is left in (or returned to)
//! `Presubmit` with a message the UI can display. The estimation-side
//! variants additionally block `submit()` until a fresh estimate succeeds.

use serde::Serialize;
use thiserror::Error;

/// Error taxonomy shared by the estimator and the orchestrator
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum TransactionError {
    /// The ledger could not estimate the action's cost
    ///
    /// Carries the ledger's message verbatim.
    #[error("Gas estimation failed: {0}")]
    EstimationFailed(String),

    /// The ledger client refused the submission before returning a handle
    ///
    /// Typical causes:
    /// - User rejected the signature request
    /// - Nonce or fee too low
    /// - Node unreachable
    #[error("Transaction rejected: {0}")]
    SubmissionRejected(String),

    /// The submitted transaction failed on chain
    #[error("Transaction failed: {0}")]
    ConfirmationFailed(String),

    /// Not enough balance (collateral, transferable tokens) for the action
    #[error("Insufficient balance to perform this action")]
    InsufficientResource,

    /// The action arguments are malformed
    #[error("Invalid input amount")]
    InvalidArgument,
}

impl TransactionError {
    /// Whether this error keeps `submit()` disabled
    ///
    /// Only estimation-side errors block; a rejected or failed transaction
    /// can be retried right away with a new explicit submit.
    pub fn blocks_submit(&self) -> bool {
        match self {
            Self::EstimationFailed(_) => true,
            Self::InsufficientResource => true,
            Self::InvalidArgument => true,
            Self::SubmissionRejected(_) => false,
            Self::ConfirmationFailed(_) => false,
        }
    }

    /// Get the error category for metrics and observability
    pub fn category(&self) -> &'static str {
        match self {
            Self::EstimationFailed(_) => "estimation_failed",
            Self::SubmissionRejected(_) => "submission_rejected",
            Self::ConfirmationFailed(_) => "confirmation_failed",
            Self::InsufficientResource => "insufficient_resource",
            Self::InvalidArgument => "invalid_argument",
        }
    }

    /// Message suitable for display next to the action button
    pub fn user_message(&self) -> String {
        self.to_string()
    }
}

// Convenience constructors
impl TransactionError {
    pub fn estimation_failed(reason: impl Into<String>) -> Self {
        Self::EstimationFailed(reason.into())
    }

    pub fn submission_rejected(reason: impl Into<String>) -> Self {
        Self::SubmissionRejected(reason.into())
    }

    pub fn confirmation_failed(reason: impl Into<String>) -> Self {
        Self::ConfirmationFailed(reason.into())
    }
}
