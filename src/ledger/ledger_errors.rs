use std::fmt;
use thiserror::Error;

use crate::orchestrator::TransactionError;

/// Code attached to a ledger client failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerErrorCode {
    /// Argument could not be encoded for the method (`INVALID_ARGUMENT`)
    InvalidArgument,
    /// User declined the signature request (`ACTION_REJECTED`)
    ActionRejected,
    /// JSON-RPC error code returned by the node
    Rpc(i64),
    /// Any other named client code
    Named(String),
}

impl LedgerErrorCode {
    /// Parse a raw code as reported by the client library
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw {
            "INVALID_ARGUMENT" => Self::InvalidArgument,
            "ACTION_REJECTED" => Self::ActionRejected,
            _ => match raw.parse::<i64>() {
                Ok(code) => Self::Rpc(code),
                Err(_) => Self::Named(raw.to_string()),
            },
        }
    }
}

impl fmt::Display for LedgerErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument => f.write_str("INVALID_ARGUMENT"),
            Self::ActionRejected => f.write_str("ACTION_REJECTED"),
            Self::Rpc(code) => write!(f, "{}", code),
            Self::Named(name) => f.write_str(name),
        }
    }
}

/// Failure reported by the ledger client for an estimate or submit call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct LedgerError {
    pub code: Option<LedgerErrorCode>,
    pub message: String,
}

impl LedgerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: LedgerErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::with_code(LedgerErrorCode::InvalidArgument, message)
    }

    pub fn rpc(code: i64, message: impl Into<String>) -> Self {
        Self::with_code(LedgerErrorCode::Rpc(code), message)
    }

    /// Extract a code from a raw client message of the form `... (code: X)`
    ///
    /// Client libraries that only expose a string still embed the code; the
    /// message is kept verbatim either way.
    pub fn from_message(raw: &str) -> Self {
        let code = raw
            .split("code:")
            .nth(1)
            .and_then(|s| {
                s.split(|c: char| c.is_whitespace() || c == ')' || c == ',')
                    .find(|p| !p.is_empty())
            })
            .map(LedgerErrorCode::parse);

        Self {
            code,
            message: raw.to_string(),
        }
    }

    pub fn is_user_rejection(&self) -> bool {
        matches!(
            self.code,
            Some(LedgerErrorCode::ActionRejected) | Some(LedgerErrorCode::Rpc(4001))
        )
    }
}

/// Map an estimation failure onto the transaction error taxonomy
///
/// `revert_code` is the node code meaning "execution would revert due to
/// balance"; everything not recognised is surfaced verbatim.
pub fn classify_estimation_error(err: &LedgerError, revert_code: i64) -> TransactionError {
    match &err.code {
        Some(LedgerErrorCode::InvalidArgument) => TransactionError::InvalidArgument,
        Some(LedgerErrorCode::Rpc(code)) if *code == revert_code => {
            TransactionError::InsufficientResource
        }
        _ => TransactionError::EstimationFailed(err.message.clone()),
    }
}

/// Map a submission failure onto the transaction error taxonomy
pub fn classify_submission_error(err: &LedgerError) -> TransactionError {
    TransactionError::SubmissionRejected(err.message.clone())
}
