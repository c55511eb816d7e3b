//! Common types used throughout the orchestrator

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Ledger-mutating operation supported by the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Deposit collateral into the L2 bridge
    Deposit,
    /// Migrate escrowed balances to L2
    MigrateEscrow,
    /// Mint (issue) synthetic assets against staked collateral
    Mint,
}

impl ActionKind {
    pub const ALL: [ActionKind; 3] = [
        ActionKind::Deposit,
        ActionKind::MigrateEscrow,
        ActionKind::Mint,
    ];

    /// Stable label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Deposit => "deposit",
            ActionKind::MigrateEscrow => "migrate_escrow",
            ActionKind::Mint => "mint",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "deposit" => Ok(ActionKind::Deposit),
            "migrate" | "migrate_escrow" | "migrate-escrow" => Ok(ActionKind::MigrateEscrow),
            "mint" => Ok(ActionKind::Mint),
            other => Err(format!("unknown action kind '{}'", other)),
        }
    }
}

/// A single named argument of an action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ArgValue {
    /// Token amount in whole units (the ledger client scales to base units)
    Amount(Decimal),
    /// Escrow entry ids, grouped in the chunks the ledger method accepts
    EntryIds(Vec<Vec<u64>>),
}

/// Ordered argument map so that equal requests compare (and hash) equal
pub type ActionArgs = BTreeMap<String, ArgValue>;

/// Argument names shared by the action descriptors and the ledger client
pub mod arg {
    pub const AMOUNT: &str = "amount";
    pub const ENTRY_IDS: &str = "entry_ids";
}

/// The resolved intent to perform one ledger-mutating operation
///
/// Immutable once constructed. A new request replaces the old one whenever
/// user input or derived state changes; equality is the identity used for
/// estimate staleness checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRequest {
    kind: ActionKind,
    args: ActionArgs,
    use_max: bool,
}

impl ActionRequest {
    pub fn new(kind: ActionKind, args: ActionArgs) -> Self {
        Self {
            kind,
            args,
            use_max: false,
        }
    }

    /// Mark the request as "use maximum available"
    pub fn with_max(mut self) -> Self {
        self.use_max = true;
        self
    }

    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    pub fn args(&self) -> &ActionArgs {
        &self.args
    }

    pub fn use_max(&self) -> bool {
        self.use_max
    }

    /// Amount argument, if the action carries one
    pub fn amount(&self) -> Option<Decimal> {
        match self.args.get(arg::AMOUNT) {
            Some(ArgValue::Amount(amount)) => Some(*amount),
            _ => None,
        }
    }

    /// Escrow entry ids argument, if the action carries one
    pub fn entry_ids(&self) -> Option<&[Vec<u64>]> {
        match self.args.get(arg::ENTRY_IDS) {
            Some(ArgValue::EntryIds(ids)) => Some(ids.as_slice()),
            _ => None,
        }
    }
}

/// Opaque transaction hash returned by the ledger client on submission
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PendingHandle(String);

impl PendingHandle {
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PendingHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PendingHandle {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Externally visible lifecycle state of one orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionState {
    Presubmit,
    Waiting,
    Success,
}

/// Ledger method reference (contract + method name)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct MethodRef {
    pub contract: &'static str,
    pub method: &'static str,
}

impl MethodRef {
    pub const fn new(contract: &'static str, method: &'static str) -> Self {
        Self { contract, method }
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.contract, self.method)
    }
}

/// Resource parameters attached to a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceParams {
    /// Padded gas limit
    pub resource_limit: u64,
    /// Gas price in wei
    pub resource_price: u128,
}

/// Read-model an action mutates; refreshed after confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadModel {
    /// Collateral, debt and issuance ratios
    StakingData,
    /// Escrow schedule and claimable entries
    EscrowData,
    /// L1/L2 bridge balances
    BridgeBalances,
}

/// Session statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowStats {
    /// Estimation triggers issued
    pub estimates_requested: u64,

    /// Estimation results discarded because a newer trigger superseded them
    pub estimates_superseded: u64,

    /// Submissions accepted by the ledger client
    pub submissions: u64,

    /// Submissions the ledger client refused
    pub submissions_rejected: u64,

    /// Submit calls ignored by the state/precondition guard
    pub submits_skipped: u64,

    /// Confirmed transactions
    pub confirmed: u64,

    /// Transactions that failed after submission
    pub failed: u64,
}
