//! Action parameter resolution
//!
//! Turns user input plus a read-only snapshot of derived on-chain state into
//! an [`ActionRequest`]. Everything here is a pure function of its inputs:
//! no I/O, no writes back into the input.
//!
//! Resolution has three outcomes:
//! - `Ok(Some(request))` - the action can be estimated and submitted
//! - `Ok(None)` - not applicable yet (empty input, nothing to migrate,
//!   unresolvable derived state); estimation stays absent, no error
//! - `Err(TransactionError::InvalidArgument)` - the user typed something
//!   that is not a valid amount

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::actions::descriptor_for;
use crate::orchestrator::TransactionError;
use crate::types::{ActionKind, ActionRequest};

/// Maximum fractional digits a token amount may carry
pub const TOKEN_DECIMALS: u32 = 18;

/// How the amount of an action is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmountMode {
    /// Amount typed by the user
    #[default]
    Custom,
    /// Bounded maximum computed from derived state; editing is locked
    Max,
}

/// Raw user input for one action panel
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInput {
    mode: AmountMode,
    amount_text: String,
}

impl UserInput {
    pub fn custom(amount_text: impl Into<String>) -> Self {
        Self {
            mode: AmountMode::Custom,
            amount_text: amount_text.into(),
        }
    }

    pub fn max() -> Self {
        Self {
            mode: AmountMode::Max,
            amount_text: String::new(),
        }
    }

    pub fn mode(&self) -> AmountMode {
        self.mode
    }

    pub fn amount_text(&self) -> &str {
        &self.amount_text
    }

    /// Whether free-text edits are currently ignored
    pub fn is_locked(&self) -> bool {
        self.mode == AmountMode::Max
    }

    /// Switch amount mode
    ///
    /// Leaving `Max` for `Custom` clears the locked amount so the user starts
    /// from an empty field.
    pub fn select_mode(&mut self, mode: AmountMode) {
        if self.mode == AmountMode::Max && mode == AmountMode::Custom {
            self.amount_text.clear();
        }
        self.mode = mode;
    }

    /// Update the typed amount; returns `false` when the input is locked
    pub fn set_amount_text(&mut self, text: impl Into<String>) -> bool {
        if self.is_locked() {
            return false;
        }
        self.amount_text = text.into();
        true
    }
}

/// Escrow schedule summary for the connected wallet
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowData {
    /// Total amount still held in escrow
    #[serde(default)]
    pub total_escrowed: Decimal,

    /// Escrowed amount that has vested but not yet been claimed
    #[serde(default)]
    pub claimable_amount: Decimal,

    /// Claimable entry ids, grouped into migration-sized chunks
    #[serde(default)]
    pub claimable_entry_ids_in_chunk: Vec<Vec<u64>>,
}

impl EscrowData {
    pub fn entry_count(&self) -> usize {
        self.claimable_entry_ids_in_chunk.iter().map(Vec::len).sum()
    }
}

/// Read-only derived on-chain values the resolver and estimator consume
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedState {
    /// Collateral not yet backing any debt
    #[serde(default)]
    pub unstaked_collateral: Decimal,

    /// Target issuance ratio (debt per unit of collateral value)
    #[serde(default)]
    pub target_c_ratio: Decimal,

    /// Collateral price in the synth's unit
    #[serde(default)]
    pub collateral_rate: Decimal,

    /// Collateral free to move across the bridge
    #[serde(default)]
    pub transferable_collateral: Decimal,

    /// Escrow data; `None` until the escrow query has loaded
    #[serde(default)]
    pub escrow: Option<EscrowData>,
}

/// Wallet and readiness flags shared by every action flow
///
/// Passed explicitly at call time instead of being read from globals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub wallet_connected: bool,
    pub app_ready: bool,
}

impl SessionSnapshot {
    pub fn ready() -> Self {
        Self {
            wallet_connected: true,
            app_ready: true,
        }
    }

    /// Both the wallet and the upstream ledger client are usable
    pub fn can_estimate(&self) -> bool {
        self.wallet_connected && self.app_ready
    }
}

/// Parse a user-typed token amount
///
/// Empty text and zero are "nothing to do" (`Ok(None)`). Negative values,
/// non-numeric text, digit separators and more than [`TOKEN_DECIMALS`]
/// fractional digits are rejected.
pub fn parse_amount(text: &str) -> Result<Option<Decimal>, TransactionError> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    // Decimal::from_str tolerates `_` separators; token amounts do not
    if text.contains('_') {
        return Err(TransactionError::InvalidArgument);
    }

    let amount = Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .map_err(|_| TransactionError::InvalidArgument)?;

    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(TransactionError::InvalidArgument);
    }
    if amount.normalize().scale() > TOKEN_DECIMALS {
        return Err(TransactionError::InvalidArgument);
    }
    if amount.is_zero() {
        return Ok(None);
    }
    Ok(Some(amount.normalize()))
}

/// Maximum mintable amount for the given collateral
///
/// `collateral * target_c_ratio * collateral_rate`, truncated to token
/// precision. Returns `None` when any factor is zero or negative; there is
/// nothing meaningful to mint then.
pub fn max_mint_amount(
    target_c_ratio: Decimal,
    collateral: Decimal,
    collateral_rate: Decimal,
) -> Option<Decimal> {
    if collateral <= Decimal::ZERO
        || target_c_ratio <= Decimal::ZERO
        || collateral_rate <= Decimal::ZERO
    {
        return None;
    }

    let amount = collateral
        .checked_mul(target_c_ratio)?
        .checked_mul(collateral_rate)?
        .round_dp_with_strategy(TOKEN_DECIMALS, RoundingStrategy::ToZero);

    if amount.is_zero() {
        None
    } else {
        Some(amount.normalize())
    }
}

/// Resolve the request for an action kind
pub fn resolve(
    kind: ActionKind,
    input: &UserInput,
    derived: &DerivedState,
) -> Result<Option<ActionRequest>, TransactionError> {
    descriptor_for(kind).resolve(input, derived)
}
