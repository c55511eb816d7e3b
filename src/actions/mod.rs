//! Per-kind action descriptors
//!
//! Each action kind (Deposit, MigrateEscrow, Mint) is one implementation of
//! [`ActionDescriptor`]. The orchestrator, estimator and session loop are
//! generic over the descriptor; nothing outside this module branches on the
//! action kind.

mod deposit;
mod migrate;
mod mint;

pub use deposit::DepositAction;
pub use migrate::{vest_required, MigrateEscrowAction};
pub use mint::MintAction;

use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;

use crate::orchestrator::TransactionError;
use crate::resolver::{DerivedState, UserInput};
use crate::types::{ActionArgs, ActionKind, ActionRequest, MethodRef, ReadModel};

/// Contract holding the issuance methods
pub const SYNTHETIX: &str = "Synthetix";
/// L1 side of the optimism bridge
pub const BRIDGE_TO_OPTIMISM: &str = "SynthetixBridgeToOptimism";

/// Everything the lifecycle needs to know about one action kind
pub trait ActionDescriptor: Send + Sync + fmt::Debug {
    fn kind(&self) -> ActionKind;

    /// Derive the request from user input and derived state
    ///
    /// `Ok(None)` means the action is not applicable right now.
    fn resolve(
        &self,
        input: &UserInput,
        derived: &DerivedState,
    ) -> Result<Option<ActionRequest>, TransactionError>;

    /// Ledger method the request is sent to
    fn method(&self, request: &ActionRequest) -> MethodRef;

    /// Arguments actually passed to [`Self::method`]
    ///
    /// Defaults to the request's arguments. Descriptors whose method takes
    /// fewer arguments than the request records override this.
    fn call_args(&self, request: &ActionRequest) -> ActionArgs {
        request.args().clone()
    }

    /// Locally known balance whose emptiness is a resource shortfall
    ///
    /// `None` when the action has no such local check.
    fn available_resource(&self, derived: &DerivedState) -> Option<Decimal>;

    /// Read-models to refresh once the action is confirmed
    fn refresh_targets(&self) -> &'static [ReadModel];

    /// Whether a typed amount is cleared once the ledger accepts a submission
    fn clears_amount_after_submit(&self) -> bool {
        false
    }
}

/// Descriptor for an action kind
pub fn descriptor_for(kind: ActionKind) -> Arc<dyn ActionDescriptor> {
    match kind {
        ActionKind::Deposit => Arc::new(DepositAction),
        ActionKind::MigrateEscrow => Arc::new(MigrateEscrowAction),
        ActionKind::Mint => Arc::new(MintAction),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_kinds() {
        for kind in ActionKind::ALL {
            assert_eq!(descriptor_for(kind).kind(), kind);
        }
    }

    #[test]
    fn test_refresh_targets() {
        assert_eq!(
            descriptor_for(ActionKind::MigrateEscrow).refresh_targets(),
            &[ReadModel::EscrowData]
        );
        assert_eq!(
            descriptor_for(ActionKind::Mint).refresh_targets(),
            &[ReadModel::StakingData]
        );
        assert_eq!(
            descriptor_for(ActionKind::Deposit).refresh_targets(),
            &[ReadModel::BridgeBalances]
        );
    }

    #[test]
    fn test_only_mint_clears_typed_amount() {
        assert!(descriptor_for(ActionKind::Mint).clears_amount_after_submit());
        assert!(!descriptor_for(ActionKind::Deposit).clears_amount_after_submit());
        assert!(!descriptor_for(ActionKind::MigrateEscrow).clears_amount_after_submit());
    }
}
