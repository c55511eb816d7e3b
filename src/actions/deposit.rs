use rust_decimal::Decimal;

use super::{ActionDescriptor, BRIDGE_TO_OPTIMISM};
use crate::orchestrator::TransactionError;
use crate::resolver::{DerivedState, UserInput};
use crate::types::{arg, ActionArgs, ActionKind, ActionRequest, ArgValue, MethodRef, ReadModel};

const DEPOSIT: MethodRef = MethodRef::new(BRIDGE_TO_OPTIMISM, "deposit");

/// Bridge deposit of the wallet's whole transferable collateral
///
/// The amount is not user-editable; user input is ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct DepositAction;

impl ActionDescriptor for DepositAction {
    fn kind(&self) -> ActionKind {
        ActionKind::Deposit
    }

    fn resolve(
        &self,
        _input: &UserInput,
        derived: &DerivedState,
    ) -> Result<Option<ActionRequest>, TransactionError> {
        let amount = derived.transferable_collateral;
        if amount <= Decimal::ZERO {
            return Ok(None);
        }

        let mut args = ActionArgs::new();
        args.insert(arg::AMOUNT.to_string(), ArgValue::Amount(amount));
        Ok(Some(ActionRequest::new(ActionKind::Deposit, args)))
    }

    fn method(&self, _request: &ActionRequest) -> MethodRef {
        DEPOSIT
    }

    fn available_resource(&self, derived: &DerivedState) -> Option<Decimal> {
        Some(derived.transferable_collateral)
    }

    fn refresh_targets(&self) -> &'static [ReadModel] {
        &[ReadModel::BridgeBalances]
    }
}
