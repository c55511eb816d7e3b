use rust_decimal::Decimal;

use super::{ActionDescriptor, SYNTHETIX};
use crate::orchestrator::TransactionError;
use crate::resolver::{max_mint_amount, parse_amount, AmountMode, DerivedState, UserInput};
use crate::types::{arg, ActionArgs, ActionKind, ActionRequest, ArgValue, MethodRef, ReadModel};

const ISSUE_SYNTHS: MethodRef = MethodRef::new(SYNTHETIX, "issueSynths");
const ISSUE_MAX_SYNTHS: MethodRef = MethodRef::new(SYNTHETIX, "issueMaxSynths");

/// Synth issuance against unstaked collateral
#[derive(Debug, Clone, Copy, Default)]
pub struct MintAction;

impl ActionDescriptor for MintAction {
    fn kind(&self) -> ActionKind {
        ActionKind::Mint
    }

    fn resolve(
        &self,
        input: &UserInput,
        derived: &DerivedState,
    ) -> Result<Option<ActionRequest>, TransactionError> {
        let (amount, use_max) = match input.mode() {
            AmountMode::Custom => match parse_amount(input.amount_text())? {
                Some(amount) => (amount, false),
                None => return Ok(None),
            },
            AmountMode::Max => match max_mint_amount(
                derived.target_c_ratio,
                derived.unstaked_collateral,
                derived.collateral_rate,
            ) {
                Some(amount) => (amount, true),
                None => return Ok(None),
            },
        };

        let mut args = ActionArgs::new();
        args.insert(arg::AMOUNT.to_string(), ArgValue::Amount(amount));
        let request = ActionRequest::new(ActionKind::Mint, args);
        Ok(Some(if use_max { request.with_max() } else { request }))
    }

    fn method(&self, request: &ActionRequest) -> MethodRef {
        if request.use_max() {
            ISSUE_MAX_SYNTHS
        } else {
            ISSUE_SYNTHS
        }
    }

    // issueMaxSynths takes no arguments; the amount is only kept for display
    fn call_args(&self, request: &ActionRequest) -> ActionArgs {
        if request.use_max() {
            ActionArgs::new()
        } else {
            request.args().clone()
        }
    }

    fn available_resource(&self, derived: &DerivedState) -> Option<Decimal> {
        Some(derived.unstaked_collateral)
    }

    fn refresh_targets(&self) -> &'static [ReadModel] {
        &[ReadModel::StakingData]
    }

    fn clears_amount_after_submit(&self) -> bool {
        true
    }
}
