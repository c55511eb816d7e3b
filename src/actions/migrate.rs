use rust_decimal::Decimal;

use super::{ActionDescriptor, BRIDGE_TO_OPTIMISM};
use crate::orchestrator::TransactionError;
use crate::resolver::{DerivedState, UserInput};
use crate::types::{arg, ActionArgs, ActionKind, ActionRequest, ArgValue, MethodRef, ReadModel};

const INITIATE_ESCROW_MIGRATION: MethodRef =
    MethodRef::new(BRIDGE_TO_OPTIMISM, "initiateEscrowMigration");

/// Migration of every claimable escrow entry to L2
#[derive(Debug, Clone, Copy, Default)]
pub struct MigrateEscrowAction;

impl ActionDescriptor for MigrateEscrowAction {
    fn kind(&self) -> ActionKind {
        ActionKind::MigrateEscrow
    }

    fn resolve(
        &self,
        _input: &UserInput,
        derived: &DerivedState,
    ) -> Result<Option<ActionRequest>, TransactionError> {
        let Some(escrow) = derived.escrow.as_ref() else {
            return Ok(None);
        };

        let chunks: Vec<Vec<u64>> = escrow
            .claimable_entry_ids_in_chunk
            .iter()
            .filter(|chunk| !chunk.is_empty())
            .cloned()
            .collect();
        if chunks.is_empty() {
            return Ok(None);
        }

        let mut args = ActionArgs::new();
        args.insert(arg::ENTRY_IDS.to_string(), ArgValue::EntryIds(chunks));
        Ok(Some(ActionRequest::new(ActionKind::MigrateEscrow, args)))
    }

    fn method(&self, _request: &ActionRequest) -> MethodRef {
        INITIATE_ESCROW_MIGRATION
    }

    // The ledger decides whether the entries can move; nothing to check locally
    fn available_resource(&self, _derived: &DerivedState) -> Option<Decimal> {
        None
    }

    fn refresh_targets(&self) -> &'static [ReadModel] {
        &[ReadModel::EscrowData]
    }
}

/// Whether vested-but-unclaimed escrow should be vested before migrating
pub fn vest_required(derived: &DerivedState) -> bool {
    derived
        .escrow
        .as_ref()
        .map(|e| e.claimable_amount > Decimal::ZERO)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::EscrowData;

    fn with_escrow(chunks: Vec<Vec<u64>>, claimable: i64) -> DerivedState {
        DerivedState {
            escrow: Some(EscrowData {
                total_escrowed: Decimal::from(1_000),
                claimable_amount: Decimal::from(claimable),
                claimable_entry_ids_in_chunk: chunks,
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_resolves_chunked_entries() {
        let derived = with_escrow(vec![vec![1, 2, 3], vec![], vec![4]], 0);
        let request = MigrateEscrowAction
            .resolve(&UserInput::default(), &derived)
            .unwrap()
            .unwrap();

        assert_eq!(request.entry_ids(), Some(&[vec![1, 2, 3], vec![4]][..]));
        assert!(request.amount().is_none());
        assert!(!vest_required(&derived));
    }

    #[test]
    fn test_nothing_to_migrate() {
        assert!(MigrateEscrowAction
            .resolve(&UserInput::default(), &DerivedState::default())
            .unwrap()
            .is_none());
        assert!(MigrateEscrowAction
            .resolve(&UserInput::default(), &with_escrow(vec![vec![]], 0))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_vest_advisory() {
        assert!(vest_required(&with_escrow(vec![vec![7]], 15)));
        assert!(!vest_required(&DerivedState::default()));
        assert_eq!(MigrateEscrowAction.available_resource(&DerivedState::default()), None);
    }
}
