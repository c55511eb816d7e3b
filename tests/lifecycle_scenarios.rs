//! End-to-end lifecycle scenarios against the simulated ledger and monitor

use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::Arc;

use txflow::actions::descriptor_for;
use txflow::config::Config;
use txflow::ledger::{LedgerError, SimulatedLedger};
use txflow::monitor::{ConfirmationOutcome, NotifyHub};
use txflow::orchestrator::{
    LifecycleEvent, SkipReason, SubmitOutcome, TransactionError, TxOrchestrator,
};
use txflow::resolver::{AmountMode, DerivedState, EscrowData, SessionSnapshot, UserInput};
use txflow::types::{ActionKind, PendingHandle, ReadModel, TransactionState};

type Refreshes = Arc<Mutex<Vec<(ActionKind, Vec<ReadModel>)>>>;

struct Harness {
    orch: TxOrchestrator,
    ledger: Arc<SimulatedLedger>,
    hub: Arc<NotifyHub>,
    refreshes: Refreshes,
}

impl Harness {
    fn new(kind: ActionKind) -> Self {
        let ledger = Arc::new(SimulatedLedger::new());
        let hub = Arc::new(NotifyHub::new());
        let refreshes: Refreshes = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&refreshes);

        let orch = TxOrchestrator::new(
            descriptor_for(kind),
            ledger.clone(),
            hub.clone(),
            &Config::default(),
        )
        .with_refresher(Arc::new(move |kind: ActionKind, targets: &[ReadModel]| {
            recorded.lock().push((kind, targets.to_vec()));
        }));

        Self {
            orch,
            ledger,
            hub,
            refreshes,
        }
    }

    async fn connect(&mut self, derived: DerivedState) {
        let t = self.orch.set_derived(derived);
        self.orch.run_estimation(t).await;
        let t = self.orch.set_session(SessionSnapshot::ready());
        self.orch.run_estimation(t).await;
    }

    async fn input(&mut self, input: UserInput) {
        let t = self.orch.set_input(input);
        self.orch.run_estimation(t).await;
    }

    async fn deliver(&mut self, handle: &PendingHandle, outcome: ConfirmationOutcome) {
        assert!(self.hub.resolve(handle, outcome));
        let event = self.orch.next_confirmation().await.expect("confirmation event");
        self.orch.apply_confirmation(event);
    }
}

fn staking(collateral: i64) -> DerivedState {
    DerivedState {
        unstaked_collateral: Decimal::from(collateral),
        target_c_ratio: Decimal::new(25, 2),
        collateral_rate: Decimal::from(2),
        ..Default::default()
    }
}

#[tokio::test]
async fn mint_estimate_submit_confirm() {
    let mut h = Harness::new(ActionKind::Mint);
    h.ledger.set_estimate("Synthetix.issueSynths", 21_000);
    h.ledger.queue_handle("0xabc");

    h.connect(staking(1_000)).await;
    h.input(UserInput::custom("100")).await;

    let estimate = h.orch.estimate().expect("estimate present");
    assert_eq!(estimate.raw, 21_000);
    assert_eq!(estimate.padded, 25_200);

    let outcome = h.orch.submit().await;
    assert_eq!(outcome, SubmitOutcome::Submitted(PendingHandle::from("0xabc")));
    assert_eq!(h.orch.state(), TransactionState::Waiting);

    let record = h.ledger.last_submission().unwrap();
    assert_eq!(record.method.to_string(), "Synthetix.issueSynths");
    assert_eq!(record.params.resource_limit, 25_200);
    assert_eq!(record.params.resource_price, 1_000_000_000);

    h.deliver(&PendingHandle::from("0xabc"), ConfirmationOutcome::Confirmed).await;
    assert_eq!(h.orch.state(), TransactionState::Success);
    assert_eq!(h.orch.handle(), Some(&PendingHandle::from("0xabc")));
    assert_eq!(
        *h.refreshes.lock(),
        vec![(ActionKind::Mint, vec![ReadModel::StakingData])]
    );
}

#[tokio::test]
async fn invalid_argument_blocks_submit() {
    let mut h = Harness::new(ActionKind::Mint);
    h.connect(staking(1_000)).await;

    h.ledger.fail_next_estimate(LedgerError::invalid_argument("invalid decimal value"));
    h.input(UserInput::custom("100")).await;

    assert_eq!(h.orch.estimate_error(), Some(&TransactionError::InvalidArgument));
    assert!(h.orch.estimate().is_none());
    assert!(!h.orch.can_submit());
    assert_eq!(h.orch.submit().await, SubmitOutcome::Skipped(SkipReason::EstimateError));
    assert_eq!(h.ledger.submit_calls(), 0);
}

#[tokio::test]
async fn unparseable_amount_blocks_submit_without_ledger_call() {
    let mut h = Harness::new(ActionKind::Mint);
    h.connect(staking(1_000)).await;
    let calls = h.ledger.estimate_calls();

    h.input(UserInput::custom("12abc")).await;
    assert_eq!(h.orch.error(), Some(&TransactionError::InvalidArgument));
    assert_eq!(h.ledger.estimate_calls(), calls);
    assert!(!h.orch.can_submit());
}

#[tokio::test]
async fn confirmation_failure_returns_to_presubmit() {
    let mut h = Harness::new(ActionKind::Mint);
    h.ledger.queue_handle("0xdef");
    h.connect(staking(1_000)).await;
    h.input(UserInput::custom("10")).await;

    assert!(matches!(h.orch.submit().await, SubmitOutcome::Submitted(_)));
    h.deliver(
        &PendingHandle::from("0xdef"),
        ConfirmationOutcome::Failed("reverted".to_string()),
    )
    .await;

    assert_eq!(h.orch.state(), TransactionState::Presubmit);
    assert_eq!(
        h.orch.error(),
        Some(&TransactionError::ConfirmationFailed("reverted".to_string()))
    );
    assert!(h.orch.handle().is_none());
    assert!(h.refreshes.lock().is_empty());

    // the accepted submission cleared the typed amount; re-enter it and retry
    assert_eq!(h.orch.input().amount_text(), "");
    assert_eq!(h.orch.submit().await, SubmitOutcome::Skipped(SkipReason::NoRequest));
    h.input(UserInput::custom("10")).await;
    assert!(h.orch.can_submit());
    assert!(matches!(h.orch.submit().await, SubmitOutcome::Submitted(_)));
    assert!(h.orch.error().is_none());
}

#[tokio::test]
async fn max_mint_locks_amount_and_custom_clears_it() {
    let mut h = Harness::new(ActionKind::Mint);
    h.connect(staking(100)).await;

    let t = h.orch.select_mode(AmountMode::Max);
    h.orch.run_estimation(t).await;

    let request = h.orch.current_request().unwrap().unwrap();
    assert_eq!(request.amount(), Some(Decimal::from(50)));
    assert!(request.use_max());
    assert!(h.orch.estimate().is_some());

    // typing while locked is ignored
    assert!(h.orch.set_amount_text("7").is_none());
    let request = h.orch.current_request().unwrap().unwrap();
    assert_eq!(request.amount(), Some(Decimal::from(50)));

    let t = h.orch.select_mode(AmountMode::Custom);
    h.orch.run_estimation(t).await;
    assert_eq!(h.orch.input().amount_text(), "");
    assert!(h.orch.current_request().unwrap().is_none());
    assert!(h.orch.estimate().is_none());

    h.orch.submit().await;
    assert_eq!(h.ledger.submit_calls(), 0);
}

#[tokio::test]
async fn max_mint_submits_issue_max_synths_without_args() {
    let mut h = Harness::new(ActionKind::Mint);
    h.connect(staking(100)).await;
    h.input(UserInput::max()).await;

    assert!(matches!(h.orch.submit().await, SubmitOutcome::Submitted(_)));
    let record = h.ledger.last_submission().unwrap();
    assert_eq!(record.method.to_string(), "Synthetix.issueMaxSynths");
    assert!(record.args.is_empty());
}

#[tokio::test]
async fn zero_collateral_is_insufficient_without_ledger_call() {
    let mut h = Harness::new(ActionKind::Mint);
    h.connect(staking(0)).await;
    h.input(UserInput::custom("10")).await;

    assert_eq!(h.orch.estimate_error(), Some(&TransactionError::InsufficientResource));
    assert_eq!(h.ledger.estimate_calls(), 0);
    assert_eq!(h.orch.submit().await, SubmitOutcome::Skipped(SkipReason::EstimateError));
}

#[tokio::test]
async fn revert_code_is_insufficient() {
    let mut h = Harness::new(ActionKind::Deposit);
    h.ledger
        .fail_next_estimate(LedgerError::from_message("cannot estimate gas (code: -32603)"));
    h.connect(DerivedState {
        transferable_collateral: Decimal::from(25),
        ..Default::default()
    })
    .await;

    assert_eq!(h.orch.estimate_error(), Some(&TransactionError::InsufficientResource));
    assert!(!h.orch.can_submit());
}

#[tokio::test]
async fn submit_is_noop_outside_presubmit() {
    let mut h = Harness::new(ActionKind::Mint);
    h.connect(staking(1_000)).await;
    h.input(UserInput::custom("10")).await;

    let SubmitOutcome::Submitted(handle) = h.orch.submit().await else {
        panic!("first submit should go through");
    };
    assert_eq!(h.orch.submit().await, SubmitOutcome::Skipped(SkipReason::NotPresubmit));

    h.deliver(&handle, ConfirmationOutcome::Confirmed).await;
    assert_eq!(h.orch.submit().await, SubmitOutcome::Skipped(SkipReason::NotPresubmit));
    assert_eq!(h.ledger.submit_calls(), 1);

    assert!(h.orch.reset());
    h.input(UserInput::custom("10")).await;
    assert!(matches!(h.orch.submit().await, SubmitOutcome::Submitted(_)));
}

#[tokio::test]
async fn stale_and_duplicate_events_are_ignored() {
    let mut h = Harness::new(ActionKind::Deposit);
    h.connect(DerivedState {
        transferable_collateral: Decimal::from(25),
        ..Default::default()
    })
    .await;

    // no transaction in flight
    assert!(!h.orch.on_confirmed(&PendingHandle::from("0x99")));
    assert!(!h.orch.on_failed(&PendingHandle::from("0x99"), "boom"));
    assert_eq!(h.orch.state(), TransactionState::Presubmit);
    assert!(h.orch.error().is_none());

    let SubmitOutcome::Submitted(handle) = h.orch.submit().await else {
        panic!("deposit should submit");
    };
    assert!(h.orch.on_confirmed(&handle));
    assert!(!h.orch.on_failed(&handle, "late failure"));
    assert_eq!(h.orch.state(), TransactionState::Success);
    assert_eq!(
        *h.refreshes.lock(),
        vec![(ActionKind::Deposit, vec![ReadModel::BridgeBalances])]
    );
}

#[tokio::test]
async fn migrate_escrow_round_trip() {
    let mut h = Harness::new(ActionKind::MigrateEscrow);
    h.connect(DerivedState {
        escrow: Some(EscrowData {
            total_escrowed: Decimal::from(500),
            claimable_amount: Decimal::ZERO,
            claimable_entry_ids_in_chunk: vec![vec![1, 2, 3], vec![4, 5]],
        }),
        ..Default::default()
    })
    .await;

    // 120k base + 5 entries at 25k, padded by 1.2
    assert_eq!(h.orch.estimate().unwrap().padded, 294_000);

    let SubmitOutcome::Submitted(handle) = h.orch.submit().await else {
        panic!("migration should submit");
    };
    let record = h.ledger.last_submission().unwrap();
    assert_eq!(
        record.method.to_string(),
        "SynthetixBridgeToOptimism.initiateEscrowMigration"
    );

    h.deliver(&handle, ConfirmationOutcome::Confirmed).await;
    assert_eq!(
        *h.refreshes.lock(),
        vec![(ActionKind::MigrateEscrow, vec![ReadModel::EscrowData])]
    );
}

#[tokio::test]
async fn wallet_disconnect_clears_estimate_without_error() {
    let mut h = Harness::new(ActionKind::Mint);
    let mut events = h.orch.subscribe_events();
    h.connect(staking(1_000)).await;
    h.input(UserInput::custom("10")).await;
    assert!(h.orch.estimate().is_some());

    h.orch.set_session(SessionSnapshot {
        wallet_connected: false,
        app_ready: true,
    });
    assert!(h.orch.estimate().is_none());
    assert!(h.orch.error().is_none());
    assert_eq!(h.orch.submit().await, SubmitOutcome::Skipped(SkipReason::NotReady));

    let mut cleared = false;
    while let Ok(event) = events.try_recv() {
        if let LifecycleEvent::EstimateCleared { error: None, .. } = event {
            cleared = true;
        }
    }
    assert!(cleared);
}
