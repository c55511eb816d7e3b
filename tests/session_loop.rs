//! Session event loop: concurrent estimations, monitor delivery, shutdown

use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

use txflow::actions::descriptor_for;
use txflow::config::Config;
use txflow::ledger::SimulatedLedger;
use txflow::monitor::{ConfirmationOutcome, NotifyHub};
use txflow::orchestrator::{
    run_session, LifecycleEvent, SessionCommand, SessionHandle, SessionOptions, SkipReason,
    SubmitOutcome, TransactionError, TxOrchestrator, TxPhase,
};
use txflow::resolver::{DerivedState, SessionSnapshot, UserInput};
use txflow::types::{ActionKind, TransactionState};

fn staking() -> DerivedState {
    DerivedState {
        unstaked_collateral: Decimal::from(1_000),
        target_c_ratio: Decimal::new(25, 2),
        collateral_rate: Decimal::from(2),
        ..Default::default()
    }
}

async fn wait_for<F>(
    events: &mut broadcast::Receiver<LifecycleEvent>,
    mut pred: F,
) -> LifecycleEvent
where
    F: FnMut(&LifecycleEvent) -> bool,
{
    loop {
        let event = events.recv().await.expect("event stream open");
        if pred(&event) {
            return event;
        }
    }
}

fn spawn_session(
    orch: TxOrchestrator,
) -> (SessionHandle, tokio::task::JoinHandle<TxOrchestrator>) {
    let (tx, rx) = mpsc::channel(32);
    let task = tokio::spawn(run_session(orch, rx, SessionOptions::default()));
    (SessionHandle::new(tx), task)
}

#[tokio::test(start_paused = true)]
async fn superseded_estimate_is_discarded() {
    let ledger = Arc::new(SimulatedLedger::new().with_latency(Duration::from_millis(200)));
    let orch = TxOrchestrator::new(
        descriptor_for(ActionKind::Mint),
        ledger.clone(),
        Arc::new(NotifyHub::new()),
        &Config::default(),
    );
    let mut events = orch.subscribe_events();
    let (session, task) = spawn_session(orch);

    session.send(SessionCommand::SetDerived(staking())).await;
    session.send(SessionCommand::SetSession(SessionSnapshot::ready())).await;
    session.send(SessionCommand::SetInput(UserInput::custom("1"))).await;
    session.send(SessionCommand::SetInput(UserInput::custom("2"))).await;

    let event = wait_for(&mut events, |e| {
        matches!(e, LifecycleEvent::EstimateUpdated { .. })
    })
    .await;
    let LifecycleEvent::EstimateUpdated { estimate, .. } = event else {
        unreachable!()
    };
    assert_eq!(estimate.request.amount(), Some(Decimal::from(2)));

    // let the slower first estimate land as well
    tokio::time::sleep(Duration::from_secs(1)).await;
    session.shutdown().await;
    let orch = task.await.unwrap();

    assert_eq!(ledger.estimate_calls(), 2);
    let stats = orch.stats();
    assert_eq!(stats.estimates_requested, 2);
    assert_eq!(stats.estimates_superseded, 1);
    assert_eq!(
        orch.estimate().unwrap().request.amount(),
        Some(Decimal::from(2))
    );
}

#[tokio::test(start_paused = true)]
async fn auto_failed_confirmation_reaches_presubmit() {
    let hub = NotifyHub::new().with_auto_resolve(
        Duration::from_secs(2),
        ConfirmationOutcome::Failed("reverted".to_string()),
    );
    let orch = TxOrchestrator::new(
        descriptor_for(ActionKind::Deposit),
        Arc::new(SimulatedLedger::new()),
        Arc::new(hub),
        &Config::default(),
    );
    let mut events = orch.subscribe_events();
    let (session, task) = spawn_session(orch);

    session
        .send(SessionCommand::SetDerived(DerivedState {
            transferable_collateral: Decimal::from(40),
            ..Default::default()
        }))
        .await;
    session.send(SessionCommand::SetSession(SessionSnapshot::ready())).await;
    wait_for(&mut events, |e| matches!(e, LifecycleEvent::EstimateUpdated { .. })).await;

    let Some(SubmitOutcome::Submitted(handle)) = session.submit().await else {
        panic!("deposit should submit");
    };

    let failed = wait_for(&mut events, |e| matches!(e, LifecycleEvent::Failed { .. })).await;
    assert_eq!(
        failed,
        LifecycleEvent::Failed {
            action: ActionKind::Deposit,
            handle: Some(handle),
            error: TransactionError::ConfirmationFailed("reverted".to_string()),
        }
    );

    session.shutdown().await;
    let orch = task.await.unwrap();
    assert_eq!(orch.state(), TransactionState::Presubmit);
    assert_eq!(orch.stats().failed, 1);
}

fn bridge(transferable: i64) -> DerivedState {
    DerivedState {
        transferable_collateral: Decimal::from(transferable),
        ..Default::default()
    }
}

fn is_estimate_for(event: &LifecycleEvent, amount: i64) -> bool {
    matches!(
        event,
        LifecycleEvent::EstimateUpdated { estimate, .. }
            if estimate.request.amount() == Some(Decimal::from(amount))
    )
}

#[tokio::test(start_paused = true)]
async fn slow_submit_does_not_hold_up_re_estimation() {
    let ledger = Arc::new(SimulatedLedger::new().with_latency(Duration::from_secs(2)));
    let orch = TxOrchestrator::new(
        descriptor_for(ActionKind::Deposit),
        ledger.clone(),
        Arc::new(NotifyHub::new()),
        &Config::default(),
    );
    let mut events = orch.subscribe_events();
    let (session, task) = spawn_session(orch);

    session.send(SessionCommand::SetDerived(bridge(40))).await;
    session.send(SessionCommand::SetSession(SessionSnapshot::ready())).await;
    wait_for(&mut events, |e| is_estimate_for(e, 40)).await;

    let pending_submit = {
        let session = session.clone();
        tokio::spawn(async move { session.submit().await })
    };
    tokio::time::sleep(Duration::from_millis(1)).await;

    // the balance changes while the wallet is still signing
    let changed_at = Instant::now();
    session.send(SessionCommand::SetDerived(bridge(60))).await;

    // a second submit while the first is unanswered is skipped
    assert_eq!(
        session.submit().await,
        Some(SubmitOutcome::Skipped(SkipReason::SubmitInFlight))
    );

    wait_for(&mut events, |e| is_estimate_for(e, 60)).await;
    // one estimate round trip (2s plus at most 25% jitter), not submit + estimate
    assert!(changed_at.elapsed() < Duration::from_secs(3));

    let outcome = pending_submit.await.unwrap();
    assert!(matches!(outcome, Some(SubmitOutcome::Submitted(_))));

    session.shutdown().await;
    let orch = task.await.unwrap();
    assert_eq!(orch.state(), TransactionState::Waiting);
    assert_eq!(ledger.submit_calls(), 1);
    let TxPhase::Waiting { request, .. } = orch.phase() else {
        panic!("expected waiting");
    };
    assert_eq!(request.amount(), Some(Decimal::from(40)));
}

#[tokio::test(start_paused = true)]
async fn shutdown_applies_in_flight_submission() {
    let ledger = Arc::new(SimulatedLedger::new().with_latency(Duration::from_secs(1)));
    let orch = TxOrchestrator::new(
        descriptor_for(ActionKind::Deposit),
        ledger.clone(),
        Arc::new(NotifyHub::new()),
        &Config::default(),
    );
    let mut events = orch.subscribe_events();
    let (session, task) = spawn_session(orch);

    session.send(SessionCommand::SetDerived(bridge(40))).await;
    session.send(SessionCommand::SetSession(SessionSnapshot::ready())).await;
    wait_for(&mut events, |e| is_estimate_for(e, 40)).await;

    let pending_submit = {
        let session = session.clone();
        tokio::spawn(async move { session.submit().await })
    };
    tokio::time::sleep(Duration::from_millis(1)).await;
    session.shutdown().await;

    let orch = task.await.unwrap();
    assert_eq!(orch.state(), TransactionState::Waiting);
    assert!(matches!(
        pending_submit.await.unwrap(),
        Some(SubmitOutcome::Submitted(_))
    ));
}

#[tokio::test]
async fn dropping_all_handles_stops_the_session() {
    let orch = TxOrchestrator::new(
        descriptor_for(ActionKind::Mint),
        Arc::new(SimulatedLedger::new()),
        Arc::new(NotifyHub::new()),
        &Config::default(),
    );
    let (session, task) = spawn_session(orch);
    assert!(session.send(SessionCommand::Reset).await);
    drop(session);

    let orch = task.await.unwrap();
    assert_eq!(orch.state(), TransactionState::Presubmit);
}
