//! txflow - transaction lifecycle orchestration
//!
//! Estimates, submits and tracks ledger-mutating actions (synth minting,
//! bridge deposits, escrow migration) through to confirmation.
//!
//! ## Components
//!
//! - **Resolver** ([`resolver`], [`actions`]): user input + derived state → [`ActionRequest`]
//! - **Estimator** ([`orchestrator::ResourceEstimator`]): gas estimation, last-request-wins
//! - **Orchestrator** ([`orchestrator::TxOrchestrator`]): `Presubmit → Waiting → Success`
//! - **Session loop** ([`orchestrator::run_session`]): single-task event loop
//! - **Collaborators** ([`ledger`], [`monitor`]): ledger client and confirmation monitor traits,
//!   plus in-process simulations

pub mod actions;
pub mod config;
pub mod ledger;
pub mod metrics;
pub mod monitor;
pub mod observability;
pub mod orchestrator;
pub mod resolver;
pub mod structured_logging;
pub mod types;

// Re-export commonly used types
pub use actions::{descriptor_for, ActionDescriptor};
pub use config::Config;
pub use ledger::{LedgerClient, LedgerError, SimulatedLedger};
pub use monitor::{ConfirmationEvent, ConfirmationOutcome, NotifyHub, TxMonitor};
pub use orchestrator::{LifecycleEvent, SubmitOutcome, TransactionError, TxOrchestrator};
pub use resolver::{AmountMode, DerivedState, SessionSnapshot, UserInput};
pub use types::{ActionKind, ActionRequest, PendingHandle, TransactionState};
