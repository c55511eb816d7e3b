//! Transaction lifecycle orchestration
//!
//! ```text
//!   resolver ──► estimator ──► orchestrator ──► ledger.submit
//!                  ▲   │            │
//!    input/derived │   │ estimate   │ register_handle
//!    changes ──────┘   ▼            ▼
//!                  last-request   monitor ──► on_confirmed / on_failed
//!                  wins
//! ```
//!
//! States: `Presubmit -> Waiting -> Success`, `Waiting -> Presubmit` on
//! failure, `Success -> Presubmit` on reset. The handle lives inside the
//! `Waiting` / `Success` variants, so a handle exists exactly when the
//! state says it does.

pub mod errors;
pub mod estimator;
#[allow(clippy::module_inception)]
pub mod orchestrator;
pub mod session;
pub mod state;

pub use errors::TransactionError;
pub use estimator::{
    EstimateApplied, EstimationDeps, EstimationOutcome, EstimationTicket, ResourceEstimate,
    ResourceEstimator,
};
pub use orchestrator::{
    RefreshHook, SkipReason, SubmissionResult, SubmitOutcome, SubmitTicket, TxOrchestrator,
};
pub use session::{run_session, SessionCommand, SessionHandle, SessionOptions};
pub use state::{LifecycleEvent, TxPhase};
