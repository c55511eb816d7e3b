//! Confirmation monitoring
//!
//! The orchestrator registers every pending handle with a [`TxMonitor`].
//! The monitor delivers exactly one terminal [`ConfirmationEvent`] per handle
//! through the [`ConfirmationSink`] it was given; the orchestrator's session
//! loop receives those events on an mpsc channel.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::types::PendingHandle;

/// Terminal outcome of a submitted transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfirmationOutcome {
    Confirmed,
    Failed(String),
}

/// One terminal event for one handle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationEvent {
    pub handle: PendingHandle,
    pub outcome: ConfirmationOutcome,
}

/// Sending half handed to the monitor on registration
#[derive(Debug, Clone)]
pub struct ConfirmationSink {
    tx: mpsc::UnboundedSender<ConfirmationEvent>,
}

impl ConfirmationSink {
    pub fn new(tx: mpsc::UnboundedSender<ConfirmationEvent>) -> Self {
        Self { tx }
    }

    /// Create a sink together with its receiving end
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ConfirmationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Deliver an event; returns `false` if the receiver is gone
    pub fn deliver(&self, event: ConfirmationEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Collaborator that watches the ledger for a handle's terminal event
pub trait TxMonitor: Send + Sync {
    /// Start watching `handle`; the terminal event goes to `sink`
    fn register_handle(&self, handle: &PendingHandle, sink: ConfirmationSink);
}

/// In-process [`TxMonitor`]
///
/// Handles are resolved explicitly with [`NotifyHub::resolve`], or
/// automatically after a delay when auto-resolution is configured.
#[derive(Debug, Clone, Default)]
pub struct NotifyHub {
    sinks: Arc<DashMap<PendingHandle, ConfirmationSink>>,
    auto_resolve: Option<(Duration, ConfirmationOutcome)>,
}

impl NotifyHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve every registered handle with `outcome` after `delay`
    ///
    /// Requires a running tokio runtime at registration time.
    pub fn with_auto_resolve(mut self, delay: Duration, outcome: ConfirmationOutcome) -> Self {
        self.auto_resolve = Some((delay, outcome));
        self
    }

    /// Deliver the terminal event for `handle`
    ///
    /// Returns `false` when the handle is unknown or was already resolved.
    pub fn resolve(&self, handle: &PendingHandle, outcome: ConfirmationOutcome) -> bool {
        let Some((handle, sink)) = self.sinks.remove(handle) else {
            debug!(handle = %handle, "Resolve for unknown handle ignored");
            return false;
        };

        if !sink.deliver(ConfirmationEvent {
            handle: handle.clone(),
            outcome,
        }) {
            warn!(handle = %handle, "Confirmation receiver dropped before delivery");
        }
        true
    }

    pub fn is_registered(&self, handle: &PendingHandle) -> bool {
        self.sinks.contains_key(handle)
    }

    pub fn pending_count(&self) -> usize {
        self.sinks.len()
    }
}

impl TxMonitor for NotifyHub {
    fn register_handle(&self, handle: &PendingHandle, sink: ConfirmationSink) {
        if self.sinks.insert(handle.clone(), sink).is_some() {
            warn!(handle = %handle, "Handle registered twice; previous sink replaced");
        }
        debug!(handle = %handle, "Handle registered");

        if let Some((delay, outcome)) = self.auto_resolve.clone() {
            let hub = self.clone();
            let handle = handle.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                hub.resolve(&handle, outcome);
            });
        }
    }
}
