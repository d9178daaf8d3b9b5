//! Lifecycle event notifier
//!
//! Explicit asynchronous hand-off point for lifecycle observers. Events go
//! into an unbounded channel and are drained by a spawned task; the
//! lifecycle's success path never blocks on, or fails because of, an
//! observer.

use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info};

/// Event emitted by the service lifecycle
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    Started {
        service_id: i32,
        user_id: i32,
    },
    OnHold {
        service_id: i32,
        reason: Option<String>,
    },
    Resumed {
        service_id: i32,
        additional_km: Decimal,
    },
    Completed {
        service_id: i32,
        total_value: Decimal,
    },
    MaterialAdded {
        service_id: i32,
        material_id: i32,
        quantity: Decimal,
    },
}

/// Handle for emitting lifecycle events
///
/// Cheap to clone; all clones feed the same drain task.
#[derive(Clone)]
pub struct LifecycleNotifier {
    tx: UnboundedSender<LifecycleEvent>,
}

impl LifecycleNotifier {
    /// Create a notifier whose events are logged by a background task
    ///
    /// Must be called within a tokio runtime.
    pub fn spawn() -> Self {
        let (notifier, mut rx) = Self::channel();

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                info!(?event, "lifecycle event");
            }
            debug!("lifecycle notifier drain task stopped");
        });

        notifier
    }

    /// Create a notifier plus the receiving end, for custom observers
    pub fn channel() -> (Self, UnboundedReceiver<LifecycleEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Emit an event
    ///
    /// A closed channel is logged and swallowed; emission never fails the
    /// caller.
    pub fn emit(&self, event: LifecycleEvent) {
        if self.tx.send(event).is_err() {
            debug!("lifecycle event dropped: no observer attached");
        }
    }
}
