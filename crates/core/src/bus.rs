//! Outbound events: realtime snapshots for live display and session state changes.
//!
//! Each topic has exactly one consumer. Snapshot delivery is best effort: a full or
//! closed channel drops the snapshot and never reaches back into the analyzer.

use crate::metrics::MetricSnapshot;
use crate::report::SessionReport;
use crate::session::{SessionId, SessionPhase};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Clone, Debug, PartialEq)]
pub struct SnapshotProduced {
    pub session_id: SessionId,
    pub snapshot: MetricSnapshot,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SessionStateChanged {
    pub session_id: Option<SessionId>,
    pub from: SessionPhase,
    pub to: SessionPhase,
    /// Set only on the transition into `Reported`.
    pub report: Option<Arc<SessionReport>>,
}

#[derive(Debug)]
pub struct BusSubscriptions {
    pub snapshots: mpsc::Receiver<SnapshotProduced>,
    pub states: mpsc::UnboundedReceiver<SessionStateChanged>,
}

#[derive(Clone, Debug)]
pub struct EventBus {
    snapshots: mpsc::Sender<SnapshotProduced>,
    states: mpsc::UnboundedSender<SessionStateChanged>,
    dropped: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new(snapshot_capacity: usize) -> (Self, BusSubscriptions) {
        let (snap_tx, snap_rx) = mpsc::channel(snapshot_capacity.max(1));
        let (state_tx, state_rx) = mpsc::unbounded_channel();
        let bus = Self {
            snapshots: snap_tx,
            states: state_tx,
            dropped: Arc::new(AtomicU64::new(0)),
        };
        let subs = BusSubscriptions {
            snapshots: snap_rx,
            states: state_rx,
        };
        (bus, subs)
    }

    /// Returns whether the snapshot was handed to the consumer.
    pub fn publish_snapshot(&self, message: SnapshotProduced) -> bool {
        match self.snapshots.try_send(message) {
            Ok(()) => true,
            Err(e) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::trace!(dropped, reason = %e, "snapshot dropped");
                false
            }
        }
    }

    pub fn publish_state(&self, message: SessionStateChanged) {
        if self.states.send(message).is_err() {
            tracing::debug!("state consumer gone");
        }
    }

    pub fn dropped_snapshots(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
