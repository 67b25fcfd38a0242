pub mod audio;
mod provider;
mod signal;
mod simulated;
pub mod video;

pub use audio::{AudioSignalAnalyzer, VoiceAccumulator, FILLER_WORDS};
pub use provider::{AnalysisProvider, AudioTick, FacialMetrics, VideoFrame, MAX_BLINK_RATE};
pub use signal::{FaceObservation, FaceTap, PcmFrame, PcmTap, SignalAnalysisProvider};
pub use simulated::SimulatedAnalysisProvider;
pub use video::{FacialAccumulator, VideoSignalAnalyzer};

use crate::bus::{EventBus, SnapshotProduced};
use crate::clock::Clock;
use crate::metrics::MetricSnapshot;
use crate::report::SubReport;
use crate::session::SessionId;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// What a sampling loop hands back when it ends.
#[derive(Clone, Debug, PartialEq)]
pub struct AnalyzerOutcome {
    pub report: SubReport,
    /// The loop ended because its track went away, not because it was asked to stop.
    pub track_lost: bool,
}

/// Per-recording plumbing shared by both sampling loops: the session clock, the stop
/// signal and the snapshot outlet.
#[derive(Clone)]
pub struct SamplingContext {
    session_id: SessionId,
    clock: Arc<dyn Clock>,
    origin: Duration,
    stop: watch::Receiver<bool>,
    bus: Option<EventBus>,
}

impl SamplingContext {
    pub fn new(
        session_id: SessionId,
        clock: Arc<dyn Clock>,
        stop: watch::Receiver<bool>,
        bus: Option<EventBus>,
    ) -> Self {
        let origin = clock.now();
        Self {
            session_id,
            clock,
            origin,
            stop,
            bus,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Time since recording started.
    pub fn elapsed(&self) -> Duration {
        self.clock.now().saturating_sub(self.origin)
    }

    /// Resolves once stop is requested, or when the controller side is gone.
    pub async fn stopped(&mut self) {
        let _ = self.stop.wait_for(|stop| *stop).await;
    }

    pub fn publish(&self, snapshot: MetricSnapshot) {
        if let Some(bus) = &self.bus {
            bus.publish_snapshot(SnapshotProduced {
                session_id: self.session_id,
                snapshot,
            });
        }
    }
}

impl std::fmt::Debug for SamplingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SamplingContext")
            .field("session_id", &self.session_id)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}
