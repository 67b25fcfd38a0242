mod lease;
mod simulated;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use lease::DeviceLease;
pub use simulated::SimulatedCapture;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamId(pub u64);

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream-{}", self.0)
    }
}

/// Liveness of a device track. The capture side ends it when the device goes away;
/// samplers observe it.
#[derive(Clone, Debug)]
pub struct TrackState(Arc<AtomicBool>);

impl TrackState {
    pub fn live() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_live(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn end(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Microphone stream. Not `Clone`: exactly one session owns it.
#[derive(Debug)]
pub struct AudioHandle {
    id: StreamId,
    label: String,
    track: TrackState,
}

impl AudioHandle {
    pub fn new(id: StreamId, label: impl Into<String>, track: TrackState) -> Self {
        Self {
            id,
            label: label.into(),
            track,
        }
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_live(&self) -> bool {
        self.track.is_live()
    }
}

/// Camera stream. Not `Clone`: exactly one session owns it.
#[derive(Debug)]
pub struct VideoHandle {
    id: StreamId,
    label: String,
    track: TrackState,
}

impl VideoHandle {
    pub fn new(id: StreamId, label: impl Into<String>, track: TrackState) -> Self {
        Self {
            id,
            label: label.into(),
            track,
        }
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_live(&self) -> bool {
        self.track.is_live()
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("permission to use the device was denied")]
    PermissionDenied,

    #[error("device unavailable: {0}")]
    Unavailable(String),

    #[error("device track ended")]
    TrackLost,
}

pub trait CaptureProvider: Send + Sync {
    fn request_streams(&self) -> BoxFuture<'_, Result<(AudioHandle, VideoHandle), DeviceError>>;

    /// Gives a stream back to the device layer. Must not block.
    fn release(&self, stream: StreamId);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_observe_track_end() {
        let track = TrackState::live();
        let handle = VideoHandle::new(StreamId(7), "cam", track.clone());
        assert!(handle.is_live());
        track.end();
        assert!(!handle.is_live());
        assert_eq!(handle.id().to_string(), "stream-7");
    }
}
