use crate::capture::{CaptureProvider, StreamId};
use std::sync::Arc;

/// Scoped ownership of acquired streams. Every stream is released exactly once,
/// either through [`DeviceLease::release_all`] or when the lease is dropped.
pub struct DeviceLease {
    capture: Arc<dyn CaptureProvider>,
    streams: Vec<StreamId>,
}

impl DeviceLease {
    pub fn new(
        capture: Arc<dyn CaptureProvider>,
        streams: impl IntoIterator<Item = StreamId>,
    ) -> Self {
        Self {
            capture,
            streams: streams.into_iter().collect(),
        }
    }

    pub fn held(&self) -> &[StreamId] {
        &self.streams
    }

    /// Releases whatever is still held. Safe to call repeatedly.
    pub fn release_all(&mut self) {
        for stream in self.streams.drain(..) {
            tracing::debug!(%stream, "releasing device stream");
            self.capture.release(stream);
        }
    }
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        self.release_all();
    }
}

impl std::fmt::Debug for DeviceLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceLease")
            .field("streams", &self.streams)
            .finish()
    }
}
