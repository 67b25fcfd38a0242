use crate::capture::{AudioHandle, CaptureProvider, DeviceError, StreamId, TrackState, VideoHandle};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

/// In-process capture provider with no real devices behind it. Can be told to refuse
/// access, and lets the caller end tracks to mimic a device being unplugged.
#[derive(Debug, Default)]
pub struct SimulatedCapture {
    failure: Option<DeviceError>,
    next_id: AtomicU64,
    state: Mutex<CaptureState>,
}

#[derive(Debug, Default)]
struct CaptureState {
    audio: Option<(StreamId, TrackState)>,
    video: Option<(StreamId, TrackState)>,
    released: Vec<StreamId>,
}

impl SimulatedCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(error: DeviceError) -> Self {
        Self {
            failure: Some(error),
            ..Self::default()
        }
    }

    fn state(&self) -> MutexGuard<'_, CaptureState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Streams handed back so far, in release order.
    pub fn released(&self) -> Vec<StreamId> {
        self.state().released.clone()
    }

    pub fn end_audio_track(&self) {
        if let Some((_, track)) = &self.state().audio {
            track.end();
        }
    }

    pub fn end_video_track(&self) {
        if let Some((_, track)) = &self.state().video {
            track.end();
        }
    }

    fn next_stream(&self) -> StreamId {
        StreamId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

impl CaptureProvider for SimulatedCapture {
    fn request_streams(&self) -> BoxFuture<'_, Result<(AudioHandle, VideoHandle), DeviceError>> {
        async move {
            if let Some(err) = &self.failure {
                return Err(err.clone());
            }

            let audio_track = TrackState::live();
            let video_track = TrackState::live();
            let audio = AudioHandle::new(
                self.next_stream(),
                "simulated microphone",
                audio_track.clone(),
            );
            let video = VideoHandle::new(
                self.next_stream(),
                "simulated camera",
                video_track.clone(),
            );

            let mut state = self.state();
            state.audio = Some((audio.id(), audio_track));
            state.video = Some((video.id(), video_track));
            Ok((audio, video))
        }
        .boxed()
    }

    fn release(&self, stream: StreamId) {
        let mut state = self.state();
        // A released stream's track is over for anyone still sampling it.
        for (id, track) in [&state.audio, &state.video].into_iter().flatten() {
            if *id == stream {
                track.end();
            }
        }
        state.released.push(stream);
    }
}
