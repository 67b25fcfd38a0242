use crate::analysis::AnalyzerOutcome;
use crate::capture::{AudioHandle, DeviceLease, VideoHandle};
use crate::session::SessionId;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Everything that belongs to one session: its id, timing, device lease and, while
/// recording, the two sampling tasks. Dropping it releases the devices and aborts
/// any task still running.
#[derive(Debug)]
pub struct SessionContext {
    id: SessionId,
    started_at: Duration,
    stopped_at: Option<Duration>,
    lease: Option<DeviceLease>,
    streams: Option<(AudioHandle, VideoHandle)>,
    pub(crate) recording: Option<RecordingTasks>,
}

impl SessionContext {
    pub(crate) fn new(id: SessionId, started_at: Duration) -> Self {
        Self {
            id,
            started_at,
            stopped_at: None,
            lease: None,
            streams: None,
            recording: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn started_at(&self) -> Duration {
        self.started_at
    }

    pub fn stopped_at(&self) -> Option<Duration> {
        self.stopped_at
    }

    pub(crate) fn acquired(&mut self, lease: DeviceLease, audio: AudioHandle, video: VideoHandle) {
        self.lease = Some(lease);
        self.streams = Some((audio, video));
    }

    /// Hands the stream handles to the analyzers. Only possible once per session.
    pub(crate) fn take_streams(&mut self) -> Option<(AudioHandle, VideoHandle)> {
        self.streams.take()
    }

    pub(crate) fn mark_stopped(&mut self, at: Duration) {
        self.stopped_at.get_or_insert(at);
    }

    /// Releases the devices now. Safe to repeat; the lease itself is kept until the
    /// context is dropped.
    pub(crate) fn release_devices(&mut self) {
        self.streams = None;
        if let Some(lease) = self.lease.as_mut() {
            lease.release_all();
        }
    }

    /// Aborts any running analyzers and releases the devices.
    pub(crate) fn close(&mut self) {
        drop(self.recording.take());
        self.release_devices();
    }
}

impl Drop for SessionContext {
    fn drop(&mut self) {
        self.close();
    }
}

/// The two sampling tasks of a recording. An outcome is stored as soon as its task is
/// joined, so a join that was interrupted can pick up where it left off.
#[derive(Debug)]
pub(crate) struct RecordingTasks {
    pub(crate) stop: watch::Sender<bool>,
    pub(crate) audio: JoinHandle<AnalyzerOutcome>,
    pub(crate) video: JoinHandle<AnalyzerOutcome>,
    pub(crate) voice: Option<AnalyzerOutcome>,
    pub(crate) facial: Option<AnalyzerOutcome>,
    pub(crate) started_at: Duration,
}

impl RecordingTasks {
    pub(crate) fn new(
        stop: watch::Sender<bool>,
        audio: JoinHandle<AnalyzerOutcome>,
        video: JoinHandle<AnalyzerOutcome>,
        started_at: Duration,
    ) -> Self {
        Self {
            stop,
            audio,
            video,
            voice: None,
            facial: None,
            started_at,
        }
    }
}

/// Dropping the tasks aborts them; an abort discards whatever tick was in flight.
impl Drop for RecordingTasks {
    fn drop(&mut self) {
        let _ = self.stop.send(true);
        self.audio.abort();
        self.video.abort();
    }
}
