//! Metric derivation from raw media taps: PCM buffers for the microphone and landmark-level
//! face observations for the camera.

use crate::analysis::{AnalysisProvider, AudioTick, FacialMetrics, VideoFrame};
use crate::capture::{AudioHandle, DeviceError, StreamId, VideoHandle};
use crate::emotion::{Emotion, EmotionVector};
use crate::metrics::clamp_percent;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const HISTORY: Duration = Duration::from_secs(60);
const SMILE_THRESHOLD: f64 = 0.5;
/// Degrees of combined yaw and pitch change per frame that reads as 100 head movement.
const FULL_SCALE_HEAD_MOTION_DEG: f64 = 20.0;

#[derive(Clone, Debug, PartialEq)]
pub struct PcmFrame {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// What a face tracker reports for one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FaceObservation {
    /// Capture time on the tracker's clock.
    pub at: Duration,
    /// 0 looking straight at the camera, 1 looking fully away.
    pub gaze_offset: f64,
    /// 0 to 1
    pub smile: f64,
    pub head_yaw_deg: f64,
    pub head_pitch_deg: f64,
    pub eyes_closed: bool,
    pub expressions: EmotionVector,
}

/// Latest microphone buffer for a stream, `None` if nothing new arrived.
pub trait PcmTap: Send + Sync {
    fn latest(&self, stream: StreamId) -> Option<PcmFrame>;
}

/// Latest face observation for a stream, `None` if no face was tracked.
pub trait FaceTap: Send + Sync {
    fn latest(&self, stream: StreamId) -> Option<FaceObservation>;
}

pub struct SignalAnalysisProvider<P, F> {
    pcm: P,
    face: F,
    tracker: Arc<Mutex<FaceTracker>>,
}

impl<P, F> SignalAnalysisProvider<P, F>
where
    P: PcmTap,
    F: FaceTap,
{
    pub fn new(pcm: P, face: F) -> Self {
        Self {
            pcm,
            face,
            tracker: Arc::new(Mutex::new(FaceTracker::default())),
        }
    }

    fn observe(&self, stream: StreamId, observation: &FaceObservation) -> FacialMetrics {
        let mut tracker = self
            .tracker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        tracker.observe(stream, observation)
    }
}

impl<P, F> AnalysisProvider for SignalAnalysisProvider<P, F>
where
    P: PcmTap,
    F: FaceTap,
{
    fn sample_audio_tick<'a>(
        &'a self,
        handle: &'a AudioHandle,
    ) -> BoxFuture<'a, Result<Option<AudioTick>, DeviceError>> {
        async move {
            if !handle.is_live() {
                return Err(DeviceError::TrackLost);
            }
            Ok(self
                .pcm
                .latest(handle.id())
                .map(|frame| AudioTick::from_pcm(&frame.samples, frame.sample_rate)))
        }
        .boxed()
    }

    fn sample_video_frame<'a>(
        &'a self,
        handle: &'a VideoHandle,
    ) -> BoxFuture<'a, Result<Option<VideoFrame>, DeviceError>> {
        async move {
            if !handle.is_live() {
                return Err(DeviceError::TrackLost);
            }
            Ok(self.face.latest(handle.id()).map(|observation| VideoFrame {
                metrics: self.observe(handle.id(), &observation),
                emotions: observation.expressions.clamped(),
            }))
        }
        .boxed()
    }
}

/// Frame-to-frame state needed for rates and motion. Belongs to one camera stream and
/// starts over when frames from a different stream arrive.
#[derive(Debug, Default)]
struct FaceTracker {
    stream: Option<StreamId>,
    first_seen: Option<Duration>,
    last_pose: Option<(f64, f64)>,
    eyes_were_closed: bool,
    blinks: VecDeque<Duration>,
    smiles: VecDeque<(Duration, bool)>,
}

impl FaceTracker {
    fn observe(&mut self, stream: StreamId, obs: &FaceObservation) -> FacialMetrics {
        if self.stream != Some(stream) {
            *self = FaceTracker {
                stream: Some(stream),
                ..FaceTracker::default()
            };
        }
        let first_seen = *self.first_seen.get_or_insert(obs.at);
        let cutoff = obs.at.saturating_sub(HISTORY);

        if self.eyes_were_closed && !obs.eyes_closed {
            self.blinks.push_back(obs.at);
        }
        self.eyes_were_closed = obs.eyes_closed;
        while self.blinks.front().is_some_and(|t| *t < cutoff) {
            self.blinks.pop_front();
        }

        self.smiles.push_back((obs.at, obs.smile >= SMILE_THRESHOLD));
        while self.smiles.front().is_some_and(|(t, _)| *t < cutoff) {
            self.smiles.pop_front();
        }

        let head_movement = match self.last_pose.replace((obs.head_yaw_deg, obs.head_pitch_deg)) {
            Some((yaw, pitch)) => {
                let delta = (obs.head_yaw_deg - yaw).abs() + (obs.head_pitch_deg - pitch).abs();
                clamp_percent(delta / FULL_SCALE_HEAD_MOTION_DEG * 100.0)
            }
            None => 0.0,
        };

        let observed = obs.at.saturating_sub(first_seen).min(HISTORY);
        let blink_rate = if observed.is_zero() {
            0.0
        } else {
            self.blinks.len() as f64 * 60.0 / observed.as_secs_f64()
        };

        let smiling = self.smiles.iter().filter(|(_, s)| *s).count();
        let smile_frequency = smiling as f64 / self.smiles.len().max(1) as f64 * 100.0;

        let eye_contact = (1.0 - obs.gaze_offset.clamp(0.0, 1.0)) * 100.0;
        let expressions = obs.expressions.clamped();
        let expressive = 100.0 - expressions.get(Emotion::Neutral) * 100.0;
        let tension = (expressions.get(Emotion::Fear)
            + expressions.get(Emotion::Anger)
            + expressions.get(Emotion::Disgust))
        .min(1.0);

        FacialMetrics {
            eye_contact,
            smile_frequency,
            expression_variety: expressions.spread() * 100.0,
            engagement: clamp_percent(0.6 * eye_contact + 0.4 * expressive),
            confidence: clamp_percent(0.5 * eye_contact + 0.5 * (100.0 - head_movement)),
            naturalness: clamp_percent(100.0 - 40.0 * tension - 0.3 * head_movement),
            head_movement,
            blink_rate,
        }
    }
}
