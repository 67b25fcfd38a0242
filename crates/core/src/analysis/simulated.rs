use crate::analysis::{AnalysisProvider, AudioTick, FacialMetrics, VideoFrame};
use crate::capture::{AudioHandle, DeviceError, VideoHandle};
use crate::emotion::EmotionVector;
use futures::future::BoxFuture;
use futures::FutureExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex};

/// Produces plausible random readings without looking at any media. Seeded, so a given
/// seed always yields the same sequence.
#[derive(Clone, Debug)]
pub struct SimulatedAnalysisProvider {
    rng: Arc<Mutex<StdRng>>,
}

impl SimulatedAnalysisProvider {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Arc::new(Mutex::new(StdRng::seed_from_u64(seed))),
        }
    }

    fn with_rng<R>(&self, f: impl FnOnce(&mut StdRng) -> R) -> R {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut rng)
    }

    fn audio_tick(&self) -> AudioTick {
        self.with_rng(|rng| AudioTick {
            volume: rng.random_range(40.0..90.0),
            pitch: rng.random_range(100.0..220.0),
        })
    }

    fn video_frame(&self) -> VideoFrame {
        self.with_rng(|rng| VideoFrame {
            metrics: FacialMetrics {
                eye_contact: rng.random_range(60.0..100.0),
                smile_frequency: rng.random_range(20.0..50.0),
                expression_variety: rng.random_range(50.0..75.0),
                engagement: rng.random_range(65.0..100.0),
                confidence: rng.random_range(70.0..100.0),
                naturalness: rng.random_range(80.0..100.0),
                head_movement: rng.random_range(5.0..20.0),
                blink_rate: rng.random_range(15.0..25.0),
            },
            emotions: EmotionVector {
                joy: rng.random_range(0.0..0.8),
                surprise: rng.random_range(0.0..0.3),
                neutral: rng.random_range(0.0..0.6),
                sadness: rng.random_range(0.0..0.1),
                anger: rng.random_range(0.0..0.1),
                fear: rng.random_range(0.0..0.1),
                disgust: rng.random_range(0.0..0.05),
            },
        })
    }
}

impl Default for SimulatedAnalysisProvider {
    fn default() -> Self {
        Self::new(0)
    }
}

impl AnalysisProvider for SimulatedAnalysisProvider {
    fn sample_audio_tick<'a>(
        &'a self,
        handle: &'a AudioHandle,
    ) -> BoxFuture<'a, Result<Option<AudioTick>, DeviceError>> {
        async move {
            if !handle.is_live() {
                return Err(DeviceError::TrackLost);
            }
            Ok(Some(self.audio_tick()))
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
            Ok(Some(self.video_frame()))
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{StreamId, TrackState};

    #[tokio::test]
    async fn same_seed_same_readings() {
        let a = SimulatedAnalysisProvider::new(42);
        let b = SimulatedAnalysisProvider::new(42);
        let handle = VideoHandle::new(StreamId(1), "cam", TrackState::live());
        for _ in 0..5 {
            let fa = a.sample_video_frame(&handle).await.expect("live");
            let fb = b.sample_video_frame(&handle).await.expect("live");
            assert_eq!(fa, fb);
        }
    }

    #[tokio::test]
    async fn readings_stay_in_range() {
        let provider = SimulatedAnalysisProvider::new(7);
        let handle = AudioHandle::new(StreamId(1), "mic", TrackState::live());
        for _ in 0..100 {
            let tick = provider
                .sample_audio_tick(&handle)
                .await
                .expect("live")
                .expect("reading");
            assert!((40.0..90.0).contains(&tick.volume));
        }
    }

    #[tokio::test]
    async fn ended_track_is_reported() {
        let provider = SimulatedAnalysisProvider::default();
        let track = TrackState::live();
        let handle = AudioHandle::new(StreamId(3), "mic", track.clone());
        track.end();
        let err = provider.sample_audio_tick(&handle).await.unwrap_err();
        assert_eq!(err, DeviceError::TrackLost);
    }
}
