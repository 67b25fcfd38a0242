use crate::capture::{AudioHandle, DeviceError, VideoHandle};
use crate::emotion::EmotionVector;
use crate::metrics::{clamp_percent, Metric, MetricValues};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

/// Plausible blinks-per-minute range; readings outside it are clamped.
pub const MAX_BLINK_RATE: f64 = 60.0;

/// Instantaneous microphone reading.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct AudioTick {
    /// 0 to 100
    pub volume: f64,
    /// Dominant frequency estimate in Hz.
    pub pitch: f64,
}

impl AudioTick {
    /// Level from RMS (-60 dBFS maps to 0, full scale to 100) and a zero-crossing
    /// pitch estimate.
    pub fn from_pcm(samples: &[f32], sample_rate: u32) -> Self {
        if samples.is_empty() || sample_rate == 0 {
            return Self::default();
        }
        let energy: f64 = samples.iter().map(|s| f64::from(*s) * f64::from(*s)).sum();
        let mean_square = energy / samples.len() as f64;
        let rms = mean_square.sqrt();
        let volume = if rms > 0.0 {
            clamp_percent((20.0 * rms.log10() + 60.0) / 60.0 * 100.0)
        } else {
            0.0
        };

        let crossings = samples
            .windows(2)
            .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
            .count();
        let seconds = samples.len() as f64 / f64::from(sample_rate);
        let pitch = crossings as f64 / 2.0 / seconds;

        Self { volume, pitch }
    }

    pub fn values(&self) -> MetricValues {
        MetricValues::from([
            (Metric::VolumeLevel, clamp_percent(self.volume)),
            (Metric::AveragePitch, self.pitch.max(0.0)),
        ])
    }
}

/// Face and body measurements for one video frame, each 0 to 100 except `blink_rate`
/// (blinks per minute).
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct FacialMetrics {
    pub eye_contact: f64,
    pub smile_frequency: f64,
    pub expression_variety: f64,
    pub engagement: f64,
    pub confidence: f64,
    pub naturalness: f64,
    pub head_movement: f64,
    pub blink_rate: f64,
}

impl FacialMetrics {
    pub fn values(&self) -> MetricValues {
        MetricValues::from([
            (Metric::EyeContact, clamp_percent(self.eye_contact)),
            (Metric::SmileFrequency, clamp_percent(self.smile_frequency)),
            (Metric::ExpressionVariety, clamp_percent(self.expression_variety)),
            (Metric::Engagement, clamp_percent(self.engagement)),
            (Metric::Confidence, clamp_percent(self.confidence)),
            (Metric::Naturalness, clamp_percent(self.naturalness)),
            (Metric::HeadMovement, clamp_percent(self.head_movement)),
            (Metric::BlinkRate, self.blink_rate.clamp(0.0, MAX_BLINK_RATE)),
        ])
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct VideoFrame {
    pub metrics: FacialMetrics,
    pub emotions: EmotionVector,
}

/// The perceptual side of the engine. Windowing, scoring and feedback only ever see
/// what these two calls return.
///
/// `Ok(None)` means nothing new was available this tick; the sampler just waits for the
/// next one. An `Err` means the track is gone and sampling for that source stops.
pub trait AnalysisProvider: Send + Sync {
    fn sample_audio_tick<'a>(
        &'a self,
        handle: &'a AudioHandle,
    ) -> BoxFuture<'a, Result<Option<AudioTick>, DeviceError>>;

    fn sample_video_frame<'a>(
        &'a self,
        handle: &'a VideoHandle,
    ) -> BoxFuture<'a, Result<Option<VideoFrame>, DeviceError>>;
}
