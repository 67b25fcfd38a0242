//! Rolling emotion timeline and the session-wide emotion profile.

use crate::emotion::{Emotion, EmotionVector};
use crate::util::{RollingWindow, Timestamped, WindowError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct EmotionTimelineEntry {
    pub timestamp: Duration,
    pub emotion: Emotion,
    /// 0 to 1
    pub intensity: f64,
}

impl Timestamped for EmotionTimelineEntry {
    fn timestamp(&self) -> Duration {
        self.timestamp
    }
}

/// Dominant emotion per frame over the most recent `horizon` of video.
#[derive(Clone, Debug)]
pub struct EmotionTimeline {
    window: RollingWindow<EmotionTimelineEntry>,
}

impl EmotionTimeline {
    pub fn new(horizon: Duration) -> Self {
        Self {
            window: RollingWindow::new(horizon),
        }
    }

    pub fn record(
        &mut self,
        timestamp: Duration,
        emotions: &EmotionVector,
    ) -> Result<EmotionTimelineEntry, WindowError> {
        let (emotion, intensity) = emotions.dominant();
        let entry = EmotionTimelineEntry {
            timestamp,
            emotion,
            intensity,
        };
        self.window.push(entry)?;
        Ok(entry)
    }

    pub fn entries(&self) -> impl Iterator<Item = &EmotionTimelineEntry> {
        self.window.iter()
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Most frequent dominant emotion in the window, priority order breaking ties.
    pub fn prevailing(&self) -> Option<Emotion> {
        if self.window.is_empty() {
            return None;
        }
        let counts = EmotionVector::from_fn(|e| {
            self.window.iter().filter(|entry| entry.emotion == e).count() as f64
        });
        let mut best = Emotion::PRIORITY[0];
        for emotion in Emotion::PRIORITY {
            if counts.get(emotion) > counts.get(best) {
                best = emotion;
            }
        }
        Some(best)
    }
}

/// Average emotion scores over every frame of a session.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct EmotionProfile {
    pub average: EmotionVector,
    pub dominant: Emotion,
    pub frames: usize,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct EmotionTotals {
    sum: EmotionVector,
    frames: usize,
}

impl EmotionTotals {
    pub(crate) fn add(&mut self, emotions: &EmotionVector) {
        let e = emotions.clamped();
        let sum = self.sum;
        self.sum = EmotionVector::from_fn(|k| sum.get(k) + e.get(k));
        self.frames += 1;
    }

    pub(crate) fn profile(&self) -> Option<EmotionProfile> {
        if self.frames == 0 {
            return None;
        }
        let n = self.frames as f64;
        let sum = self.sum;
        let average = EmotionVector::from_fn(|k| sum.get(k) / n);
        Some(EmotionProfile {
            average,
            dominant: average.dominant().0,
            frames: self.frames,
        })
    }
}
