mod timeline;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use timeline::{EmotionProfile, EmotionTimeline, EmotionTimelineEntry};
pub(crate) use timeline::EmotionTotals;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Joy,
    Surprise,
    Neutral,
    Sadness,
    Anger,
    Fear,
    Disgust,
}

impl Emotion {
    /// Tie-break order for the dominant emotion, highest priority first.
    pub const PRIORITY: [Emotion; 7] = [
        Emotion::Joy,
        Emotion::Surprise,
        Emotion::Neutral,
        Emotion::Sadness,
        Emotion::Anger,
        Emotion::Fear,
        Emotion::Disgust,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Joy => "joy",
            Emotion::Surprise => "surprise",
            Emotion::Neutral => "neutral",
            Emotion::Sadness => "sadness",
            Emotion::Anger => "anger",
            Emotion::Fear => "fear",
            Emotion::Disgust => "disgust",
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-frame class scores, each in [0, 1].
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct EmotionVector {
    pub joy: f64,
    pub surprise: f64,
    pub neutral: f64,
    pub sadness: f64,
    pub anger: f64,
    pub fear: f64,
    pub disgust: f64,
}

impl EmotionVector {
    pub fn get(&self, emotion: Emotion) -> f64 {
        match emotion {
            Emotion::Joy => self.joy,
            Emotion::Surprise => self.surprise,
            Emotion::Neutral => self.neutral,
            Emotion::Sadness => self.sadness,
            Emotion::Anger => self.anger,
            Emotion::Fear => self.fear,
            Emotion::Disgust => self.disgust,
        }
    }

    fn slot(&mut self, emotion: Emotion) -> &mut f64 {
        match emotion {
            Emotion::Joy => &mut self.joy,
            Emotion::Surprise => &mut self.surprise,
            Emotion::Neutral => &mut self.neutral,
            Emotion::Sadness => &mut self.sadness,
            Emotion::Anger => &mut self.anger,
            Emotion::Fear => &mut self.fear,
            Emotion::Disgust => &mut self.disgust,
        }
    }

    pub fn from_fn(mut f: impl FnMut(Emotion) -> f64) -> Self {
        let mut v = Self::default();
        for emotion in Emotion::PRIORITY {
            *v.slot(emotion) = f(emotion);
        }
        v
    }

    /// Same vector with every score forced into [0, 1].
    pub fn clamped(&self) -> Self {
        Self::from_fn(|e| {
            let x = self.get(e);
            if x.is_nan() {
                0.0
            } else {
                x.clamp(0.0, 1.0)
            }
        })
    }

    /// Highest-scoring class and its intensity. Ties go to the class earlier in
    /// [`Emotion::PRIORITY`].
    pub fn dominant(&self) -> (Emotion, f64) {
        let clamped = self.clamped();
        let mut best = (Emotion::PRIORITY[0], clamped.get(Emotion::PRIORITY[0]));
        for emotion in &Emotion::PRIORITY[1..] {
            let score = clamped.get(*emotion);
            if score > best.1 {
                best = (*emotion, score);
            }
        }
        best
    }

    /// Normalized Shannon entropy of the class distribution, 0 (one class) to 1 (uniform).
    pub fn spread(&self) -> f64 {
        let clamped = self.clamped();
        let total: f64 = Emotion::PRIORITY.iter().map(|e| clamped.get(*e)).sum();
        if total <= 0.0 {
            return 0.0;
        }
        let entropy: f64 = Emotion::PRIORITY
            .iter()
            .map(|e| clamped.get(*e) / total)
            .filter(|p| *p > 0.0)
            .map(|p| -p * p.ln())
            .sum();
        entropy / (Emotion::PRIORITY.len() as f64).ln()
    }
}
